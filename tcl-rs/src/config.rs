//! Session configuration.
//!
//! | Setting        | Builder                 | Environment           |
//! |----------------|-------------------------|-----------------------|
//! | Tcl library    | [`Config::library`]     | `TCL_RS_LIBRARY=path` |
//! | safe mode      | [`Config::safe`]        | `TCL_RS_SAFE=1`       |
//!
//! # Library resolution order (see [`Config::library_candidates`])
//! 1. explicit [`Config::library`] path
//! 2. `$TCL_RS_LIBRARY`
//! 3. platform default sonames, found through the system loader's search path

use std::path::{Path, PathBuf};

/// Environment variable naming the Tcl shared library to load.
pub const LIBRARY_ENV: &str = "TCL_RS_LIBRARY";

/// Environment variable enabling safe mode when set to a true value.
pub const SAFE_ENV: &str = "TCL_RS_SAFE";

#[cfg(target_os = "macos")]
const DEFAULT_LIBRARIES: &[&str] = &[
    "libtcl8.6.dylib",
    "libtcl.dylib",
    "/opt/homebrew/lib/libtcl8.6.dylib",
    "/usr/local/lib/libtcl8.6.dylib",
    "libtcl8.5.dylib",
];

#[cfg(target_os = "windows")]
const DEFAULT_LIBRARIES: &[&str] = &["tcl86t.dll", "tcl86.dll", "tcl85.dll"];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const DEFAULT_LIBRARIES: &[&str] = &[
    "libtcl8.6.so",
    "libtcl.so",
    "libtcl8.6.so.0",
    "libtcl8.5.so",
];

/// Options used when creating an [`Interp`](crate::Interp).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    library: Option<PathBuf>,
    safe: bool,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration taken from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Configuration taken from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let library = lookup(LIBRARY_ENV)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let safe = lookup(SAFE_ENV).is_some_and(|v| is_truthy(&v));
        Self { library, safe }
    }

    /// Load Tcl from this path instead of searching.
    pub fn library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library = Some(path.into());
        self
    }

    /// Restrict new interpreters to Tcl's safe command subset.
    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    pub fn library_path(&self) -> Option<&Path> {
        self.library.as_deref()
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    /// Library names to try, in order.
    ///
    /// An explicit path (from the builder or from the environment) is the
    /// only candidate; otherwise the platform's usual sonames are returned.
    pub fn library_candidates(&self) -> Vec<PathBuf> {
        if let Some(path) = &self.library {
            return vec![path.clone()];
        }
        DEFAULT_LIBRARIES.iter().map(PathBuf::from).collect()
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
