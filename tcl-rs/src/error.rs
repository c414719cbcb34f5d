//! Error types.
//!
//! | Failure                         | Surfaced as                              |
//! |---------------------------------|------------------------------------------|
//! | script raised an error          | [`Error::Eval`] from `eval`              |
//! | malformed list literal          | `None` from `list_to_array`              |
//! | host handler failed             | Tcl error status (see [`CommandError`])  |
//! | host handler requested exit     | process exit with the requested status   |
//! | unknown Tcl status code         | logged; `None` from `try_eval`           |
//!
//! [`CommandError`]: crate::dispatch::CommandError

use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by an [`Interp`](crate::Interp).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The script raised an error or named something that doesn't exist.
    /// Carries Tcl's error text verbatim.
    #[error("{0}")]
    Eval(String),

    /// `libtcl` (or one of the symbols the bridge needs) is unavailable.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// `Tcl_CreateInterp` returned a null handle.
    #[error("Tcl_CreateInterp returned no interpreter")]
    CreateFailed,

    /// A host command name cannot be passed to Tcl (contains NUL).
    #[error("invalid command name {0:?}")]
    InvalidName(String),

    /// A script file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Tcl's error text, when this is a script error.
    pub fn eval_message(&self) -> Option<&str> {
        match self {
            Error::Eval(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Failure to load the Tcl shared library.
///
/// Cloneable because the outcome of the first load attempt is cached for
/// the whole process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// None of the candidate library names could be opened.
    #[error("Tcl library not found (tried: {})", .tried.join(", "))]
    NotFound { tried: Vec<String> },

    /// An explicitly configured library failed to open.
    #[error("failed to open {path}: {message}")]
    Open { path: String, message: String },

    /// The library opened but lacks a required symbol.
    #[error("symbol '{symbol}' not found: {message}")]
    Symbol { symbol: String, message: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
