//! The subset of Tcl's C API the bridge uses.
//!
//! `libtcl` is opened at runtime with `libloading` rather than linked, so
//! the crate builds on machines without Tcl development files.  The library
//! is opened once per process; every [`Interp`](crate::Interp) shares the
//! resulting [`TclApi`] table.
//!
//! Reference counting goes through `Tcl_DbIncrRefCount` /
//! `Tcl_DbDecrRefCount`: `Tcl_IncrRefCount` is a C macro with no exported
//! symbol, while the `Db` variants are exported by every 8.x build.
//!
//! Strings cross the boundary with explicit byte lengths.  Tcl stores text
//! as "modified UTF-8": NUL is the overlong pair `C0 80`, and once Tcl has
//! worked on a string character by character, anything outside the Basic
//! Multilingual Plane is a CESU-8 surrogate pair.  [`to_tcl_bytes`] encodes
//! NUL on the way in; [`from_tcl_bytes`] undoes both on the way out.

#![allow(non_camel_case_types)]

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libc::{c_char, c_int, c_void};
use libloading::Library;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::LoadError;

// ── Opaque handles ────────────────────────────────────────────────────────────

/// An interpreter owned by the Tcl library.
#[repr(C)]
pub struct Tcl_Interp {
    _private: [u8; 0],
}

/// A reference-counted Tcl value.
#[repr(C)]
pub struct Tcl_Obj {
    _private: [u8; 0],
}

/// Token returned by `Tcl_CreateObjCommand`.
#[repr(C)]
pub struct Tcl_Command {
    _private: [u8; 0],
}

pub type ClientData = *mut c_void;

/// Signature of a command implemented in the host.
pub type ObjCmdProc =
    unsafe extern "C" fn(ClientData, *mut Tcl_Interp, c_int, *const *mut Tcl_Obj) -> c_int;

/// Called when a host command is deleted from its interpreter.
pub type CmdDeleteProc = unsafe extern "C" fn(ClientData);

// ── Status codes ──────────────────────────────────────────────────────────────

pub const TCL_OK: c_int = 0;
pub const TCL_ERROR: c_int = 1;
pub const TCL_RETURN: c_int = 2;
pub const TCL_BREAK: c_int = 3;
pub const TCL_CONTINUE: c_int = 4;

// ── Function table ────────────────────────────────────────────────────────────

/// Resolved Tcl entry points.  The owning [`Library`] is kept alive for as
/// long as the table exists.
pub struct TclApi {
    pub find_executable: unsafe extern "C" fn(*const c_char),
    pub create_interp: unsafe extern "C" fn() -> *mut Tcl_Interp,
    pub init: unsafe extern "C" fn(*mut Tcl_Interp) -> c_int,
    pub preserve: unsafe extern "C" fn(ClientData),
    pub release: unsafe extern "C" fn(ClientData),
    pub delete_interp: unsafe extern "C" fn(*mut Tcl_Interp),
    pub make_safe: unsafe extern "C" fn(*mut Tcl_Interp) -> c_int,
    pub eval_ex: unsafe extern "C" fn(*mut Tcl_Interp, *const c_char, c_int, c_int) -> c_int,
    pub create_obj_command: unsafe extern "C" fn(
        *mut Tcl_Interp,
        *const c_char,
        Option<ObjCmdProc>,
        ClientData,
        Option<CmdDeleteProc>,
    ) -> *mut Tcl_Command,
    pub new_obj: unsafe extern "C" fn() -> *mut Tcl_Obj,
    pub new_string_obj: unsafe extern "C" fn(*const c_char, c_int) -> *mut Tcl_Obj,
    pub list_obj_get_elements:
        unsafe extern "C" fn(*mut Tcl_Interp, *mut Tcl_Obj, *mut c_int, *mut *mut *mut Tcl_Obj) -> c_int,
    pub list_obj_append_element:
        unsafe extern "C" fn(*mut Tcl_Interp, *mut Tcl_Obj, *mut Tcl_Obj) -> c_int,
    pub get_string_from_obj: unsafe extern "C" fn(*mut Tcl_Obj, *mut c_int) -> *const c_char,
    pub get_obj_result: unsafe extern "C" fn(*mut Tcl_Interp) -> *mut Tcl_Obj,
    pub set_obj_result: unsafe extern "C" fn(*mut Tcl_Interp, *mut Tcl_Obj),
    pub db_incr_ref_count: unsafe extern "C" fn(*mut Tcl_Obj, *const c_char, c_int),
    pub db_decr_ref_count: unsafe extern "C" fn(*mut Tcl_Obj, *const c_char, c_int),
    path: PathBuf,
    _library: Library,
}

impl std::fmt::Debug for TclApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TclApi").field("path", &self.path).finish_non_exhaustive()
    }
}

unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> Result<T, LoadError> {
    library
        .get::<T>(name.as_bytes())
        .map(|sym| *sym)
        .map_err(|e| LoadError::Symbol { symbol: name.to_owned(), message: e.to_string() })
}

impl TclApi {
    /// Open one library file and resolve every entry point.
    ///
    /// # Safety
    ///
    /// Opening a shared library runs its initialisers; the file must be a
    /// genuine Tcl 8.5/8.6 build so that the declared signatures match.
    pub unsafe fn open(path: &Path) -> Result<Self, LoadError> {
        let library = Library::new(path).map_err(|e| LoadError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            find_executable: symbol(&library, "Tcl_FindExecutable")?,
            create_interp: symbol(&library, "Tcl_CreateInterp")?,
            init: symbol(&library, "Tcl_Init")?,
            preserve: symbol(&library, "Tcl_Preserve")?,
            release: symbol(&library, "Tcl_Release")?,
            delete_interp: symbol(&library, "Tcl_DeleteInterp")?,
            make_safe: symbol(&library, "Tcl_MakeSafe")?,
            eval_ex: symbol(&library, "Tcl_EvalEx")?,
            create_obj_command: symbol(&library, "Tcl_CreateObjCommand")?,
            new_obj: symbol(&library, "Tcl_NewObj")?,
            new_string_obj: symbol(&library, "Tcl_NewStringObj")?,
            list_obj_get_elements: symbol(&library, "Tcl_ListObjGetElements")?,
            list_obj_append_element: symbol(&library, "Tcl_ListObjAppendElement")?,
            get_string_from_obj: symbol(&library, "Tcl_GetStringFromObj")?,
            get_obj_result: symbol(&library, "Tcl_GetObjResult")?,
            set_obj_result: symbol(&library, "Tcl_SetObjResult")?,
            db_incr_ref_count: symbol(&library, "Tcl_DbIncrRefCount")?,
            db_decr_ref_count: symbol(&library, "Tcl_DbDecrRefCount")?,
            path: path.to_path_buf(),
            _library: library,
        })
    }

    /// Path the table was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try each candidate in turn; the first that opens wins.
    fn open_first(config: &Config) -> Result<Self, LoadError> {
        let candidates = config.library_candidates();
        let mut tried = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            // SAFETY: candidates are Tcl library names by construction.
            match unsafe { Self::open(candidate) } {
                Ok(api) => {
                    debug!(path = %candidate.display(), "loaded Tcl library");
                    // Tcl_Init locates init.tcl and the encoding tables
                    // relative to this.
                    unsafe { (api.find_executable)(std::ptr::null()) };
                    return Ok(api);
                }
                // An explicit path is the only candidate; report why it failed.
                Err(e) if config.library_path().is_some() => return Err(e),
                Err(LoadError::Symbol { symbol, message }) => {
                    warn!(path = %candidate.display(), %symbol, "not a usable Tcl library");
                    tried.push(format!("{} ({message})", candidate.display()));
                }
                Err(_) => tried.push(candidate.display().to_string()),
            }
        }
        Err(LoadError::NotFound { tried })
    }
}

static API: OnceLock<Result<TclApi, LoadError>> = OnceLock::new();

/// The process-wide Tcl function table, opening the library on first use.
///
/// The outcome of the first call (success or failure) is cached.  Later
/// calls naming a different library reuse the one already loaded.
pub fn load(config: &Config) -> Result<&'static TclApi, LoadError> {
    let api = API
        .get_or_init(|| TclApi::open_first(config))
        .as_ref()
        .map_err(Clone::clone)?;
    if let Some(wanted) = config.library_path() {
        if wanted != api.path() {
            warn!(
                wanted = %wanted.display(),
                loaded = %api.path().display(),
                "Tcl library already loaded; ignoring configured path"
            );
        }
    }
    Ok(api)
}

/// The function table, if a previous [`load`] succeeded.
pub fn loaded() -> Option<&'static TclApi> {
    API.get().and_then(|r| r.as_ref().ok())
}

// ── String helpers ────────────────────────────────────────────────────────────

/// Byte length as Tcl's `int`.
///
/// # Panics
///
/// Panics if `bytes` is longer than Tcl's 2 GiB object limit.
pub fn byte_len(bytes: &[u8]) -> c_int {
    c_int::try_from(bytes.len())
        .unwrap_or_else(|_| panic!("string of {} bytes exceeds Tcl's object size limit", bytes.len()))
}

/// A new string object (reference count zero) holding `s`.
///
/// # Safety
///
/// `api` must be a loaded table; the caller takes responsibility for the
/// object's reference count.
pub unsafe fn new_string_obj(api: &TclApi, s: &str) -> *mut Tcl_Obj {
    let bytes = to_tcl_bytes(s);
    (api.new_string_obj)(bytes.as_ptr().cast(), byte_len(&bytes))
}

/// The string form of `obj`.
///
/// # Safety
///
/// `obj` must be a live Tcl object.
pub unsafe fn obj_string(api: &TclApi, obj: *mut Tcl_Obj) -> String {
    let mut len: c_int = 0;
    let ptr = (api.get_string_from_obj)(obj, &mut len);
    if ptr.is_null() || len <= 0 {
        return String::new();
    }
    let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
    from_tcl_bytes(bytes)
}

/// The interpreter's current result string, read with its length so
/// embedded NULs survive.
///
/// # Safety
///
/// `interp` must be a live interpreter created by `api`.
pub unsafe fn result_string(api: &TclApi, interp: *mut Tcl_Interp) -> String {
    let obj = (api.get_obj_result)(interp);
    if obj.is_null() {
        return String::new();
    }
    obj_string(api, obj)
}

/// Encode text for Tcl: NUL becomes `C0 80`, everything else is passed
/// through unchanged.
pub fn to_tcl_bytes(s: &str) -> Cow<'_, [u8]> {
    if !s.contains('\0') {
        return Cow::Borrowed(s.as_bytes());
    }
    let mut out = Vec::with_capacity(s.len() + 4);
    for &b in s.as_bytes() {
        if b == 0 {
            out.extend_from_slice(&[0xC0, 0x80]);
        } else {
            out.push(b);
        }
    }
    Cow::Owned(out)
}

/// Surrogate code unit encoded as three bytes starting at `bytes[0]`, if
/// it lies in `range`.
fn surrogate(bytes: &[u8], range: std::ops::RangeInclusive<u8>) -> Option<u32> {
    match *bytes {
        [0xED, b1, b2, ..] if range.contains(&b1) && (0x80..=0xBF).contains(&b2) => {
            Some(0xD000 | (u32::from(b1 & 0x3F) << 6) | u32::from(b2 & 0x3F))
        }
        _ => None,
    }
}

/// Decode Tcl's internal string bytes.
///
/// `C0 80` becomes NUL and a high/low CESU-8 surrogate pair becomes the
/// supplementary character it encodes.  Anything else that isn't valid
/// UTF-8 (a lone surrogate, say) is replaced with U+FFFD.
pub fn from_tcl_bytes(bytes: &[u8]) -> String {
    if !bytes.iter().any(|&b| b == 0xC0 || b == 0xED) {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let rest = &bytes[i..];
        if rest.starts_with(&[0xC0, 0x80]) {
            out.push(0);
            i += 2;
            continue;
        }
        if let Some(high) = surrogate(rest, 0xA0..=0xAF) {
            if let Some(low) = rest.get(3..).and_then(|r| surrogate(r, 0xB0..=0xBF)) {
                let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                if let Some(c) = char::from_u32(code) {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    i += 6;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Human-readable name of a completion code, for log messages.
pub fn status_name(code: c_int) -> &'static str {
    match code {
        TCL_OK => "TCL_OK",
        TCL_ERROR => "TCL_ERROR",
        TCL_RETURN => "TCL_RETURN",
        TCL_BREAK => "TCL_BREAK",
        TCL_CONTINUE => "TCL_CONTINUE",
        _ => "unknown",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
