//! Conversion between Rust string sequences and Tcl list literals.
//!
//! Quoting is never done here.  Elements are appended to a real Tcl list
//! object and the list's own string form is returned, so the escaping is
//! exactly what Tcl's parser expects:
//!
//! | Elements            | List literal  |
//! |---------------------|---------------|
//! | *(none)*            | *(empty)*     |
//! | `""` or `None`      | `{}`          |
//! | `a`, ` b`, `c`      | `a { b} c`    |
//! | `{`                 | `\{`          |
//! | `"`                 | `{"}`         |
//!
//! Parsing goes the other way through `Tcl_ListObjGetElements`.  Malformed
//! input yields `None` instead of an error: list parsing is best effort.

use std::borrow::Cow;

use libc::c_int;
use tracing::{trace, warn};

use crate::ffi::{self, TclApi, Tcl_Interp, Tcl_Obj, TCL_OK};
use crate::obj::with_reference;

// ── Word ──────────────────────────────────────────────────────────────────────

/// A value that can be one element of a Tcl list.
pub trait Word {
    fn to_word(&self) -> Cow<'_, str>;
}

impl Word for str {
    fn to_word(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl Word for String {
    fn to_word(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl Word for Cow<'_, str> {
    fn to_word(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl<T: Word + ?Sized> Word for &T {
    fn to_word(&self) -> Cow<'_, str> {
        (**self).to_word()
    }
}

/// `None` is an empty element.
impl<T: Word> Word for Option<T> {
    fn to_word(&self) -> Cow<'_, str> {
        match self {
            Some(w) => w.to_word(),
            None => Cow::Borrowed(""),
        }
    }
}

/// Tcl booleans: `1` / `0`.
impl Word for bool {
    fn to_word(&self) -> Cow<'_, str> {
        Cow::Borrowed(if *self { "1" } else { "0" })
    }
}

impl Word for char {
    fn to_word(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }
}

macro_rules! display_word {
    ($($t:ty),*) => {
        $(impl Word for $t {
            fn to_word(&self) -> Cow<'_, str> {
                Cow::Owned(self.to_string())
            }
        })*
    };
}

display_word!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Render `words` as a Tcl list literal.
///
/// # Safety
///
/// `interp` must be a live interpreter created through `api`.
pub unsafe fn array_to_list<I>(api: &TclApi, interp: *mut Tcl_Interp, words: I) -> String
where
    I: IntoIterator,
    I::Item: Word,
{
    with_reference(api, (api.new_obj)(), |list| {
        for word in words {
            let text = word.to_word();
            with_reference(api, ffi::new_string_obj(api, &text), |elem| {
                let code = (api.list_obj_append_element)(interp, list, elem);
                if code != TCL_OK {
                    warn!(code, element = %text, "Tcl_ListObjAppendElement failed");
                }
            });
        }
        ffi::obj_string(api, list)
    })
}

/// Split a Tcl list literal into its elements, or `None` if it is malformed.
///
/// # Safety
///
/// `interp` must be a live interpreter created through `api`.
pub unsafe fn list_to_array(api: &TclApi, interp: *mut Tcl_Interp, list: &str) -> Option<Vec<String>> {
    with_reference(api, ffi::new_string_obj(api, list), |obj| {
        let mut objc: c_int = 0;
        let mut objv: *mut *mut Tcl_Obj = std::ptr::null_mut();
        if (api.list_obj_get_elements)(interp, obj, &mut objc, &mut objv) != TCL_OK {
            trace!(len = list.len(), "not a well-formed list");
            return None;
        }
        if objv.is_null() || objc <= 0 {
            return Some(Vec::new());
        }
        // The element array belongs to `obj`, which the guard keeps alive.
        let elements = std::slice::from_raw_parts(objv, objc as usize);
        Some(
            elements
                .iter()
                .map(|&elem| with_reference(api, elem, |elem| ffi::obj_string(api, elem)))
                .collect(),
        )
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
