//! Scoped reference counting for Tcl objects.
//!
//! A freshly created `Tcl_Obj` has a reference count of zero and may be
//! freed by the first Tcl call that takes and releases a reference to it.
//! [`ObjRef`] holds one reference for as long as the guard lives, so an
//! object survives a sequence of further Tcl calls and is released exactly
//! once however the scope is left (return, `?`, or panic).

use std::marker::PhantomData;
use std::ptr::NonNull;

use libc::c_char;

use crate::ffi::{TclApi, Tcl_Obj};

/// Something that can adjust a Tcl object's reference count.
///
/// Implemented by [`TclApi`]; tests substitute a counter.
pub trait RefCounted {
    /// # Safety
    /// `obj` must point to a live object.
    unsafe fn incr_ref(&self, obj: NonNull<Tcl_Obj>);

    /// # Safety
    /// `obj` must point to a live object on which the caller holds a reference.
    unsafe fn decr_ref(&self, obj: NonNull<Tcl_Obj>);
}

const FILE: *const c_char = c"obj.rs".as_ptr();

impl RefCounted for TclApi {
    unsafe fn incr_ref(&self, obj: NonNull<Tcl_Obj>) {
        (self.db_incr_ref_count)(obj.as_ptr(), FILE, line!() as _);
    }

    unsafe fn decr_ref(&self, obj: NonNull<Tcl_Obj>) {
        (self.db_decr_ref_count)(obj.as_ptr(), FILE, line!() as _);
    }
}

/// One held reference on a Tcl object, released on drop.
pub struct ObjRef<'a, R: RefCounted + ?Sized = TclApi> {
    rc: &'a R,
    obj: NonNull<Tcl_Obj>,
    _not_send: PhantomData<*mut Tcl_Obj>,
}

impl<'a, R: RefCounted + ?Sized> ObjRef<'a, R> {
    /// Take a reference on `obj`.  Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `obj` must be null or a live object that stays valid while the
    /// reference is held.
    pub unsafe fn new(rc: &'a R, obj: *mut Tcl_Obj) -> Option<Self> {
        let obj = NonNull::new(obj)?;
        rc.incr_ref(obj);
        Some(Self { rc, obj, _not_send: PhantomData })
    }

    pub fn as_ptr(&self) -> *mut Tcl_Obj {
        self.obj.as_ptr()
    }
}

impl<R: RefCounted + ?Sized> Drop for ObjRef<'_, R> {
    fn drop(&mut self) {
        // SAFETY: the reference taken in `new` is still held.
        unsafe { self.rc.decr_ref(self.obj) }
    }
}

/// Run `body` while holding a reference on `obj`.
///
/// The reference is dropped before this returns, including when `body`
/// returns an error or panics.  A null `obj` is passed to `body` unguarded.
///
/// # Safety
///
/// Same contract as [`ObjRef::new`].
pub unsafe fn with_reference<R, T>(rc: &R, obj: *mut Tcl_Obj, body: impl FnOnce(*mut Tcl_Obj) -> T) -> T
where
    R: RefCounted + ?Sized,
{
    let _guard = ObjRef::new(rc, obj);
    body(obj)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
