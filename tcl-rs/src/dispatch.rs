//! Host commands callable from Tcl.
//!
//! Every session registers one Tcl command, [`SEND_COMMAND`]
//! (`interp_send`), whose implementation is [`interp_send`].  Tcl calls it
//! with the words of the command; the first word after `interp_send`
//! selects a handler in the session's [`CommandTable`] and the remaining
//! words are passed to it unchanged and in order.
//!
//! | Handler outcome              | Tcl sees                              |
//! |------------------------------|---------------------------------------|
//! | `Ok(value)`                  | `TCL_OK`, result `value`              |
//! | `Err(CommandError::Failed)`  | `TCL_ERROR`, result = message         |
//! | `Err(CommandError::Exit(n))` | `TCL_ERROR`; the enclosing `eval` exits the process with `n` |
//! | panic                        | `TCL_ERROR`, result = panic message   |
//!
//! Handlers receive the calling [`Interp`] and may evaluate further
//! scripts on it; re-entering `interp_send` from such a nested evaluation
//! is supported.
//!
//! [`SEND_COMMAND`]: crate::interp::SEND_COMMAND

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::mem::ManuallyDrop;
use std::rc::{Rc, Weak};

use libc::c_int;
use tracing::{error, trace};

use crate::ffi::{self, ClientData, TclApi, Tcl_Interp, Tcl_Obj, TCL_ERROR, TCL_OK};
use crate::interp::{Inner, Interp, SEND_COMMAND};

// ── CommandError ──────────────────────────────────────────────────────────────

/// Why a host command did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Ordinary failure; the message becomes the Tcl error text.
    #[error("{0}")]
    Failed(String),
    /// Terminate the host process with this status once control returns
    /// to the `eval` that ran the command.
    #[error("exit {0}")]
    Exit(i32),
}

impl CommandError {
    pub fn failed(msg: impl Into<String>) -> Self {
        CommandError::Failed(msg.into())
    }
}

impl From<String> for CommandError {
    fn from(msg: String) -> Self {
        CommandError::Failed(msg)
    }
}

impl From<&str> for CommandError {
    fn from(msg: &str) -> Self {
        CommandError::Failed(msg.to_owned())
    }
}

/// Lets handlers use `?` on nested evaluations.
impl From<crate::Error> for CommandError {
    fn from(e: crate::Error) -> Self {
        CommandError::Failed(e.to_string())
    }
}

/// Outcome of a host command.
pub type CommandResult = Result<String, CommandError>;

/// A host command implementation.
pub type Handler<C> = Rc<dyn Fn(&C, &[String]) -> CommandResult>;

// ── CommandTable ──────────────────────────────────────────────────────────────

/// Named host commands plus an optional catch-all.
///
/// `C` is the context handed to handlers ([`Interp`] for real sessions).
/// Lookups clone the handler out before calling it, so handlers may
/// re-enter the table (nested `eval`, registering more commands).
pub struct CommandTable<C> {
    handlers: RefCell<HashMap<String, Handler<C>>>,
    fallback: RefCell<Option<Handler<C>>>,
}

impl<C> Default for CommandTable<C> {
    fn default() -> Self {
        Self { handlers: RefCell::new(HashMap::new()), fallback: RefCell::new(None) }
    }
}

impl<C> CommandTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a named handler.  Returns `true` if a handler
    /// of that name already existed.
    pub fn insert(&self, name: impl Into<String>, handler: Handler<C>) -> bool {
        self.handlers.borrow_mut().insert(name.into(), handler).is_some()
    }

    /// Remove a named handler.  Returns `true` if it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.handlers.borrow_mut().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.borrow().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Handler for names with no registered handler.  It receives every
    /// word, the name included.
    pub fn set_fallback(&self, handler: Option<Handler<C>>) {
        *self.fallback.borrow_mut() = handler;
    }

    /// Route one `interp_send` invocation.  `args` excludes the
    /// `interp_send` word itself.
    pub fn receive(&self, ctx: &C, args: &[String]) -> CommandResult {
        let Some((name, rest)) = args.split_first() else {
            return Err(CommandError::Failed(format!(
                "wrong # args: should be \"{SEND_COMMAND} name ?arg ...?\""
            )));
        };
        let handler = self.handlers.borrow().get(name.as_str()).cloned();
        if let Some(handler) = handler {
            return handler(ctx, rest);
        }
        let fallback = self.fallback.borrow().clone();
        match fallback {
            Some(handler) => handler(ctx, args),
            None => Err(CommandError::Failed(format!("invalid command name \"{name}\""))),
        }
    }
}

// ── Tcl entry point ───────────────────────────────────────────────────────────

/// Set the interpreter result to `text`.
///
/// # Safety
///
/// `interp` must be a live interpreter created through `api`.
pub(crate) unsafe fn set_result(api: &TclApi, interp: *mut Tcl_Interp, text: &str) {
    // Tcl takes ownership of the zero-count object.
    (api.set_obj_result)(interp, ffi::new_string_obj(api, text));
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// `Tcl_ObjCmdProc` registered as `interp_send`.
///
/// `client_data` is a `Weak<Inner>` leaked by the session at registration
/// and reclaimed when the session is dropped.
pub(crate) unsafe extern "C" fn interp_send(
    client_data: ClientData,
    raw: *mut Tcl_Interp,
    objc: c_int,
    objv: *const *mut Tcl_Obj,
) -> c_int {
    if client_data.is_null() {
        return TCL_ERROR;
    }
    // Borrow the session's weak reference without consuming it.
    let weak = ManuallyDrop::new(Weak::from_raw(client_data as *const Inner));
    let Some(inner) = weak.upgrade() else {
        // Reached from a trace fired by Tcl_DeleteInterp; the handles are gone.
        if let Some(api) = ffi::loaded() {
            set_result(api, raw, "interpreter is being deleted");
        }
        return TCL_ERROR;
    };
    let interp = Interp::from_inner(inner);
    let api = interp.api();

    let args: Vec<String> = if objv.is_null() || objc <= 1 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(objv, objc as usize)[1..]
            .iter()
            .map(|&obj| ffi::obj_string(api, obj))
            .collect()
    };
    trace!(command = args.first().map(String::as_str).unwrap_or(""), argc = args.len(), "interp_send");

    let outcome = catch_unwind(AssertUnwindSafe(|| interp.commands().receive(&interp, &args)));
    match outcome {
        Ok(Ok(value)) => {
            set_result(api, raw, &value);
            TCL_OK
        }
        Ok(Err(e)) => {
            if let CommandError::Exit(status) = e {
                interp.record_exit(status);
            }
            set_result(api, raw, &e.to_string());
            TCL_ERROR
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!(command = args.first().map(String::as_str).unwrap_or(""), %msg, "host command panicked");
            set_result(api, raw, &format!("host command panicked: {msg}"));
            TCL_ERROR
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
