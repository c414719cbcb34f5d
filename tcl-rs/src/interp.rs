//! Interpreter sessions.
//!
//! An [`Interp`] owns one Tcl interpreter for its whole life.  Creating it
//! runs Tcl's standard initialisation, preserves the handle and registers
//! the host-callback command [`SEND_COMMAND`]; dropping the last handle
//! deletes and releases the interpreter.
//!
//! # Host commands
//!
//! ```text
//! interp.expose("greet", |_, args| Ok(format!("hello {}", args.join(" "))))?;
//! interp.eval("greet world")?;            // -> "hello world"
//! interp.eval("interp_send greet world")?; // same, through the raw command
//! ```
//!
//! A handler that returns [`CommandError::Exit`] makes the `eval` that ran
//! it terminate the process with the given status instead of returning
//! an error.  If the script catches the error, the request is dropped.
//!
//! # Threads
//!
//! `Interp` is neither `Send` nor `Sync`: a Tcl interpreter must only be
//! driven from the thread that created it.  Independent sessions on
//! different threads share nothing but the loaded library.
//!
//! # Reserved name
//!
//! Scripts must not define a command called `interp_send`; doing so
//! replaces the bridge and host commands stop working.
//!
//! [`CommandError::Exit`]: crate::dispatch::CommandError::Exit

use std::cell::{Cell, OnceCell};
use std::collections::HashSet;
use std::ffi::CStr;
use std::path::Path;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

use libc::c_int;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::dispatch::{self, CommandResult, CommandTable};
use crate::error::{Error, Result};
use crate::ffi::{self, ClientData, TclApi, Tcl_Interp, TCL_ERROR, TCL_OK};
use crate::list::{self, Word};

/// Name of the Tcl command that calls back into the host.
pub const SEND_COMMAND: &str = "interp_send";
const SEND_COMMAND_C: &CStr = c"interp_send";

/// Globals Tcl creates on demand, treated as built-in even when absent at
/// session creation.
const TCL_GLOBALS: &[&str] = &[
    "argc",
    "argv",
    "argv0",
    "auto_index",
    "auto_path",
    "env",
    "errorCode",
    "errorInfo",
    "tcl_interactive",
    "tcl_library",
    "tcl_patchLevel",
    "tcl_pkgPath",
    "tcl_platform",
    "tcl_rcFileName",
    "tcl_version",
];

// ── State ─────────────────────────────────────────────────────────────────────

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Interpreter allocated, not yet initialised.
    Fresh,
    /// Accepting evaluations.
    Ready,
    /// A host command asked for process exit; the evaluation that ran it
    /// has not finished yet.
    Exiting,
}

/// Exit requested by a host command during the evaluation at `depth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingExit {
    pub status: i32,
    pub depth: usize,
}

/// How `try_eval` treats a `Tcl_EvalEx` completion code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Ok,
    Error,
    /// Anything else.  `Tcl_EvalEx` folds top-level `return`, `break`,
    /// `continue` and custom codes into `TCL_OK`/`TCL_ERROR` itself, so this
    /// only shows up with a library that does not.
    Other(c_int),
}

impl Completion {
    fn from_code(code: c_int) -> Self {
        match code {
            TCL_OK => Completion::Ok,
            TCL_ERROR => Completion::Error,
            other => Completion::Other(other),
        }
    }
}

/// Names present right after initialisation.
#[derive(Debug, Default)]
struct Builtins {
    procs: HashSet<String>,
    vars: HashSet<String>,
}

// ── Inner ─────────────────────────────────────────────────────────────────────

pub(crate) struct Inner {
    pub(crate) api: &'static TclApi,
    raw: NonNull<Tcl_Interp>,
    state: Cell<State>,
    safe: Cell<bool>,
    /// Number of `eval` calls currently on the stack.
    depth: Cell<usize>,
    pending_exit: Cell<Option<PendingExit>>,
    /// `Weak<Inner>` handed to Tcl as the command's client data.
    client_data: Cell<*const Inner>,
    commands: CommandTable<Interp>,
    builtins: OnceCell<Builtins>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("deleting Tcl interpreter");
        let raw = self.raw.as_ptr();
        // SAFETY: the handle was preserved exactly once in `Interp::with_config`.
        unsafe {
            (self.api.delete_interp)(raw);
            (self.api.release)(raw.cast());
        }
        let client_data = self.client_data.replace(std::ptr::null());
        if !client_data.is_null() {
            // SAFETY: produced by `Weak::into_raw` in `register_send_command`;
            // Tcl can no longer call the command.
            drop(unsafe { Weak::from_raw(client_data) });
        }
    }
}

/// Restores the evaluation depth when an `eval` returns.
struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

// ── Interp ────────────────────────────────────────────────────────────────────

/// Handle to one Tcl interpreter session.
///
/// Cloning yields another handle to the same interpreter.
#[derive(Clone)]
pub struct Interp {
    inner: Rc<Inner>,
}

impl std::fmt::Debug for Interp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interp")
            .field("state", &self.inner.state.get())
            .field("safe", &self.inner.safe.get())
            .field("depth", &self.inner.depth.get())
            .finish_non_exhaustive()
    }
}

impl Interp {
    /// A session configured from the environment (see [`Config::from_env`]).
    pub fn new() -> Result<Self> {
        Self::with_config(&Config::from_env())
    }

    /// A session restricted to Tcl's safe command subset.
    pub fn new_safe() -> Result<Self> {
        Self::with_config(&Config::from_env().safe(true))
    }

    pub fn with_config(config: &Config) -> Result<Self> {
        let api = ffi::load(config)?;
        // SAFETY: plain constructor calls on a freshly created handle.
        let raw = NonNull::new(unsafe { (api.create_interp)() }).ok_or(Error::CreateFailed)?;
        unsafe {
            if (api.init)(raw.as_ptr()) != TCL_OK {
                warn!(
                    error = %ffi::result_string(api, raw.as_ptr()),
                    "Tcl_Init failed; continuing without the script library"
                );
            }
            (api.preserve)(raw.as_ptr().cast());
        }

        let interp = Interp {
            inner: Rc::new(Inner {
                api,
                raw,
                state: Cell::new(State::Fresh),
                safe: Cell::new(false),
                depth: Cell::new(0),
                pending_exit: Cell::new(None),
                client_data: Cell::new(std::ptr::null()),
                commands: CommandTable::new(),
                builtins: OnceCell::new(),
            }),
        };
        interp.register_send_command();

        let builtins = Builtins {
            procs: interp.procs()?.into_iter().collect(),
            vars: interp.vars()?.into_iter().collect(),
        };
        let first = interp.inner.builtins.set(builtins).is_ok();
        debug_assert!(first, "builtins snapshot taken twice");

        if config.is_safe() {
            interp.make_safe()?;
        }
        interp.inner.state.set(State::Ready);
        debug!(safe = interp.is_safe(), "Tcl interpreter ready");
        Ok(interp)
    }

    fn register_send_command(&self) {
        let client_data = Weak::into_raw(Rc::downgrade(&self.inner));
        self.inner.client_data.set(client_data);
        // SAFETY: `client_data` stays valid until `Inner::drop`, which deletes
        // the interpreter (and with it the command) before reclaiming it.
        unsafe {
            (self.api().create_obj_command)(
                self.raw(),
                SEND_COMMAND_C.as_ptr(),
                Some(dispatch::interp_send),
                client_data as ClientData,
                None,
            );
        }
    }

    pub(crate) fn from_inner(inner: Rc<Inner>) -> Self {
        Self { inner }
    }

    pub(crate) fn api(&self) -> &'static TclApi {
        self.inner.api
    }

    fn raw(&self) -> *mut Tcl_Interp {
        self.inner.raw.as_ptr()
    }

    pub(crate) fn commands(&self) -> &CommandTable<Interp> {
        &self.inner.commands
    }

    pub fn state(&self) -> State {
        self.inner.state.get()
    }

    pub fn is_safe(&self) -> bool {
        self.inner.safe.get()
    }

    /// Hide Tcl's unsafe commands (`exit`, `open`, `exec`, …).  One way:
    /// there is no call to undo it.  Host commands stay reachable.
    pub fn make_safe(&self) -> Result<()> {
        if self.is_safe() {
            return Ok(());
        }
        // SAFETY: live handle owned by this session.
        if unsafe { (self.api().make_safe)(self.raw()) } != TCL_OK {
            return Err(Error::Eval(self.result()));
        }
        self.inner.safe.set(true);
        debug!("Tcl interpreter made safe");
        Ok(())
    }

    /// The interpreter's current result string.
    pub fn result(&self) -> String {
        // SAFETY: live handle owned by this session.
        unsafe { ffi::result_string(self.api(), self.raw()) }
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    /// Evaluate `script` and return its result.
    ///
    /// Fails with [`Error::Eval`] carrying Tcl's error text.  Completion
    /// codes other than `TCL_OK`/`TCL_ERROR` yield an empty string (see
    /// [`Interp::try_eval`]).
    ///
    /// If a host command run by this script requested process exit and
    /// the script ends in error, the process exits with that status and
    /// this never returns.
    pub fn eval(&self, script: &str) -> Result<String> {
        Ok(self.try_eval(script)?.unwrap_or_default())
    }

    /// Like [`Interp::eval`], but `None` for unrecognised completion codes.
    ///
    /// Tcl 8.5/8.6 never hands such a code back from a top-level
    /// evaluation (`return -code break` is reported as an error), so `None`
    /// is only expected from non-standard builds.
    pub fn try_eval(&self, script: &str) -> Result<Option<String>> {
        let inner = &*self.inner;
        let depth = inner.depth.get() + 1;
        inner.depth.set(depth);
        let _depth = DepthGuard(&inner.depth);
        trace!(depth, len = script.len(), "eval");

        let bytes = ffi::to_tcl_bytes(script);
        // SAFETY: live handle; the script is passed with its byte length.
        let code = unsafe {
            (inner.api.eval_ex)(self.raw(), bytes.as_ptr().cast(), ffi::byte_len(&bytes), 0)
        };
        match Completion::from_code(code) {
            Completion::Ok => {
                self.discard_exit(depth);
                Ok(Some(self.result()))
            }
            Completion::Error => {
                if let Some(exit) = self.take_exit(depth) {
                    self.terminate(exit.status);
                }
                Err(Error::Eval(self.result()))
            }
            Completion::Other(other) => {
                warn!(code = other, status = ffi::status_name(other), "unexpected completion code from Tcl_EvalEx");
                self.discard_exit(depth);
                Ok(None)
            }
        }
    }

    /// Evaluate the command formed by `words` (quoted as a list, so each
    /// word arrives as exactly one argument).
    pub fn invoke<I>(&self, words: I) -> Result<String>
    where
        I: IntoIterator,
        I::Item: Word,
    {
        self.eval(&self.array_to_list(words))
    }

    // ── Exit requests ─────────────────────────────────────────────────────────

    /// Called by the dispatch bridge when a handler returns `Exit`.
    pub(crate) fn record_exit(&self, status: i32) {
        let depth = self.inner.depth.get();
        debug!(status, depth, "host command requested exit");
        self.inner.pending_exit.set(Some(PendingExit { status, depth }));
        self.inner.state.set(State::Exiting);
    }

    /// Take the pending exit if it was raised at `depth` or deeper.
    fn take_exit(&self, depth: usize) -> Option<PendingExit> {
        match self.inner.pending_exit.get() {
            Some(exit) if exit.depth >= depth => {
                self.inner.pending_exit.set(None);
                Some(exit)
            }
            _ => None,
        }
    }

    /// The script at `depth` completed without error, so any exit request
    /// raised inside it was caught.
    fn discard_exit(&self, depth: usize) {
        if let Some(exit) = self.take_exit(depth) {
            debug!(status = exit.status, depth, "exit request caught by script");
            self.inner.state.set(State::Ready);
        }
    }

    fn terminate(&self, status: i32) -> ! {
        self.inner.state.set(State::Exiting);
        info!(status, "exiting at the request of a host command");
        std::process::exit(status)
    }

    // ── Lists ─────────────────────────────────────────────────────────────────

    /// Split a Tcl list into its elements; `None` if `list` is malformed.
    pub fn list_to_array(&self, list: &str) -> Option<Vec<String>> {
        // SAFETY: live handle owned by this session.
        unsafe { list::list_to_array(self.api(), self.raw(), list) }
    }

    /// Quote `words` as a Tcl list.
    pub fn array_to_list<I>(&self, words: I) -> String
    where
        I: IntoIterator,
        I::Item: Word,
    {
        // SAFETY: live handle owned by this session.
        unsafe { list::array_to_list(self.api(), self.raw(), words) }
    }

    // ── Host commands ─────────────────────────────────────────────────────────

    /// Make `handler` callable from Tcl as `name`.
    ///
    /// Tcl's `name` becomes an alias for `interp_send name`, so the handler
    /// receives every argument after the command name.  Re-exposing a name
    /// replaces its handler.
    pub fn expose<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&Interp, &[String]) -> CommandResult + 'static,
    {
        self.register(name, handler)?;
        if let Err(e) = self.invoke(["interp", "alias", "", name, "", SEND_COMMAND, name]) {
            self.commands().remove(name);
            return Err(e);
        }
        Ok(())
    }

    /// Make `handler` reachable as `interp_send name …` without creating a
    /// Tcl command called `name`.
    pub fn register<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&Interp, &[String]) -> CommandResult + 'static,
    {
        if name.contains('\0') {
            return Err(Error::InvalidName(name.to_owned()));
        }
        if self.commands().insert(name, Rc::new(handler)) {
            debug!(name, "replaced host command");
        }
        Ok(())
    }

    /// Remove a host command and its Tcl alias.  Returns `false` if no
    /// such host command was registered.
    pub fn unexpose(&self, name: &str) -> Result<bool> {
        if !self.commands().remove(name) {
            return Ok(false);
        }
        // The alias may already be gone (renamed or deleted by a script).
        let delete = self.array_to_list(["interp", "alias", "", name, ""]);
        self.invoke(["catch", delete.as_str()])?;
        Ok(true)
    }

    /// Handle `interp_send` words that name no registered command.  The
    /// handler receives all words, the name first.
    pub fn set_receiver<F>(&self, handler: F)
    where
        F: Fn(&Interp, &[String]) -> CommandResult + 'static,
    {
        self.commands().set_fallback(Some(Rc::new(handler)));
    }

    pub fn clear_receiver(&self) {
        self.commands().set_fallback(None);
    }

    /// Names of registered host commands, sorted.
    pub fn host_commands(&self) -> Vec<String> {
        self.commands().names()
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// Names of global procedures.
    pub fn procs(&self) -> Result<Vec<String>> {
        self.list_result("info procs")
    }

    /// Names of global variables.
    pub fn vars(&self) -> Result<Vec<String>> {
        self.list_result("info vars")
    }

    fn list_result(&self, script: &str) -> Result<Vec<String>> {
        let list = self.eval(script)?;
        Ok(self.list_to_array(&list).unwrap_or_default())
    }

    pub(crate) fn is_builtin_proc(&self, name: &str) -> bool {
        self.inner.builtins.get().is_some_and(|b| b.procs.contains(name))
    }

    pub(crate) fn is_builtin_var(&self, name: &str) -> bool {
        TCL_GLOBALS.contains(&name) || self.inner.builtins.get().is_some_and(|b| b.vars.contains(name))
    }

    fn var_exists(&self, name: &str) -> Result<bool> {
        Ok(self.invoke(["info", "exists", name])? == "1")
    }

    /// Script recreating every user-defined variable and procedure:
    /// variables first, then procedures, each sorted by name.  Variables
    /// that are declared but hold no value are skipped.
    pub fn to_tcl(&self) -> Result<String> {
        let mut lines = Vec::new();

        let mut vars = self.vars()?;
        vars.sort();
        for name in vars {
            if self.is_builtin_var(&name) || !self.var_exists(&name)? {
                continue;
            }
            lines.push(self.var(&name)?.to_tcl()?);
        }

        let mut procs = self.procs()?;
        procs.sort();
        for name in procs {
            let proc = self.proc(&name)?;
            if proc.is_builtin() {
                continue;
            }
            lines.push(proc.to_tcl()?);
        }

        Ok(lines.join("\n"))
    }

    // ── Script files ──────────────────────────────────────────────────────────

    /// Read every file, join them with newlines and evaluate the result.
    pub fn load_from_file<P: AsRef<Path>>(&self, paths: impl IntoIterator<Item = P>) -> Result<String> {
        let mut script = String::new();
        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path)
                .map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
            script.push_str(&content);
            script.push('\n');
        }
        debug!(len = script.len(), "loading script files");
        self.eval(&script)
    }

    /// A new session with `paths` already loaded.
    pub fn from_files<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Self> {
        let interp = Self::new()?;
        interp.load_from_file(paths)?;
        Ok(interp)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
