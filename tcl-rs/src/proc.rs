//! Named Tcl procedures.
//!
//! A [`Proc`] is a handle to a global procedure in a session: it can be
//! inspected (`info args` / `info body` / `info default`), called, and
//! serialised back to the `proc` command that would recreate it.

use std::borrow::Cow;

use crate::error::Result;
use crate::interp::Interp;
use crate::list::Word;

/// Evaluated with `apply`: `1 value` if the argument has a default, else `0`.
const DEFAULT_LAMBDA: &str =
    "{proc arg} {if {[info default $proc $arg value]} {list 1 $value} else {list 0}}";

/// A global procedure of a particular session.
#[derive(Debug, Clone)]
pub struct Proc {
    interp: Interp,
    name: String,
}

impl Interp {
    /// Look up a procedure.  Fails with Tcl's own error if `name` is not
    /// a procedure.
    pub fn proc(&self, name: &str) -> Result<Proc> {
        self.invoke(["info", "args", name])?;
        Ok(Proc { interp: self.clone(), name: name.to_owned() })
    }

    /// Define (or redefine) a procedure and return a handle to it.
    pub fn define_proc<I>(&self, name: &str, params: I, body: &str) -> Result<Proc>
    where
        I: IntoIterator,
        I::Item: Word,
    {
        let params = self.array_to_list(params);
        self.invoke(["proc", name, params.as_str(), body])?;
        self.proc(name)
    }
}

impl Proc {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter names, in order.
    pub fn args(&self) -> Result<Vec<String>> {
        let list = self.interp.invoke(["info", "args", self.name.as_str()])?;
        Ok(self.interp.list_to_array(&list).unwrap_or_default())
    }

    pub fn body(&self) -> Result<String> {
        self.interp.invoke(["info", "body", self.name.as_str()])
    }

    /// Default value of parameter `arg`, if it has one.
    pub fn default(&self, arg: &str) -> Result<Option<String>> {
        let out = self.interp.invoke(["apply", DEFAULT_LAMBDA, self.name.as_str(), arg])?;
        let parts = self.interp.list_to_array(&out).unwrap_or_default();
        Ok(match parts.as_slice() {
            [flag, value] if flag == "1" => Some(value.clone()),
            _ => None,
        })
    }

    /// Call the procedure with `args`, each passed as one argument.
    pub fn call<I>(&self, args: I) -> Result<String>
    where
        I: IntoIterator,
        I::Item: Word,
    {
        let words = std::iter::once(Cow::Borrowed(self.name.as_str()))
            .chain(args.into_iter().map(|a| Cow::Owned(a.to_word().into_owned())));
        self.interp.invoke(words)
    }

    /// The `proc` command that recreates this procedure, defaults included.
    pub fn to_tcl(&self) -> Result<String> {
        let mut params = Vec::new();
        for arg in self.args()? {
            match self.default(&arg)? {
                Some(value) => params.push(self.interp.array_to_list([arg.as_str(), value.as_str()])),
                None => params.push(arg),
            }
        }
        let params = self.interp.array_to_list(&params);
        let body = self.body()?;
        Ok(self.interp.array_to_list(["proc", self.name.as_str(), params.as_str(), body.as_str()]))
    }

    /// Whether the procedure comes with Tcl: present when the session was
    /// created, or loadable on demand through `auto_index`.
    pub fn is_builtin(&self) -> bool {
        if self.interp.is_builtin_proc(&self.name) {
            return true;
        }
        let index = format!("::auto_index({})", self.name);
        matches!(self.interp.invoke(["info", "exists", index.as_str()]).as_deref(), Ok("1"))
    }
}
