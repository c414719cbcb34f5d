//! Named Tcl variables.
//!
//! A [`Var`] is a handle to a global variable, scalar or array.  Its value
//! is read fresh from the interpreter on every call.

use crate::error::Result;
use crate::interp::Interp;

/// Whether a variable holds one value or an associative array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Scalar,
    Array,
}

/// A global variable of a particular session.
#[derive(Debug, Clone)]
pub struct Var {
    interp: Interp,
    name: String,
    kind: VarKind,
}

impl Interp {
    /// Look up a global variable.  Fails with Tcl's own error if it does
    /// not exist.
    pub fn var(&self, name: &str) -> Result<Var> {
        let kind = if self.invoke(["array", "exists", name])? == "1" {
            VarKind::Array
        } else {
            // Reports "can't read ...: no such variable" for unset names.
            self.invoke(["set", name])?;
            VarKind::Scalar
        };
        Ok(Var { interp: self.clone(), name: name.to_owned(), kind })
    }

    /// Set a scalar global variable and return a handle to it.
    pub fn set_var(&self, name: &str, value: &str) -> Result<Var> {
        self.invoke(["set", name, value])?;
        self.var(name)
    }
}

impl Var {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VarKind {
        self.kind
    }

    /// The scalar value, or for arrays the `array get` key/value list.
    pub fn value(&self) -> Result<String> {
        match self.kind {
            VarKind::Scalar => self.interp.invoke(["set", self.name.as_str()]),
            VarKind::Array => self.interp.invoke(["array", "get", self.name.as_str()]),
        }
    }

    /// Array elements sorted by key; empty for scalars.
    pub fn elements(&self) -> Result<Vec<(String, String)>> {
        if self.kind == VarKind::Scalar {
            return Ok(Vec::new());
        }
        let flat = self.interp.list_to_array(&self.value()?).unwrap_or_default();
        let mut pairs: Vec<(String, String)> = flat
            .chunks_exact(2)
            .map(|kv| (kv[0].clone(), kv[1].clone()))
            .collect();
        pairs.sort();
        Ok(pairs)
    }

    /// The command that recreates this variable: `set name value` or
    /// `array set name {key value ...}` (keys sorted).
    pub fn to_tcl(&self) -> Result<String> {
        let name = self.name.as_str();
        Ok(match self.kind {
            VarKind::Scalar => {
                let value = self.value()?;
                self.interp.array_to_list(["set", name, value.as_str()])
            }
            VarKind::Array => {
                let flat: Vec<String> = self
                    .elements()?
                    .into_iter()
                    .flat_map(|(k, v)| [k, v])
                    .collect();
                let contents = self.interp.array_to_list(&flat);
                self.interp.array_to_list(["array", "set", name, contents.as_str()])
            }
        })
    }

    /// Whether Tcl itself defines the variable.
    pub fn is_builtin(&self) -> bool {
        self.interp.is_builtin_var(&self.name)
    }
}
