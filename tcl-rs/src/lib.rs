//! Embed a Tcl interpreter and let its scripts call back into Rust.
//!
//! | Module       | Role                                                     |
//! |--------------|----------------------------------------------------------|
//! | [`ffi`]      | Tcl C API entry points, loaded from `libtcl` at runtime  |
//! | [`obj`]      | scoped reference counting of `Tcl_Obj` values            |
//! | [`list`]     | Rust strings ⇄ Tcl list literals                         |
//! | [`interp`]   | [`Interp`] sessions: `eval`, lists, host commands        |
//! | [`dispatch`] | the `interp_send` command and host command routing       |
//! | [`proc`]     | named procedures ([`Proc`])                              |
//! | [`var`]      | named variables ([`Var`])                                |
//! | [`config`]   | library location and safe mode                           |
//!
//! ```no_run
//! use tcl::{CommandError, Interp};
//!
//! let interp = Interp::new()?;
//! interp.expose("add", |_, args| {
//!     let sum: i64 = args
//!         .iter()
//!         .map(|a| a.parse::<i64>().map_err(|e| CommandError::failed(e.to_string())))
//!         .sum::<Result<i64, _>>()?;
//!     Ok(sum.to_string())
//! })?;
//! assert_eq!(interp.eval("add 1 2 3")?, "6");
//! # Ok::<(), tcl::Error>(())
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ffi;
pub mod interp;
pub mod list;
pub mod obj;
pub mod proc;
pub mod var;

pub use config::Config;
pub use dispatch::{CommandError, CommandResult};
pub use error::{Error, LoadError, Result};
pub use interp::{Interp, State, SEND_COMMAND};
pub use list::Word;
pub use proc::Proc;
pub use var::{Var, VarKind};
