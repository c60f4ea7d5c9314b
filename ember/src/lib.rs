//! Ember Interpreter Library
//!
//! A small dynamically typed scripting language evaluated straight from
//! its token stream.

pub mod block;
pub mod config;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod repl;
pub mod util;

pub use config::EngineConfig;
pub use error::{ErrorKind, Result, ScriptError};
pub use interp::{Interpreter, Signal, Value};
