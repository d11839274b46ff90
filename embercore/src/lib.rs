//! An embeddable bytecode interpreter core for a dynamic scripting language.
//!
//! The crate's entry points live on [`vm::Vm`]: construct one with a
//! [`config::VmConfig`], register modules and native bindings, and hand it
//! `code::CodeObject`s to run. Everything else (tagged values, the type
//! table, attribute resolution, the frame loop) is the machinery `Vm` wires
//! together; most of it is `pub` so a host can build its own compiler
//! against these types, but `Vm` is the surface meant for everyday use.

pub mod attrdict;
pub mod attrs;
pub mod call;
pub mod code;
pub mod config;
pub mod dunders;
pub mod errors;
pub mod frame;
pub mod generator;
pub mod intern;
mod interp;
pub mod module;
pub mod object;
mod optimizer;
pub mod sink;
pub mod typeops;
pub mod types;
pub mod value;
pub mod vm;

pub use errors::{ExceptionKind, RaisedException, VmError};
pub use value::Value;
pub use vm::Vm;
