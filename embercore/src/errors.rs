//! Error kinds (§7).
//!
//! Two distinct error surfaces exist:
//! - [`ExceptionKind`] / the language-level exception objects raised and
//!   caught *inside* the interpreter (propagated via the frame's value stack
//!   and block stack, never as a Rust `Result`).
//! - [`VmError`], the Rust-facing error returned by host-boundary APIs
//!   (`bind_func`/`bind_method` callbacks invoked with no live frame, and
//!   other construction-time failures). See §7 "native layer with no live
//!   frame propagate as host-native exceptions".

use std::fmt::{Display, Formatter};

/// The built-in exception kinds named in §7.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ExceptionKind {
	Exception,
	TypeError,
	ValueError,
	IndexError,
	KeyError,
	AttributeError,
	NameError,
	ZeroDivisionError,
	OverflowError,
	IoError,
	RecursionError,
	NotImplementedError,
}

impl ExceptionKind {
	pub const ALL: [ExceptionKind; 12] = [
		ExceptionKind::Exception,
		ExceptionKind::TypeError,
		ExceptionKind::ValueError,
		ExceptionKind::IndexError,
		ExceptionKind::KeyError,
		ExceptionKind::AttributeError,
		ExceptionKind::NameError,
		ExceptionKind::ZeroDivisionError,
		ExceptionKind::OverflowError,
		ExceptionKind::IoError,
		ExceptionKind::RecursionError,
		ExceptionKind::NotImplementedError,
	];

	pub fn name(self) -> &'static str {
		match self {
			ExceptionKind::Exception => "Exception",
			ExceptionKind::TypeError => "TypeError",
			ExceptionKind::ValueError => "ValueError",
			ExceptionKind::IndexError => "IndexError",
			ExceptionKind::KeyError => "KeyError",
			ExceptionKind::AttributeError => "AttributeError",
			ExceptionKind::NameError => "NameError",
			ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
			ExceptionKind::OverflowError => "OverflowError",
			ExceptionKind::IoError => "IOError",
			ExceptionKind::RecursionError => "RecursionError",
			ExceptionKind::NotImplementedError => "NotImplementedError",
		}
	}
}

impl Display for ExceptionKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

/// One frame of a traceback snapshot (§4.D `Frame::snapshot`).
#[derive(Debug, Clone)]
pub struct TracebackEntry {
	pub filename: String,
	pub line: i32,
	pub function: String,
}

impl Display for TracebackEntry {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "  File \"{}\", line {}, in {}", self.filename, self.line, self.function)
	}
}

/// A raised-but-not-yet-language-object exception, carried by the
/// interpreter's internal control flow (§4.H raise logic) before it is boxed
/// into a `Value` on a frame's stack.
#[derive(Debug, Clone)]
pub struct RaisedException {
	pub kind: ExceptionKind,
	pub message: String,
	pub traceback: Vec<TracebackEntry>,
}

impl RaisedException {
	pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
		RaisedException { kind, message: message.into(), traceback: Vec::new() }
	}

	/// The one-line summary `exec` writes to the error sink (§7 "rendered to
	/// the error sink with summary + traceback").
	pub fn summary(&self) -> String {
		format!("{}: {}", self.kind, self.message)
	}
}

impl Display for RaisedException {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		writeln!(f, "Traceback (most recent call last):")?;
		for entry in &self.traceback {
			writeln!(f, "{entry}")?;
		}
		write!(f, "{}", self.summary())
	}
}

/// Host-facing failures that are not language-level exceptions.
#[derive(Debug)]
pub enum VmError {
	/// A native callback raised while no frame was live (§7 "documented as
	/// bugs if seen in steady state").
	NativeEscape(RaisedException),
	/// `bind_func`/`bind_method` was asked to register an arity the native
	/// function table does not support.
	UnsupportedArity(usize),
	/// A module name collided with an already-registered module.
	DuplicateModule(String),
}

impl Display for VmError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			VmError::NativeEscape(e) => write!(f, "unhandled exception escaped native call: {}", e.summary()),
			VmError::UnsupportedArity(n) => write!(f, "unsupported native function arity: {n}"),
			VmError::DuplicateModule(name) => write!(f, "module already registered: {name}"),
		}
	}
}

impl std::error::Error for VmError {}

impl From<RaisedException> for VmError {
	fn from(value: RaisedException) -> Self {
		VmError::NativeEscape(value)
	}
}
