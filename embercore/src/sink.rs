//! Configurable text sinks for standard out/err (§6 "Configurable text sinks
//! for standard out/err; when the host opts out of system stdio, the VM owns
//! in-memory sinks").
//!
//! Grounded on `original_source/src/vm.h`'s `VM::use_stdio`/`_stdout`/
//! `_stderr`: a host constructing a VM with `use_stdio = true` gets the
//! process's real stdout/stderr; one opting out gets a `StrStream`-equivalent
//! in-memory buffer the host can read back out.

use std::cell::RefCell;
use std::io::Write;

/// One of a VM's two text sinks. `Stdio` writes straight through to the
/// process's real stdout/stderr; `Memory` appends to an owned buffer instead,
/// for hosts that embed the VM without a real console (the original's
/// `StrStream` fallback).
#[derive(Debug)]
pub enum Sink {
	Stdio,
	Memory(RefCell<String>),
}

impl Sink {
	pub fn memory() -> Self {
		Sink::Memory(RefCell::new(String::new()))
	}

	/// Writes `text` to this sink. `is_err` selects stdout vs. stderr when
	/// this sink is `Stdio`; `Memory` sinks don't distinguish the two (each
	/// kind of in-memory sink is itself already stdout-only or stderr-only,
	/// by virtue of which field of `Vm` it's stored in).
	pub fn write(&self, text: &str, is_err: bool) {
		match self {
			Sink::Stdio => {
				if is_err {
					let _ = write!(std::io::stderr(), "{text}");
				} else {
					let _ = write!(std::io::stdout(), "{text}");
				}
			}
			Sink::Memory(buf) => buf.borrow_mut().push_str(text),
		}
	}

	/// The accumulated text of a `Memory` sink; `None` for `Stdio` (the host
	/// has no handle back into the real console's history).
	pub fn contents(&self) -> Option<String> {
		match self {
			Sink::Stdio => None,
			Sink::Memory(buf) => Some(buf.borrow().clone()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn memory_sink_accumulates_writes() {
		let sink = Sink::memory();
		sink.write("hello ", true);
		sink.write("world", true);
		assert_eq!(sink.contents().as_deref(), Some("hello world"));
	}

	#[test]
	fn stdio_sink_has_no_readable_contents() {
		let sink = Sink::Stdio;
		assert_eq!(sink.contents(), None);
	}
}
