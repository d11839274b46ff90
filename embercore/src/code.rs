//! `CodeObject` wire shape (§6) — the opaque structure the (out-of-scope)
//! compiler hands the VM. Nothing here parses bytes off a wire: the
//! compiler and this runtime share a process, so the "wire shape" is simply
//! the Rust struct layout a compiler crate would populate directly.

use std::cell::Cell;

use embercore_derive::FromRepr;

use crate::intern::NameId;
use crate::value::Value;

/// The opcodes this core's frame loop and optimizer care about directly.
/// A full language would have many more; everything not touched by §4.H's
/// control-flow contract or §4.J's peepholes is out of scope (spec §1) and
/// is represented here only as `Generic` so the frame loop can still step
/// over it uniformly.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, FromRepr)]
pub enum Opcode {
	NoOp = 0,
	LoadConst = 1,
	LoadName = 2,
	LoadNameRef = 3,
	StoreName = 4,
	BuildIndex = 5,
	FastIndex = 6,
	UnaryNegative = 7,
	Call = 8,
	Return = 9,
	Yield = 10,
	Jump = 11,
	JumpIfFalse = 12,
	PushTryBlock = 13,
	PushLoopBlock = 14,
	PopBlock = 15,
	Raise = 16,
	/// Placeholder for every opcode outside this core's scope (§1).
	Generic = 255,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Instruction {
	pub op: u8,
	pub arg: i32,
	pub line: i32,
	pub block: i32,
}

impl Instruction {
	pub fn opcode(&self) -> Opcode {
		Opcode::from_repr(self.op).unwrap_or(Opcode::Generic)
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NameScope {
	Local,
	Global,
	Cell,
}

#[derive(Debug, Copy, Clone)]
pub struct NameEntry {
	pub name: NameId,
	pub scope: NameScope,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BlockKind {
	Loop,
	Try,
}

/// A static block-table entry (§3 "block table"). `handler_ip` is only
/// meaningful for `Try` blocks; it is the instruction a raise inside this
/// block's range transfers control to.
#[derive(Debug, Copy, Clone)]
pub struct CodeBlock {
	pub kind: BlockKind,
	pub start: usize,
	pub end: usize,
	pub handler_ip: usize,
}

#[derive(Debug)]
pub struct CodeObject {
	pub filename: String,
	pub name: String,
	pub instructions: Vec<Instruction>,
	pub consts: Vec<Value>,
	pub names: Vec<NameEntry>,
	pub blocks: Vec<CodeBlock>,
	pub is_generator: bool,
	/// Populated by the optimizer (§4.J), zero beforehand.
	pub perfect_locals_capacity: Cell<usize>,
	pub perfect_hash_seed: Cell<u64>,
}

impl CodeObject {
	pub fn new(filename: impl Into<String>, name: impl Into<String>) -> Self {
		CodeObject {
			filename: filename.into(),
			name: name.into(),
			instructions: Vec::new(),
			consts: Vec::new(),
			names: Vec::new(),
			blocks: Vec::new(),
			is_generator: false,
			perfect_locals_capacity: Cell::new(0),
			perfect_hash_seed: Cell::new(0),
		}
	}

	pub fn line_at(&self, ip: usize) -> i32 {
		self.instructions.get(ip).map(|i| i.line).unwrap_or(-1)
	}

	/// Local names (`NameScope::Local`), in declaration order, used to size
	/// the locals perfect-hash table (§4.C, §4.J).
	pub fn local_names(&self) -> impl Iterator<Item = NameId> + '_ {
		self.names.iter().filter(|n| n.scope == NameScope::Local).map(|n| n.name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_opcode_byte_decodes_as_generic() {
		let instr = Instruction { op: 254, arg: 0, line: 1, block: -1 };
		assert_eq!(instr.opcode(), Opcode::Generic);
	}

	#[test]
	fn known_opcode_bytes_round_trip() {
		let instr = Instruction { op: Opcode::LoadConst as u8, arg: 0, line: 1, block: -1 };
		assert_eq!(instr.opcode(), Opcode::LoadConst);
	}
}
