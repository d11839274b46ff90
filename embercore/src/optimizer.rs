//! Bytecode peephole optimizer (§4.J). Runs once, after a `CodeObject` is
//! fully assembled and before it is ever executed.
//!
//! Three independent passes: constant-folding unary negation, fusing a
//! common two-name index load into a single fused opcode, and precomputing
//! the locals table's perfect-hash parameters so the frame loop never has
//! to search for a seed at call time.

use crate::attrdict::AttrDict;
use crate::code::{CodeObject, Instruction, NameScope, Opcode};
use crate::intern::NameId;
use crate::value::Value;

/// Runs every pass over `code` in place. Idempotent: running it twice has
/// no further effect, since a fused/folded instruction no longer matches
/// any pass's trigger pattern.
pub fn optimize(code: &mut CodeObject) {
	fold_constant_negation(code);
	fuse_index_loads(code);
	precompute_locals_hash(code);
}

/// `LOAD_CONST c; UNARY_NEGATIVE` → `LOAD_CONST (-c)`, for the numeric
/// constants that have a well-defined negation. Leaves jump targets valid
/// by rewriting the first instruction in place and turning the second into
/// a `NoOp` rather than shifting later instructions' indices.
fn fold_constant_negation(code: &mut CodeObject) {
	let len = code.instructions.len();
	let mut i = 0;
	while i + 1 < len {
		let (load, neg) = (code.instructions[i], code.instructions[i + 1]);
		if load.opcode() == Opcode::LoadConst && neg.opcode() == Opcode::UnaryNegative {
			if let Some(folded) = negate_const(&code.consts[load.arg as usize]) {
				let const_index = code.consts.len();
				code.consts.push(folded);
				code.instructions[i].arg = const_index as i32;
				code.instructions[i + 1] = Instruction { op: Opcode::NoOp as u8, arg: 0, line: neg.line, block: neg.block };
				i += 2;
				continue;
			}
		}
		i += 1;
	}
}

fn negate_const(value: &Value) -> Option<Value> {
	match value {
		Value::Int(v) => Value::int(-v).ok(),
		Value::Float(v) => Some(Value::float(-v)),
		Value::Obj(_) => None,
	}
}

/// `LOAD_NAME a; LOAD_NAME b; BUILD_INDEX 1` → `FAST_INDEX`, storing `a`'s
/// interned id in `arg` and `b`'s in the otherwise-unused `block` field
/// (§4.J: fused ops never participate in block-stack bookkeeping, so the
/// field is free to repurpose). Only fires when both loads and the index
/// are contiguous and the index arity is exactly 1.
fn fuse_index_loads(code: &mut CodeObject) {
	let len = code.instructions.len();
	let mut i = 0;
	while i + 2 < len {
		let (a, b, idx) = (code.instructions[i], code.instructions[i + 1], code.instructions[i + 2]);
		let is_load = |op: Opcode| matches!(op, Opcode::LoadName | Opcode::LoadNameRef);
		if is_load(a.opcode()) && is_load(b.opcode()) && idx.opcode() == Opcode::BuildIndex && idx.arg == 1 {
			let name_a = code.names[a.arg as usize].name;
			let name_b = code.names[b.arg as usize].name;
			code.instructions[i] = Instruction { op: Opcode::FastIndex as u8, arg: name_a.index() as i32, block: name_b.index() as i32, line: idx.line };
			code.instructions[i + 1] = Instruction { op: Opcode::NoOp as u8, arg: 0, line: b.line, block: b.block };
			code.instructions[i + 2] = Instruction { op: Opcode::NoOp as u8, arg: 0, line: idx.line, block: idx.block };
			i += 3;
			continue;
		}
		i += 1;
	}
}

/// Builds a throwaway `AttrDict` over the code's declared local names and
/// asks it to perfect itself, caching the resulting `(capacity, seed)` on
/// the code object so a fresh `Frame`'s locals dict can go straight to
/// perfect-hash mode instead of starting in hashmap mode and rehashing
/// later (§4.C, §4.J).
fn precompute_locals_hash(code: &CodeObject) {
	let names: Vec<NameId> = code.local_names().collect();
	if names.is_empty() {
		return;
	}

	let mut probe = AttrDict::new();
	for (i, name) in names.iter().enumerate() {
		probe.set(*name, Value::int(i as i64).unwrap_or(Value::Int(0)));
	}
	probe.try_perfect_rehash(crate::attrdict::DEFAULT_LOAD_FACTOR);

	if let Some((capacity, seed)) = probe.perfect_params() {
		code.perfect_locals_capacity.set(capacity);
		code.perfect_hash_seed.set(seed);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::code::{CodeObject, NameEntry};
	use crate::intern::Interner;

	fn instr(op: Opcode, arg: i32) -> Instruction {
		Instruction { op: op as u8, arg, line: 1, block: -1 }
	}

	#[test]
	fn negation_of_constant_int_is_folded_away() {
		let mut code = CodeObject::new("<test>", "f");
		code.consts.push(Value::int(5).unwrap());
		code.instructions.push(instr(Opcode::LoadConst, 0));
		code.instructions.push(instr(Opcode::UnaryNegative, 0));

		optimize(&mut code);

		assert_eq!(code.instructions[0].opcode(), Opcode::LoadConst);
		assert_eq!(code.consts[code.instructions[0].arg as usize].as_int(), Some(-5));
		assert_eq!(code.instructions[1].opcode(), Opcode::NoOp);
	}

	#[test]
	fn two_loads_and_build_index_one_fuse_into_fast_index() {
		let mut interner = Interner::new();
		let container = interner.intern("xs");
		let index = interner.intern("i");

		let mut code = CodeObject::new("<test>", "f");
		code.names.push(NameEntry { name: container, scope: NameScope::Global });
		code.names.push(NameEntry { name: index, scope: NameScope::Global });
		code.instructions.push(instr(Opcode::LoadName, 0));
		code.instructions.push(instr(Opcode::LoadName, 1));
		code.instructions.push(instr(Opcode::BuildIndex, 1));

		optimize(&mut code);

		assert_eq!(code.instructions[0].opcode(), Opcode::FastIndex);
		assert_eq!(code.instructions[0].arg, container.index() as i32);
		assert_eq!(code.instructions[0].block, index.index() as i32);
		assert_eq!(code.instructions[1].opcode(), Opcode::NoOp);
		assert_eq!(code.instructions[2].opcode(), Opcode::NoOp);
	}

	#[test]
	fn locals_hash_is_precomputed_when_locals_exist() {
		let mut interner = Interner::new();
		let a = interner.intern("a");
		let b = interner.intern("b");

		let mut code = CodeObject::new("<test>", "f");
		code.names.push(NameEntry { name: a, scope: NameScope::Local });
		code.names.push(NameEntry { name: b, scope: NameScope::Local });

		optimize(&mut code);
		assert!(code.perfect_locals_capacity.get() > 0);
	}
}
