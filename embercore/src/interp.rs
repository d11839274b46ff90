//! The frame loop (§4.H): the single driver that steps bytecode for
//! whichever frame sits on top of the VM's global call stack.
//!
//! There is one call stack for the whole VM, shared by every nested
//! `run_frame_loop`/`run_frame_loop_until_yield` invocation. Each invocation
//! only owns the frames pushed at or above its own `base_depth`; a `Return`
//! that drops the stack back to that depth hands the value back to the Rust
//! caller instead of the interpreted caller. An uncaught raise that reaches
//! `base_depth` without finding a `Try` block becomes a plain `Result::Err`
//! — the "`ToBeRaised` cross-boundary sentinel" of §4.H is nothing more than
//! that `Err` propagating through a native function's own `?`.

use std::rc::Rc;

use crate::code::{BlockKind, Opcode};
use crate::errors::{ExceptionKind, RaisedException};
use crate::frame::Frame;
use crate::intern::NameId;
use crate::object::{Object, Payload};
use crate::value::Value;
use crate::vm::Vm;

pub enum FrameStep {
	Yielded(Value),
	Returned(Value),
}

enum Control {
	Continue,
	Returned(Value),
	Yielded(Value),
}

/// Runs frames until the one at `base_depth` (the one `push_frame` just
/// pushed) returns, then yields its value back to the Rust caller.
pub fn run_frame_loop(vm: &mut Vm) -> Result<Value, RaisedException> {
	let base_depth = vm.call_stack.len() - 1;
	loop {
		match execute_one(vm, base_depth)? {
			Control::Continue => {}
			Control::Returned(v) => {
				if vm.call_stack.len() == base_depth {
					return Ok(v);
				}
				vm.call_stack.last().expect("a caller frame remains above base_depth").push(v);
			}
			Control::Yielded(_) => unreachable!("a plain call never enters a generator's code path"),
		}
	}
}

/// As [`run_frame_loop`], but also stops at the first `Yield` executed by
/// the frame at `base_depth` (used by [`crate::generator::advance`]).
pub fn run_frame_loop_until_yield(vm: &mut Vm) -> Result<FrameStep, RaisedException> {
	let base_depth = vm.call_stack.len() - 1;
	loop {
		match execute_one(vm, base_depth)? {
			Control::Continue => {}
			Control::Returned(v) => {
				if vm.call_stack.len() == base_depth {
					return Ok(FrameStep::Returned(v));
				}
				vm.call_stack.last().expect("a caller frame remains above base_depth").push(v);
			}
			Control::Yielded(v) => return Ok(FrameStep::Yielded(v)),
		}
	}
}

fn load_name(vm: &mut Vm, frame: &Frame, entry: crate::code::NameEntry) -> Result<Value, RaisedException> {
	match entry.scope {
		crate::code::NameScope::Local => frame.locals.borrow().get(entry.name).cloned().ok_or_else(|| name_error(vm, entry.name)),
		crate::code::NameScope::Cell => frame
			.closure
			.as_ref()
			.and_then(|c| c.borrow().get(entry.name).cloned())
			.ok_or_else(|| name_error(vm, entry.name)),
		crate::code::NameScope::Global => {
			let dict = crate::module::module_dict(&frame.module);
			dict.borrow().get(entry.name).cloned().ok_or_else(|| name_error(vm, entry.name))
		}
	}
}

fn store_name(frame: &Frame, entry: crate::code::NameEntry, value: Value) -> Result<(), RaisedException> {
	match entry.scope {
		crate::code::NameScope::Local => frame.locals.borrow_mut().set(entry.name, value),
		crate::code::NameScope::Cell => {
			let cell = frame.closure.as_ref().expect("STORE_NAME into Cell scope requires a closure");
			cell.borrow_mut().set(entry.name, value);
		}
		crate::code::NameScope::Global => {
			let dict = crate::module::module_dict(&frame.module);
			dict.borrow_mut().set(entry.name, value);
		}
	}
	Ok(())
}

/// `FAST_INDEX`'s fused operand lookup: checks locals first, then module
/// globals, matching the common case the peephole targets (§4.J).
fn resolve_fast_name(frame: &Frame, name: NameId) -> Result<Value, RaisedException> {
	if let Some(v) = frame.locals.borrow().get(name) {
		return Ok(v.clone());
	}
	let dict = crate::module::module_dict(&frame.module);
	if let Some(v) = dict.borrow().get(name) {
		return Ok(v.clone());
	}
	Err(RaisedException::new(ExceptionKind::NameError, "name is not defined"))
}

fn name_error(vm: &Vm, name: NameId) -> RaisedException {
	RaisedException::new(ExceptionKind::NameError, format!("name {:?} is not defined", vm.interner.resolve(name)))
}

fn values_equal(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Int(x), Value::Int(y)) => x == y,
		(Value::Float(x), Value::Float(y)) => x == y,
		(Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
		(Value::Obj(x), Value::Obj(y)) => match (&x.payload, &y.payload) {
			(Payload::Str(a), Payload::Str(b)) => a == b,
			(Payload::Bool(a), Payload::Bool(b)) => a == b,
			(Payload::None, Payload::None) => true,
			(Payload::Tuple(a), Payload::Tuple(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(p, q)| values_equal(p, q)),
			_ => Rc::ptr_eq(x, y),
		},
		_ => false,
	}
}

fn get_index(vm: &Vm, container: &Value, index: &Value) -> Result<Value, RaisedException> {
	let Value::Obj(obj) = container else {
		let ty = vm.type_of(container);
		return Err(RaisedException::new(ExceptionKind::TypeError, format!("'{}' object is not subscriptable", vm.types.name(ty))));
	};

	match &obj.payload {
		Payload::Tuple(items) => index_sequence(items, index),
		Payload::List(items) => index_sequence(&items.borrow(), index),
		Payload::Dict(entries) => entries
			.borrow()
			.iter()
			.find(|(k, _)| values_equal(k, index))
			.map(|(_, v)| v.clone())
			.ok_or_else(|| RaisedException::new(ExceptionKind::KeyError, "key not found")),
		_ => Err(RaisedException::new(ExceptionKind::TypeError, format!("'{}' object is not subscriptable", vm.types.name(obj.ty)))),
	}
}

fn index_sequence(items: &[Value], index: &Value) -> Result<Value, RaisedException> {
	let Some(i) = index.as_int() else {
		return Err(RaisedException::new(ExceptionKind::TypeError, "indices must be integers"));
	};
	let len = items.len() as i64;
	let resolved = if i < 0 { i + len } else { i };
	if resolved < 0 || resolved >= len {
		return Err(RaisedException::new(ExceptionKind::IndexError, "index out of range"));
	}
	Ok(items[resolved as usize].clone())
}

fn exception_value_to_raised(vm: &Vm, value: &Value) -> Result<RaisedException, RaisedException> {
	let Value::Obj(obj) = value else {
		return Err(RaisedException::new(ExceptionKind::TypeError, "exceptions must derive from an exception object"));
	};
	let Payload::Exception(payload) = &obj.payload else {
		return Err(RaisedException::new(ExceptionKind::TypeError, "exceptions must derive from an exception object"));
	};
	let kind = ExceptionKind::ALL.iter().copied().find(|k| k.name() == &*payload.kind_name).unwrap_or(ExceptionKind::Exception);
	let message = payload.args.first().map(|v| crate::typeops::builtin_repr(vm, v)).unwrap_or_default();
	Ok(RaisedException { kind, message, traceback: payload.traceback.borrow().clone() })
}

/// Pops frames off the call stack (down to, but never past, `base_depth`)
/// looking for one whose block stack catches `exc`. Appends a traceback
/// entry for every frame destroyed along the way.
fn raise_in_vm(vm: &mut Vm, base_depth: usize, mut exc: RaisedException) -> Result<Control, RaisedException> {
	loop {
		if vm.call_stack.len() <= base_depth {
			return Err(exc);
		}
		let frame = vm.call_stack.last().expect("checked above").clone();
		if frame.jump_to_exception_handler() {
			return Ok(Control::Continue);
		}
		exc.traceback.push(frame.snapshot());
		vm.call_stack.pop();
	}
}

fn execute_one(vm: &mut Vm, base_depth: usize) -> Result<Control, RaisedException> {
	loop {
		let frame = vm.call_stack.last().expect("execute_one requires a live frame").clone();

		if frame.ip.get() >= frame.code.instructions.len() {
			vm.call_stack.pop();
			return Ok(Control::Returned(vm.none_value()));
		}

		let instr = frame.code.instructions[frame.ip.get()];
		frame.ip.set(frame.ip.get() + 1);

		match instr.opcode() {
			Opcode::NoOp | Opcode::Generic => {}

			Opcode::LoadConst => frame.push(frame.code.consts[instr.arg as usize].clone()),

			Opcode::LoadName | Opcode::LoadNameRef => {
				let entry = frame.code.names[instr.arg as usize];
				match load_name(vm, &frame, entry) {
					Ok(v) => frame.push(v),
					Err(e) => return raise_in_vm(vm, base_depth, e),
				}
			}

			Opcode::StoreName => {
				let entry = frame.code.names[instr.arg as usize];
				let value = frame.pop().expect("STORE_NAME requires a value on the stack");
				store_name(&frame, entry, value)?;
			}

			Opcode::BuildIndex => {
				let n = (instr.arg.max(1)) as usize;
				let mut idx: Vec<Value> = (0..n).map(|_| frame.pop().expect("BUILD_INDEX underflow")).collect();
				idx.reverse();
				let container = frame.pop().expect("BUILD_INDEX underflow");
				let index = if idx.len() == 1 {
					idx.into_iter().next().unwrap()
				} else {
					Value::obj(Rc::new(Object::new(vm.builtin_types.tuple, Payload::Tuple(idx.into()))))
				};
				match get_index(vm, &container, &index) {
					Ok(v) => frame.push(v),
					Err(e) => return raise_in_vm(vm, base_depth, e),
				}
			}

			Opcode::FastIndex => {
				let container_name = NameId(instr.arg as usize);
				let index_name = NameId(instr.block as usize);
				let result = resolve_fast_name(&frame, container_name).and_then(|c| resolve_fast_name(&frame, index_name).and_then(|i| get_index(vm, &c, &i)));
				match result {
					Ok(v) => frame.push(v),
					Err(e) => return raise_in_vm(vm, base_depth, e),
				}
			}

			Opcode::UnaryNegative => {
				let v = frame.pop().expect("UNARY_NEGATIVE underflow");
				match crate::typeops::num_negated(&v) {
					Ok(r) => frame.push(r),
					Err(e) => return raise_in_vm(vm, base_depth, e),
				}
			}

			Opcode::Call => {
				let argc = instr.arg as usize;
				let mut args = Vec::with_capacity(argc);
				for _ in 0..argc {
					args.push(frame.pop().expect("CALL underflow"));
				}
				args.reverse();
				let callee = frame.pop().expect("CALL underflow");
				match crate::call::dispatch(vm, callee, args, Vec::new(), true) {
					Ok(crate::call::CallOutcome::Value(v)) => vm.call_stack.last().expect("frame is still live").push(v),
					Ok(crate::call::CallOutcome::TailCall) => return Ok(Control::Continue),
					Err(e) => return raise_in_vm(vm, base_depth, e),
				}
			}

			Opcode::Return => {
				let v = frame.pop().unwrap_or_else(|| vm.none_value());
				vm.call_stack.pop();
				return Ok(Control::Returned(v));
			}

			Opcode::Yield => {
				let v = frame.pop().expect("YIELD underflow");
				return Ok(Control::Yielded(v));
			}

			Opcode::Jump => frame.ip.set(instr.arg as usize),

			Opcode::JumpIfFalse => {
				let cond = frame.pop().expect("JUMP_IF_FALSE underflow");
				match crate::typeops::as_bool(vm, &cond) {
					Ok(truthy) => {
						if !truthy {
							frame.ip.set(instr.arg as usize);
						}
					}
					Err(e) => return raise_in_vm(vm, base_depth, e),
				}
			}

			Opcode::PushTryBlock => frame.push_block(BlockKind::Try, instr.arg as usize),
			Opcode::PushLoopBlock => frame.push_block(BlockKind::Loop, instr.arg as usize),
			Opcode::PopBlock => {
				frame.pop_block();
			}

			Opcode::Raise => {
				let v = frame.pop().expect("RAISE underflow");
				match exception_value_to_raised(vm, &v) {
					Ok(exc) => return raise_in_vm(vm, base_depth, exc),
					Err(e) => return raise_in_vm(vm, base_depth, e),
				}
			}
		}
	}
}
