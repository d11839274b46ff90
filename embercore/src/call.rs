//! Unified call dispatch (§4.G).
//!
//! `dispatch` implements the six-step resolution order verbatim. Native
//! functions are Rust closures; interpreted functions build a fresh locals
//! `AttrDict` and either run to completion immediately (`op_call == false`)
//! or push their frame and hand control back to the enclosing `FrameLoop`
//! (`op_call == true`, the `_py_op_call` sentinel of §4.H).

use std::cell::RefCell;
use std::rc::Rc;

use crate::attrdict::AttrDict;
use crate::code::CodeObject;
use crate::errors::{ExceptionKind, RaisedException};
use crate::frame::Frame;
use crate::generator::{Generator, GeneratorState};
use crate::intern::NameId;
use crate::object::{Object, Payload};
use crate::types::TypeFlags;
use crate::value::Value;
use crate::vm::Vm;

/// A positional argument as it arrives at a call site: either a plain value
/// or one marked for unpacking (`f(*xs)`), per §4.G "Argument unpacking".
pub enum PosArg {
	Plain(Value),
	Starred(Value),
}

pub struct NativeFunction {
	pub name: String,
	/// Arity excluding an implicit bound `self` (§4.G step 3).
	pub argc: usize,
	pub is_method: bool,
	func: Box<dyn Fn(&mut Vm, &[Value]) -> Result<Value, RaisedException>>,
}

impl std::fmt::Debug for NativeFunction {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NativeFunction").field("name", &self.name).field("argc", &self.argc).field("is_method", &self.is_method).finish()
	}
}

impl NativeFunction {
	pub fn new(name: impl Into<String>, argc: usize, is_method: bool, func: impl Fn(&mut Vm, &[Value]) -> Result<Value, RaisedException> + 'static) -> Self {
		NativeFunction { name: name.into(), argc, is_method, func: Box::new(func) }
	}

	#[inline]
	pub fn invoke(&self, vm: &mut Vm, args: &[Value]) -> Result<Value, RaisedException> {
		(self.func)(vm, args)
	}
}

#[derive(Debug)]
pub struct InterpretedFunction {
	pub name: String,
	pub code: Rc<CodeObject>,
	/// All positional-eligible parameter names, in declared order.
	pub params: Vec<NameId>,
	/// Suffix of `params` that carry a default value, in declared order
	/// (pocketpy's `fn.kwargs`/`fn.kwargs_order`).
	pub defaults: Vec<(NameId, Value)>,
	pub star_param: Option<NameId>,
	pub module: Value,
	pub closure: Option<Rc<RefCell<AttrDict>>>,
}

impl InterpretedFunction {
	fn default_for(&self, name: NameId) -> Option<&Value> {
		self.defaults.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
	}

	fn is_known_kwarg(&self, name: NameId) -> bool {
		self.defaults.iter().any(|(n, _)| *n == name)
	}
}

pub enum CallOutcome {
	Value(Value),
	/// The `_py_op_call` sentinel: a new frame was pushed; the enclosing
	/// `FrameLoop` should re-read the top of the call stack.
	TailCall,
}

/// Expands `Starred` arguments into their element sequence, in place
/// (§4.G "Argument unpacking (pre-dispatch)").
pub fn expand_args(vm: &Vm, args: Vec<PosArg>) -> Result<Vec<Value>, RaisedException> {
	let mut out = Vec::with_capacity(args.len());
	for arg in args {
		match arg {
			PosArg::Plain(v) => out.push(v),
			PosArg::Starred(v) => {
				let elems = crate::typeops::as_sequence_elements(vm, &v)?;
				out.extend(elems);
			}
		}
	}
	Ok(out)
}

pub fn dispatch(vm: &mut Vm, callable: Value, args: Vec<Value>, kwargs: Vec<(NameId, Value)>, op_call: bool) -> Result<CallOutcome, RaisedException> {
	#[cfg(feature = "tracing")]
	tracing::trace!(op_call, argc = args.len(), "call dispatch");

	// Step 1: type construction.
	if let Value::Obj(obj) = &callable {
		if let Payload::Type(ty) = obj.payload {
			let flags = vm.types.flags(ty);
			if flags.contains(TypeFlags::HAS_NEW) {
				let new_fn = crate::attrs::find_class_attr(vm, ty, vm.dunders.new).expect("HAS_NEW implies __new__ resolves");
				let mut ctor_args = Vec::with_capacity(args.len() + 1);
				ctor_args.push(callable.clone());
				ctor_args.extend(args);
				return Ok(CallOutcome::Value(call_immediate(vm, new_fn, ctor_args, kwargs)?));
			}

			let instance = Value::obj(Rc::new(Object::new_with_dict(ty, Payload::Instance)));
			if flags.contains(TypeFlags::HAS_INIT) {
				let init_fn = crate::attrs::find_class_attr(vm, ty, vm.dunders.init).expect("HAS_INIT implies __init__ resolves");
				let mut init_args = Vec::with_capacity(args.len() + 1);
				init_args.push(instance.clone());
				init_args.extend(args);
				call_immediate(vm, init_fn, init_args, kwargs)?;
			}
			return Ok(CallOutcome::Value(instance));
		}
	}

	// Step 2: bound method unwrap.
	if let Value::Obj(obj) = &callable {
		if let Payload::BoundMethod { receiver, func } = &obj.payload {
			let mut full_args = Vec::with_capacity(args.len() + 1);
			full_args.push(receiver.clone());
			full_args.extend(args);
			return dispatch(vm, func.clone(), full_args, kwargs, op_call);
		}
	}

	// Step 3: native function.
	if let Value::Obj(obj) = &callable {
		if let Payload::NativeFunction(nf) = &obj.payload {
			if !kwargs.is_empty() {
				return Err(RaisedException::new(ExceptionKind::TypeError, "native_function does not accept keyword arguments"));
			}
			if args.len() != nf.argc {
				return Err(RaisedException::new(
					ExceptionKind::TypeError,
					format!("expected {} arguments, but got {}", nf.argc, args.len()),
				));
			}
			let nf = nf.clone();
			return Ok(CallOutcome::Value(nf.invoke(vm, &args)?));
		}
	}

	// Step 4: interpreted function.
	if let Value::Obj(obj) = &callable {
		if let Payload::Function(func) = &obj.payload {
			let func = func.clone();
			let capacity = func.code.perfect_locals_capacity.get();
			let mut locals = if capacity > 0 {
				AttrDict::with_perfect_params(capacity, func.code.perfect_hash_seed.get())
			} else {
				AttrDict::new()
			};

			let mut i = 0usize;
			for &name in &func.params {
				if i < args.len() {
					locals.set(name, args[i].clone());
					i += 1;
				} else if let Some(default) = func.default_for(name) {
					locals.set(name, default.clone());
				} else {
					return Err(RaisedException::new(
						ExceptionKind::TypeError,
						format!("missing positional argument {:?}", vm.interner.resolve(name)),
					));
				}
			}

			if let Some(star) = func.star_param {
				let rest: Vec<Value> = args[i..].to_vec();
				locals.set(star, Value::obj(Rc::new(Object::new(vm.builtin_types.tuple, Payload::Tuple(rest.into())))));
			} else if i < args.len() {
				return Err(RaisedException::new(ExceptionKind::TypeError, "too many arguments"));
			}

			for (key, value) in kwargs {
				if !func.is_known_kwarg(key) {
					return Err(RaisedException::new(
						ExceptionKind::TypeError,
						format!("{:?} is an invalid keyword argument for {}()", vm.interner.resolve(key), func.name),
					));
				}
				locals.set(key, value);
			}

			if func.code.is_generator {
				let id = vm.next_frame_id();
				let frame = Rc::new(Frame::new(id, func.code.clone(), func.module.clone(), locals, func.closure.clone()));
				let gen = Generator::new(frame);
				let gen_obj = Object::new(vm.builtin_types.generator, Payload::Generator(RefCell::new(GeneratorState::Fresh(gen))));
				return Ok(CallOutcome::Value(Value::obj(Rc::new(gen_obj))));
			}

			vm.push_frame(func.code.clone(), func.module.clone(), locals, func.closure.clone())?;
			if op_call {
				return Ok(CallOutcome::TailCall);
			}
			let result = crate::interp::run_frame_loop(vm)?;
			return Ok(CallOutcome::Value(result));
		}
	}

	// Step 5: `__call__` fallback.
	let ty = vm.type_of(&callable);
	if vm.types.flags(ty).contains(TypeFlags::HAS_CALL) {
		let call_fn = crate::attrs::getattr(vm, &callable, vm.dunders.call, true)?.expect("HAS_CALL implies __call__ resolves");
		return dispatch(vm, call_fn, args, kwargs, op_call);
	}

	Err(RaisedException::new(ExceptionKind::TypeError, format!("'{}' object is not callable", vm.types.name(ty))))
}

/// Calls `callable` and runs it to completion, whatever kind of callable it
/// is (native, interpreted, or a type to construct). Used by the runtime's
/// own machinery (`__new__`/`__init__`, `TypeOps` dunder dispatch) which
/// always wants an immediate value, never a tail call.
pub fn call_immediate(vm: &mut Vm, callable: Value, args: Vec<Value>, kwargs: Vec<(NameId, Value)>) -> Result<Value, RaisedException> {
	match dispatch(vm, callable, args, kwargs, false)? {
		CallOutcome::Value(v) => Ok(v),
		CallOutcome::TailCall => unreachable!("dispatch with op_call=false never returns TailCall"),
	}
}
