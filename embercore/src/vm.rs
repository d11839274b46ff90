//! The top-level embedding surface (§6): owns every VM-wide table, bootstraps
//! the builtin types, and exposes `exec`/`new_module`/`bind_func`/
//! `bind_method` to the host.

use std::rc::Rc;

use crate::attrdict::AttrDict;
use crate::call::{CallOutcome, NativeFunction};
use crate::code::CodeObject;
use crate::config::VmConfig;
use crate::dunders::Dunders;
use crate::errors::{ExceptionKind, RaisedException, VmError};
use crate::frame::Frame;
use crate::intern::Interner;
use crate::module::{module_dict, new_module_value, ModuleRegistry};
use crate::object::{ExceptionPayload, Object, Payload};
use crate::sink::Sink;
use crate::types::{TypeId, TypeTable};
use crate::value::Value;

/// The builtin types every `Object` is necessarily an instance of. Built
/// once at `Vm::new` time, after `object`/`type` are bootstrapped.
#[derive(Debug, Copy, Clone)]
pub struct BuiltinTypes {
	pub object: TypeId,
	pub type_: TypeId,
	pub none_type: TypeId,
	pub bool_type: TypeId,
	pub int_type: TypeId,
	pub float_type: TypeId,
	pub str_type: TypeId,
	pub tuple: TypeId,
	pub list: TypeId,
	pub dict: TypeId,
	pub function: TypeId,
	pub native_function: TypeId,
	pub bound_method: TypeId,
	pub module: TypeId,
	pub super_: TypeId,
	pub generator: TypeId,
	pub exception: TypeId,
}

#[derive(Debug)]
pub struct Vm {
	pub(crate) types: TypeTable,
	pub(crate) interner: Interner,
	pub(crate) dunders: Dunders,
	pub(crate) modules: ModuleRegistry,
	pub(crate) config: VmConfig,
	pub(crate) builtin_types: BuiltinTypes,
	pub(crate) call_stack: Vec<Rc<Frame>>,
	next_frame_id: u64,
	none_singleton: Value,
	ellipsis_singleton: Value,
	true_singleton: Value,
	false_singleton: Value,
	stdout: Sink,
	stderr: Sink,
}

impl Vm {
	pub fn new(config: VmConfig) -> Self {
		let mut types = TypeTable::new();
		let mut interner = Interner::new();
		let dunders = Dunders::intern(&mut interner);

		let builtin_types = BuiltinTypes {
			object: TypeId::OBJECT,
			type_: TypeId::TYPE,
			none_type: types.push("NoneType", Some(TypeId::OBJECT)),
			bool_type: types.push("bool", Some(TypeId::OBJECT)),
			int_type: types.push("int", Some(TypeId::OBJECT)),
			float_type: types.push("float", Some(TypeId::OBJECT)),
			str_type: types.push("str", Some(TypeId::OBJECT)),
			tuple: types.push("tuple", Some(TypeId::OBJECT)),
			list: types.push("list", Some(TypeId::OBJECT)),
			dict: types.push("dict", Some(TypeId::OBJECT)),
			function: types.push("function", Some(TypeId::OBJECT)),
			native_function: types.push("native_function", Some(TypeId::OBJECT)),
			bound_method: types.push("bound_method", Some(TypeId::OBJECT)),
			module: types.push("module", Some(TypeId::OBJECT)),
			super_: types.push("super", Some(TypeId::OBJECT)),
			generator: types.push("generator", Some(TypeId::OBJECT)),
			exception: types.push("Exception", Some(TypeId::OBJECT)),
		};

		let none_singleton = Value::obj(Rc::new(Object::new(builtin_types.none_type, Payload::None)));
		let ellipsis_singleton = Value::obj(Rc::new(Object::new(builtin_types.none_type, Payload::Ellipsis)));
		let true_singleton = Value::obj(Rc::new(Object::new(builtin_types.bool_type, Payload::Bool(true))));
		let false_singleton = Value::obj(Rc::new(Object::new(builtin_types.bool_type, Payload::Bool(false))));

		Vm {
			types,
			interner,
			dunders,
			modules: ModuleRegistry::new(),
			config,
			builtin_types,
			call_stack: Vec::new(),
			next_frame_id: 0,
			none_singleton,
			ellipsis_singleton,
			true_singleton,
			false_singleton,
			stdout: if config.use_stdio { Sink::Stdio } else { Sink::memory() },
			stderr: if config.use_stdio { Sink::Stdio } else { Sink::memory() },
		}
	}

	/// Writes `text` to the VM's stdout sink (§6): either straight through to
	/// the process, or appended to an in-memory buffer if the host opted out
	/// of system stdio.
	pub fn write_stdout(&self, text: &str) {
		self.stdout.write(text, false);
	}

	/// As [`Vm::write_stdout`], for the error sink.
	pub fn write_stderr(&self, text: &str) {
		self.stderr.write(text, true);
	}

	/// The accumulated text written to the in-memory stdout sink, or `None`
	/// if this VM was constructed with `use_stdio = true`.
	pub fn stdout_contents(&self) -> Option<String> {
		self.stdout.contents()
	}

	/// As [`Vm::stdout_contents`], for the error sink.
	pub fn stderr_contents(&self) -> Option<String> {
		self.stderr.contents()
	}

	#[inline]
	pub fn none_value(&self) -> Value {
		self.none_singleton.clone()
	}

	#[inline]
	pub fn ellipsis_value(&self) -> Value {
		self.ellipsis_singleton.clone()
	}

	#[inline]
	pub fn bool_value(&self, b: bool) -> Value {
		if b {
			self.true_singleton.clone()
		} else {
			self.false_singleton.clone()
		}
	}

	pub fn str_value(&self, s: impl Into<Rc<str>>) -> Value {
		Value::obj(Rc::new(Object::new(self.builtin_types.str_type, Payload::Str(s.into()))))
	}

	/// The type an arbitrary value is an instance of (§4.B). Scalars resolve
	/// to the matching builtin type directly; heap objects carry their own.
	pub fn type_of(&self, value: &Value) -> TypeId {
		match value {
			Value::Int(_) => self.builtin_types.int_type,
			Value::Float(_) => self.builtin_types.float_type,
			Value::Obj(o) => o.ty,
		}
	}

	pub fn make_exception(&self, kind: ExceptionKind, message: impl Into<String>) -> Value {
		let payload = ExceptionPayload {
			kind_name: Rc::from(kind.name()),
			args: vec![self.str_value(message.into())],
			traceback: Rc::new(std::cell::RefCell::new(Vec::new())),
		};
		Value::obj(Rc::new(Object::new_with_dict(self.builtin_types.exception, Payload::Exception(payload))))
	}

	pub(crate) fn next_frame_id(&mut self) -> u64 {
		let id = self.next_frame_id;
		self.next_frame_id += 1;
		id
	}

	/// Pushes a new frame for an ordinary (non-generator) call, enforcing
	/// the configured recursion limit (§5, §4.I).
	pub(crate) fn push_frame(&mut self, code: Rc<CodeObject>, module: Value, locals: AttrDict, closure: Option<Rc<std::cell::RefCell<AttrDict>>>) -> Result<(), RaisedException> {
		if self.call_stack.len() >= self.config.recursion_limit {
			return Err(RaisedException::new(ExceptionKind::RecursionError, "maximum recursion depth exceeded"));
		}
		let id = self.next_frame_id();
		self.call_stack.push(Rc::new(Frame::new(id, code, module, locals, closure)));
		Ok(())
	}

	/// Splices a suspended generator's frame back onto the call stack for
	/// the duration of one `next()` step (§4.I).
	pub(crate) fn splice_in_frame(&mut self, frame: Rc<Frame>) {
		self.call_stack.push(frame);
	}

	pub(crate) fn splice_out_frame(&mut self) -> Rc<Frame> {
		self.call_stack.pop().expect("splice_in_frame/splice_out_frame are always paired")
	}

	/// Registers a fresh, empty module (§6 `new_module`).
	pub fn new_module(&mut self, name: &str) -> Result<Value, VmError> {
		let id = self.interner.intern(name);
		if self.modules.contains(id) {
			return Err(VmError::DuplicateModule(name.to_string()));
		}
		let module = new_module_value(self.builtin_types.module, name);
		self.modules.insert(id, module.clone());
		Ok(module)
	}

	pub fn get_module(&self, name: &str) -> Option<Value> {
		let id = self.interner.lookup(name)?;
		self.modules.get(id).cloned()
	}

	/// Binds a native free function into `module`'s globals (§6
	/// `bind_func`).
	pub fn bind_func(&mut self, module: &Value, name: &str, argc: usize, func: impl Fn(&mut Vm, &[Value]) -> Result<Value, RaisedException> + 'static) {
		let id = self.interner.intern(name);
		let nf = NativeFunction::new(name, argc, false, func);
		let value = Value::obj(Rc::new(Object::new(self.builtin_types.native_function, Payload::NativeFunction(Rc::new(nf)))));
		module_dict(module).borrow_mut().set(id, value);
	}

	/// Binds a native method into a type's class dict. `argc` counts only
	/// the explicit parameters, excluding the bound `self` (§4.G step 3).
	pub fn bind_method(&mut self, ty: TypeId, name: &str, argc: usize, func: impl Fn(&mut Vm, &[Value]) -> Result<Value, RaisedException> + 'static) {
		let id = self.interner.intern(name);
		let nf = NativeFunction::new(name, argc + 1, true, func);
		let value = Value::obj(Rc::new(Object::new(self.builtin_types.native_function, Payload::NativeFunction(Rc::new(nf)))));
		self.set_class_attr_unchecked(ty, id, value);
	}

	fn set_class_attr_unchecked(&mut self, ty: TypeId, name: crate::intern::NameId, value: Value) {
		let Value::Obj(obj) = &self.types.get(ty).object else { unreachable!("a type's own value is always heap-allocated") };
		obj.attrs.as_ref().expect("types always carry a class dict").borrow_mut().set(name, value);
		self.types.finalize_flags(ty, &self.dunders);
	}

	/// Declares a fresh subtype of `base` (defaulting to `object`) and
	/// returns its id, ready for `bind_method` calls before any instance is
	/// constructed.
	pub fn new_type(&mut self, name: &str, base: Option<TypeId>) -> TypeId {
		self.types.push(name, Some(base.unwrap_or(TypeId::OBJECT)))
	}

	/// Runs the bytecode peephole optimizer (§4.J) over a freshly assembled
	/// `CodeObject`. The host is expected to call this exactly once per
	/// code object, before it is ever wrapped in an `Rc` and executed.
	pub fn optimize_code(code: &mut CodeObject) {
		crate::optimizer::optimize(code);
	}

	pub fn types(&self) -> &TypeTable {
		&self.types
	}

	pub fn builtin_types(&self) -> &BuiltinTypes {
		&self.builtin_types
	}

	pub fn interner_mut(&mut self) -> &mut Interner {
		&mut self.interner
	}

	/// Runs an already-optimized `code` as `module`'s top-level body and
	/// returns its final expression value (§6 `exec`). Top-level names
	/// resolve through the module's own globals dict; the frame's private
	/// `locals` is unused at this scope. Call [`Vm::optimize_code`] on a
	/// freshly assembled `CodeObject` before handing it here, the same way
	/// the host is expected to for every `CodeObject` it constructs.
	///
	/// Matches `original_source/src/vm.h`'s `VM::exec` contract exactly: an
	/// unhandled exception is caught here, its summary and traceback are
	/// written to the configured error sink, the call stack is reset, and
	/// `exec` itself returns `None` rather than propagating a Rust `Err`.
	/// Host code that wants the raw `RaisedException` instead (e.g. to
	/// render it through its own reporting) should drive `push_frame` +
	/// [`crate::interp::run_frame_loop`] directly.
	pub fn exec(&mut self, module: &Value, code: Rc<CodeObject>) -> Option<Value> {
		if let Err(e) = self.push_frame(code, module.clone(), AttrDict::new(), None) {
			self.report_unhandled(&e);
			return None;
		}
		match crate::interp::run_frame_loop(self) {
			Ok(v) => Some(v),
			Err(exc) => {
				self.report_unhandled(&exc);
				None
			}
		}
	}

	/// Reports an exception that escaped `exec`'s own `run_frame_loop`
	/// invocation. The call stack is already back to its pre-`exec` depth by
	/// this point — `raise_in_vm` only ever unwinds frames at or above the
	/// depth `exec`'s own `push_frame` introduced (§4.H `base_depth`), so
	/// there is nothing left here to clear without risking frames that
	/// belong to an enclosing `FrameLoop` invocation (the nested
	/// exec-inside-a-native-call scenario of §8 scenario 4).
	fn report_unhandled(&mut self, exc: &RaisedException) {
		#[cfg(feature = "tracing")]
		tracing::error!(error = %exc, "unhandled exception escaped exec");
		self.write_stderr(&format!("{exc}\n"));
	}

	/// Invokes an arbitrary callable to completion (§6), for host code
	/// driving the VM directly rather than through `exec`.
	pub fn call(&mut self, callable: Value, args: Vec<Value>) -> Result<Value, RaisedException> {
		match crate::call::dispatch(self, callable, args, Vec::new(), false)? {
			CallOutcome::Value(v) => Ok(v),
			CallOutcome::TailCall => unreachable!("dispatch with op_call=false never returns TailCall"),
		}
	}

	/// Steps a generator value one `yield` forward (§4.I), the host-facing
	/// equivalent of Python's `next(g)`. Returns `Ok(None)` once the
	/// generator's body has returned and every subsequent call keeps
	/// returning `Ok(None)` without re-entering its frame.
	pub fn generator_next(&mut self, generator: &Value) -> Result<Option<Value>, RaisedException> {
		let Value::Obj(obj) = generator else {
			return Err(RaisedException::new(ExceptionKind::TypeError, "not a generator"));
		};
		let Payload::Generator(state) = &obj.payload else {
			return Err(RaisedException::new(ExceptionKind::TypeError, "not a generator"));
		};
		let mut state = state.borrow_mut();
		crate::generator::advance(self, &mut state)
	}

	/// A minimal disassembly text renderer (§2.2 supplemented feature),
	/// mostly useful for tests and interactive debugging.
	pub fn disassemble(&self, code: &CodeObject) -> String {
		let mut out = String::new();
		for (i, instr) in code.instructions.iter().enumerate() {
			out.push_str(&format!("{i:>4} {:<14} {:>5}", format!("{:?}", instr.opcode()), instr.arg));
			if matches!(instr.opcode(), crate::code::Opcode::LoadName | crate::code::Opcode::LoadNameRef | crate::code::Opcode::StoreName) {
				if let Some(entry) = code.names.get(instr.arg as usize) {
					out.push_str(&format!("  ; {}", self.interner.resolve(entry.name)));
				}
			}
			out.push('\n');
		}
		out
	}
}
