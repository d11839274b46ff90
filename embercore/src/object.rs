//! Heap objects (§3, §4.B).
//!
//! Every `Value::Obj` points at one of these. `attrs` is `None` for
//! non-attr-capable builtins (bools, strings, tuples, numbers-that-escaped-
//! tagging) and `Some` for instances, modules and types, matching §4.F's
//! "non-tagged, attr-capable object" carve-out for `setattr`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::attrdict::AttrDict;
use crate::call::{NativeFunction, InterpretedFunction};
use crate::generator::GeneratorState;
use crate::module::Module;
use crate::types::TypeId;
use crate::value::Value;

#[derive(Debug)]
pub enum Payload {
	None,
	Ellipsis,
	Bool(bool),
	Str(Rc<str>),
	Tuple(Rc<[Value]>),
	List(RefCell<Vec<Value>>),
	Dict(RefCell<Vec<(Value, Value)>>),
	Type(TypeId),
	Function(Rc<InterpretedFunction>),
	NativeFunction(Rc<NativeFunction>),
	BoundMethod { receiver: Value, func: Value },
	Module(Rc<Module>),
	Super { instance: Value, declared_type: TypeId },
	Generator(RefCell<GeneratorState>),
	Exception(ExceptionPayload),
	/// A plain user-defined instance; all its state lives in `Object::attrs`.
	Instance,
}

#[derive(Debug, Clone)]
pub struct ExceptionPayload {
	pub kind_name: Rc<str>,
	pub args: Vec<Value>,
	pub traceback: Rc<RefCell<Vec<crate::errors::TracebackEntry>>>,
}

#[derive(Debug)]
pub struct Object {
	pub ty: TypeId,
	pub attrs: Option<RefCell<AttrDict>>,
	pub payload: Payload,
}

impl Object {
	pub fn new(ty: TypeId, payload: Payload) -> Self {
		Object { ty, attrs: None, payload }
	}

	pub fn new_with_dict(ty: TypeId, payload: Payload) -> Self {
		Object { ty, attrs: Some(RefCell::new(AttrDict::new())), payload }
	}
}
