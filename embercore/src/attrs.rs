//! Attribute access (§4.F): `getattr`/`setattr`, the descriptor protocol,
//! `super` redirection and the bound-method fallback.
//!
//! Lookup order mirrors CPython's: a *data descriptor* found on the type
//! (or an ancestor) wins over an instance attribute of the same name; a
//! plain instance attribute wins over a non-descriptor class attribute;
//! a class-level `Function` found with no matching instance attribute is
//! bound to the instance rather than returned bare.

use std::rc::Rc;

use crate::errors::{ExceptionKind, RaisedException};
use crate::intern::NameId;
use crate::object::{Object, Payload};
use crate::types::{TypeFlags, TypeId};
use crate::value::Value;
use crate::vm::Vm;

/// Walks `ty`'s MRO looking for `name` in each ancestor's class dict
/// (§4.F "class attribute lookup"). Returns the first hit.
pub fn find_class_attr(vm: &Vm, ty: TypeId, name: NameId) -> Option<Value> {
	for ancestor in vm.types.mro(ty) {
		if let Some(value) = vm.types.get(ancestor).class_dict().get(name) {
			return Some(value.clone());
		}
	}
	None
}

fn is_descriptor(vm: &Vm, value: &Value) -> bool {
	let ty = vm.type_of(value);
	vm.types.flags(ty).contains(TypeFlags::HAS_GET)
}

/// `obj.name`. When `required` is `false`, a miss resolves to `Ok(None)`
/// instead of `AttributeError` — used by `CallDispatcher`'s `__call__`
/// fallback probe, which only wants to know whether the hook exists.
pub fn getattr(vm: &mut Vm, obj: &Value, name: NameId, required: bool) -> Result<Option<Value>, RaisedException> {
	// `__class__` is synthesized from `Vm::type_of`, never stored in an
	// instance or class dict (§8 invariant 3 / scenario 2: `b.__class__`
	// resolves via the type-table walk, not attribute storage).
	if name == vm.dunders.class {
		let ty = vm.type_of(obj);
		return Ok(Some(vm.types.get(ty).object.clone()));
	}

	// `super()` redirection (§4.F): resolve starting one step past the
	// declared type, binding back to the original instance.
	if let Value::Obj(o) = obj {
		if let Payload::Super { instance, declared_type } = &o.payload {
			let instance = instance.clone();
			let start = vm.types.get(*declared_type).base;
			return getattr_from(vm, &instance, start, name, required);
		}
	}

	let ty = vm.type_of(obj);
	getattr_from(vm, obj, Some(ty), name, required)
}

fn getattr_from(vm: &mut Vm, obj: &Value, start: Option<TypeId>, name: NameId, required: bool) -> Result<Option<Value>, RaisedException> {
	let class_attr = start.and_then(|ty| find_class_attr(vm, ty, name));

	if let Some(attr) = &class_attr {
		if is_descriptor(vm, attr) {
			let descr_ty = vm.type_of(attr);
			let get_fn = find_class_attr(vm, descr_ty, vm.dunders.get).expect("HAS_GET implies __get__ resolves");
			let bound = crate::call::call_immediate(vm, get_fn, vec![attr.clone(), obj.clone()], Vec::new())?;
			return Ok(Some(bound));
		}
	}

	if let Value::Obj(o) = obj {
		if let Some(attrs) = &o.attrs {
			if let Some(value) = attrs.borrow().get(name) {
				return Ok(Some(value.clone()));
			}
		}
	}

	if let Some(attr) = class_attr {
		if let Value::Obj(o) = &attr {
			if matches!(o.payload, Payload::Function(_) | Payload::NativeFunction(_)) {
				let bound = Object::new(vm.builtin_types().bound_method, Payload::BoundMethod { receiver: obj.clone(), func: attr });
				return Ok(Some(Value::obj(Rc::new(bound))));
			}
		}
		return Ok(Some(attr));
	}

	if required {
		let ty = vm.type_of(obj);
		Err(RaisedException::new(
			ExceptionKind::AttributeError,
			format!("'{}' object has no attribute {:?}", vm.types.name(ty), vm.interner.resolve(name)),
		))
	} else {
		Ok(None)
	}
}

/// `obj.name = value`. A data descriptor found on the type intercepts the
/// assignment via `__set__`; otherwise the value lands directly in the
/// instance's own `AttrDict`.
pub fn setattr(vm: &mut Vm, obj: &Value, name: NameId, value: Value) -> Result<(), RaisedException> {
	let ty = vm.type_of(obj);
	if let Some(setter) = find_class_attr(vm, ty, name) {
		let descr_ty = vm.type_of(&setter);
		let flags = vm.types.flags(descr_ty);
		if flags.contains(TypeFlags::HAS_GET) {
			if flags.contains(TypeFlags::HAS_SET) {
				let set_fn = find_class_attr(vm, descr_ty, vm.dunders.set).expect("HAS_SET implies __set__ resolves");
				crate::call::call_immediate(vm, set_fn, vec![setter, obj.clone(), value], Vec::new())?;
				return Ok(());
			}
			return Err(RaisedException::new(ExceptionKind::TypeError, "readonly attribute"));
		}
	}

	let Value::Obj(o) = obj else {
		return Err(RaisedException::new(
			ExceptionKind::AttributeError,
			format!("'{}' object has no attribute dict", vm.types.name(ty)),
		));
	};
	let Some(attrs) = &o.attrs else {
		return Err(RaisedException::new(
			ExceptionKind::AttributeError,
			format!("'{}' object has no attribute dict", vm.types.name(ty)),
		));
	};
	attrs.borrow_mut().set(name, value);
	Ok(())
}
