//! Type-level coercions and dunder-backed operations (§4.E).
//!
//! Every function here either has a fixed, non-overridable builtin behavior
//! (`asBool`, per the resolved Open Question: no `__bool__` hook) or checks
//! the relevant `TypeFlags` bit before falling back to a fixed rendering.

use std::rc::Rc;

use crate::errors::{ExceptionKind, RaisedException};
use crate::object::{Object, Payload};
use crate::types::TypeFlags;
use crate::value::Value;
use crate::vm::Vm;

/// Arithmetic negation (`UNARY_NEGATIVE`, §4.A/§4.J). Only `Int`/`Float`
/// carry an arithmetic negation; anything else is a `TypeError`.
pub fn num_negated(value: &Value) -> Result<Value, RaisedException> {
	match value {
		Value::Int(v) => Value::int(-v),
		Value::Float(v) => Ok(Value::float(-v)),
		_ => Err(RaisedException::new(ExceptionKind::TypeError, "bad operand type for unary -")),
	}
}

/// Widens an `Int` to `Float`; a `Float` passes through unchanged.
pub fn num_to_float(value: &Value) -> Result<f64, RaisedException> {
	match value {
		Value::Int(v) => Ok(*v as f64),
		Value::Float(v) => Ok(*v),
		_ => Err(RaisedException::new(ExceptionKind::TypeError, "a number is required")),
	}
}

/// Truthiness. Deliberately has no `__bool__` hook (Open Question,
/// resolved in favor of a fixed builtin rule): `None`, `False`, `0`, `0.0`
/// and empty `str`/`tuple`/`list`/`dict` are falsy. A user-defined object
/// with no builtin truthy rule of its own falls back to `__len__` (§4.E
/// "else try a `__len__` method and test `>0`"), and only defaults to
/// `True` when the type defines neither.
pub fn as_bool(vm: &mut Vm, value: &Value) -> Result<bool, RaisedException> {
	Ok(match value {
		Value::Int(v) => *v != 0,
		Value::Float(v) => *v != 0.0,
		Value::Obj(o) => match &o.payload {
			Payload::None => false,
			Payload::Bool(b) => *b,
			Payload::Str(s) => !s.is_empty(),
			Payload::Tuple(t) => !t.is_empty(),
			Payload::List(l) => !l.borrow().is_empty(),
			Payload::Dict(d) => !d.borrow().is_empty(),
			_ => {
				let ty = o.ty;
				if vm.types.flags(ty).contains(TypeFlags::HAS_LEN) {
					let len_fn = crate::attrs::find_class_attr(vm, ty, vm.dunders.len).expect("HAS_LEN implies __len__ resolves");
					let result = crate::call::call_immediate(vm, len_fn, vec![value.clone()], Vec::new())?;
					result.as_int().map(|n| n > 0).ok_or_else(|| RaisedException::new(ExceptionKind::TypeError, "__len__ should return an int"))?
				} else {
					true
				}
			}
		},
	})
}

/// `iter(value)` (§4.E "asIter"): a generator is already a native iterator
/// and passes through unchanged; anything else dispatches to `__iter__`.
pub fn as_iter(vm: &mut Vm, value: &Value) -> Result<Value, RaisedException> {
	if let Value::Obj(o) = value {
		if matches!(o.payload, Payload::Generator(_)) {
			return Ok(value.clone());
		}
	}
	let ty = vm.type_of(value);
	if vm.types.flags(ty).contains(TypeFlags::HAS_ITER) {
		let iter_fn = crate::attrs::find_class_attr(vm, ty, vm.dunders.iter).expect("HAS_ITER implies __iter__ resolves");
		return crate::call::call_immediate(vm, iter_fn, vec![value.clone()], Vec::new());
	}
	Err(RaisedException::new(ExceptionKind::TypeError, format!("'{}' object is not iterable", vm.types.name(ty))))
}

/// Identity-or-index-based hash (§4.E, §9 Open Question: `hash(type)` hashes
/// the type's table index rather than a pointer, since types have no
/// pointer once they live in a `TypeTable`).
pub fn hash_value(vm: &Vm, value: &Value) -> Result<u64, RaisedException> {
	use std::hash::{Hash, Hasher};
	let mut hasher = fxhash::FxHasher::default();
	match value {
		Value::Int(v) => v.hash(&mut hasher),
		Value::Float(v) => v.to_bits().hash(&mut hasher),
		Value::Obj(o) => match &o.payload {
			Payload::None => 0u8.hash(&mut hasher),
			Payload::Ellipsis => 1u8.hash(&mut hasher),
			Payload::Bool(b) => b.hash(&mut hasher),
			Payload::Str(s) => s.hash(&mut hasher),
			Payload::Type(ty) => ty.index().hash(&mut hasher),
			Payload::Tuple(items) => {
				// Same mixing constant and seed pocketpy uses for tuples.
				let mut x: i64 = 1000003;
				for item in items.iter() {
					let y = hash_value(vm, item)? as i64;
					x = x ^ (y.wrapping_add(0x9e3779b9).wrapping_add(x << 6).wrapping_add(x >> 2));
				}
				x.hash(&mut hasher);
			}
			Payload::List(_) | Payload::Dict(_) => {
				return Err(RaisedException::new(ExceptionKind::TypeError, "unhashable type"));
			}
			_ => (Rc::as_ptr(o) as usize).hash(&mut hasher),
		},
	}
	Ok(hasher.finish())
}

pub(crate) fn builtin_repr(vm: &Vm, value: &Value) -> String {
	match value {
		Value::Int(v) => v.to_string(),
		Value::Float(v) => {
			if v.fract() == 0.0 && v.is_finite() {
				format!("{v:.1}")
			} else {
				v.to_string()
			}
		}
		Value::Obj(o) => match &o.payload {
			Payload::None => "None".to_string(),
			Payload::Ellipsis => "...".to_string(),
			Payload::Bool(b) => if *b { "True" } else { "False" }.to_string(),
			Payload::Str(s) => format!("{s:?}"),
			Payload::Tuple(items) => {
				let parts: Vec<_> = items.iter().map(|v| builtin_repr(vm, v)).collect();
				if parts.len() == 1 {
					format!("({},)", parts[0])
				} else {
					format!("({})", parts.join(", "))
				}
			}
			Payload::List(items) => {
				let parts: Vec<_> = items.borrow().iter().map(|v| builtin_repr(vm, v)).collect();
				format!("[{}]", parts.join(", "))
			}
			Payload::Dict(entries) => {
				let parts: Vec<_> = entries.borrow().iter().map(|(k, v)| format!("{}: {}", builtin_repr(vm, k), builtin_repr(vm, v))).collect();
				format!("{{{}}}", parts.join(", "))
			}
			Payload::Type(ty) => format!("<class '{}'>", vm.types.name(*ty)),
			Payload::Function(f) => format!("<function {}>", f.name),
			Payload::NativeFunction(f) => format!("<built-in function {}>", f.name),
			Payload::BoundMethod { .. } => "<bound method>".to_string(),
			Payload::Module(m) => format!("<module '{}'>", m.name),
			Payload::Super { .. } => "<super>".to_string(),
			Payload::Generator(_) => "<generator>".to_string(),
			Payload::Exception(e) => format!("{}(...)", e.kind_name),
			Payload::Instance => format!("<{} object>", vm.types.name(o.ty)),
		},
	}
}

/// `repr(value)`: dispatches to `__repr__` when the type (or an ancestor)
/// defines it, else falls back to a fixed builtin rendering.
pub fn as_repr(vm: &mut Vm, value: &Value) -> Result<String, RaisedException> {
	let ty = vm.type_of(value);
	if vm.types.flags(ty).contains(TypeFlags::HAS_REPR) {
		let dunders = vm.dunders;
		let repr_fn = crate::attrs::find_class_attr(vm, ty, dunders.repr).expect("HAS_REPR implies __repr__ resolves");
		let result = crate::call::call_immediate(vm, repr_fn, vec![value.clone()], Vec::new())?;
		return as_plain_string(vm, &result);
	}
	Ok(builtin_repr(vm, value))
}

/// `str(value)`: dispatches to `__str__`, falling back to `__repr__`'s
/// result (which itself falls back to the builtin rendering).
pub fn as_str(vm: &mut Vm, value: &Value) -> Result<String, RaisedException> {
	let ty = vm.type_of(value);
	if vm.types.flags(ty).contains(TypeFlags::HAS_STR) {
		let dunders = vm.dunders;
		let str_fn = crate::attrs::find_class_attr(vm, ty, dunders.str).expect("HAS_STR implies __str__ resolves");
		let result = crate::call::call_immediate(vm, str_fn, vec![value.clone()], Vec::new())?;
		return as_plain_string(vm, &result);
	}
	as_repr(vm, value)
}

fn as_plain_string(vm: &Vm, value: &Value) -> Result<String, RaisedException> {
	match value.as_obj().map(|o| &o.payload) {
		Some(Payload::Str(s)) => Ok(s.to_string()),
		_ => {
			let ty = vm.type_of(value);
			Err(RaisedException::new(ExceptionKind::TypeError, format!("__str__ returned non-string (type {})", vm.types.name(ty))))
		}
	}
}

/// Flattens a value into its element sequence for unpacking contexts
/// (`f(*xs)`, §4.G). Supports the two builtin sequence payloads directly;
/// anything declaring `__iter__` is drained through the iterator protocol.
pub fn as_sequence_elements(vm: &Vm, value: &Value) -> Result<Vec<Value>, RaisedException> {
	if let Value::Obj(o) = value {
		match &o.payload {
			Payload::Tuple(items) => return Ok(items.to_vec()),
			Payload::List(items) => return Ok(items.borrow().clone()),
			_ => {}
		}
	}
	let ty = vm.type_of(value);
	Err(RaisedException::new(ExceptionKind::TypeError, format!("'{}' object is not iterable", vm.types.name(ty))))
}
