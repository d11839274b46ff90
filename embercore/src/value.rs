//! Tagged value representation (§3, §4.A).
//!
//! `Value` models the three-tag scheme directly: a `usize`-width discriminant
//! replaces genuine low-bit pointer tagging. §9 "Design notes" sanctions this
//! fallback explicitly for hosts without free pointer bits, as long as the
//! round-trip and overflow-rejection semantics are preserved and the tag
//! layout itself is never part of the public surface.

use std::rc::Rc;

use crate::errors::{ExceptionKind, RaisedException};
use crate::object::Object;

/// Conceptual tag-bit budget a small scalar gives up versus a full 64-bit
/// word (§3: "tag `01`"/"tag `10`"). Two bits are enough to distinguish the
/// three variants plus the reserved `11` pattern.
pub const TAG_BITS: u32 = 2;
const SMALL_INT_BITS: u32 = 64 - TAG_BITS;

/// Largest integer representable without boxing (inclusive).
pub const MAX_SMALL_INT: i64 = (1i64 << (SMALL_INT_BITS - 1)) - 1;
/// Smallest integer representable without boxing (inclusive).
pub const MIN_SMALL_INT: i64 = -(1i64 << (SMALL_INT_BITS - 1));

#[derive(Clone, Debug)]
pub enum Value {
	/// tag `01`
	Int(i64),
	/// tag `10`; the low two mantissa bits are always zero.
	Float(f64),
	/// tag `00`
	Obj(Rc<Object>),
}

impl Value {
	/// Boxes an integer, rejecting values outside the small-int range
	/// (§8 invariant 1).
	pub fn int(v: i64) -> Result<Value, RaisedException> {
		if v < MIN_SMALL_INT || v > MAX_SMALL_INT {
			return Err(RaisedException::new(
				ExceptionKind::OverflowError,
				format!("integer {v} is out of range for this runtime's small-int representation"),
			));
		}
		Ok(Value::Int(v))
	}

	/// Boxes a float, clearing the two low mantissa bits (§4.A, §8 invariant 2).
	pub fn float(v: f64) -> Value {
		let bits = v.to_bits() & !0b11u64;
		Value::Float(f64::from_bits(bits))
	}

	#[inline]
	pub fn obj(o: Rc<Object>) -> Value {
		Value::Obj(o)
	}

	#[inline]
	pub fn as_int(&self) -> Option<i64> {
		match self {
			Value::Int(v) => Some(*v),
			_ => None,
		}
	}

	#[inline]
	pub fn as_float(&self) -> Option<f64> {
		match self {
			Value::Float(v) => Some(*v),
			_ => None,
		}
	}

	#[inline]
	pub fn as_obj(&self) -> Option<&Rc<Object>> {
		match self {
			Value::Obj(o) => Some(o),
			_ => None,
		}
	}

	/// Identity comparison. Heap values compare by pointer; scalars compare
	/// by value, matching the only identity CPython-alikes make observable
	/// for small ints/floats through `is`.
	pub fn is(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::Int(a), Value::Int(b)) => a == b,
			(Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
			(Value::Obj(a), Value::Obj(b)) => Rc::ptr_eq(a, b),
			_ => false,
		}
	}
}
