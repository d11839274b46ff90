//! `Type` / `TypeTable` (§3, §4.B).
//!
//! A `Type` is nothing but an index into a process-wide (here: VM-wide)
//! table. Each entry owns the `Value` that represents the type itself (an
//! `Object` whose own type is `type`), so a class's methods and class
//! variables live in that object's `AttrDict` exactly as an instance's
//! attributes would.

use std::cell::Cell;

use bitflags::bitflags;

use crate::attrdict::AttrDict;
use crate::object::{Object, Payload};
use crate::value::Value;

/// Index into a [`TypeTable`]. `object` and `type` are bootstrapped first
/// and therefore always occupy ids 0 and 1 (§9 "two-step bootstrap").
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TypeId(pub(crate) usize);

impl nohash_hasher::IsEnabled for TypeId {}

impl TypeId {
	pub const OBJECT: TypeId = TypeId(0);
	pub const TYPE: TypeId = TypeId(1);

	#[inline]
	pub fn index(self) -> usize {
		self.0
	}
}

bitflags! {
	/// Precomputed dunder-hook presence bits (§2.2 supplemented feature).
	/// OR'd down from the base chain whenever a type's class dict is
	/// finalized, so `CallDispatcher`/`AttrResolver` can skip an MRO walk
	/// in the common case instead of probing every ancestor's `AttrDict`.
	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct TypeFlags: u32 {
		const HAS_NEW    = 1 << 0;
		const HAS_INIT   = 1 << 1;
		const HAS_CALL   = 1 << 2;
		const HAS_GET    = 1 << 3;
		const HAS_SET    = 1 << 4;
		const HAS_LEN    = 1 << 5;
		const HAS_REPR   = 1 << 6;
		const HAS_STR    = 1 << 7;
		const HAS_ITER   = 1 << 8;
	}
}

#[derive(Debug)]
pub struct TypeEntry {
	pub name: String,
	pub base: Option<TypeId>,
	pub flags: Cell<TypeFlags>,
	/// The type's own `Object`; its `AttrDict` is this type's class dict.
	pub object: Value,
}

impl TypeEntry {
	pub fn class_dict(&self) -> &AttrDict {
		let Value::Obj(obj) = &self.object else { unreachable!("a type's own value is always heap-allocated") };
		obj.attrs.as_ref().expect("types always carry a class dict")
	}
}

#[derive(Debug)]
pub struct TypeTable {
	entries: Vec<TypeEntry>,
}

impl TypeTable {
	/// Bootstraps `object` and `type` (§9 "self-referential root type"):
	/// `type(type) == type`, `type`'s base is `object`, `object`'s base is
	/// the sentinel (`None` here).
	pub fn new() -> Self {
		let mut table = TypeTable { entries: Vec::new() };

		// Step 1: allocate both entries with a placeholder object so that
		// `type`'s payload (its own index) can be computed once both ids
		// are known; the table is briefly inconsistent in between.
		table.entries.push(TypeEntry {
			name: "object".to_string(),
			base: None,
			flags: Cell::new(TypeFlags::empty()),
			object: Value::Int(0), // placeholder, patched below
		});
		table.entries.push(TypeEntry {
			name: "type".to_string(),
			base: Some(TypeId::OBJECT),
			flags: Cell::new(TypeFlags::empty()),
			object: Value::Int(0), // placeholder, patched below
		});

		// Step 2: every type's own Object has type = `type`.
		let object_obj = Value::obj(std::rc::Rc::new(Object::new_with_dict(TypeId::TYPE, Payload::Type(TypeId::OBJECT))));
		let type_obj = Value::obj(std::rc::Rc::new(Object::new_with_dict(TypeId::TYPE, Payload::Type(TypeId::TYPE))));
		table.entries[0].object = object_obj;
		table.entries[1].object = type_obj;

		table
	}

	pub fn push(&mut self, name: impl Into<String>, base: Option<TypeId>) -> TypeId {
		let id = TypeId(self.entries.len());
		let flags = base.map(|b| self.entries[b.0].flags.get()).unwrap_or(TypeFlags::empty());
		let object = Value::obj(std::rc::Rc::new(Object::new_with_dict(TypeId::TYPE, Payload::Type(id))));
		self.entries.push(TypeEntry { name: name.into(), base, flags: Cell::new(flags), object });
		id
	}

	#[inline]
	pub fn get(&self, id: TypeId) -> &TypeEntry {
		&self.entries[id.0]
	}

	#[inline]
	pub fn name(&self, id: TypeId) -> &str {
		&self.entries[id.0].name
	}

	/// Walks `base` from `T` to confirm it reaches `object` (§8 invariant 4)
	/// and implements `isinstance` (§4.B).
	pub fn is_subtype(&self, mut ty: TypeId, target: TypeId) -> bool {
		loop {
			if ty == target {
				return true;
			}
			match self.entries[ty.0].base {
				Some(base) => ty = base,
				None => return false,
			}
		}
	}

	/// Method resolution order: `ty`, then its ancestors up to `object`.
	/// Single inheritance (§9) makes this a straight-line walk, not a C3
	/// linearization.
	pub fn mro(&self, ty: TypeId) -> impl Iterator<Item = TypeId> + '_ {
		let mut current = Some(ty);
		std::iter::from_fn(move || {
			let id = current?;
			current = self.entries[id.0].base;
			Some(id)
		})
	}

	/// Recomputes `TypeFlags` for `ty` from its own class dict and its
	/// base's (already-computed) flags. Called once when a class body
	/// finishes executing (§4.B).
	pub fn finalize_flags(&self, ty: TypeId, dunders: &crate::dunders::Dunders) {
		let dict = self.get(ty).class_dict();
		let mut flags = self.get(ty).base.map(|b| self.get(b).flags.get()).unwrap_or(TypeFlags::empty());
		let checks: &[(crate::intern::NameId, TypeFlags)] = &[
			(dunders.new, TypeFlags::HAS_NEW),
			(dunders.init, TypeFlags::HAS_INIT),
			(dunders.call, TypeFlags::HAS_CALL),
			(dunders.get, TypeFlags::HAS_GET),
			(dunders.set, TypeFlags::HAS_SET),
			(dunders.len, TypeFlags::HAS_LEN),
			(dunders.repr, TypeFlags::HAS_REPR),
			(dunders.str, TypeFlags::HAS_STR),
			(dunders.iter, TypeFlags::HAS_ITER),
		];
		for (name, flag) in checks {
			if dict.contains(*name) {
				flags |= *flag;
			}
		}
		self.get(ty).flags.set(flags);
	}

	pub fn flags(&self, ty: TypeId) -> TypeFlags {
		self.entries[ty.0].flags.get()
	}
}

impl Default for TypeTable {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn object_and_type_bootstrap_self_referentially() {
		let table = TypeTable::new();
		let Value::Obj(type_obj) = &table.get(TypeId::TYPE).object else { unreachable!() };
		assert_eq!(type_obj.ty, TypeId::TYPE);
		let Payload::Type(id) = type_obj.payload else { unreachable!() };
		assert_eq!(id, TypeId::TYPE);
		assert_eq!(table.get(TypeId::TYPE).base, Some(TypeId::OBJECT));
		assert_eq!(table.get(TypeId::OBJECT).base, None);
	}

	#[test]
	fn base_walk_reaches_object_in_finitely_many_steps() {
		let mut table = TypeTable::new();
		let a = table.push("A", Some(TypeId::OBJECT));
		let b = table.push("B", Some(a));
		assert!(table.is_subtype(b, a));
		assert!(table.is_subtype(b, TypeId::OBJECT));
		assert!(table.mro(b).count() <= table_depth(&table, b) + 1);
	}

	fn table_depth(table: &TypeTable, ty: TypeId) -> usize {
		table.mro(ty).count()
	}
}
