//! Module registry (§6 `new_module`).
//!
//! Grounded on the teacher's assembly registry (`structured/context.rs`'s
//! `FxHashMap<&AssemblyName, &Assembly>`): a VM-wide, construction-time-only
//! map from name to the loaded unit. Here the map is keyed by interned name
//! id rather than a string, via `nohash-hasher` the same way the teacher
//! keys its generic-instantiation caches by already-hashed identity.
//!
//! A module's globals live in its `Object`'s own `AttrDict`, the same way a
//! `Type`'s class dict lives in the type's own `Object` (§4.B) — there is no
//! separate globals table to keep in sync.

use std::collections::HashMap;
use std::rc::Rc;

use nohash_hasher::BuildNoHashHasher;

use crate::intern::NameId;
use crate::value::Value;

#[derive(Debug)]
pub struct Module {
	pub name: String,
}

#[derive(Debug, Default)]
pub struct ModuleRegistry {
	modules: HashMap<NameId, Value, BuildNoHashHasher<usize>>,
}

impl ModuleRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, name: NameId) -> Option<&Value> {
		self.modules.get(&name)
	}

	pub fn insert(&mut self, name: NameId, module: Value) {
		self.modules.insert(name, module);
	}

	pub fn contains(&self, name: NameId) -> bool {
		self.modules.contains_key(&name)
	}
}

pub fn new_module_value(ty: crate::types::TypeId, name: impl Into<String>) -> Value {
	use crate::object::{Object, Payload};
	let name = name.into();
	Value::obj(Rc::new(Object::new_with_dict(ty, Payload::Module(Rc::new(Module { name })))))
}

pub fn module_dict(module: &Value) -> &std::cell::RefCell<crate::attrdict::AttrDict> {
	let Value::Obj(obj) = module else { panic!("module value is always heap-allocated") };
	obj.attrs.as_ref().expect("modules always carry a globals dict")
}
