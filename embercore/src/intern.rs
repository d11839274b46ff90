//! VM-wide name interning pool.
//!
//! Every identifier-like string (attribute names, local names, type names) is
//! interned exactly once per [`crate::vm::Vm`] instance into a [`NameId`], so
//! `AttrDict` keys and locals-dict lookups reduce to `usize` comparisons. The
//! arena backing the strings follows the same `Pin<Box<Bump>>` + lifetime
//! laundering shape the rest of this codebase uses for VM-owned, 'l-tied data.

use std::mem::transmute;
use std::pin::Pin;

use bumpalo::Bump;
use fxhash::FxHashMap;

/// An interned name: an index into [`Interner`]'s string table.
///
/// Two `NameId`s compare equal iff their underlying strings are equal,
/// because interning is deduplicated at insertion time.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NameId(pub(crate) usize);

impl nohash_hasher::IsEnabled for NameId {}

impl NameId {
	#[inline]
	pub fn index(self) -> usize {
		self.0
	}
}

#[derive(Debug)]
pub struct Interner {
	bump: Pin<Box<Bump>>,
	strings: Vec<&'static str>,
	ids: FxHashMap<&'static str, NameId>,
}

impl Interner {
	pub fn new() -> Self {
		Interner {
			bump: Pin::new(Box::new(Bump::new())),
			strings: Vec::new(),
			ids: FxHashMap::default(),
		}
	}

	/// Interns `name`, returning its stable id. Interning the same text twice
	/// returns the same id without a second allocation.
	pub fn intern(&mut self, name: &str) -> NameId {
		if let Some(id) = self.ids.get(name) {
			return *id;
		}

		// SAFETY: the arena is owned by `self` for its entire lifetime and is
		// never reset or dropped before `self` is; the resulting reference is
		// only ever handed out with a lifetime no longer than `&self`.
		let bump: &'static Bump = unsafe { transmute(&*self.bump) };
		let interned: &'static str = bump.alloc_str(name);

		let id = NameId(self.strings.len());
		self.strings.push(interned);
		self.ids.insert(interned, id);
		id
	}

	#[inline]
	pub fn resolve(&self, id: NameId) -> &str {
		self.strings[id.0]
	}

	#[inline]
	pub fn lookup(&self, name: &str) -> Option<NameId> {
		self.ids.get(name).copied()
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.strings.len()
	}
}

impl Default for Interner {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn interning_same_text_returns_same_id() {
		let mut interner = Interner::new();
		let a = interner.intern("foo");
		let b = interner.intern("foo");
		assert_eq!(a, b);
		assert_eq!(interner.resolve(a), "foo");
	}

	#[test]
	fn interning_distinct_text_returns_distinct_ids() {
		let mut interner = Interner::new();
		let a = interner.intern("foo");
		let b = interner.intern("bar");
		assert_ne!(a, b);
	}

	#[test]
	fn lookup_misses_before_interning() {
		let mut interner = Interner::new();
		assert_eq!(interner.lookup("foo"), None);
		let id = interner.intern("foo");
		assert_eq!(interner.lookup("foo"), Some(id));
	}
}
