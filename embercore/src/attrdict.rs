//! Ordered name→value mapping with optional perfect-hash lookup (§4.C).
//!
//! Entries are kept in insertion order in `entries` for `items()`. Lookup
//! goes through either a plain hashmap index (the common, still-mutable
//! case) or, after [`AttrDict::try_perfect_rehash`], a flat open-addressed
//! table chosen so every key present at rehash time resolves in exactly one
//! probe (§8 invariant 6). Adding a *new* key after perfection falls back to
//! the hashmap index rather than re-searching for a bigger perfect table —
//! perfection is meant to be struck once, after a class body or module
//! finishes executing, not maintained continuously.

use fxhash::FxHashMap;

use crate::intern::NameId;
use crate::value::Value;

/// Load factor used by `_try_perfect_rehash` when no caller-supplied value
/// is given (§4.C "≈0.67").
pub const DEFAULT_LOAD_FACTOR: f64 = 0.67;

const MAX_SEED_ATTEMPTS: u64 = 4096;

enum Index {
	Map(FxHashMap<NameId, usize>),
	Perfect { capacity: usize, seed: u64, slots: Vec<i32> },
}

impl std::fmt::Debug for Index {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Index::Map(m) => write!(f, "Map({} entries)", m.len()),
			Index::Perfect { capacity, .. } => write!(f, "Perfect(capacity={capacity})"),
		}
	}
}

#[derive(Debug)]
pub struct AttrDict {
	entries: Vec<(NameId, Value)>,
	index: Index,
}

impl AttrDict {
	pub fn new() -> Self {
		AttrDict { entries: Vec::new(), index: Index::Map(FxHashMap::default()) }
	}

	fn slot_of(&self, name: NameId) -> Option<usize> {
		match &self.index {
			Index::Map(map) => map.get(&name).copied(),
			Index::Perfect { capacity, seed, slots } => {
				let h = perfect_hash(name, *seed, *capacity);
				let idx = slots[h];
				if idx >= 0 && self.entries[idx as usize].0 == name {
					Some(idx as usize)
				} else {
					None
				}
			}
		}
	}

	#[inline]
	pub fn get(&self, name: NameId) -> Option<&Value> {
		self.slot_of(name).map(|i| &self.entries[i].1)
	}

	#[inline]
	pub fn try_get(&self, name: NameId) -> Option<&Value> {
		self.get(name)
	}

	#[inline]
	pub fn contains(&self, name: NameId) -> bool {
		self.slot_of(name).is_some()
	}

	pub fn set(&mut self, name: NameId, value: Value) {
		if let Some(i) = self.slot_of(name) {
			self.entries[i].1 = value;
			return;
		}

		match &mut self.index {
			Index::Map(map) => {
				let i = self.entries.len();
				self.entries.push((name, value));
				map.insert(name, i);
			}
			Index::Perfect { capacity, seed, slots } => {
				let h = perfect_hash(name, *seed, *capacity);
				if slots[h] < 0 {
					// The name's computed slot is still free: this is the
					// common case for a dict created via
					// `with_perfect_params` ahead of any insertion, whose
					// (capacity, seed) were chosen against exactly this
					// key set, so every first-ever `set` of a known name
					// lands in its own reserved slot.
					let i = self.entries.len();
					slots[h] = i as i32;
					self.entries.push((name, value));
				} else {
					// A genuine collision with a name outside the set the
					// table was perfected against; downgrade permanently.
					let i = self.entries.len();
					self.entries.push((name, value));
					let mut map = FxHashMap::with_capacity_and_hasher(self.entries.len(), Default::default());
					for (j, (id, _)) in self.entries.iter().enumerate() {
						map.insert(*id, j);
					}
					self.index = Index::Map(map);
				}
			}
		}
	}

	/// Starts a dict already in perfect-hash mode, with every slot free, for
	/// a `(capacity, seed)` pair a prior call to [`AttrDict::try_perfect_rehash`]
	/// (typically on a throwaway probe dict over the same key set) already
	/// validated collision-free (§4.C, §4.J "so every `Frame`'s locals dict
	/// can start in perfect-hash mode").
	pub fn with_perfect_params(capacity: usize, seed: u64) -> Self {
		AttrDict { entries: Vec::new(), index: Index::Perfect { capacity, seed, slots: vec![-1; capacity] } }
	}

	pub fn items(&self) -> impl Iterator<Item = (NameId, &Value)> {
		self.entries.iter().map(|(id, v)| (*id, v))
	}

	pub fn update(&mut self, other: &AttrDict) {
		for (name, value) in other.items() {
			self.set(name, value.clone());
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Chooses a capacity (via `load_factor`) and searches for a seed under
	/// which every currently-present key hashes to a distinct slot. Leaves
	/// the dict in hashmap mode (never errors) if no seed within the search
	/// budget works.
	pub fn try_perfect_rehash(&mut self, load_factor: f64) {
		let n = self.entries.len();
		if n == 0 {
			return;
		}

		let capacity = ((n as f64 / load_factor).ceil() as usize).max(n).next_power_of_two();

		for seed in 0..MAX_SEED_ATTEMPTS {
			let mut seen = vec![false; capacity];
			let mut collided = false;
			for (id, _) in &self.entries {
				let h = perfect_hash(*id, seed, capacity);
				if seen[h] {
					collided = true;
					break;
				}
				seen[h] = true;
			}
			if collided {
				continue;
			}

			let mut slots = vec![-1i32; capacity];
			for (i, (id, _)) in self.entries.iter().enumerate() {
				let h = perfect_hash(*id, seed, capacity);
				slots[h] = i as i32;
			}
			self.index = Index::Perfect { capacity, seed, slots };
			return;
		}
	}

	/// The `(capacity, seed)` pair chosen by a prior, successful
	/// [`AttrDict::try_perfect_rehash`]. Used by the bytecode optimizer
	/// (§4.J) to precompute a locals table's perfect-hash parameters ahead
	/// of time, from a throwaway `AttrDict` built over the code object's
	/// declared local names.
	pub(crate) fn perfect_params(&self) -> Option<(usize, u64)> {
		match &self.index {
			Index::Perfect { capacity, seed, .. } => Some((*capacity, *seed)),
			Index::Map(_) => None,
		}
	}
}

impl Default for AttrDict {
	fn default() -> Self {
		Self::new()
	}
}

#[inline]
fn perfect_hash(name: NameId, seed: u64, capacity: usize) -> usize {
	debug_assert!(capacity.is_power_of_two());
	let mixed = (name.index() as u64).wrapping_add(seed).wrapping_mul(0x9e3779b97f4a7c15);
	((mixed >> 32) as usize) & (capacity - 1)
}
