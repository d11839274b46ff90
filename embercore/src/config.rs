//! VM construction-time configuration (§2.1 ambient stack, §5 "recursion
//! depth limit").

use crate::attrdict::DEFAULT_LOAD_FACTOR;

/// Default recursion limit, matching pocketpy's `recursionlimit = 1000`
/// (`examples/original_source/src/vm.h`).
pub const DEFAULT_RECURSION_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct VmConfig {
	/// §4.I / §5: number of live frames before a new frame raises
	/// `RecursionError`.
	pub recursion_limit: usize,
	/// §4.C: load factor used when perfecting an `AttrDict`.
	pub perfect_hash_load_factor: f64,
	/// §6: when `true`, the VM's stdout/stderr sinks write straight through
	/// to the process's real stdio; when `false`, the host opted out and the
	/// VM owns in-memory sinks instead (`original_source/src/vm.h`'s
	/// `use_stdio`).
	pub use_stdio: bool,
}

impl Default for VmConfig {
	fn default() -> Self {
		VmConfig {
			recursion_limit: DEFAULT_RECURSION_LIMIT,
			perfect_hash_load_factor: DEFAULT_LOAD_FACTOR,
			use_stdio: true,
		}
	}
}
