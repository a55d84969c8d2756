use std::sync::Arc;

use crate::lookup::{Lookup, SharedLookup};
use crate::merger::MergeSet;
use crate::provider::ProviderHandle;
use crate::service::{Service, ServiceKey};

/// Provider sub-lookups in registry order followed by the base lookup.
pub(crate) struct PartsLookup {
	pub(crate) parts: Vec<SharedLookup>,
}

impl Lookup for PartsLookup {
	fn collect(&self, key: ServiceKey, out: &mut Vec<Service>) {
		for part in &self.parts {
			part.collect(key, out);
		}
	}
}

/// One published generation. Never mutated after publication.
pub(crate) struct CompositeView {
	pub(crate) generation: u64,
	/// Providers that contributed a part, aligned with the leading entries of `unmerged.parts`.
	pub(crate) providers: Vec<ProviderHandle>,
	pub(crate) unmerged: Arc<PartsLookup>,
	pub(crate) merges: MergeSet,
}

impl CompositeView {
	pub(crate) fn base_only(base: SharedLookup) -> Self {
		Self {
			generation: 0,
			providers: Vec::new(),
			unmerged: Arc::new(PartsLookup { parts: vec![base] }),
			merges: MergeSet::default(),
		}
	}

	pub(crate) fn provider_parts(&self) -> &[SharedLookup] {
		&self.unmerged.parts[..self.providers.len()]
	}

	/// Matches for `key` contributed by scan stage `index`, or `None` once all
	/// stages are exhausted. Merged capabilities have a single stage.
	pub(crate) fn batch(&self, key: ServiceKey, index: usize) -> Option<Vec<Service>> {
		if self.merges.excluded.contains(&key) {
			return (index == 0).then(|| {
				self.merges
					.merged
					.iter()
					.filter(|s| s.key() == key)
					.cloned()
					.collect()
			});
		}
		let part = self.unmerged.parts.get(index)?;
		let mut out = Vec::new();
		part.collect(key, &mut out);
		Some(out)
	}
}

impl Lookup for CompositeView {
	fn collect(&self, key: ServiceKey, out: &mut Vec<Service>) {
		if self.merges.excluded.contains(&key) {
			out.extend(self.merges.merged.iter().filter(|s| s.key() == key).cloned());
		} else {
			self.unmerged.collect(key, out);
		}
	}
}
