//! Collapsing several services of one capability into a single one.
//!
//! A merger is itself a service, registered under `dyn LookupMerger` in the
//! base lookup or any provider's sub-lookup. When a composite finds one, every
//! service of [`LookupMerger::key`] is hidden from queries and replaced by the
//! single result of [`LookupMerger::merge`].

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::error::{CompositeError, ProviderError};
use crate::lookup::SharedLookup;
use crate::options::FailurePolicy;
use crate::service::{Service, ServiceKey};

pub trait LookupMerger: Send + Sync {
	/// Capability this merger replaces.
	fn key(&self) -> ServiceKey;

	/// Builds the replacement from the unmerged lookup.
	///
	/// The lookup passed in is the one the composite was assembled from; it is
	/// kept alive by the returned service if the merger captures it.
	fn merge(&self, lookup: &SharedLookup) -> Result<Service, ProviderError>;
}

/// Registers `merger` as a service.
pub fn merger_service(merger: Arc<dyn LookupMerger>) -> Service {
	Service::new(merger)
}

struct FnMerger<T: ?Sized> {
	merge: Box<dyn Fn(&SharedLookup) -> Result<Arc<T>, ProviderError> + Send + Sync>,
}

impl<T: ?Sized + Send + Sync + 'static> LookupMerger for FnMerger<T> {
	fn key(&self) -> ServiceKey {
		ServiceKey::of::<T>()
	}

	fn merge(&self, lookup: &SharedLookup) -> Result<Service, ProviderError> {
		(self.merge)(lookup).map(Service::new)
	}
}

/// Builds a typed merger for capability `T`.
pub fn merger<T, F>(merge: F) -> Arc<dyn LookupMerger>
where
	T: ?Sized + Send + Sync + 'static,
	F: Fn(&SharedLookup) -> Result<Arc<T>, ProviderError> + Send + Sync + 'static,
{
	Arc::new(FnMerger::<T> {
		merge: Box::new(merge),
	})
}

/// Mergers active in one published generation.
#[derive(Default)]
pub(crate) struct MergeSet {
	pub(crate) mergers: Vec<Service>,
	pub(crate) excluded: FxHashSet<ServiceKey>,
	pub(crate) merged: Vec<Service>,
	/// A merger was skipped; the next recomputation must run mergers again.
	pub(crate) incomplete: bool,
}

impl MergeSet {
	/// Merger services visible in `lookup`, in scan order.
	pub(crate) fn discover(lookup: &SharedLookup) -> Vec<Service> {
		let mut mergers = Vec::new();
		lookup.collect(ServiceKey::of::<dyn LookupMerger>(), &mut mergers);
		mergers
	}

	/// Runs `mergers` against `lookup`. The first merger for a key wins.
	///
	/// With `prior` set, keys it already merged keep their merged service and
	/// only the mergers it skipped run again. `prior` must have been built from
	/// the same mergers over the same parts.
	pub(crate) fn build(
		label: &str,
		mergers: Vec<Service>,
		lookup: &SharedLookup,
		policy: FailurePolicy,
		prior: Option<&MergeSet>,
	) -> Result<Self, CompositeError> {
		let mut set = Self::default();
		for service in &mergers {
			let Some(merger) = service.downcast::<dyn LookupMerger>() else {
				continue;
			};
			let key = merger.key();
			if set.excluded.contains(&key) {
				tracing::debug!(label, key = %key, "shadowed merger ignored");
				continue;
			}
			if let Some(done) = prior.and_then(|p| p.merged.iter().find(|m| m.key() == key)) {
				set.excluded.insert(key);
				set.merged.push(done.clone());
				continue;
			}
			let merged = merger.merge(lookup).and_then(|merged| {
				if merged.key() == key {
					Ok(merged)
				} else {
					Err(ProviderError::contract(format!(
						"merged service registered under `{}`",
						merged.key()
					)))
				}
			});
			match merged {
				Ok(merged) => {
					set.excluded.insert(key);
					set.merged.push(merged);
				}
				Err(source) => match policy {
					FailurePolicy::Abort => {
						return Err(CompositeError::MergeFailed {
							key: key.type_name(),
							source,
						});
					}
					FailurePolicy::Skip => {
						tracing::warn!(label, key = %key, error = %source, "merger skipped");
						set.incomplete = true;
					}
				},
			}
		}
		set.mergers = mergers;
		Ok(set)
	}

	pub(crate) fn same_mergers(&self, other: &[Service]) -> bool {
		self.mergers.len() == other.len()
			&& self.mergers.iter().zip(other).all(|(a, b)| a.ptr_eq(b))
	}

	/// Whether `other` hides and supplies exactly the same services.
	pub(crate) fn same_outcome(&self, other: &MergeSet) -> bool {
		self.same_mergers(&other.mergers)
			&& self.excluded == other.excluded
			&& self.merged.len() == other.merged.len()
			&& self.merged.iter().zip(&other.merged).all(|(a, b)| a.ptr_eq(b))
	}
}
