//! Composite lookup over a base lookup and a live provider sequence.
//!
//! # Role
//!
//! Owns the provider sub-lookups and publishes the merged view. Recomputation
//! runs whenever the [`ProviderSource`] reports a change and can be forced with
//! [`CompositeLookup::refresh`].
//!
//! # Invariants
//!
//! - Recomputations are serialized; publication is a single `ArcSwap` store.
//! - A provider present in both the old and new sequence keeps its sub-lookup.
//!   Duplicate occurrences are matched to prior occurrences in order.
//! - Subscribers are notified once per published generation, after publication.
//!   Notifications run outside the recomputation lock, so concurrent refreshes
//!   may deliver them out of generation order.

mod query;
mod view;

use std::fmt;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

pub use self::query::{QueryIter, QueryResult};
use self::view::{CompositeView, PartsLookup};
use crate::error::CompositeError;
use crate::lookup::{Lookup, SharedLookup};
use crate::merger::MergeSet;
use crate::options::{CompositeOptions, FailurePolicy};
use crate::provider::{ProviderSource, RefreshCallback, same_provider};
use crate::service::{Service, ServiceKey};
use crate::subscription::{Listeners, Subscription};

type ChangeListener = dyn Fn() + Send + Sync;

/// Merged, self-updating view of a base lookup and its providers' sub-lookups.
///
/// Queries scan provider sub-lookups in source order, then the base lookup.
/// Cloning is cheap and shares the same state; the source watch is released
/// when the last clone (and the last handle from [`as_lookup`](Self::as_lookup))
/// is dropped.
#[derive(Clone)]
pub struct CompositeLookup {
	inner: Arc<Inner>,
}

struct Inner {
	options: CompositeOptions,
	base: SharedLookup,
	source: Arc<dyn ProviderSource>,
	view: ArcSwap<CompositeView>,
	refresh_lock: Mutex<()>,
	listeners: Arc<Listeners<ChangeListener>>,
	watch: OnceLock<Subscription>,
}

impl CompositeLookup {
	/// Builds the composite and computes its first generation.
	pub fn new(base: SharedLookup, source: Arc<dyn ProviderSource>) -> Result<Self, CompositeError> {
		Self::with_options(base, source, CompositeOptions::default())
	}

	pub fn with_options(
		base: SharedLookup,
		source: Arc<dyn ProviderSource>,
		options: CompositeOptions,
	) -> Result<Self, CompositeError> {
		let inner = Arc::new(Inner {
			view: ArcSwap::from_pointee(CompositeView::base_only(base.clone())),
			options,
			base,
			source,
			refresh_lock: Mutex::new(()),
			listeners: Listeners::new(),
			watch: OnceLock::new(),
		});

		// Watch before the first read so no change slips between the two.
		let weak = Arc::downgrade(&inner);
		let on_change: Arc<RefreshCallback> = Arc::new(move || match weak.upgrade() {
			Some(inner) => inner.refresh(),
			None => Ok(()),
		});
		let watch = inner.source.watch(on_change);
		let _ = inner.watch.set(watch);

		inner.refresh()?;
		Ok(Self { inner })
	}

	/// Services registered under `T`, pinned to the current generation.
	pub fn query<T: ?Sized + Send + Sync + 'static>(&self) -> QueryResult<T> {
		QueryResult::new(self.inner.view.load_full())
	}

	/// First service registered under `T`.
	pub fn lookup<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
		self.query::<T>().first()
	}

	/// Calls `on_change` after every published recomputation. Listeners are
	/// expected to query again; no payload is passed.
	pub fn subscribe(&self, on_change: impl Fn() + Send + Sync + 'static) -> Subscription {
		self.inner.listeners.subscribe(Arc::new(on_change))
	}

	/// Recomputes from the source's current providers.
	pub fn refresh(&self) -> Result<(), CompositeError> {
		self.inner.refresh()
	}

	/// Number of published recomputations. The initial base-only view is generation 0.
	pub fn generation(&self) -> u64 {
		self.inner.view.load().generation
	}

	/// Current provider sub-lookups in source order.
	pub fn sub_lookups(&self) -> Vec<SharedLookup> {
		self.inner.view.load().provider_parts().to_vec()
	}

	pub fn base(&self) -> &SharedLookup {
		&self.inner.base
	}

	pub fn options(&self) -> &CompositeOptions {
		&self.inner.options
	}

	/// This composite as a plain lookup, usable as the base or part of another composite.
	pub fn as_lookup(&self) -> SharedLookup {
		self.inner.clone()
	}
}

impl Inner {
	fn refresh(&self) -> Result<(), CompositeError> {
		let published = {
			let _guard = self.refresh_lock.lock();
			self.recompute()?
		};
		if published || self.options.notify_unchanged {
			for listener in self.listeners.snapshot() {
				listener();
			}
		}
		Ok(())
	}

	/// Must be called with `refresh_lock` held. Returns whether a new view was published.
	fn recompute(&self) -> Result<bool, CompositeError> {
		let label = self.options.label.as_str();
		let old = self.view.load_full();
		let old_parts = old.provider_parts();
		let providers = self.source.providers();

		let mut taken = vec![false; old.providers.len()];
		let mut kept = Vec::with_capacity(providers.len());
		let mut parts = Vec::with_capacity(providers.len() + 1);
		let mut reused = 0usize;

		for provider in providers {
			let prior = old
				.providers
				.iter()
				.enumerate()
				.position(|(i, p)| !taken[i] && same_provider(p, &provider));

			if let Some(i) = prior {
				taken[i] = true;
				reused += 1;
				tracing::trace!(label, provider = provider.name(), "sub-lookup reused");
				parts.push(old_parts[i].clone());
			} else {
				match provider.create_additional_lookup(&self.base) {
					Ok(part) => parts.push(part),
					Err(err) => {
						let err = CompositeError::from_provider(provider.name(), err);
						match self.options.on_provider_error {
							FailurePolicy::Abort => return Err(err),
							FailurePolicy::Skip => {
								tracing::warn!(label, provider = provider.name(), error = %err, "provider skipped");
								continue;
							}
						}
					}
				}
			}
			kept.push(provider);
		}

		let same_parts = kept.len() == old.providers.len()
			&& kept.iter().zip(&old.providers).all(|(a, b)| same_provider(a, b));

		parts.push(self.base.clone());
		let unmerged = Arc::new(PartsLookup { parts });
		let unmerged_lookup: SharedLookup = unmerged.clone();
		let mergers = MergeSet::discover(&unmerged_lookup);

		let retry = same_parts && old.merges.same_mergers(&mergers);
		if retry && !old.merges.incomplete {
			tracing::trace!(label, generation = old.generation, "composite unchanged");
			return Ok(false);
		}

		let prior = retry.then_some(&old.merges);
		let merges = MergeSet::build(
			label,
			mergers,
			&unmerged_lookup,
			self.options.on_provider_error,
			prior,
		)?;
		if prior.is_some_and(|prior| prior.same_outcome(&merges)) {
			tracing::trace!(label, generation = old.generation, "skipped mergers still failing");
			return Ok(false);
		}
		let generation = old.generation + 1;
		tracing::debug!(
			label,
			generation,
			parts = kept.len(),
			reused,
			built = kept.len() - reused,
			merged = merges.merged.len(),
			"composite lookup recomputed"
		);
		self.view.store(Arc::new(CompositeView {
			generation,
			providers: kept,
			unmerged,
			merges,
		}));
		Ok(true)
	}
}

impl Lookup for Inner {
	fn collect(&self, key: ServiceKey, out: &mut Vec<Service>) {
		self.view.load().collect(key, out);
	}
}

impl fmt::Debug for CompositeLookup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let view = self.inner.view.load();
		f.debug_struct("CompositeLookup")
			.field("label", &self.inner.options.label)
			.field("generation", &view.generation)
			.field(
				"providers",
				&view.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
			)
			.field("listeners", &self.inner.listeners.len())
			.finish()
	}
}

#[cfg(test)]
mod tests;
