//! Providers and the sources that list them.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CompositeError, ProviderError};
use crate::lookup::SharedLookup;
use crate::subscription::{Listeners, Subscription};

/// Contributes an additional lookup built on top of a base lookup.
pub trait LookupProvider: Send + Sync {
	/// Builds this provider's sub-lookup.
	///
	/// Must not cache; the composite owns reuse. A provider with nothing valid
	/// to return fails with [`ProviderError::Contract`].
	fn create_additional_lookup(&self, base: &SharedLookup) -> Result<SharedLookup, ProviderError>;

	/// Name used in logs and errors.
	fn name(&self) -> &str {
		std::any::type_name::<Self>()
	}
}

/// Provider descriptor. Equality is pointer identity, see [`same_provider`].
pub type ProviderHandle = Arc<dyn LookupProvider>;

pub fn same_provider(a: &ProviderHandle, b: &ProviderHandle) -> bool {
	Arc::ptr_eq(a, b)
}

struct FnProvider<F> {
	name: String,
	build: F,
}

impl<F> LookupProvider for FnProvider<F>
where
	F: Fn(&SharedLookup) -> Result<SharedLookup, ProviderError> + Send + Sync,
{
	fn create_additional_lookup(&self, base: &SharedLookup) -> Result<SharedLookup, ProviderError> {
		(self.build)(base)
	}

	fn name(&self) -> &str {
		&self.name
	}
}

/// Wraps a closure as a provider.
pub fn provider_fn<F>(name: impl Into<String>, build: F) -> ProviderHandle
where
	F: Fn(&SharedLookup) -> Result<SharedLookup, ProviderError> + Send + Sync + 'static,
{
	Arc::new(FnProvider {
		name: name.into(),
		build,
	})
}

/// Change callback installed by a composite on its source. The result reaches
/// whoever mutated the source.
pub type RefreshCallback = dyn Fn() -> Result<(), CompositeError> + Send + Sync;

/// Live, ordered sequence of providers.
pub trait ProviderSource: Send + Sync {
	/// Current providers in order. Duplicates are passed through as-is.
	fn providers(&self) -> Vec<ProviderHandle>;

	/// Calls `on_change` after every change to the sequence.
	fn watch(&self, on_change: Arc<RefreshCallback>) -> Subscription;
}

impl Listeners<RefreshCallback> {
	/// Runs every watcher and returns the first error. Later errors are logged.
	pub fn refresh_all(&self) -> Result<(), CompositeError> {
		let mut first = None;
		for watcher in self.snapshot() {
			if let Err(err) = watcher() {
				if first.is_none() {
					first = Some(err);
				} else {
					tracing::warn!(error = %err, "additional refresh failure");
				}
			}
		}
		first.map_or(Ok(()), Err)
	}
}

/// In-memory provider source. Every mutation synchronously refreshes the
/// composites watching it and returns the first refresh error.
pub struct StaticProviders {
	providers: Mutex<Vec<ProviderHandle>>,
	watchers: Arc<Listeners<RefreshCallback>>,
}

impl Default for StaticProviders {
	fn default() -> Self {
		Self {
			providers: Mutex::new(Vec::new()),
			watchers: Listeners::new(),
		}
	}
}

impl StaticProviders {
	pub fn new(providers: impl IntoIterator<Item = ProviderHandle>) -> Arc<Self> {
		let source = Self::default();
		*source.providers.lock() = providers.into_iter().collect();
		Arc::new(source)
	}

	pub fn set(&self, providers: impl IntoIterator<Item = ProviderHandle>) -> Result<(), CompositeError> {
		*self.providers.lock() = providers.into_iter().collect();
		self.fire()
	}

	pub fn push(&self, provider: ProviderHandle) -> Result<(), CompositeError> {
		self.providers.lock().push(provider);
		self.fire()
	}

	/// Removes every occurrence of `provider`. Watchers only run if something was removed.
	pub fn remove(&self, provider: &ProviderHandle) -> Result<bool, CompositeError> {
		let removed = {
			let mut providers = self.providers.lock();
			let before = providers.len();
			providers.retain(|p| !same_provider(p, provider));
			providers.len() != before
		};
		if removed {
			self.fire()?;
		}
		Ok(removed)
	}

	/// Runs the watchers without changing anything.
	pub fn fire(&self) -> Result<(), CompositeError> {
		self.watchers.refresh_all()
	}

	pub fn watcher_count(&self) -> usize {
		self.watchers.len()
	}
}

impl ProviderSource for StaticProviders {
	fn providers(&self) -> Vec<ProviderHandle> {
		self.providers.lock().clone()
	}

	fn watch(&self, on_change: Arc<RefreshCallback>) -> Subscription {
		self.watchers.subscribe(on_change)
	}
}

impl fmt::Debug for StaticProviders {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let providers = self.providers.lock();
		f.debug_struct("StaticProviders")
			.field("providers", &providers.iter().map(|p| p.name()).collect::<Vec<_>>())
			.field("watchers", &self.watchers.len())
			.finish()
	}
}
