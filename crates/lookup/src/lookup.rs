//! Service collections.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::service::{Service, ServiceKey};

/// A queryable, ordered collection of services.
pub trait Lookup: Send + Sync {
	/// Appends every service registered under `key`, in this lookup's order.
	fn collect(&self, key: ServiceKey, out: &mut Vec<Service>);
}

/// Shared handle to a lookup. Sub-lookup identity is `Arc` pointer identity.
pub type SharedLookup = Arc<dyn Lookup>;

impl dyn Lookup + '_ {
	/// Returns all services registered under `T`, in lookup order.
	pub fn lookup_all<T: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
		let mut out = Vec::new();
		self.collect(ServiceKey::of::<T>(), &mut out);
		out.iter().filter_map(Service::downcast::<T>).collect()
	}

	/// Returns the first service registered under `T`.
	pub fn lookup<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
		self.lookup_all::<T>().into_iter().next()
	}
}

/// Immutable lookup over a fixed list of services.
#[derive(Clone, Default)]
pub struct FixedLookup {
	services: Vec<Service>,
}

impl FixedLookup {
	pub fn new(services: impl IntoIterator<Item = Service>) -> Self {
		Self {
			services: services.into_iter().collect(),
		}
	}

	pub fn empty() -> Self {
		Self::default()
	}

	/// Appends `value` under capability `T`.
	pub fn with<T: ?Sized + Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
		self.services.push(Service::new(value));
		self
	}

	/// Appends an owned value under its own type.
	pub fn with_value<T: Send + Sync + 'static>(self, value: T) -> Self {
		self.with(Arc::new(value))
	}

	pub fn services(&self) -> &[Service] {
		&self.services
	}

	pub fn shared(self) -> SharedLookup {
		Arc::new(self)
	}
}

impl Lookup for FixedLookup {
	fn collect(&self, key: ServiceKey, out: &mut Vec<Service>) {
		out.extend(self.services.iter().filter(|s| s.key() == key).cloned());
	}
}

impl fmt::Debug for FixedLookup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(&self.services).finish()
	}
}

/// Mutable lookup whose contents are published atomically.
///
/// Readers never block; writers are serialized. Changes here are private to
/// this lookup and are not reported by composites that contain it.
#[derive(Default)]
pub struct InstanceLookup {
	content: ArcSwap<Vec<Service>>,
	write: Mutex<()>,
}

impl InstanceLookup {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&self, service: Service) {
		self.update(|services| services.push(service));
	}

	/// Removes the first service identical to `service`. Returns whether one was found.
	pub fn remove(&self, service: &Service) -> bool {
		let mut removed = false;
		self.update(|services| {
			if let Some(pos) = services.iter().position(|s| s.ptr_eq(service)) {
				services.remove(pos);
				removed = true;
			}
		});
		removed
	}

	/// Replaces the whole content.
	pub fn set(&self, services: impl IntoIterator<Item = Service>) {
		let _guard = self.write.lock();
		self.content.store(Arc::new(services.into_iter().collect()));
	}

	pub fn len(&self) -> usize {
		self.content.load().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn update(&self, f: impl FnOnce(&mut Vec<Service>)) {
		let _guard = self.write.lock();
		let mut next = Vec::clone(&self.content.load());
		f(&mut next);
		self.content.store(Arc::new(next));
	}
}

impl Lookup for InstanceLookup {
	fn collect(&self, key: ServiceKey, out: &mut Vec<Service>) {
		let content = self.content.load();
		out.extend(content.iter().filter(|s| s.key() == key).cloned());
	}
}

impl fmt::Debug for InstanceLookup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InstanceLookup")
			.field("len", &self.len())
			.finish()
	}
}

/// Hides a set of capabilities of an inner lookup.
pub struct ExcludingLookup {
	inner: SharedLookup,
	excluded: FxHashSet<ServiceKey>,
}

impl ExcludingLookup {
	pub fn new(inner: SharedLookup, excluded: impl IntoIterator<Item = ServiceKey>) -> Self {
		Self {
			inner,
			excluded: excluded.into_iter().collect(),
		}
	}

	pub fn is_excluded(&self, key: ServiceKey) -> bool {
		self.excluded.contains(&key)
	}
}

impl Lookup for ExcludingLookup {
	fn collect(&self, key: ServiceKey, out: &mut Vec<Service>) {
		if !self.is_excluded(key) {
			self.inner.collect(key, out);
		}
	}
}
