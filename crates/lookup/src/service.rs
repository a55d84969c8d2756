//! Type-erased service values.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Capability identity that services are registered and queried under.
///
/// Works for unsized capabilities, so `ServiceKey::of::<dyn Sources>()` is as
/// valid a key as `ServiceKey::of::<String>()`.
#[derive(Clone, Copy)]
pub struct ServiceKey {
	id: TypeId,
	name: &'static str,
}

impl ServiceKey {
	/// Returns the key for capability type `T`.
	pub fn of<T: ?Sized + 'static>() -> Self {
		Self {
			id: TypeId::of::<T>(),
			name: std::any::type_name::<T>(),
		}
	}

	/// Human readable type name, for diagnostics only.
	pub fn type_name(&self) -> &'static str {
		self.name
	}
}

impl PartialEq for ServiceKey {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl fmt::Debug for ServiceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

impl fmt::Display for ServiceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

/// One service instance tagged with the capability it is registered under.
///
/// Holds an `Arc<T>` behind a type-erased pointer. Identity is the address of
/// the wrapped value, so two `Service`s built from clones of the same `Arc`
/// are [`ptr_eq`](Self::ptr_eq).
#[derive(Clone)]
pub struct Service {
	key: ServiceKey,
	addr: usize,
	value: Arc<dyn Any + Send + Sync>,
}

impl Service {
	/// Wraps `value` under capability `T`.
	pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
		let addr = Arc::as_ptr(&value).cast::<()>().addr();
		Self {
			key: ServiceKey::of::<T>(),
			addr,
			value: Arc::new(value),
		}
	}

	/// Wraps an owned value under its own type.
	pub fn from_value<T: Send + Sync + 'static>(value: T) -> Self {
		Self::new(Arc::new(value))
	}

	pub fn key(&self) -> ServiceKey {
		self.key
	}

	/// Returns true when this service is registered under `T`.
	pub fn is<T: ?Sized + 'static>(&self) -> bool {
		self.key.id == TypeId::of::<T>()
	}

	/// Recovers the typed handle if this service is registered under `T`.
	pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
		if !self.is::<T>() {
			return None;
		}
		self.value.downcast_ref::<Arc<T>>().cloned()
	}

	/// Returns true when both services wrap the same value under the same key.
	pub fn ptr_eq(&self, other: &Service) -> bool {
		self.key == other.key && self.addr == other.addr
	}
}

impl fmt::Debug for Service {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Service")
			.field("key", &self.key)
			.field("addr", &format_args!("{:#x}", self.addr))
			.finish()
	}
}
