use std::marker::PhantomData;
use std::sync::Arc;

use super::view::CompositeView;
use crate::service::{Service, ServiceKey};

/// Services of one capability, pinned to the generation that was published
/// when the query was made.
///
/// Iteration scans lazily, one part at a time, and can be restarted with
/// [`iter`](Self::iter). Query the composite again to observe newer generations.
pub struct QueryResult<T: ?Sized> {
	view: Arc<CompositeView>,
	key: ServiceKey,
	_marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> QueryResult<T> {
	pub(crate) fn new(view: Arc<CompositeView>) -> Self {
		Self {
			view,
			key: ServiceKey::of::<T>(),
			_marker: PhantomData,
		}
	}

	pub fn iter(&self) -> QueryIter<'_, T> {
		QueryIter {
			view: &self.view,
			key: self.key,
			next_stage: 0,
			pending: Vec::new().into_iter(),
			_marker: PhantomData,
		}
	}

	pub fn first(&self) -> Option<Arc<T>> {
		self.iter().next()
	}

	pub fn to_vec(&self) -> Vec<Arc<T>> {
		self.iter().collect()
	}

	pub fn len(&self) -> usize {
		self.iter().count()
	}

	pub fn is_empty(&self) -> bool {
		self.first().is_none()
	}

	/// Generation this result is pinned to.
	pub fn generation(&self) -> u64 {
		self.view.generation
	}
}

impl<'a, T: ?Sized + Send + Sync + 'static> IntoIterator for &'a QueryResult<T> {
	type Item = Arc<T>;
	type IntoIter = QueryIter<'a, T>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

pub struct QueryIter<'a, T: ?Sized> {
	view: &'a CompositeView,
	key: ServiceKey,
	next_stage: usize,
	pending: std::vec::IntoIter<Service>,
	_marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Iterator for QueryIter<'_, T> {
	type Item = Arc<T>;

	fn next(&mut self) -> Option<Arc<T>> {
		loop {
			if let Some(service) = self.pending.next() {
				if let Some(value) = service.downcast::<T>() {
					return Some(value);
				}
				continue;
			}
			let batch = self.view.batch(self.key, self.next_stage)?;
			self.next_stage += 1;
			self.pending = batch.into_iter();
		}
	}
}
