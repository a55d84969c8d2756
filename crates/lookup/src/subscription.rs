//! Listener bookkeeping and cancellation handles.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Cancels a registration when [`cancel`](Self::cancel)led or dropped.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
	cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
	pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
		Self {
			cancel: Some(Box::new(cancel)),
		}
	}

	/// A subscription with nothing to cancel.
	pub fn noop() -> Self {
		Self { cancel: None }
	}

	pub fn cancel(mut self) {
		self.run_cancel();
	}

	fn run_cancel(&mut self) {
		if let Some(cancel) = self.cancel.take() {
			cancel();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.run_cancel();
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("active", &self.cancel.is_some())
			.finish()
	}
}

/// Ordered set of listeners of type `F` (typically a `dyn Fn` type).
///
/// Notification iterates a snapshot taken outside the lock, so listeners may
/// subscribe or cancel from inside a callback.
pub struct Listeners<F: ?Sized> {
	state: Mutex<ListenerState<F>>,
}

struct ListenerState<F: ?Sized> {
	next_id: u64,
	entries: Vec<(u64, Arc<F>)>,
}

impl<F: ?Sized + Send + Sync + 'static> Listeners<F> {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			state: Mutex::new(ListenerState {
				next_id: 0,
				entries: Vec::new(),
			}),
		})
	}

	/// Registers `listener`. The returned handle removes it again.
	pub fn subscribe(self: &Arc<Self>, listener: Arc<F>) -> Subscription {
		let id = {
			let mut state = self.state.lock();
			let id = state.next_id;
			state.next_id += 1;
			state.entries.push((id, listener));
			id
		};
		let weak: Weak<Self> = Arc::downgrade(self);
		Subscription::new(move || {
			if let Some(listeners) = weak.upgrade() {
				listeners.remove(id);
			}
		})
	}

	fn remove(&self, id: u64) {
		self.state.lock().entries.retain(|(entry, _)| *entry != id);
	}

	/// Current listeners in subscription order.
	pub fn snapshot(&self) -> Vec<Arc<F>> {
		self.state
			.lock()
			.entries
			.iter()
			.map(|(_, listener)| listener.clone())
			.collect()
	}

	pub fn len(&self) -> usize {
		self.state.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl<F: ?Sized> fmt::Debug for Listeners<F> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Listeners")
			.field("len", &self.state.lock().entries.len())
			.finish()
	}
}
