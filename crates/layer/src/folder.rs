use std::fmt;
use std::sync::Arc;

use lattice_lookup::{
	Listeners, ProviderHandle, ProviderSource, RefreshCallback, Subscription, same_provider,
};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::error::LayerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
	Manifest,
	Registered,
}

#[derive(Clone)]
pub(crate) struct Entry {
	pub(crate) name: String,
	pub(crate) position: Option<i32>,
	pub(crate) ordinal: u64,
	pub(crate) origin: Origin,
	/// `None` for hiding entries.
	pub(crate) provider: Option<ProviderHandle>,
}

impl Entry {
	pub(crate) fn is_hidden(&self) -> bool {
		self.provider.is_none()
	}
}

/// One layer folder, usable as a composite's provider source.
pub struct FolderSource {
	path: String,
	pub(crate) entries: Mutex<Vec<Entry>>,
	watchers: Arc<Listeners<RefreshCallback>>,
}

impl FolderSource {
	pub(crate) fn new(path: &str) -> Self {
		Self {
			path: path.to_owned(),
			entries: Mutex::new(Vec::new()),
			watchers: Listeners::new(),
		}
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	/// Names of the providers currently visible, in order.
	pub fn entry_names(&self) -> Vec<String> {
		visible(&self.entries.lock())
			.map(|e| e.name.clone())
			.collect()
	}

	pub fn watcher_count(&self) -> usize {
		self.watchers.len()
	}

	/// Replaces the entries. Returns whether the visible providers changed.
	pub(crate) fn swap(&self, next: Vec<Entry>) -> bool {
		let mut entries = self.entries.lock();
		let before = visible_providers(&entries);
		*entries = sorted(next);
		let after = visible_providers(&entries);
		before.len() != after.len() || before.iter().zip(&after).any(|(a, b)| !same_provider(a, b))
	}

	/// Refreshes every composite watching this folder.
	pub(crate) fn notify(&self) -> Result<(), LayerError> {
		tracing::debug!(folder = %self.path, "folder contents changed");
		self.watchers
			.refresh_all()
			.map_err(|source| LayerError::Refresh {
				folder: self.path.clone(),
				source,
			})
	}
}

fn sorted(mut entries: Vec<Entry>) -> Vec<Entry> {
	entries.sort_by_key(|e| (e.position.is_none(), e.position.unwrap_or(0), e.ordinal));
	entries
}

fn visible(entries: &[Entry]) -> impl Iterator<Item = &Entry> {
	let hidden: FxHashSet<&str> = entries
		.iter()
		.filter(|e| e.is_hidden())
		.map(|e| e.name.as_str())
		.collect();
	entries
		.iter()
		.filter(move |e| !e.is_hidden() && !hidden.contains(e.name.as_str()))
}

fn visible_providers(entries: &[Entry]) -> Vec<ProviderHandle> {
	visible(entries).filter_map(|e| e.provider.clone()).collect()
}

impl ProviderSource for FolderSource {
	fn providers(&self) -> Vec<ProviderHandle> {
		visible_providers(&self.entries.lock())
	}

	fn watch(&self, on_change: Arc<RefreshCallback>) -> Subscription {
		self.watchers.subscribe(on_change)
	}
}

impl fmt::Debug for FolderSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FolderSource")
			.field("path", &self.path)
			.field("entries", &self.entry_names())
			.finish()
	}
}
