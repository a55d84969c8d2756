use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lattice_lookup::{ProviderError, ProviderHandle};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::LayerError;
use crate::folder::{Entry, FolderSource, Origin};
use crate::manifest::{LayerManifest, ManifestEntry, normalize};

/// Creates a provider instance for a manifest entry.
pub type ProviderFactory = Arc<dyn Fn() -> Result<ProviderHandle, ProviderError> + Send + Sync>;

/// Named provider factories referenced by manifests.
#[derive(Clone, Default)]
pub struct Factories {
	by_name: FxHashMap<String, ProviderFactory>,
}

impl Factories {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(
		mut self,
		name: impl Into<String>,
		factory: impl Fn() -> Result<ProviderHandle, ProviderError> + Send + Sync + 'static,
	) -> Self {
		self.insert(name, factory);
		self
	}

	pub fn insert(
		&mut self,
		name: impl Into<String>,
		factory: impl Fn() -> Result<ProviderHandle, ProviderError> + Send + Sync + 'static,
	) {
		self.by_name.insert(name.into(), Arc::new(factory));
	}

	pub fn get(&self, name: &str) -> Option<&ProviderFactory> {
		self.by_name.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.by_name.contains_key(name)
	}
}

impl fmt::Debug for Factories {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut names: Vec<_> = self.by_name.keys().collect();
		names.sort();
		f.debug_list().entries(names).finish()
	}
}

/// Folder registry. Manifest entries and directly registered providers share
/// folders; re-applying a manifest only replaces manifest entries.
pub struct Layer {
	factories: Factories,
	folders: Mutex<FxHashMap<String, Arc<FolderSource>>>,
	next_ordinal: AtomicU64,
	write_lock: Mutex<()>,
}

impl Layer {
	pub fn new(factories: Factories) -> Self {
		Self {
			factories,
			folders: Mutex::new(FxHashMap::default()),
			next_ordinal: AtomicU64::new(0),
			write_lock: Mutex::new(()),
		}
	}

	pub fn from_manifest(factories: Factories, manifest: &LayerManifest) -> Result<Self, LayerError> {
		let layer = Self::new(factories);
		layer.apply_manifest(manifest)?;
		Ok(layer)
	}

	pub fn factories(&self) -> &Factories {
		&self.factories
	}

	/// The folder at `path`, created empty on first use.
	pub fn folder(&self, path: &str) -> Arc<FolderSource> {
		let path = normalize(path);
		self.folders
			.lock()
			.entry(path.to_owned())
			.or_insert_with(|| Arc::new(FolderSource::new(path)))
			.clone()
	}

	/// Known folder paths, sorted.
	pub fn folders(&self) -> Vec<String> {
		let mut paths: Vec<_> = self.folders.lock().keys().cloned().collect();
		paths.sort();
		paths
	}

	/// Adds `provider` to a folder under `name`.
	pub fn register(
		&self,
		path: &str,
		name: impl Into<String>,
		position: Option<i32>,
		provider: ProviderHandle,
	) -> Result<(), LayerError> {
		let folder = self.folder(path);
		let name = name.into();
		let guard = self.write_lock.lock();
		let mut next = folder.entries.lock().clone();
		if next.iter().any(|e| e.name == name && !e.is_hidden()) {
			return Err(LayerError::Duplicate {
				folder: folder.path().to_owned(),
				name,
			});
		}
		tracing::debug!(folder = folder.path(), name = %name, ?position, "provider registered");
		next.push(Entry {
			name,
			position,
			ordinal: self.ordinal(),
			origin: Origin::Registered,
			provider: Some(provider),
		});
		let changed = folder.swap(next);
		drop(guard);
		if changed {
			folder.notify()?;
		}
		Ok(())
	}

	/// Removes a directly registered provider. Manifest entries are only removed
	/// by applying a manifest without them.
	pub fn unregister(&self, path: &str, name: &str) -> Result<bool, LayerError> {
		let folder = self.folder(path);
		let guard = self.write_lock.lock();
		let mut next = folder.entries.lock().clone();
		let before = next.len();
		next.retain(|e| !(e.origin == Origin::Registered && e.name == name));
		if next.len() == before {
			return Ok(false);
		}
		let changed = folder.swap(next);
		drop(guard);
		if changed {
			folder.notify()?;
		}
		Ok(true)
	}

	/// Replaces all manifest entries with those of `manifest`.
	///
	/// Entries kept under the same name keep their provider instance, so
	/// composites over the folder keep the matching sub-lookups. Every factory
	/// runs before anything is committed; a factory failure leaves the layer
	/// unchanged. Composites are refreshed after all folders are committed.
	pub fn apply_manifest(&self, manifest: &LayerManifest) -> Result<(), LayerError> {
		let guard = self.write_lock.lock();

		let mut paths: BTreeSet<String> = manifest
			.folder
			.keys()
			.map(|p| normalize(p).to_owned())
			.collect();
		for (path, folder) in self.folders.lock().iter() {
			if folder.entries.lock().iter().any(|e| e.origin == Origin::Manifest) {
				paths.insert(path.clone());
			}
		}

		let empty = Vec::new();
		let mut staged = Vec::with_capacity(paths.len());
		for path in &paths {
			let declared = manifest
				.folder
				.iter()
				.find(|(p, _)| normalize(p) == path.as_str())
				.map_or(&empty, |(_, entries)| entries);
			let folder = self.folder(path);
			let next = self.stage_folder(&folder, declared)?;
			staged.push((folder, next));
		}

		let changed: Vec<_> = staged
			.into_iter()
			.filter_map(|(folder, next)| folder.swap(next).then_some(folder))
			.collect();
		drop(guard);

		let mut first_err = None;
		for folder in changed {
			if let Err(err) = folder.notify() {
				if first_err.is_none() {
					first_err = Some(err);
				} else {
					tracing::warn!(folder = folder.path(), error = %err, "refresh failed");
				}
			}
		}
		first_err.map_or(Ok(()), Err)
	}

	fn stage_folder(&self, folder: &FolderSource, declared: &[ManifestEntry]) -> Result<Vec<Entry>, LayerError> {
		let current = folder.entries.lock().clone();
		let manifest_entries = || current.iter().filter(|e| e.origin == Origin::Manifest);
		let mut reusable: FxHashMap<&str, &ProviderHandle> = manifest_entries()
			.filter_map(|e| Some((e.name.as_str(), e.provider.as_ref()?)))
			.collect();
		// Redeclared names keep their ordinal so ties with registered entries stay put.
		let ordinals: FxHashMap<&str, u64> = manifest_entries()
			.map(|e| (e.name.as_str(), e.ordinal))
			.collect();
		let registered: FxHashSet<&str> = current
			.iter()
			.filter(|e| e.origin == Origin::Registered && !e.is_hidden())
			.map(|e| e.name.as_str())
			.collect();

		let mut seen = FxHashSet::default();
		let mut next: Vec<Entry> = current
			.iter()
			.filter(|e| e.origin == Origin::Registered)
			.cloned()
			.collect();

		for decl in declared {
			let duplicate = || LayerError::Duplicate {
				folder: folder.path().to_owned(),
				name: decl.provider.clone(),
			};
			if !seen.insert(decl.provider.as_str()) {
				return Err(duplicate());
			}
			let provider = if decl.hidden {
				None
			} else {
				if registered.contains(decl.provider.as_str()) {
					return Err(duplicate());
				}
				Some(self.instantiate(folder, decl, &mut reusable)?)
			};
			next.push(Entry {
				name: decl.provider.clone(),
				position: decl.position,
				ordinal: ordinals
					.get(decl.provider.as_str())
					.copied()
					.unwrap_or_else(|| self.ordinal()),
				origin: Origin::Manifest,
				provider,
			});
		}
		Ok(next)
	}

	fn instantiate(
		&self,
		folder: &FolderSource,
		decl: &ManifestEntry,
		reusable: &mut FxHashMap<&str, &ProviderHandle>,
	) -> Result<ProviderHandle, LayerError> {
		if let Some(existing) = reusable.remove(decl.provider.as_str()) {
			return Ok(existing.clone());
		}
		let factory = self
			.factories
			.get(&decl.provider)
			.ok_or_else(|| LayerError::UnknownFactory {
				folder: folder.path().to_owned(),
				name: decl.provider.clone(),
			})?;
		factory().map_err(|source| LayerError::Factory {
			folder: folder.path().to_owned(),
			name: decl.provider.clone(),
			source,
		})
	}

	fn ordinal(&self) -> u64 {
		self.next_ordinal.fetch_add(1, Ordering::Relaxed)
	}
}

impl fmt::Debug for Layer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Layer")
			.field("factories", &self.factories)
			.field("folders", &self.folders())
			.finish()
	}
}
