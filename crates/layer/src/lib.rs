//! Path-keyed provider folders.
//!
//! A [`Layer`] groups [`LookupProvider`](lattice_lookup::LookupProvider)s into
//! folders such as `Projects/web/Lookup`. Each folder is a live
//! [`ProviderSource`](lattice_lookup::ProviderSource): registering,
//! unregistering or re-applying a [`LayerManifest`] refreshes every composite
//! built over it. Providers come either from named [`Factories`] referenced by
//! the manifest or from direct registration.

mod error;
mod folder;
mod layer;
mod manifest;

use lattice_lookup::{CompositeError, CompositeLookup, CompositeOptions, SharedLookup};

pub use error::LayerError;
pub use folder::FolderSource;
pub use layer::{Factories, Layer, ProviderFactory};
pub use manifest::{LayerManifest, ManifestEntry};

/// Composite over `base` and the providers of `layer`'s folder at `path`.
pub fn create_composite_lookup(
	base: SharedLookup,
	layer: &Layer,
	path: &str,
) -> Result<CompositeLookup, CompositeError> {
	create_composite_lookup_with(base, layer, path, CompositeOptions::default().with_label(path))
}

pub fn create_composite_lookup_with(
	base: SharedLookup,
	layer: &Layer,
	path: &str,
	options: CompositeOptions,
) -> Result<CompositeLookup, CompositeError> {
	CompositeLookup::with_options(base, layer.folder(path), options)
}
