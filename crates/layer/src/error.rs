use std::path::PathBuf;

use lattice_lookup::{CompositeError, ProviderError};

#[derive(Debug, thiserror::Error)]
pub enum LayerError {
	#[error("invalid layer manifest")]
	Manifest(#[from] toml::de::Error),
	#[error("cannot read layer manifest {}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("folder `{folder}`: unknown provider factory `{name}`")]
	UnknownFactory { folder: String, name: String },
	#[error("folder `{folder}`: `{name}` is already registered")]
	Duplicate { folder: String, name: String },
	#[error("folder `{folder}`: factory `{name}` failed")]
	Factory {
		folder: String,
		name: String,
		#[source]
		source: ProviderError,
	},
	#[error("refreshing lookups of folder `{folder}` failed")]
	Refresh {
		folder: String,
		#[source]
		source: CompositeError,
	},
}
