use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::LayerError;

/// Declarative folder contents.
///
/// ```toml
/// [[folder."Projects/web/Lookup"]]
/// provider = "web.sources"
/// position = 100
///
/// [[folder."Projects/web/Lookup"]]
/// provider = "legacy.sources"
/// hidden = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerManifest {
	#[serde(default)]
	pub folder: BTreeMap<String, Vec<ManifestEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
	/// Factory name. Also the entry's name within its folder.
	pub provider: String,
	/// Lower sorts first; entries without a position sort last.
	#[serde(default)]
	pub position: Option<i32>,
	/// Masks any entry of the same name in the folder instead of adding one.
	#[serde(default)]
	pub hidden: bool,
}

impl LayerManifest {
	pub fn from_toml(text: &str) -> Result<Self, LayerError> {
		Ok(toml::from_str(text)?)
	}

	pub fn load(path: &Path) -> Result<Self, LayerError> {
		let text = std::fs::read_to_string(path).map_err(|source| LayerError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml(&text)
	}
}

/// Folder paths are compared without leading or trailing slashes.
pub(crate) fn normalize(path: &str) -> &str {
	path.trim_matches('/')
}
