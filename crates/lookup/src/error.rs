use std::error::Error as StdError;

/// Error raised by a provider or merger while building its contribution.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
	/// The provider has nothing valid to return. Providers that contribute
	/// nothing return an empty lookup instead.
	#[error("contract violation: {0}")]
	Contract(String),
	#[error("{reason}")]
	Failed {
		reason: String,
		#[source]
		source: Option<Box<dyn StdError + Send + Sync>>,
	},
}

impl ProviderError {
	pub fn contract(reason: impl Into<String>) -> Self {
		Self::Contract(reason.into())
	}

	pub fn failed(reason: impl Into<String>) -> Self {
		Self::Failed {
			reason: reason.into(),
			source: None,
		}
	}

	pub fn with_source(
		reason: impl Into<String>,
		source: impl Into<Box<dyn StdError + Send + Sync>>,
	) -> Self {
		Self::Failed {
			reason: reason.into(),
			source: Some(source.into()),
		}
	}
}

/// Recomputation failure. The previously published view stays visible.
#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
	#[error("provider `{provider}` violated the lookup provider contract: {reason}")]
	ContractViolation { provider: String, reason: String },
	#[error("provider `{provider}` failed to build its lookup")]
	ProviderConstruction {
		provider: String,
		#[source]
		source: ProviderError,
	},
	#[error("merger for `{key}` failed")]
	MergeFailed {
		key: &'static str,
		#[source]
		source: ProviderError,
	},
}

impl CompositeError {
	/// Maps a provider failure, keeping contract violations distinct.
	pub(crate) fn from_provider(provider: &str, err: ProviderError) -> Self {
		match err {
			ProviderError::Contract(reason) => Self::ContractViolation {
				provider: provider.to_owned(),
				reason,
			},
			source => Self::ProviderConstruction {
				provider: provider.to_owned(),
				source,
			},
		}
	}
}
