use serde::Deserialize;

/// What a recomputation does when a provider or merger fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
	/// Abort the recomputation and report the error; the old view stays published.
	#[default]
	Abort,
	/// Leave the failing contribution out, log it, and retry on the next recomputation.
	Skip,
}

/// Tunables for a [`CompositeLookup`](crate::CompositeLookup).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompositeOptions {
	/// Label attached to log events.
	pub label: String,
	pub on_provider_error: FailurePolicy,
	/// Notify subscribers even when a recomputation changed nothing.
	pub notify_unchanged: bool,
}

impl Default for CompositeOptions {
	fn default() -> Self {
		Self {
			label: "composite".to_owned(),
			on_provider_error: FailurePolicy::Abort,
			notify_unchanged: false,
		}
	}
}

impl CompositeOptions {
	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = label.into();
		self
	}

	pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
		self.on_provider_error = policy;
		self
	}

	pub fn with_notify_unchanged(mut self, notify: bool) -> Self {
		self.notify_unchanged = notify;
		self
	}
}
