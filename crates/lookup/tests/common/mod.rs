#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lattice_lookup::{
	CompositeLookup, FixedLookup, LookupProvider, ProviderError, ProviderHandle, Service,
	SharedLookup,
};

/// Provider contributing a fixed list of strings and counting its builds.
pub struct Tagged {
	pub tag: String,
	pub values: Vec<String>,
	pub builds: AtomicUsize,
}

impl LookupProvider for Tagged {
	fn create_additional_lookup(&self, _base: &SharedLookup) -> Result<SharedLookup, ProviderError> {
		self.builds.fetch_add(1, Ordering::SeqCst);
		Ok(FixedLookup::new(self.values.iter().cloned().map(Service::from_value)).shared())
	}

	fn name(&self) -> &str {
		&self.tag
	}
}

pub fn tagged(tag: &str, values: &[&str]) -> Arc<Tagged> {
	Arc::new(Tagged {
		tag: tag.to_owned(),
		values: values.iter().map(|v| (*v).to_owned()).collect(),
		builds: AtomicUsize::new(0),
	})
}

pub fn handles(providers: &[&Arc<Tagged>]) -> Vec<ProviderHandle> {
	providers
		.iter()
		.map(|p| -> ProviderHandle { (*p).clone() })
		.collect()
}

pub fn base(values: &[&str]) -> SharedLookup {
	FixedLookup::new(values.iter().map(|v| Service::from_value((*v).to_owned()))).shared()
}

pub fn names(composite: &CompositeLookup) -> Vec<String> {
	composite
		.query::<String>()
		.iter()
		.map(|s| String::clone(&s))
		.collect()
}

/// Routes composite logs to the test harness output.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_max_level(tracing::Level::TRACE)
		.with_test_writer()
		.try_init();
}
