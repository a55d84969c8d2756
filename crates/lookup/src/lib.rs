//! Composite service lookups.
//!
//! A [`CompositeLookup`] merges a base [`Lookup`] with the sub-lookups built by a
//! changing sequence of [`LookupProvider`]s. Providers come from a
//! [`ProviderSource`]; every time the source reports a change the composite
//! recomputes its parts, reusing the sub-lookup of every provider that is still
//! present, and atomically publishes the result.
//!
//! # Invariants
//!
//! - A provider present before and after a recomputation keeps the same sub-lookup instance.
//! - Queries observe exactly one published generation.
//! - A failed recomputation leaves the previously published view in place.

mod composite;
mod error;
mod lookup;
mod merger;
mod options;
mod provider;
mod service;
mod subscription;

pub use composite::{CompositeLookup, QueryIter, QueryResult};
pub use error::{CompositeError, ProviderError};
pub use lookup::{ExcludingLookup, FixedLookup, InstanceLookup, Lookup, SharedLookup};
pub use merger::{LookupMerger, merger, merger_service};
pub use options::{CompositeOptions, FailurePolicy};
pub use provider::{
	LookupProvider, ProviderHandle, ProviderSource, RefreshCallback, StaticProviders, provider_fn,
	same_provider,
};
pub use service::{Service, ServiceKey};
pub use subscription::{Listeners, Subscription};
