use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use pretty_assertions::assert_eq;

use super::*;
use crate::error::ProviderError;
use crate::lookup::{FixedLookup, InstanceLookup};
use crate::merger::{merger, merger_service};
use crate::provider::{LookupProvider, ProviderHandle, StaticProviders, provider_fn};

struct Contrib {
	name: &'static str,
	values: Vec<&'static str>,
	builds: AtomicUsize,
	fail: AtomicBool,
}

impl LookupProvider for Contrib {
	fn create_additional_lookup(&self, _base: &SharedLookup) -> Result<SharedLookup, ProviderError> {
		self.builds.fetch_add(1, Ordering::SeqCst);
		if self.fail.load(Ordering::SeqCst) {
			return Err(ProviderError::failed(format!("{} cannot build", self.name)));
		}
		Ok(FixedLookup::new(
			self.values
				.iter()
				.map(|v| Service::from_value(String::from(*v))),
		)
		.shared())
	}

	fn name(&self) -> &str {
		self.name
	}
}

fn contrib(name: &'static str, values: &[&'static str]) -> Arc<Contrib> {
	Arc::new(Contrib {
		name,
		values: values.to_vec(),
		builds: AtomicUsize::new(0),
		fail: AtomicBool::new(false),
	})
}

fn handle(c: &Arc<Contrib>) -> ProviderHandle {
	c.clone()
}

fn base(values: &[&str]) -> SharedLookup {
	FixedLookup::new(values.iter().map(|v| Service::from_value(String::from(*v)))).shared()
}

fn names(composite: &CompositeLookup) -> Vec<String> {
	composite
		.query::<String>()
		.iter()
		.map(|s| String::clone(&s))
		.collect()
}

fn counter(composite: &CompositeLookup) -> (Arc<AtomicUsize>, Subscription) {
	let hits = Arc::new(AtomicUsize::new(0));
	let h = hits.clone();
	let sub = composite.subscribe(move || {
		h.fetch_add(1, Ordering::SeqCst);
	});
	(hits, sub)
}

#[test]
fn empty_registry_yields_base_in_order() {
	let source = StaticProviders::new([]);
	let composite = CompositeLookup::new(base(&["b1", "b2"]), source).unwrap();
	assert_eq!(names(&composite), vec!["b1", "b2"]);
	assert_eq!(composite.generation(), 0);
	assert!(composite.sub_lookups().is_empty());
}

#[test]
fn providers_precede_base_in_registry_order() {
	let p1 = contrib("p1", &["p1"]);
	let p2 = contrib("p2", &["p2"]);
	let source = StaticProviders::new([handle(&p1), handle(&p2)]);
	let composite = CompositeLookup::new(base(&["b1", "b2"]), source).unwrap();

	assert_eq!(names(&composite), vec!["p1", "p2", "b1", "b2"]);
	assert_eq!(composite.lookup::<String>().as_deref().map(String::as_str), Some("p1"));
	assert_eq!(composite.query::<String>().len(), 4);
}

#[test]
fn unchanged_provider_keeps_its_sub_lookup() {
	let p1 = contrib("p1", &["p1"]);
	let p2 = contrib("p2", &["p2"]);
	let source = StaticProviders::new([handle(&p1)]);
	let composite = CompositeLookup::new(base(&["b"]), source.clone()).unwrap();
	let before = composite.sub_lookups();

	source.set([handle(&p2), handle(&p1)]).unwrap();

	let after = composite.sub_lookups();
	assert_eq!(after.len(), 2);
	assert!(Arc::ptr_eq(&before[0], &after[1]));
	assert_eq!(p1.builds.load(Ordering::SeqCst), 1);
	assert_eq!(p2.builds.load(Ordering::SeqCst), 1);
	assert_eq!(names(&composite), vec!["p2", "p1", "b"]);
}

#[test]
fn removed_provider_is_unreachable() {
	let p1 = contrib("p1", &["p1"]);
	let p2 = contrib("p2", &["p2"]);
	let source = StaticProviders::new([handle(&p1), handle(&p2)]);
	let composite = CompositeLookup::new(base(&["b"]), source.clone()).unwrap();
	let before = composite.sub_lookups();

	assert!(source.remove(&handle(&p1)).unwrap());

	let after = composite.sub_lookups();
	assert_eq!(after.len(), 1);
	assert!(Arc::ptr_eq(&before[1], &after[0]));
	assert_eq!(names(&composite), vec!["p2", "b"]);
}

#[test]
fn failed_recomputation_keeps_previous_view() {
	let p1 = contrib("p1", &["p1"]);
	let p2 = contrib("p2", &["p2"]);
	p2.fail.store(true, Ordering::SeqCst);
	let source = StaticProviders::new([handle(&p1)]);
	let composite = CompositeLookup::new(base(&["b"]), source.clone()).unwrap();
	let (hits, _sub) = counter(&composite);
	let generation = composite.generation();
	let parts = composite.sub_lookups();

	let err = source.set([handle(&p1), handle(&p2)]).unwrap_err();
	assert!(matches!(
		err,
		CompositeError::ProviderConstruction { ref provider, .. } if provider == "p2"
	));

	assert_eq!(names(&composite), vec!["p1", "b"]);
	assert_eq!(composite.generation(), generation);
	assert!(Arc::ptr_eq(&parts[0], &composite.sub_lookups()[0]));
	assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn contract_failures_are_reported_as_violations() {
	let broken = provider_fn("broken", |_| Err(ProviderError::contract("no lookup")));
	let source = StaticProviders::new([broken]);
	let err = CompositeLookup::new(base(&["b"]), source.clone()).unwrap_err();
	assert!(matches!(
		err,
		CompositeError::ContractViolation { ref provider, .. } if provider == "broken"
	));
	// The failed composite released its watch.
	assert_eq!(source.watcher_count(), 0);
}

#[test]
fn duplicate_descriptors_build_once_per_occurrence() {
	let p1 = contrib("p1", &["p1"]);
	let source = StaticProviders::new([handle(&p1), handle(&p1)]);
	let composite = CompositeLookup::new(base(&["b"]), source.clone()).unwrap();

	assert_eq!(p1.builds.load(Ordering::SeqCst), 2);
	assert_eq!(names(&composite), vec!["p1", "p1", "b"]);
	let before = composite.sub_lookups();
	assert!(!Arc::ptr_eq(&before[0], &before[1]));

	source.set([handle(&p1)]).unwrap();
	let after = composite.sub_lookups();
	assert_eq!(after.len(), 1);
	assert!(Arc::ptr_eq(&before[0], &after[0]));
	assert_eq!(p1.builds.load(Ordering::SeqCst), 2);
}

#[test]
fn one_notification_per_published_change() {
	let p1 = contrib("p1", &["p1"]);
	let source = StaticProviders::new([]);
	let composite = CompositeLookup::new(base(&["b"]), source.clone()).unwrap();
	let (hits, _sub) = counter(&composite);

	source.push(handle(&p1)).unwrap();
	assert_eq!(hits.load(Ordering::SeqCst), 1);

	// Same sequence again: nothing to publish.
	source.fire().unwrap();
	composite.refresh().unwrap();
	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert_eq!(composite.generation(), 1);
}

#[test]
fn notify_unchanged_option_fires_on_every_refresh() {
	let source = StaticProviders::new([]);
	let options = CompositeOptions::default().with_notify_unchanged(true);
	let composite = CompositeLookup::with_options(base(&["b"]), source.clone(), options).unwrap();
	let (hits, _sub) = counter(&composite);

	source.fire().unwrap();
	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert_eq!(composite.generation(), 0);
}

#[test]
fn cancelled_subscription_stops_notifications() {
	let p1 = contrib("p1", &["p1"]);
	let source = StaticProviders::new([]);
	let composite = CompositeLookup::new(base(&[]), source.clone()).unwrap();
	let (hits, sub) = counter(&composite);
	sub.cancel();

	source.push(handle(&p1)).unwrap();
	assert_eq!(hits.load(Ordering::SeqCst), 0);
	assert_eq!(names(&composite), vec!["p1"]);
}

#[test]
fn sub_lookup_internal_changes_do_not_notify() {
	let content = Arc::new(InstanceLookup::new());
	let part: SharedLookup = content.clone();
	let provider = provider_fn("dynamic", move |_| Ok(part.clone()));
	let source = StaticProviders::new([provider]);
	let composite = CompositeLookup::new(base(&["b"]), source).unwrap();
	let (hits, _sub) = counter(&composite);

	content.add(Service::from_value(String::from("late")));

	assert_eq!(names(&composite), vec!["late", "b"]);
	assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn skip_policy_leaves_out_failing_provider_and_retries() {
	let p1 = contrib("p1", &["p1"]);
	let p2 = contrib("p2", &["p2"]);
	p2.fail.store(true, Ordering::SeqCst);
	let source = StaticProviders::new([handle(&p1), handle(&p2)]);
	let options = CompositeOptions::default().with_failure_policy(FailurePolicy::Skip);
	let composite = CompositeLookup::with_options(base(&["b"]), source.clone(), options).unwrap();
	let (hits, _sub) = counter(&composite);

	assert_eq!(names(&composite), vec!["p1", "b"]);

	// Still failing: retried, nothing changes, nobody is told.
	composite.refresh().unwrap();
	assert_eq!(p2.builds.load(Ordering::SeqCst), 2);
	assert_eq!(hits.load(Ordering::SeqCst), 0);

	p2.fail.store(false, Ordering::SeqCst);
	composite.refresh().unwrap();
	assert_eq!(names(&composite), vec!["p1", "p2", "b"]);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert_eq!(p1.builds.load(Ordering::SeqCst), 1);
}

#[test]
fn dropping_the_composite_releases_the_source_watch() {
	let source = StaticProviders::new([]);
	let composite = CompositeLookup::new(base(&[]), source.clone()).unwrap();
	let clone = composite.clone();
	assert_eq!(source.watcher_count(), 1);

	drop(composite);
	assert_eq!(source.watcher_count(), 1);
	drop(clone);
	assert_eq!(source.watcher_count(), 0);
	source.fire().unwrap();
}

#[test]
fn query_result_stays_on_its_generation() {
	let p1 = contrib("p1", &["p1"]);
	let source = StaticProviders::new([]);
	let composite = CompositeLookup::new(base(&["b"]), source.clone()).unwrap();
	let old = composite.query::<String>();

	source.push(handle(&p1)).unwrap();

	let stale: Vec<_> = old.iter().map(|s| String::clone(&s)).collect();
	assert_eq!(stale, vec!["b"]);
	assert_eq!(old.generation(), 0);
	// Restarting iteration re-scans the same generation.
	assert_eq!(old.len(), 1);
	assert_eq!(names(&composite), vec!["p1", "b"]);
}

#[test]
fn composite_can_be_nested_as_a_base() {
	let inner_source = StaticProviders::new([]);
	let inner = CompositeLookup::new(base(&["inner"]), inner_source.clone()).unwrap();
	let outer = CompositeLookup::new(inner.as_lookup(), StaticProviders::new([])).unwrap();
	assert_eq!(names(&outer), vec!["inner"]);

	let p1 = contrib("p1", &["p1"]);
	inner_source.push(handle(&p1)).unwrap();
	assert_eq!(names(&outer), vec!["p1", "inner"]);
}

trait Roots: Send + Sync {
	fn roots(&self) -> Vec<String>;
}

struct StaticRoots(Vec<String>);

impl Roots for StaticRoots {
	fn roots(&self) -> Vec<String> {
		self.0.clone()
	}
}

struct MergedRoots(SharedLookup);

impl Roots for MergedRoots {
	fn roots(&self) -> Vec<String> {
		self.0
			.lookup_all::<dyn Roots>()
			.iter()
			.flat_map(|r| r.roots())
			.collect()
	}
}

fn roots_provider(name: &'static str, roots: &[&str]) -> ProviderHandle {
	let roots: Vec<String> = roots.iter().map(|r| String::from(*r)).collect();
	provider_fn(name, move |_| {
		let contributed: Arc<dyn Roots> = Arc::new(StaticRoots(roots.clone()));
		Ok(FixedLookup::empty().with(contributed).shared())
	})
}

fn roots_merger() -> Service {
	merger_service(merger::<dyn Roots, _>(|lookup| {
		Ok(Arc::new(MergedRoots(lookup.clone())) as Arc<dyn Roots>)
	}))
}

#[test]
fn merger_collapses_capability_into_one_service() {
	let own: Arc<dyn Roots> = Arc::new(StaticRoots(vec!["src".into()]));
	let base = FixedLookup::new([roots_merger(), Service::new(own)]).shared();
	let source = StaticProviders::new([roots_provider("web", &["web"])]);
	let composite = CompositeLookup::new(base, source.clone()).unwrap();

	let all = composite.query::<dyn Roots>();
	assert_eq!(all.len(), 1);
	assert_eq!(all.first().unwrap().roots(), vec!["web", "src"]);

	source.push(roots_provider("test", &["test"])).unwrap();
	let merged = composite.lookup::<dyn Roots>().unwrap();
	assert_eq!(merged.roots(), vec!["web", "test", "src"]);
	// Other capabilities pass through untouched.
	assert!(composite.query::<String>().is_empty());
}

#[test]
fn first_merger_for_a_key_wins() {
	let loser = merger_service(merger::<dyn Roots, _>(|_| {
		Ok(Arc::new(StaticRoots(vec!["loser".into()])) as Arc<dyn Roots>)
	}));
	let base = FixedLookup::new([roots_merger(), loser]).shared();
	let source = StaticProviders::new([roots_provider("web", &["web"])]);
	let composite = CompositeLookup::new(base, source).unwrap();

	assert_eq!(composite.lookup::<dyn Roots>().unwrap().roots(), vec!["web"]);
}

#[test]
fn failing_merger_aborts_and_keeps_old_view() {
	let fail = Arc::new(AtomicBool::new(false));
	let f = fail.clone();
	let flaky = merger_service(merger::<dyn Roots, _>(move |lookup| {
		if f.load(Ordering::SeqCst) {
			return Err(ProviderError::failed("merge failed"));
		}
		Ok(Arc::new(MergedRoots(lookup.clone())) as Arc<dyn Roots>)
	}));
	let source = StaticProviders::new([roots_provider("web", &["web"])]);
	let composite = CompositeLookup::new(FixedLookup::new([flaky]).shared(), source.clone()).unwrap();

	fail.store(true, Ordering::SeqCst);
	let err = source.push(roots_provider("test", &["test"])).unwrap_err();
	assert!(matches!(err, CompositeError::MergeFailed { .. }));
	assert_eq!(composite.lookup::<dyn Roots>().unwrap().roots(), vec!["web"]);
	assert_eq!(composite.sub_lookups().len(), 1);
}

#[test]
fn skipped_merger_retries_without_republishing() {
	let attempts = Arc::new(AtomicUsize::new(0));
	let fail = Arc::new(AtomicBool::new(true));
	let names_merger = merger_service(merger::<String, _>({
		let attempts = attempts.clone();
		let fail = fail.clone();
		move |_| {
			attempts.fetch_add(1, Ordering::SeqCst);
			if fail.load(Ordering::SeqCst) {
				return Err(ProviderError::failed("merge failed"));
			}
			Ok(Arc::new(String::from("merged")))
		}
	}));
	let base = FixedLookup::new([
		roots_merger(),
		names_merger,
		Service::from_value(String::from("b")),
	])
	.shared();
	let source = StaticProviders::new([roots_provider("web", &["web"])]);
	let options = CompositeOptions::default().with_failure_policy(FailurePolicy::Skip);
	let composite = CompositeLookup::with_options(base, source, options).unwrap();
	let (hits, _sub) = counter(&composite);
	let generation = composite.generation();
	let roots = composite.lookup::<dyn Roots>().unwrap();

	for _ in 0..3 {
		composite.refresh().unwrap();
	}
	assert_eq!(attempts.load(Ordering::SeqCst), 4);
	assert_eq!(hits.load(Ordering::SeqCst), 0);
	assert_eq!(composite.generation(), generation);
	assert_eq!(names(&composite), vec!["b"]);
	assert!(Arc::ptr_eq(&roots, &composite.lookup::<dyn Roots>().unwrap()));

	fail.store(false, Ordering::SeqCst);
	composite.refresh().unwrap();
	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert_eq!(composite.generation(), generation + 1);
	assert_eq!(names(&composite), vec!["merged"]);
	// The merger that already succeeded is not run again.
	assert!(Arc::ptr_eq(&roots, &composite.lookup::<dyn Roots>().unwrap()));

	composite.refresh().unwrap();
	assert_eq!(attempts.load(Ordering::SeqCst), 5);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}
