//! End-to-end behavior of the component runtime
//!
//! Modules are started from in-memory descriptors; holders only record what
//! the runtime asks of them.

use lattice_core::{
    ComponentMetadata, Error, ModuleId, ModuleInfo, Result, RuntimeConfig, ServiceId, ServiceRef,
    Task, TaskScheduler, COMPONENT_ID_PROPERTY, COMPONENT_NAME_PROPERTY, SERVICE_COMPONENT_HEADER,
};
use lattice_registry::{
    ChangeCountPublisher, ComponentHolder, ComponentRegistry, ConfigurationTracker, DisposalReason,
    LateBinder,
};
use lattice_runtime::{
    split_location, ActivatorParts, ComponentRuntime, ConfigurationTrackerFactory, DescriptorParser,
    HolderFactory, ModuleComponentActivator, ModuleContext, ServiceListener, ServiceObjects,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::Span;

// =============================================================================
// Fixtures
// =============================================================================

struct MemoryModule {
    info: ModuleInfo,
    header: Option<String>,
    entries: BTreeMap<String, String>,
}

impl MemoryModule {
    fn new(id: u64, header: &str, entries: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            info: ModuleInfo::new(ModuleId::new(id), format!("file:/module-{}.jar", id))
                .with_symbolic_name(format!("org.example.module{}", id))
                .with_version("1.0.0"),
            header: Some(header.to_string()),
            entries: entries
                .iter()
                .map(|(path, body)| (path.to_string(), body.to_string()))
                .collect(),
        })
    }
}

impl ModuleContext for MemoryModule {
    fn module(&self) -> &ModuleInfo {
        &self.info
    }

    fn header(&self, name: &str) -> Option<String> {
        (name == SERVICE_COMPONENT_HEADER)
            .then(|| self.header.clone())
            .flatten()
    }

    fn find_entries(&self, path: &str, pattern: &str) -> Vec<String> {
        let (prefix, suffix) = pattern.split_once('*').unwrap_or((pattern, ""));
        self.entries
            .keys()
            .filter(|entry| match split_location(entry) {
                Some((dir, name)) => {
                    dir == path
                        && if pattern.contains('*') {
                            name.starts_with(prefix) && name.ends_with(suffix)
                        } else {
                            name == pattern
                        }
                }
                None => false,
            })
            .cloned()
            .collect()
    }

    fn read_entry(&self, entry: &str) -> Result<Vec<u8>> {
        self.entries
            .get(entry)
            .map(|body| body.as_bytes().to_vec())
            .ok_or_else(|| Error::internal(format!("no entry {}", entry)))
    }

    fn subscribe(&self, _filter: &str, _listener: Arc<dyn ServiceListener>) -> Result<()> {
        Ok(())
    }

    fn unsubscribe(&self, _listener: &Arc<dyn ServiceListener>) {}

    fn service_objects(&self, _reference: &ServiceRef) -> Option<Arc<dyn ServiceObjects>> {
        None
    }
}

struct JsonParser;

impl DescriptorParser for JsonParser {
    fn parse(
        &self,
        _module: &ModuleInfo,
        entry: &str,
        raw: &[u8],
    ) -> Result<Vec<ComponentMetadata>> {
        serde_json::from_slice(raw).map_err(|e| Error::invalid_descriptor(entry, e.to_string()))
    }
}

#[derive(Debug)]
struct RecordingHolder {
    metadata: ComponentMetadata,
    owner: ModuleInfo,
    events: Arc<Mutex<Vec<String>>>,
}

impl ComponentHolder for RecordingHolder {
    fn metadata(&self) -> &ComponentMetadata {
        &self.metadata
    }

    fn owner(&self) -> &ModuleInfo {
        &self.owner
    }

    fn enable_components(&self, _asynchronous: bool) -> Result<()> {
        self.events.lock().push(format!("enable {}", self.metadata.name));
        Ok(())
    }

    fn disable_components(&self, _asynchronous: bool) -> Result<()> {
        self.events.lock().push(format!("disable {}", self.metadata.name));
        Ok(())
    }

    fn dispose_components(&self, reason: DisposalReason) -> Result<()> {
        self.events
            .lock()
            .push(format!("dispose {} ({})", self.metadata.name, reason));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingFactory {
    events: Arc<Mutex<Vec<String>>>,
}

impl HolderFactory for RecordingFactory {
    fn create(
        &self,
        activator: &Arc<ModuleComponentActivator>,
        metadata: ComponentMetadata,
        _span: Span,
    ) -> Result<Arc<dyn ComponentHolder>> {
        Ok(Arc::new(RecordingHolder {
            metadata,
            owner: activator.module().clone(),
            events: self.events.clone(),
        }))
    }
}

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<u64>>,
}

impl ChangeCountPublisher for RecordingPublisher {
    fn publish(&self, change_count: u64) -> Result<()> {
        self.published.lock().push(change_count);
        Ok(())
    }
}

#[derive(Default)]
struct TrackerCounts {
    started: AtomicUsize,
    stopped: AtomicUsize,
    configured: AtomicUsize,
}

struct CountingTracker(Arc<TrackerCounts>);

impl ConfigurationTracker for CountingTracker {
    fn start(&self) -> Result<()> {
        self.0.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.0.stopped.fetch_add(1, Ordering::SeqCst);
    }

    fn configure_holder(&self, _holder: &Arc<dyn ComponentHolder>) -> bool {
        self.0.configured.fetch_add(1, Ordering::SeqCst);
        true
    }
}

struct CountingTrackers(Arc<TrackerCounts>);

impl ConfigurationTrackerFactory for CountingTrackers {
    fn create(
        &self,
        _module: ModuleId,
        _registry: &Arc<ComponentRegistry>,
    ) -> Box<dyn ConfigurationTracker> {
        Box::new(CountingTracker(self.0.clone()))
    }
}

#[derive(Debug, Default)]
struct ThreadRecordingBinder {
    calls: Mutex<Vec<(ServiceId, u64, ThreadId)>>,
}

impl LateBinder for ThreadRecordingBinder {
    fn bind_late(&self, service: &ServiceRef, tracking_count: u64) {
        self.calls
            .lock()
            .push((service.id(), tracking_count, thread::current().id()));
    }
}

fn component(name: &str) -> ComponentMetadata {
    ComponentMetadata::new(name, format!("org.example.{}Impl", name))
}

fn component_service(id: u64, name: &str) -> ServiceRef {
    ServiceRef::new(ServiceId::new(id))
        .with_property(COMPONENT_NAME_PROPERTY, name)
        .with_property(COMPONENT_ID_PROPERTY, id)
}

fn runtime_with(factory: Arc<RecordingFactory>, config: RuntimeConfig) -> ComponentRuntime {
    ComponentRuntime::builder()
        .with_config(config)
        .with_holder_factory(factory)
        .with_descriptor_parser(Arc::new(JsonParser))
        .build()
        .unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_builder_requires_factory_and_parser() {
    let err = ComponentRuntime::builder()
        .with_descriptor_parser(Arc::new(JsonParser))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Internal { .. }));

    let err = ComponentRuntime::builder()
        .with_holder_factory(Arc::new(RecordingFactory::default()))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Internal { .. }));
}

#[test]
fn test_builder_rejects_invalid_config() {
    let mut config = RuntimeConfig::default();
    config.activator.lock_timeout_ms = u64::MAX;

    let err = ComponentRuntime::builder()
        .with_config(config)
        .with_holder_factory(Arc::new(RecordingFactory::default()))
        .with_descriptor_parser(Arc::new(JsonParser))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration { .. }));
}

#[test]
fn test_name_conflict_keeps_first_holder() {
    let registry = Arc::new(ComponentRegistry::with_changecount_window(None));
    let factory = RecordingFactory::default();

    // Two incarnations of module 7 declare the same component
    let first_module = MemoryModule::new(7, "", &[]);
    let first = ModuleComponentActivator::new(ActivatorParts {
        context: first_module,
        registry: registry.clone(),
        scheduler: None,
        config: RuntimeConfig::default(),
    });
    assert_eq!(first.initialize(vec![component("Foo")], &factory), 1);

    let second_module = MemoryModule::new(7, "", &[]);
    let second = ModuleComponentActivator::new(ActivatorParts {
        context: second_module,
        registry: registry.clone(),
        scheduler: None,
        config: RuntimeConfig::default(),
    });
    assert_eq!(
        second.initialize(vec![ComponentMetadata::new("Foo", "org.example.OtherImpl")], &factory),
        0
    );

    assert!(second.holders().is_empty());
    let registered = registry.lookup(ModuleId::new(7), "Foo").unwrap();
    assert_eq!(registered.metadata().implementation, "org.example.FooImpl");

    // Disposing the loser leaves the winner registered
    second.dispose(DisposalReason::ModuleStopped).unwrap();
    assert!(registry.lookup(ModuleId::new(7), "Foo").is_some());

    first.dispose(DisposalReason::ModuleStopped).unwrap();
    assert!(registry.lookup(ModuleId::new(7), "Foo").is_none());
}

#[test]
fn test_module_cannot_start_twice() {
    let runtime = runtime_with(Arc::new(RecordingFactory::default()), RuntimeConfig::default());
    let module = MemoryModule::new(2, "", &[]);

    runtime
        .start_module(module.clone(), Some(vec![component("A")]))
        .unwrap();
    let err = runtime.start_module(module, Some(vec![component("A")])).unwrap_err();
    assert!(matches!(err, Error::IllegalState { .. }));

    runtime.shutdown().unwrap();
}

#[test]
fn test_circular_resolution_binds_late_on_actor() {
    let runtime = runtime_with(Arc::new(RecordingFactory::default()), RuntimeConfig::default());
    let module = MemoryModule::new(4, "", &[]);
    let activator = runtime
        .start_module(module, Some(vec![component("Consumer")]))
        .unwrap();

    let service = component_service(40, "Provider");
    let binder = Arc::new(ThreadRecordingBinder::default());

    // Resolving the provider reenters its own resolution on this thread
    assert!(!activator.enter_resolution(&service));
    assert!(activator.enter_resolution(&service));
    activator.record_missing_dependency(binder.clone(), &service, 9);
    activator.leave_resolution(&service);

    assert_eq!(runtime.registry().missing_dependencies(&service), 1);
    assert_eq!(activator.service_now_available(&service), 1);
    assert_eq!(runtime.registry().missing_dependencies(&service), 0);

    let actor_thread = runtime.actor().unwrap().worker_thread_id();
    // Shutdown drains the actor queue before returning
    runtime.shutdown().unwrap();

    let calls = binder.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    let (service_id, tracking_count, thread) = calls[0];
    assert_eq!(service_id, ServiceId::new(40));
    assert_eq!(tracking_count, 9);
    assert_eq!(thread, actor_thread);
    assert_ne!(thread, thread::current().id());
}

#[test]
fn test_late_binding_after_module_stopped_still_runs_on_actor() {
    let runtime = runtime_with(Arc::new(RecordingFactory::default()), RuntimeConfig::default());
    let provider = runtime
        .start_module(MemoryModule::new(6, "", &[]), Some(vec![component("Provider")]))
        .unwrap();

    let service = component_service(60, "Provider");
    let binder = Arc::new(ThreadRecordingBinder::default());
    provider.record_missing_dependency(binder.clone(), &service, 3);

    // The announcing module goes away before the service is reported
    assert!(runtime
        .stop_module(ModuleId::new(6), DisposalReason::ModuleStopped)
        .unwrap());
    assert!(!provider.is_active());
    assert_eq!(provider.service_now_available(&service), 1);

    let actor_thread = runtime.actor().unwrap().worker_thread_id();
    runtime.shutdown().unwrap();

    let calls = binder.calls.lock().clone();
    assert_eq!(calls, vec![(ServiceId::new(60), 3, actor_thread)]);
}

#[test]
fn test_non_component_service_is_not_parked() {
    let runtime = runtime_with(Arc::new(RecordingFactory::default()), RuntimeConfig::default());
    let activator = runtime
        .start_module(MemoryModule::new(5, "", &[]), Some(vec![component("Consumer")]))
        .unwrap();

    let plain = ServiceRef::new(ServiceId::new(50));
    activator.record_missing_dependency(Arc::new(ThreadRecordingBinder::default()), &plain, 1);
    assert_eq!(activator.service_now_available(&plain), 0);

    runtime.shutdown().unwrap();
}

#[test]
fn test_module_lifecycle_end_to_end() {
    let factory = Arc::new(RecordingFactory::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let tracker_counts = Arc::new(TrackerCounts::default());

    let mut config = RuntimeConfig::default();
    config.registry.service_changecount_timeout_ms = 100;

    let runtime = ComponentRuntime::builder()
        .with_config(config)
        .with_holder_factory(factory.clone())
        .with_descriptor_parser(Arc::new(JsonParser))
        .with_configuration_trackers(Arc::new(CountingTrackers(tracker_counts.clone())))
        .with_change_count_publisher(publisher.clone())
        .build()
        .unwrap();

    let module = MemoryModule::new(
        11,
        "/OSGI-INF/*.json, /OSGI-INF/late.json",
        &[
            (
                "/OSGI-INF/components.json",
                r#"[
                    {"name": "Greeter", "implementation": "org.example.Greeter"},
                    {"name": "Idle", "implementation": "org.example.Idle", "enabled": false}
                ]"#,
            ),
            (
                "/OSGI-INF/late.json",
                r#"[{"name": "Late", "implementation": "org.example.Late", "configuration_policy": "ignore"}]"#,
            ),
        ],
    );

    let activator = runtime.start_module(module, None).unwrap();
    assert_eq!(activator.holders().len(), 3);
    assert_eq!(runtime.registry().holders_for_module(ModuleId::new(11)).len(), 3);
    assert!(runtime.activator(ModuleId::new(11)).is_some());

    assert_eq!(tracker_counts.started.load(Ordering::SeqCst), 1);
    assert_eq!(tracker_counts.configured.load(Ordering::SeqCst), 3);

    let mut enabled: Vec<_> = factory
        .events
        .lock()
        .iter()
        .filter(|event| event.starts_with("enable "))
        .cloned()
        .collect();
    enabled.sort();
    assert_eq!(enabled, vec!["enable Greeter", "enable Late"]);

    // Three registrations collapse into one publication
    thread::sleep(Duration::from_millis(400));
    assert_eq!(runtime.registry().change_count(), 3);
    assert_eq!(publisher.published.lock().last().copied(), Some(3));

    assert!(runtime
        .stop_module(ModuleId::new(11), DisposalReason::ModuleStopped)
        .unwrap());
    assert!(!runtime
        .stop_module(ModuleId::new(11), DisposalReason::ModuleStopped)
        .unwrap());
    assert!(runtime.registry().all_holders().is_empty());
    assert_eq!(tracker_counts.stopped.load(Ordering::SeqCst), 1);

    thread::sleep(Duration::from_millis(400));
    assert_eq!(publisher.published.lock().last().copied(), Some(6));

    runtime.shutdown().unwrap();
    assert!(runtime.actor().unwrap().is_stopped());
}

#[test]
fn test_inline_runtime_without_actor() {
    let runtime = ComponentRuntime::builder()
        .with_holder_factory(Arc::new(RecordingFactory::default()))
        .with_descriptor_parser(Arc::new(JsonParser))
        .without_actor()
        .build()
        .unwrap();
    assert!(runtime.actor().is_none());

    let activator = runtime
        .start_module(MemoryModule::new(6, "", &[]), Some(vec![component("Consumer")]))
        .unwrap();

    let service = component_service(60, "Provider");
    let binder = Arc::new(ThreadRecordingBinder::default());
    activator.record_missing_dependency(binder.clone(), &service, 2);
    activator.service_now_available(&service);

    // Without an actor the binding completes before the call returns
    let calls = binder.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].2, thread::current().id());

    runtime.shutdown().unwrap();
}

#[test]
fn test_shutdown_disposes_every_module() {
    let factory = Arc::new(RecordingFactory::default());
    let runtime = runtime_with(factory.clone(), RuntimeConfig::default());

    runtime
        .start_module(MemoryModule::new(20, "", &[]), Some(vec![component("A")]))
        .unwrap();
    runtime
        .start_module(MemoryModule::new(21, "", &[]), Some(vec![component("B")]))
        .unwrap();

    runtime.shutdown().unwrap();

    let mut disposed: Vec<_> = factory
        .events
        .lock()
        .iter()
        .filter(|event| event.starts_with("dispose "))
        .cloned()
        .collect();
    disposed.sort();
    assert_eq!(
        disposed,
        vec!["dispose A (runtime shutdown)", "dispose B (runtime shutdown)"]
    );
    assert!(runtime.registry().all_holders().is_empty());

    assert!(runtime.activator(ModuleId::new(20)).is_none());

    // A stopped actor drops late work instead of running it
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    runtime.actor().unwrap().schedule(Task::new("after shutdown", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}
