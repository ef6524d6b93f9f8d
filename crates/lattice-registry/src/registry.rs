//! Process-wide component registry
//!
//! TigerStyle: Every map has its own lock, held only for the mutation and
//! never across a call into a holder, binder, tracker or publisher.

use crate::change_count::{ChangeCountPublisher, ChangeCounter};
use crate::circularity::CircularityDetector;
use crate::error::{RegistryError, RegistryResult};
use crate::holder::{ComponentHolder, ComponentInstance, LateBinder};
use crate::key::RegistryKey;
use crate::missing::MissingDependencyTable;
use crate::region::RegionRegistry;
use lattice_core::{
    metrics, ComponentId, ModuleId, PidTarget, RuntimeConfig, ServiceRef, Task, TaskScheduler,
};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

type HolderRef = Arc<dyn ComponentHolder>;

// =============================================================================
// Instance Table
// =============================================================================

#[derive(Debug, Default)]
struct InstanceTable {
    next_id: u64,
    live: HashMap<ComponentId, Arc<dyn ComponentInstance>>,
}

fn configuration_pids(holder: &HolderRef) -> Vec<String> {
    holder
        .metadata()
        .configuration_pids()
        .into_iter()
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Component Registry
// =============================================================================

/// The registry of every component holder in the process
///
/// # Guarantees
/// - At most one entry per (module, name) key, reserved before registration
/// - Instance ids are never reused
/// - Late bindings are replayed on the scheduler, never on the caller
pub struct ComponentRegistry {
    /// Reservations (`None`) and registered holders (`Some`)
    holders: Mutex<HashMap<RegistryKey, Option<HolderRef>>>,
    /// Configuration PID to the holders declaring it
    holders_by_pid: Mutex<HashMap<String, HashMap<RegistryKey, HolderRef>>>,
    instances: Mutex<InstanceTable>,
    missing: MissingDependencyTable,
    circularity: CircularityDetector,
    regions: RegionRegistry,
    change_count: ChangeCounter,
}

impl ComponentRegistry {
    /// Create a registry using the change count window from `config`
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::with_changecount_window(config.changecount_window())
    }

    /// Create a registry with an explicit change count window
    pub fn with_changecount_window(window: Option<Duration>) -> Self {
        Self {
            holders: Mutex::new(HashMap::new()),
            holders_by_pid: Mutex::new(HashMap::new()),
            instances: Mutex::new(InstanceTable::default()),
            missing: MissingDependencyTable::new(),
            circularity: CircularityDetector::new(),
            regions: RegionRegistry::new(),
            change_count: ChangeCounter::new(window),
        }
    }

    // =========================================================================
    // Names and Holders
    // =========================================================================

    /// Reserve `name` for `owner`
    ///
    /// # Errors
    /// `NameConflict` if the key is already reserved or registered.
    pub fn reserve_name(&self, owner: ModuleId, name: &str) -> RegistryResult<RegistryKey> {
        assert!(!name.is_empty(), "component name must not be empty");

        let key = RegistryKey::new(owner, name);
        let conflict = {
            let mut holders = self.holders.lock();
            match holders.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(None);
                    None
                }
                Entry::Occupied(slot) => Some(slot.get().clone()),
            }
        };

        let Some(existing) = conflict else {
            debug!(key = %key, "Reserved component name");
            return Ok(key);
        };

        let existing = existing.map(|holder| {
            format!(
                "{} from {}",
                holder.metadata().implementation,
                holder.owner()
            )
        });
        metrics::record_name_conflict();
        Err(RegistryError::name_conflict(&key, existing))
    }

    /// Install `holder` under a previously reserved key
    ///
    /// # Errors
    /// `NotReserved` or `AlreadyRegistered` when the reservation protocol was
    /// not followed. Neither is retriable.
    #[instrument(skip_all, fields(key = %key), level = "debug")]
    pub fn register(&self, key: &RegistryKey, holder: HolderRef) -> RegistryResult<()> {
        let pids = configuration_pids(&holder);
        {
            // Lock order: holders, then holders_by_pid
            let mut holders = self.holders.lock();
            match holders.get_mut(key) {
                None => {
                    return Err(RegistryError::NotReserved {
                        key: key.to_string(),
                    })
                }
                Some(Some(_)) => {
                    return Err(RegistryError::AlreadyRegistered {
                        key: key.to_string(),
                    })
                }
                Some(slot) => *slot = Some(holder.clone()),
            }

            let mut by_pid = self.holders_by_pid.lock();
            for pid in pids {
                by_pid
                    .entry(pid)
                    .or_default()
                    .insert(key.clone(), holder.clone());
            }
        }

        metrics::record_component_registered();
        self.change_count.bump();
        debug!(key = %key, "Registered component holder");
        Ok(())
    }

    /// Remove the entry for `key`
    ///
    /// Returns the holder if one was registered. Removing a bare reservation
    /// only releases the name; removing an absent key does nothing.
    pub fn unregister(&self, key: &RegistryKey) -> Option<HolderRef> {
        let holder = {
            let mut holders = self.holders.lock();
            let holder = match holders.remove(key) {
                None => return None,
                Some(None) => None,
                Some(Some(holder)) => Some(holder),
            };

            if holder.is_some() {
                self.holders_by_pid.lock().retain(|_, bucket| {
                    bucket.remove(key);
                    !bucket.is_empty()
                });
            }
            holder
        };

        let Some(holder) = holder else {
            debug!(key = %key, "Released component name reservation");
            return None;
        };

        metrics::record_component_unregistered();
        self.change_count.bump();
        debug!(key = %key, "Unregistered component holder");
        Some(holder)
    }

    pub fn lookup_by_key(&self, key: &RegistryKey) -> Option<HolderRef> {
        self.holders.lock().get(key).cloned().flatten()
    }

    pub fn lookup(&self, owner: ModuleId, name: &str) -> Option<HolderRef> {
        self.lookup_by_key(&RegistryKey::new(owner, name))
    }

    /// Whether `key` is reserved or registered
    pub fn is_reserved(&self, key: &RegistryKey) -> bool {
        self.holders.lock().contains_key(key)
    }

    /// Holders answering to `pid`, filtered by its targeting rule
    pub fn lookup_by_pid(&self, pid: &dyn PidTarget) -> Vec<HolderRef> {
        let candidates: Vec<HolderRef> = self
            .holders_by_pid
            .lock()
            .get(pid.service_pid())
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default();

        candidates
            .into_iter()
            .filter(|holder| pid.matches_target(holder.owner()))
            .collect()
    }

    /// Every registered holder, reservations excluded
    pub fn all_holders(&self) -> Vec<HolderRef> {
        self.holders.lock().values().flatten().cloned().collect()
    }

    pub fn holders_for_module(&self, module: ModuleId) -> Vec<HolderRef> {
        self.holders
            .lock()
            .iter()
            .filter(|(key, _)| key.module() == module)
            .filter_map(|(_, holder)| holder.clone())
            .collect()
    }

    // =========================================================================
    // Instance Ids
    // =========================================================================

    /// Number a new live instance; ids start at 0 and are never reused
    pub fn assign_instance_id(&self, instance: Arc<dyn ComponentInstance>) -> ComponentId {
        let mut instances = self.instances.lock();
        let id = ComponentId::new(instances.next_id);
        instances.next_id += 1;
        instances.live.insert(id, instance);
        id
    }

    /// Forget a live instance; returns false if it was not known
    pub fn release_instance_id(&self, id: ComponentId) -> bool {
        self.instances.lock().live.remove(&id).is_some()
    }

    pub fn instance(&self, id: ComponentId) -> Option<Arc<dyn ComponentInstance>> {
        self.instances.lock().live.get(&id).cloned()
    }

    // =========================================================================
    // Circular Resolution and Late Binding
    // =========================================================================

    /// Mark `service` as being resolved on this thread
    ///
    /// Returns true if it is already being resolved here. The caller must
    /// then abandon the synchronous path and park its binder with
    /// [`record_missing_dependency`](Self::record_missing_dependency).
    pub fn enter_resolution(&self, service: &ServiceRef) -> bool {
        match self.circularity.enter(service) {
            Ok(()) => false,
            Err(stack) => {
                let rendered: Vec<String> = stack
                    .iter()
                    .map(|reference| {
                        let parked = self.missing.describe(reference);
                        if parked.is_empty() {
                            reference.to_string()
                        } else {
                            format!("{} waiting: [{}]", reference, parked.join(", "))
                        }
                    })
                    .collect();
                error!(
                    service = %service,
                    stack = ?rendered,
                    "Circular reference detected trying to get service; binding will complete later"
                );
                true
            }
        }
    }

    /// Pop `service` from this thread's resolution stack
    pub fn leave_resolution(&self, service: &ServiceRef) {
        self.circularity.leave(service);
    }

    /// Park `binder` until `service` becomes visible
    ///
    /// Only services registered by components are tracked; anything else is
    /// ignored.
    pub fn record_missing_dependency(
        &self,
        binder: Arc<dyn LateBinder>,
        service: &ServiceRef,
        tracking_count: u64,
    ) {
        if !service.is_component_service() {
            debug!(service = %service, "Not tracking missing dependency on non-component service");
            return;
        }
        let waiting = self.missing.record(service, binder, tracking_count);
        info!(
            service = %service,
            waiting,
            tracking_count,
            "Dependency not yet available; parked for late binding"
        );
    }

    /// Replay every binding parked on `service` through `scheduler`
    ///
    /// Returns the number of bindings scheduled.
    pub fn service_now_available(
        &self,
        service: &ServiceRef,
        scheduler: &dyn TaskScheduler,
    ) -> usize {
        let Some(bindings) = self.missing.take(service) else {
            return 0;
        };
        let count = bindings.len();
        debug_assert!(count > 0);

        let reference = service.clone();
        let label = format!("late binding of {} for {} dependencies", service, count);
        let task = Task::new(label, move || {
            for pending in &bindings {
                pending.binder.bind_late(&reference, pending.tracking_count);
            }
            Ok(())
        });

        metrics::record_late_binding_scheduled(count);
        debug!(service = %service, count, "Scheduling late binding");
        scheduler.schedule(task);
        count
    }

    /// Bindings currently parked on `service`
    pub fn missing_dependencies(&self, service: &ServiceRef) -> usize {
        self.missing.waiting_on(service)
    }

    // =========================================================================
    // Regions and Change Count
    // =========================================================================

    pub fn regions(&self) -> &RegionRegistry {
        &self.regions
    }

    pub fn change_counter(&self) -> &ChangeCounter {
        &self.change_count
    }

    pub fn set_change_count_publisher(&self, publisher: Arc<dyn ChangeCountPublisher>) {
        self.change_count.set_publisher(publisher);
    }

    pub fn change_count(&self) -> u64 {
        self.change_count.current()
    }

    /// Record a structural change made outside the registry maps
    pub fn bump_change_count(&self) -> u64 {
        self.change_count.bump()
    }

    /// Cancel the pending change count timer
    pub fn shutdown(&self) {
        self.change_count.shutdown();
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new(&RuntimeConfig::default())
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("entries", &self.holders.lock().len())
            .field("change_count", &self.change_count.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::DisposalReason;
    use lattice_core::{ComponentMetadata, ModuleInfo, Result, ServiceId, TargetedPid};

    #[derive(Debug)]
    struct StubHolder {
        metadata: ComponentMetadata,
        owner: ModuleInfo,
    }

    impl ComponentHolder for StubHolder {
        fn metadata(&self) -> &ComponentMetadata {
            &self.metadata
        }

        fn owner(&self) -> &ModuleInfo {
            &self.owner
        }

        fn enable_components(&self, _asynchronous: bool) -> Result<()> {
            Ok(())
        }

        fn disable_components(&self, _asynchronous: bool) -> Result<()> {
            Ok(())
        }

        fn dispose_components(&self, _reason: DisposalReason) -> Result<()> {
            Ok(())
        }
    }

    fn module(id: u64) -> ModuleInfo {
        ModuleInfo::new(ModuleId::new(id), format!("file:/m{}.jar", id))
            .with_symbolic_name(format!("m{}", id))
    }

    fn holder(module: &ModuleInfo, metadata: ComponentMetadata) -> HolderRef {
        Arc::new(StubHolder {
            metadata,
            owner: module.clone(),
        })
    }

    fn registry() -> ComponentRegistry {
        ComponentRegistry::with_changecount_window(None)
    }

    #[test]
    fn test_reserve_register_lookup() {
        let registry = registry();
        let m = module(1);
        let key = registry.reserve_name(m.id, "Foo").unwrap();
        assert!(registry.is_reserved(&key));
        assert!(registry.lookup_by_key(&key).is_none());
        assert_eq!(registry.change_count(), 0);

        registry
            .register(&key, holder(&m, ComponentMetadata::new("Foo", "FooImpl")))
            .unwrap();
        assert!(registry.lookup(m.id, "Foo").is_some());
        assert_eq!(registry.all_holders().len(), 1);
        assert_eq!(registry.change_count(), 1);
    }

    #[test]
    fn test_duplicate_reservation_conflicts() {
        let registry = registry();
        let m = module(1);
        let key = registry.reserve_name(m.id, "Foo").unwrap();
        registry
            .register(&key, holder(&m, ComponentMetadata::new("Foo", "FooImpl")))
            .unwrap();

        let err = registry.reserve_name(m.id, "Foo").unwrap_err();
        match err {
            RegistryError::NameConflict { existing, .. } => {
                assert!(existing.unwrap().contains("FooImpl"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_same_name_in_other_module_is_allowed() {
        let registry = registry();
        assert!(registry.reserve_name(ModuleId::new(1), "Foo").is_ok());
        assert!(registry.reserve_name(ModuleId::new(2), "Foo").is_ok());
    }

    #[test]
    fn test_register_requires_reservation() {
        let registry = registry();
        let m = module(1);
        let key = RegistryKey::new(m.id, "Foo");
        let h = holder(&m, ComponentMetadata::new("Foo", "FooImpl"));

        let err = registry.register(&key, h.clone()).unwrap_err();
        assert!(matches!(err, RegistryError::NotReserved { .. }));

        registry.reserve_name(m.id, "Foo").unwrap();
        registry.register(&key, h.clone()).unwrap();
        let err = registry.register(&key, h).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
        assert!(err.is_programming_error());
    }

    #[test]
    fn test_unregister_prunes_pid_index() {
        let registry = registry();
        let m = module(1);
        let meta = ComponentMetadata::new("Foo", "FooImpl")
            .with_configuration_pid("shared")
            .with_configuration_pid("foo.only");
        let key = registry.reserve_name(m.id, "Foo").unwrap();
        registry.register(&key, holder(&m, meta)).unwrap();

        let bar_key = registry.reserve_name(m.id, "Bar").unwrap();
        registry
            .register(
                &bar_key,
                holder(
                    &m,
                    ComponentMetadata::new("Bar", "BarImpl").with_configuration_pid("shared"),
                ),
            )
            .unwrap();

        assert_eq!(registry.lookup_by_pid(&TargetedPid::parse("shared")).len(), 2);
        assert_eq!(registry.lookup_by_pid(&TargetedPid::parse("foo.only")).len(), 1);

        assert!(registry.unregister(&key).is_some());
        assert_eq!(registry.lookup_by_pid(&TargetedPid::parse("shared")).len(), 1);
        assert!(registry.lookup_by_pid(&TargetedPid::parse("foo.only")).is_empty());
        assert!(!registry.holders_by_pid.lock().contains_key("foo.only"));
        assert_eq!(registry.change_count(), 3);

        // absent key is a no-op
        assert!(registry.unregister(&key).is_none());
        assert_eq!(registry.change_count(), 3);
    }

    #[test]
    fn test_unregister_reservation_does_not_bump() {
        let registry = registry();
        let key = registry.reserve_name(ModuleId::new(1), "Foo").unwrap();
        assert!(registry.unregister(&key).is_none());
        assert!(!registry.is_reserved(&key));
        assert_eq!(registry.change_count(), 0);
    }

    #[test]
    fn test_lookup_by_targeted_pid() {
        let registry = registry();
        let (a, b) = (module(1), module(2));
        for m in [&a, &b] {
            let key = registry.reserve_name(m.id, "Foo").unwrap();
            registry
                .register(&key, holder(m, ComponentMetadata::new("Foo", "FooImpl")))
                .unwrap();
        }

        assert_eq!(registry.lookup_by_pid(&TargetedPid::parse("Foo")).len(), 2);
        let targeted = registry.lookup_by_pid(&TargetedPid::parse("Foo|m2"));
        assert_eq!(targeted.len(), 1);
        assert_eq!(targeted[0].owner().id, b.id);
        assert_eq!(registry.holders_for_module(a.id).len(), 1);
    }

    #[test]
    fn test_instance_ids_are_monotonic() {
        #[derive(Debug)]
        struct Instance;
        impl ComponentInstance for Instance {
            fn component_name(&self) -> &str {
                "Foo"
            }
        }

        let registry = registry();
        let first = registry.assign_instance_id(Arc::new(Instance));
        let second = registry.assign_instance_id(Arc::new(Instance));
        assert_eq!(first, ComponentId::new(0));
        assert_eq!(second, ComponentId::new(1));

        assert!(registry.release_instance_id(first));
        assert!(!registry.release_instance_id(first));
        assert!(registry.instance(first).is_none());
        assert_eq!(registry.instance(second).unwrap().component_name(), "Foo");

        let third = registry.assign_instance_id(Arc::new(Instance));
        assert_eq!(third, ComponentId::new(2));
    }

    #[test]
    fn test_enter_leave_resolution() {
        let registry = registry();
        let d = ServiceRef::new(ServiceId::new(1));
        assert!(!registry.enter_resolution(&d));
        assert!(registry.enter_resolution(&d));
        registry.leave_resolution(&d);
        assert!(!registry.enter_resolution(&d));
        registry.leave_resolution(&d);
    }

    #[test]
    fn test_missing_dependency_ignores_plain_services() {
        #[derive(Debug)]
        struct Binder;
        impl LateBinder for Binder {
            fn bind_late(&self, _service: &ServiceRef, _tracking_count: u64) {}
        }

        let registry = registry();
        let plain = ServiceRef::new(ServiceId::new(3));
        registry.record_missing_dependency(Arc::new(Binder), &plain, 1);
        assert_eq!(registry.missing_dependencies(&plain), 0);
    }
}
