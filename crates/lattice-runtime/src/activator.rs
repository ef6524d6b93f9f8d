//! Per-module component activator
//!
//! TigerStyle: One bad descriptor never aborts its module; dispose is
//! idempotent and bounded.
//!
//! The activator owns the holders declared by one module. It registers them
//! with the shared [`ComponentRegistry`], enables them, routes asynchronous
//! work through the component actor and tears everything down when the
//! module stops.

use crate::actor::panic_message;
use crate::context::ModuleContext;
use crate::latch::{Latch, OpenOnDrop};
use crate::listener::{ListenerAggregator, ServiceListener};
use crate::service_objects::ServiceObjectsHelper;
use lattice_core::{
    ComponentId, ComponentMetadata, Error, ModuleInfo, Result, RuntimeConfig, ServiceRef, Task,
    TaskScheduler, COMPONENT_SELECTOR_ALL,
};
use lattice_registry::{
    ComponentHolder, ComponentInstance, ComponentRegistry, ConfigurationTracker, DisposalReason,
    LateBinder, RegionHandle, RegistryKey,
};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, instrument, warn, Span};

// =============================================================================
// Collaborators
// =============================================================================

/// Builds the holder for one validated descriptor
pub trait HolderFactory: Send + Sync {
    /// `span` is the component's logging context, nested in the module's
    fn create(
        &self,
        activator: &Arc<ModuleComponentActivator>,
        metadata: ComponentMetadata,
        span: Span,
    ) -> Result<Arc<dyn ComponentHolder>>;
}

/// Which components an enable or disable request applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentSelector {
    All,
    Named(String),
}

impl From<&str> for ComponentSelector {
    fn from(name: &str) -> Self {
        if name == COMPONENT_SELECTOR_ALL {
            Self::All
        } else {
            Self::Named(name.to_string())
        }
    }
}

impl From<Option<&str>> for ComponentSelector {
    fn from(name: Option<&str>) -> Self {
        name.map_or(Self::All, Self::from)
    }
}

/// Everything an activator needs from the runtime
pub struct ActivatorParts {
    pub context: Arc<dyn ModuleContext>,
    pub registry: Arc<ComponentRegistry>,
    /// Serial executor for asynchronous work; `None` runs it inline
    pub scheduler: Option<Arc<dyn TaskScheduler>>,
    pub config: RuntimeConfig,
}

// =============================================================================
// Module Component Activator
// =============================================================================

/// A registered holder with the key its name was reserved under
#[derive(Clone)]
struct ManagedHolder {
    key: RegistryKey,
    holder: Arc<dyn ComponentHolder>,
}

/// Owns and drives the components of one module
pub struct ModuleComponentActivator {
    module: ModuleInfo,
    context: Arc<dyn ModuleContext>,
    registry: Arc<ComponentRegistry>,
    scheduler: Option<Arc<dyn TaskScheduler>>,
    config: RuntimeConfig,
    holders: RwLock<Vec<ManagedHolder>>,
    active: AtomicBool,
    closed: Latch,
    /// Serializes inline execution when there is no actor; a task may
    /// schedule another from the same thread
    inline_lock: ReentrantMutex<()>,
    listeners: Mutex<HashMap<String, Arc<ListenerAggregator>>>,
    region: Mutex<Option<Arc<RegionHandle>>>,
    service_objects: ServiceObjectsHelper,
    span: Span,
}

impl ModuleComponentActivator {
    /// Create an active activator with no components yet
    pub fn new(parts: ActivatorParts) -> Arc<Self> {
        let module = parts.context.module().clone();
        let span = info_span!(
            "module_activator",
            module_id = %module.id,
            module_name = module.symbolic_name.as_deref().unwrap_or("")
        );

        Arc::new(Self {
            service_objects: ServiceObjectsHelper::new(parts.context.clone()),
            module,
            context: parts.context,
            registry: parts.registry,
            scheduler: parts.scheduler,
            config: parts.config,
            holders: RwLock::new(Vec::new()),
            active: AtomicBool::new(true),
            closed: Latch::new(),
            inline_lock: ReentrantMutex::new(()),
            listeners: Mutex::new(HashMap::new()),
            region: Mutex::new(None),
            span,
        })
    }

    pub fn module(&self) -> &ModuleInfo {
        &self.module
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn holders(&self) -> Vec<Arc<dyn ComponentHolder>> {
        self.holders
            .read()
            .iter()
            .map(|managed| managed.holder.clone())
            .collect()
    }

    pub fn service_objects(&self) -> &ServiceObjectsHelper {
        &self.service_objects
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Register a holder for every usable descriptor
    ///
    /// A descriptor that fails validation, reservation, construction or
    /// registration is logged and skipped; its name reservation is released.
    /// Returns the number of holders added.
    pub fn initialize(
        self: &Arc<Self>,
        descriptors: Vec<ComponentMetadata>,
        factory: &dyn HolderFactory,
    ) -> usize {
        let _entered = self.span.enter();
        let mut added = 0;

        for metadata in descriptors {
            let name = metadata.name.clone();
            match self.validate_and_register(metadata, factory) {
                Ok(managed) => {
                    self.holders.write().push(managed);
                    added += 1;
                }
                Err(e) => {
                    error!(component = %name, error = %e, "Cannot register component");
                }
            }
        }

        info!(components = added, "Module components registered");
        added
    }

    fn validate_and_register(
        self: &Arc<Self>,
        metadata: ComponentMetadata,
        factory: &dyn HolderFactory,
    ) -> Result<ManagedHolder> {
        metadata.validate()?;

        let key = self.registry.reserve_name(self.module.id, &metadata.name)?;
        match self.create_and_register(&key, metadata, factory) {
            Ok(holder) => Ok(ManagedHolder { key, holder }),
            Err(e) => {
                self.registry.unregister(&key);
                Err(e)
            }
        }
    }

    fn create_and_register(
        self: &Arc<Self>,
        key: &RegistryKey,
        metadata: ComponentMetadata,
        factory: &dyn HolderFactory,
    ) -> Result<Arc<dyn ComponentHolder>> {
        let span = info_span!(parent: &self.span, "component", component = %metadata.name);
        let holder = factory.create(self, metadata, span)?;
        self.registry.register(key, holder.clone())?;
        Ok(holder)
    }

    /// Enable every component that is enabled by default
    ///
    /// A component that fails to enable is forcibly disabled; the others are
    /// unaffected.
    pub fn initial_enable(&self) {
        let _entered = self.span.enter();

        for holder in self.holders() {
            if !holder.metadata().is_enabled() {
                continue;
            }
            let name = holder.metadata().name.clone();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| holder.enable_components(false)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };

            error!(component = %name, error = %failure, "Cannot enable component");
            if let Err(e) = holder.disable_components(false) {
                warn!(
                    component = %name,
                    error = %e,
                    "Cannot disable component after failed enable"
                );
            }
        }
    }

    // =========================================================================
    // Enable / Disable
    // =========================================================================

    fn select(&self, selector: &ComponentSelector) -> Vec<Arc<dyn ComponentHolder>> {
        let holders = self.holders.read();
        holders
            .iter()
            .filter(|managed| match selector {
                ComponentSelector::All => true,
                ComponentSelector::Named(name) => managed.holder.metadata().name == *name,
            })
            .map(|managed| managed.holder.clone())
            .collect()
    }

    /// Enable the selected components asynchronously
    ///
    /// Unknown names select nothing. Returns the holders that were asked.
    pub fn enable_component(
        &self,
        selector: impl Into<ComponentSelector>,
    ) -> Vec<Arc<dyn ComponentHolder>> {
        let selected = self.select(&selector.into());
        for holder in &selected {
            if let Err(e) = holder.enable_components(true) {
                error!(
                    parent: &self.span,
                    component = %holder.metadata().name,
                    error = %e,
                    "Cannot enable component"
                );
            }
        }
        selected
    }

    /// Disable the selected components asynchronously
    pub fn disable_component(
        &self,
        selector: impl Into<ComponentSelector>,
    ) -> Vec<Arc<dyn ComponentHolder>> {
        let selected = self.select(&selector.into());
        for holder in &selected {
            if let Err(e) = holder.disable_components(true) {
                error!(
                    parent: &self.span,
                    component = %holder.metadata().name,
                    error = %e,
                    "Cannot disable component"
                );
            }
        }
        selected
    }

    // =========================================================================
    // Service Listeners
    // =========================================================================

    /// Add `listener` for `filter`, subscribing the module on first use
    ///
    /// # Errors
    /// Whatever the context reports for an unusable filter; nothing is
    /// recorded in that case.
    pub fn add_service_listener(
        &self,
        filter: &str,
        listener: Arc<dyn ServiceListener>,
    ) -> Result<()> {
        let mut listeners = self.listeners.lock();
        if let Some(aggregator) = listeners.get(filter) {
            aggregator.add(listener);
            return Ok(());
        }

        let aggregator = Arc::new(ListenerAggregator::new(filter, listener));
        self.context
            .subscribe(filter, aggregator.clone() as Arc<dyn ServiceListener>)?;
        listeners.insert(filter.to_string(), aggregator);
        debug!(parent: &self.span, filter, "Subscribed to service events");
        Ok(())
    }

    /// Remove `listener` from `filter`, unsubscribing once nobody is left
    pub fn remove_service_listener(&self, filter: &str, listener: &Arc<dyn ServiceListener>) {
        let mut listeners = self.listeners.lock();
        let Some(aggregator) = listeners.get(filter) else {
            return;
        };
        if aggregator.remove(listener) {
            if let Some(aggregator) = listeners.remove(filter) {
                self.context
                    .unsubscribe(&(aggregator as Arc<dyn ServiceListener>));
                debug!(parent: &self.span, filter, "Unsubscribed from service events");
            }
        }
    }

    /// Number of distinct filters the module is subscribed to
    pub fn subscription_count(&self) -> usize {
        self.listeners.lock().len()
    }

    // =========================================================================
    // Configuration Regions
    // =========================================================================

    /// True if any holder consults configuration
    pub fn needs_configuration(&self) -> bool {
        self.holders
            .read()
            .iter()
            .any(|managed| !managed.holder.metadata().is_configuration_ignored())
    }

    /// Attach the module to its configuration region and configure every holder
    ///
    /// Does nothing if already attached.
    pub fn set_region_configuration<F>(&self, factory: F)
    where
        F: Fn() -> Box<dyn ConfigurationTracker>,
    {
        if self.region.lock().is_some() {
            return;
        }

        // The factory runs outside our lock; a racing attach keeps the first handle
        let handle = self.registry.regions().acquire(self.module.id, factory);
        let attached = {
            let mut region = self.region.lock();
            let vacant = region.is_none();
            if vacant {
                *region = Some(handle.clone());
            }
            vacant
        };
        if !attached {
            self.registry.regions().release(&handle);
            return;
        }

        for holder in self.holders() {
            let configured = handle.tracker().configure_holder(&holder);
            debug!(
                parent: &self.span,
                component = %holder.metadata().name,
                configured,
                "Configured component"
            );
        }
    }

    /// Release the module's configuration region, if attached
    pub fn unset_region_configuration(&self) {
        let handle = self.region.lock().take();
        if let Some(handle) = handle {
            self.registry.regions().release(&handle);
        }
    }

    // =========================================================================
    // Registry Proxies
    // =========================================================================

    pub fn enter_resolution(&self, service: &ServiceRef) -> bool {
        self.registry.enter_resolution(service)
    }

    pub fn leave_resolution(&self, service: &ServiceRef) {
        self.registry.leave_resolution(service);
    }

    pub fn record_missing_dependency(
        &self,
        binder: Arc<dyn LateBinder>,
        service: &ServiceRef,
        tracking_count: u64,
    ) {
        self.registry
            .record_missing_dependency(binder, service, tracking_count);
    }

    /// Replay bindings parked on `service` on the actor, or inline without one
    ///
    /// Parked bindings belong to other modules, so they run even after this
    /// module was disposed.
    pub fn service_now_available(&self, service: &ServiceRef) -> usize {
        match &self.scheduler {
            Some(scheduler) => self.registry.service_now_available(service, scheduler.as_ref()),
            None => self.registry.service_now_available(service, &InlineScheduler(self)),
        }
    }

    pub fn assign_instance_id(&self, instance: Arc<dyn ComponentInstance>) -> ComponentId {
        self.registry.assign_instance_id(instance)
    }

    pub fn release_instance_id(&self, id: ComponentId) -> bool {
        self.registry.release_instance_id(id)
    }

    pub fn bump_change_count(&self) -> u64 {
        self.registry.bump_change_count()
    }

    // =========================================================================
    // Dispose
    // =========================================================================

    /// Tear down every component of the module
    ///
    /// The first caller disposes and unregisters each holder, detaches from
    /// the configuration region and returns once done. A concurrent caller
    /// waits for that up to the lock timeout.
    ///
    /// # Errors
    /// `Timeout` if a concurrent dispose did not finish in time.
    #[instrument(skip(self), fields(module = %self.module.id), level = "info")]
    pub fn dispose(&self, reason: DisposalReason) -> Result<()> {
        if self
            .active
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let timeout = self.config.lock_timeout();
            if self.closed.wait(timeout) {
                return Ok(());
            }
            warn!(
                timeout_ms = self.config.activator.lock_timeout_ms,
                "Timed out waiting for module dispose"
            );
            return Err(Error::timeout(
                format!("dispose of module {}", self.module),
                self.config.activator.lock_timeout_ms,
            ));
        }

        let _closed = OpenOnDrop(&self.closed);

        let holders = std::mem::take(&mut *self.holders.write());
        for ManagedHolder { key, holder } in &holders {
            let name = holder.metadata().name.clone();
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| holder.dispose_components(reason)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(component = %name, error = %e, "Failed to dispose component"),
                Err(payload) => error!(
                    component = %name,
                    panic = %panic_message(payload.as_ref()),
                    "Component panicked during dispose"
                ),
            }
            self.registry.unregister(key);
        }

        self.unset_region_configuration();

        let listeners: Vec<_> = self.listeners.lock().drain().map(|(_, a)| a).collect();
        for aggregator in listeners {
            self.context
                .unsubscribe(&(aggregator as Arc<dyn ServiceListener>));
        }

        self.service_objects.cleanup();

        info!(components = holders.len(), reason = %reason, "Module components disposed");
        Ok(())
    }
}

impl TaskScheduler for ModuleComponentActivator {
    /// Run `task` on the actor, inline without one, or drop it once disposed
    fn schedule(&self, task: Task) {
        if !self.is_active() {
            warn!(
                parent: &self.span,
                task = task.label(),
                "Module not active; not scheduling task"
            );
            return;
        }

        if let Some(scheduler) = &self.scheduler {
            scheduler.schedule(task);
            return;
        }

        self.run_inline(task);
    }
}

impl ModuleComponentActivator {
    fn run_inline(&self, task: Task) {
        let _serial = self.inline_lock.lock();
        let label = task.label().to_string();
        match panic::catch_unwind(AssertUnwindSafe(move || task.run())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(parent: &self.span, task = %label, error = %e, "Task failed"),
            Err(payload) => warn!(
                parent: &self.span,
                task = %label,
                panic = %panic_message(payload.as_ref()),
                "Task panicked"
            ),
        }
    }
}

/// Inline execution that ignores whether the module is still active
struct InlineScheduler<'a>(&'a ModuleComponentActivator);

impl TaskScheduler for InlineScheduler<'_> {
    fn schedule(&self, task: Task) {
        self.0.run_inline(task);
    }
}

impl std::fmt::Debug for ModuleComponentActivator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleComponentActivator")
            .field("module", &self.module.id)
            .field("active", &self.is_active())
            .field("holders", &self.holders.read().len())
            .finish()
    }
}
