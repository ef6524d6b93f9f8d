//! Per-module cache of prototype-scoped service handles
//!
//! Components that use prototype services obtain them through
//! [`ComponentServiceObjects`], which remembers every instance it handed out
//! so they can all be returned when the reference goes away or the module
//! stops.

use crate::context::{ModuleContext, ServiceInstance, ServiceObjects};
use lattice_core::{Error, Result, ServiceId, ServiceRef};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Tracks the instances obtained from one prototype-scoped service
pub struct ComponentServiceObjects {
    reference: ServiceRef,
    objects: Mutex<Option<Arc<dyn ServiceObjects>>>,
    instances: Mutex<Vec<ServiceInstance>>,
    deactivated: AtomicBool,
}

impl ComponentServiceObjects {
    fn new(reference: ServiceRef, objects: Arc<dyn ServiceObjects>) -> Self {
        Self {
            reference,
            objects: Mutex::new(Some(objects)),
            instances: Mutex::new(Vec::new()),
            deactivated: AtomicBool::new(false),
        }
    }

    pub fn service_ref(&self) -> &ServiceRef {
        &self.reference
    }

    /// Obtain and remember a new instance
    ///
    /// # Errors
    /// `IllegalState` once the owning component has been deactivated.
    pub fn get_service(&self) -> Result<Option<ServiceInstance>> {
        self.ensure_active()?;
        let objects = self.objects.lock().clone();
        let Some(objects) = objects else {
            return Ok(None);
        };
        let instance = objects.get_service();
        if let Some(instance) = &instance {
            self.instances.lock().push(instance.clone());
        }
        Ok(instance)
    }

    /// Return an instance obtained from [`get_service`](Self::get_service)
    ///
    /// # Errors
    /// `IllegalState` once deactivated, or whatever the directory reports.
    pub fn unget_service(&self, instance: &ServiceInstance) -> Result<()> {
        self.ensure_active()?;
        {
            let mut instances = self.instances.lock();
            if let Some(position) = instances.iter().position(|i| Arc::ptr_eq(i, instance)) {
                instances.remove(position);
            }
        }
        let objects = self.objects.lock().clone();
        match objects {
            Some(objects) => objects.unget_service(instance),
            None => Ok(()),
        }
    }

    /// Number of instances currently handed out
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_deactivated(&self) -> bool {
        self.deactivated.load(Ordering::SeqCst)
    }

    /// Return every instance to the directory and forget the service
    ///
    /// Errors from the directory are ignored; the service may already be gone.
    pub fn close(&self) {
        let objects = self.objects.lock().take();
        let instances = std::mem::take(&mut *self.instances.lock());
        if let Some(objects) = objects {
            for instance in &instances {
                if let Err(e) = objects.unget_service(instance) {
                    debug!(
                        service = %self.reference,
                        error = %e,
                        "Ignoring unget failure on close"
                    );
                }
            }
        }
    }

    fn deactivate(&self) {
        self.deactivated.store(true, Ordering::SeqCst);
        self.close();
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_deactivated() {
            return Err(Error::illegal_state(format!(
                "component using {} has been deactivated",
                self.reference
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ComponentServiceObjects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentServiceObjects")
            .field("reference", &self.reference)
            .field("instances", &self.instance_count())
            .field("deactivated", &self.is_deactivated())
            .finish()
    }
}

/// Cache of service objects and prototype instances for one module
pub struct ServiceObjectsHelper {
    context: Arc<dyn ModuleContext>,
    services: Mutex<HashMap<ServiceId, Arc<ComponentServiceObjects>>>,
    closed: Mutex<Vec<Arc<ComponentServiceObjects>>>,
    prototypes: Mutex<HashMap<ServiceId, ServiceInstance>>,
}

impl ServiceObjectsHelper {
    pub fn new(context: Arc<dyn ModuleContext>) -> Self {
        Self {
            context,
            services: Mutex::new(HashMap::new()),
            closed: Mutex::new(Vec::new()),
            prototypes: Mutex::new(HashMap::new()),
        }
    }

    /// Cached service objects for `reference`, created on first use
    ///
    /// Returns `None` if the directory no longer knows the service.
    pub fn service_objects(&self, reference: &ServiceRef) -> Option<Arc<ComponentServiceObjects>> {
        if let Some(existing) = self.services.lock().get(&reference.id()) {
            return Some(existing.clone());
        }

        let objects = self.context.service_objects(reference)?;
        let candidate = Arc::new(ComponentServiceObjects::new(reference.clone(), objects));

        let mut services = self.services.lock();
        match services.entry(reference.id()) {
            Entry::Occupied(slot) => Some(slot.get().clone()),
            Entry::Vacant(slot) => Some(slot.insert(candidate).clone()),
        }
    }

    /// Close the cached service objects for `reference`
    pub fn close_service_objects(&self, reference: &ServiceRef) {
        let removed = self.services.lock().remove(&reference.id());
        if let Some(objects) = removed {
            self.closed.lock().push(objects.clone());
            objects.close();
        }
    }

    /// The single cached prototype instance for `reference`
    ///
    /// If two threads race, the loser returns its own instance to the
    /// directory and both receive the winner's.
    pub fn prototype_instance(&self, reference: &ServiceRef) -> Option<ServiceInstance> {
        if let Some(existing) = self.prototypes.lock().get(&reference.id()) {
            return Some(existing.clone());
        }

        let objects = self.service_objects(reference)?;
        let instance = match objects.get_service() {
            Ok(Some(instance)) => instance,
            Ok(None) => return None,
            Err(e) => {
                debug!(service = %reference, error = %e, "Cannot obtain prototype instance");
                return None;
            }
        };

        let winner = {
            let mut prototypes = self.prototypes.lock();
            prototypes
                .entry(reference.id())
                .or_insert_with(|| instance.clone())
                .clone()
        };

        if !Arc::ptr_eq(&winner, &instance) {
            if let Err(e) = objects.unget_service(&instance) {
                debug!(
                    service = %reference,
                    error = %e,
                    "Failed to return surplus prototype instance"
                );
            }
        }
        Some(winner)
    }

    /// Deactivate every tracked service objects and clear the caches
    pub fn cleanup(&self) {
        let services: Vec<_> = self.services.lock().drain().map(|(_, s)| s).collect();
        let closed: Vec<_> = self.closed.lock().drain(..).collect();
        self.prototypes.lock().clear();

        for objects in services.iter().chain(closed.iter()) {
            objects.deactivate();
        }
    }

    pub fn cached_count(&self) -> usize {
        self.services.lock().len()
    }
}

impl std::fmt::Debug for ServiceObjectsHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceObjectsHelper")
            .field("services", &self.cached_count())
            .finish()
    }
}
