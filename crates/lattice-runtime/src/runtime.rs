//! Main runtime coordinator
//!
//! TigerStyle: Single entry point, explicit configuration, clean shutdown.

use crate::activator::{ActivatorParts, HolderFactory, ModuleComponentActivator};
use crate::actor::ActorExecutor;
use crate::context::ModuleContext;
use crate::descriptor::{load_descriptors, DescriptorParser};
use lattice_core::{ComponentMetadata, Error, ModuleId, Result, RuntimeConfig, TaskScheduler};
use lattice_registry::{
    ChangeCountPublisher, ComponentRegistry, ConfigurationTracker, DisposalReason,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Creates the configuration tracker for a module's region
pub trait ConfigurationTrackerFactory: Send + Sync {
    fn create(
        &self,
        module: ModuleId,
        registry: &Arc<ComponentRegistry>,
    ) -> Box<dyn ConfigurationTracker>;
}

/// Builder for creating a runtime
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    holder_factory: Option<Arc<dyn HolderFactory>>,
    parser: Option<Arc<dyn DescriptorParser>>,
    trackers: Option<Arc<dyn ConfigurationTrackerFactory>>,
    publisher: Option<Arc<dyn ChangeCountPublisher>>,
}

impl RuntimeBuilder {
    /// Create a new runtime builder
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            holder_factory: None,
            parser: None,
            trackers: None,
            publisher: None,
        }
    }

    /// Set the configuration
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the holder factory
    pub fn with_holder_factory(mut self, factory: Arc<dyn HolderFactory>) -> Self {
        self.holder_factory = Some(factory);
        self
    }

    /// Set the descriptor parser
    pub fn with_descriptor_parser(mut self, parser: Arc<dyn DescriptorParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Track configuration for modules whose components consult it
    pub fn with_configuration_trackers(
        mut self,
        trackers: Arc<dyn ConfigurationTrackerFactory>,
    ) -> Self {
        self.trackers = Some(trackers);
        self
    }

    /// Publish the change count through `publisher`
    pub fn with_change_count_publisher(mut self, publisher: Arc<dyn ChangeCountPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Run asynchronous work inline instead of on the actor thread
    pub fn without_actor(mut self) -> Self {
        self.config.actor.enabled = false;
        self
    }

    /// Build the runtime
    pub fn build(self) -> Result<ComponentRuntime> {
        self.config.validate()?;

        let holder_factory = self.holder_factory.ok_or_else(|| Error::Internal {
            message: "holder factory is required".into(),
        })?;

        let parser = self.parser.ok_or_else(|| Error::Internal {
            message: "descriptor parser is required".into(),
        })?;

        let actor = if self.config.actor.enabled {
            Some(Arc::new(ActorExecutor::start(self.config.actor.thread_name.clone())?))
        } else {
            None
        };

        let registry = Arc::new(ComponentRegistry::new(&self.config));
        if let Some(publisher) = self.publisher {
            registry.set_change_count_publisher(publisher);
        }

        info!(
            actor = self.config.actor.enabled,
            changecount_window_ms = self.config.registry.service_changecount_timeout_ms,
            "Component runtime started"
        );

        Ok(ComponentRuntime {
            config: self.config,
            registry,
            actor,
            holder_factory,
            parser,
            trackers: self.trackers,
            activators: Mutex::new(HashMap::new()),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the registry, the actor and one activator per started module
pub struct ComponentRuntime {
    config: RuntimeConfig,
    registry: Arc<ComponentRegistry>,
    actor: Option<Arc<ActorExecutor>>,
    holder_factory: Arc<dyn HolderFactory>,
    parser: Arc<dyn DescriptorParser>,
    trackers: Option<Arc<dyn ConfigurationTrackerFactory>>,
    activators: Mutex<HashMap<ModuleId, Arc<ModuleComponentActivator>>>,
}

impl ComponentRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn actor(&self) -> Option<&Arc<ActorExecutor>> {
        self.actor.as_ref()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn activator(&self, module: ModuleId) -> Option<Arc<ModuleComponentActivator>> {
        self.activators.lock().get(&module).cloned()
    }

    /// Start managing the components of a module
    ///
    /// Uses `cached` metadata when given, otherwise reads the module's
    /// descriptors.
    ///
    /// # Errors
    /// `IllegalState` if the module is already started; `InvalidDescriptor`
    /// if it declares no descriptors.
    pub fn start_module(
        &self,
        context: Arc<dyn ModuleContext>,
        cached: Option<Vec<ComponentMetadata>>,
    ) -> Result<Arc<ModuleComponentActivator>> {
        let module = context.module().id;
        if self.activators.lock().contains_key(&module) {
            return Err(Error::illegal_state(format!("module {} already started", module)));
        }

        let descriptors = match cached {
            Some(descriptors) => descriptors,
            None => load_descriptors(context.as_ref(), self.parser.as_ref())?,
        };

        let activator = ModuleComponentActivator::new(ActivatorParts {
            context,
            registry: self.registry.clone(),
            scheduler: self
                .actor
                .clone()
                .map(|actor| actor as Arc<dyn TaskScheduler>),
            config: self.config.clone(),
        });

        {
            let mut activators = self.activators.lock();
            if activators.contains_key(&module) {
                return Err(Error::illegal_state(format!("module {} already started", module)));
            }
            activators.insert(module, activator.clone());
        }

        activator.initialize(descriptors, self.holder_factory.as_ref());

        if let Some(trackers) = &self.trackers {
            if activator.needs_configuration() {
                let registry = self.registry.clone();
                activator.set_region_configuration(|| trackers.create(module, &registry));
            }
        }

        activator.initial_enable();
        Ok(activator)
    }

    /// Dispose the components of a module
    ///
    /// Returns false if the module was not started.
    pub fn stop_module(&self, module: ModuleId, reason: DisposalReason) -> Result<bool> {
        let activator = self.activators.lock().remove(&module);
        match activator {
            Some(activator) => {
                activator.dispose(reason)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop every module, cancel pending publication and stop the actor
    ///
    /// # Errors
    /// `Timeout` if the actor does not drain within the stop timeout.
    pub fn shutdown(&self) -> Result<()> {
        let activators: Vec<_> = self.activators.lock().drain().map(|(_, a)| a).collect();
        for activator in activators {
            if let Err(e) = activator.dispose(DisposalReason::RuntimeShutdown) {
                warn!(
                    module = %activator.module().id,
                    error = %e,
                    "Module did not dispose cleanly"
                );
            }
        }

        self.registry.shutdown();

        if let Some(actor) = &self.actor {
            actor.shutdown(self.config.stop_timeout())?;
        }

        info!("Component runtime stopped");
        Ok(())
    }
}

impl std::fmt::Debug for ComponentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRuntime")
            .field("modules", &self.activators.lock().len())
            .field("registry", &self.registry)
            .finish()
    }
}
