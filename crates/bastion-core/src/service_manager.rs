//! Creates the services declared under `app.config.objects` and drives their
//! lifecycle.
//!
//! Every declared entry `{clsid, ...config, statePath?}` is created eagerly
//! when the manager is constructed and registered in the catalog under
//! `objects.<name>`. Lookups never create or start anything. Lifecycle calls
//! go through [`ServiceState::transition`], so ordering rules are checked
//! before the service sees the call.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::command::CommandProcessor;
use crate::context::{APP_CONFIG_PATH, Context, OBJECTS_PATH};
use crate::error::{CoreError, Result};
use crate::factory::{ConstructScope, ObjectClass, STATE_PATH_KEY};
use crate::object::{ClassId, InterfaceSet, ObjectHandle};
use crate::path::{CatalogPath, PathSegment};
use crate::service::{LifecycleEvent, LifecyclePolicy, Service, ServiceRegistry, ServiceState};
use crate::variant::{Dictionary, Variant};

/// Class id of [`ServiceManager`].
pub const CLSID_SERVICE_MANAGER: ClassId = ClassId::new(0xB500_0001);

const SERVICES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::services");
const STRICT_LIFECYCLE_KEY: &str = "strictLifecycle";
const NAME_PARAM: &str = "name";

struct ManagedService {
    handle: ObjectHandle,
    service: Option<Arc<dyn Service>>,
    state: ServiceState,
    state_path: Option<String>,
}

/// Owner of the declared services.
pub struct ServiceManager {
    context: Context,
    policy: LifecyclePolicy,
    services: Mutex<BTreeMap<String, ManagedService>>,
    named: Mutex<BTreeSet<String>>,
    disabled: AtomicBool,
}

impl std::fmt::Debug for ServiceManager {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServiceManager")
            .field("policy", &self.policy)
            .field("services", &self.service_names())
            .field("disabled", &self.disabled.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ServiceManager {
    /// Creates every service declared in the catalog.
    ///
    /// # Errors
    ///
    /// Fails when the declaration is malformed or any service cannot be
    /// created. Services created before the failure are unregistered again.
    pub fn load(context: &Context, policy: LifecyclePolicy) -> Result<Self> {
        let manager = Self {
            context: context.clone(),
            policy,
            services: Mutex::new(BTreeMap::new()),
            named: Mutex::new(BTreeSet::new()),
            disabled: AtomicBool::new(false),
        };
        let declared = match context
            .catalog()
            .get_or(&format!("{APP_CONFIG_PATH}.{OBJECTS_PATH}"), Variant::Null)?
        {
            Variant::Null => Dictionary::new(),
            Variant::Dictionary(dict) => dict,
            other => {
                return Err(CoreError::type_error(format!(
                    "service declarations must be a dictionary, not a {} value",
                    other.type_name()
                )));
            }
        };

        for (name, descriptor) in &declared {
            if let Err(error) = manager.create_service(name, descriptor) {
                manager.unregister_all();
                return Err(error.with_context(format!("cannot create service <{name}>")));
            }
        }
        Ok(manager)
    }

    fn create_service(&self, name: &str, descriptor: &Variant) -> Result<()> {
        let path = registration_path(name)?;
        let handle = self.context.create_object_from(descriptor)?;
        let state_path = descriptor
            .get(STATE_PATH_KEY)
            .and_then(Variant::as_str)
            .map(ToOwned::to_owned);
        let service = handle.query_interface_safe::<dyn Service>();
        if let (Some(service), Some(state_path)) = (&service, &state_path) {
            let previous = self.context.catalog().get_or(state_path, Variant::Null)?;
            service.load_state(&previous)?;
        }
        self.context
            .catalog()
            .put(&path, Variant::Object(handle.clone()))?;
        info!(
            target: SERVICES_TARGET,
            service = name,
            class_id = %handle.class_id(),
            object_id = %handle.object_id(),
            "service created"
        );
        self.services.lock().insert(
            name.to_owned(),
            ManagedService {
                handle,
                service,
                state: ServiceState::Constructed,
                state_path,
            },
        );
        Ok(())
    }

    fn unregister_all(&self) {
        let names: Vec<String> = self.services.lock().keys().cloned().collect();
        for name in names {
            if let Err(error) = self
                .context
                .catalog()
                .put(&format!("{OBJECTS_PATH}.{name}"), Variant::Null)
            {
                warn!(
                    target: SERVICES_TARGET,
                    service = %name,
                    error = %error,
                    "failed to unregister service"
                );
            }
        }
        self.services.lock().clear();
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.disabled.load(Ordering::SeqCst) {
            return Err(CoreError::shutdown_is_started(
                "the service manager has been shut down",
            ));
        }
        Ok(())
    }

    fn apply(&self, name: &str, event: LifecycleEvent) -> Result<()> {
        self.ensure_enabled()?;
        let (service, state) = {
            let services = self.services.lock();
            let entry = services.get(name).ok_or_else(|| unknown_service(name))?;
            let service = entry.service.clone().ok_or_else(|| {
                CoreError::type_error(format!("object <{name}> is not a service"))
            })?;
            (service, entry.state)
        };
        let next = state.transition(event, self.policy)?;
        invoke(service.as_ref(), event).map_err(|error| {
            warn!(
                target: SERVICES_TARGET,
                service = name,
                %event,
                error = %error,
                "service lifecycle call failed"
            );
            error.with_context(format!("cannot {event} service <{name}>"))
        })?;
        if let Some(entry) = self.services.lock().get_mut(name) {
            entry.state = next;
        }
        info!(
            target: SERVICES_TARGET,
            service = name,
            %event,
            state = %next,
            "service lifecycle updated"
        );
        Ok(())
    }

    fn save_states(&self) {
        let pending: Vec<(String, Arc<dyn Service>, String)> = self
            .services
            .lock()
            .iter()
            .filter_map(|(name, entry)| {
                let service = entry.service.clone()?;
                let path = entry.state_path.clone()?;
                Some((name.clone(), service, path))
            })
            .collect();
        for (name, service, path) in pending {
            let saved = service
                .save_state()
                .and_then(|state| self.context.catalog().put(&path, state));
            if let Err(error) = saved {
                warn!(
                    target: SERVICES_TARGET,
                    service = %name,
                    error = %error,
                    "failed to save service state"
                );
            }
        }
    }

    fn status(&self) -> Variant {
        let services = self.services.lock();
        let status: Dictionary = services
            .iter()
            .map(|(name, entry)| {
                let state = if entry.service.is_some() {
                    Variant::from(entry.state.to_string())
                } else {
                    Variant::Null
                };
                (name.clone(), state)
            })
            .collect();
        Variant::Dictionary(status)
    }
}

impl ServiceRegistry for ServiceManager {
    fn query_service(&self, name: &str) -> Result<ObjectHandle> {
        self.ensure_enabled()?;
        let managed = self
            .services
            .lock()
            .get(name)
            .map(|entry| entry.handle.clone());
        if let Some(handle) = managed {
            return Ok(handle);
        }
        if !self.named.lock().contains(name) {
            return Err(unknown_service(name));
        }
        match self.context.catalog().get(&registration_path(name)?)? {
            Variant::Object(handle) => Ok(handle),
            other => Err(CoreError::type_error(format!(
                "catalog entry for <{name}> holds a {} value, not an object",
                other.type_name()
            ))),
        }
    }

    fn service_state(&self, name: &str) -> Result<ServiceState> {
        let services = self.services.lock();
        let entry = services.get(name).ok_or_else(|| unknown_service(name))?;
        Ok(entry.state)
    }

    fn start_service(&self, name: &str) -> Result<()> {
        self.apply(name, LifecycleEvent::Start)
    }

    fn stop_service(&self, name: &str) -> Result<()> {
        self.apply(name, LifecycleEvent::Stop)
    }

    fn service_names(&self) -> Vec<String> {
        self.services.lock().keys().cloned().collect()
    }

    fn put_named_object(&self, name: &str, object: Variant) -> Result<()> {
        self.ensure_enabled()?;
        if self.services.lock().contains_key(name) {
            return Err(CoreError::invalid_argument(format!(
                "cannot register a named object over service <{name}>"
            )));
        }
        let path = registration_path(name)?;
        if object.is_null() {
            self.erase_named_object(name)?;
            return Ok(());
        }
        self.context.catalog().put(&path, object)?;
        self.named.lock().insert(name.to_owned());
        Ok(())
    }

    fn erase_named_object(&self, name: &str) -> Result<bool> {
        if self.disabled.load(Ordering::SeqCst) {
            return Ok(false);
        }
        if self.services.lock().contains_key(name) {
            return Err(CoreError::invalid_argument(format!(
                "cannot erase service <{name}>"
            )));
        }
        if !self.named.lock().remove(name) {
            return Ok(false);
        }
        self.context
            .catalog()
            .put(&registration_path(name)?, Variant::Null)?;
        Ok(true)
    }

    fn stop_all(&self) {
        let running: Vec<String> = self
            .services
            .lock()
            .iter()
            .filter(|(_, entry)| entry.state == ServiceState::Started)
            .map(|(name, _)| name.clone())
            .collect();
        for name in running {
            if let Err(error) = self.apply(&name, LifecycleEvent::Stop) {
                warn!(
                    target: SERVICES_TARGET,
                    service = %name,
                    error = %error,
                    "error while stopping service"
                );
            }
        }
    }

    fn shutdown_all(&self) {
        if self.disabled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.save_states();

        let named: Vec<String> = std::mem::take(&mut *self.named.lock()).into_iter().collect();
        for name in named {
            if let Err(error) = self
                .context
                .catalog()
                .put(&format!("{OBJECTS_PATH}.{name}"), Variant::Null)
            {
                warn!(
                    target: SERVICES_TARGET,
                    object = %name,
                    error = %error,
                    "failed to remove named object"
                );
            }
        }

        let services = std::mem::take(&mut *self.services.lock());
        for (name, entry) in &services {
            let Some(service) = &entry.service else {
                continue;
            };
            if entry.state == ServiceState::ShutDown {
                continue;
            }
            if let Err(error) = service.shutdown() {
                warn!(
                    target: SERVICES_TARGET,
                    service = %name,
                    error = %error,
                    "error while shutting down service"
                );
            }
        }
        for name in services.keys() {
            if let Err(error) = self
                .context
                .catalog()
                .put(&format!("{OBJECTS_PATH}.{name}"), Variant::Null)
            {
                warn!(
                    target: SERVICES_TARGET,
                    service = %name,
                    error = %error,
                    "failed to unregister service"
                );
            }
        }
        info!(
            target: SERVICES_TARGET,
            count = services.len(),
            "services shut down"
        );
    }
}

impl CommandProcessor for ServiceManager {
    fn execute(&self, command: &str, params: &Variant) -> Result<Variant> {
        match command {
            "stop" => {
                self.stop_all();
                Ok(Variant::Null)
            }
            "shutdown" => {
                self.shutdown_all();
                Ok(Variant::Null)
            }
            "startService" => self.start_service(name_param(params)?).map(|()| Variant::Null),
            "stopService" => self.stop_service(name_param(params)?).map(|()| Variant::Null),
            "queryService" => self.query_service(name_param(params)?).map(Variant::Object),
            "status" => Ok(self.status()),
            other => Err(CoreError::operation_not_supported(other)),
        }
    }
}

impl ObjectClass for ServiceManager {
    const CLASS_ID: ClassId = CLSID_SERVICE_MANAGER;
    const IS_SERVICE: bool = true;

    fn final_construct(scope: &ConstructScope<'_>, config: &Dictionary) -> Result<Self> {
        let strict = match config.get(STRICT_LIFECYCLE_KEY) {
            None | Some(Variant::Null) => false,
            Some(Variant::Bool(flag)) => *flag,
            Some(other) => {
                return Err(CoreError::type_error(format!(
                    "<{STRICT_LIFECYCLE_KEY}> must be a bool, not a {} value",
                    other.type_name()
                )));
            }
        };
        let policy = if strict {
            LifecyclePolicy::Strict
        } else {
            LifecyclePolicy::Lenient
        };
        Self::load(scope.context(), policy)
    }

    fn interfaces(self: Arc<Self>) -> InterfaceSet {
        InterfaceSet::new()
            .with_processor(Arc::clone(&self) as Arc<dyn CommandProcessor>)
            .with_registry(self)
    }
}

fn invoke(service: &dyn Service, event: LifecycleEvent) -> Result<()> {
    match event {
        LifecycleEvent::Start => service.start(),
        LifecycleEvent::Stop => service.stop(),
        LifecycleEvent::Shutdown => service.shutdown(),
    }
}

fn registration_path(name: &str) -> Result<String> {
    let parsed = CatalogPath::parse(name)?;
    match parsed.segments() {
        [PathSegment::Key(_)] => Ok(format!("{OBJECTS_PATH}.{name}")),
        _ => Err(CoreError::invalid_argument(format!(
            "invalid service name <{name}>"
        ))),
    }
}

fn name_param(params: &Variant) -> Result<&str> {
    params
        .get(NAME_PARAM)
        .and_then(Variant::as_str)
        .ok_or_else(|| CoreError::invalid_argument("command requires a <name> string parameter"))
}

fn unknown_service(name: &str) -> CoreError {
    CoreError::invalid_argument(format!("service <{name}> is not declared"))
}
