//! Service lifecycle contract and state machine.

use strum::Display;

use crate::error::{CoreError, Result};
use crate::object::ObjectHandle;
use crate::variant::Variant;

/// Catalog-managed object with an explicit lifecycle.
///
/// Methods take `&self`; implementations keep their mutable state behind
/// their own synchronisation.
pub trait Service: Send + Sync {
    /// Restores state persisted by a previous [`Service::save_state`].
    fn load_state(&self, _state: &Variant) -> Result<()> {
        Ok(())
    }

    /// Returns opaque state to persist across restarts.
    fn save_state(&self) -> Result<Variant> {
        Ok(Variant::Null)
    }

    /// Starts the service.
    fn start(&self) -> Result<()>;

    /// Stops the service. A stopped service may be started again.
    fn stop(&self) -> Result<()>;

    /// Releases the service for good.
    fn shutdown(&self) -> Result<()>;
}

/// Lifecycle position of a managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ServiceState {
    /// Created and configured, never started.
    Constructed,
    /// Running.
    Started,
    /// Stopped; may be started again.
    Stopped,
    /// Terminal.
    ShutDown,
}

/// Lifecycle request applied to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleEvent {
    /// `start()`.
    Start,
    /// `stop()`.
    Stop,
    /// `shutdown()`.
    Shutdown,
}

impl LifecycleEvent {
    const fn target(self) -> ServiceState {
        match self {
            Self::Start => ServiceState::Started,
            Self::Stop => ServiceState::Stopped,
            Self::Shutdown => ServiceState::ShutDown,
        }
    }
}

/// How strictly lifecycle ordering is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecyclePolicy {
    /// Out-of-order requests such as a repeated `start` are forwarded.
    #[default]
    Lenient,
    /// Only `Constructed|Stopped → Started → Stopped`, and `shutdown` after
    /// a start, are accepted.
    Strict,
}

impl ServiceState {
    /// Computes the state reached by applying `event`.
    ///
    /// Nothing is accepted after [`ServiceState::ShutDown`], whatever the
    /// policy.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidUsage` for rejected transitions.
    pub fn transition(self, event: LifecycleEvent, policy: LifecyclePolicy) -> Result<Self> {
        match (self, event) {
            (Self::ShutDown, _) => Err(CoreError::invalid_usage(format!(
                "cannot {event} a service that is shut down"
            ))),
            (Self::Constructed | Self::Stopped, LifecycleEvent::Start)
            | (Self::Started, LifecycleEvent::Stop)
            | (Self::Started | Self::Stopped, LifecycleEvent::Shutdown) => Ok(event.target()),
            _ if policy == LifecyclePolicy::Lenient => Ok(event.target()),
            _ => Err(CoreError::invalid_usage(format!(
                "cannot {event} a service in state {self}"
            ))),
        }
    }
}

/// Access to the services managed by a service manager.
pub trait ServiceRegistry: Send + Sync {
    /// Returns a declared service or named object without starting it.
    fn query_service(&self, name: &str) -> Result<ObjectHandle>;

    /// Current lifecycle state of a declared service.
    fn service_state(&self, name: &str) -> Result<ServiceState>;

    /// Starts a declared service.
    fn start_service(&self, name: &str) -> Result<()>;

    /// Stops a declared service.
    fn stop_service(&self, name: &str) -> Result<()>;

    /// Names of the declared services.
    fn service_names(&self) -> Vec<String>;

    /// Registers an object under `name`; `Null` removes it.
    fn put_named_object(&self, name: &str, object: Variant) -> Result<()>;

    /// Removes a named object, returning whether one existed.
    fn erase_named_object(&self, name: &str) -> Result<bool>;

    /// Stops every service, logging failures.
    fn stop_all(&self);

    /// Saves state and shuts down every service, then releases them.
    fn shutdown_all(&self);
}
