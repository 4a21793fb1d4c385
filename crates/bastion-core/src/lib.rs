//! Object and service framework for the bastion agent.
//!
//! The core is built from a few cooperating pieces:
//!
//! - [`Catalog`]: a hierarchical store addressed by dotted paths, holding
//!   configuration and live object references.
//! - [`ObjectManager`]: a factory that builds objects from a class id plus a
//!   configuration dictionary and hands back an [`ObjectHandle`] whose
//!   capabilities can be queried.
//! - [`ServiceManager`]: creates the services declared under
//!   `app.config.objects`, registers them as `objects.<name>` and drives
//!   their lifecycle.
//! - [`CommandProcessor`] and [`Command`]: uniform dispatch of named
//!   commands to local or remote processors.
//!
//! Components receive an explicit [`Context`] rather than reaching for
//! process-wide state.

mod catalog;
mod command;
mod context;
pub mod encoding;
mod error;
mod factory;
pub mod hash;
mod object;
mod path;
mod service;
mod service_manager;
mod variant;

pub use catalog::Catalog;
pub use command::{CLSID_COMMAND, Callable, Command, CommandProcessor, resolve_processor};
pub use context::{APP_CONFIG_PATH, Context, OBJECTS_PATH};
pub use error::{CoreError, ErrorKind, Result, SourceLocation};
pub use factory::{ClassInfo, ConstructScope, ObjectClass, ObjectManager};
pub use object::{ClassId, Interface, InterfaceSet, ObjectHandle, ObjectId};
pub use path::{CatalogPath, PathSegment};
pub use service::{LifecycleEvent, LifecyclePolicy, Service, ServiceRegistry, ServiceState};
pub use service_manager::{CLSID_SERVICE_MANAGER, ServiceManager};
pub use variant::{Dictionary, Sequence, Variant};

/// Registers the classes provided by the core.
///
/// # Errors
///
/// Fails with `AlreadyExists` when called twice on the same manager.
pub fn register_classes(objects: &ObjectManager) -> Result<()> {
    objects.register::<ServiceManager>()?;
    objects.register::<Command>()
}

#[cfg(test)]
mod tests;
