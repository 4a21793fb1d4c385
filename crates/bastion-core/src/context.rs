//! Explicit runtime context shared by every component.

use std::fmt;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::error::{CoreError, Result};
use crate::factory::ObjectManager;
use crate::object::{ClassId, ObjectHandle};
use crate::variant::{Dictionary, Variant};

/// Catalog prefix under which named objects and services are registered.
pub const OBJECTS_PATH: &str = "objects";

/// Catalog path of the application configuration.
pub const APP_CONFIG_PATH: &str = "app.config";

struct ContextInner {
    catalog: Catalog,
    objects: ObjectManager,
}

/// Cheaply cloneable handle to the catalog and the object manager.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Context")
            .field("objects", &self.inner.objects)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Creates an empty context with no registered classes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                catalog: Catalog::new(),
                objects: ObjectManager::new(),
            }),
        }
    }

    /// Shared catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Shared object manager.
    #[must_use]
    pub fn objects(&self) -> &ObjectManager {
        &self.inner.objects
    }

    /// Creates an object of `class_id`.
    pub fn create_object(&self, class_id: ClassId, config: &Dictionary) -> Result<ObjectHandle> {
        self.objects().create(self, class_id, config)
    }

    /// Creates an object from a class id or `{clsid, ...}` descriptor.
    pub fn create_object_from(&self, descriptor: &Variant) -> Result<ObjectHandle> {
        self.objects().create_from_descriptor(self, descriptor)
    }

    /// Resolves an object by name.
    ///
    /// The name is looked up under `objects.<name>` first and then as a raw
    /// catalog path.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` when neither location exists and with
    /// `TypeError` when the value found is not an object.
    pub fn resolve_object(&self, name: &str) -> Result<ObjectHandle> {
        let registered = self
            .catalog()
            .get_safe(&format!("{OBJECTS_PATH}.{name}"))
            .ok()
            .flatten();
        let value = match registered {
            Some(value) => value,
            None => self.catalog().get(name)?,
        };
        match value {
            Variant::Object(handle) => Ok(handle),
            other => Err(CoreError::type_error(format!(
                "catalog entry <{name}> holds a {} value, not an object",
                other.type_name()
            ))),
        }
    }
}
