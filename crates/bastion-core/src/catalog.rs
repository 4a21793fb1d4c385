//! Hierarchical key/value store holding configuration and live objects.
//!
//! Values are addressed by [`CatalogPath`] strings. Readers share a lock and
//! writers take it exclusively, so a reader never observes a half-applied
//! write. Reads hand out clones; mutation only happens through the catalog.

use parking_lot::RwLock;
use tracing::trace;

use crate::error::{CoreError, Result};
use crate::path::CatalogPath;
use crate::variant::{Dictionary, Variant};

const CATALOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::catalog");

/// Shared hierarchical store.
#[derive(Debug, Default)]
pub struct Catalog {
    root: RwLock<Dictionary>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the value at `path`.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` when the path, or one of its ancestors,
    /// does not exist.
    pub fn get(&self, path: &str) -> Result<Variant> {
        let parsed = CatalogPath::parse(path)?;
        self.read(&parsed)?.ok_or_else(|| {
            CoreError::invalid_argument(format!("catalog path <{parsed}> does not exist"))
        })
    }

    /// Reads the value at `path`, returning `None` when it does not exist.
    pub fn get_safe(&self, path: &str) -> Result<Option<Variant>> {
        let parsed = CatalogPath::parse(path)?;
        self.read(&parsed)
    }

    /// Reads the value at `path`, falling back to `default`.
    pub fn get_or(&self, path: &str, default: Variant) -> Result<Variant> {
        Ok(self.get_safe(path)?.unwrap_or(default))
    }

    /// Stores `value` at `path`, replacing any existing subtree.
    ///
    /// Writing [`Variant::Null`] deletes the path. Writing the root requires
    /// a dictionary.
    pub fn put(&self, path: &str, value: impl Into<Variant>) -> Result<()> {
        let parsed = CatalogPath::parse(path)?;
        let mut root = self.root.write();
        write_value(&mut root, &parsed, value.into())
    }

    /// Returns the value at `path`, storing `default` first when absent.
    pub fn init(&self, path: &str, default: impl Into<Variant>) -> Result<Variant> {
        let parsed = CatalogPath::parse(path)?;
        let mut root = self.root.write();
        if let Some(existing) = lookup(&root, &parsed)? {
            return Ok(existing);
        }
        let value = default.into();
        write_value(&mut root, &parsed, value.clone())?;
        Ok(value)
    }

    /// Applies `modify` to the current value at `path` under one write lock.
    ///
    /// The closure receives the current value (if any) and returns the value
    /// to store; returning [`Variant::Null`] deletes the path.
    pub fn update<F>(&self, path: &str, modify: F) -> Result<Variant>
    where
        F: FnOnce(Option<&Variant>) -> Result<Variant>,
    {
        let parsed = CatalogPath::parse(path)?;
        let mut root = self.root.write();
        let current = lookup(&root, &parsed)?;
        let next = modify(current.as_ref())?;
        write_value(&mut root, &parsed, next.clone())?;
        Ok(next)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.root.write().clear();
        trace!(target: CATALOG_TARGET, "catalog cleared");
    }

    /// Returns a copy of the whole tree.
    #[must_use]
    pub fn snapshot(&self) -> Dictionary {
        self.root.read().clone()
    }

    fn read(&self, path: &CatalogPath) -> Result<Option<Variant>> {
        let root = self.root.read();
        lookup(&root, path)
    }
}

fn lookup(root: &Dictionary, path: &CatalogPath) -> Result<Option<Variant>> {
    if path.is_root() {
        return Ok(Some(Variant::Dictionary(root.clone())));
    }
    Ok(path.find(root)?.cloned())
}

fn write_value(root: &mut Dictionary, path: &CatalogPath, value: Variant) -> Result<()> {
    trace!(
        target: CATALOG_TARGET,
        path = %path,
        kind = value.type_name(),
        "catalog write"
    );
    match (path.is_root(), value) {
        (true, Variant::Null) => {
            root.clear();
            Ok(())
        }
        (true, Variant::Dictionary(dict)) => {
            *root = dict;
            Ok(())
        }
        (true, other) => Err(CoreError::type_error(format!(
            "the catalog root must be a dictionary, not a {} value",
            other.type_name()
        ))),
        (false, Variant::Null) => path.remove(root).map(|_| ()),
        (false, other) => path.assign(root, other),
    }
}
