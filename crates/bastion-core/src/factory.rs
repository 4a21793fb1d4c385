//! Object factory: class registration, construction and instance accounting.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::object::{ClassId, InterfaceSet, ObjectHandle, ObjectId};
use crate::variant::{Dictionary, Sequence, Variant};

const OBJECTS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::objects");
const CLSID_KEY: &str = "clsid";
/// Descriptor key naming where a service keeps its state between runs.
pub(crate) const STATE_PATH_KEY: &str = "statePath";
/// Keys consumed by the factory and the service manager, never passed to
/// `final_construct`.
const DESCRIPTOR_KEYS: [&str; 2] = [CLSID_KEY, STATE_PATH_KEY];

/// A type the factory can construct.
///
/// `final_construct` validates the configuration and builds the object;
/// `interfaces` declares the capabilities the object exposes.
pub trait ObjectClass: Sized + Send + Sync + 'static {
    /// Identifier the class is registered under.
    const CLASS_ID: ClassId;

    /// Services allow at most one live instance.
    const IS_SERVICE: bool = false;

    /// Builds the object from its configuration.
    fn final_construct(scope: &ConstructScope<'_>, config: &Dictionary) -> Result<Self>;

    /// Declares the capabilities of the constructed object.
    fn interfaces(self: Arc<Self>) -> InterfaceSet;
}

/// Environment handed to [`ObjectClass::final_construct`].
#[derive(Debug)]
pub struct ConstructScope<'a> {
    context: &'a Context,
    class_id: ClassId,
    object_id: ObjectId,
}

impl ConstructScope<'_> {
    /// Context the object is created in.
    #[must_use]
    pub const fn context(&self) -> &Context {
        self.context
    }

    /// Class being constructed.
    #[must_use]
    pub const fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// Id assigned to the new object.
    #[must_use]
    pub const fn object_id(&self) -> ObjectId {
        self.object_id
    }
}

/// Registration metadata of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassInfo {
    /// Registered identifier.
    pub class_id: ClassId,
    /// Whether the class is limited to one live instance.
    pub is_service: bool,
}

type Constructor = dyn Fn(&ConstructScope<'_>, &Dictionary) -> Result<InterfaceSet> + Send + Sync;

struct Factory {
    info: ClassInfo,
    construct: Box<Constructor>,
}

type LiveCounts = Mutex<BTreeMap<ClassId, usize>>;

/// Releases one live-instance slot of a class when dropped.
pub(crate) struct InstanceTracker {
    class_id: ClassId,
    counts: Weak<LiveCounts>,
}

impl Drop for InstanceTracker {
    fn drop(&mut self) {
        let Some(counts) = self.counts.upgrade() else {
            return;
        };
        let mut counts = counts.lock();
        if let Some(count) = counts.get_mut(&self.class_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&self.class_id);
            }
        }
    }
}

/// Registry of object classes and factory for their instances.
pub struct ObjectManager {
    factories: RwLock<HashMap<ClassId, Arc<Factory>>>,
    next_id: AtomicU64,
    live: Arc<LiveCounts>,
}

impl Default for ObjectManager {
    fn default() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            live: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl std::fmt::Debug for ObjectManager {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut classes: Vec<ClassId> = self.factories.read().keys().copied().collect();
        classes.sort_unstable();
        formatter
            .debug_struct("ObjectManager")
            .field("classes", &classes)
            .field("live", &*self.live.lock())
            .finish()
    }
}

impl ObjectManager {
    /// Creates a manager without registered classes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under [`ObjectClass::CLASS_ID`].
    ///
    /// # Errors
    ///
    /// Fails with `AlreadyExists` when the id is taken.
    pub fn register<T: ObjectClass>(&self) -> Result<()> {
        let info = ClassInfo {
            class_id: T::CLASS_ID,
            is_service: T::IS_SERVICE,
        };
        let construct: Box<Constructor> = Box::new(|scope: &ConstructScope<'_>, config: &Dictionary| {
            T::final_construct(scope, config).map(|object| Arc::new(object).interfaces())
        });
        let mut factories = self.factories.write();
        if factories.contains_key(&info.class_id) {
            return Err(CoreError::already_exists(format!(
                "class {} is already registered",
                info.class_id
            )));
        }
        factories.insert(info.class_id, Arc::new(Factory { info, construct }));
        debug!(
            target: OBJECTS_TARGET,
            class_id = %info.class_id,
            is_service = info.is_service,
            "class registered"
        );
        Ok(())
    }

    /// Registration metadata for `class_id`.
    #[must_use]
    pub fn class_info(&self, class_id: ClassId) -> Option<ClassInfo> {
        self.factories.read().get(&class_id).map(|factory| factory.info)
    }

    /// Allocates a fresh object id.
    pub fn generate_id(&self) -> ObjectId {
        ObjectId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates an instance of `class_id` configured by `config`.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` for unknown classes, `InvalidUsage` when
    /// a service class already has a live instance, and with whatever
    /// `final_construct` reports for bad configuration.
    pub fn create(
        &self,
        context: &Context,
        class_id: ClassId,
        config: &Dictionary,
    ) -> Result<ObjectHandle> {
        let factory = self
            .factories
            .read()
            .get(&class_id)
            .cloned()
            .ok_or_else(|| {
                CoreError::invalid_argument(format!("class {class_id} is not registered"))
            })?;
        let tracker = self.reserve(factory.info)?;
        let object_id = self.generate_id();
        let scope = ConstructScope {
            context,
            class_id,
            object_id,
        };
        let interfaces = (factory.construct)(&scope, config)
            .map_err(|error| error.with_context(format!("cannot create object of class {class_id}")))?;
        debug!(
            target: OBJECTS_TARGET,
            class_id = %class_id,
            object_id = %object_id,
            interfaces = ?interfaces,
            "object created"
        );
        Ok(ObjectHandle::new(class_id, object_id, interfaces, tracker))
    }

    /// Creates an object from a descriptor.
    ///
    /// A descriptor is a class id (integer or hex string), or a dictionary
    /// holding `clsid` plus the remaining configuration. `statePath` belongs
    /// to the service manager and is stripped with `clsid`.
    pub fn create_from_descriptor(
        &self,
        context: &Context,
        descriptor: &Variant,
    ) -> Result<ObjectHandle> {
        match descriptor {
            Variant::Integer(_) | Variant::String(_) => {
                let class_id = ClassId::from_variant(descriptor)?;
                self.create(context, class_id, &Dictionary::new())
            }
            Variant::Dictionary(dict) => {
                let raw = dict.get(CLSID_KEY).ok_or_else(|| {
                    CoreError::invalid_argument("object descriptor has no <clsid> field")
                })?;
                let class_id = ClassId::from_variant(raw)?;
                let config: Dictionary = dict
                    .iter()
                    .filter(|(key, _)| !DESCRIPTOR_KEYS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                self.create(context, class_id, &config)
            }
            other => Err(CoreError::invalid_argument(format!(
                "object descriptor must be a class id or a dictionary, not a {} value",
                other.type_name()
            ))),
        }
    }

    /// Number of live instances of `class_id`.
    #[must_use]
    pub fn live_count(&self, class_id: ClassId) -> usize {
        self.live.lock().get(&class_id).copied().unwrap_or_default()
    }

    /// Live instance counts as a sequence of `{clsid, count}` dictionaries.
    #[must_use]
    pub fn stat_info(&self) -> Variant {
        let counts = self.live.lock();
        let entries: Sequence = counts
            .iter()
            .map(|(class_id, count)| {
                let mut entry = Dictionary::new();
                entry.insert(CLSID_KEY.into(), Variant::from(*class_id));
                entry.insert(
                    "count".into(),
                    Variant::from(i64::try_from(*count).unwrap_or(i64::MAX)),
                );
                Variant::Dictionary(entry)
            })
            .collect();
        Variant::Sequence(entries)
    }

    fn reserve(&self, info: ClassInfo) -> Result<InstanceTracker> {
        let mut counts = self.live.lock();
        let count = counts.entry(info.class_id).or_insert(0);
        if info.is_service && *count > 0 {
            return Err(CoreError::invalid_usage(format!(
                "service class {} already has a live instance",
                info.class_id
            )));
        }
        *count += 1;
        Ok(InstanceTracker {
            class_id: info.class_id,
            counts: Arc::downgrade(&self.live),
        })
    }
}
