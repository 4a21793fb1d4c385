//! Object identity and capability sets.
//!
//! An [`ObjectHandle`] owns the set of interfaces its object declared at
//! construction. Callers ask for a capability with
//! [`ObjectHandle::query_interface`] and receive a typed trait object, or an
//! error when the object does not provide it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::command::{Callable, CommandProcessor};
use crate::error::{CoreError, Result};
use crate::factory::InstanceTracker;
use crate::service::{Service, ServiceRegistry};
use crate::variant::Variant;

/// Identifier naming a registered object constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    /// Wraps a raw class identifier.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw identifier.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Reads a class id from an integer or a hexadecimal string.
    pub fn from_variant(value: &Variant) -> Result<Self> {
        match value {
            Variant::Integer(raw) => u32::try_from(*raw).map(Self).map_err(|_| {
                CoreError::invalid_argument(format!("class id <{raw}> is out of range"))
            }),
            Variant::String(text) => text.parse(),
            other => Err(CoreError::invalid_argument(format!(
                "class id must be an integer or a hex string, not a {} value",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:08X}", self.0)
    }
}

impl FromStr for ClassId {
    type Err = CoreError;

    fn from_str(text: &str) -> Result<Self> {
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        u32::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| CoreError::invalid_argument(format!("invalid class id <{text}>")))
    }
}

impl From<ClassId> for Variant {
    fn from(value: ClassId) -> Self {
        Self::String(value.to_string())
    }
}

/// Runtime identifier unique to one created object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw identifier.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:016X}", self.0)
    }
}

impl From<ObjectId> for Variant {
    fn from(value: ObjectId) -> Self {
        Self::String(value.to_string())
    }
}

/// Capabilities an object declares when it is constructed.
#[derive(Clone, Default)]
pub struct InterfaceSet {
    processor: Option<Arc<dyn CommandProcessor>>,
    service: Option<Arc<dyn Service>>,
    callable: Option<Arc<dyn Callable>>,
    registry: Option<Arc<dyn ServiceRegistry>>,
}

impl InterfaceSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the command processor capability.
    #[must_use]
    pub fn with_processor(mut self, processor: Arc<dyn CommandProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Declares the service lifecycle capability.
    #[must_use]
    pub fn with_service(mut self, service: Arc<dyn Service>) -> Self {
        self.service = Some(service);
        self
    }

    /// Declares the bound-command capability.
    #[must_use]
    pub fn with_callable(mut self, callable: Arc<dyn Callable>) -> Self {
        self.callable = Some(callable);
        self
    }

    /// Declares the service registry capability.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    fn names(&self) -> Vec<&'static str> {
        [
            self.processor.as_ref().map(|_| <dyn CommandProcessor as Interface>::NAME),
            self.service.as_ref().map(|_| <dyn Service as Interface>::NAME),
            self.callable.as_ref().map(|_| <dyn Callable as Interface>::NAME),
            self.registry.as_ref().map(|_| <dyn ServiceRegistry as Interface>::NAME),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl fmt::Debug for InterfaceSet {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.names()).finish()
    }
}

/// A capability that can be looked up in an [`InterfaceSet`].
pub trait Interface: Send + Sync + 'static {
    /// Name used in diagnostics.
    const NAME: &'static str;

    /// Returns the capability when the set declares it.
    fn lookup(set: &InterfaceSet) -> Option<Arc<Self>>;
}

impl Interface for dyn CommandProcessor {
    const NAME: &'static str = "CommandProcessor";

    fn lookup(set: &InterfaceSet) -> Option<Arc<Self>> {
        set.processor.clone()
    }
}

impl Interface for dyn Service {
    const NAME: &'static str = "Service";

    fn lookup(set: &InterfaceSet) -> Option<Arc<Self>> {
        set.service.clone()
    }
}

impl Interface for dyn Callable {
    const NAME: &'static str = "Callable";

    fn lookup(set: &InterfaceSet) -> Option<Arc<Self>> {
        set.callable.clone()
    }
}

impl Interface for dyn ServiceRegistry {
    const NAME: &'static str = "ServiceRegistry";

    fn lookup(set: &InterfaceSet) -> Option<Arc<Self>> {
        set.registry.clone()
    }
}

struct ObjectCell {
    class_id: ClassId,
    object_id: ObjectId,
    interfaces: InterfaceSet,
    _tracker: InstanceTracker,
}

/// Shared reference to a created object.
///
/// Clones share the object. The instance counter of its class is released
/// when the last clone is dropped.
#[derive(Clone)]
pub struct ObjectHandle(Arc<ObjectCell>);

impl ObjectHandle {
    pub(crate) fn new(
        class_id: ClassId,
        object_id: ObjectId,
        interfaces: InterfaceSet,
        tracker: InstanceTracker,
    ) -> Self {
        Self(Arc::new(ObjectCell {
            class_id,
            object_id,
            interfaces,
            _tracker: tracker,
        }))
    }

    /// Class the object was created from.
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.0.class_id
    }

    /// Unique runtime id of the object.
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.0.object_id
    }

    /// Returns the capability `I`, failing with `TypeError` when absent.
    pub fn query_interface<I>(&self) -> Result<Arc<I>>
    where
        I: Interface + ?Sized,
    {
        self.query_interface_safe::<I>().ok_or_else(|| {
            CoreError::type_error(format!(
                "object {} of class {} does not implement {}",
                self.object_id(),
                self.class_id(),
                I::NAME
            ))
        })
    }

    /// Returns the capability `I` when the object declares it.
    #[must_use]
    pub fn query_interface_safe<I>(&self) -> Option<Arc<I>>
    where
        I: Interface + ?Sized,
    {
        I::lookup(&self.0.interfaces)
    }
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ObjectHandle")
            .field("class_id", &self.0.class_id)
            .field("object_id", &self.0.object_id)
            .field("interfaces", &self.0.interfaces)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::ErrorKind;

    #[rstest]
    #[case(Variant::from(0x10), 0x10)]
    #[case(Variant::from("B5000001"), 0xB500_0001)]
    #[case(Variant::from("0xb5000001"), 0xB500_0001)]
    fn class_ids_parse_from_integers_and_hex(#[case] value: Variant, #[case] expected: u32) {
        let class_id = ClassId::from_variant(&value).expect("class id parses");
        assert_eq!(class_id.value(), expected);
    }

    #[rstest]
    #[case(Variant::from("not-hex"))]
    #[case(Variant::from(-1))]
    #[case(Variant::from(true))]
    fn malformed_class_ids_are_invalid_arguments(#[case] value: Variant) {
        let error = ClassId::from_variant(&value).expect_err("class id rejected");
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn class_ids_render_as_fixed_width_hex() {
        assert_eq!(ClassId::new(0xAB).to_string(), "000000AB");
    }
}
