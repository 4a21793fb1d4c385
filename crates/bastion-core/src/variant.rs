//! Dynamically typed values stored in the catalog and passed to commands.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Number, Value};

use crate::error::{CoreError, Result};
use crate::object::ObjectHandle;

/// Ordered string-keyed map of values.
pub type Dictionary = BTreeMap<String, Variant>;

/// Ordered list of values.
pub type Sequence = Vec<Variant>;

const OBJECT_CLASS_KEY: &str = "$$clsid";
const OBJECT_ID_KEY: &str = "$$objid";
const OBJECT_WARNING_KEY: &str = "$$warning";
const OBJECT_WARNING: &str = "live object reference, not transferable";

/// Value held by the catalog, configuration dictionaries and command params.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Variant {
    /// Absent value.
    #[default]
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// UTF-8 text.
    String(String),
    /// Ordered list.
    Sequence(Sequence),
    /// Ordered map.
    Dictionary(Dictionary),
    /// Reference to a live object.
    Object(ObjectHandle),
}

impl Variant {
    /// Returns true for [`Variant::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Boolean payload, if any.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Integer payload, if any.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// String payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Sequence payload, if any.
    #[must_use]
    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Dictionary payload, if any.
    #[must_use]
    pub const fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Self::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Object payload, if any.
    #[must_use]
    pub const fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Self::Object(handle) => Some(handle),
            _ => None,
        }
    }

    /// Looks up `key` when the value is a dictionary.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_dictionary().and_then(|dict| dict.get(key))
    }

    /// Short name of the value's type, used in diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::String(_) => "string",
            Self::Sequence(_) => "sequence",
            Self::Dictionary(_) => "dictionary",
            Self::Object(_) => "object",
        }
    }

    /// Converts a JSON document into a variant.
    ///
    /// Floating point numbers and integers beyond the signed 64-bit range
    /// are rejected with a type error.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(flag) => Ok(Self::Bool(flag)),
            Value::Number(number) => number.as_i64().map(Self::Integer).ok_or_else(|| {
                CoreError::type_error(format!("number <{number}> is not a signed integer"))
            }),
            Value::String(text) => Ok(Self::String(text)),
            Value::Array(items) => items
                .into_iter()
                .map(Self::from_json)
                .collect::<Result<Sequence>>()
                .map(Self::Sequence),
            Value::Object(map) => map
                .into_iter()
                .map(|(key, item)| Self::from_json(item).map(|converted| (key, converted)))
                .collect::<Result<Dictionary>>()
                .map(Self::Dictionary),
        }
    }

    /// Parses JSON text into a variant.
    pub fn parse_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(|error| {
            CoreError::new(
                crate::ErrorKind::InvalidFormat,
                format!("invalid JSON: {error}"),
            )
        })?;
        Self::from_json(value)
    }

    /// Converts the variant into a JSON document.
    ///
    /// Live objects cannot cross a process boundary, so they are rendered as
    /// a descriptive dictionary instead.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Integer(number) => Value::Number(Number::from(*number)),
            Self::String(text) => Value::String(text.clone()),
            Self::Sequence(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Dictionary(dict) => Value::Object(
                dict.iter()
                    .map(|(key, item)| (key.clone(), item.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
            Self::Object(handle) => {
                let mut map = Map::new();
                map.insert(
                    OBJECT_CLASS_KEY.into(),
                    Value::String(handle.class_id().to_string()),
                );
                map.insert(
                    OBJECT_ID_KEY.into(),
                    Value::String(handle.object_id().to_string()),
                );
                map.insert(
                    OBJECT_WARNING_KEY.into(),
                    Value::String(OBJECT_WARNING.into()),
                );
                Value::Object(map)
            }
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.to_json())
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Variant {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u16> for Variant {
    fn from(value: u16) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Sequence> for Variant {
    fn from(value: Sequence) -> Self {
        Self::Sequence(value)
    }
}

impl From<Dictionary> for Variant {
    fn from(value: Dictionary) -> Self {
        Self::Dictionary(value)
    }
}

impl From<ObjectHandle> for Variant {
    fn from(value: ObjectHandle) -> Self {
        Self::Object(value)
    }
}

impl<T> From<Option<T>> for Variant
where
    T: Into<Self>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
