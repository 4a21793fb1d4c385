//! Error taxonomy shared by every component of the agent core.
//!
//! Every failure is a [`CoreError`]: a numeric [`ErrorKind`], a formatted
//! message, and the source location that raised it. Errors convert to and
//! from a [`Variant`] dictionary so that a failure raised behind a JSON-RPC
//! endpoint can be rebuilt with the same kind on the calling side.

use std::fmt;
use std::panic::Location;

use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use thiserror::Error;

use crate::variant::{Dictionary, Variant};

const ERR_CODE_KEY: &str = "errCode";
const KIND_KEY: &str = "kind";
const DESCRIPTION_KEY: &str = "description";
const SOURCE_FILE_KEY: &str = "sourceFile";
const SOURCE_LINE_KEY: &str = "sourceLine";

const LOGIC_ERROR_CLASS: u32 = 0xE001_0000;
const RUNTIME_ERROR_CLASS: u32 = 0xE002_0000;
const ERROR_CLASS_MASK: u32 = 0xFFFF_0000;

/// Result alias used throughout the core.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Kinds of failure, each carrying a stable numeric code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum ErrorKind {
    /// Generic programming error.
    LogicError,
    /// An argument or configuration value was missing or malformed.
    InvalidArgument,
    /// An API was called in a state that does not permit it.
    InvalidUsage,
    /// An index or size fell outside the permitted range.
    OutOfRange,
    /// A value had the wrong type.
    TypeError,
    /// Generic runtime failure.
    RuntimeError,
    /// Access to a resource was refused.
    AccessDenied,
    /// Arithmetic overflow or similar.
    ArithmeticError,
    /// A file is locked by another owner.
    FileLocked,
    /// A resource could not be found.
    NotFound,
    /// Input data was not in the expected format.
    InvalidFormat,
    /// A configured limit was exceeded.
    LimitExceeded,
    /// A stream ended before the requested amount of data was read.
    NoData,
    /// Text could not be converted between encodings.
    StringEncodingError,
    /// A processor does not recognise the requested command.
    OperationNotSupported,
    /// A network peer could not be reached.
    ConnectionError,
    /// Memory allocation failed.
    BadAlloc,
    /// A worker pool was stopped while work was pending.
    PoolThreadStopped,
    /// A request was declined by its handler.
    OperationDeclined,
    /// The item being created already exists.
    AlreadyExists,
    /// The component is shutting down.
    ShutdownIsStarted,
    /// The operation was cancelled.
    OperationCancelled,
    /// Operating system failure.
    SystemError,
}

impl ErrorKind {
    /// Numeric code of the kind.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::LogicError => LOGIC_ERROR_CLASS,
            Self::InvalidArgument => 0xE001_0001,
            Self::InvalidUsage => 0xE001_0002,
            Self::OutOfRange => 0xE001_0003,
            Self::TypeError => 0xE001_0004,
            Self::RuntimeError => RUNTIME_ERROR_CLASS,
            Self::AccessDenied => 0xE002_0001,
            Self::ArithmeticError => 0xE002_0002,
            Self::FileLocked => 0xE002_0003,
            Self::NotFound => 0xE002_0004,
            Self::InvalidFormat => 0xE002_0005,
            Self::LimitExceeded => 0xE002_0006,
            Self::NoData => 0xE002_0007,
            Self::StringEncodingError => 0xE002_0008,
            Self::OperationNotSupported => 0xE002_0009,
            Self::ConnectionError => 0xE002_000A,
            Self::BadAlloc => 0xE002_000B,
            Self::PoolThreadStopped => 0xE002_000C,
            Self::OperationDeclined => 0xE002_000D,
            Self::AlreadyExists => 0xE002_000E,
            Self::ShutdownIsStarted => 0xE002_000F,
            Self::OperationCancelled => 0xE002_0010,
            Self::SystemError => 0xE003_0000,
        }
    }

    /// Maps a numeric code back to its kind.
    ///
    /// Unknown codes inside the logic or runtime ranges fall back to the
    /// generic kind of that range.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::iter().find(|kind| kind.code() == code).or(match code & ERROR_CLASS_MASK {
            LOGIC_ERROR_CLASS => Some(Self::LogicError),
            RUNTIME_ERROR_CLASS => Some(Self::RuntimeError),
            _ => None,
        })
    }

    /// Returns true for kinds describing programming errors.
    #[must_use]
    pub const fn is_logic_error(self) -> bool {
        self.code() & ERROR_CLASS_MASK == LOGIC_ERROR_CLASS
    }
}

/// Source position that raised an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    file: String,
    line: u32,
}

impl SourceLocation {
    /// Builds a location from its parts.
    #[must_use]
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Source file path.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Line number within [`Self::file`].
    #[must_use]
    pub const fn line(&self) -> u32 {
        self.line
    }
}

impl From<&Location<'_>> for SourceLocation {
    fn from(location: &Location<'_>) -> Self {
        Self::new(location.file(), location.line())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.file, self.line)
    }
}

/// Typed failure raised by core components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CoreError {
    kind: ErrorKind,
    message: String,
    location: Option<SourceLocation>,
}

impl CoreError {
    /// Builds an error of `kind`, recording the caller's location.
    #[track_caller]
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: Some(SourceLocation::from(Location::caller())),
        }
    }

    /// Builds an [`ErrorKind::InvalidArgument`] error.
    #[track_caller]
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Builds an [`ErrorKind::InvalidUsage`] error.
    #[track_caller]
    #[must_use]
    pub fn invalid_usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidUsage, message)
    }

    /// Builds an [`ErrorKind::OutOfRange`] error.
    #[track_caller]
    #[must_use]
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfRange, message)
    }

    /// Builds an [`ErrorKind::TypeError`] error.
    #[track_caller]
    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// Builds an [`ErrorKind::RuntimeError`] error.
    #[track_caller]
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeError, message)
    }

    /// Builds an [`ErrorKind::NoData`] error.
    #[track_caller]
    #[must_use]
    pub fn no_data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoData, message)
    }

    /// Builds an [`ErrorKind::StringEncodingError`] error.
    #[track_caller]
    #[must_use]
    pub fn string_encoding(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StringEncodingError, message)
    }

    /// Builds an [`ErrorKind::OperationNotSupported`] error naming `command`.
    #[track_caller]
    #[must_use]
    pub fn operation_not_supported(command: &str) -> Self {
        Self::new(
            ErrorKind::OperationNotSupported,
            format!("unsupported command <{command}>"),
        )
    }

    /// Builds an [`ErrorKind::ConnectionError`] error.
    #[track_caller]
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionError, message)
    }

    /// Builds an [`ErrorKind::AlreadyExists`] error.
    #[track_caller]
    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    /// Builds an [`ErrorKind::ShutdownIsStarted`] error.
    #[track_caller]
    #[must_use]
    pub fn shutdown_is_started(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ShutdownIsStarted, message)
    }

    /// Kind of the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Formatted description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Location that raised the error, when known.
    #[must_use]
    pub const fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    /// Prefixes the message with `context`, keeping kind and location.
    #[must_use]
    pub fn with_context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }

    /// Serialises the error into a dictionary.
    #[must_use]
    pub fn to_variant(&self) -> Variant {
        let mut dict = Dictionary::new();
        dict.insert(ERR_CODE_KEY.into(), Variant::from(self.kind.code()));
        dict.insert(
            KIND_KEY.into(),
            Variant::from(<&'static str>::from(self.kind)),
        );
        dict.insert(DESCRIPTION_KEY.into(), Variant::from(self.message.as_str()));
        if let Some(location) = &self.location {
            dict.insert(SOURCE_FILE_KEY.into(), Variant::from(location.file()));
            dict.insert(SOURCE_LINE_KEY.into(), Variant::from(location.line()));
        }
        Variant::Dictionary(dict)
    }

    /// Rebuilds an error serialised by [`Self::to_variant`].
    ///
    /// Returns `None` when `value` carries no recognisable error code.
    #[must_use]
    pub fn from_variant(value: &Variant) -> Option<Self> {
        let dict = value.as_dictionary()?;
        let code = dict.get(ERR_CODE_KEY)?.as_integer()?;
        let kind = u32::try_from(code).ok().and_then(ErrorKind::from_code)?;
        let message = dict
            .get(DESCRIPTION_KEY)
            .and_then(Variant::as_str)
            .unwrap_or_default()
            .to_owned();
        let file = dict.get(SOURCE_FILE_KEY).and_then(Variant::as_str);
        let line = dict
            .get(SOURCE_LINE_KEY)
            .and_then(Variant::as_integer)
            .and_then(|line| u32::try_from(line).ok());
        let location = file.map(|file| SourceLocation::new(file, line.unwrap_or_default()));
        Some(Self {
            kind,
            message,
            location,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ErrorKind::InvalidArgument, 0xE001_0001)]
    #[case(ErrorKind::TypeError, 0xE001_0004)]
    #[case(ErrorKind::NoData, 0xE002_0007)]
    #[case(ErrorKind::StringEncodingError, 0xE002_0008)]
    #[case(ErrorKind::OperationNotSupported, 0xE002_0009)]
    #[case(ErrorKind::SystemError, 0xE003_0000)]
    fn kinds_map_to_stable_codes(#[case] kind: ErrorKind, #[case] code: u32) {
        assert_eq!(kind.code(), code);
        assert_eq!(ErrorKind::from_code(code), Some(kind));
    }

    #[test]
    fn unknown_codes_fall_back_to_their_range() {
        assert_eq!(ErrorKind::from_code(0xE001_00FF), Some(ErrorKind::LogicError));
        assert_eq!(ErrorKind::from_code(0xE002_00FF), Some(ErrorKind::RuntimeError));
        assert_eq!(ErrorKind::from_code(0x1234), None);
    }

    #[test]
    fn records_caller_location() {
        let error = CoreError::invalid_argument("bad");
        let location = error.location().expect("location should be recorded");
        assert!(location.file().ends_with("error.rs"));
        assert!(location.line() > 0);
    }

    #[test]
    fn survives_variant_serialisation() {
        let error = CoreError::operation_not_supported("does_not_exist");
        let rebuilt = CoreError::from_variant(&error.to_variant()).expect("error should rebuild");
        assert_eq!(rebuilt, error);
        assert!(rebuilt.message().contains("does_not_exist"));
    }

    #[test]
    fn context_prefixes_message_and_keeps_kind() {
        let error = CoreError::no_data("stream is empty").with_context("hashing failed");
        assert_eq!(error.kind(), ErrorKind::NoData);
        assert_eq!(error.message(), "hashing failed: stream is empty");
        assert_eq!(error.to_string(), "NoData: hashing failed: stream is empty");
    }

    #[test]
    fn rejects_dictionaries_without_codes() {
        assert!(CoreError::from_variant(&Variant::from("plain")).is_none());
    }
}
