//! Validation of server and client configuration dictionaries.

use std::time::Duration;

use bastion_core::{CoreError, Dictionary, Result, Variant};

pub(crate) const DEFAULT_HOST: &str = "127.0.0.1";
pub(crate) const DEFAULT_MAX_CONNECTIONS: usize = 8;
pub(crate) const DEFAULT_TIMEOUT_SECS: i64 = 10;

/// Reads a TCP port; zero is accepted only for listeners.
pub(crate) fn required_port(config: &Dictionary, key: &str, allow_zero: bool) -> Result<u16> {
    let raw = match config.get(key) {
        None | Some(Variant::Null) => {
            return Err(CoreError::invalid_argument(format!(
                "configuration has no <{key}> field"
            )));
        }
        Some(Variant::Integer(raw)) => *raw,
        Some(other) => {
            return Err(CoreError::type_error(format!(
                "<{key}> must be an integer, not a {} value",
                other.type_name()
            )));
        }
    };
    match u16::try_from(raw) {
        Ok(0) if !allow_zero => Err(CoreError::invalid_argument(format!(
            "<{key}> must not be zero"
        ))),
        Ok(port) => Ok(port),
        Err(_) => Err(CoreError::invalid_argument(format!(
            "<{key}> value {raw} is not a TCP port"
        ))),
    }
}

/// Reads a non-empty string that has no default.
pub(crate) fn required_string(config: &Dictionary, key: &str) -> Result<String> {
    match optional_string(config, key)? {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(CoreError::invalid_argument(format!(
            "configuration has no <{key}> field"
        ))),
    }
}

pub(crate) fn optional_string(config: &Dictionary, key: &str) -> Result<Option<String>> {
    match config.get(key) {
        None | Some(Variant::Null) => Ok(None),
        Some(Variant::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(CoreError::type_error(format!(
            "<{key}> must be a string, not a {} value",
            other.type_name()
        ))),
    }
}

pub(crate) fn optional_positive(config: &Dictionary, key: &str) -> Result<Option<usize>> {
    match config.get(key) {
        None | Some(Variant::Null) => Ok(None),
        Some(Variant::Integer(raw)) => usize::try_from(*raw)
            .ok()
            .filter(|value| *value > 0)
            .map(Some)
            .ok_or_else(|| {
                CoreError::invalid_argument(format!("<{key}> must be positive, got {raw}"))
            }),
        Some(other) => Err(CoreError::type_error(format!(
            "<{key}> must be an integer, not a {} value",
            other.type_name()
        ))),
    }
}

/// Reads a timeout in seconds. `-1` means no limit and yields `None`.
pub(crate) fn optional_timeout(config: &Dictionary, key: &str) -> Result<Option<Duration>> {
    let seconds = match config.get(key) {
        None | Some(Variant::Null) => DEFAULT_TIMEOUT_SECS,
        Some(Variant::Integer(raw)) => *raw,
        Some(other) => {
            return Err(CoreError::type_error(format!(
                "<{key}> must be an integer number of seconds, not a {} value",
                other.type_name()
            )));
        }
    };
    if seconds == -1 {
        return Ok(None);
    }
    u64::try_from(seconds)
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|_| {
            CoreError::invalid_argument(format!("<{key}> must be -1 or non-negative, got {seconds}"))
        })
}
