//! Output formats understood by the daemon's log subscriber.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How `bastiond` renders log lines on standard error.
///
/// Parsed case-insensitively from the `log_format` key, the
/// `BASTION_LOG_FORMAT` variable or `--log-format`.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event with fields flattened.
    #[default]
    Json,
    /// Single human-readable line per event.
    Compact,
}

/// Rejection returned when a format name is not recognised.
pub type LogFormatParseError = strum::ParseError;
