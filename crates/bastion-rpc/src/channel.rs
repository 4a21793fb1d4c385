//! Encrypted JSON-RPC calls.
//!
//! An encrypted call is sent as the method [`ENCRYPTED_METHOD`] with params
//! `{"encrypted": <base64>}`. The base64 text is a 12-byte nonce followed by
//! the AES-256-GCM ciphertext of `{"command", "params"}`. The result and the
//! error details of such a call travel back in the same envelope. Both ends
//! derive the key from a shared secret with SHA-256.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bastion_core::{CoreError, Dictionary, ErrorKind, Result};
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

use crate::config::optional_string;

/// Method name carrying an encrypted call.
pub(crate) const ENCRYPTED_METHOD: &str = "encrypted";

const ENVELOPE_KEY: &str = "encrypted";
const COMMAND_KEY: &str = "command";
const PARAMS_KEY: &str = "params";
const SUPPORTED_ENCRYPTION: &str = "aes";

/// Which kinds of calls an endpoint sends or accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ChannelMode {
    Plain,
    Encrypted,
    Both,
}

impl ChannelMode {
    const fn accepts(self, call: Self) -> bool {
        matches!(
            (self, call),
            (Self::Both, _) | (Self::Plain, Self::Plain) | (Self::Encrypted, Self::Encrypted)
        )
    }
}

/// Channel settings of one server or client. A cipher is present whenever
/// the mode admits encrypted calls.
#[derive(Debug, Clone)]
pub(crate) struct Channel {
    mode: ChannelMode,
    cipher: Option<Arc<ChannelCipher>>,
}

impl Channel {
    pub(crate) const fn plain() -> Self {
        Self {
            mode: ChannelMode::Plain,
            cipher: None,
        }
    }

    /// Reads `channelMode`, `encryption` and `key`.
    ///
    /// A missing `channelMode` means plain. Clients send one kind of call,
    /// so `both` is accepted only when `allow_both` is set.
    pub(crate) fn from_config(config: &Dictionary, allow_both: bool) -> Result<Self> {
        let mode = optional_string(config, "channelMode")?.map_or(
            Ok(ChannelMode::Plain),
            |text| {
                text.parse::<ChannelMode>()
                    .ok()
                    .filter(|mode| allow_both || *mode != ChannelMode::Both)
                    .ok_or_else(|| {
                        CoreError::invalid_argument(format!("invalid channel mode <{text}>"))
                    })
            },
        )?;
        if mode == ChannelMode::Plain {
            return Ok(Self::plain());
        }
        match optional_string(config, "encryption")?.as_deref() {
            None | Some("") => {
                return Err(CoreError::invalid_argument(
                    "field <encryption> is missing or empty",
                ));
            }
            Some(SUPPORTED_ENCRYPTION) => {}
            Some(other) => {
                return Err(CoreError::invalid_argument(format!(
                    "unsupported encryption method <{other}>"
                )));
            }
        }
        let secret = optional_string(config, "key")?
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| CoreError::invalid_argument("field <key> is missing or empty"))?;
        Ok(Self {
            mode,
            cipher: Some(Arc::new(ChannelCipher::new(&secret)?)),
        })
    }

    pub(crate) const fn mode(&self) -> ChannelMode {
        self.mode
    }

    pub(crate) fn cipher(&self) -> Option<&ChannelCipher> {
        self.cipher.as_deref()
    }

    pub(crate) const fn accepts(&self, call: ChannelMode) -> bool {
        self.mode.accepts(call)
    }
}

/// AES-256-GCM sealing of JSON values.
pub(crate) struct ChannelCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl fmt::Debug for ChannelCipher {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ChannelCipher")
            .field("algorithm", &"aes-256-gcm")
            .finish_non_exhaustive()
    }
}

impl ChannelCipher {
    fn new(secret: &str) -> Result<Self> {
        let digest = Sha256::digest(secret.as_bytes());
        let key = UnboundKey::new(&AES_256_GCM, digest.as_slice())
            .map_err(|_| CoreError::invalid_argument("cannot derive the channel key"))?;
        Ok(Self {
            key: LessSafeKey::new(key),
            rng: SystemRandom::new(),
        })
    }

    /// Wraps `value` in an envelope. `null` stays `null`.
    pub(crate) fn seal(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let mut sealed = serde_json::to_vec(value)
            .map_err(|error| CoreError::runtime(format!("cannot serialise sealed data: {error}")))?;
        let mut nonce = [0_u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| CoreError::runtime("cannot generate a nonce"))?;
        self.key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut sealed)
            .map_err(|_| CoreError::runtime("cannot encrypt channel data"))?;
        let mut framed = nonce.to_vec();
        framed.extend_from_slice(&sealed);
        Ok(json!({ ENVELOPE_KEY: STANDARD.encode(framed) }))
    }

    /// Unwraps an envelope produced by [`Self::seal`] with the same secret.
    pub(crate) fn open(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let encoded = value
            .get(ENVELOPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_format("data is not encrypted"))?;
        let mut framed = STANDARD
            .decode(encoded)
            .map_err(|error| invalid_format(&format!("envelope is not base64: {error}")))?;
        if framed.len() < NONCE_LEN {
            return Err(invalid_format("envelope is shorter than its nonce"));
        }
        let mut sealed = framed.split_off(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(&framed)
            .map_err(|_| invalid_format("envelope nonce is malformed"))?;
        let plain = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut sealed)
            .map_err(|_| invalid_format("cannot decrypt channel data"))?;
        serde_json::from_slice(plain)
            .map_err(|error| invalid_format(&format!("decrypted data is not JSON: {error}")))
    }

    pub(crate) fn seal_call(&self, command: &str, params: Value) -> Result<Value> {
        self.seal(&json!({ COMMAND_KEY: command, PARAMS_KEY: params }))
    }

    /// Returns the command and params of an encrypted call.
    pub(crate) fn open_call(&self, params: &Value) -> Result<(String, Value)> {
        let call = self.open(params)?;
        let command = call
            .get(COMMAND_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::invalid_argument("encrypted call has no <command> field"))?
            .to_owned();
        let inner = call.get(PARAMS_KEY).cloned().unwrap_or(Value::Null);
        if !matches!(inner, Value::Object(_) | Value::Array(_) | Value::Null) {
            return Err(CoreError::invalid_argument(
                "encrypted params must be an object or an array",
            ));
        }
        Ok((command, inner))
    }
}

fn invalid_format(message: &str) -> CoreError {
    CoreError::new(ErrorKind::InvalidFormat, message)
}
