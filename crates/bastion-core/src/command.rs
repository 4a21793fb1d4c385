//! Command dispatch: processors, and commands bound to a processor.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::factory::{ConstructScope, ObjectClass};
use crate::object::{ClassId, InterfaceSet};
use crate::variant::{Dictionary, Variant};

/// Class id of [`Command`] objects.
pub const CLSID_COMMAND: ClassId = ClassId::new(0xB500_0002);

const PROCESSOR_KEY: &str = "processor";
const COMMAND_KEY: &str = "command";
const PARAMS_KEY: &str = "params";

/// Anything that executes named commands.
///
/// Unknown commands must fail with `OperationNotSupported`.
pub trait CommandProcessor: Send + Sync {
    /// Executes `command` with `params` and returns its result.
    fn execute(&self, command: &str, params: &Variant) -> Result<Variant>;
}

/// A command already bound to its processor and default parameters.
pub trait Callable: Send + Sync {
    /// Dispatches the command once, merging `params` over the defaults.
    fn call(&self, params: &Variant) -> Result<Variant>;
}

/// Resolves a processor from a target description.
///
/// The target may be a live object, a name looked up with
/// [`Context::resolve_object`], or a descriptor dictionary that creates a new
/// object such as a JSON-RPC client.
///
/// # Errors
///
/// Fails with `InvalidArgument` for any other shape and with `TypeError`
/// when the object found does not process commands.
pub fn resolve_processor(context: &Context, target: &Variant) -> Result<Arc<dyn CommandProcessor>> {
    let handle = match target {
        Variant::Object(handle) => handle.clone(),
        Variant::String(name) => context.resolve_object(name)?,
        Variant::Dictionary(_) => context.create_object_from(target)?,
        other => {
            return Err(CoreError::invalid_argument(format!(
                "command processor must be an object, a name or a descriptor, not a {} value",
                other.type_name()
            )));
        }
    };
    handle.query_interface::<dyn CommandProcessor>()
}

/// Command name and default parameters bound to a processor.
#[derive(Clone)]
pub struct Command {
    processor: Arc<dyn CommandProcessor>,
    command: String,
    defaults: Variant,
}

impl fmt::Debug for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Command")
            .field("command", &self.command)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Command {
    /// Binds `command` to the processor described by `target`.
    pub fn new(
        context: &Context,
        target: &Variant,
        command: impl Into<String>,
        defaults: Variant,
    ) -> Result<Self> {
        let processor = resolve_processor(context, target)?;
        Ok(Self::with_processor(processor, command, defaults))
    }

    /// Binds `command` to an already resolved processor.
    #[must_use]
    pub fn with_processor(
        processor: Arc<dyn CommandProcessor>,
        command: impl Into<String>,
        defaults: Variant,
    ) -> Self {
        Self {
            processor,
            command: command.into(),
            defaults,
        }
    }

    /// Bound command name.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Performs one dispatch.
    ///
    /// `Null` params use the defaults unchanged; dictionary params overlay
    /// the default dictionary, with the caller's keys winning. The stored
    /// defaults are never modified.
    pub fn execute(&self, params: &Variant) -> Result<Variant> {
        let merged = merge_params(&self.defaults, params);
        self.processor.execute(&self.command, &merged)
    }
}

impl Callable for Command {
    fn call(&self, params: &Variant) -> Result<Variant> {
        self.execute(params)
    }
}

impl ObjectClass for Command {
    const CLASS_ID: ClassId = CLSID_COMMAND;

    fn final_construct(scope: &ConstructScope<'_>, config: &Dictionary) -> Result<Self> {
        let target = config.get(PROCESSOR_KEY).ok_or_else(|| {
            CoreError::invalid_argument("command configuration has no <processor> field")
        })?;
        let command = config
            .get(COMMAND_KEY)
            .and_then(Variant::as_str)
            .ok_or_else(|| {
                CoreError::invalid_argument("command configuration has no <command> string")
            })?;
        let defaults = config.get(PARAMS_KEY).cloned().unwrap_or_default();
        Self::new(scope.context(), target, command, defaults)
    }

    fn interfaces(self: Arc<Self>) -> InterfaceSet {
        InterfaceSet::new().with_callable(self)
    }
}

fn merge_params(defaults: &Variant, params: &Variant) -> Variant {
    match (defaults, params) {
        (_, Variant::Null) => defaults.clone(),
        (Variant::Dictionary(base), Variant::Dictionary(overlay)) => {
            let mut merged = base.clone();
            merged.extend(overlay.iter().map(|(key, value)| (key.clone(), value.clone())));
            Variant::Dictionary(merged)
        }
        _ => params.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn variant(value: serde_json::Value) -> Variant {
        Variant::from_json(value).expect("fixture converts")
    }

    #[test]
    fn null_params_use_defaults() {
        let defaults = variant(json!({"a": 1}));
        assert_eq!(merge_params(&defaults, &Variant::Null), defaults);
    }

    #[test]
    fn call_keys_override_defaults() {
        let defaults = variant(json!({"a": 1, "b": 2}));
        let merged = merge_params(&defaults, &variant(json!({"b": 3, "c": 4})));
        assert_eq!(merged, variant(json!({"a": 1, "b": 3, "c": 4})));
        assert_eq!(defaults, variant(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn non_dictionary_params_replace_defaults() {
        let defaults = variant(json!({"a": 1}));
        let params = variant(json!([1, 2]));
        assert_eq!(merge_params(&defaults, &params), params);
    }
}
