//! Test doubles shared across the behavioural suites.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    ClassId, CommandProcessor, ConstructScope, Context, CoreError, Dictionary, InterfaceSet,
    ObjectClass, Result, Service, Variant, register_classes,
};

pub const CLSID_EXAMPLE_SERVICE: ClassId = ClassId::new(0xB5FF_0001);
pub const CLSID_ECHO: ClassId = ClassId::new(0xB5FF_0002);

const DEFAULT_INFO_PATH: &str = "info.example";

/// Service that records every lifecycle call in the catalog under its
/// `infoPath`.
pub struct ExampleService {
    context: Context,
    info_path: String,
    counter: Mutex<i64>,
}

impl ExampleService {
    fn record(&self, key: &str, value: impl Into<Variant>) -> Result<()> {
        self.context
            .catalog()
            .put(&format!("{}.{key}", self.info_path), value)
    }
}

impl Service for ExampleService {
    fn load_state(&self, state: &Variant) -> Result<()> {
        if let Some(counter) = state.get("counter").and_then(Variant::as_integer) {
            *self.counter.lock() = counter;
        }
        Ok(())
    }

    fn save_state(&self) -> Result<Variant> {
        let mut state = Dictionary::new();
        state.insert("counter".into(), Variant::from(*self.counter.lock()));
        Ok(Variant::Dictionary(state))
    }

    fn start(&self) -> Result<()> {
        *self.counter.lock() += 1;
        self.record("start", true)
    }

    fn stop(&self) -> Result<()> {
        self.record("stop", true)
    }

    fn shutdown(&self) -> Result<()> {
        self.record("shutdown", true)
    }
}

impl CommandProcessor for ExampleService {
    fn execute(&self, command: &str, params: &Variant) -> Result<Variant> {
        match command {
            "echo" => Ok(params.clone()),
            "counter" => Ok(Variant::from(*self.counter.lock())),
            other => Err(CoreError::operation_not_supported(other)),
        }
    }
}

impl ObjectClass for ExampleService {
    const CLASS_ID: ClassId = CLSID_EXAMPLE_SERVICE;
    const IS_SERVICE: bool = true;

    fn final_construct(scope: &ConstructScope<'_>, config: &Dictionary) -> Result<Self> {
        let info_path = match config.get("infoPath") {
            None => DEFAULT_INFO_PATH.to_owned(),
            Some(Variant::String(path)) => path.clone(),
            Some(other) => {
                return Err(CoreError::type_error(format!(
                    "<infoPath> must be a string, not a {} value",
                    other.type_name()
                )));
            }
        };
        let service = Self {
            context: scope.context().clone(),
            info_path,
            counter: Mutex::new(0),
        };
        service.record("finalConstruct", true)?;
        service.record("id", scope.object_id())?;
        let keys = config.keys().map(|key| Variant::from(key.as_str())).collect();
        service.record("configKeys", Variant::Sequence(keys))?;
        Ok(service)
    }

    fn interfaces(self: Arc<Self>) -> InterfaceSet {
        InterfaceSet::new()
            .with_processor(Arc::clone(&self) as Arc<dyn CommandProcessor>)
            .with_service(self)
    }
}

/// Plain processor that returns its params for `echo`.
pub struct Echo;

impl CommandProcessor for Echo {
    fn execute(&self, command: &str, params: &Variant) -> Result<Variant> {
        match command {
            "echo" => Ok(params.clone()),
            other => Err(CoreError::operation_not_supported(other)),
        }
    }
}

impl ObjectClass for Echo {
    const CLASS_ID: ClassId = CLSID_ECHO;

    fn final_construct(_scope: &ConstructScope<'_>, _config: &Dictionary) -> Result<Self> {
        Ok(Self)
    }

    fn interfaces(self: Arc<Self>) -> InterfaceSet {
        InterfaceSet::new().with_processor(self)
    }
}

/// Context with the core classes and both doubles registered.
pub fn test_context() -> Context {
    let context = Context::new();
    register_classes(context.objects()).expect("core classes register");
    context
        .objects()
        .register::<ExampleService>()
        .expect("example service registers");
    context.objects().register::<Echo>().expect("echo registers");
    context
}

/// Converts a JSON literal into a variant.
pub fn variant(value: Value) -> Variant {
    Variant::from_json(value).expect("fixture converts")
}

/// Stores `objects` as the service declarations of `context`.
pub fn declare_services(context: &Context, objects: Value) {
    context
        .catalog()
        .put("app.config.objects", variant(objects))
        .expect("declarations stored");
}

/// Reads a boolean side effect, treating absence as `false`.
pub fn flag(context: &Context, path: &str) -> bool {
    context
        .catalog()
        .get_or(path, Variant::Null)
        .expect("path parses")
        .as_bool()
        .unwrap_or(false)
}
