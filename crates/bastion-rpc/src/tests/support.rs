//! Shared fixtures for the end-to-end suites.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bastion_core::{
    ClassId, CommandProcessor, ConstructScope, Context, CoreError, Dictionary, InterfaceSet,
    ObjectClass, ObjectHandle, Result, Variant,
};
use serde_json::Value;

use crate::{CLSID_JSON_RPC_CLIENT, CLSID_JSON_RPC_SERVER, register_classes};

pub const CLSID_ECHO: ClassId = ClassId::new(0xB5FF_0002);

/// Echoes params back, counts notifications and builds large replies on
/// request.
pub struct Echo {
    pings: AtomicUsize,
}

impl CommandProcessor for Echo {
    fn execute(&self, command: &str, params: &Variant) -> Result<Variant> {
        match command {
            "echo" => Ok(params.clone()),
            "ping" => {
                self.pings.fetch_add(1, Ordering::SeqCst);
                Ok(Variant::Null)
            }
            "pings" => Ok(Variant::from(
                i64::try_from(self.pings.load(Ordering::SeqCst)).unwrap_or(i64::MAX),
            )),
            "fail" => Err(CoreError::no_data("nothing to return")),
            "big" => {
                let size = params
                    .get("size")
                    .and_then(Variant::as_integer)
                    .and_then(|size| usize::try_from(size).ok())
                    .unwrap_or_default();
                Ok(Variant::from("x".repeat(size)))
            }
            other => Err(CoreError::operation_not_supported(other)),
        }
    }
}

impl ObjectClass for Echo {
    const CLASS_ID: ClassId = CLSID_ECHO;

    fn final_construct(_scope: &ConstructScope<'_>, _config: &Dictionary) -> Result<Self> {
        Ok(Self {
            pings: AtomicUsize::new(0),
        })
    }

    fn interfaces(self: Arc<Self>) -> InterfaceSet {
        InterfaceSet::new().with_processor(self)
    }
}

/// Context with the transport classes and the echo processor registered
/// under `objects.echo`.
pub fn echo_context() -> Context {
    let context = Context::new();
    bastion_core::register_classes(context.objects()).expect("core classes register");
    register_classes(context.objects()).expect("rpc classes register");
    context.objects().register::<Echo>().expect("echo registers");
    let echo = context
        .create_object(CLSID_ECHO, &Dictionary::new())
        .expect("echo created");
    context
        .catalog()
        .put("objects.echo", Variant::Object(echo))
        .expect("echo registered");
    context
}

pub fn variant(value: Value) -> Variant {
    Variant::from_json(value).expect("fixture converts")
}

pub fn dictionary(value: Value) -> Dictionary {
    match variant(value) {
        Variant::Dictionary(dict) => dict,
        other => panic!("expected a dictionary fixture, got {other}"),
    }
}

/// Running server plus the port it bound.
pub struct ServerFixture {
    pub handle: ObjectHandle,
    pub port: u16,
}

impl ServerFixture {
    pub fn processor(&self) -> Arc<dyn CommandProcessor> {
        self.handle
            .query_interface::<dyn CommandProcessor>()
            .expect("server processes commands")
    }

    pub fn stop(&self) {
        self.processor()
            .execute("stop", &Variant::Null)
            .expect("server stops");
    }
}

/// Starts a server for `objects.echo` on an ephemeral port.
pub fn start_echo_server(context: &Context) -> ServerFixture {
    start_server(context, serde_json::json!({"port": 0, "processor": "echo"}))
}

/// Creates and starts a server from `config`.
pub fn start_server(context: &Context, config: Value) -> ServerFixture {
    let handle = context
        .create_object(CLSID_JSON_RPC_SERVER, &dictionary(config))
        .expect("server created");
    let bound = handle
        .query_interface::<dyn CommandProcessor>()
        .expect("server processes commands")
        .execute("start", &Variant::Null)
        .expect("server starts");
    let port = bound
        .get("port")
        .and_then(Variant::as_integer)
        .and_then(|port| u16::try_from(port).ok())
        .expect("bound port reported");
    ServerFixture { handle, port }
}

/// Creates a client object for `port`.
pub fn client_for(context: &Context, port: u16) -> Arc<dyn CommandProcessor> {
    client_with(
        context,
        serde_json::json!({"host": "127.0.0.1", "port": port, "timeout": 5}),
    )
}

/// Creates a client object from `config`.
pub fn client_with(context: &Context, config: Value) -> Arc<dyn CommandProcessor> {
    context
        .create_object(CLSID_JSON_RPC_CLIENT, &dictionary(config))
        .expect("client created")
        .query_interface::<dyn CommandProcessor>()
        .expect("client processes commands")
}
