//! JSON-RPC server exposing a command processor over TCP.
//!
//! Each accepted connection is served on its own thread and may carry any
//! number of newline-delimited requests. Every request becomes one
//! `processor.execute(method, params)` call; its result or error is written
//! back on the same connection.
//!
//! Messages longer than the transport limit are answered with an error
//! instead of closing the connection: an oversized request gets
//! `INVALID_REQUEST` and an oversized result is replaced by an
//! `INTERNAL_ERROR` reply carrying a `LimitExceeded` error.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bastion_core::{
    ClassId, CommandProcessor, ConstructScope, Context, CoreError, Dictionary, ErrorKind,
    InterfaceSet, ObjectClass, Result, Service, Variant, resolve_processor,
};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelCipher, ChannelMode, ENCRYPTED_METHOD};
use crate::config::{
    DEFAULT_HOST, DEFAULT_MAX_CONNECTIONS, optional_positive, optional_string, required_port,
};
use crate::protocol::{
    ErrorObject, INVALID_PARAMS, INVALID_REQUEST, Request, Response, parse_request,
};
use crate::transport::{
    ConnectionHandler, Frame, FrameReader, ListenerHandle, MAX_MESSAGE_BYTES, SocketListener,
    write_frame,
};

/// Class id of [`JsonRpcServer`].
pub const CLSID_JSON_RPC_SERVER: ClassId = ClassId::new(0xB501_0001);

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");
const POLL_INTERVAL: Duration = Duration::from_millis(200);

struct Running {
    listener: ListenerHandle,
    address: SocketAddr,
    closing: Arc<AtomicBool>,
}

/// Server object.
///
/// Configured with `{port, processor, host?, numThreads?, channelMode?,
/// encryption?, key?}`. The processor is resolved when the server starts, so
/// it may name an object registered after the server was created.
///
/// `channelMode` is `plain` (the default), `encrypted` or `both`. The last
/// two need `encryption: "aes"` and a shared `key`; calls of a kind the mode
/// does not admit fail with `OperationNotSupported`.
pub struct JsonRpcServer {
    context: Context,
    host: String,
    port: u16,
    processor: Variant,
    max_connections: usize,
    channel: Channel,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for JsonRpcServer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("JsonRpcServer")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_connections", &self.max_connections)
            .field("channel_mode", &self.channel.mode())
            .field("running", &self.local_addr())
            .finish_non_exhaustive()
    }
}

impl JsonRpcServer {
    /// Binds the listener and starts serving.
    ///
    /// Returns once the socket is bound, with the actual address.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidUsage` when already started, with whatever
    /// processor resolution reports, and with `ConnectionError` when the
    /// address cannot be bound.
    pub fn start_server(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock();
        if let Some(current) = running.as_ref() {
            return Err(CoreError::invalid_usage(format!(
                "server is already listening on {}",
                current.address
            )));
        }
        let processor = resolve_processor(&self.context, &self.processor)?;
        let bound = SocketListener::bind(&self.host, self.port)?;
        let address = bound.local_addr();
        let closing = Arc::new(AtomicBool::new(false));
        let handler = Arc::new(RpcConnectionHandler {
            processor,
            channel: self.channel.clone(),
            closing: Arc::clone(&closing),
        });
        let listener = bound.start(handler, self.max_connections)?;
        info!(target: SERVER_TARGET, %address, "JSON-RPC server started");
        *running = Some(Running {
            listener,
            address,
            closing,
        });
        Ok(address)
    }

    /// Stops accepting and waits for the listener thread.
    ///
    /// Open connections finish their current request and close. Stopping a
    /// server that is not running does nothing.
    ///
    /// # Errors
    ///
    /// Fails with `RuntimeError` when the listener thread panicked.
    pub fn stop_server(&self) -> Result<()> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };
        running.closing.store(true, Ordering::SeqCst);
        running.listener.shutdown();
        running.listener.join()?;
        info!(
            target: SERVER_TARGET,
            address = %running.address,
            "JSON-RPC server stopped"
        );
        Ok(())
    }

    /// Bound address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|running| running.address)
    }
}

impl CommandProcessor for JsonRpcServer {
    fn execute(&self, command: &str, _params: &Variant) -> Result<Variant> {
        match command {
            "start" => self.start_server().map(address_variant),
            "stop" => self.stop_server().map(|()| Variant::Null),
            other => Err(CoreError::operation_not_supported(other)),
        }
    }
}

impl Service for JsonRpcServer {
    fn start(&self) -> Result<()> {
        self.start_server().map(|_| ())
    }

    fn stop(&self) -> Result<()> {
        self.stop_server()
    }

    fn shutdown(&self) -> Result<()> {
        self.stop_server()
    }
}

impl ObjectClass for JsonRpcServer {
    const CLASS_ID: ClassId = CLSID_JSON_RPC_SERVER;

    fn final_construct(scope: &ConstructScope<'_>, config: &Dictionary) -> Result<Self> {
        let processor = match config.get("processor") {
            None | Some(Variant::Null) => {
                return Err(CoreError::invalid_argument(
                    "server configuration has no <processor> field",
                ));
            }
            Some(processor) => processor.clone(),
        };
        let port = required_port(config, "port", true)?;
        let host = optional_string(config, "host")?.unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let max_connections =
            optional_positive(config, "numThreads")?.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let channel = Channel::from_config(config, true)?;
        Ok(Self {
            context: scope.context().clone(),
            host,
            port,
            processor,
            max_connections,
            channel,
            running: Mutex::new(None),
        })
    }

    fn interfaces(self: Arc<Self>) -> InterfaceSet {
        InterfaceSet::new()
            .with_processor(Arc::clone(&self) as Arc<dyn CommandProcessor>)
            .with_service(self)
    }
}

impl Drop for JsonRpcServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.closing.store(true, Ordering::SeqCst);
            running.listener.shutdown();
        }
    }
}

fn address_variant(address: SocketAddr) -> Variant {
    let mut dict = Dictionary::new();
    dict.insert("host".into(), Variant::from(address.ip().to_string()));
    dict.insert("port".into(), Variant::from(address.port()));
    Variant::Dictionary(dict)
}

struct RpcConnectionHandler {
    processor: Arc<dyn CommandProcessor>,
    channel: Channel,
    closing: Arc<AtomicBool>,
}

impl ConnectionHandler for RpcConnectionHandler {
    fn handle(&self, stream: TcpStream) {
        if let Err(error) = stream.set_read_timeout(Some(POLL_INTERVAL)) {
            warn!(target: SERVER_TARGET, error = %error, "failed to configure connection");
            return;
        }
        let mut frames = FrameReader::new(stream);
        while !self.closing.load(Ordering::SeqCst) {
            let response = match frames.next_frame() {
                Ok(Frame::Line(line)) if line.iter().all(u8::is_ascii_whitespace) => continue,
                Ok(Frame::Line(line)) => {
                    let Some(reply) = self.respond(&line) else {
                        continue;
                    };
                    reply
                }
                Ok(Frame::Oversized) => {
                    debug!(target: SERVER_TARGET, "oversized request skipped");
                    Response::failure(
                        Value::Null,
                        ErrorObject::new(
                            INVALID_REQUEST,
                            format!("request exceeds the {MAX_MESSAGE_BYTES} byte message limit"),
                        ),
                    )
                }
                Ok(Frame::Idle) => continue,
                Ok(Frame::Closed) => return,
                Err(error) => {
                    warn!(target: SERVER_TARGET, error = %error, "connection read failed");
                    return;
                }
            };
            let written = encode_response(&response)
                .and_then(|bytes| write_frame(frames.get_mut(), &bytes));
            if let Err(error) = written {
                warn!(target: SERVER_TARGET, error = %error, "connection write failed");
                return;
            }
        }
        debug!(
            target: SERVER_TARGET,
            peer = ?frames.get_ref().peer_addr().ok(),
            "connection closed by server shutdown"
        );
    }
}

impl RpcConnectionHandler {
    fn respond(&self, line: &[u8]) -> Option<Response> {
        let request = match parse_request(line) {
            Ok(request) => request,
            Err(response) => return Some(*response),
        };
        let notification = request.is_notification();
        let Request {
            method, params, id, ..
        } = request;
        let call = if method == ENCRYPTED_METHOD {
            ChannelMode::Encrypted
        } else {
            ChannelMode::Plain
        };
        let outcome = self.execute_call(call, &method, params);
        if let Err(error) = &outcome {
            debug!(
                target: SERVER_TARGET,
                method = %method,
                error = %error.message,
                "request failed"
            );
        }
        if notification {
            return None;
        }
        let reply_id = id.unwrap_or(Value::Null);
        Some(match outcome {
            Ok(result) => Response::success(reply_id, result),
            Err(error) => Response::failure(reply_id, error),
        })
    }

    fn execute_call(
        &self,
        call: ChannelMode,
        method: &str,
        params: Option<Value>,
    ) -> std::result::Result<Value, ErrorObject> {
        if !self.channel.accepts(call) {
            return Err(ErrorObject::from_core(&CoreError::new(
                ErrorKind::OperationNotSupported,
                format!("the server does not accept {call} calls"),
            )));
        }
        let Some(cipher) = self
            .channel
            .cipher()
            .filter(|_| call == ChannelMode::Encrypted)
        else {
            return dispatch(self.processor.as_ref(), method, params);
        };
        let outcome = cipher
            .open_call(&params.unwrap_or(Value::Null))
            .map_err(|error| ErrorObject::from_core(&error))
            .and_then(|(command, inner)| {
                dispatch(self.processor.as_ref(), &command, Some(inner))
            });
        seal_outcome(cipher, outcome)
    }
}

fn dispatch(
    processor: &dyn CommandProcessor,
    method: &str,
    params: Option<Value>,
) -> std::result::Result<Value, ErrorObject> {
    let arguments = match params.map(Variant::from_json).transpose() {
        Ok(converted) => converted.unwrap_or_default(),
        Err(error) => {
            let mut object = ErrorObject::from_core(&error);
            object.code = INVALID_PARAMS;
            return Err(object);
        }
    };
    processor
        .execute(method, &arguments)
        .map(|result| result.to_json())
        .map_err(|error| ErrorObject::from_core(&error))
}

/// Encrypts the result, or the error details, of an encrypted call.
fn seal_outcome(
    cipher: &ChannelCipher,
    outcome: std::result::Result<Value, ErrorObject>,
) -> std::result::Result<Value, ErrorObject> {
    match outcome {
        Ok(result) => cipher
            .seal(&result)
            .map_err(|error| ErrorObject::from_core(&error)),
        Err(mut object) => {
            object.data = object.data.and_then(|data| cipher.seal(&data).ok());
            Err(object)
        }
    }
}

/// Serialises `response`, replacing it with a `LimitExceeded` error when it
/// would not fit in one message.
fn encode_response(response: &Response) -> std::io::Result<Vec<u8>> {
    let bytes = serde_json::to_vec(response).map_err(std::io::Error::other)?;
    if bytes.len() < MAX_MESSAGE_BYTES {
        return Ok(bytes);
    }
    let error = CoreError::new(
        ErrorKind::LimitExceeded,
        format!(
            "response of {} bytes exceeds the {MAX_MESSAGE_BYTES} byte message limit",
            bytes.len()
        ),
    );
    warn!(target: SERVER_TARGET, error = %error, "response replaced");
    serde_json::to_vec(&Response::failure(
        response.id.clone(),
        ErrorObject::from_core(&error),
    ))
    .map_err(std::io::Error::other)
}
