//! JSON-RPC client acting as a proxy command processor.
//!
//! Every `execute` call opens a connection, sends one request line and reads
//! one response line. Connection failures are retried with jittered
//! exponential backoff until the configured timeout runs out. A client in
//! `encrypted` channel mode wraps each call in an encrypted envelope.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use bastion_core::{
    ClassId, CommandProcessor, ConstructScope, CoreError, Dictionary, ErrorKind, InterfaceSet,
    ObjectClass, Result, Variant,
};
use rand::Rng;
use serde_json::Value;
use tracing::debug;

use crate::channel::{Channel, ENCRYPTED_METHOD};
use crate::config::{optional_string, optional_timeout, required_port, required_string};
use crate::protocol::{Request, Response};
use crate::transport::{Frame, FrameReader, MAX_MESSAGE_BYTES, write_frame};

/// Class id of [`JsonRpcClient`].
pub const CLSID_JSON_RPC_CLIENT: ClassId = ClassId::new(0xB501_0002);

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(100);

/// Retry delays: 500 ms growing threefold up to two minutes, each jittered
/// into `[delay / 2, delay * 3 / 2]`.
#[derive(Debug)]
struct Backoff {
    next_ms: u64,
}

impl Backoff {
    const INITIAL_MS: u64 = 500;
    const FACTOR: u64 = 3;
    const MAX_MS: u64 = 120_000;

    const fn new() -> Self {
        Self {
            next_ms: Self::INITIAL_MS,
        }
    }

    fn next_delay(&mut self, rng: &mut impl Rng) -> Duration {
        let base = self.next_ms;
        self.next_ms = base.saturating_mul(Self::FACTOR).min(Self::MAX_MS);
        let half = base >> 1;
        Duration::from_millis(half.saturating_add(rng.gen_range(0..=base)))
    }
}

/// Client object.
///
/// Configured with `{host, port, timeout?, protocol?, channelMode?,
/// encryption?, key?}`. `channelMode` is `plain` or `encrypted`.
#[derive(Debug)]
pub struct JsonRpcClient {
    host: String,
    port: u16,
    timeout: Option<Duration>,
    channel: Channel,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Creates a client for `host:port`. `None` waits without limit.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, timeout: Option<Duration>) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            channel: Channel::plain(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Sends one call and waits for its reply.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` for params other than null, a
    /// dictionary or a sequence, with `ConnectionError` when the server
    /// cannot be reached or answers malformed data, and with the remote
    /// error otherwise.
    pub fn call(&self, method: &str, params: &Variant) -> Result<Variant> {
        if !matches!(
            params,
            Variant::Null | Variant::Dictionary(_) | Variant::Sequence(_)
        ) {
            return Err(CoreError::invalid_argument(format!(
                "params must be null, a dictionary or a sequence, not a {} value",
                params.type_name()
            )));
        }
        // A timeout too large to add to the clock is treated as no deadline.
        let deadline = self
            .timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = match self.channel.cipher() {
            Some(cipher) => Request::call(
                ENCRYPTED_METHOD,
                cipher.seal_call(method, params.to_json())?,
                id,
            ),
            None => Request::call(method, params.to_json(), id),
        };
        let payload = serde_json::to_vec(&request).map_err(|error| {
            CoreError::connection(format!("failed to serialise request: {error}"))
        })?;

        let stream = self.connect(deadline)?;
        let mut response = self.exchange(stream, &payload, deadline)?;
        if response.id != Value::from(id) {
            return Err(CoreError::connection(format!(
                "response id {} does not match request id {id}",
                response.id
            )));
        }
        let Some(cipher) = self.channel.cipher() else {
            return Variant::from_json(response.into_result()?);
        };
        // Errors raised before the server could decrypt carry plain details.
        if let Some(error) = response.error.as_mut() {
            error.data = error
                .data
                .take()
                .map(|data| cipher.open(&data).unwrap_or(data));
        }
        Variant::from_json(cipher.open(&response.into_result()?)?)
    }

    fn connect(&self, deadline: Option<Instant>) -> Result<TcpStream> {
        let mut backoff = Backoff::new();
        let mut rng = rand::thread_rng();
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            let error = match self.try_connect(deadline) {
                Ok(stream) => return Ok(stream),
                Err(error) => error,
            };
            let delay = backoff.next_delay(&mut rng);
            let remaining = deadline.map(|at| at.saturating_duration_since(Instant::now()));
            if remaining.is_some_and(|left| left.is_zero()) {
                return Err(CoreError::connection(format!(
                    "failed to connect to {}:{} after {attempts} attempt(s): {error}",
                    self.host, self.port
                )));
            }
            debug!(
                target: CLIENT_TARGET,
                host = %self.host,
                port = self.port,
                attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "connection failed, retrying"
            );
            thread::sleep(remaining.map_or(delay, |left| delay.min(left)));
        }
    }

    fn try_connect(&self, deadline: Option<Instant>) -> io::Result<TcpStream> {
        let address = resolve_tcp_address(&self.host, self.port)?;
        let attempt_timeout = deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
            .map_or(CONNECT_ATTEMPT_TIMEOUT, |left| {
                left.clamp(MIN_ATTEMPT_TIMEOUT, CONNECT_ATTEMPT_TIMEOUT)
            });
        TcpStream::connect_timeout(&address, attempt_timeout)
    }

    fn exchange(
        &self,
        stream: TcpStream,
        payload: &[u8],
        deadline: Option<Instant>,
    ) -> Result<Response> {
        let read_timeout = deadline
            .map(|at| at.saturating_duration_since(Instant::now()).max(MIN_ATTEMPT_TIMEOUT))
            .filter(|_| self.timeout.is_some_and(|timeout| !timeout.is_zero()));
        stream
            .set_read_timeout(read_timeout)
            .map_err(|error| transport_error("configure", &error))?;
        let mut frames = FrameReader::new(stream);
        write_frame(frames.get_mut(), payload).map_err(|error| transport_error("send", &error))?;
        match frames.next_frame() {
            Ok(Frame::Line(line)) => serde_json::from_slice(&line).map_err(|error| {
                CoreError::connection(format!("malformed response from server: {error}"))
            }),
            Ok(Frame::Oversized) => Err(CoreError::new(
                ErrorKind::LimitExceeded,
                format!("response exceeds the {MAX_MESSAGE_BYTES} byte message limit"),
            )),
            Ok(Frame::Idle) => Err(CoreError::connection(format!(
                "no response from {}:{} within the timeout",
                self.host, self.port
            ))),
            Ok(Frame::Closed) => Err(CoreError::connection(
                "server closed the connection without responding",
            )),
            Err(error) => Err(transport_error("receive", &error)),
        }
    }
}

impl CommandProcessor for JsonRpcClient {
    fn execute(&self, command: &str, params: &Variant) -> Result<Variant> {
        self.call(command, params)
    }
}

impl ObjectClass for JsonRpcClient {
    const CLASS_ID: ClassId = CLSID_JSON_RPC_CLIENT;

    fn final_construct(_scope: &ConstructScope<'_>, config: &Dictionary) -> Result<Self> {
        match optional_string(config, "protocol")?.as_deref() {
            None | Some("tcp") => {}
            Some("http") => {
                return Err(CoreError::new(
                    ErrorKind::OperationNotSupported,
                    "the http protocol is not supported",
                ));
            }
            Some(other) => {
                return Err(CoreError::invalid_argument(format!(
                    "unknown protocol <{other}>"
                )));
            }
        }
        let host = required_string(config, "host")?;
        let port = required_port(config, "port", false)?;
        let timeout = optional_timeout(config, "timeout")?;
        Ok(Self {
            channel: Channel::from_config(config, false)?,
            ..Self::new(host, port, timeout)
        })
    }

    fn interfaces(self: Arc<Self>) -> InterfaceSet {
        InterfaceSet::new().with_processor(self)
    }
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

fn transport_error(action: &str, error: &io::Error) -> CoreError {
    CoreError::new(
        ErrorKind::ConnectionError,
        format!("failed to {action} JSON-RPC message: {error}"),
    )
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    use super::*;

    #[test]
    fn backoff_grows_by_three_and_caps() {
        let mut backoff = Backoff::new();
        let mut rng = StdRng::seed_from_u64(7);
        let mut bases = Vec::new();
        for _ in 0..8 {
            bases.push(backoff.next_ms);
            let delay = backoff.next_delay(&mut rng);
            let base = bases.last().copied().unwrap_or_default();
            let millis = u64::try_from(delay.as_millis()).expect("delay fits");
            assert!(millis >= base >> 1 && millis <= base + (base >> 1));
        }
        assert_eq!(
            bases.iter().take(4).copied().collect::<Vec<_>>(),
            vec![500, 1_500, 4_500, 13_500]
        );
        assert_eq!(bases.last().copied(), Some(120_000));
    }

    #[rstest]
    #[case(Variant::from("text"))]
    #[case(Variant::Integer(3))]
    #[case(Variant::Bool(false))]
    fn scalar_params_are_rejected(#[case] params: Variant) {
        let client = JsonRpcClient::new("127.0.0.1", 1, Some(Duration::ZERO));
        let error = client.call("echo", &params).expect_err("params rejected");
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn unbounded_timeouts_do_not_overflow_the_deadline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("listener binds");
        let port = listener.local_addr().expect("bound address").port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("client connects");
            let mut frames = FrameReader::new(stream);
            let Ok(Frame::Line(line)) = frames.next_frame() else {
                panic!("expected a request line");
            };
            let request: Request = serde_json::from_slice(&line).expect("request parses");
            let reply = Response::success(request.id.unwrap_or_default(), serde_json::json!("ok"));
            let bytes = serde_json::to_vec(&reply).expect("reply serialises");
            write_frame(frames.get_mut(), &bytes).expect("reply written");
        });
        let client = JsonRpcClient::new("127.0.0.1", port, Some(Duration::from_secs(u64::MAX)));
        assert_eq!(
            client.call("echo", &Variant::Null).expect("call succeeds"),
            Variant::from("ok")
        );
        server.join().expect("server thread finishes");
    }
}
