//! TCP plumbing shared by the JSON-RPC server and client.
//!
//! The listener binds a TCP endpoint and accepts connections on a background
//! thread, handing each one to a [`ConnectionHandler`] on its own thread.
//! Both ends exchange newline-terminated JSON messages through
//! [`FrameReader`].

mod errors;
mod framing;
mod handler;
mod listener;
#[cfg(test)]
mod test_utils;

pub(crate) use self::errors::ListenerError;
pub(crate) use self::framing::{Frame, FrameReader, MAX_MESSAGE_BYTES, write_frame};
pub(crate) use self::handler::ConnectionHandler;
pub(crate) use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
