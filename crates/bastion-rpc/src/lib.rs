//! JSON-RPC 2.0 transport for bastion command processors.
//!
//! [`JsonRpcServer`] exposes any [`bastion_core::CommandProcessor`] on a TCP
//! port; [`JsonRpcClient`] is a processor that forwards every command to such
//! a server. Both are object classes, so they are usually created from
//! catalog descriptors after [`register_classes`] has run.

mod channel;
mod client;
mod config;
pub mod protocol;
mod server;
mod transport;

use bastion_core::{ObjectManager, Result};

pub use client::{CLSID_JSON_RPC_CLIENT, JsonRpcClient};
pub use server::{CLSID_JSON_RPC_SERVER, JsonRpcServer};

/// Registers the server and client classes.
///
/// # Errors
///
/// Fails with `AlreadyExists` when called twice on the same manager.
pub fn register_classes(objects: &ObjectManager) -> Result<()> {
    objects.register::<JsonRpcServer>()?;
    objects.register::<JsonRpcClient>()
}

#[cfg(test)]
mod tests;
