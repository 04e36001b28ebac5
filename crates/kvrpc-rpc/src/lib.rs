//! Remote procedure calls over framed JSON.
//!
//! A [`RpcServer`] exposes a [`Datastore`] to remote [`RpcClient`]s. Each
//! call is one request frame followed by one response frame on a persistent
//! TCP connection.

#[cfg(feature = "async")]
pub mod async_server;
pub mod client;
pub mod datastore;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod server;

#[cfg(feature = "async")]
pub use async_server::AsyncRpcServer;
pub use client::{ClientConfig, DatastoreClient, RpcClient};
pub use datastore::{Datastore, DatastoreError, MemoryDatastore};
pub use dispatch::{DispatchError, Dispatcher, Method};
pub use error::{ClientError, ClientResult, Result, RpcError};
pub use message::{MessageKind, Outcome, RemoteErrorKind, Request, Response};
pub use server::{serve_connection, RpcServer, RunningServer, ServerConfig, ServerHandle};
