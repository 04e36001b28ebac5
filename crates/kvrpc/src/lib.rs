//! Remote key-value datastore over length-prefixed JSON RPC.
//!
//! A server owns a datastore keyed by non-negative integers; clients call
//! `write(index, data)` and `read(index)` on it over TCP.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP endpoints and streams
//! - [`frame`]: Length-prefixed JSON framing
//! - [`rpc`]: Messages, dispatch, server loop and client stub

/// Re-export transport types.
pub mod transport {
    pub use kvrpc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use kvrpc_frame::*;
}

/// Re-export RPC types.
pub mod rpc {
    pub use kvrpc_rpc::*;
}

pub use kvrpc_rpc::{
    ClientConfig, ClientError, Datastore, DatastoreClient, DatastoreError, MemoryDatastore,
    RpcClient, RpcServer, RunningServer, ServerConfig,
};
