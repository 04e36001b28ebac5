//! Request and response messages exchanged over a kvrpc connection.
//!
//! Both are JSON objects carried in one frame each:
//!
//! ```text
//! {"type":"request","method":"write","args":[3,"abc"],"kwargs":{},"request_id":0}
//! {"type":"response","status":"success","result":null,"request_id":0}
//! {"type":"response","status":"error","error":"NotFound","message":"...","request_id":1}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value of the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Response => f.write_str("response"),
        }
    }
}

/// A method invocation sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Name of the method to invoke.
    pub method: String,
    /// Positional arguments, in order.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Named arguments.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    /// Per-client sequence number, echoed in the response.
    pub request_id: u64,
}

impl Request {
    /// Build a request with positional and named arguments.
    pub fn new(
        request_id: u64,
        method: impl Into<String>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Self {
        Self {
            kind: MessageKind::Request,
            method: method.into(),
            args,
            kwargs,
            request_id,
        }
    }

    /// Build a request with positional arguments only.
    pub fn positional(request_id: u64, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new(request_id, method, args, Map::new())
    }
}

/// Result half of a [`Response`], tagged by the `status` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success {
        #[serde(default)]
        result: Value,
    },
    Error {
        /// Error kind, e.g. `NotFound`.
        error: String,
        /// Human-readable detail.
        message: String,
    },
}

/// The server's answer to exactly one [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub request_id: u64,
}

impl Response {
    /// Successful response carrying `result`.
    pub fn success(request_id: u64, result: Value) -> Self {
        Self {
            kind: MessageKind::Response,
            outcome: Outcome::Success { result },
            request_id,
        }
    }

    /// Error response carrying a kind and message.
    pub fn error(request_id: u64, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Response,
            outcome: Outcome::Error {
                error: kind.into(),
                message: message.into(),
            },
            request_id,
        }
    }

    /// True when `status` is `success`.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Error kind, when `status` is `error`.
    pub fn error_kind(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Error { error, .. } => Some(error),
            Outcome::Success { .. } => None,
        }
    }
}

/// Error kinds produced by the server.
///
/// The wire carries the kind as a plain string so that a client can report
/// kinds it does not know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// Bad argument type, range or arity.
    InvalidArgument,
    /// Read of an index that was never written.
    NotFound,
    /// Method name not in the method table.
    UnknownMethod,
    /// The datastore implementation panicked.
    Internal,
}

impl RemoteErrorKind {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::NotFound => "NotFound",
            Self::UnknownMethod => "UnknownMethod",
            Self::Internal => "InternalError",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteErrorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InvalidArgument" => Ok(Self::InvalidArgument),
            "NotFound" => Ok(Self::NotFound),
            "UnknownMethod" => Ok(Self::UnknownMethod),
            "InternalError" => Ok(Self::Internal),
            _ => Err(()),
        }
    }
}
