//! Maps requests onto [`Datastore`] calls.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::datastore::{Datastore, DatastoreError};
use crate::message::{RemoteErrorKind, Request, Response};

/// Methods exposed over RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `write(index, data) -> null`
    Write,
    /// `read(index) -> string`
    Read,
}

impl Method {
    pub const ALL: [Method; 2] = [Method::Write, Method::Read];

    /// Name on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Read => "read",
        }
    }

    /// Parameter names, in positional order.
    pub fn params(self) -> &'static [&'static str] {
        match self {
            Self::Write => &["index", "data"],
            Self::Read => &["index"],
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|method| method.name() == s)
            .ok_or_else(|| DispatchError::UnknownMethod(s.to_string()))
    }
}

/// Why a request could not be carried out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    #[error("{method} failed: {detail}")]
    Panicked { method: Method, detail: String },
}

impl DispatchError {
    /// Kind reported in the error response.
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            Self::UnknownMethod(_) => RemoteErrorKind::UnknownMethod,
            Self::InvalidArgument(_) => RemoteErrorKind::InvalidArgument,
            Self::Datastore(err) => err.kind(),
            Self::Panicked { .. } => RemoteErrorKind::Internal,
        }
    }
}

/// Turns requests into responses against a shared datastore.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn Datastore>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// The datastore requests are dispatched to.
    pub fn store(&self) -> &Arc<dyn Datastore> {
        &self.store
    }

    /// Execute `request` and build its response.
    ///
    /// Every failure, including a panic inside the datastore, becomes an
    /// error response. The response always carries `request.request_id`.
    pub fn dispatch(&self, request: &Request) -> Response {
        match self.invoke(request) {
            Ok(result) => {
                debug!(
                    request_id = request.request_id,
                    method = %request.method,
                    "dispatched"
                );
                Response::success(request.request_id, result)
            }
            Err(err) => {
                debug!(
                    request_id = request.request_id,
                    method = %request.method,
                    kind = %err.kind(),
                    error = %err,
                    "dispatch failed"
                );
                Response::error(request.request_id, err.kind().as_str(), err.to_string())
            }
        }
    }

    fn invoke(&self, request: &Request) -> Result<Value, DispatchError> {
        let method: Method = request.method.parse()?;
        let args = bind_args(method, &request.args, &request.kwargs)?;

        match method {
            Method::Write => {
                let index = index_arg(&args[0])?;
                let data = data_arg(&args[1])?;
                self.guarded(method, || self.store.write(index, data))?;
                Ok(Value::Null)
            }
            Method::Read => {
                let index = index_arg(&args[0])?;
                let data = self.guarded(method, || self.store.read(index))?;
                Ok(Value::String(data))
            }
        }
    }

    fn guarded<T>(
        &self,
        method: Method,
        call: impl FnOnce() -> Result<T, DatastoreError>,
    ) -> Result<T, DispatchError> {
        match catch_unwind(AssertUnwindSafe(call)) {
            Ok(result) => result.map_err(DispatchError::from),
            Err(panic) => Err(DispatchError::Panicked {
                method,
                detail: panic_detail(panic.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

/// Bind positional then named arguments to `method`'s parameters.
///
/// The returned vector has one value per parameter, in declaration order.
pub fn bind_args(
    method: Method,
    args: &[Value],
    kwargs: &Map<String, Value>,
) -> Result<Vec<Value>, DispatchError> {
    let params = method.params();
    if args.len() > params.len() {
        return Err(DispatchError::InvalidArgument(format!(
            "{method}() takes {} positional arguments but {} were given",
            params.len(),
            args.len()
        )));
    }

    let mut bound: Vec<Option<Value>> = args.iter().cloned().map(Some).collect();
    bound.resize(params.len(), None);

    for (name, value) in kwargs {
        let Some(pos) = params.iter().position(|param| *param == name.as_str()) else {
            return Err(DispatchError::InvalidArgument(format!(
                "{method}() got an unexpected keyword argument '{name}'"
            )));
        };
        if bound[pos].is_some() {
            return Err(DispatchError::InvalidArgument(format!(
                "{method}() got multiple values for argument '{name}'"
            )));
        }
        bound[pos] = Some(value.clone());
    }

    bound
        .into_iter()
        .zip(params)
        .map(|(value, name)| {
            value.ok_or_else(|| {
                DispatchError::InvalidArgument(format!(
                    "{method}() missing required argument '{name}'"
                ))
            })
        })
        .collect()
}

fn index_arg(value: &Value) -> Result<u64, DispatchError> {
    if let Value::Number(n) = value {
        if let Some(index) = n.as_u64() {
            return Ok(index);
        }
        if n.as_i64().is_some() {
            return Err(DispatchError::InvalidArgument(
                "Index cannot be negative".to_string(),
            ));
        }
    }
    Err(DispatchError::InvalidArgument(format!(
        "Index has to be a non-negative integer, got {value}"
    )))
}

fn data_arg(value: &Value) -> Result<String, DispatchError> {
    match value {
        Value::String(data) => Ok(data.clone()),
        other => Err(DispatchError::InvalidArgument(format!(
            "Data must be a string, got {other}"
        ))),
    }
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::datastore::MemoryDatastore;
    use crate::message::Outcome;

    fn dispatcher() -> (Dispatcher, Arc<MemoryDatastore>) {
        let store = Arc::new(MemoryDatastore::new());
        (Dispatcher::new(store.clone()), store)
    }

    fn kwargs(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn error_of(response: &Response) -> (&str, &str) {
        match &response.outcome {
            Outcome::Error { error, message } => (error.as_str(), message.as_str()),
            Outcome::Success { result } => panic!("expected error, got success {result}"),
        }
    }

    #[test]
    fn write_then_read_roundtrip() {
        let (d, _) = dispatcher();
        let resp = d.dispatch(&Request::positional(0, "write", vec![json!(3), json!("abc")]));
        assert_eq!(resp, Response::success(0, Value::Null));

        let resp = d.dispatch(&Request::positional(1, "read", vec![json!(3)]));
        assert_eq!(resp, Response::success(1, json!("abc")));
    }

    #[test]
    fn unknown_method_echoes_request_id() {
        let (d, _) = dispatcher();
        let resp = d.dispatch(&Request::positional(42, "delete", vec![json!(1)]));

        assert_eq!(resp.request_id, 42);
        let (kind, message) = error_of(&resp);
        assert_eq!(kind, "UnknownMethod");
        assert!(message.contains("delete"));
    }

    #[test]
    fn missing_key_is_not_found() {
        let (d, _) = dispatcher();
        let resp = d.dispatch(&Request::positional(5, "read", vec![json!(5)]));
        assert_eq!(resp.request_id, 5);
        assert_eq!(error_of(&resp).0, "NotFound");
    }

    #[test]
    fn negative_index_rejected_without_side_effect() {
        let (d, store) = dispatcher();
        let resp = d.dispatch(&Request::positional(0, "write", vec![json!(-1), json!("x")]));

        assert_eq!(error_of(&resp).0, "InvalidArgument");
        assert!(store.is_empty());
    }

    #[test]
    fn non_integer_index_rejected() {
        let (d, store) = dispatcher();
        for bad in [json!(1.5), json!("1"), json!(true), json!(null), json!([1])] {
            let resp = d.dispatch(&Request::positional(0, "write", vec![bad, json!("x")]));
            assert_eq!(error_of(&resp).0, "InvalidArgument");
        }
        assert!(store.is_empty());
    }

    #[test]
    fn non_string_data_rejected() {
        let (d, store) = dispatcher();
        let resp = d.dispatch(&Request::positional(0, "write", vec![json!(1), json!(99)]));
        let (kind, message) = error_of(&resp);
        assert_eq!(kind, "InvalidArgument");
        assert!(message.contains("Data must be a string"));
        assert!(store.is_empty());
    }

    #[test]
    fn kwargs_bind_by_name() {
        let (d, store) = dispatcher();
        let req = Request::new(
            0,
            "write",
            vec![],
            kwargs(&[("data", json!("named")), ("index", json!(8))]),
        );
        assert!(d.dispatch(&req).is_success());
        assert_eq!(store.read(8).unwrap(), "named");

        let req = Request::new(1, "write", vec![json!(9)], kwargs(&[("data", json!("mixed"))]));
        assert!(d.dispatch(&req).is_success());
        assert_eq!(store.read(9).unwrap(), "mixed");
    }

    #[test]
    fn argument_binding_errors() {
        let m = Map::new();
        let err = bind_args(Method::Read, &[json!(1), json!(2)], &m).unwrap_err();
        assert!(err.to_string().contains("positional"));

        let err = bind_args(Method::Read, &[], &m).unwrap_err();
        assert!(err.to_string().contains("missing required argument 'index'"));

        let err = bind_args(Method::Read, &[], &kwargs(&[("idx", json!(1))])).unwrap_err();
        assert!(err.to_string().contains("unexpected keyword argument 'idx'"));

        let err = bind_args(Method::Read, &[json!(1)], &kwargs(&[("index", json!(1))])).unwrap_err();
        assert!(err.to_string().contains("multiple values"));

        assert_eq!(err.kind(), RemoteErrorKind::InvalidArgument);
    }

    #[test]
    fn method_names_parse() {
        assert_eq!("write".parse::<Method>(), Ok(Method::Write));
        assert_eq!("read".parse::<Method>(), Ok(Method::Read));
        assert_eq!(
            "Read".parse::<Method>(),
            Err(DispatchError::UnknownMethod("Read".to_string()))
        );
    }

    struct FailingStore;

    impl Datastore for FailingStore {
        fn write(&self, _index: u64, data: String) -> Result<(), DatastoreError> {
            Err(DatastoreError::InvalidArgument(format!(
                "refusing {} bytes",
                data.len()
            )))
        }

        fn read(&self, _index: u64) -> Result<String, DatastoreError> {
            panic!("disk on fire")
        }
    }

    #[test]
    fn datastore_errors_become_responses() {
        let d = Dispatcher::new(Arc::new(FailingStore));
        let resp = d.dispatch(&Request::positional(3, "write", vec![json!(1), json!("abc")]));
        assert_eq!(error_of(&resp), ("InvalidArgument", "refusing 3 bytes"));
    }

    #[test]
    fn datastore_panic_becomes_internal_error() {
        let d = Dispatcher::new(Arc::new(FailingStore));
        let resp = d.dispatch(&Request::positional(4, "read", vec![json!(1)]));
        assert_eq!(resp.request_id, 4);
        let (kind, message) = error_of(&resp);
        assert_eq!(kind, "InternalError");
        assert!(message.contains("disk on fire"));
    }
}
