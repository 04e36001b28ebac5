use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use kvrpc_rpc::{
    ClientError, DatastoreClient, MemoryDatastore, RemoteErrorKind, RpcClient, RpcServer,
    RunningServer,
};
use serde_json::{json, Map, Value};

fn start_server() -> (RunningServer, Arc<MemoryDatastore>, String) {
    let store = Arc::new(MemoryDatastore::new());
    let server = RpcServer::bind("127.0.0.1:0", store.clone())
        .expect("server should bind")
        .spawn()
        .expect("server should start");
    let addr = server.connect_addr().to_string();
    (server, store, addr)
}

#[test]
fn write_then_read_over_tcp() {
    let (_server, _, addr) = start_server();
    let mut client = DatastoreClient::new(addr);

    client.write(3, "abc").expect("write should succeed");
    assert_eq!(client.read(3).expect("read should succeed"), "abc");

    client.write(3, "xyz").expect("overwrite should succeed");
    assert_eq!(client.read(3).expect("read should succeed"), "xyz");
}

#[test]
fn unknown_method_surfaces_as_remote_error() {
    let (_server, _, addr) = start_server();
    let mut client = RpcClient::new(addr);

    let err = client.call("delete", vec![json!(1)]).unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::UnknownMethod));
    assert!(client.is_connected(), "remote errors keep the connection");

    // The connection is still usable after an error response.
    client.call("write", vec![json!(0), json!("after")]).unwrap();
}

#[test]
fn read_of_unwritten_index_is_not_found() {
    let (_server, _, addr) = start_server();
    let mut client = DatastoreClient::new(addr);

    match client.read(5) {
        Err(ClientError::Remote { kind, message }) => {
            assert_eq!(kind, "NotFound");
            assert!(message.contains('5'));
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn negative_index_creates_no_entry() {
    let (_server, store, addr) = start_server();
    let mut client = RpcClient::new(addr);

    let err = client.call("write", vec![json!(-1), json!("x")]).unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::InvalidArgument));
    assert!(store.is_empty());
}

#[test]
fn kwargs_reach_the_datastore() {
    let (_server, store, addr) = start_server();
    let mut client = RpcClient::new(addr);

    let mut kwargs = Map::new();
    kwargs.insert("data".to_string(), json!("by name"));
    let result = client
        .call_with_kwargs("write", vec![json!(11)], kwargs)
        .expect("write should succeed");
    assert_eq!(result, Value::Null);

    let mut kwargs = Map::new();
    kwargs.insert("index".to_string(), json!(11));
    let result = client
        .call_with_kwargs("read", vec![], kwargs)
        .expect("read should succeed");
    assert_eq!(result, json!("by name"));
    assert_eq!(store.len(), 1);
}

#[test]
fn concurrent_clients_on_disjoint_ranges() {
    let (_server, store, addr) = start_server();

    let workers: Vec<_> = [0u64, 1000]
        .into_iter()
        .map(|base| {
            let addr = addr.clone();
            thread::spawn(move || {
                let mut client = DatastoreClient::new(addr);
                for i in 0..100 {
                    let index = base + i;
                    let data = format!("value-{index}");
                    client.write(index, &data).expect("write should succeed");
                    assert_eq!(client.read(index).expect("read should succeed"), data);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("client thread should not panic");
    }
    assert_eq!(store.len(), 200);
}

#[test]
fn request_ids_increase_across_reconnects() {
    let (_server, _, addr) = start_server();
    let mut client = RpcClient::new(addr);

    client.call("write", vec![json!(0), json!("a")]).unwrap();
    client.call("read", vec![json!(0)]).unwrap();
    assert_eq!(client.next_request_id(), 2);

    client.close();
    client.close();
    assert!(!client.is_connected());

    assert_eq!(client.call("read", vec![json!(0)]).unwrap(), json!("a"));
    assert!(client.is_connected());
    assert_eq!(client.next_request_id(), 3);
}

#[test]
fn abrupt_disconnect_leaves_server_running() {
    let (_server, _, addr) = start_server();

    {
        let mut half = TcpStream::connect(&addr).unwrap();
        half.write_all(&[0, 0, 0, 50, b'{', b'"']).unwrap();
    }
    {
        let mut quiet = RpcClient::new(addr.clone());
        quiet.connect().unwrap();
    }

    let mut client = DatastoreClient::new(addr);
    client.write(1, "alive").expect("server should still serve");
    assert_eq!(client.read(1).unwrap(), "alive");
}

#[test]
fn stopped_server_refuses_new_calls() {
    let (server, _, addr) = start_server();
    let mut client = RpcClient::new(addr.clone());
    client.call("write", vec![json!(0), json!("a")]).unwrap();

    server.stop();
    server.join().expect("server should exit cleanly");

    let mut fresh = RpcClient::new(addr);
    let err = fresh.call("read", vec![json!(0)]).unwrap_err();
    assert!(err.is_network(), "expected a network error, got {err:?}");
}
