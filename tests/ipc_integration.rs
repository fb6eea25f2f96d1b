//! IPC integration tests: raw frames against an in-process plugin server.

use cloudcost_core::ipc::codec::{write_frame, MSG_ERROR, MSG_REQUEST, MSG_RESPONSE};
use cloudcost_core::ipc::PluginServer;
use cloudcost_core::plugin::CostSource;
use cloudcost_core::testing::{monthly, StubSource};
use cloudcost_core::types::IpcConfig;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

/// Helper: serve `source` on a random port, return (addr, server).
async fn start_test_server(source: StubSource) -> (std::net::SocketAddr, Arc<PluginServer>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(PluginServer::new(
        Arc::new(source) as Arc<dyn CostSource>,
        IpcConfig::default(),
    ));
    let serving = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = serving.serve(listener).await;
    });
    (addr, server)
}

/// Helper: send a request frame, receive and decode the response.
async fn round_trip(
    stream: &mut TcpStream,
    id: &str,
    service: &str,
    method: &str,
    body: serde_json::Value,
) -> (u8, serde_json::Value) {
    let request = serde_json::json!({
        "id": id,
        "service": service,
        "method": method,
        "body": body,
    });

    let payload = rmp_serde::to_vec_named(&request).unwrap();
    write_frame(stream, MSG_REQUEST, &payload).await.unwrap();

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let frame_len = u32::from_be_bytes(len_buf) as usize;
    let mut frame_data = vec![0u8; frame_len];
    stream.read_exact(&mut frame_data).await.unwrap();

    let msg_type = frame_data[0];
    let response: serde_json::Value = rmp_serde::from_slice(&frame_data[1..]).unwrap();
    (msg_type, response)
}

fn projected_body() -> serde_json::Value {
    serde_json::json!({
        "resource": {
            "provider": "aws",
            "resource_type": "aws:ec2/instance:Instance",
            "sku": "t3.micro",
            "region": "us-east-1",
        }
    })
}

#[tokio::test]
async fn test_projected_cost_round_trip() {
    let (addr, server) = start_test_server(StubSource::new("aws-public").with_projected(monthly(7.3))).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) =
        round_trip(&mut stream, "req-1", "costsource", "GetProjectedCost", projected_body()).await;

    assert_eq!(msg_type, MSG_RESPONSE);
    assert_eq!(response["id"], "req-1");
    assert_eq!(response["ok"], true);
    assert_eq!(response["body"]["cost_per_month"], 7.3);
    assert_eq!(response["body"]["currency"], "USD");
    server.shutdown();
}

#[tokio::test]
async fn test_unknown_service_returns_error() {
    let (addr, _server) = start_test_server(StubSource::new("aws-public")).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) =
        round_trip(&mut stream, "req-2", "nonexistent", "Foo", serde_json::json!({})).await;

    assert_eq!(msg_type, MSG_ERROR);
    assert_eq!(response["ok"], false);
    assert_eq!(response["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_legacy_source_answers_unimplemented_metadata() {
    let (addr, _server) = start_test_server(StubSource::new("legacy")).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) =
        round_trip(&mut stream, "req-3", "costsource", "GetPluginInfo", serde_json::json!({})).await;

    assert_eq!(msg_type, MSG_ERROR);
    assert_eq!(response["error"]["code"], "UNIMPLEMENTED");
}

#[tokio::test]
async fn test_malformed_body_is_invalid_argument() {
    let (addr, _server) = start_test_server(StubSource::new("aws-public").with_projected(monthly(1.0))).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) = round_trip(
        &mut stream,
        "req-4",
        "costsource",
        "GetProjectedCost",
        serde_json::json!({"resource": "not-an-object"}),
    )
    .await;

    assert_eq!(msg_type, MSG_ERROR);
    assert_eq!(response["error"]["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_requests_share_one_connection() {
    let (addr, _server) = start_test_server(StubSource::new("aws-public").with_projected(monthly(2.0))).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    for i in 0..3 {
        let id = format!("seq-{i}");
        let (msg_type, response) =
            round_trip(&mut stream, &id, "costsource", "GetProjectedCost", projected_body()).await;
        assert_eq!(msg_type, MSG_RESPONSE);
        assert_eq!(response["id"], id.as_str());
    }
}
