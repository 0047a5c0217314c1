//! Integration tests for transcoder-client.
//!
//! These tests drive the public API against a fake transcoder listening on a
//! real Unix domain socket.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use transcoder_client::error::{ProtocolError, ReadError, ResponseError};
use transcoder_client::protocol::MessageType;
use transcoder_client::{
    ConnectionPool, ControlClient, PoolConfig, Request, SocketTransport, TranscoderError,
    TransportConfig,
};

use common::TranscoderPeer;

fn client(peer: &TranscoderPeer) -> ControlClient {
    ControlClient::builder()
        .socket_path(peer.path())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn pooled_client(peer: &TranscoderPeer, max: usize) -> ControlClient {
    ControlClient::builder()
        .socket_path(peer.path())
        .timeout(Duration::from_secs(5))
        .connection_pool(max, Duration::from_secs(60))
        .build()
        .unwrap()
}

/// PING with no blocks gets a PONG with no blocks.
#[test]
fn test_ping_round_trip() {
    let peer = TranscoderPeer::start();
    let mut transport = SocketTransport::open(TransportConfig::new(peer.path())).unwrap();

    assert!(transport.ping().unwrap());
    assert!(transport.is_connected());
    transport.disconnect();
    assert!(!transport.is_connected());
}

#[test]
fn test_get_json() {
    let peer = TranscoderPeer::start();
    let client = client(&peer);

    let health: Value = client.get_json("/api/health").unwrap();
    assert_eq!(health["status"], "healthy");

    let seen = peer.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["_method"], "GET");
    assert_eq!(seen[0]["_path"], "/api/health");
    assert_eq!(seen[0]["accept"], "application/json");
    assert!(seen[0].contains_key("x-request-id"));
}

#[test]
fn test_post_json_sends_body() {
    let peer = TranscoderPeer::start();
    let client = client(&peer);

    let job: Value = client
        .post_json("/api/transcode/start", &json!({"videoId": "abc", "quality": "1080p"}))
        .unwrap();
    assert_eq!(job["jobId"], "job-1");
    assert_eq!(job["videoId"], "abc");

    let seen = peer.requests();
    assert_eq!(seen[0]["content-type"], "application/json");
}

#[test]
fn test_playlist_text_and_header_normalization() {
    let peer = TranscoderPeer::start();
    let client = client(&peer);

    let response = client
        .execute(&Request::get("/api/hls/abc/master.m3u8").unwrap())
        .unwrap();
    assert_eq!(
        response.header("Content-Type"),
        Some("application/vnd.apple.mpegurl")
    );
    assert!(response.text().starts_with("#EXTM3U"));

    let text = client.get_text("/api/hls/abc/master.m3u8").unwrap();
    assert!(text.contains("EXT-X-VERSION"));
}

#[test]
fn test_query_is_forwarded() {
    let peer = TranscoderPeer::start();
    let client = client(&peer);

    let request = Request::get("/api/videos").unwrap().with_query("page=2");
    let response = client.send(&request).unwrap();
    assert_eq!(response.status_code(), 404);
    assert_eq!(response.status_message(), "Not Found");

    assert_eq!(peer.requests()[0]["_query"], "page=2");
}

#[test]
fn test_exists_and_delete() {
    let peer = TranscoderPeer::start();
    let client = client(&peer);

    assert!(client.exists("/api/video/abc").unwrap());
    assert!(!client.exists("/api/video/missing").unwrap());

    assert_eq!(client.delete("/api/session/s1").unwrap().status_code(), 204);
    assert!(!client.delete_if_exists("/api/session/gone").unwrap());
}

/// A 4xx reply is a remote rejection with a bounded body excerpt.
#[test]
fn test_status_failure_is_remote() {
    let peer = TranscoderPeer::start();
    let client = client(&peer);

    let err = client.get_json::<Value>("/api/unknown").unwrap_err();
    assert!(err.is_remote());
    assert!(!err.is_transport());

    match err {
        TranscoderError::Response(ResponseError::Status {
            status_code,
            status_message,
            body,
        }) => {
            assert_eq!(status_code, 404);
            assert_eq!(status_message, "Not Found");
            assert_eq!(body, r#"{"error":"no route"}"#);
        }
        other => panic!("expected Status error, got {:?}", other),
    }
}

#[test]
fn test_error_envelope_is_server_error() {
    let peer = TranscoderPeer::start();
    let client = pooled_client(&peer, 2);

    match client.get_json::<Value>("/api/broken") {
        Err(TranscoderError::Response(ResponseError::Server {
            code,
            message,
            details,
        })) => {
            assert_eq!(code, 1001);
            assert_eq!(message, "ffmpeg exited");
            assert_eq!(details, Some(json!({"exitCode": 1})));
        }
        other => panic!("expected Server error, got {:?}", other),
    }

    // The envelope was read completely, so the connection is kept.
    let stats = client.pool_stats().unwrap();
    assert_eq!(stats.idle, 1);
    assert!(client.ping().unwrap());
    assert_eq!(peer.accepted(), 1);
}

/// A reply that does not start with the magic kills the connection.
#[test]
fn test_malformed_reply_discards_pooled_connection() {
    let peer = TranscoderPeer::start();
    let client = pooled_client(&peer, 2);

    let err = client.get_json::<Value>("/api/garbage").unwrap_err();
    assert!(err.is_transport());
    assert!(matches!(
        err,
        TranscoderError::Protocol(ProtocolError::InvalidMagic(0x48545450))
    ));

    let stats = client.pool_stats().unwrap();
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.active, 0);

    // A fresh connection works.
    assert!(client.ping().unwrap());
    assert_eq!(peer.accepted(), 2);
}

#[test]
fn test_oversized_reply_rejected() {
    let peer = TranscoderPeer::start();
    let client = ControlClient::builder()
        .socket_path(peer.path())
        .max_message_size(1024)
        .build()
        .unwrap();

    match client.get_text("/api/huge") {
        Err(TranscoderError::Protocol(ProtocolError::MessageTooLarge { declared, max })) => {
            assert_eq!(declared, 4096);
            assert_eq!(max, 1024);
        }
        other => panic!("expected MessageTooLarge, got {:?}", other),
    }
}

#[test]
fn test_peer_hangup_is_connection_closed() {
    let peer = TranscoderPeer::start();
    let client = client(&peer);

    assert!(matches!(
        client.get_text("/api/hangup"),
        Err(TranscoderError::Read(ReadError::ConnectionClosed))
    ));
}

#[test]
fn test_read_timeout() {
    let peer = TranscoderPeer::start();
    let client = ControlClient::builder()
        .socket_path(peer.path())
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    match client.get_text("/api/slow") {
        Err(TranscoderError::Read(ReadError::Timeout { expected, actual })) => {
            assert_eq!(expected, 8);
            assert_eq!(actual, 0);
        }
        other => panic!("expected Timeout, got {:?}", other),
    }
}

#[test]
fn test_missing_socket_is_connect_failure() {
    let client = ControlClient::builder()
        .socket_path("/nonexistent/dir/transcoder.sock")
        .build()
        .unwrap();

    let err = client.ping().unwrap_err();
    assert!(err.is_transport());
    assert!(err.to_string().contains("/nonexistent/dir/transcoder.sock"));
}

/// With every slot checked out, the pool opens a temporary connection.
#[test]
fn test_pool_saturation() {
    let peer = TranscoderPeer::start();
    let pool = ConnectionPool::new(
        TransportConfig::new(peer.path()),
        PoolConfig::new(2, Duration::from_secs(60)),
    )
    .unwrap();

    let first = pool.acquire().unwrap();
    let second = pool.acquire().unwrap();
    let mut third = pool.acquire().unwrap();

    assert!(third.is_temporary());
    assert!(third.transport_mut().ping().unwrap());
    assert_eq!(pool.stats().active, 3);

    pool.release(first);
    pool.release(second);
    pool.release(third);
    assert_eq!(pool.stats().idle, 2);

    pool.close_all();
    assert_eq!(pool.stats().idle, 0);
}

#[test]
fn test_pooled_client_under_concurrent_load() {
    const THREADS: usize = 8;
    const MAX: usize = 4;

    let peer = TranscoderPeer::start();
    let client = Arc::new(pooled_client(&peer, MAX));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let client = client.clone();
            thread::spawn(move || {
                for j in 0..10 {
                    let job: Value = client
                        .post_json(
                            "/api/transcode/start",
                            &json!({"videoId": format!("v{i}-{j}")}),
                        )
                        .unwrap();
                    assert_eq!(job["videoId"], format!("v{i}-{j}"));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = client.pool_stats().unwrap();
    assert_eq!(stats.active, 0);
    assert!(stats.idle <= MAX);
    assert_eq!(peer.requests().len(), THREADS * 10);
    assert_eq!(peer.accepted() as u64, stats.total_created);
}

#[test]
fn test_raw_exchange_with_message() {
    let peer = TranscoderPeer::start();
    let reply = SocketTransport::with_connection(TransportConfig::new(peer.path()), |transport| {
        transport.exchange(&Request::head("/api/video/abc")?.to_message()?)
    })
    .unwrap();

    assert_eq!(reply.message_type, MessageType::Response);
    assert_eq!(reply.headers.unwrap()["_statusCode"], 200);
    assert!(reply.body.is_none());
}
