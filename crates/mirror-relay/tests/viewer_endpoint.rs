//! End-to-end viewer sessions over a real `/ws` listener.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_test::assert_ok;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use mirror_relay::application::{ConnectionSupervisor, FrameSource, ScriptRunner, SessionError};
use mirror_relay::domain::RelayConfig;
use mirror_relay::infrastructure::serve;

const FRAME: [u8; 4] = [0x89, b'P', b'N', b'G'];
const WAIT: Duration = Duration::from_secs(3);

// ── Test doubles ──────────────────────────────────────────────────────────────

struct StaticFrames;

#[async_trait]
impl FrameSource for StaticFrames {
    async fn capture(&self) -> Result<Vec<u8>, SessionError> {
        Ok(FRAME.to_vec())
    }
}

#[derive(Default)]
struct RecordingRunner {
    scripts: Mutex<Vec<String>>,
}

#[async_trait]
impl ScriptRunner for RecordingRunner {
    async fn run_script(&self, script: &str) -> Result<(), SessionError> {
        self.scripts.lock().unwrap().push(script.to_string());
        Ok(())
    }
}

struct Relay {
    addr: SocketAddr,
    runner: Arc<RecordingRunner>,
    running: Arc<AtomicBool>,
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

async fn start_relay() -> Relay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let config = RelayConfig {
        capture_interval: Duration::from_millis(20),
        ..RelayConfig::default()
    };
    let supervisor = ConnectionSupervisor::new(
        Arc::new(StaticFrames),
        runner.clone(),
        Arc::new(config),
    );
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(serve(listener, supervisor, Arc::clone(&running)));

    Relay {
        addr,
        runner,
        running,
    }
}

/// Reads messages until a binary frame arrives.
async fn next_frame<S>(ws: &mut S) -> Vec<u8>
where
    S: futures_util::Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        match timeout(WAIT, ws.next()).await {
            Ok(Some(Ok(WsMessage::Binary(data)))) => return data,
            Ok(Some(Ok(_))) => continue,
            other => panic!("expected a frame, got {other:?}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_viewer_receives_binary_frames() {
    let relay = start_relay().await;

    let (mut ws, _) = assert_ok!(connect_async(format!("ws://{}/ws", relay.addr)).await);

    assert_eq!(next_frame(&mut ws).await, FRAME);
    assert_eq!(next_frame(&mut ws).await, FRAME);
}

#[tokio::test]
async fn test_scroll_event_becomes_scroll_script() {
    // Arrange
    let relay = start_relay().await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws", relay.addr))
        .await
        .unwrap();

    // Act: one malformed message, then a valid scroll
    ws.send(WsMessage::Text("not-json".to_string())).await.unwrap();
    ws.send(WsMessage::Text(r#"{"y":450}"#.to_string())).await.unwrap();

    // Assert
    timeout(WAIT, async {
        while relay.runner.scripts.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("scroll script dispatched");
    let scripts = relay.runner.scripts.lock().unwrap().clone();
    assert_eq!(
        scripts,
        vec!["window.scrollTo({top: 450, behavior: 'auto'});".to_string()]
    );
}

#[tokio::test]
async fn test_closing_one_viewer_leaves_the_other_running() {
    // Arrange: two concurrent viewers
    let relay = start_relay().await;
    let url = format!("ws://{}/ws", relay.addr);
    let (mut a, _) = connect_async(url.as_str()).await.unwrap();
    let (mut b, _) = connect_async(url.as_str()).await.unwrap();
    assert_eq!(next_frame(&mut a).await, FRAME);
    assert_eq!(next_frame(&mut b).await, FRAME);

    // Act
    a.close(None).await.unwrap();
    drop(a);

    // Assert: B keeps streaming well after A is gone
    tokio::time::sleep(Duration::from_millis(100)).await;
    for _ in 0..3 {
        assert_eq!(next_frame(&mut b).await, FRAME);
    }
}

#[tokio::test]
async fn test_other_paths_are_rejected_with_404() {
    let relay = start_relay().await;

    let err = connect_async(format!("ws://{}/index.html", relay.addr))
        .await
        .unwrap_err();

    match err {
        WsError::Http(response) => assert_eq!(response.status(), 404),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_new_viewers_are_accepted_after_a_rejection() {
    let relay = start_relay().await;
    let _ = connect_async(format!("ws://{}/", relay.addr)).await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws", relay.addr))
        .await
        .unwrap();

    assert_eq!(next_frame(&mut ws).await, FRAME);
}
