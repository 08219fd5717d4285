// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use lancache_protocol::CredentialType;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

#[derive(Default)]
struct RecordingHandler {
    challenges: std::sync::Mutex<Vec<Challenge>>,
    disconnects: AtomicUsize,
}

#[async_trait::async_trait]
impl DaemonEventHandler for RecordingHandler {
    async fn on_challenge(&self, challenge: Challenge) {
        self.challenges.lock().unwrap().push(challenge);
    }
    async fn on_status(&self, _status: String) {}
    async fn on_progress(&self, _progress: PrefillProgressUpdate) {}
    async fn on_error(&self, _message: String) {}
    async fn on_disconnect(&self, _reason: Option<String>) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn call_round_trips_a_request_and_response() {
    let dir = tempfile::tempdir().unwrap();
    let sock_path = dir.path().join("daemon.sock");
    let listener = UnixListener::bind(&sock_path).unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let req: DaemonRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(req.command, "get-status");
        let resp = DaemonResponse { success: true, message: None, error: None, data: None };
        write_half.write_all(format!("{}\n", serde_json::to_string(&resp).unwrap()).as_bytes()).await.unwrap();
    });

    let handler = Arc::new(RecordingHandler::default());
    let client = DaemonClient::connect_unix(&sock_path, handler).await.unwrap();
    let resp = client.call(Command::GetStatus, Value::Null, Duration::from_secs(2)).await.unwrap();
    assert!(resp.success);

    server.await.unwrap();
}

#[tokio::test]
async fn event_frames_are_dispatched_to_the_handler_not_treated_as_responses() {
    let dir = tempfile::tempdir().unwrap();
    let sock_path = dir.path().join("daemon.sock");
    let listener = UnixListener::bind(&sock_path).unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (_read_half, mut write_half) = stream.into_split();
        let event = DaemonEvent::CredentialChallenge(Challenge {
            challenge_id: "c1".into(),
            server_public_key: "ab".repeat(32),
            credential_type: CredentialType::Username,
        });
        write_half.write_all(format!("{}\n", serde_json::to_string(&event).unwrap()).as_bytes()).await.unwrap();
        // Keep the connection open briefly so the client has time to read.
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let handler = Arc::new(RecordingHandler::default());
    let client = DaemonClient::connect_unix(&sock_path, handler.clone()).await.unwrap();
    drop(client);
    server.await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handler.challenges.lock().unwrap().len(), 1);
    assert_eq!(handler.challenges.lock().unwrap()[0].challenge_id, "c1");
}

#[tokio::test]
async fn call_times_out_when_daemon_never_responds() {
    let dir = tempfile::tempdir().unwrap();
    let sock_path = dir.path().join("daemon.sock");
    let listener = UnixListener::bind(&sock_path).unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        // Never responds; just hold the connection open.
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(stream);
    });

    let handler = Arc::new(RecordingHandler::default());
    let client = DaemonClient::connect_unix(&sock_path, handler).await.unwrap();
    let err = client.call(Command::GetStatus, Value::Null, Duration::from_millis(20)).await.unwrap_err();
    assert!(matches!(err, PrefillError::Timeout(_)));

    server.await.unwrap();
}
