// End-to-end tests of the stream lifecycle against a local WebSocket
// server: connect/buffer, manual stop suppressing reconnects, silent
// stall detection, pause semantics, and state-change notification.

use canmon::{ConnectionState, StreamConfig, StreamController, StreamEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::time::Duration;
use tokio_tungstenite::{accept_async, tungstenite::Message};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn wait_for<F: Fn() -> bool>(cond: F, timeout_ms: u64) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    cond()
}

fn config_for(port: u16) -> StreamConfig {
    StreamConfig {
        url: Some(format!("ws://127.0.0.1:{}/telemetry/frames", port)),
        ..Default::default()
    }
}

#[tokio::test]
async fn connects_and_buffers_frames() {
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text("0x27B 1 AABBCCDD RX 12:00:00.500".into()))
            .await
            .unwrap();
        ws.send(Message::Text(
            r#"{"can_id":"0x100","data":[1,2,3],"direction":"tx","ts":1700000000000}"#.into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text("zzz ??? !!!".into())).await.unwrap();
        ws.send(Message::Text("0x300 EEFF".into())).await.unwrap();
        // hold the connection open while the client reads
        while ws.next().await.is_some() {}
    });

    let controller = StreamController::new(config_for(port));

    assert!(wait_for(|| controller.stats().total_received >= 3, 5000).await);
    assert_eq!(controller.state(), ConnectionState::Connected);
    assert!(controller.last_heartbeat().is_some());

    let frames = controller.frames();
    let ids: Vec<u32> = frames.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![0x27B, 0x100, 0x300]);
    assert_eq!(frames[0].data, "AABBCCDD");
    assert_eq!(frames[1].data, "010203");
    assert_eq!(frames[1].timestamp, 1_700_000_000_000);

    // the unparseable line was silently dropped
    assert_eq!(controller.stats().total_received, 3);

    controller.stop();
}

#[tokio::test]
async fn stop_suppresses_scheduled_reconnect() {
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));

    let server_connections = Arc::clone(&connections);
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            server_connections.fetch_add(1, Ordering::SeqCst);
            // complete the handshake, then drop the connection
            if let Ok(ws) = accept_async(stream).await {
                drop(ws);
            }
        }
    });

    let controller = StreamController::new(config_for(port));

    assert!(wait_for(|| connections.load(Ordering::SeqCst) == 1, 5000).await);
    // let the loss register and the first reconnect (2s out) get scheduled
    tokio::time::sleep(Duration::from_millis(300)).await;
    controller.stop();

    // well past the scheduled reconnect delay
    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(connections.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state(), ConnectionState::Disconnected);
    assert!(!controller.is_running());
}

#[tokio::test]
async fn silent_stall_triggers_reconnect_and_clears_buffer() {
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));

    let server_connections = Arc::clone(&connections);
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let n = server_connections.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                // first connection sends one frame then goes silent
                // without closing; later connections keep sending
                let payload = if n == 1 { "0x27B AABB" } else { "0x300 CCDD" };
                ws.send(Message::Text(payload.into())).await.ok();
                while ws.next().await.is_some() {}
            });
        }
    });

    let controller = StreamController::new(StreamConfig {
        stale_timeout_ms: 1200,
        ..config_for(port)
    });

    assert!(wait_for(|| controller.frames().iter().any(|f| f.id == 0x27B), 5000).await);

    // the stall is declared without any transport error, then the
    // backoff reconnect brings in a second connection
    assert!(wait_for(|| connections.load(Ordering::SeqCst) >= 2, 15_000).await);
    assert!(wait_for(|| controller.frames().iter().any(|f| f.id == 0x300), 5000).await);

    // the hard loss dropped the stale window
    let ids: Vec<u32> = controller.frames().iter().map(|f| f.id).collect();
    assert!(!ids.contains(&0x27B));

    controller.stop();
}

#[tokio::test]
async fn paused_stream_tracks_liveness_but_discards_frames() {
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        loop {
            if ws.send(Message::Text("0x27B AABB".into())).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let controller = StreamController::new(StreamConfig {
        auto_connect: false,
        ..config_for(port)
    });
    controller.set_paused(true);
    controller.start().unwrap();

    // liveness keeps updating while paused
    assert!(wait_for(|| controller.last_heartbeat().is_some(), 5000).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(controller.frames().is_empty());
    assert_eq!(controller.stats().total_received, 0);

    // unpausing lets the very next repeat through: paused frames left
    // no trace in the dedup tracker
    controller.set_paused(false);
    assert!(wait_for(|| controller.stats().total_received >= 1, 5000).await);

    controller.stop();
}

#[tokio::test]
async fn emits_state_change_events() {
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let controller = StreamController::new(StreamConfig {
        auto_connect: false,
        ..config_for(port)
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    controller.on_event(move |event| {
        if let StreamEvent::StateChanged { state } = event {
            sink.lock().unwrap().push(state);
        }
    });

    controller.start().unwrap();
    assert!(wait_for(|| controller.state() == ConnectionState::Connected, 5000).await);
    controller.stop();

    let states = seen.lock().unwrap().clone();
    assert!(states.contains(&ConnectionState::Connecting));
    assert!(states.contains(&ConnectionState::Connected));
    assert_eq!(states.last(), Some(&ConnectionState::Disconnected));
}

#[tokio::test]
async fn unsupported_scheme_is_terminal() {
    init_logging();

    let controller = StreamController::new(StreamConfig {
        url: Some("ftp://127.0.0.1:1/frames".to_string()),
        ..Default::default()
    });

    assert!(wait_for(|| controller.state() == ConnectionState::Unsupported, 2000).await);
    // no retry loop stays alive behind a terminal state
    assert!(wait_for(|| !controller.is_running(), 2000).await);
}
