//! End-to-end transport scenarios against a mock broker socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use kafka_transport_core::testing::MockServer;
use kafka_transport_core::{
    Endpoint, KafkaTransport, TransportError, TransportOptions, WritePayload,
};

/// Options with small delays so reconnect scenarios run in milliseconds.
fn fast_options() -> TransportOptions {
    TransportOptions {
        connect_timeout_ms: 1_000,
        initial_backoff_ms: 10,
        backoff_multiplier: 2,
        max_reconnect_backoff_ms: 40,
        shutdown_timeout_ms: 5_000,
        tls: None,
    }
}

fn payload(bytes: Vec<u8>, correlation_id: i32) -> WritePayload {
    WritePayload::new(Bytes::from(bytes), correlation_id, 0, 1)
}

/// An endpoint nothing listens on.
async fn dead_endpoint() -> Endpoint {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::resolve("127.0.0.1", port).unwrap()
}

#[tokio::test]
async fn echo_roundtrip() {
    let server = MockServer::start(MockServer::echo()).await.unwrap();
    let transport = KafkaTransport::new(server.endpoint(), fast_options()).unwrap();

    let data: Vec<u8> = (0..64).collect();
    let written = timeout(Duration::from_secs(5), transport.write(payload(data.clone(), 1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(written.buffer.len(), 64);
    assert_eq!(written.correlation_id, 1);

    let echoed = timeout(Duration::from_secs(5), transport.read(64))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed, Bytes::from(data));

    transport.shutdown().await;
}

#[tokio::test]
async fn split_read_accumulates_all_bytes() {
    let first: Vec<u8> = (0..40).collect();
    let second: Vec<u8> = (40..100).collect();
    let server = MockServer::start(MockServer::send_chunks(vec![
        (Duration::ZERO, first),
        (Duration::from_millis(150), second),
    ]))
    .await
    .unwrap();

    let transport = KafkaTransport::new(server.endpoint(), fast_options()).unwrap();

    let chunks = Arc::new(Mutex::new(Vec::new()));
    {
        let chunks = Arc::clone(&chunks);
        transport.on_bytes_received(move |n| chunks.lock().unwrap().push(n));
    }

    let received = timeout(Duration::from_secs(5), transport.read(100))
        .await
        .unwrap()
        .unwrap();

    let expected: Vec<u8> = (0..100).collect();
    assert_eq!(received, Bytes::from(expected));

    let chunks = chunks.lock().unwrap();
    assert!(
        chunks.len() >= 2,
        "expected at least two socket reads, got {chunks:?}"
    );
    assert_eq!(chunks.iter().sum::<usize>(), 100);

    transport.shutdown().await;
}

#[tokio::test]
async fn mid_stream_disconnect_fails_read_and_reconnects() {
    let server = MockServer::start(MockServer::send_then_close((0..30).collect()))
        .await
        .unwrap();

    let transport = KafkaTransport::new(server.endpoint(), fast_options()).unwrap();

    let disconnects = Arc::new(AtomicUsize::new(0));
    {
        let disconnects = Arc::clone(&disconnects);
        transport.on_server_disconnected(move || {
            disconnects.fetch_add(1, Ordering::SeqCst);
        });
    }

    let result = timeout(Duration::from_secs(5), transport.read(100))
        .await
        .unwrap();
    assert!(
        matches!(result, Err(TransportError::ServerDisconnected)),
        "read should fail on disconnect, got {result:?}"
    );

    // The loop must begin reconnecting on its own.
    timeout(Duration::from_secs(2), async {
        while server.connection_count() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("transport should reconnect after the disconnect");

    assert_eq!(disconnects.load(Ordering::SeqCst), 1);

    transport.shutdown().await;
}

#[tokio::test]
async fn refused_connections_keep_backoff_attempts_coming() {
    let endpoint = dead_endpoint().await;

    let attempts = Arc::new(Mutex::new(Vec::new()));
    let transport = KafkaTransport::new(endpoint, fast_options()).unwrap();
    {
        let attempts = Arc::clone(&attempts);
        transport.on_reconnection_attempt(move |n| attempts.lock().unwrap().push(n));
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    let count_then = attempts.lock().unwrap().len();
    assert!(
        count_then >= 5,
        "expected several capped attempts, got {count_then}"
    );

    // Attempts keep coming once the delay has hit the cap.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let count_now = attempts.lock().unwrap().len();
    assert!(count_now > count_then, "attempts must continue at the cap");

    // Attempt numbers count up within one reconnect sequence. The first
    // attempt may fire before the subscription lands, so only the relative
    // ordering is asserted.
    let recorded = attempts.lock().unwrap();
    for pair in recorded.windows(2) {
        assert_eq!(pair[1], pair[0] + 1);
    }
    drop(recorded);

    transport.shutdown().await;
}

#[tokio::test]
async fn attempt_counter_restarts_after_each_successful_connect() {
    // The server hands every connection 5 bytes and closes it, so each
    // pending read tears the session down and forces a fresh connect.
    let server = MockServer::start(MockServer::send_then_close(vec![9u8; 5]))
        .await
        .unwrap();
    let transport = KafkaTransport::new(server.endpoint(), fast_options()).unwrap();

    let attempts = Arc::new(Mutex::new(Vec::new()));
    {
        let attempts = Arc::clone(&attempts);
        transport.on_reconnection_attempt(move |n| attempts.lock().unwrap().push(n));
    }

    for _ in 0..2 {
        let result = timeout(Duration::from_secs(5), transport.read(50))
            .await
            .unwrap();
        assert!(matches!(result, Err(TransportError::ServerDisconnected)));
    }

    // Every session connected on its first attempt, so the counter (and
    // with it the backoff sequence) restarted each time.
    let recorded = attempts.lock().unwrap();
    assert!(
        recorded.iter().filter(|&&n| n == 1).count() >= 2,
        "expected repeated first attempts, got {recorded:?}"
    );
    drop(recorded);

    transport.shutdown().await;
}

#[tokio::test]
async fn dispose_while_idle_is_prompt_and_terminal() {
    let server = MockServer::start(MockServer::silent()).await.unwrap();
    let transport = KafkaTransport::new(server.endpoint(), fast_options()).unwrap();

    // Let the first connect land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    timeout(Duration::from_secs(1), transport.shutdown())
        .await
        .expect("idle shutdown should be prompt");

    let result = transport.read(10).await;
    assert!(matches!(result, Err(TransportError::Disposed)));

    let result = transport.write(payload(vec![1, 2, 3], 7)).await;
    assert!(matches!(result, Err(TransportError::Disposed)));

    // Idempotent.
    timeout(Duration::from_secs(1), transport.shutdown())
        .await
        .unwrap();
}

#[tokio::test]
async fn dispose_during_long_read_fails_it_with_disposed() {
    let server = MockServer::start(MockServer::silent()).await.unwrap();
    let transport = KafkaTransport::new(server.endpoint(), fast_options()).unwrap();

    let reader = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.read(10 * 1024 * 1024).await })
    };

    // Let the read go in flight against the silent server.
    tokio::time::sleep(Duration::from_millis(100)).await;

    timeout(Duration::from_secs(5), transport.shutdown())
        .await
        .expect("shutdown must not hang on an in-flight read");

    let result = timeout(Duration::from_secs(5), reader).await.unwrap().unwrap();
    assert!(
        matches!(result, Err(TransportError::Disposed)),
        "in-flight read must fail with Disposed, got {result:?}"
    );
}

#[tokio::test]
async fn writes_hit_the_socket_in_enqueue_order() {
    let server = MockServer::start(MockServer::echo()).await.unwrap();
    let transport = KafkaTransport::new(server.endpoint(), fast_options()).unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    {
        let order = Arc::clone(&order);
        transport.on_write_to_socket_attempt(move |p| {
            order.lock().unwrap().push(p.correlation_id);
        });
    }

    let (first, second) = tokio::join!(
        transport.write(payload(vec![1u8; 32], 1)),
        transport.write(payload(vec![2u8; 32], 2)),
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(*order.lock().unwrap(), vec![1, 2]);

    transport.shutdown().await;
}

#[tokio::test]
async fn cancelled_before_start_completes_cancelled() {
    let server = MockServer::start(MockServer::silent()).await.unwrap();
    let transport = KafkaTransport::new(server.endpoint(), fast_options()).unwrap();

    let token = CancellationToken::new();
    token.cancel();

    let result = timeout(
        Duration::from_secs(5),
        transport.read_with_cancel(100, token),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(TransportError::Cancelled)));

    transport.shutdown().await;
}

#[tokio::test]
async fn cancelling_an_idle_in_flight_read_keeps_the_session() {
    let server = MockServer::start(MockServer::silent()).await.unwrap();
    let transport = KafkaTransport::new(server.endpoint(), fast_options()).unwrap();

    let token = CancellationToken::new();
    let reader = {
        let transport = transport.clone();
        let token = token.clone();
        tokio::spawn(async move { transport.read_with_cancel(100, token).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let result = timeout(Duration::from_secs(5), reader).await.unwrap().unwrap();
    assert!(matches!(result, Err(TransportError::Cancelled)));

    // No bytes were consumed, so the connection survives the cancellation.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.connection_count(), 1);

    transport.shutdown().await;
}

#[tokio::test]
async fn zero_size_read_is_rejected() {
    let server = MockServer::start(MockServer::silent()).await.unwrap();
    let transport = KafkaTransport::new(server.endpoint(), fast_options()).unwrap();

    let result = transport.read(0).await;
    assert!(matches!(result, Err(TransportError::InvalidRequest(_))));

    transport.shutdown().await;
}

#[tokio::test]
async fn endpoint_accessor_reports_identity() {
    let server = MockServer::start(MockServer::silent()).await.unwrap();
    let endpoint = server.endpoint();
    let transport = KafkaTransport::new(endpoint.clone(), fast_options()).unwrap();

    assert_eq!(transport.endpoint(), &endpoint);
    assert_eq!(transport.endpoint().host(), "127.0.0.1");

    transport.shutdown().await;
}
