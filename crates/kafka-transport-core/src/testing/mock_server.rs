//! Mock broker socket for integration testing.
//!
//! A lightweight TCP server that:
//! - Accepts connections and counts them
//! - Runs a configurable per-connection script
//! - Shuts down cleanly on request
//!
//! Unlike a protocol-level mock, the scripts here speak raw bytes: the
//! transport under test treats payloads as opaque, so the scenarios do too.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use crate::config::Endpoint;

/// Per-connection behaviour. Invoked once for every accepted socket.
pub type ConnectionScript =
    Arc<dyn Fn(TcpStream) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Mock broker socket for testing.
pub struct MockServer {
    local_addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl MockServer {
    /// Start a server on an ephemeral local port running `script` for each
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn start(script: ConnectionScript) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let connections = Arc::new(AtomicUsize::new(0));

        let accepted = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    result = listener.accept() => match result {
                        Ok((stream, _addr)) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                            tokio::spawn(script(stream));
                        }
                        Err(_) => break,
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            connections,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// The endpoint clients should connect to.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::resolve("127.0.0.1", self.local_addr.port())
            .expect("loopback endpoint always resolves")
    }

    /// Number of connections accepted so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Stop accepting connections. Established sockets run their scripts to
    /// completion.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Script: echo every received byte back to the client.
    #[must_use]
    pub fn echo() -> ConnectionScript {
        Arc::new(|mut stream| {
            Box::pin(async move {
                let mut buf = vec![0u8; 16 * 1024];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        })
    }

    /// Script: send each chunk after its delay, then hold the connection
    /// open until the client goes away.
    #[must_use]
    pub fn send_chunks(chunks: Vec<(Duration, Vec<u8>)>) -> ConnectionScript {
        let chunks = Arc::new(chunks);
        Arc::new(move |mut stream| {
            let chunks = Arc::clone(&chunks);
            Box::pin(async move {
                for (delay, chunk) in chunks.iter() {
                    tokio::time::sleep(*delay).await;
                    if stream.write_all(chunk).await.is_err() {
                        return;
                    }
                }
                hold_open(stream).await;
            })
        })
    }

    /// Script: send `data`, then close the connection.
    #[must_use]
    pub fn send_then_close(data: Vec<u8>) -> ConnectionScript {
        let data = Arc::new(data);
        Arc::new(move |mut stream| {
            let data = Arc::clone(&data);
            Box::pin(async move {
                let _ = stream.write_all(&data).await;
                let _ = stream.flush().await;
                // Dropping the stream closes the socket.
            })
        })
    }

    /// Script: never send anything; hold the connection open until the
    /// client goes away.
    #[must_use]
    pub fn silent() -> ConnectionScript {
        Arc::new(|stream| Box::pin(hold_open(stream)))
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drain the socket until the peer disconnects, discarding input.
async fn hold_open(mut stream: TcpStream) {
    let mut buf = vec![0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_echo_script() {
        let mut server = MockServer::start(MockServer::echo()).await.unwrap();

        let mut client = TcpStream::connect(server.endpoint().addr()).await.unwrap();
        client.write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 4];
        timeout(Duration::from_secs(1), client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"ping");
        assert_eq!(server.connection_count(), 1);

        server.stop();
    }

    #[tokio::test]
    async fn test_send_then_close_script() {
        let server = MockServer::start(MockServer::send_then_close(vec![1, 2, 3]))
            .await
            .unwrap();

        let mut client = TcpStream::connect(server.endpoint().addr()).await.unwrap();
        let mut received = Vec::new();
        timeout(Duration::from_secs(1), client.read_to_end(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_connection_counting() {
        let server = MockServer::start(MockServer::silent()).await.unwrap();

        let c1 = TcpStream::connect(server.endpoint().addr()).await.unwrap();
        let c2 = TcpStream::connect(server.endpoint().addr()).await.unwrap();

        // Accepts happen on the server task; poll briefly.
        timeout(Duration::from_secs(1), async {
            while server.connection_count() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        drop(c1);
        drop(c2);
    }
}
