//! Loopback RESP server over a [`MemoryBackend`].
//!
//! Speaks the subset of the Redis protocol the store issues, so a
//! [`RemoteBackend`](crate::backend::RemoteBackend) can be pointed at it in
//! tests and local runs without an external server. One task per connection,
//! one shared keyspace, and a background sweep of expired keys.

mod connection;
mod ttl_manager;

pub use connection::ConnectionHandler;
pub use ttl_manager::TtlManager;

use crate::backend::MemoryBackend;
use crate::clock::{Clock, SystemClock};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Period of the expired-key sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

pub struct LoopbackServer<C: Clock = SystemClock> {
    addr: String,
    backend: MemoryBackend<C>,
    sweep_interval: Duration,
}

impl LoopbackServer<SystemClock> {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_backend(addr, MemoryBackend::new())
    }
}

impl<C: Clock> LoopbackServer<C> {
    pub fn with_backend(addr: impl Into<String>, backend: MemoryBackend<C>) -> Self {
        LoopbackServer {
            addr: addr.into(),
            backend,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        debug_assert!(!interval.is_zero(), "Precondition: sweep interval must be non-zero");
        self.sweep_interval = interval;
        self
    }

    pub fn backend(&self) -> &MemoryBackend<C> {
        &self.backend
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn run(self) -> io::Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        self.serve(listener, std::future::pending()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr()?;
        info!(addr = %local, "loopback server listening");

        let sweeper = TtlManager::new(self.backend.clone(), self.sweep_interval);
        let sweep_task = tokio::spawn(sweeper.run());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = ConnectionHandler::new(stream, self.backend.clone(), peer);
                        tokio::spawn(handler.run());
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                    }
                },
            }
        }

        sweep_task.abort();
        info!(addr = %local, "loopback server stopped");
        Ok(())
    }
}

/// A loopback server running on its own thread and runtime.
///
/// Dropping the handle stops the server and joins the thread.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(addr = %self.addr, "loopback server thread panicked");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind `addr` (port 0 picks a free port) and serve `backend` from a
/// background thread. The socket is bound before this returns, so clients may
/// connect to [`ServerHandle::addr`] immediately.
pub fn spawn_background<C: Clock>(addr: &str, backend: MemoryBackend<C>) -> io::Result<ServerHandle> {
    let std_listener = std::net::TcpListener::bind(addr)?;
    std_listener.set_nonblocking(true)?;
    let local = std_listener.local_addr()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("tierstore-loopback")
        .enable_all()
        .build()?;

    let (tx, rx) = oneshot::channel::<()>();
    let server = LoopbackServer::with_backend(local.to_string(), backend);

    let thread = std::thread::Builder::new()
        .name("tierstore-loopback".into())
        .spawn(move || {
            let result = runtime.block_on(async move {
                let listener = TcpListener::from_std(std_listener)?;
                server
                    .serve(listener, async {
                        let _ = rx.await;
                    })
                    .await
            });
            if let Err(e) = result {
                error!(error = %e, "loopback server failed");
            }
        })?;

    Ok(ServerHandle {
        addr: local,
        shutdown: Some(tx),
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redis::{Command, RespParser, RespValue};
    use std::io::{Read, Write};
    use std::net::TcpStream;

    fn send(stream: &mut TcpStream, parts: &[&str]) -> RespValue {
        let request = RespParser::encode(&RespValue::command(parts));
        stream.write_all(&request).unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            if let Some((value, _)) = RespParser::parse(&buf).unwrap() {
                return value;
            }
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "server closed the connection");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn connect(handle: &ServerHandle) -> TcpStream {
        let stream = TcpStream::connect(handle.addr()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    #[test]
    fn test_ping_and_set_get() {
        let handle = spawn_background("127.0.0.1:0", MemoryBackend::new()).unwrap();
        let mut stream = connect(&handle);

        assert_eq!(send(&mut stream, &["PING"]), RespValue::simple("PONG"));
        assert_eq!(send(&mut stream, &["SET", "k", "v"]), RespValue::ok());
        assert_eq!(send(&mut stream, &["GET", "k"]), RespValue::bulk("v"));
    }

    #[test]
    fn test_multi_exec_applies_queue() {
        let backend = MemoryBackend::new();
        let handle = spawn_background("127.0.0.1:0", backend.clone()).unwrap();
        let mut stream = connect(&handle);

        assert_eq!(send(&mut stream, &["MULTI"]), RespValue::ok());
        assert_eq!(send(&mut stream, &["INCRBY", "c", "5"]), RespValue::queued());
        assert_eq!(send(&mut stream, &["PEXPIRE", "c", "1000"]), RespValue::queued());
        assert_eq!(
            send(&mut stream, &["EXEC"]),
            RespValue::Array(Some(vec![RespValue::Integer(5), RespValue::Integer(1)]))
        );
        assert_eq!(
            backend.execute(&Command::Get("c".into())),
            RespValue::bulk("5")
        );
    }

    #[test]
    fn test_transaction_errors() {
        let handle = spawn_background("127.0.0.1:0", MemoryBackend::new()).unwrap();
        let mut stream = connect(&handle);

        assert!(matches!(send(&mut stream, &["EXEC"]), RespValue::Error(e) if e.contains("without MULTI")));
        assert!(matches!(send(&mut stream, &["DISCARD"]), RespValue::Error(e) if e.contains("without MULTI")));

        send(&mut stream, &["MULTI"]);
        assert!(matches!(send(&mut stream, &["MULTI"]), RespValue::Error(e) if e.contains("nested")));
        assert!(matches!(send(&mut stream, &["BOGUS"]), RespValue::Error(_)));
        assert!(matches!(send(&mut stream, &["EXEC"]), RespValue::Error(e) if e.starts_with("EXECABORT")));

        send(&mut stream, &["MULTI"]);
        send(&mut stream, &["SET", "k", "v"]);
        assert_eq!(send(&mut stream, &["DISCARD"]), RespValue::ok());
        assert_eq!(send(&mut stream, &["GET", "k"]), RespValue::nil());
    }

    #[test]
    fn test_pipelined_requests() {
        let handle = spawn_background("127.0.0.1:0", MemoryBackend::new()).unwrap();
        let mut stream = connect(&handle);

        let mut request = RespParser::encode(&RespValue::command(&["SET", "a", "1"]));
        request.extend(RespParser::encode(&RespValue::command(&["INCR", "a"])));
        stream.write_all(&request).unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 512];
        let mut replies = Vec::new();
        while replies.len() < 2 {
            match RespParser::parse(&buf).unwrap() {
                Some((value, used)) => {
                    replies.push(value);
                    buf.drain(..used);
                }
                None => {
                    let n = stream.read(&mut chunk).unwrap();
                    assert!(n > 0);
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
        assert_eq!(replies, vec![RespValue::ok(), RespValue::Integer(2)]);
    }
}
