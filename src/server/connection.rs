//! Per-client connection: RESP framing, MULTI/EXEC queueing, dispatch.

use crate::backend::MemoryBackend;
use crate::clock::Clock;
use crate::redis::{Command, RespParser, RespValue};
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

const EXECABORT_REPLY: &str = "EXECABORT Transaction discarded because of previous errors.";

/// Commands queued between MULTI and EXEC.
#[derive(Default)]
struct Transaction {
    queued: Vec<Command>,
    /// A command failed to parse while queueing; EXEC must refuse
    aborted: bool,
}

pub struct ConnectionHandler<C: Clock> {
    stream: TcpStream,
    backend: MemoryBackend<C>,
    buffer: BytesMut,
    peer: SocketAddr,
    transaction: Option<Transaction>,
}

impl<C: Clock> ConnectionHandler<C> {
    pub fn new(stream: TcpStream, backend: MemoryBackend<C>, peer: SocketAddr) -> Self {
        ConnectionHandler {
            stream,
            backend,
            buffer: BytesMut::with_capacity(4096),
            peer,
            transaction: None,
        }
    }

    pub async fn run(mut self) {
        debug!(peer = %self.peer, "client connected");
        let _ = self.stream.set_nodelay(true);

        loop {
            match self.stream.read_buf(&mut self.buffer).await {
                Ok(0) => {
                    debug!(peer = %self.peer, "client disconnected");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "read failed");
                    break;
                }
            }

            // Answer every complete frame in the buffer with one write.
            let mut out = BytesMut::new();
            let mut close = false;
            loop {
                match RespParser::parse_buf(&mut self.buffer) {
                    Ok(Some(frame)) => {
                        let reply = self.handle_frame(&frame);
                        RespParser::encode_into(&reply, &mut out);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(peer = %self.peer, error = %e, "malformed request, closing");
                        RespParser::encode_into(
                            &RespValue::err(format!("ERR Protocol error: {}", e)),
                            &mut out,
                        );
                        close = true;
                        break;
                    }
                }
            }

            if !out.is_empty() {
                if let Err(e) = self.stream.write_all(&out).await {
                    warn!(peer = %self.peer, error = %e, "write failed");
                    break;
                }
            }
            if close {
                break;
            }
        }
    }

    fn handle_frame(&mut self, frame: &RespValue) -> RespValue {
        match Command::from_resp(frame) {
            Ok(cmd) => self.handle_command(cmd),
            Err(e) => {
                if let Some(tx) = self.transaction.as_mut() {
                    tx.aborted = true;
                }
                RespValue::err(if e.starts_with("ERR ") {
                    e
                } else {
                    format!("ERR {}", e)
                })
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) -> RespValue {
        let Some(tx) = self.transaction.as_mut() else {
            return match cmd {
                Command::Multi => {
                    self.transaction = Some(Transaction::default());
                    RespValue::ok()
                }
                Command::Exec => RespValue::err("ERR EXEC without MULTI"),
                Command::Discard => RespValue::err("ERR DISCARD without MULTI"),
                cmd => self.backend.execute(&cmd),
            };
        };

        match cmd {
            Command::Multi => RespValue::err("ERR MULTI calls can not be nested"),
            Command::Exec => {
                let tx = std::mem::take(tx);
                self.transaction = None;
                if tx.aborted {
                    RespValue::err(EXECABORT_REPLY)
                } else {
                    self.backend.execute_batch(&tx.queued)
                }
            }
            Command::Discard => {
                self.transaction = None;
                RespValue::ok()
            }
            cmd => {
                tx.queued.push(cmd);
                RespValue::queued()
            }
        }
    }
}
