//! TCP transport (C8, spec §7): 16-bit length-prefixed framing, pipelined
//! reads (the next request is read before the prior reply has been
//! written), concurrent per-request dispatch, and a connection-local
//! serialized writer so replies may be written out of request order
//! (multiplexing). Read and idle timeouts bound a misbehaving or silent
//! peer; a closed connection cancels its still-running requests.

use crate::codec::{RawRecord, WireCodec};
use crate::middleware::raw::RawStack;
use crate::settings::Settings;
use anyhow::Result;
use log::{debug, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};

pub async fn serve(
    addr: SocketAddr,
    codec: Arc<dyn WireCodec>,
    stack: Arc<RawStack>,
    settings: &Settings,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let read_timeout = settings.tcp_read_timeout;
    let idle_timeout = settings.tcp_idle_timeout;

    loop {
        let (socket, peer) = listener.accept().await?;
        let codec = Arc::clone(&codec);
        let stack = Arc::clone(&stack);
        tokio::spawn(async move {
            if let Err(error) = handle_connection(socket, codec, stack, read_timeout, idle_timeout).await {
                debug!("tcp connection from {peer} ended: {error}");
            }
        });
    }
}

/// Cooperative cancellation for requests still in flight when their
/// connection closes. Not a hard abort (a handler mid-`.await` keeps
/// running); the per-request task simply stops waiting on it and drops
/// the eventual reply, matching spec §7's "observed at the next
/// suspension point, never aborts mid-step".
#[derive(Clone)]
struct Cancellation {
    notify: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn cancelled(&self) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        self.notify.notified().await;
    }
}

async fn handle_connection(
    socket: TcpStream,
    codec: Arc<dyn WireCodec>,
    stack: Arc<RawStack>,
    read_timeout: Duration,
    idle_timeout: Duration,
) -> Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    // Replies are produced out of order (whichever request finishes
    // first); a single writer task serializes them back onto the wire in
    // completion order rather than request order.
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_half.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    let cancellation = Cancellation::new();
    let mut in_flight = tokio::task::JoinSet::new();

    loop {
        let mut len_prefix = [0u8; 2];
        let read = tokio::time::timeout(idle_timeout, reader.read_exact(&mut len_prefix)).await;
        match read {
            Ok(Ok(())) => {}
            Ok(Err(_)) => break, // EOF or reset
            Err(_) => {
                debug!("tcp connection idle for {idle_timeout:?}, closing");
                break;
            }
        }

        let len = u16::from_be_bytes(len_prefix) as usize;
        let mut body = vec![0u8; len];
        match tokio::time::timeout(read_timeout, reader.read_exact(&mut body)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!("tcp read error: {error}");
                break;
            }
            Err(_) => {
                debug!("tcp read timed out after {read_timeout:?}, closing");
                break;
            }
        }

        let codec = Arc::clone(&codec);
        let stack = Arc::clone(&stack);
        let tx = tx.clone();
        let cancellation = cancellation.clone();

        // Spawned rather than awaited inline: the next frame is read off
        // the wire while this one is still being dispatched (pipelining).
        in_flight.spawn(async move {
            let record = match codec.parse(&body) {
                Ok(record) => record,
                Err(error) => {
                    debug!("discarding malformed tcp frame: {error}");
                    return;
                }
            };

            let reply = tokio::select! {
                result = stack.run(record) => match result {
                    Ok(reply) => reply,
                    Err(error) => {
                        warn!("unhandled raw error on tcp connection: {error}");
                        return;
                    }
                },
                _ = cancellation.cancelled() => {
                    debug!("request cancelled: connection closed before dispatch finished");
                    return;
                }
            };

            match codec.serialize(&reply) {
                Ok(wire) => {
                    let mut frame = Vec::with_capacity(wire.len() + 2);
                    frame.extend_from_slice(&(wire.len() as u16).to_be_bytes());
                    frame.extend_from_slice(&wire);
                    let _ = tx.send(frame);
                }
                Err(error) => warn!("failed to serialize tcp reply: {error}"),
            }
        });
    }

    cancellation.cancel();
    drop(tx);
    while in_flight.join_next().await.is_some() {}
    let _ = writer_task.await;

    Ok(())
}
