//! UDP transport (C7, spec §7): receive datagrams, dispatch through the
//! raw middleware stack bounded by a worker-pool semaphore, reply, and
//! truncate replies that would exceed the negotiated message size.

use crate::codec::WireCodec;
use crate::middleware::raw::RawStack;
use crate::settings::Settings;
use anyhow::Result;
use log::{debug, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;

/// Largest UDP datagram this transport will attempt to read. Distinct from
/// `Settings::udp_max_message_bytes`, which bounds the *reply*; EDNS0
/// requesters may legitimately send up to the traditional 64 KiB maximum.
const MAX_DATAGRAM_BYTES: usize = 65_527;

pub async fn serve(
    addr: SocketAddr,
    codec: Arc<dyn WireCodec>,
    stack: Arc<RawStack>,
    settings: &Settings,
) -> Result<()> {
    let socket = Arc::new(UdpSocket::bind(addr).await?);
    let semaphore = Arc::new(Semaphore::new(settings.worker_count.max(1)));
    let max_reply_bytes = settings.udp_max_message_bytes;
    let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];

    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        let datagram = buf[..len].to_vec();

        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .expect("udp worker semaphore never closes");
        let socket = Arc::clone(&socket);
        let codec = Arc::clone(&codec);
        let stack = Arc::clone(&stack);

        tokio::spawn(async move {
            let _permit = permit;
            handle_datagram(datagram, peer, socket, codec, stack, max_reply_bytes).await;
        });
    }
}

async fn handle_datagram(
    datagram: Vec<u8>,
    peer: SocketAddr,
    socket: Arc<UdpSocket>,
    codec: Arc<dyn WireCodec>,
    stack: Arc<RawStack>,
    max_reply_bytes: usize,
) {
    let record = match codec.parse(&datagram) {
        Ok(record) => record,
        Err(error) => {
            debug!("discarding malformed datagram from {peer}: {error}");
            return;
        }
    };

    let reply = match stack.run(record).await {
        Ok(reply) => reply,
        Err(error) => {
            warn!("unhandled raw error from {peer}: {error}");
            return;
        }
    };

    let wire = match codec.serialize(&reply) {
        Ok(wire) => wire,
        Err(error) => {
            warn!("failed to serialize reply to {peer}: {error}");
            return;
        }
    };

    let wire = if wire.len() > max_reply_bytes {
        let truncated = codec.mark_truncated(&reply);
        match codec.serialize(&truncated) {
            Ok(truncated_wire) => truncated_wire,
            Err(error) => {
                warn!("failed to serialize truncated reply to {peer}: {error}");
                return;
            }
        }
    } else {
        wire
    };

    if let Err(error) = socket.send_to(&wire, peer).await {
        warn!("failed to send reply to {peer}: {error}");
    }
}
