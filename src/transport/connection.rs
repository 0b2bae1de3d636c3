//! Framed TCP duplex channel to one peer worker.
//!
//! Wire format is `[tag: u64 LE][len: u64 LE][payload]`. A background
//! task owns the read half and routes each frame into a per-tag channel,
//! so concurrent reductions on different buckets never block each other.
//! Frames arriving before anyone asked for their tag are buffered until a
//! receiver registers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::error::{Result, SyncraError};
use crate::types::Rank;

type TaggedReceiverMap = HashMap<u64, Arc<Mutex<mpsc::Receiver<Vec<u8>>>>>;

/// Shared state between the recv loop and the channel.
///
/// When a tagged frame arrives before `recv` has been called for that
/// tag, the payload is buffered in `pending`. When a receiver registers,
/// pending payloads are flushed into the new channel in arrival order.
#[derive(Debug)]
struct RecvState {
    senders: HashMap<u64, mpsc::Sender<Vec<u8>>>,
    pending: HashMap<u64, Vec<Vec<u8>>>,
    /// Set when the recv loop exits. Frames buffered in `pending` stay
    /// claimable, but new receivers observe the closure after draining.
    closed: bool,
}

/// Upper bound on a single frame. Anything larger is a corrupt header.
const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024 * 1024;

/// One established connection in the worker mesh.
#[derive(Debug)]
pub struct PeerChannel {
    peer: Rank,
    writer: Mutex<tokio::io::WriteHalf<TcpStream>>,
    /// Shared state with the recv loop (senders + pending buffer).
    state: Arc<Mutex<RecvState>>,
    /// Per-tag receivers, each independently lockable so concurrent tags
    /// don't block.
    tagged_rx: Mutex<TaggedReceiverMap>,
    _recv_handle: tokio::task::JoinHandle<()>,
}

impl PeerChannel {
    /// Wrap an already-connected stream to `peer`.
    pub fn from_stream(peer: Rank, stream: TcpStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);

        let state = Arc::new(Mutex::new(RecvState {
            senders: HashMap::new(),
            pending: HashMap::new(),
            closed: false,
        }));

        let recv_state = Arc::clone(&state);
        let recv_handle = tokio::spawn(async move {
            recv_loop(peer, reader, recv_state).await;
        });

        Self {
            peer,
            writer: Mutex::new(writer),
            state,
            tagged_rx: Mutex::new(HashMap::new()),
            _recv_handle: recv_handle,
        }
    }

    pub fn peer(&self) -> Rank {
        self.peer
    }

    /// Send one tagged frame.
    pub async fn send(&self, tag: u64, data: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&tag.to_le_bytes())
            .await
            .map_err(|e| SyncraError::transport(format!("write tag to rank {}: {e}", self.peer)))?;
        writer
            .write_all(&(data.len() as u64).to_le_bytes())
            .await
            .map_err(|e| SyncraError::transport(format!("write len to rank {}: {e}", self.peer)))?;
        writer
            .write_all(data)
            .await
            .map_err(|e| {
                SyncraError::transport(format!("write payload to rank {}: {e}", self.peer))
            })?;
        writer
            .flush()
            .await
            .map_err(|e| SyncraError::transport(format!("flush to rank {}: {e}", self.peer)))?;
        Ok(())
    }

    /// Receive the next frame carrying `tag`.
    pub async fn recv(&self, tag: u64) -> Result<Vec<u8>> {
        let rx_arc = self.get_tag_receiver(tag).await;
        let payload = rx_arc.lock().await.recv().await;
        payload.ok_or(SyncraError::PeerDisconnected { rank: self.peer })
    }

    /// Get or create a per-tag receiver, flushing buffered frames.
    async fn get_tag_receiver(&self, tag: u64) -> Arc<Mutex<mpsc::Receiver<Vec<u8>>>> {
        // Fast path: already registered.
        {
            let map = self.tagged_rx.lock().await;
            if let Some(rx) = map.get(&tag) {
                return Arc::clone(rx);
            }
        }
        // Slow path: create channel, register sender, then flush pending
        // outside the lock.
        let (tx, rx) = mpsc::channel(64);
        let flush_tx = tx.clone();
        let pending_data = {
            let mut st = self.state.lock().await;
            let pending = st.pending.remove(&tag);
            if !st.closed {
                st.senders.insert(tag, tx);
            }
            pending
        };
        if let Some(data_vec) = pending_data {
            for data in data_vec {
                let _ = flush_tx.send(data).await;
            }
        }
        let rx_arc = Arc::new(Mutex::new(rx));
        self.tagged_rx.lock().await.insert(tag, Arc::clone(&rx_arc));
        rx_arc
    }
}

/// Background loop: read frames and route them by tag.
async fn recv_loop(
    peer: Rank,
    mut reader: tokio::io::ReadHalf<TcpStream>,
    state: Arc<Mutex<RecvState>>,
) {
    let mut tag_buf = [0u8; 8];
    let mut len_buf = [0u8; 8];
    loop {
        if let Err(e) = reader.read_exact(&mut tag_buf).await {
            debug!(peer, "recv loop ended: {e}");
            break;
        }
        if let Err(e) = reader.read_exact(&mut len_buf).await {
            debug!(peer, "recv loop ended reading len: {e}");
            break;
        }
        let tag = u64::from_le_bytes(tag_buf);
        let len = u64::from_le_bytes(len_buf) as usize;

        if len > MAX_FRAME_SIZE {
            warn!(peer, len, "frame too large, closing connection");
            break;
        }

        let mut payload = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut payload).await {
            debug!(peer, "recv loop ended reading payload: {e}");
            break;
        }

        // Clone the sender outside the lock so it is not held across the
        // channel send await.
        let tx = {
            let st = state.lock().await;
            st.senders.get(&tag).cloned()
        };
        if let Some(tx) = tx {
            if tx.send(payload).await.is_err() {
                break;
            }
        } else {
            let mut st = state.lock().await;
            st.pending.entry(tag).or_default().push(payload);
        }
    }

    // Drop every registered sender so waiting receivers observe the
    // disconnect once they drain what already arrived.
    let mut st = state.lock().await;
    st.closed = true;
    st.senders.clear();
}

/// Bind a listener for mesh formation and report the bound address.
pub async fn listen(addr: SocketAddr) -> Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| SyncraError::transport(format!("listen on {addr}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| SyncraError::transport(format!("local_addr: {e}")))?;
    Ok((listener, local))
}

/// Dial a peer, send the 4-byte rank hello, and wrap the stream.
pub async fn connect_peer(addr: SocketAddr, local_rank: Rank, peer: Rank) -> Result<PeerChannel> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| SyncraError::ConnectionFailed {
            rank: peer,
            reason: format!("connect to {addr}: {e}"),
        })?;
    stream
        .set_nodelay(true)
        .map_err(|e| SyncraError::transport(format!("set_nodelay: {e}")))?;
    stream
        .write_all(&local_rank.to_le_bytes())
        .await
        .map_err(|e| SyncraError::ConnectionFailed {
            rank: peer,
            reason: format!("rank hello: {e}"),
        })?;
    Ok(PeerChannel::from_stream(peer, stream))
}

/// Accept one inbound peer and learn its rank from the hello.
pub async fn accept_peer(listener: &TcpListener) -> Result<PeerChannel> {
    let (mut stream, _addr) = listener
        .accept()
        .await
        .map_err(|e| SyncraError::transport(format!("accept: {e}")))?;
    stream
        .set_nodelay(true)
        .map_err(|e| SyncraError::transport(format!("set_nodelay: {e}")))?;
    let mut hello = [0u8; 4];
    stream
        .read_exact(&mut hello)
        .await
        .map_err(|e| SyncraError::transport(format!("rank hello: {e}")))?;
    let rank = Rank::from_le_bytes(hello);
    Ok(PeerChannel::from_stream(rank, stream))
}
