//! Per-worker handle to the formed mesh.
//!
//! A `SyncraClient` owns one `PeerChannel` per remote rank plus the run
//! configuration. Collectives borrow the client and address peers by
//! rank; everything stateful about a reduction lives in tags, not in the
//! client.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::config::SyncraConfig;
use crate::error::{Result, SyncraError};
use crate::transport::mesh;
use crate::transport::PeerChannel;
use crate::types::Rank;

#[derive(Debug)]
pub struct SyncraClient {
    rank: Rank,
    world_size: u32,
    config: SyncraConfig,
    peers: HashMap<Rank, PeerChannel>,
}

impl SyncraClient {
    /// Create a client from pre-established peer channels.
    pub fn new(
        rank: Rank,
        world_size: u32,
        peers: HashMap<Rank, PeerChannel>,
        config: SyncraConfig,
    ) -> Self {
        Self {
            rank,
            world_size,
            config,
            peers,
        }
    }

    /// Form an in-process mesh and return one client per rank.
    ///
    /// The harness for tests and single-host runs where each worker is a
    /// tokio task.
    pub async fn connect_local(world_size: u32, config: SyncraConfig) -> Result<Vec<SyncraClient>> {
        config.validate()?;
        let meshes = mesh::form_local(world_size).await?;
        Ok(meshes
            .into_iter()
            .enumerate()
            .map(|(rank, peers)| Self::new(rank as Rank, world_size, peers, config.clone()))
            .collect())
    }

    /// Join an addressed mesh as `rank`, where `addrs[r]` is rank `r`'s
    /// listen address.
    pub async fn connect_mesh(
        rank: Rank,
        addrs: &[SocketAddr],
        config: SyncraConfig,
    ) -> Result<SyncraClient> {
        config.validate()?;
        let peers = mesh::form_mesh(rank, addrs, config.formation_timeout).await?;
        Ok(Self::new(rank, addrs.len() as u32, peers, config))
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    pub fn config(&self) -> &SyncraConfig {
        &self.config
    }

    pub(crate) fn peer(&self, rank: Rank) -> Result<&PeerChannel> {
        self.peers.get(&rank).ok_or(SyncraError::UnknownPeer { rank })
    }

    /// Send one tagged frame to a peer.
    pub(crate) async fn send_bytes(&self, to: Rank, tag: u64, data: &[u8]) -> Result<()> {
        self.peer(to)?.send(tag, data).await
    }

    /// Receive the next frame carrying `tag` from a peer.
    pub(crate) async fn recv_bytes(&self, from: Rank, tag: u64) -> Result<Vec<u8>> {
        self.peer(from)?.recv(tag).await
    }
}
