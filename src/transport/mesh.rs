//! Full-mesh formation between training workers.
//!
//! Every pair of workers holds one TCP connection. For a pair `(i, j)`
//! with `i < j`, rank `i` accepts and rank `j` dials, so the two sides
//! never race. Dials carry a 4-byte rank hello that tells the acceptor
//! who arrived.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::error::{Result, SyncraError};
use crate::transport::connection::{self, PeerChannel};
use crate::types::Rank;

/// Form an in-process mesh of `world_size` workers over loopback.
///
/// Returns one peer map per rank. This is the harness for tests and
/// single-host multi-worker runs, where each worker lives on its own
/// tokio task rather than its own process.
pub async fn form_local(world_size: u32) -> Result<Vec<HashMap<Rank, PeerChannel>>> {
    if world_size == 0 {
        return Err(SyncraError::configuration("world size must be at least 1"));
    }
    let n = world_size as usize;
    let mut all: Vec<HashMap<Rank, PeerChannel>> = (0..n).map(|_| HashMap::new()).collect();

    for i in 0..n {
        for j in (i + 1)..n {
            let loopback = SocketAddr::from(([127, 0, 0, 1], 0));
            let (listener, addr) = connection::listen(loopback).await?;
            let (chan_i, chan_j) = tokio::try_join!(
                connection::accept_peer(&listener),
                connection::connect_peer(addr, j as Rank, i as Rank),
            )?;
            all[i].insert(j as Rank, chan_i);
            all[j].insert(i as Rank, chan_j);
        }
    }

    info!(world_size, "local mesh formed");
    Ok(all)
}

/// Join an addressed mesh as `rank`.
///
/// `addrs[r]` is rank `r`'s listen address; this worker binds its own
/// slot, dials every lower rank, and accepts from every higher rank.
/// Lower-rank listeners may not be up yet when we dial, so refused
/// connections retry with backoff until `formation_timeout` elapses.
pub async fn form_mesh(
    rank: Rank,
    addrs: &[SocketAddr],
    formation_timeout: Duration,
) -> Result<HashMap<Rank, PeerChannel>> {
    let world = addrs.len() as u32;
    if rank >= world {
        return Err(SyncraError::InvalidRank {
            rank,
            world_size: world,
        });
    }
    if world == 1 {
        return Ok(HashMap::new());
    }

    let (listener, _local) = connection::listen(addrs[rank as usize]).await?;
    let joined = Arc::new(AtomicU32::new(1)); // ourselves

    let formed = tokio::time::timeout(formation_timeout, async {
        let accept_joined = Arc::clone(&joined);
        let accept_fut = async {
            let mut inbound = Vec::new();
            for _ in (rank + 1)..world {
                let chan = connection::accept_peer(&listener).await?;
                debug!(rank, peer = chan.peer(), "accepted mesh peer");
                accept_joined.fetch_add(1, Ordering::Relaxed);
                inbound.push(chan);
            }
            Ok::<_, SyncraError>(inbound)
        };

        let connect_fut = try_join_all((0..rank).map(|peer| {
            let dial_joined = Arc::clone(&joined);
            async move {
                let chan = connect_with_retry(addrs[peer as usize], rank, peer).await?;
                debug!(rank, peer, "dialed mesh peer");
                dial_joined.fetch_add(1, Ordering::Relaxed);
                Ok::<_, SyncraError>(chan)
            }
        }));

        tokio::try_join!(accept_fut, connect_fut)
    })
    .await;

    let (inbound, outbound) = match formed {
        Ok(result) => result?,
        Err(_elapsed) => {
            return Err(SyncraError::MeshFormationTimeout {
                joined: joined.load(Ordering::Relaxed),
                expected: world,
            });
        }
    };

    let mut peers = HashMap::new();
    for chan in inbound.into_iter().chain(outbound) {
        peers.insert(chan.peer(), chan);
    }
    for r in 0..world {
        if r != rank && !peers.contains_key(&r) {
            return Err(SyncraError::UnknownPeer { rank: r });
        }
    }

    info!(rank, world, "mesh formed");
    Ok(peers)
}

async fn connect_with_retry(addr: SocketAddr, local: Rank, peer: Rank) -> Result<PeerChannel> {
    let mut delay = Duration::from_millis(50);
    loop {
        match connection::connect_peer(addr, local, peer).await {
            Ok(chan) => return Ok(chan),
            // The peer's listener may simply not be bound yet.
            Err(SyncraError::ConnectionFailed { .. }) => {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(1));
            }
            Err(e) => return Err(e),
        }
    }
}
