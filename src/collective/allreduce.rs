//! Segmented ring allreduce over one bucket payload.
//!
//! Scatter-reduce then allgather, N-1 rounds each. Each round's chunk is
//! sent as a train of frames no larger than the caller's segment size.
//! Frames carry their own length, and the receiver drains its lane until
//! the round's chunk is complete, so two ranks chunking with different
//! segment sizes interoperate and the reduced result is bit-for-bit
//! independent of segmentation.

use crate::client::SyncraClient;
use crate::collective::helpers::{reduction_recv, reduction_send};
use crate::error::{Result, SyncraError};
use crate::reduce;
use crate::types::{Rank, GRAD_ELEM_BYTES};

const PHASE_SCATTER: u16 = 0;
const PHASE_GATHER: u16 = 1;

const OPERATION: &str = "ring_allreduce";

/// Pack routing metadata into a frame tag.
///
/// Layout: `[63:48] bucket | [47:32] step | [31:16] ring round | [15:0] phase`
///
/// Concurrent reductions only ever differ in bucket, and within one
/// bucket at most one reduction is outstanding, so the low 16 bits of
/// each field cannot collide between frames that are simultaneously in
/// flight.
fn pack_tag(bucket: usize, step: u64, round: u16, phase: u16) -> u64 {
    (bucket as u64 & 0xFFFF) << 48 | (step & 0xFFFF) << 32 | (round as u64) << 16 | (phase as u64)
}

/// Even division of a payload into per-rank ring chunks, first chunks
/// taking the remainder.
pub(crate) struct ChunkLayout {
    offsets: Vec<usize>,
    lens: Vec<usize>,
}

impl ChunkLayout {
    pub(crate) fn new(count: usize, world: usize) -> Self {
        let base = count / world;
        let rem = count % world;
        let mut offsets = Vec::with_capacity(world);
        let mut lens = Vec::with_capacity(world);
        let mut off = 0;
        for i in 0..world {
            let len = base + usize::from(i < rem);
            offsets.push(off);
            lens.push(len);
            off += len;
        }
        Self { offsets, lens }
    }

    pub(crate) fn offset(&self, i: usize) -> usize {
        self.offsets[i]
    }

    pub(crate) fn len(&self, i: usize) -> usize {
        self.lens[i]
    }
}

/// In-place ring allreduce of `buf` across the mesh, summing element-wise.
///
/// `bucket` and `step` scope the frame tags; the caller guarantees at
/// most one outstanding reduction per bucket. `segment_bytes` is this
/// worker's wire chunking and need not match what peers use.
pub async fn ring_allreduce(
    client: &SyncraClient,
    buf: &mut [f32],
    bucket: usize,
    step: u64,
    segment_bytes: usize,
) -> Result<()> {
    let world = client.world_size() as usize;
    let rank = client.rank() as usize;
    if world <= 1 || buf.is_empty() {
        return Ok(());
    }

    let layout = ChunkLayout::new(buf.len(), world);
    let next = ((rank + 1) % world) as Rank;
    let prev = ((rank + world - 1) % world) as Rank;
    let segment_elems = (segment_bytes / GRAD_ELEM_BYTES).max(1);

    // Phase 1: scatter-reduce. After N-1 rounds every rank holds the
    // full sum for one chunk.
    for round in 0..(world - 1) {
        let send_idx = (rank + world - round) % world;
        let recv_idx = (rank + world - round - 1) % world;
        let tag = pack_tag(bucket, step, round as u16, PHASE_SCATTER);

        let send_off = layout.offset(send_idx);
        let send_snapshot = buf[send_off..send_off + layout.len(send_idx)].to_vec();
        let recv_off = layout.offset(recv_idx);
        let recv_len = layout.len(recv_idx);

        let (_, received) = tokio::try_join!(
            send_chunk(client, next, tag, &send_snapshot, segment_elems, bucket),
            recv_chunk(client, prev, tag, recv_len * GRAD_ELEM_BYTES, bucket),
        )?;
        reduce::add_assign_bytes(&mut buf[recv_off..recv_off + recv_len], &received)?;
    }

    // Phase 2: allgather. Each rank circulates its reduced chunk.
    for round in 0..(world - 1) {
        let send_idx = (rank + world + 1 - round) % world;
        let recv_idx = (rank + world - round) % world;
        let tag = pack_tag(bucket, step, round as u16, PHASE_GATHER);

        let send_off = layout.offset(send_idx);
        let send_snapshot = buf[send_off..send_off + layout.len(send_idx)].to_vec();
        let recv_off = layout.offset(recv_idx);
        let recv_len = layout.len(recv_idx);

        let (_, received) = tokio::try_join!(
            send_chunk(client, next, tag, &send_snapshot, segment_elems, bucket),
            recv_chunk(client, prev, tag, recv_len * GRAD_ELEM_BYTES, bucket),
        )?;
        reduce::copy_from_bytes(&mut buf[recv_off..recv_off + recv_len], &received)?;
    }

    Ok(())
}

/// Send one ring chunk as segment-sized frames. An empty chunk sends
/// nothing; the receiver expects nothing for it.
async fn send_chunk(
    client: &SyncraClient,
    dest: Rank,
    tag: u64,
    chunk: &[f32],
    segment_elems: usize,
    bucket: usize,
) -> Result<()> {
    for segment in chunk.chunks(segment_elems) {
        reduction_send(
            client,
            dest,
            tag,
            bytemuck::cast_slice(segment),
            OPERATION,
            bucket,
        )
        .await?;
    }
    Ok(())
}

/// Drain frames for `tag` until the chunk's byte count is assembled.
async fn recv_chunk(
    client: &SyncraClient,
    src: Rank,
    tag: u64,
    expected_bytes: usize,
    bucket: usize,
) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(expected_bytes);
    while data.len() < expected_bytes {
        let frame = reduction_recv(client, src, tag, OPERATION, bucket).await?;
        data.extend_from_slice(&frame);
    }
    if data.len() != expected_bytes {
        return Err(SyncraError::SizeMismatch {
            expected: expected_bytes,
            actual: data.len(),
        });
    }
    Ok(data)
}
