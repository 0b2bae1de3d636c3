use std::time::Duration;

use crate::client::SyncraClient;
use crate::error::{Result, SyncraError};
use crate::types::Rank;

/// Send bytes to a peer with timeout, wrapping errors as `Reduction`.
pub(crate) async fn reduction_send(
    client: &SyncraClient,
    dest: Rank,
    tag: u64,
    data: &[u8],
    operation: &'static str,
    bucket: usize,
) -> Result<()> {
    let timeout = client.config().collective_timeout;
    match tokio::time::timeout(timeout, client.send_bytes(dest, tag, data)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SyncraError::reduction(operation, bucket, dest, e.to_string())),
        Err(_) => Err(SyncraError::reduction(
            operation,
            bucket,
            dest,
            timeout_reason("send", timeout),
        )),
    }
}

/// Receive one frame from a peer with timeout, wrapping errors as
/// `Reduction`.
pub(crate) async fn reduction_recv(
    client: &SyncraClient,
    src: Rank,
    tag: u64,
    operation: &'static str,
    bucket: usize,
) -> Result<Vec<u8>> {
    let timeout = client.config().collective_timeout;
    match tokio::time::timeout(timeout, client.recv_bytes(src, tag)).await {
        Ok(Ok(buf)) => Ok(buf),
        Ok(Err(e)) => Err(SyncraError::reduction(operation, bucket, src, e.to_string())),
        Err(_) => Err(SyncraError::reduction(
            operation,
            bucket,
            src,
            timeout_reason("recv", timeout),
        )),
    }
}

fn timeout_reason(direction: &str, timeout: Duration) -> String {
    format!("{direction} timed out after {}s", timeout.as_secs())
}
