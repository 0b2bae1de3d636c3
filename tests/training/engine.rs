use std::sync::Arc;

use syncra::transform::build;
use syncra::{
    partition, OversizePolicy, ReductionEngine, SegmentCell, SegmentRecord, SegmentStore,
    SyncraConfig, TensorBucket, TransformKind,
};

use super::helpers::run_workers;

fn single_bucket(elems: usize) -> TensorBucket {
    let layouts = partition(&[elems], usize::MAX, OversizePolicy::Reject).unwrap();
    TensorBucket::new(layouts.into_iter().next().unwrap())
}

#[tokio::test]
async fn test_engine_averages_across_workers() {
    run_workers(2, SyncraConfig::default(), |client| async move {
        let rank = client.rank();
        let store = Arc::new(SegmentCell::new(SegmentRecord::initial(1 << 20)));
        let engine = ReductionEngine::new(build(TransformKind::None, 0, 128), store);

        let mut bucket = single_bucket(100);
        bucket.as_mut_slice().fill((rank + 1) as f32);
        engine.reduce_bucket(&client, &mut bucket, 0).await.unwrap();

        assert_eq!(
            bucket.as_slice(),
            vec![1.5f32; 100].as_slice(),
            "rank {rank} average wrong"
        );
    })
    .await;
}

#[tokio::test]
async fn test_engine_hadamard_matches_plain_average() {
    run_workers(2, SyncraConfig::default(), |client| async move {
        let rank = client.rank();
        let store = Arc::new(SegmentCell::new(SegmentRecord::initial(1 << 20)));
        // Both workers must build the transform from the same seed.
        let engine = ReductionEngine::new(build(TransformKind::Hadamard, 42, 128), store);

        let value = |r: u32, i: usize| ((i * 31 + r as usize * 17) % 97) as f32 * 0.125 - 6.0;
        let mut bucket = single_bucket(100);
        for (i, g) in bucket.as_mut_slice().iter_mut().enumerate() {
            *g = value(rank, i);
        }
        engine.reduce_bucket(&client, &mut bucket, 0).await.unwrap();

        for (i, &g) in bucket.as_slice().iter().enumerate() {
            let expected = (value(0, i) + value(1, i)) / 2.0;
            assert!(
                (g - expected).abs() < 1e-4,
                "rank {rank} elem {i}: got {g}, expected {expected}"
            );
        }
    })
    .await;
}

#[tokio::test]
async fn test_engine_reads_rank_local_segment_records() {
    run_workers(2, SyncraConfig::default(), |client| async move {
        let rank = client.rank();
        let store = Arc::new(SegmentCell::new(SegmentRecord::initial(1 << 20)));
        // Mirror-image records: each rank chunks with a different size.
        let (own_bytes, peer_bytes) = if rank == 0 { (8, 1024) } else { (1024, 8) };
        store
            .publish(SegmentRecord {
                own_bytes,
                peer_bytes,
                version: 1,
            })
            .unwrap();
        let engine = ReductionEngine::new(build(TransformKind::None, 0, 128), store);

        let mut bucket = single_bucket(77);
        bucket.as_mut_slice().fill((rank + 1) as f32);
        engine.reduce_bucket(&client, &mut bucket, 4).await.unwrap();

        assert_eq!(
            bucket.as_slice(),
            vec![1.5f32; 77].as_slice(),
            "rank {rank} average wrong"
        );
    })
    .await;
}
