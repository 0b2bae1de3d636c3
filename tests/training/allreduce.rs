use syncra::{ring_allreduce, SyncraConfig};

use super::helpers::run_workers;

#[tokio::test]
async fn test_allreduce_2_workers_sums() {
    run_workers(2, SyncraConfig::default(), |client| async move {
        let rank = client.rank();
        let mut data = vec![(rank + 1) as f32; 8];
        ring_allreduce(&client, &mut data, 0, 0, 1 << 20)
            .await
            .unwrap();
        assert_eq!(data, vec![3.0f32; 8], "rank {rank} allreduce failed");
    })
    .await;
}

#[tokio::test]
async fn test_allreduce_3_workers_uneven_chunks() {
    run_workers(3, SyncraConfig::default(), |client| async move {
        let rank = client.rank();
        // 1000 does not divide by 3, so chunk sizes differ across ranks.
        let mut data: Vec<f32> = (0..1000).map(|i| (i % 17) as f32 * (rank + 1) as f32).collect();
        ring_allreduce(&client, &mut data, 0, 0, 256)
            .await
            .unwrap();
        let expected: Vec<f32> = (0..1000).map(|i| (i % 17) as f32 * 6.0).collect();
        assert_eq!(data, expected, "rank {rank} allreduce failed");
    })
    .await;
}

#[tokio::test]
async fn test_allreduce_result_independent_of_segment_size() {
    run_workers(2, SyncraConfig::default(), |client| async move {
        let rank = client.rank();
        let input: Vec<f32> = (0..300).map(|i| (i as f32 + 1.0) * (rank + 1) as f32).collect();

        let mut results = Vec::new();
        for (step, segment_bytes) in [(0u64, 4usize), (1, 28), (2, 1 << 20)] {
            let mut data = input.clone();
            ring_allreduce(&client, &mut data, 0, step, segment_bytes)
                .await
                .unwrap();
            results.push(data);
        }
        assert_eq!(results[0], results[1], "rank {rank}: 1-element vs 7-element segments");
        assert_eq!(results[0], results[2], "rank {rank}: tiny vs whole-chunk segments");
        assert_eq!(results[0][0], 3.0, "rank {rank}: wrong sum");
    })
    .await;
}

#[tokio::test]
async fn test_allreduce_tolerates_asymmetric_segment_sizes() {
    run_workers(2, SyncraConfig::default(), |client| async move {
        let rank = client.rank();
        // Each rank chunks its sends differently; frames are
        // self-describing so the receivers do not care.
        let segment_bytes = if rank == 0 { 8 } else { 4096 };
        let mut data = vec![(rank + 1) as f32; 64];
        ring_allreduce(&client, &mut data, 0, 0, segment_bytes)
            .await
            .unwrap();
        assert_eq!(data, vec![3.0f32; 64], "rank {rank} allreduce failed");
    })
    .await;
}

#[tokio::test]
async fn test_allreduce_4_workers() {
    run_workers(4, SyncraConfig::default(), |client| async move {
        let rank = client.rank();
        let mut data = vec![(rank + 1) as f32; 10];
        ring_allreduce(&client, &mut data, 0, 0, 16)
            .await
            .unwrap();
        assert_eq!(data, vec![10.0f32; 10], "rank {rank} allreduce failed");
    })
    .await;
}

#[tokio::test]
async fn test_allreduce_fewer_elements_than_workers() {
    run_workers(3, SyncraConfig::default(), |client| async move {
        let rank = client.rank();
        let mut data = vec![(rank + 1) as f32; 2];
        ring_allreduce(&client, &mut data, 0, 0, 1 << 20)
            .await
            .unwrap();
        assert_eq!(data, vec![6.0f32; 2], "rank {rank} allreduce failed");
    })
    .await;
}

#[tokio::test]
async fn test_allreduce_empty_buffer() {
    run_workers(2, SyncraConfig::default(), |client| async move {
        let mut data: Vec<f32> = Vec::new();
        ring_allreduce(&client, &mut data, 0, 0, 1 << 20)
            .await
            .unwrap();
        assert!(data.is_empty());
    })
    .await;
}

#[tokio::test]
async fn test_sequential_steps_reuse_tags_cleanly() {
    run_workers(2, SyncraConfig::default(), |client| async move {
        let rank = client.rank();
        // Step numbers above 2^16 wrap in the tag layout; back-to-back
        // reductions must still pair up by arrival order.
        for step in [0u64, 1, 65536, 65537] {
            let mut data = vec![(rank + 1) as f32; 32];
            ring_allreduce(&client, &mut data, 3, step, 64)
                .await
                .unwrap();
            assert_eq!(data, vec![3.0f32; 32], "rank {rank} step {step} failed");
        }
    })
    .await;
}
