use syncra::{partition, OversizePolicy, SyncraConfig, Trainer, TransformKind};

use super::helpers::{
    run_workers, CapturingOptimizer, FillAdapter, FixedBatches, RampAdapter, TestReplica,
};

const LENS: [usize; 3] = [25, 1000, 13];
const CAP: usize = 4096;

/// The canonical small-model layout: the 4000-byte parameter fills a
/// bucket of its own and the two small ones share the first.
#[test]
fn test_two_worker_partition_contract() {
    let layouts = partition(&LENS, CAP, OversizePolicy::Isolate).unwrap();
    assert_eq!(layouts.len(), 2);
    let params: Vec<Vec<usize>> = layouts
        .iter()
        .map(|l| l.regions.iter().map(|r| r.param).collect())
        .collect();
    assert_eq!(params[0], vec![0, 2]);
    assert_eq!(params[1], vec![1]);
}

#[tokio::test]
async fn test_training_step_averages_gradients() {
    let config = SyncraConfig {
        bucket_cap_bytes: CAP,
        ..SyncraConfig::default()
    };
    run_workers(2, config, |client| async move {
        let rank = client.rank();
        let (optimizer, seen) = CapturingOptimizer::new();
        let trainer = Trainer::new(
            client,
            TestReplica::with_lens(&LENS),
            RampAdapter {
                value: (rank + 1) as f32,
            },
            FixedBatches { per_epoch: 1 },
            optimizer,
        )
        .unwrap();

        let report = trainer.run(1).await.unwrap();
        assert_eq!(report.steps_completed, 1);

        // Ranks contributed value * (p + 1) for value 1 and 2, so the
        // average is 1.5 * (p + 1) everywhere.
        let steps = seen.lock().unwrap();
        assert_eq!(steps.len(), 1, "rank {rank}: optimizer steps");
        for (p, grad) in steps[0].iter().enumerate() {
            let expected = 1.5 * (p as f32 + 1.0);
            assert!(
                grad.iter().all(|&g| g == expected),
                "rank {rank} param {p}: expected {expected}"
            );
        }
    })
    .await;
}

#[tokio::test]
async fn test_all_ones_average_stays_all_ones() {
    let config = SyncraConfig {
        bucket_cap_bytes: CAP,
        reschedule_interval: 2,
        ..SyncraConfig::default()
    };
    run_workers(2, config, |client| async move {
        let rank = client.rank();
        let (optimizer, seen) = CapturingOptimizer::new();
        let trainer = Trainer::new(
            client,
            TestReplica::with_lens(&LENS),
            FillAdapter { value: 1.0 },
            FixedBatches { per_epoch: 4 },
            optimizer,
        )
        .unwrap();

        // Two epochs cross several reschedule boundaries.
        let report = trainer.run(2).await.unwrap();
        assert_eq!(report.steps_completed, 8);

        let steps = seen.lock().unwrap();
        assert_eq!(steps.len(), 8);
        for (step, params) in steps.iter().enumerate() {
            for (p, grad) in params.iter().enumerate() {
                assert!(
                    grad.iter().all(|&g| g == 1.0),
                    "rank {rank} step {step} param {p} drifted"
                );
            }
        }
    })
    .await;
}

#[tokio::test]
async fn test_hadamard_training_stays_within_tolerance() {
    let config = SyncraConfig {
        bucket_cap_bytes: CAP,
        transform: TransformKind::Hadamard,
        transform_seed: 7,
        ..SyncraConfig::default()
    };
    run_workers(2, config, |client| async move {
        let rank = client.rank();
        let (optimizer, seen) = CapturingOptimizer::new();
        let trainer = Trainer::new(
            client,
            TestReplica::with_lens(&LENS),
            FillAdapter { value: 1.0 },
            FixedBatches { per_epoch: 3 },
            optimizer,
        )
        .unwrap();

        trainer.run(1).await.unwrap();

        let steps = seen.lock().unwrap();
        for (step, params) in steps.iter().enumerate() {
            for (p, grad) in params.iter().enumerate() {
                assert!(
                    grad.iter().all(|&g| (g - 1.0).abs() < 1e-4),
                    "rank {rank} step {step} param {p} outside tolerance"
                );
            }
        }
    })
    .await;
}

#[tokio::test]
async fn test_run_stops_at_configured_cap() {
    let config = SyncraConfig {
        bucket_cap_bytes: CAP,
        max_scheduled_steps: Some(12),
        ..SyncraConfig::default()
    };
    run_workers(2, config, |client| async move {
        let rank = client.rank();
        let (optimizer, _) = CapturingOptimizer::new();
        let trainer = Trainer::new(
            client,
            TestReplica::with_lens(&LENS),
            FillAdapter { value: 1.0 },
            FixedBatches { per_epoch: 5 },
            optimizer,
        )
        .unwrap();

        let report = trainer.run(100).await.unwrap();
        assert_eq!(report.steps_completed, 12, "rank {rank}");
        assert!(report.stopped_by_schedule, "rank {rank}");
        // Two full epochs ran; the third was cut off after two steps.
        assert_eq!(report.epochs.len(), 2, "rank {rank}");
    })
    .await;
}

#[tokio::test]
async fn test_default_schedule_caps_at_sixty_steps() {
    let config = SyncraConfig {
        bucket_cap_bytes: CAP,
        ..SyncraConfig::default()
    };
    run_workers(2, config, |client| async move {
        let rank = client.rank();
        let (optimizer, seen) = CapturingOptimizer::new();
        let trainer = Trainer::new(
            client,
            TestReplica::with_lens(&LENS),
            FillAdapter { value: 1.0 },
            FixedBatches { per_epoch: 7 },
            optimizer,
        )
        .unwrap();

        let report = trainer.run(100).await.unwrap();
        // 60 steps walk the whole shrink and regrow curve at the default
        // four-step interval.
        assert_eq!(report.steps_completed, 60, "rank {rank}");
        assert!(report.stopped_by_schedule, "rank {rank}");
        assert_eq!(report.epochs.len(), 8, "rank {rank}");
        assert_eq!(seen.lock().unwrap().len(), 60, "rank {rank}");
    })
    .await;
}

#[tokio::test]
async fn test_shared_segment_record_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = SyncraConfig {
        bucket_cap_bytes: CAP,
        base_segment_bytes: 64,
        reschedule_interval: 1,
        shrink_until: 3,
        regrow_until: 6,
        segment_record_path: Some(dir.path().join("segment.txt")),
        ..SyncraConfig::default()
    };
    run_workers(2, config, |client| async move {
        let rank = client.rank();
        let (optimizer, seen) = CapturingOptimizer::new();
        let trainer = Trainer::new(
            client,
            TestReplica::with_lens(&LENS),
            FillAdapter { value: 1.0 },
            FixedBatches { per_epoch: 10 },
            optimizer,
        )
        .unwrap();

        // Both workers publish to the same file every step while the
        // segment size walks the whole curve. Last writer wins and stale
        // reads are fine; the averages must never move.
        let report = trainer.run(1).await.unwrap();
        assert_eq!(report.steps_completed, 10);

        let steps = seen.lock().unwrap();
        for (step, params) in steps.iter().enumerate() {
            for grad in params {
                assert!(
                    grad.iter().all(|&g| g == 1.0),
                    "rank {rank} step {step} drifted"
                );
            }
        }
    })
    .await;
}
