use std::sync::{Arc, Mutex};

use syncra::{
    BackwardObserver, BatchAdapter, BatchSource, Optimizer, Replica, Result, StepOutput,
    SyncraClient, SyncraConfig,
};

/// Helper: run a worker body across N connected clients concurrently.
/// Keeps all clients alive until every task completes.
pub async fn run_workers<F, Fut>(world_size: u32, config: SyncraConfig, f: F)
where
    F: Fn(Arc<SyncraClient>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let clients = SyncraClient::connect_local(world_size, config)
        .await
        .unwrap();
    let clients: Vec<Arc<SyncraClient>> = clients.into_iter().map(Arc::new).collect();

    let f = Arc::new(f);
    let mut handles = Vec::new();
    for c in &clients {
        let c = Arc::clone(c);
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move { f(c).await }));
    }
    for h in handles {
        h.await.unwrap();
    }
}

/// Dense gradient buffers and nothing else.
pub struct TestReplica {
    grads: Vec<Vec<f32>>,
}

impl TestReplica {
    pub fn with_lens(lens: &[usize]) -> Self {
        Self {
            grads: lens.iter().map(|&n| vec![0.0; n]).collect(),
        }
    }
}

impl Replica for TestReplica {
    fn parameter_count(&self) -> usize {
        self.grads.len()
    }
    fn gradient_len(&self, param: usize) -> usize {
        self.grads[param].len()
    }
    fn zero_gradients(&mut self) {
        for g in &mut self.grads {
            g.fill(0.0);
        }
    }
    fn gradient(&self, param: usize) -> &[f32] {
        &self.grads[param]
    }
    fn gradient_mut(&mut self, param: usize) -> &mut [f32] {
        &mut self.grads[param]
    }
}

/// Fills every gradient with one value and reports readiness in
/// parameter order.
pub struct FillAdapter {
    pub value: f32,
}

impl BatchAdapter for FillAdapter {
    type Batch = f32;

    fn forward_backward(
        &mut self,
        replica: &mut dyn Replica,
        batch: &f32,
        observer: &mut dyn BackwardObserver,
    ) -> Result<StepOutput> {
        for p in 0..replica.parameter_count() {
            replica.gradient_mut(p).fill(self.value);
            observer.gradient_ready(&*replica, p);
        }
        Ok(StepOutput {
            loss: *batch,
            accuracy: 1.0,
        })
    }
}

/// Fills parameter `p` with `value * (p + 1)`, so a misplaced bucket
/// region shows up as the wrong parameter's value.
pub struct RampAdapter {
    pub value: f32,
}

impl BatchAdapter for RampAdapter {
    type Batch = f32;

    fn forward_backward(
        &mut self,
        replica: &mut dyn Replica,
        batch: &f32,
        observer: &mut dyn BackwardObserver,
    ) -> Result<StepOutput> {
        for p in 0..replica.parameter_count() {
            replica.gradient_mut(p).fill(self.value * (p as f32 + 1.0));
            observer.gradient_ready(&*replica, p);
        }
        Ok(StepOutput {
            loss: *batch,
            accuracy: 1.0,
        })
    }
}

pub struct FixedBatches {
    pub per_epoch: usize,
}

impl BatchSource for FixedBatches {
    type Batch = f32;

    fn batches_per_epoch(&self) -> usize {
        self.per_epoch
    }
    fn batch(&mut self, _epoch: usize, index: usize) -> Result<f32> {
        Ok(index as f32)
    }
}

/// Snapshots the averaged gradients every time it is asked to step, so a
/// test can inspect what each optimizer invocation saw.
pub struct CapturingOptimizer {
    pub steps: Arc<Mutex<Vec<Vec<Vec<f32>>>>>,
}

impl CapturingOptimizer {
    pub fn new() -> (Self, Arc<Mutex<Vec<Vec<Vec<f32>>>>>) {
        let steps = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                steps: Arc::clone(&steps),
            },
            steps,
        )
    }
}

impl Optimizer for CapturingOptimizer {
    fn step(&mut self, replica: &mut dyn Replica) -> Result<()> {
        let snapshot: Vec<Vec<f32>> = (0..replica.parameter_count())
            .map(|p| replica.gradient(p).to_vec())
            .collect();
        self.steps.lock().unwrap().push(snapshot);
        Ok(())
    }
}
