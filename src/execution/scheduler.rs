//! Variant scheduler - decides how the variants of one job are run

use crate::{
    backend::ContainerBackend,
    core::{RunOutcome, VariantResult},
    execution::executor::{JobExecutor, VariantPlan},
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Strategy for scheduling variant execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// One variant at a time, in matrix order
    #[default]
    Sequential,

    /// All variants of a job at once
    Parallel,

    /// Limited parallelism (max N concurrent variants)
    LimitedParallel(usize),
}

/// Runs a job's variants under a [`SchedulingStrategy`]
pub struct VariantScheduler {
    strategy: SchedulingStrategy,
}

impl VariantScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Run every plan and return the results in plan order
    pub async fn run<B: ContainerBackend + 'static>(
        &self,
        executor: Arc<JobExecutor<B>>,
        plans: Vec<VariantPlan>,
    ) -> Vec<VariantResult> {
        if plans.len() <= 1 {
            return Self::run_sequential(executor, plans).await;
        }

        match self.strategy {
            SchedulingStrategy::Sequential => Self::run_sequential(executor, plans).await,
            SchedulingStrategy::Parallel => Self::run_concurrent(executor, plans, None).await,
            SchedulingStrategy::LimitedParallel(max) => {
                let permits = Arc::new(Semaphore::new(max.max(1)));
                Self::run_concurrent(executor, plans, Some(permits)).await
            }
        }
    }

    async fn run_sequential<B: ContainerBackend + 'static>(
        executor: Arc<JobExecutor<B>>,
        plans: Vec<VariantPlan>,
    ) -> Vec<VariantResult> {
        let mut results = Vec::with_capacity(plans.len());
        for plan in plans {
            results.push(executor.execute_variant(plan).await);
        }
        results
    }

    async fn run_concurrent<B: ContainerBackend + 'static>(
        executor: Arc<JobExecutor<B>>,
        plans: Vec<VariantPlan>,
        permits: Option<Arc<Semaphore>>,
    ) -> Vec<VariantResult> {
        let mut slots: Vec<Option<VariantResult>> = plans.iter().map(|_| None).collect();
        let fallbacks: Vec<VariantPlan> = plans.clone();
        let mut tasks = JoinSet::new();

        for (index, plan) in plans.into_iter().enumerate() {
            let executor = executor.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = match permits {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                debug!("Variant {} acquired a slot", index);
                (index, executor.execute_variant(plan).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!("Variant task did not complete: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(fallbacks)
            .map(|(slot, plan)| slot.unwrap_or_else(|| aborted(plan)))
            .collect()
    }
}

/// Result recorded for a variant whose task panicked or was cancelled
fn aborted(plan: VariantPlan) -> VariantResult {
    let now = Utc::now();
    VariantResult {
        job_name: plan.job_name(),
        job_id: plan.job_id,
        binding: plan.binding,
        outcome: RunOutcome::Failure,
        error: Some("variant task aborted before completing".to_string()),
        steps: Vec::new(),
        started_at: now,
        completed_at: now,
        output: String::new(),
    }
}
