//! Bounded per-parent fan-out.
//!
//! [`FanOut::run`] executes one [`FetchTask`] per parent entity on a
//! [`JoinSet`], never more than `concurrency` at a time. Results are merged
//! in task-id order, so the assembled set does not depend on which task
//! finished first.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::assemble::{Assembler, Conflict, Record};
use crate::error::{FiniteStateError, Result};

/// Default number of tasks in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// What to do when a task fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort everything on the first failure and return it.
    #[default]
    FailFast,
    /// Keep going and report failures alongside the results.
    BestEffort,
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutOptions {
    /// Maximum tasks in flight.
    pub concurrency: usize,
    /// Failure handling.
    pub policy: FailurePolicy,
    /// Runs per task when the failure is retryable. At least 1.
    pub task_attempts: u32,
    /// Time budget for the whole fan-out.
    pub deadline: Option<Duration>,
}

impl Default for FanOutOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            policy: FailurePolicy::default(),
            task_attempts: 1,
            deadline: None,
        }
    }
}

/// One unit of fan-out work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchTask {
    /// Task identity; unique within one run.
    pub id: String,
    /// Id of the parent entity whose children are fetched.
    pub parent: String,
}

impl FetchTask {
    /// A task identified by its parent entity id.
    pub fn new(parent: impl Into<String>) -> Self {
        let parent = parent.into();
        Self {
            id: parent.clone(),
            parent,
        }
    }

    /// A task with an explicit id.
    pub fn with_id(id: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: parent.into(),
        }
    }
}

/// A task that did not produce results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    /// Failed task id.
    pub task_id: String,
    /// Runs made before giving up.
    pub attempts: u32,
    /// Rendered error.
    pub error: String,
    /// Whether the last error was transient.
    pub retryable: bool,
}

/// Merged output of a fan-out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchResultSet {
    /// De-duplicated records, grouped by task id order.
    pub records: Vec<Record>,
    /// Tasks that failed, ordered by id.
    pub failed: Vec<TaskFailure>,
    /// Tasks cancelled by the deadline, ordered by id.
    pub timed_out: Vec<String>,
    /// Conflicting duplicates seen while merging.
    pub conflicts: Vec<Conflict>,
    /// Record ids returned by each completed task.
    pub membership: BTreeMap<String, Vec<String>>,
}

impl FetchResultSet {
    /// Whether any task failed or was cancelled.
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty() || !self.timed_out.is_empty()
    }

    /// Ids of every task that did not complete.
    pub fn failed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .failed
            .iter()
            .map(|f| f.task_id.clone())
            .chain(self.timed_out.iter().cloned())
            .collect();
        ids.sort();
        ids
    }

    /// Record ids fetched for one task.
    pub fn records_for(&self, task_id: &str) -> impl Iterator<Item = &Record> {
        let ids: BTreeSet<&str> = self
            .membership
            .get(task_id)
            .map(|ids| ids.iter().map(String::as_str).collect())
            .unwrap_or_default();
        self.records.iter().filter(move |r| ids.contains(r.id.as_str()))
    }

    /// Return the set only if every task completed.
    ///
    /// # Errors
    ///
    /// Returns [`FiniteStateError::PartialResult`] listing the incomplete tasks.
    pub fn into_complete(self) -> Result<Self> {
        if self.is_partial() {
            Err(FiniteStateError::PartialResult {
                failed: self.failed_ids(),
            })
        } else {
            Ok(self)
        }
    }
}

struct TaskOutcome {
    task: FetchTask,
    attempts: u32,
    result: Result<Vec<Record>>,
}

/// Bounded-concurrency scheduler.
#[derive(Debug, Clone, Default)]
pub struct FanOut {
    options: FanOutOptions,
}

impl FanOut {
    /// Create a scheduler.
    pub fn new(options: FanOutOptions) -> Self {
        Self { options }
    }

    /// The scheduler's configuration.
    pub fn options(&self) -> &FanOutOptions {
        &self.options
    }

    /// Run `worker` once per task and merge the results.
    ///
    /// Duplicate task ids are dropped with a warning. Under
    /// [`FailurePolicy::BestEffort`] and when the deadline passes, the
    /// returned set may be partial; check [`FetchResultSet::is_partial`].
    ///
    /// # Errors
    ///
    /// Under [`FailurePolicy::FailFast`], the first task error after its
    /// retries, with every other task aborted.
    #[tracing::instrument(skip_all, fields(concurrency = self.options.concurrency, policy = ?self.options.policy))]
    pub async fn run<I, W, Fut>(&self, tasks: I, worker: W) -> Result<FetchResultSet>
    where
        I: IntoIterator<Item = FetchTask>,
        W: Fn(FetchTask) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Record>>> + Send + 'static,
    {
        let mut seen = BTreeSet::new();
        let mut pending = BTreeSet::new();
        let mut queued = Vec::new();
        for task in tasks {
            if !seen.insert(task.id.clone()) {
                tracing::warn!(task_id = %task.id, "duplicate fetch task dropped");
                continue;
            }
            pending.insert(task.id.clone());
            queued.push(task);
        }
        tracing::debug!(tasks = queued.len(), "starting fan-out");

        let deadline = self.options.deadline.map(|d| Instant::now() + d);
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let worker = Arc::new(worker);
        let max_attempts = self.options.task_attempts.max(1);

        let mut set = JoinSet::new();
        for task in queued {
            let semaphore = semaphore.clone();
            let worker = worker.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                run_task(task, worker.as_ref(), max_attempts).await
            });
        }

        let mut completed: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        let mut failed: BTreeMap<String, TaskFailure> = BTreeMap::new();

        loop {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, set.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!(
                            cancelled = pending.len(),
                            completed = completed.len(),
                            "fan-out deadline reached, cancelling remaining tasks"
                        );
                        set.shutdown().await;
                        break;
                    }
                },
                None => set.join_next().await,
            };

            let Some(joined) = joined else { break };
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!(error = %error, "fan-out task did not finish");
                    continue;
                }
            };

            pending.remove(&outcome.task.id);
            match outcome.result {
                Ok(records) => {
                    tracing::debug!(task_id = %outcome.task.id, records = records.len(), "task completed");
                    completed.insert(outcome.task.id, records);
                }
                Err(error) => match self.options.policy {
                    FailurePolicy::FailFast => {
                        tracing::error!(
                            task_id = %outcome.task.id,
                            attempts = outcome.attempts,
                            error = %error,
                            "task failed, aborting fan-out"
                        );
                        set.shutdown().await;
                        return Err(error);
                    }
                    FailurePolicy::BestEffort => {
                        tracing::warn!(
                            task_id = %outcome.task.id,
                            attempts = outcome.attempts,
                            error = %error,
                            "task failed, continuing"
                        );
                        failed.insert(
                            outcome.task.id.clone(),
                            TaskFailure {
                                task_id: outcome.task.id,
                                attempts: outcome.attempts,
                                retryable: error.is_retryable(),
                                error: error.to_string(),
                            },
                        );
                    }
                },
            }
        }

        Ok(merge(completed, failed, pending))
    }
}

async fn run_task<W, Fut>(task: FetchTask, worker: &W, max_attempts: u32) -> TaskOutcome
where
    W: Fn(FetchTask) -> Fut,
    Fut: Future<Output = Result<Vec<Record>>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = match AssertUnwindSafe(worker(task.clone())).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(FiniteStateError::TaskPanicked(panic_message(panic.as_ref()))),
        };

        match result {
            Err(error) if error.is_retryable() && attempts < max_attempts => {
                tracing::warn!(
                    task_id = %task.id,
                    attempt = attempts,
                    max_attempts,
                    error = %error,
                    "retrying task"
                );
            }
            result => {
                return TaskOutcome {
                    task,
                    attempts,
                    result,
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

fn merge(
    completed: BTreeMap<String, Vec<Record>>,
    failed: BTreeMap<String, TaskFailure>,
    timed_out: BTreeSet<String>,
) -> FetchResultSet {
    let mut assembler = Assembler::new();
    let mut membership = BTreeMap::new();

    for (task_id, records) in completed {
        membership.insert(task_id, records.iter().map(|r| r.id.clone()).collect());
        for record in records {
            assembler.push(record);
        }
    }

    let assembled = assembler.finish();
    FetchResultSet {
        records: assembled.records,
        failed: failed.into_values().collect(),
        timed_out: timed_out.into_iter().collect(),
        conflicts: assembled.conflicts,
        membership,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::FieldValue;
    use crate::transport::TransportError;
    use rand::Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tasks(n: usize) -> Vec<FetchTask> {
        (0..n).map(|i| FetchTask::new(format!("av-{i:02}"))).collect()
    }

    fn records_for(task: &FetchTask) -> Vec<Record> {
        (0..3)
            .map(|i| {
                Record::new(format!("{}-f{i}", task.parent), "finding")
                    .with_field("asset_version", FieldValue::Text(task.parent.clone()))
            })
            .collect()
    }

    fn transient() -> FiniteStateError {
        FiniteStateError::RetriesExhausted {
            attempts: 5,
            last: TransportError::Server {
                status: 503,
                message: "unavailable".to_string(),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_order_independent_of_completion_order() {
        let run = || async {
            FanOut::new(FanOutOptions {
                concurrency: 3,
                ..FanOutOptions::default()
            })
            .run(tasks(10), |task| async move {
                let jitter = rand::thread_rng().gen_range(1..200);
                tokio::time::sleep(Duration::from_millis(jitter)).await;
                Ok(records_for(&task))
            })
            .await
            .unwrap()
        };

        let first = serde_json::to_string(&run().await).unwrap();
        let second = serde_json::to_string(&run().await).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());

        let result = FanOut::new(FanOutOptions {
            concurrency: 2,
            ..FanOutOptions::default()
        })
        .run(tasks(8), move |task| {
            let active = a.clone();
            let peak = p.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(records_for(&task))
            }
        })
        .await
        .unwrap();

        assert_eq!(result.records.len(), 24);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    fn failing_worker(task: FetchTask) -> impl Future<Output = Result<Vec<Record>>> {
        async move {
            if task.id == "av-03" || task.id == "av-07" {
                Err(FiniteStateError::client(Some(403), "forbidden"))
            } else {
                Ok(records_for(&task))
            }
        }
    }

    #[tokio::test]
    async fn test_best_effort_reports_failed_tasks() {
        let result = FanOut::new(FanOutOptions {
            policy: FailurePolicy::BestEffort,
            ..FanOutOptions::default()
        })
        .run(tasks(10), failing_worker)
        .await
        .unwrap();

        assert!(result.is_partial());
        assert_eq!(result.failed_ids(), vec!["av-03", "av-07"]);
        assert_eq!(result.records.len(), 24);
        assert_eq!(result.records_for("av-00").count(), 3);
        assert!(!result.failed[0].retryable);

        let err = result.into_complete().unwrap_err();
        assert!(matches!(err, FiniteStateError::PartialResult { ref failed } if failed.len() == 2));
    }

    #[tokio::test]
    async fn test_fail_fast_returns_first_error() {
        let err = FanOut::new(FanOutOptions::default())
            .run(tasks(10), failing_worker)
            .await
            .unwrap_err();
        assert!(matches!(err, FiniteStateError::Client { status_code: Some(403), .. }));
    }

    #[tokio::test]
    async fn test_retryable_task_rerun_independently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();

        let result = FanOut::new(FanOutOptions {
            task_attempts: 2,
            ..FanOutOptions::default()
        })
        .run(tasks(3), move |task| {
            let calls = c.clone();
            async move {
                if task.id == "av-01" && calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(transient());
                }
                Ok(records_for(&task))
            }
        })
        .await
        .unwrap();

        assert!(!result.is_partial());
        assert_eq!(result.records.len(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_keeps_completed_results() {
        let result = FanOut::new(FanOutOptions {
            policy: FailurePolicy::BestEffort,
            deadline: Some(Duration::from_secs(1)),
            ..FanOutOptions::default()
        })
        .run(tasks(4), |task| async move {
            let delay = if task.id == "av-02" { 60 } else { 0 };
            tokio::time::sleep(Duration::from_secs(delay)).await;
            Ok(records_for(&task))
        })
        .await
        .unwrap();

        assert_eq!(result.timed_out, vec!["av-02"]);
        assert_eq!(result.records.len(), 9);
        assert!(result.is_partial());
    }

    #[tokio::test]
    async fn test_duplicate_tasks_dropped_and_records_deduped() {
        let mut list = tasks(2);
        list.push(FetchTask::new("av-00"));
        list.push(FetchTask::with_id("av-00-again", "av-00"));

        let result = FanOut::new(FanOutOptions::default())
            .run(list, |task| async move { Ok(records_for(&task)) })
            .await
            .unwrap();

        assert_eq!(result.membership.len(), 3);
        assert_eq!(result.records.len(), 6);
        assert!(result.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_record_shared_by_tasks_merges_silently() {
        let result = FanOut::new(FanOutOptions::default())
            .run(tasks(2), |task| async move {
                let shared = Record::new("f-shared", "finding")
                    .with_field("severity", FieldValue::Text("HIGH".to_string()));
                let own = Record::new(format!("{}-own", task.parent), "finding");
                Ok(vec![shared, own])
            })
            .await
            .unwrap();

        assert!(result.conflicts.is_empty());
        assert_eq!(result.records.len(), 3);
        assert_eq!(result.records_for("av-00").count(), 2);
        assert_eq!(result.records_for("av-01").count(), 2);
        assert!(result.records_for("av-01").any(|r| r.id == "f-shared"));
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported() {
        let result = FanOut::new(FanOutOptions {
            policy: FailurePolicy::BestEffort,
            ..FanOutOptions::default()
        })
        .run(tasks(2), |task| async move {
            if task.id == "av-01" {
                panic!("worker bug");
            }
            Ok(records_for(&task))
        })
        .await
        .unwrap();

        assert_eq!(result.failed.len(), 1);
        assert!(result.failed[0].error.contains("worker bug"));
    }
}
