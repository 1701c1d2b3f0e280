// quire/src/pipeline/pool.rs

//! Fixed-size worker pool for BUILD pipelines.

use crate::core::cancel::CancellationToken;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{event, Level};

/// What happened to one job submitted to the pool.
#[derive(Debug)]
pub enum JobOutcome<T> {
  Completed(T),
  /// The job's task panicked; carries the panic message when it was a string.
  Panicked(String),
  /// Cancellation fired before the job was scheduled.
  NotStarted,
}

/// Runs jobs on spawned tasks, at most `size` at a time.
///
/// A permit is taken before a job is spawned, so not-yet-started jobs can be
/// dropped when the token fires. Outcomes come back in submission order,
/// independent of completion order. Dropping the `run` future aborts every
/// spawned job at its next `.await`.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
  size: usize,
}

impl WorkerPool {
  /// `size` is clamped to at least 1.
  pub fn new(size: usize) -> Self {
    Self { size: size.max(1) }
  }

  pub fn size(&self) -> usize {
    self.size
  }

  pub async fn run<J, F, Fut, T>(&self, jobs: Vec<J>, cancel: &CancellationToken, make_job: F) -> Vec<JobOutcome<T>>
  where
    F: Fn(J) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
  {
    let semaphore = Arc::new(Semaphore::new(self.size));
    let mut handles = AbortOnDrop(Vec::with_capacity(jobs.len()));

    for (job_idx, job) in jobs.into_iter().enumerate() {
      if cancel.is_cancelled() {
        handles.0.push(None);
        continue;
      }
      let permit = match semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
          // The semaphore is never closed while jobs are being scheduled.
          handles.0.push(None);
          continue;
        }
      };
      // Cancellation may have fired while waiting for a free worker.
      if cancel.is_cancelled() {
        drop(permit);
        handles.0.push(None);
        continue;
      }
      event!(Level::TRACE, job_index = job_idx, "Scheduling job.");
      let fut = make_job(job);
      handles.0.push(Some(tokio::spawn(async move {
        let _permit = permit;
        fut.await
      })));
    }

    let mut outcomes = Vec::with_capacity(handles.0.len());
    for handle in handles.0.iter_mut() {
      let outcome = match handle {
        None => JobOutcome::NotStarted,
        Some(handle) => match handle.await {
          Ok(value) => JobOutcome::Completed(value),
          Err(join_err) => {
            let message = if join_err.is_panic() {
              let payload = join_err.into_panic();
              payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task panicked".to_string())
            } else {
              join_err.to_string()
            };
            event!(Level::ERROR, panic = %message, "Worker task did not complete.");
            JobOutcome::Panicked(message)
          }
        },
      };
      outcomes.push(outcome);
    }
    outcomes
  }
}

// Spawned jobs must not outlive the run that scheduled them.
struct AbortOnDrop<T>(Vec<Option<JoinHandle<T>>>);

impl<T> Drop for AbortOnDrop<T> {
  fn drop(&mut self) {
    for handle in self.0.iter().flatten() {
      handle.abort();
    }
  }
}
