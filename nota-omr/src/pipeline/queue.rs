//! Job queue
//!
//! Uploads enqueue a job id; a single background worker drains the channel
//! and runs the pipeline for each job sequentially. Deferred work (artifact
//! cleanup) is scheduled as a detached delayed task.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use super::Pipeline;

/// Queued-but-unprocessed jobs tolerated before uploads start to backpressure
const QUEUE_DEPTH: usize = 64;

pub type JobSender = mpsc::Sender<Uuid>;

/// Spawn the pipeline worker and return the submission handle
pub fn start_worker(pipeline: Pipeline) -> JobSender {
    let (tx, mut rx) = mpsc::channel::<Uuid>(QUEUE_DEPTH);

    tokio::spawn(async move {
        info!("Pipeline worker started");
        while let Some(job_id) = rx.recv().await {
            pipeline.process(job_id).await;
        }
        info!("Pipeline worker stopped (queue closed)");
    });

    tx
}

/// Run a future after a delay, detached from the caller
pub fn schedule<F>(delay: Duration, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        task.await;
    });
}

/// Submit a job, logging if the queue is unavailable
pub async fn submit(tx: &JobSender, job_id: Uuid) -> bool {
    match tx.send(job_id).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to enqueue job {}: {}", job_id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn schedule_runs_after_the_delay() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        schedule(Duration::from_millis(10), async move {
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!ran.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
