//! C11: single-consumer FIFO for background LLM completion (spec.md
//! §4.11). `deferred` mode enqueues a full rerun here after returning
//! the synchronous metrics-only response.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

type Job = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

pub struct DeferredQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl DeferredQueue {
    /// Spawns the single background consumer and returns a handle that
    /// can enqueue jobs. A job returning `Err` is logged, not
    /// propagated; the queue keeps draining (spec.md §4.11).
    pub fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                if let Err(err) = job.await {
                    warn!(%err, "deferred job failed");
                }
            }
            info!("deferred queue consumer exiting: all senders dropped");
        });

        Self { sender }
    }

    pub fn enqueue<F>(&self, future: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.sender.send(Box::pin(future)).is_err() {
            error!("deferred queue consumer is gone, dropping job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn jobs_run_in_enqueue_order() {
        let queue = DeferredQueue::spawn();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            queue.enqueue(async move {
                order.lock().unwrap().push(i);
                Ok(())
            });
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failing_job_does_not_block_queue() {
        let queue = DeferredQueue::spawn();
        let counter = Arc::new(AtomicU32::new(0));

        queue.enqueue(async { Err(anyhow::anyhow!("boom")) });
        let c = counter.clone();
        queue.enqueue(async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
