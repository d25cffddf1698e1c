use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_POOL_SIZE: usize = 10;

/// Fixed-size pool of workers draining a single bounded inbox.
///
/// No per-worker affinity: any worker may handle any envelope. Per-key
/// ordering is the lane lock's job, not the pool's.
pub struct WorkerPool {
    size: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = if size == 0 { DEFAULT_POOL_SIZE } else { size };
        Self { size, handles: Mutex::new(Vec::new()) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Spawns `size` workers, each looping on `inbox.recv()` and invoking
    /// `handler` for every envelope. A worker exits once `inbox` is closed
    /// and drained.
    pub async fn start<T, F, Fut>(&self, ctx: CancellationToken, inbox: mpsc::Receiver<T>, handler: F)
    where
        T: Send + 'static,
        F: Fn(CancellationToken, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let inbox = Arc::new(Mutex::new(inbox));
        let handler = Arc::new(handler);
        let mut handles = self.handles.lock().await;
        for id in 0..self.size {
            let inbox = inbox.clone();
            let handler = handler.clone();
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let envelope = {
                        let mut rx = inbox.lock().await;
                        rx.recv().await
                    };
                    match envelope {
                        Some(envelope) => handler(ctx.clone(), envelope).await,
                        None => break,
                    }
                }
                debug!(worker = id, "worker exited");
            }));
        }
    }

    /// Blocks until every spawned worker has exited.
    pub async fn wait(&self) {
        let mut handles = self.handles.lock().await;
        for h in handles.drain(..) {
            let _ = h.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn drains_every_envelope_then_exits_on_close() {
        let pool = WorkerPool::new(4);
        let (tx, rx) = mpsc::channel(16);
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = processed.clone();

        pool.start(CancellationToken::new(), rx, move |_ctx, _envelope: u32| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        for i in 0..20u32 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), pool.wait()).await.expect("pool must drain and exit");
        assert_eq!(processed.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn size_zero_falls_back_to_default() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.size(), DEFAULT_POOL_SIZE);
    }
}
