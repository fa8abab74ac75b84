//! Callback registry and the periodic sender loop.
//!
//! Clients announce themselves once; after that the sender loop pushes a
//! one-way notification to every registered endpoint on a fixed cadence.
//! A single failed delivery evicts the endpoint — there is no retry, a
//! client that lost its connection is expected to re-register.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// One registered client endpoint able to receive one-way notifications.
#[async_trait]
pub trait CallbackChannel: Send + Sync {
    /// Stable identity of the remote peer, used to deduplicate registrations.
    fn key(&self) -> u64;

    /// Push one notification. An error marks the endpoint dead.
    async fn notify(&self, seq: u64) -> Result<()>;
}

/// Shared between the RPC-dispatch tasks (which register endpoints) and the
/// sender loop (which reads a snapshot on every iteration).
#[derive(Default)]
pub struct CallbackRegistry {
    channels: Mutex<HashMap<u64, Arc<dyn CallbackChannel>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: registering an already-known peer keeps a single entry.
    pub fn register(&self, chan: Arc<dyn CallbackChannel>) {
        let key = chan.key();
        if self.channels.lock().insert(key, chan).is_some() {
            debug!("[callback] peer {key} re-registered");
        } else {
            info!("[callback] peer {key} registered");
        }
    }

    pub fn remove(&self, key: u64) {
        if self.channels.lock().remove(&key).is_some() {
            info!("[callback] peer {key} removed");
        }
    }

    /// Copy the handles out so no lock is held across network calls.
    pub fn snapshot(&self) -> Vec<Arc<dyn CallbackChannel>> {
        self.channels.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Background loop broadcasting a sequence number to every registered
/// endpoint once per interval.
pub struct CallbackSender {
    registry: Arc<CallbackRegistry>,
    interval: Duration,
}

impl CallbackSender {
    pub fn new(registry: Arc<CallbackRegistry>, interval: Duration) -> Self {
        CallbackSender { registry, interval }
    }

    /// Start the loop on its own task. The returned handle is the only way
    /// to stop it.
    pub fn spawn(self) -> SenderHandle {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let task = tokio::spawn(async move { self.run(loop_token).await });
        SenderHandle { token, task }
    }

    async fn run(self, token: CancellationToken) {
        let mut seq: u64 = 0;
        while !token.is_cancelled() {
            seq += 1;
            self.broadcast(seq).await;
            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = token.cancelled() => break,
            }
        }
        debug!("[callback] sender loop exited");
    }

    async fn broadcast(&self, seq: u64) {
        let snapshot = self.registry.snapshot();
        let results = join_all(snapshot.iter().map(|chan| chan.notify(seq))).await;
        for (chan, result) in snapshot.iter().zip(results) {
            if let Err(e) = result {
                warn!(
                    "[callback] delivery to peer {} failed, evicting: {e:#}",
                    chan.key()
                );
                self.registry.remove(chan.key());
            }
        }
    }
}

/// Bundles the sender's stop signal with its completion. After `stop`
/// returns, no notify call is in flight.
pub struct SenderHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SenderHandle {
    /// Request stop (interrupting any in-progress sleep) and wait for the
    /// loop to exit. A failed join is treated as already stopped.
    pub async fn stop(self) -> SenderStopped {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!("[callback] sender task join failed: {e}");
        }
        SenderStopped(())
    }
}

/// Proof that the sender loop has been joined. `Communicator::destroy`
/// takes this by value, so the transport cannot be torn down while a
/// notification might still be outstanding.
pub struct SenderStopped(pub(crate) ());

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::timeout;

    struct MockChannel {
        key: u64,
        delivered: Mutex<Vec<u64>>,
        fail: AtomicBool,
    }

    impl MockChannel {
        fn new(key: u64) -> Arc<Self> {
            Arc::new(MockChannel {
                key,
                delivered: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl CallbackChannel for MockChannel {
        fn key(&self) -> u64 {
            self.key
        }

        async fn notify(&self, seq: u64) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("connection lost");
            }
            self.delivered.lock().push(seq);
            Ok(())
        }
    }

    #[tokio::test]
    async fn double_registration_delivers_once_per_pass() {
        let registry = Arc::new(CallbackRegistry::new());
        let chan = MockChannel::new(7);
        registry.register(chan.clone());
        registry.register(chan.clone());
        assert_eq!(registry.len(), 1);

        let sender = CallbackSender::new(registry.clone(), Duration::from_secs(60));
        sender.broadcast(1).await;
        assert_eq!(*chan.delivered.lock(), vec![1]);
    }

    #[tokio::test]
    async fn failed_delivery_evicts_permanently() {
        let registry = Arc::new(CallbackRegistry::new());
        let healthy = MockChannel::new(1);
        let broken = MockChannel::new(2);
        registry.register(healthy.clone());
        registry.register(broken.clone());

        let sender = CallbackSender::new(registry.clone(), Duration::from_secs(60));
        sender.broadcast(1).await;
        assert_eq!(*broken.delivered.lock(), vec![1]);

        // one failure removes the endpoint without disturbing the others
        broken.fail.store(true, Ordering::SeqCst);
        sender.broadcast(2).await;
        assert_eq!(registry.len(), 1);

        // no resurrection: even if the endpoint recovers it stays evicted
        broken.fail.store(false, Ordering::SeqCst);
        sender.broadcast(3).await;
        assert_eq!(*broken.delivered.lock(), vec![1]);
        assert_eq!(*healthy.delivered.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stop_interrupts_the_sleep() {
        let registry = Arc::new(CallbackRegistry::new());
        let chan = MockChannel::new(1);
        registry.register(chan.clone());

        // an hour-long interval: stop must not wait for it to elapse
        let handle = CallbackSender::new(registry.clone(), Duration::from_secs(3600)).spawn();
        timeout(Duration::from_secs(5), async {
            while chan.delivered.lock().is_empty() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("first broadcast never happened");

        let _stopped: SenderStopped = timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop did not interrupt the sleep");

        // loop is fully joined, nothing is delivered afterwards
        let count = chan.delivered.lock().len();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(chan.delivered.lock().len(), count);
    }
}
