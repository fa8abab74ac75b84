//! Startup and shutdown coordination.
//!
//! Startup order: bind the transport, populate and expose the tree, start
//! the callback sender, start accepting remote calls, then block on the
//! shutdown trigger. Shutdown order is the one hard invariant: the sender
//! loop is stopped and joined before the transport is destroyed, enforced
//! at compile time by `Communicator::destroy` demanding the
//! [`SenderStopped`] proof.

use crate::callback::{CallbackRegistry, CallbackSender, SenderStopped};
use crate::protocol::config::Config;
use crate::server;
use crate::tree::Tree;
use anyhow::{Context, Result};
use log::{info, warn};
use quinn::Endpoint;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cloneable, idempotent shutdown trigger. The explicit shutdown request
/// and the interrupt handler both feed into the same token; concurrent
/// fires collapse into a single shutdown sequence.
#[derive(Clone, Default)]
pub struct ShutdownTrigger(CancellationToken);

impl ShutdownTrigger {
    pub fn new() -> Self {
        ShutdownTrigger(CancellationToken::new())
    }

    /// Safe to call from any task, any number of times.
    pub fn fire(&self) {
        self.0.cancel();
    }

    pub async fn triggered(&self) {
        self.0.cancelled().await
    }

    pub fn is_fired(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Owner of the QUIC endpoint, the process's communication layer.
pub struct Communicator {
    endpoint: Endpoint,
}

impl Communicator {
    pub async fn bind(addr: &str) -> Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid listen address {addr}"))?;
        let endpoint = server::make_server_endpoint(addr).await?;
        Ok(Communicator { endpoint })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    /// Tears down the transport. Requires proof that the callback sender
    /// has been joined, so no notify call can be outstanding while the
    /// endpoint goes away.
    pub async fn destroy(self, _sender: SenderStopped) {
        self.endpoint.close(0u32.into(), b"shutting down");
        self.endpoint.wait_idle().await;
    }
}

/// The demo content exposed on startup: a small poetry collection.
pub fn demo_tree() -> Result<Arc<Tree>> {
    let tree = Tree::new("/");
    let root = tree.root();

    let readme = tree.create_file(root, "README")?;
    tree.write(
        readme,
        vec!["This file system contains a collection of poetry.".to_string()],
    )?;

    let coleridge = tree.create_directory(root, "Coleridge")?;
    let kubla_khan = tree.create_file(coleridge, "Kubla_Khan")?;
    tree.write(
        kubla_khan,
        vec![
            "In Xanadu did Kubla Khan".to_string(),
            "A stately pleasure-dome decree:".to_string(),
            "Where Alph, the sacred river, ran".to_string(),
            "Through caverns measureless to man".to_string(),
            "Down to a sunless sea.".to_string(),
        ],
    )?;

    Ok(Arc::new(tree))
}

/// Runs the daemon until a shutdown trigger arrives, then tears everything
/// down in order.
pub async fn run(cfg: &Config) -> Result<()> {
    let communicator = Communicator::bind(&cfg.addr).await?;
    info!("[rfs] listening on {}", communicator.local_addr()?);

    let tree = demo_tree()?;
    let registry = Arc::new(CallbackRegistry::new());
    let trigger = ShutdownTrigger::new();

    let sender = CallbackSender::new(registry.clone(), cfg.notify_interval()).spawn();
    let accept_task = tokio::spawn(server::serve(
        communicator.endpoint(),
        tree,
        registry,
        trigger.clone(),
    ));

    // Forward Ctrl-C into the same trigger path as an explicit shutdown
    // request; subscribed exactly once.
    let signal_trigger = trigger.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("[rfs] interrupt received");
                signal_trigger.fire();
            }
            Err(e) => warn!("[rfs] failed to listen for interrupt: {e}"),
        }
    });

    trigger.triggered().await;
    info!("[rfs] shutting down");

    // join the sender loop first, then release the transport
    let stopped = sender.stop().await;
    communicator.destroy(stopped).await;
    if let Err(e) = accept_task.await {
        warn!("[rfs] accept task join failed: {e}");
    }
    info!("[rfs] terminated");
    Ok(())
}
