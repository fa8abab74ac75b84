use crate::callback::{CallbackChannel, CallbackRegistry};
use crate::lifecycle::ShutdownTrigger;
use crate::protocol::{DirEntry, NodeKind, RemoteError, RfsMessage};
use crate::tree::Tree;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use quinn::{Connection, Endpoint, ServerConfig};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use std::net::SocketAddr;
use std::sync::Arc;

const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Accept loop: serve QUIC connections until the shutdown trigger fires.
/// Spawns a task per accepted connection; per-connection failures are
/// logged and never fatal to the loop.
pub async fn serve(
    endpoint: Endpoint,
    tree: Arc<Tree>,
    registry: Arc<CallbackRegistry>,
    trigger: ShutdownTrigger,
) {
    loop {
        let connecting = tokio::select! {
            connecting = endpoint.accept() => connecting,
            _ = trigger.triggered() => break,
        };
        let Some(connecting) = connecting else { break };

        let tree = tree.clone();
        let registry = registry.clone();
        let trigger = trigger.clone();
        tokio::spawn(async move {
            match connecting.await {
                Ok(conn) => {
                    let addr = conn.remote_address();
                    info!("[server] connection accepted: addr={addr}");
                    if let Err(e) = handle_connection(conn, tree, registry, trigger).await {
                        debug!("[server] connection from {addr} ended: {e:#}");
                    }
                }
                Err(e) => warn!("[server] failed to establish connection: {e}"),
            }
        });
    }
    debug!("[server] accept loop exited");
}

/// Serves one client: each bidirectional stream carries a single request
/// and its single response. Callback notifications go the other way, on
/// server-opened unidirectional streams over this same connection.
async fn handle_connection(
    conn: Connection,
    tree: Arc<Tree>,
    registry: Arc<CallbackRegistry>,
    trigger: ShutdownTrigger,
) -> Result<()> {
    loop {
        let (mut send, mut recv) = conn.accept_bi().await?;
        let buf = recv.read_to_end(MAX_REQUEST_BYTES).await?;
        let (resp, shutdown_after_reply) = match bincode::deserialize::<RfsMessage>(&buf) {
            Ok(req) => {
                let shutdown = matches!(req, RfsMessage::Shutdown);
                (dispatch(req, &conn, &tree, &registry), shutdown)
            }
            Err(e) => {
                warn!("[server] bad request from {}: {e}", conn.remote_address());
                (
                    RfsMessage::Error(RemoteError::Unsupported("malformed request".to_string())),
                    false,
                )
            }
        };
        let data = bincode::serialize(&resp)?;
        send.write_all(&data).await?;
        send.finish()?;

        // fire only after the ack is on the wire
        if shutdown_after_reply {
            info!(
                "[server] shutdown requested by {}",
                conn.remote_address()
            );
            trigger.fire();
        }
    }
}

fn dispatch(
    req: RfsMessage,
    conn: &Connection,
    tree: &Arc<Tree>,
    registry: &Arc<CallbackRegistry>,
) -> RfsMessage {
    match req {
        RfsMessage::List(dir) => match tree.list(dir) {
            Ok(entries) => RfsMessage::Entries(
                entries
                    .into_iter()
                    .map(|(name, kind)| DirEntry { name, kind })
                    .collect(),
            ),
            Err(e) => RfsMessage::Error(e.into()),
        },
        RfsMessage::CreateFile { dir, name } => match tree.create_file(dir, &name) {
            Ok(id) => RfsMessage::Node {
                id,
                kind: NodeKind::File,
            },
            Err(e) => RfsMessage::Error(e.into()),
        },
        RfsMessage::CreateDirectory { dir, name } => match tree.create_directory(dir, &name) {
            Ok(id) => RfsMessage::Node {
                id,
                kind: NodeKind::Directory,
            },
            Err(e) => RfsMessage::Error(e.into()),
        },
        RfsMessage::Find { dir, name } => match tree.find(dir, &name) {
            Ok((id, kind)) => RfsMessage::Node { id, kind },
            Err(e) => RfsMessage::Error(e.into()),
        },
        RfsMessage::Read(file) => match tree.read(file) {
            Ok(lines) => RfsMessage::Lines(lines),
            Err(e) => RfsMessage::Error(e.into()),
        },
        RfsMessage::Write(file, lines) => match tree.write(file, lines) {
            Ok(()) => RfsMessage::Ack,
            Err(e) => RfsMessage::Error(e.into()),
        },
        RfsMessage::RegisterCallback => {
            registry.register(Arc::new(QuicCallback { conn: conn.clone() }));
            RfsMessage::Ack
        }
        RfsMessage::Shutdown => RfsMessage::Ack,
        other => {
            warn!("[server] unexpected message: {other:?}");
            RfsMessage::Error(RemoteError::Unsupported(format!("not a request: {other:?}")))
        }
    }
}

/// Callback endpoint reached back over the connection the client used to
/// call in — no separate inbound connection to the client is needed.
struct QuicCallback {
    conn: Connection,
}

#[async_trait]
impl CallbackChannel for QuicCallback {
    fn key(&self) -> u64 {
        self.conn.stable_id() as u64
    }

    async fn notify(&self, seq: u64) -> Result<()> {
        let mut stream = self.conn.open_uni().await?;
        let data = bincode::serialize(&RfsMessage::Notify(seq))?;
        stream.write_all(&data).await?;
        stream.finish()?;
        Ok(())
    }
}

/// set up the QUIC server endpoint with TLS certificate.
pub(crate) async fn make_server_endpoint(bind_addr: SocketAddr) -> Result<Endpoint> {
    let server_config = configure_server()?;
    let endpoint = Endpoint::server(server_config, bind_addr)?;
    Ok(endpoint)
}

/// generates a self-signed TLS certificate and constructs QUIC server config.
fn configure_server() -> Result<ServerConfig> {
    let _ = CryptoProvider::install_default(rustls::crypto::ring::default_provider());
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
    let cert_der = CertificateDer::from(cert.serialize_der()?);
    let key = PrivatePkcs8KeyDer::from(cert.serialize_private_key_der());
    let certs = vec![cert_der];
    let server_config =
        ServerConfig::with_single_cert(certs, rustls::pki_types::PrivateKeyDer::Pkcs8(key))?;
    Ok(server_config)
}
