//! Socket server
//!
//! Clients connect over a Unix socket, send one byte-order marker (`B` or
//! `l`) and then X requests. Connection tasks only frame bytes; a single
//! dispatcher task owns the display state and handles requests in arrival
//! order, so no request ever observes another one half done.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use area_randr_proto::{ByteOrder, RequestHeader};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::client::{ClientId, Outbox, OUTBOX_CAPACITY};
use crate::config::ServerConfig;
use crate::display::DisplayState;
use crate::notify::ServerPhase;

/// Default socket location under the user's runtime directory
pub fn socket_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));
    PathBuf::from(runtime_dir).join("area-randr.sock")
}

/// Connection events forwarded to the dispatcher
#[derive(Debug)]
enum ServerMessage {
    Connected {
        client: ClientId,
        order: ByteOrder,
        outbox: Outbox,
    },
    Request {
        client: ClientId,
        header: RequestHeader,
        body: Vec<u8>,
    },
    /// A request whose body was skipped because its length was out of bounds
    BadLength {
        client: ClientId,
        header: RequestHeader,
    },
    Disconnected(ClientId),
}

pub struct PropertyServer {
    listener: UnixListener,
    path: PathBuf,
    display: DisplayState,
    max_request_length: usize,
    commit_interval: Duration,
}

impl PropertyServer {
    /// Bind the listening socket, replacing a stale one
    pub fn bind(display: DisplayState, path: &Path, config: &ServerConfig) -> Result<Self> {
        // Remove existing socket if present
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale socket {:?}", path))?;
        }

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(path)
            .with_context(|| format!("Failed to bind {:?}", path))?;
        info!("RandR property server listening on {:?}", path);

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            display,
            max_request_length: config.max_request_length as usize,
            commit_interval: Duration::from_millis(config.commit_interval_ms.max(1)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serve until `shutdown` resolves
    pub async fn serve_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Self {
            listener,
            path,
            mut display,
            max_request_length,
            commit_interval,
        } = self;

        let (tx, mut rx) = mpsc::channel(256);

        // Spawn acceptor task
        let acceptor = tokio::spawn(async move {
            let mut next_client = 1u32;
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let client = ClientId(next_client);
                        next_client = next_client.wrapping_add(1);
                        tokio::spawn(handle_client(
                            stream,
                            client,
                            tx.clone(),
                            max_request_length,
                        ));
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
        });

        let mut commit = tokio::time::interval(commit_interval);
        commit.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(ServerMessage::Connected { client, order, outbox }) => {
                        display.add_client(client, order, outbox);
                    }
                    Some(ServerMessage::Request { client, header, body }) => {
                        display.handle_request(client, header, &body);
                    }
                    Some(ServerMessage::BadLength { client, header }) => {
                        display.reject_request_length(client, header);
                    }
                    Some(ServerMessage::Disconnected(client)) => {
                        display.remove_client(client);
                    }
                    None => break,
                },
                _ = commit.tick() => {
                    display.post_pending_properties();
                }
                _ = &mut shutdown => {
                    info!("Shutting down RandR property server");
                    display.set_phase(ServerPhase::Terminating);
                    display.destroy_outputs();
                    break;
                }
            }
        }

        acceptor.abort();
        if let Err(e) = std::fs::remove_file(&path) {
            debug!("Failed to remove socket {:?}: {}", path, e);
        }
        Ok(())
    }
}

/// Handle a connected client
async fn handle_client(
    stream: UnixStream,
    client: ClientId,
    tx: mpsc::Sender<ServerMessage>,
    max_request_length: usize,
) {
    let (mut reader, mut writer) = stream.into_split();

    let mut marker = [0u8; 1];
    if reader.read_exact(&mut marker).await.is_err() {
        return;
    }
    let Some(order) = ByteOrder::from_marker(marker[0]) else {
        warn!("Client {} sent bad byte-order marker {:#x}", client.0, marker[0]);
        return;
    };

    let (outbox, mut packets, overflow) = Outbox::new(OUTBOX_CAPACITY);
    if tx
        .send(ServerMessage::Connected {
            client,
            order,
            outbox,
        })
        .await
        .is_err()
    {
        return;
    }

    // Reader task (client → dispatcher)
    let request_tx = tx.clone();
    let mut reader_task = tokio::spawn(async move {
        let mut head = [0u8; RequestHeader::SIZE];
        loop {
            if reader.read_exact(&mut head).await.is_err() {
                break;
            }
            let header = RequestHeader::parse(order, head);
            let len = header.byte_len();

            if len < RequestHeader::SIZE || len > max_request_length {
                warn!("Client {} sent a request of {} bytes", client.0, len);

                // Skip the body so the next request starts on a boundary
                let skip = len.saturating_sub(RequestHeader::SIZE) as u64;
                match tokio::io::copy(&mut (&mut reader).take(skip), &mut tokio::io::sink()).await {
                    Ok(skipped) if skipped == skip => {}
                    _ => break,
                }
                if request_tx
                    .send(ServerMessage::BadLength { client, header })
                    .await
                    .is_err()
                {
                    break;
                }
                continue;
            }

            let mut body = vec![0u8; len - RequestHeader::SIZE];
            if reader.read_exact(&mut body).await.is_err() {
                break;
            }

            let message = ServerMessage::Request {
                client,
                header,
                body,
            };
            if request_tx.send(message).await.is_err() {
                break;
            }
        }
        debug!("Reader task for client {} ended", client.0);
    });

    // Writer task (dispatcher → client)
    let mut writer_task = tokio::spawn(async move {
        while let Some(packet) = packets.recv().await {
            if writer.write_all(&packet).await.is_err() {
                break;
            }
        }
        debug!("Writer task for client {} ended", client.0);
    });

    // Wait for either task to finish, or for the outbox to overflow
    tokio::select! {
        _ = &mut reader_task => {}
        _ = &mut writer_task => {}
        full = overflow => {
            if full.is_ok() {
                reader_task.abort();
                writer_task.abort();
            }
        }
    }

    let _ = tx.send(ServerMessage::Disconnected(client)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use area_randr_proto::{
        WireWriter, CHANGE_OUTPUT_PROPERTY, LIST_OUTPUT_PROPERTIES, SELECT_INPUT,
    };
    use tokio::sync::oneshot;

    const MAJOR: u8 = 140;

    async fn start(dir: &Path) -> (PathBuf, oneshot::Sender<()>, tokio::task::JoinHandle<Result<()>>) {
        start_with(dir, Config::default()).await
    }

    async fn start_with(
        dir: &Path,
        config: Config,
    ) -> (PathBuf, oneshot::Sender<()>, tokio::task::JoinHandle<Result<()>>) {
        let display = DisplayState::from_config(&config).unwrap();
        let path = dir.join("randr.sock");
        let server = PropertyServer::bind(display, &path, &config.server).unwrap();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(server.serve_until(async {
            let _ = stop_rx.await;
        }));
        (path, stop_tx, handle)
    }

    fn request(minor: u8, body: &[u8]) -> Vec<u8> {
        let mut w = WireWriter::new(ByteOrder::Lsb);
        w.u8(MAJOR)
            .u8(minor)
            .u16(((body.len() + 4) / 4) as u16);
        let mut bytes = w.into_bytes();
        bytes.extend_from_slice(body);
        bytes
    }

    #[tokio::test]
    async fn test_list_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let (path, stop, handle) = start(dir.path()).await;

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"l").await.unwrap();
        stream
            .write_all(&request(LIST_OUTPUT_PROPERTIES, &0x42u32.to_le_bytes()))
            .await
            .unwrap();

        let mut reply = [0u8; 40];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], 1);
        assert_eq!(u16::from_le_bytes([reply[2], reply[3]]), 1);
        assert_eq!(u16::from_le_bytes([reply[8], reply[9]]), 2);

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_change_notifies_other_client() {
        let dir = tempfile::tempdir().unwrap();
        let (path, stop, handle) = start(dir.path()).await;

        let mut listener = UnixStream::connect(&path).await.unwrap();
        listener.write_all(b"B").await.unwrap();
        let mut select = WireWriter::new(ByteOrder::Msb);
        select.u8(MAJOR).u8(SELECT_INPUT).u16(3).u32(0x100).u16(8).pad(2);
        listener.write_all(&select.into_bytes()).await.unwrap();

        let mut writer = UnixStream::connect(&path).await.unwrap();
        writer.write_all(b"l").await.unwrap();
        let mut body = WireWriter::new(ByteOrder::Lsb);
        // "non-desktop" is interned right after the predefined atoms
        body.u32(0x42)
            .u32(69)
            .u32(19)
            .u8(32)
            .u8(0)
            .pad(2)
            .u32(1)
            .u32(1);
        // let the selection reach the dispatcher first
        tokio::time::sleep(Duration::from_millis(50)).await;
        writer
            .write_all(&request(CHANGE_OUTPUT_PROPERTY, &body.into_bytes()))
            .await
            .unwrap();

        let mut event = [0u8; 32];
        listener.read_exact(&mut event).await.unwrap();
        assert_eq!(event[0], 89 + 1);
        assert_eq!(event[1], 2);
        assert_eq!(u32::from_be_bytes([event[12], event[13], event[14], event[15]]), 69);

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bad_marker_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let (path, stop, handle) = start(dir.path()).await;

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"x").await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bad_request_length_answers_and_keeps_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.max_request_length = 64;
        let (path, stop, handle) = start_with(dir.path(), config).await;

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"l").await.unwrap();

        // 104 bytes, over the limit
        stream
            .write_all(&request(CHANGE_OUTPUT_PROPERTY, &[0u8; 100]))
            .await
            .unwrap();
        let list = request(LIST_OUTPUT_PROPERTIES, &0x42u32.to_le_bytes());
        stream.write_all(&list).await.unwrap();
        // a zero length field, without BIG-REQUESTS
        stream
            .write_all(&[MAJOR, LIST_OUTPUT_PROPERTIES, 0, 0])
            .await
            .unwrap();
        stream.write_all(&list).await.unwrap();

        let mut error = [0u8; 32];
        let mut reply = [0u8; 40];

        stream.read_exact(&mut error).await.unwrap();
        assert_eq!(error[0], 0);
        assert_eq!(error[1], 16);
        assert_eq!(u16::from_le_bytes([error[2], error[3]]), 1);
        assert_eq!(error[8], CHANGE_OUTPUT_PROPERTY);
        assert_eq!(error[10], MAJOR);

        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], 1);
        assert_eq!(u16::from_le_bytes([reply[2], reply[3]]), 2);

        stream.read_exact(&mut error).await.unwrap();
        assert_eq!(error[1], 16);
        assert_eq!(u16::from_le_bytes([error[2], error[3]]), 3);

        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], 1);
        assert_eq!(u16::from_le_bytes([reply[2], reply[3]]), 4);
        assert_eq!(u16::from_le_bytes([reply[8], reply[9]]), 2);

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
