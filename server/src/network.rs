//! Connection multiplexing and request handling.
//!
//! One coordinating loop owns every piece of mutable state: the channel
//! registry, the chunk buffer, and the read-only dataset handles. Each
//! admitted connection gets a reader task, which parses one request at
//! a time and forwards it, and a writer task, which drains that
//! channel's outbound frame queue. The loop services exactly one
//! request at a time, synchronously, including the full amalgamation —
//! so there is never concurrent mutation, while slow receivers only
//! stall their own queue, not their neighbours'.
//!
//! Cross-channel output (a control request on channel A producing
//! records on channel B) is expressed as frames queued to the target's
//! writer task; nothing ever writes to a socket it does not own.

use crate::amalgamate::{amalgamate, AmalgamateLimits};
use crate::buffer::{ChunkBuffer, DEFAULT_CAPACITY, DEFAULT_FLUSH_AT};
use crate::registry::{Channel, ChannelId, ChannelRegistry, ChannelRole};
use crate::request::{parse_request, Request};
use log::{debug, error, info, warn};
use shared::wire;
use shared::{Dataset, GroupList, ViewRequest};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Longest request or header line accepted before the connection is
/// treated as misbehaving.
const MAX_LINE_BYTES: usize = 8192;

/// Messages sent from connection tasks to the coordinating loop.
#[derive(Debug)]
pub enum ServerMessage {
    /// One full request was read on a channel; `line` is its request
    /// line with header lines already consumed and discarded.
    Request { id: ChannelId, line: String },
    /// The remote end closed, the line limit was breached, or a write
    /// failed; the channel must be torn down.
    Closed { id: ChannelId },
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub max_connections: usize,
    /// File served verbatim at `GET /control/html`.
    pub html_path: Option<PathBuf>,
    pub limits: AmalgamateLimits,
    pub buffer_capacity: usize,
    pub buffer_flush_at: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            html_path: None,
            limits: AmalgamateLimits::default(),
            buffer_capacity: DEFAULT_CAPACITY,
            buffer_flush_at: DEFAULT_FLUSH_AT,
        }
    }
}

/// The trajectory streaming server.
pub struct Server {
    listener: TcpListener,
    registry: ChannelRegistry,
    dataset: Arc<Dataset>,
    groups: Arc<GroupList>,
    options: ServerOptions,
    buffer: ChunkBuffer,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        dataset: Arc<Dataset>,
        groups: Arc<GroupList>,
        options: ServerOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        Ok(Server {
            listener,
            registry: ChannelRegistry::new(options.max_connections),
            buffer: ChunkBuffer::new(options.buffer_capacity, options.buffer_flush_at),
            dataset,
            groups,
            options,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The coordinating loop. Returns only on a listener failure, which
    /// is fatal to the whole process.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    self.admit(stream, peer);
                }
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::Request { id, line }) => {
                            self.handle_request(id, &line).await;
                        }
                        Some(ServerMessage::Closed { id }) => {
                            debug!("Channel {id} reported closed");
                            self.teardown(id);
                        }
                        // the server holds its own sender, so the queue
                        // cannot run dry
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        let Some(id) = self.registry.allocate() else {
            warn!(
                "Rejecting connection from {peer}: all {} slots in use",
                self.registry.capacity()
            );
            // dropping the stream closes it without a handshake
            return;
        };
        let (read_half, write_half) = stream.into_split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_requests(id, read_half, self.server_tx.clone()));
        tokio::spawn(write_frames(id, write_half, out_rx, self.server_tx.clone()));
        self.registry.insert(Channel::new(id, out_tx, reader));
        info!("Connection from {peer} registered as channel {id}");
    }

    async fn handle_request(&mut self, id: ChannelId, line: &str) {
        debug!("Channel {id} request: {line}");
        match parse_request(line) {
            Request::OpenData => self.open_data_channel(id),
            Request::ControlPage => self.serve_control_page(id).await,
            Request::Control { target, view } => self.handle_control(id, target, &view),
            Request::Malformed(error) => {
                warn!("Channel {id} sent a malformed control request: {error}");
                self.send(id, wire::bad_request());
            }
            Request::Unknown => {
                warn!("Channel {id} requested an unknown path");
                self.send(id, wire::not_found());
                self.teardown(id);
            }
        }
    }

    fn open_data_channel(&mut self, id: ChannelId) {
        info!("Channel {id} set up as data channel");
        self.registry.mark_data(id);
        self.send(id, wire::DATA_RESPONSE_HEAD.as_bytes().to_vec());
        self.send(id, wire::identity_chunk(id));
    }

    async fn serve_control_page(&mut self, id: ChannelId) {
        let body = match &self.options.html_path {
            Some(path) => tokio::fs::read(path).await.map_err(|error| {
                error!("Cannot open control page {}: {error}", path.display());
            }),
            None => {
                error!("No control page configured");
                Err(())
            }
        };
        match body {
            Ok(body) => {
                let mut response = wire::html_head(body.len());
                response.extend_from_slice(&body);
                self.send(id, response);
            }
            Err(()) => {
                self.send(id, wire::not_found());
                self.teardown(id);
            }
        }
    }

    /// The control connection is acknowledged before the target is even
    /// resolved; an unresolved target looks identical to success from
    /// the caller's side. See DESIGN.md on this degraded-success mode.
    fn handle_control(&mut self, id: ChannelId, target: ChannelId, view: &ViewRequest) {
        self.send(id, wire::control_ack());
        match self.registry.get(target) {
            None => {
                warn!("Control request from channel {id} targets unknown channel {target}");
                return;
            }
            Some(channel) if channel.role != ChannelRole::Data => {
                warn!("Control request from channel {id} targets non-data channel {target}");
                return;
            }
            Some(_) => {}
        }
        debug!("View update for channel {target}: {view:?}");
        let mut frames = Vec::new();
        let records = amalgamate(
            view,
            &self.dataset,
            &self.groups,
            self.options.limits,
            &mut self.buffer,
            &mut |frame| frames.push(frame),
        );
        debug!(
            "Streaming {records} records to channel {target} in {} chunks",
            frames.len()
        );
        for frame in frames {
            if !self.registry.get(target).is_some_and(|c| c.send(frame)) {
                warn!("Channel {target} went away mid-stream");
                self.teardown(target);
                break;
            }
        }
    }

    fn send(&mut self, id: ChannelId, frame: Vec<u8>) {
        if let Some(channel) = self.registry.get(id) {
            if !channel.send(frame) {
                warn!("Channel {id} writer is gone");
                self.teardown(id);
            }
        }
    }

    fn teardown(&mut self, id: ChannelId) {
        if self.registry.unregister(id) {
            info!("Channel {id} closed");
        }
    }
}

/// Reads requests off one connection until the remote closes or a line
/// violates the protocol, forwarding each to the coordinating loop.
async fn read_requests(
    id: ChannelId,
    read_half: OwnedReadHalf,
    tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let mut reader = BufReader::new(read_half);
    loop {
        match read_request(&mut reader).await {
            Ok(Some(line)) => {
                if tx.send(ServerMessage::Request { id, line }).is_err() {
                    break;
                }
            }
            Ok(None) => {
                let _ = tx.send(ServerMessage::Closed { id });
                break;
            }
            Err(error) => {
                warn!("Read on channel {id} failed: {error}");
                let _ = tx.send(ServerMessage::Closed { id });
                break;
            }
        }
    }
}

/// Reads one header block: the request line plus discarded lines up to
/// the blank separator. Returns None on a clean end of stream. An empty
/// request line is returned as-is and dispatched (to not-found) without
/// waiting for a separator, matching the legacy reader.
async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<Option<String>> {
    let Some(request_line) = read_line(reader).await? else {
        return Ok(None);
    };
    if !request_line.is_empty() {
        loop {
            match read_line(reader).await? {
                // remote closed mid-request
                None => return Ok(None),
                Some(line) if line.is_empty() => break,
                Some(line) => debug!("Discarding header line: {line}"),
            }
        }
    }
    Ok(Some(request_line))
}

/// Reads one line, buffering at most `MAX_LINE_BYTES` + 1 bytes. A line
/// that hits the cap without a newline is a protocol error, not a
/// partial read.
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<Option<String>> {
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if n > MAX_LINE_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "request line too long",
        ));
    }
    let mut line = String::from_utf8_lossy(&buf).into_owned();
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// Drains one channel's outbound queue onto its socket. Ends when the
/// registry drops the sender (shutting the write side down) or a write
/// fails.
async fn write_frames(
    id: ChannelId,
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    tx: mpsc::UnboundedSender<ServerMessage>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(error) = write_frame(&mut write_half, &frame).await {
            warn!("Write to channel {id} failed: {error}");
            let _ = tx.send(ServerMessage::Closed { id });
            return;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn write_frame(write_half: &mut OwnedWriteHalf, frame: &[u8]) -> std::io::Result<()> {
    write_half.write_all(frame).await?;
    write_half.flush().await
}
