use crate::queue::SharedQueue;
use crate::wire::{Frame, MessageHeader, HEADER_LEN};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A completed inbound frame together with the connection it arrived on, so
/// that a reply can be sent back to the originator.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub conn: Arc<Connection>,
    pub frame: Frame,
}

/// One byte stream. Sending enqueues onto the connection's outbound channel
/// and returns immediately; a single writer task drains it header-then-body
/// in FIFO order, so concurrent senders never interleave frames. Reading
/// starts once the owner has accepted the connection.
#[derive(Debug)]
pub struct Connection {
    id: u32,
    outgoing: mpsc::UnboundedSender<Frame>,
    connected: Arc<AtomicBool>,
    pending_read: Mutex<Option<OwnedReadHalf>>,
}

impl Connection {
    /// Splits the stream and spawns the writer task. The read half is held
    /// back until [`Connection::start_reading`].
    pub fn new(handle: &Handle, stream: TcpStream, id: u32) -> Arc<Self> {
        let (read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
        let connected = Arc::new(AtomicBool::new(true));

        let writer_connected = Arc::clone(&connected);
        handle.spawn(async move {
            while let Some(frame) = rx.recv().await {
                let header = frame.header.to_bytes();
                if let Err(err) = write_half.write_all(&header).await {
                    warn!(id, %err, "writing header failed");
                    writer_connected.store(false, Ordering::SeqCst);
                    return;
                }
                if !frame.body.is_empty() {
                    if let Err(err) = write_half.write_all(&frame.body).await {
                        warn!(id, %err, "writing body failed");
                        writer_connected.store(false, Ordering::SeqCst);
                        return;
                    }
                }
            }
        });

        Arc::new(Self {
            id,
            outgoing: tx,
            connected,
            pending_read: Mutex::new(Some(read_half)),
        })
    }

    /// Begins the read loop, pushing every completed frame onto `incoming`.
    /// A no-op if reading already started.
    pub fn start_reading(self: &Arc<Self>, handle: &Handle, incoming: SharedQueue<ReceivedMessage>) {
        let Some(mut read_half) = self
            .pending_read
            .lock()
            .expect("connection lock poisoned")
            .take()
        else {
            return;
        };
        let conn = Arc::clone(self);
        handle.spawn(async move {
            loop {
                let mut header_bytes = [0u8; HEADER_LEN];
                if let Err(err) = read_half.read_exact(&mut header_bytes).await {
                    debug!(id = conn.id, %err, "reading header failed");
                    conn.connected.store(false, Ordering::SeqCst);
                    return;
                }
                let header = MessageHeader::from_bytes(&header_bytes);
                let mut body = vec![0u8; header.size as usize];
                if header.size > 0 {
                    if let Err(err) = read_half.read_exact(&mut body).await {
                        warn!(id = conn.id, %err, "reading body failed");
                        conn.connected.store(false, Ordering::SeqCst);
                        return;
                    }
                }
                incoming.push_back(ReceivedMessage {
                    conn: Arc::clone(&conn),
                    frame: Frame { header, body },
                });
            }
        });
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Enqueues a frame for transmission. Never blocks; a dead writer marks
    /// the connection disconnected.
    pub fn send(&self, frame: Frame) {
        if self.outgoing.send(frame).is_err() {
            self.connected.store(false, Ordering::SeqCst);
        }
    }
}
