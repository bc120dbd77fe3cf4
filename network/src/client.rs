use crate::connection::{Connection, ReceivedMessage};
use crate::queue::SharedQueue;
use crate::wire::{Frame, MessageHeader};
use num_bigint::BigUint;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};

/// Connecting transport role: one synchronously-established connection with
/// its own reactor thread and inbound queue.
pub struct ClientTransport {
    runtime: Runtime,
    conn: Arc<Connection>,
    incoming: SharedQueue<ReceivedMessage>,
}

impl ClientTransport {
    /// Resolves `(host, port)` and connects. Reading starts immediately.
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let stream = runtime.block_on(TcpStream::connect((host, port)))?;
        let incoming = SharedQueue::new();
        let conn = Connection::new(runtime.handle(), stream, 0);
        conn.start_reading(runtime.handle(), incoming.clone());
        Ok(Self {
            runtime,
            conn,
            incoming,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn incoming(&self) -> &SharedQueue<ReceivedMessage> {
        &self.incoming
    }

    pub fn send_frame(&self, frame: Frame) {
        self.conn.send(frame);
    }

    /// Sends one element vector under the round-message header convention.
    pub fn send_elements(
        &self,
        sid: u32,
        sender_id: u32,
        mixing_state_id: u16,
        elems: &[BigUint],
        width: usize,
    ) {
        let mut frame = Frame {
            header: MessageHeader {
                sid,
                sender_id,
                mixing_state_id,
                block_idx: 1,
                tot_num_blocks: 1,
                dimension: 1,
                time_ns: MessageHeader::now_ns(),
                ..Default::default()
            },
            body: Vec::new(),
        };
        frame.push_elements(elems, width);
        self.send_frame(frame);
    }

    /// Sends one client submission: an encoded-share row under state 0 with
    /// the submitting message index as the sender id.
    pub fn submit_message(&self, sid: u32, msg_idx: u32, elems: &[BigUint], width: usize) {
        self.send_elements(sid, msg_idx, 0, elems, width);
    }

    pub fn disconnect(self) {
        self.runtime.shutdown_timeout(Duration::from_secs(1));
    }
}
