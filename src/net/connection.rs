/* This file is part of nzcore.
 *
 * Copyright (C) 2024-2026 NewZone Project Contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! `Connection` wraps a reliable byte stream (TCP socket, WebSocket,
//! or any `AsyncRead + AsyncWrite`) with its own `FrameParser`,
//! keep-alive bookkeeping, and a small state machine. The pool is the
//! sole strong-reference owner; everyone else observes through
//! `disconnected()`.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use futures::{io::WriteHalf, AsyncWrite, AsyncWriteExt};
use smol::lock::Mutex;

use crate::{
    error::{Error, Result},
    net::frame::{Frame, FrameError, FrameParser, MessageType},
    system::{Subscriber, SubscriberPtr},
};

pub type ConnId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisconnectEvent {
    pub conn_id: ConnId,
    pub reason: String,
}

#[derive(Default)]
struct Counters {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    msgs_in: AtomicU64,
    msgs_out: AtomicU64,
}

/// A single framed connection. Generic over the underlying writer half
/// of the stream; the read loop is driven separately by whatever owns
/// the matching read half (see `ConnectionPool`/transport glue).
pub struct Connection<W: AsyncWrite + Unpin + Send + 'static> {
    pub id: ConnId,
    pub peer_id: Mutex<Option<String>>,
    state: Mutex<ConnectionState>,
    parser: Mutex<FrameParser>,
    writer: Mutex<W>,
    counters: Counters,
    last_activity: AtomicU64,
    pub disconnected: SubscriberPtr<DisconnectEvent>,
    max_frame_size: usize,
}

impl<W: AsyncWrite + Unpin + Send + 'static> Connection<W> {
    pub fn new(id: ConnId, writer: W, max_frame_size: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            peer_id: Mutex::new(None),
            state: Mutex::new(ConnectionState::Connecting),
            parser: Mutex::new(FrameParser::new(max_frame_size)),
            writer: Mutex::new(writer),
            counters: Counters::default(),
            last_activity: AtomicU64::new(0),
            disconnected: Subscriber::new(),
            max_frame_size,
        })
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    pub async fn mark_connected(&self) {
        *self.state.lock().await = ConnectionState::Connected;
    }

    pub fn touch(&self, now_unix: u64) {
        self.last_activity.store(now_unix, Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> u64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    pub fn bytes_in(&self) -> u64 {
        self.counters.bytes_in.load(Ordering::Relaxed)
    }

    pub fn bytes_out(&self) -> u64 {
        self.counters.bytes_out.load(Ordering::Relaxed)
    }

    /// Enqueue `frame` for sending. Concurrent sends are serialized by
    /// the writer lock. Returns after the write completes (or would
    /// complete once the OS buffer drains).
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.to_buffer();
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await.map_err(|e| Error::Io(e.to_string()))?;
        writer.flush().await.map_err(|e| Error::Io(e.to_string()))?;
        self.counters.bytes_out.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.counters.msgs_out.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Feed newly received bytes into the connection's `FrameParser`,
    /// auto-responding to PING/DISCONNECT and returning the remaining
    /// application-visible frames. On a structural frame error, the
    /// connection transitions to `Error` and emits `frame_error`.
    pub async fn feed_inbound(&self, bytes: &[u8]) -> Vec<Frame> {
        self.counters.bytes_in.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        let (frames, err) = self.parser.lock().await.feed(bytes);
        self.counters.msgs_in.fetch_add(frames.len() as u64, Ordering::Relaxed);

        if let Some(frame_err) = err {
            self.fail(frame_err).await;
            return Vec::new()
        }

        let mut app_frames = Vec::with_capacity(frames.len());
        for frame in frames {
            match frame.msg_type {
                MessageType::Ping => {
                    let pong = Frame::new(MessageType::Pong, 0, frame.payload.clone());
                    let _ = self.send(&pong).await;
                }
                MessageType::Disconnect => {
                    self.close("remote_disconnect".to_string()).await;
                }
                _ => app_frames.push(frame),
            }
        }
        app_frames
    }

    async fn fail(&self, frame_err: FrameError) {
        *self.state.lock().await = ConnectionState::Error;
        self.disconnected
            .notify(DisconnectEvent { conn_id: self.id, reason: frame_err.as_str().to_string() })
            .await;
    }

    /// Transition through `Disconnecting -> Disconnected` and notify
    /// observers with `reason`.
    pub async fn close(&self, reason: String) {
        *self.state.lock().await = ConnectionState::Disconnecting;
        let _ = self.writer.lock().await.close().await;
        *self.state.lock().await = ConnectionState::Disconnected;
        self.disconnected.notify(DisconnectEvent { conn_id: self.id, reason }).await;
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

pub type TcpConnection = Connection<WriteHalf<smol::net::TcpStream>>;

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    #[test]
    fn send_writes_framed_bytes() {
        smol::block_on(async {
            let buf: Vec<u8> = Vec::new();
            let conn = Connection::new(1, Cursor::new(buf), 1024);
            conn.mark_connected().await;
            let frame = Frame::new(MessageType::Data, 0, b"hi".to_vec());
            conn.send(&frame).await.unwrap();
            assert_eq!(conn.bytes_out(), frame.to_buffer().len() as u64);
        });
    }

    #[test]
    fn ping_triggers_auto_pong() {
        smol::block_on(async {
            let buf: Vec<u8> = Vec::new();
            let conn = Connection::new(1, Cursor::new(buf), 1024);
            conn.mark_connected().await;
            let ping = Frame::new(MessageType::Ping, 0, b"rtt-token".to_vec());
            let app_frames = conn.feed_inbound(&ping.to_buffer()).await;
            assert!(app_frames.is_empty());
            assert_eq!(conn.counters.msgs_out.load(Ordering::Relaxed), 1);
        });
    }

    #[test]
    fn frame_error_transitions_to_error_state() {
        smol::block_on(async {
            let buf: Vec<u8> = Vec::new();
            let conn = Connection::new(1, Cursor::new(buf), 1024);
            conn.mark_connected().await;
            let garbage = [0u8; 10];
            let _ = conn.feed_inbound(&garbage).await;
            assert_eq!(conn.state().await, ConnectionState::Error);
        });
    }

    #[test]
    fn disconnect_frame_closes_connection() {
        smol::block_on(async {
            let buf: Vec<u8> = Vec::new();
            let conn = Connection::new(1, Cursor::new(buf), 1024);
            conn.mark_connected().await;
            let sub = conn.disconnected.subscribe().await;
            let disconnect = Frame::new(MessageType::Disconnect, 0, vec![]);
            let _ = conn.feed_inbound(&disconnect.to_buffer()).await;
            assert_eq!(conn.state().await, ConnectionState::Disconnected);
            let event = sub.receive().await;
            assert_eq!(event.reason, "remote_disconnect");
        });
    }
}
