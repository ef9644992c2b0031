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

//! Bounded pool of connections, indexed both by connection id and by
//! peer id. The pool is the sole strong-reference owner of every
//! `Connection` it holds; everything else gets a weak/shared
//! reference via `Arc` clones it hands out, never ownership.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use futures::AsyncWrite;
use smol::lock::Mutex;

use crate::{
    error::{Error, Result},
    net::connection::{ConnId, Connection, ConnectionState},
    system::{self, Subscriber, SubscriberPtr},
};

pub const DEFAULT_MAX_SIZE: usize = 1000;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 5 * 60;
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

pub struct PoolConfig {
    pub max_size: usize,
    pub idle_timeout_secs: u64,
    pub check_interval_secs: u64,
    pub min_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            min_size: 0,
        }
    }
}

#[derive(Default)]
pub struct PoolMetrics {
    pub total_created: AtomicU64,
    pub total_destroyed: AtomicU64,
    pub total_acquired: AtomicU64,
    pub total_released: AtomicU64,
    pub acquire_errors: AtomicU64,
}

pub struct BroadcastResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolEvent {
    pub conn_id: ConnId,
    pub kind: &'static str,
}

/// Generic over the connection's writer half, matching `Connection<W>`.
pub struct ConnectionPool<W: AsyncWrite + Unpin + Send + 'static> {
    config: PoolConfig,
    by_id: Mutex<HashMap<ConnId, Arc<Connection<W>>>>,
    by_peer: Mutex<HashMap<String, HashSet<ConnId>>>,
    pub metrics: PoolMetrics,
    pub events: SubscriberPtr<PoolEvent>,
}

impl<W: AsyncWrite + Unpin + Send + 'static> ConnectionPool<W> {
    pub fn new(config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            by_id: Mutex::new(HashMap::new()),
            by_peer: Mutex::new(HashMap::new()),
            metrics: PoolMetrics::default(),
            events: Subscriber::new(),
        })
    }

    pub async fn size(&self) -> usize {
        self.by_id.lock().await.len()
    }

    /// Register `conn` under `peer_id`, refusing with `PoolFull` if the
    /// pool is already at `max_size`.
    pub async fn add(self: &Arc<Self>, peer_id: String, conn: Arc<Connection<W>>) -> Result<()> {
        let mut by_id = self.by_id.lock().await;
        if by_id.len() >= self.config.max_size {
            return Err(Error::PoolFull)
        }
        *conn.peer_id.lock().await = Some(peer_id.clone());
        by_id.insert(conn.id, conn.clone());
        drop(by_id);

        self.by_peer.lock().await.entry(peer_id).or_default().insert(conn.id);
        self.metrics.total_created.fetch_add(1, Ordering::Relaxed);
        self.events.notify(PoolEvent { conn_id: conn.id, kind: "connection_added" }).await;

        let pool = self.clone();
        let conn_id = conn.id;
        let disconnects = conn.disconnected.subscribe().await;
        smol::spawn(async move {
            disconnects.receive().await;
            pool.remove(conn_id).await;
        })
        .detach();

        Ok(())
    }

    /// Drop `id` from both indices and close it with reason
    /// `pool_removed`.
    pub async fn remove(&self, id: ConnId) {
        let conn = self.by_id.lock().await.remove(&id);
        let Some(conn) = conn else { return };

        if let Some(peer_id) = conn.peer_id.lock().await.clone() {
            let mut by_peer = self.by_peer.lock().await;
            if let Some(set) = by_peer.get_mut(&peer_id) {
                set.remove(&id);
                if set.is_empty() {
                    by_peer.remove(&peer_id);
                }
            }
        }

        if conn.state().await != ConnectionState::Disconnected {
            conn.close("pool_removed".to_string()).await;
        }
        self.metrics.total_destroyed.fetch_add(1, Ordering::Relaxed);
        self.events.notify(PoolEvent { conn_id: id, kind: "connection_removed" }).await;
    }

    /// Return any currently `Connected` connection to `peer_id`, or
    /// `NoConnection` after `timeout_ms` elapses with none available.
    pub async fn acquire(&self, peer_id: &str, timeout_ms: u64) -> Result<Arc<Connection<W>>> {
        let deadline = std::time::Duration::from_millis(timeout_ms);
        let start = std::time::Instant::now();
        loop {
            if let Some(conn) = self.find_connected(peer_id).await {
                self.metrics.total_acquired.fetch_add(1, Ordering::Relaxed);
                return Ok(conn)
            }
            if start.elapsed() >= deadline {
                self.metrics.acquire_errors.fetch_add(1, Ordering::Relaxed);
                return Err(Error::NoConnection)
            }
            system::sleep(1).await;
        }
    }

    async fn find_connected(&self, peer_id: &str) -> Option<Arc<Connection<W>>> {
        let by_peer = self.by_peer.lock().await;
        let ids = by_peer.get(peer_id)?.clone();
        drop(by_peer);
        let by_id = self.by_id.lock().await;
        for id in ids {
            if let Some(conn) = by_id.get(&id) {
                if conn.state().await == ConnectionState::Connected {
                    return Some(conn.clone())
                }
            }
        }
        None
    }

    pub fn release(&self) {
        self.metrics.total_released.fetch_add(1, Ordering::Relaxed);
    }

    /// Best-effort fan-out of a DATA frame's raw bytes to every
    /// `Connected` connection except those in `exclude`.
    pub async fn broadcast(&self, frame: &crate::net::frame::Frame, exclude: &HashSet<ConnId>) -> BroadcastResult {
        let conns: Vec<Arc<Connection<W>>> = self.by_id.lock().await.values().cloned().collect();
        let mut total = 0;
        let mut successful = 0;
        for conn in conns {
            if exclude.contains(&conn.id) {
                continue
            }
            if conn.state().await != ConnectionState::Connected {
                continue
            }
            total += 1;
            if conn.send(frame).await.is_ok() {
                successful += 1;
            }
        }
        BroadcastResult { total, successful, failed: total - successful }
    }

    /// Evict connections idle past `idle_timeout_secs`, never dropping
    /// below `min_size`.
    pub async fn sweep_idle(&self, now_unix: u64) {
        let by_id = self.by_id.lock().await;
        if by_id.len() <= self.config.min_size {
            return
        }
        let mut candidates: Vec<ConnId> = by_id
            .values()
            .filter(|c| c.last_activity() + self.config.idle_timeout_secs < now_unix)
            .map(|c| c.id)
            .collect();
        let headroom = by_id.len() - self.config.min_size;
        candidates.truncate(headroom);
        drop(by_id);

        for id in candidates {
            self.remove(id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::frame::{Frame, MessageType};
    use futures::io::Cursor;

    fn test_conn(id: ConnId) -> Arc<Connection<Cursor<Vec<u8>>>> {
        Connection::new(id, Cursor::new(Vec::new()), 1024)
    }

    #[test]
    fn add_and_acquire_roundtrip() {
        smol::block_on(async {
            let pool = ConnectionPool::new(PoolConfig::default());
            let conn = test_conn(1);
            conn.mark_connected().await;
            pool.add("peer-a".to_string(), conn.clone()).await.unwrap();

            let acquired = pool.acquire("peer-a", 10).await.unwrap();
            assert_eq!(acquired.id, 1);
        });
    }

    #[test]
    fn add_refuses_when_full() {
        smol::block_on(async {
            let pool = ConnectionPool::new(PoolConfig { max_size: 1, ..Default::default() });
            let c1 = test_conn(1);
            c1.mark_connected().await;
            pool.add("peer-a".to_string(), c1).await.unwrap();

            let c2 = test_conn(2);
            c2.mark_connected().await;
            let result = pool.add("peer-b".to_string(), c2).await;
            assert!(matches!(result, Err(Error::PoolFull)));
        });
    }

    #[test]
    fn acquire_times_out_with_no_connection() {
        smol::block_on(async {
            let pool: Arc<ConnectionPool<Cursor<Vec<u8>>>> = ConnectionPool::new(PoolConfig::default());
            let result = pool.acquire("nobody", 5).await;
            assert!(matches!(result, Err(Error::NoConnection)));
        });
    }

    #[test]
    fn broadcast_counts_successes() {
        smol::block_on(async {
            let pool = ConnectionPool::new(PoolConfig::default());
            for i in 1..=3 {
                let conn = test_conn(i);
                conn.mark_connected().await;
                pool.add(format!("peer-{i}"), conn).await.unwrap();
            }
            let frame = Frame::new(MessageType::Data, 0, b"broadcast".to_vec());
            let result = pool.broadcast(&frame, &HashSet::new()).await;
            assert_eq!(result.total, 3);
            assert_eq!(result.successful, 3);
        });
    }

    #[test]
    fn sweep_idle_respects_min_size() {
        smol::block_on(async {
            let pool = ConnectionPool::new(PoolConfig { idle_timeout_secs: 10, min_size: 1, ..Default::default() });
            for i in 1..=2 {
                let conn = test_conn(i);
                conn.mark_connected().await;
                conn.touch(0);
                pool.add(format!("peer-{i}"), conn).await.unwrap();
            }
            pool.sweep_idle(1000).await;
            assert_eq!(pool.size().await, 1);
        });
    }
}
