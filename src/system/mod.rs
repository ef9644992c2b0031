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

//! Replaces the source's event-emitter wiring (KBucket/RoutingTable/Pool
//! all emit events observers react to) with explicit, owned message
//! passing. Owners hold a `SubscriberPtr` and `notify()` into it;
//! observers `subscribe()` to get their own receiver. No component
//! mutably shares another's state.

use std::sync::Arc;

use smol::{channel, lock::Mutex};

pub struct Subscription<T> {
    id: u64,
    recv: channel::Receiver<T>,
    parent: Arc<Mutex<Vec<(u64, channel::Sender<T>)>>>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    pub async fn receive(&self) -> T {
        // The parent only drops a sender on unsubscribe; a closed
        // channel here means the subscriber outlived its subscriber
        // list, which should not happen given `Subscriber` owns both.
        self.recv.recv().await.expect("subscriber channel closed while subscription alive")
    }

    pub async fn unsubscribe(&self) {
        let mut senders = self.parent.lock().await;
        senders.retain(|(id, _)| *id != self.id);
    }
}

/// A fan-out broadcast point. Cloning a `SubscriberPtr` shares the same
/// underlying subscriber list (it's an `Arc` internally).
pub struct Subscriber<T> {
    next_id: Mutex<u64>,
    senders: Arc<Mutex<Vec<(u64, channel::Sender<T>)>>>,
}

pub type SubscriberPtr<T> = Arc<Subscriber<T>>;

impl<T: Clone + Send + 'static> Subscriber<T> {
    pub fn new() -> SubscriberPtr<T> {
        Arc::new(Self { next_id: Mutex::new(0), senders: Arc::new(Mutex::new(Vec::new())) })
    }

    pub async fn subscribe(&self) -> Subscription<T> {
        let (sender, recv) = channel::unbounded();
        let mut next_id = self.next_id.lock().await;
        let id = *next_id;
        *next_id += 1;
        self.senders.lock().await.push((id, sender));
        Subscription { id, recv, parent: self.senders.clone() }
    }

    /// Best-effort fan-out: a full/closed receiver is dropped silently,
    /// matching the teacher's "subscribers come and go" semantics.
    pub async fn notify(&self, value: T) {
        let senders = self.senders.lock().await;
        for (_, sender) in senders.iter() {
            let _ = sender.send(value.clone()).await;
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.senders.lock().await.len()
    }
}

/// Sleep for `secs` seconds, suspendable per the concurrency model.
pub async fn sleep(secs: u64) {
    smol::Timer::after(std::time::Duration::from_secs(secs)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_reaches_all_subscribers() {
        smol::block_on(async {
            let sub: SubscriberPtr<u32> = Subscriber::new();
            let a = sub.subscribe().await;
            let b = sub.subscribe().await;
            sub.notify(7).await;
            assert_eq!(a.receive().await, 7);
            assert_eq!(b.receive().await, 7);
        });
    }

    #[test]
    fn unsubscribe_removes_from_list() {
        smol::block_on(async {
            let sub: SubscriberPtr<u32> = Subscriber::new();
            let a = sub.subscribe().await;
            assert_eq!(sub.subscriber_count().await, 1);
            a.unsubscribe().await;
            assert_eq!(sub.subscriber_count().await, 0);
        });
    }
}
