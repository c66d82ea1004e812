//! # Timer List
//!
//! One-shot deferred callbacks kept in a delta-encoded sorted list. Each
//! node stores the ticks remaining *after its predecessor fires*, so a tick
//! only ever touches the head:
//!
//! ```text
//!   head
//!    │
//!    ▼
//!  ┌──────────┐    ┌──────────┐    ┌──────────┐
//!  │ delta 3  │ ─► │ delta 2  │ ─► │ delta 0  │      fires at 3, 5, 5
//!  └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! Nodes come from a fixed pool of `TIME_REQUESTS` entries; running out is
//! a fatal kernel error. There is no way to cancel a queued timer.
//!
//! The list is generic over the context `C` its callbacks receive, so the
//! scheduler can hand itself to the callbacks it fires.

use crate::config::TIME_REQUESTS;

/// A deferred callback.
pub type TimerCallback<C> = fn(&mut C);

struct TimerNode<C> {
    delta: i64,
    callback: Option<TimerCallback<C>>,
    next: Option<u8>,
}

// Manual impls: the derives would demand `C: Copy`.
impl<C> Clone for TimerNode<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for TimerNode<C> {}

impl<C> TimerNode<C> {
    const FREE: Self = Self {
        delta: 0,
        callback: None,
        next: None,
    };
}

/// A queued timer as seen from the head of the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEntry {
    /// Ticks after the previous entry fires.
    pub delta: i64,
    /// Ticks from now.
    pub remaining: i64,
}

/// Delta-sorted list of pending one-shot callbacks.
pub struct TimerList<C> {
    pool: [TimerNode<C>; TIME_REQUESTS],
    head: Option<u8>,
}

impl<C> TimerList<C> {
    pub const fn new() -> Self {
        Self {
            pool: [TimerNode::FREE; TIME_REQUESTS],
            head: None,
        }
    }

    /// Queue `callback` to fire after `ticks` ticks.
    ///
    /// Non-positive delays are the caller's job: they must run inline and
    /// never reach the list.
    ///
    /// # Panics
    /// When every pool node is in use.
    pub fn insert(&mut self, ticks: i64, callback: TimerCallback<C>) {
        debug_assert!(ticks > 0, "non-positive delays run inline");

        let node = match self.pool.iter().position(|n| n.callback.is_none()) {
            Some(index) => index as u8,
            None => panic!("no more timer requests free"),
        };

        // Walk while the remainder stays non-negative; equal deadlines keep
        // insertion order.
        let mut remaining = ticks;
        let mut prev: Option<u8> = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let existing = &self.pool[index as usize];
            if remaining - existing.delta < 0 {
                break;
            }
            remaining -= existing.delta;
            prev = cursor;
            cursor = existing.next;
        }

        if let Some(index) = cursor {
            self.pool[index as usize].delta -= remaining;
        }
        self.pool[node as usize] = TimerNode {
            delta: remaining,
            callback: Some(callback),
            next: cursor,
        };
        match prev {
            Some(p) => self.pool[p as usize].next = Some(node),
            None => self.head = Some(node),
        }
    }

    /// Advance the list by one tick. Only the head's delta is touched.
    pub fn tick(&mut self) {
        if let Some(head) = self.head {
            self.pool[head as usize].delta -= 1;
        }
    }

    /// Detach the head if it is due, freeing its node, and hand back its
    /// callback for the caller to run.
    pub fn pop_expired(&mut self) -> Option<TimerCallback<C>> {
        let head = self.head?;
        let node = &mut self.pool[head as usize];
        if node.delta > 0 {
            return None;
        }
        let callback = node.callback.take();
        self.head = node.next.take();
        callback
    }

    /// Advance one tick and fire everything that came due, in order.
    pub fn service_tick(&mut self, ctx: &mut C) {
        self.tick();
        while let Some(callback) = self.pop_expired() {
            callback(ctx);
        }
    }

    /// Pending timers from the head, with their delta and absolute
    /// remaining ticks.
    pub fn iter(&self) -> impl Iterator<Item = TimerEntry> + '_ {
        let mut cursor = self.head;
        let mut remaining = 0;
        core::iter::from_fn(move || {
            let node = &self.pool[cursor? as usize];
            cursor = node.next;
            remaining += node.delta;
            Some(TimerEntry {
                delta: node.delta,
                remaining,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

impl<C> Default for TimerList<C> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Callbacks record which one fired.
    type Log = Vec<&'static str>;

    fn first(log: &mut Log) {
        log.push("first");
    }

    fn second(log: &mut Log) {
        log.push("second");
    }

    fn third(log: &mut Log) {
        log.push("third");
    }

    fn entries(list: &TimerList<Log>) -> Vec<(i64, i64)> {
        list.iter().map(|e| (e.delta, e.remaining)).collect()
    }

    #[test]
    fn test_shorter_timer_goes_first() {
        let mut list = TimerList::<Log>::new();
        let mut log = Log::new();
        list.insert(5, first);
        list.insert(3, second);
        assert_eq!(entries(&list), [(3, 3), (2, 5)]);

        for _ in 0..3 {
            list.service_tick(&mut log);
        }
        assert_eq!(log, ["second"]);
        assert_eq!(entries(&list), [(2, 2)]);

        list.service_tick(&mut log);
        assert_eq!(log, ["second"]);
        list.service_tick(&mut log);
        assert_eq!(log, ["second", "first"]);
        assert!(list.is_empty());
    }

    #[test]
    fn test_prefix_sums_match_remaining_ticks() {
        let mut list = TimerList::<Log>::new();
        let delays = [7, 2, 9, 2, 4, 15, 1, 7];
        for &d in &delays {
            list.insert(d, first);
        }

        let mut sorted = delays;
        sorted.sort_unstable();
        let remaining: Vec<i64> = list.iter().map(|e| e.remaining).collect();
        assert_eq!(remaining, sorted);

        let mut sum = 0;
        for entry in list.iter() {
            assert!(entry.delta >= 0);
            sum += entry.delta;
            assert_eq!(sum, entry.remaining);
        }
    }

    #[test]
    fn test_equal_deadlines_fire_in_insertion_order_on_same_tick() {
        let mut list = TimerList::<Log>::new();
        let mut log = Log::new();
        list.insert(2, first);
        list.insert(2, second);
        list.insert(1, third);
        assert_eq!(entries(&list), [(1, 1), (1, 2), (0, 2)]);

        list.service_tick(&mut log);
        assert_eq!(log, ["third"]);
        list.service_tick(&mut log);
        assert_eq!(log, ["third", "first", "second"]);
    }

    #[test]
    fn test_fired_nodes_return_to_pool() {
        let mut list = TimerList::<Log>::new();
        let mut log = Log::new();
        for _ in 0..3 {
            for _ in 0..TIME_REQUESTS {
                list.insert(1, first);
            }
            list.service_tick(&mut log);
            assert!(list.is_empty());
        }
        assert_eq!(log.len(), 3 * TIME_REQUESTS);
    }

    #[test]
    #[should_panic(expected = "no more timer requests free")]
    fn test_pool_exhaustion_is_fatal() {
        let mut list = TimerList::<Log>::new();
        for _ in 0..=TIME_REQUESTS {
            list.insert(10, first);
        }
    }

    #[test]
    fn test_tick_on_empty_list_is_harmless() {
        let mut list = TimerList::<Log>::new();
        let mut log = Log::new();
        list.service_tick(&mut log);
        assert!(log.is_empty());
        assert_eq!(list.len(), 0);
    }
}
