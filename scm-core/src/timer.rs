//! Time-ordered list of delayed payloads.
//!
//! Entries are kept sorted by fire time; inserting uses a binary search so
//! entries with equal fire times keep their registration order. A cancelable
//! entry is tied to a [`TimerHandle`]: once every handle is dropped the entry
//! is skipped (and removed) instead of firing.
//!
//! Every entry carries a registration sequence number. A [`watermark`] taken
//! before a firing pass lets the caller fire only what was registered before
//! the pass, so entries added by the payloads themselves wait for the next one.
//!
//! [`watermark`]: TimerQueue::watermark

use std::collections::VecDeque;
use std::rc::Rc;

/// Keeps a cancelable timer alive. Dropping every clone cancels it.
#[derive(Debug, Clone)]
pub struct TimerHandle(Rc<TimerToken>);

#[derive(Debug)]
struct TimerToken {
    fire_at: f64,
}

impl TimerHandle {
    /// Absolute machine time the timer fires at.
    pub fn fire_at(&self) -> f64 {
        self.0.fire_at
    }

    /// Cancels the timer by dropping this handle.
    pub fn cancel(self) {}
}

struct TimerEntry<P> {
    fire_at: f64,
    seq: u64,
    payload: P,
    token: Option<Rc<TimerToken>>,
}

impl<P> TimerEntry<P> {
    /// A cancelable entry is dead once only the queue references it.
    fn is_abandoned(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(|token| Rc::strong_count(token) == 1)
    }
}

/// Delayed payloads ordered by fire time.
pub struct TimerQueue<P> {
    entries: VecDeque<TimerEntry<P>>,
    next_seq: u64,
}

impl<P> Default for TimerQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> TimerQueue<P> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Schedules `payload` to fire at `fire_at`.
    pub fn schedule(&mut self, fire_at: f64, payload: P) {
        self.insert(fire_at, payload, None);
    }

    /// Schedules `payload`; it only fires if the returned handle (or a clone)
    /// is still alive at fire time.
    pub fn schedule_cancelable(&mut self, fire_at: f64, payload: P) -> TimerHandle {
        let token = Rc::new(TimerToken { fire_at });
        self.insert(fire_at, payload, Some(Rc::clone(&token)));
        TimerHandle(token)
    }

    // total_cmp sorts NaN after every number, so a NaN entry never fires
    // and never holds up the entries behind it.
    fn insert(&mut self, fire_at: f64, payload: P, token: Option<Rc<TimerToken>>) {
        let entry = TimerEntry {
            fire_at,
            seq: self.next_seq,
            payload,
            token,
        };
        self.next_seq += 1;
        let pos = self
            .entries
            .partition_point(|e| e.fire_at.total_cmp(&fire_at).is_le());
        self.entries.insert(pos, entry);
    }

    /// Sequence number of the next entry to be scheduled.
    pub fn watermark(&self) -> u64 {
        self.next_seq
    }

    /// Removes and returns the next payload due at `now`. Abandoned
    /// cancelable entries are dropped along the way.
    pub fn pop_due(&mut self, now: f64) -> Option<P> {
        self.pop_due_before(now, u64::MAX)
    }

    /// Like [`pop_due`](Self::pop_due), restricted to entries scheduled
    /// before `watermark` was taken.
    pub fn pop_due_before(&mut self, now: f64, watermark: u64) -> Option<P> {
        loop {
            let pos = self
                .entries
                .iter()
                .take_while(|e| e.fire_at <= now)
                .position(|e| e.seq < watermark)?;
            let entry = self.entries.remove(pos)?;
            if entry.is_abandoned() {
                tracing::trace!("dropping cancelled timer due at {}", entry.fire_at);
                continue;
            }
            return Some(entry.payload);
        }
    }

    /// Fire time of the earliest entry.
    pub fn next_fire_time(&self) -> Option<f64> {
        self.entries.front().map(|e| e.fire_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<P> std::fmt::Debug for TimerQueue<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("len", &self.entries.len())
            .field("next_fire_time", &self.next_fire_time())
            .finish()
    }
}
