use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Handle of a scheduled timer
pub type TimerId = u64;

struct Tasks<T> {
    by_deadline: BTreeMap<(Instant, TimerId), T>,
    deadlines: HashMap<TimerId, Instant>,
}

/// Deadline-ordered timer queue shared by every transaction.
///
/// The wheel only stores entries; a driver task sleeps until
/// [`TimerWheel::next_deadline`], collects due entries with [`TimerWheel::poll`]
/// and dispatches them. [`TimerWheel::changed`] wakes the driver when an earlier
/// deadline is scheduled.
pub struct TimerWheel<T> {
    tasks: Mutex<Tasks<T>>,
    last_id: AtomicU64,
    changed: Notify,
}

impl<T> TimerWheel<T> {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Tasks {
                by_deadline: BTreeMap::new(),
                deadlines: HashMap::new(),
            }),
            last_id: AtomicU64::new(0),
            changed: Notify::new(),
        }
    }

    /// Number of pending timers
    pub fn len(&self) -> usize {
        self.tasks.lock().by_deadline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Schedule `value` to fire after `delay`
    pub fn schedule(&self, delay: Duration, value: T) -> TimerId {
        self.schedule_at(Instant::now() + delay, value)
    }

    /// Schedule `value` to fire at `deadline`
    pub fn schedule_at(&self, deadline: Instant, value: T) -> TimerId {
        let id = self.last_id.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut guard = self.tasks.lock();
            let tasks = &mut *guard;
            tasks.by_deadline.insert((deadline, id), value);
            tasks.deadlines.insert(id, deadline);
        }
        self.changed.notify_one();
        id
    }

    /// Cancel a pending timer, returning its value if it had not fired
    pub fn cancel(&self, id: TimerId) -> Option<T> {
        let mut guard = self.tasks.lock();
        let tasks = &mut *guard;
        let deadline = tasks.deadlines.remove(&id)?;
        tasks.by_deadline.remove(&(deadline, id))
    }

    /// Remove and return every entry due at or before `now`, earliest first
    pub fn poll(&self, now: Instant) -> Vec<(TimerId, T)> {
        let mut guard = self.tasks.lock();
        let tasks = &mut *guard;
        let mut due = Vec::new();
        while let Some(entry) = tasks.by_deadline.first_entry() {
            let (deadline, id) = *entry.key();
            if deadline > now {
                break;
            }
            due.push((id, entry.remove()));
            tasks.deadlines.remove(&id);
        }
        due
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks
            .lock()
            .by_deadline
            .keys()
            .next()
            .map(|(deadline, _)| *deadline)
    }

    /// Resolves once a timer has been scheduled since the last wake-up
    pub async fn changed(&self) {
        self.changed.notified().await
    }
}

impl<T> Default for TimerWheel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_schedule_cancel_poll() {
        let wheel = TimerWheel::new();
        let now = Instant::now();
        let first = wheel.schedule_at(now, "task1");
        assert_eq!(wheel.cancel(first), Some("task1"));
        assert_eq!(wheel.cancel(first), None);

        let second = wheel.schedule_at(now, "task2");
        assert_eq!(wheel.poll(now + Duration::from_secs(1)), vec![(second, "task2")]);

        wheel.schedule_at(now + Duration::from_millis(1001), "task3");
        assert!(wheel.poll(now + Duration::from_secs(1)).is_empty());
        assert_eq!(wheel.len(), 1);
        assert_eq!(wheel.next_deadline(), Some(now + Duration::from_millis(1001)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_orders_by_deadline() {
        let wheel = TimerWheel::new();
        wheel.schedule(Duration::from_millis(30), 3);
        wheel.schedule(Duration::from_millis(10), 1);
        wheel.schedule(Duration::from_millis(20), 2);
        let due: Vec<i32> = wheel
            .poll(Instant::now() + Duration::from_millis(25))
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(due, vec![1, 2]);
        assert_eq!(wheel.len(), 1);
    }
}
