//! Deferred continuations
//!
//! A single-threaded priority queue of `(fire_time, task)` entries drained once per
//! tick. Entries sharing a fire time run in the order they were scheduled.
//! Cancelling removes the entry outright.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Handle returned by [`Scheduler::schedule_at`], used to cancel the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

#[derive(Debug)]
struct ScheduledTask<T> {
    due: f32,
    seq: u64,
    task: T,
}

impl<T> PartialEq for ScheduledTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for ScheduledTask<T> {}

impl<T> PartialOrd for ScheduledTask<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ScheduledTask<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.due.total_cmp(&other.due) {
            Ordering::Equal => self.seq.cmp(&other.seq),
            o => o,
        }
    }
}

/// Time-ordered queue of pending tasks.
#[derive(Debug)]
pub struct Scheduler<T> {
    queue: BinaryHeap<Reverse<ScheduledTask<T>>>,
    next_seq: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` to run once the clock reaches `due`.
    pub fn schedule_at(&mut self, due: f32, task: T) -> TaskId {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.queue.push(Reverse(ScheduledTask { due, seq, task }));
        TaskId(seq)
    }

    /// Queue `task` to run `delay` seconds after `now`.
    pub fn schedule_in(&mut self, now: f32, delay: f32, task: T) -> TaskId {
        self.schedule_at(now + delay, task)
    }

    /// Remove a pending entry. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|Reverse(entry)| entry.seq != id.0);
        self.queue.len() != before
    }

    /// Pop the earliest task whose fire time is at or before `now`.
    pub fn pop_due(&mut self, now: f32) -> Option<T> {
        let Reverse(next) = self.queue.peek()?;
        if next.due > now {
            return None;
        }
        self.queue.pop().map(|Reverse(entry)| entry.task)
    }

    /// Fire time of the earliest pending task.
    pub fn next_due(&self) -> Option<f32> {
        self.queue.peek().map(|Reverse(entry)| entry.due)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every pending task.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scheduler: &mut Scheduler<&'static str>, now: f32) -> Vec<&'static str> {
        std::iter::from_fn(|| scheduler.pop_due(now)).collect()
    }

    #[test]
    fn test_tasks_fire_in_time_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(3.0, "c");
        scheduler.schedule_at(1.0, "a");
        scheduler.schedule_at(2.0, "b");

        assert!(drain(&mut scheduler, 0.5).is_empty());
        assert_eq!(drain(&mut scheduler, 2.0), vec!["a", "b"]);
        assert_eq!(drain(&mut scheduler, 10.0), vec!["c"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_equal_fire_times_keep_insertion_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(1.0, "first");
        scheduler.schedule_at(1.0, "second");
        scheduler.schedule_at(1.0, "third");
        assert_eq!(drain(&mut scheduler, 1.0), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_cancel_removes_entry() {
        let mut scheduler = Scheduler::new();
        let keep = scheduler.schedule_in(0.0, 1.0, "keep");
        let drop = scheduler.schedule_in(0.0, 1.0, "drop");

        assert!(scheduler.cancel(drop));
        assert!(!scheduler.cancel(drop));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(drain(&mut scheduler, 5.0), vec!["keep"]);
        assert!(!scheduler.cancel(keep));
    }

    #[test]
    fn test_next_due_and_clear() {
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.next_due(), None);
        scheduler.schedule_at(4.0, "x");
        scheduler.schedule_at(2.5, "y");
        assert_eq!(scheduler.next_due(), Some(2.5));
        scheduler.clear();
        assert!(scheduler.is_empty());
    }
}
