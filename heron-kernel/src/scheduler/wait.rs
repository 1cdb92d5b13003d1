//! The wait/wake primitive.
//!
//! Blocking subsystems never manipulate scheduling state themselves: they
//! ask this service to block the caller on a queue, or to wake one or all
//! of a queue's members. The scheduler knows queues, not semaphores: the
//! queue itself is owned by whoever embeds it, and each blocked process
//! keeps only a weak back-reference for removal on external termination.

use alloc::collections::VecDeque;
use log::debug;

use super::Scheduler;
use crate::process::{ProcessId, ProcessState};
use crate::sem::SemId;

/// Processes blocked on one resource, ordered by the priority each held
/// when it blocked: most urgent (lowest value) first, FIFO among equals.
pub struct WaitQueue {
    waiters: VecDeque<Waiter>,
}

struct Waiter {
    pid: ProcessId,
    priority: i32,
}

impl WaitQueue {
    pub(crate) fn new() -> WaitQueue {
        WaitQueue {
            waiters: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn contains(&self, pid: ProcessId) -> bool {
        self.waiters.iter().any(|w| w.pid == pid)
    }

    fn enqueue(&mut self, pid: ProcessId, priority: i32) {
        let at = self.waiters.partition_point(|w| w.priority <= priority);
        self.waiters.insert(at, Waiter { pid, priority });
    }

    fn pop(&mut self) -> Option<ProcessId> {
        self.waiters.pop_front().map(|w| w.pid)
    }

    fn remove(&mut self, pid: ProcessId) -> bool {
        match self.waiters.iter().position(|w| w.pid == pid) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }
}

impl Scheduler {
    /// Block the calling process on `queue`, at the priority it currently
    /// holds. The caller is responsible for yielding afterwards; this only
    /// records the suspension.
    pub(crate) fn block_current(&mut self, queue: &mut WaitQueue, on: SemId) {
        let pid = self.current;
        let process = self.table.entry_mut(pid);
        let priority = process.priority();
        process.set_state(ProcessState::Blocked);
        process.set_waiting_on(Some(on));
        queue.enqueue(pid, priority);
        debug!("blocked {pid:?} on {on:?}");
    }

    /// Wake the most urgent waiter, moving it back into the ready rotation.
    pub(crate) fn wake_one(&mut self, queue: &mut WaitQueue) -> Option<ProcessId> {
        let pid = queue.pop()?;
        self.wake(pid, false);
        Some(pid)
    }

    /// Wake every waiter on `queue`, marking each wait as interrupted so
    /// the waiter observes a failed wait rather than an acquisition.
    /// Returns the number of processes woken.
    pub(crate) fn wake_all_interrupted(&mut self, queue: &mut WaitQueue) -> usize {
        let mut woken = 0;
        while let Some(pid) = queue.pop() {
            self.wake(pid, true);
            woken += 1;
        }
        woken
    }

    fn wake(&mut self, pid: ProcessId, interrupted: bool) {
        // Only wake if the process still exists and is in fact blocked.
        let Some(process) = self.table.get_mut(pid) else {
            return;
        };
        if process.state() != ProcessState::Blocked {
            return;
        }
        process.set_waiting_on(None);
        if interrupted {
            process.mark_wait_interrupted();
        }
        self.sched(pid);
        debug!("woke {pid:?}");
    }

    /// Drop a waiter from `queue` without waking it. Used by the external
    /// termination collaborator, which owns the rest of the teardown.
    pub(crate) fn cancel_wait(&mut self, queue: &mut WaitQueue, pid: ProcessId) -> bool {
        if !queue.remove(pid) {
            return false;
        }
        if let Some(process) = self.table.get_mut(pid) {
            process.set_waiting_on(None);
        }
        true
    }
}
