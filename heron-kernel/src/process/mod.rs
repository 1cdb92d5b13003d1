//! Process management.
//!
//! This module contains the process control block and the fixed-capacity
//! process table:
//! - `Process` - per-process scheduling state (priority, nice, aging
//!   counter, CPU time, alarm, queued signals)
//! - `ProcessTable` - arena of table slots; a process's identity is its
//!   slot index, stable for its lifetime
//!
//! Creation and destruction proper (fork/exit) live outside this core; the
//! table only exposes slot allocation and release at their interface.

mod table;

pub use table::ProcessTable;

use crate::sem::SemId;

/// Number of process table slots, the IDLE slot included.
pub const PROC_MAX: usize = 64;

/// Quantum handed to a freshly dispatched process, in ticks.
pub const PROC_QUANTUM: i32 = 50;

/// Default user priority, assigned on every dispatch.
pub const PRIO_USER: i32 = 40;

/// Bound on the magnitude of a user-set nice value.
pub const NZERO: i32 = 20;

/// Unique process identifier: the process's slot in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProcessId(usize);

/// The always-present fallback process, pinned to slot 0.
pub const IDLE: ProcessId = ProcessId(0);

impl ProcessId {
    pub(crate) const fn from_index(index: usize) -> ProcessId {
        ProcessId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Process execution state.
///
/// `Blocked` is written only by the wait/wake primitive: a process enqueued
/// on a semaphore's wait queue is not `Ready` and is never scheduled until
/// woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessState {
    Embryo,
    Ready,
    Running,
    Stopped,
    Blocked,
    Zombie,
}

/// A process table entry.
pub struct Process {
    state: ProcessState,
    /// Kernel static priority; lower numeric value is more urgent where a
    /// policy compares it.
    priority: i32,
    /// User-adjustable bias. Some policies strip its sign deliberately.
    nice: i32,
    /// Aging/quantum field: 0 on `sched()`, incremented when passed over
    /// during selection, reset to the quantum on dispatch, counted down
    /// once per tick while running.
    counter: i32,
    utime: u64,
    ktime: u64,
    /// Per-round ticket allocation, meaningful only to the lottery policy.
    ntickets: i64,
    /// Absolute tick deadline; 0 means disarmed.
    alarm: u64,
    father: Option<ProcessId>,
    /// Queued-signal bitmask. This core only sets bits; delivery is
    /// external.
    pending: u32,
    errno: i32,
    /// Wait queue the process is enqueued on, if any. The queue owns the
    /// link; this is only a back-reference for removal.
    waiting_on: Option<SemId>,
    /// Set when a destroy cut the process's wait short; consumed by the
    /// syscall layer when the process resumes.
    wait_interrupted: bool,
}

impl Process {
    pub(crate) fn new(priority: i32, nice: i32, father: Option<ProcessId>) -> Process {
        Process {
            state: ProcessState::Embryo,
            priority,
            nice,
            counter: 0,
            utime: 0,
            ktime: 0,
            ntickets: 0,
            alarm: 0,
            father,
            pending: 0,
            errno: 0,
            waiting_on: None,
            wait_interrupted: false,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ProcessState) {
        self.state = state;
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    pub fn nice(&self) -> i32 {
        self.nice
    }

    pub(crate) fn set_nice(&mut self, nice: i32) {
        self.nice = nice;
    }

    pub fn counter(&self) -> i32 {
        self.counter
    }

    pub(crate) fn set_counter(&mut self, counter: i32) {
        self.counter = counter;
    }

    /// Age the process by one pass-over.
    pub(crate) fn age(&mut self) {
        self.counter = self.counter.saturating_add(1);
    }

    pub fn utime(&self) -> u64 {
        self.utime
    }

    pub fn ktime(&self) -> u64 {
        self.ktime
    }

    pub(crate) fn charge_user_tick(&mut self) {
        self.utime += 1;
    }

    pub(crate) fn charge_kernel_tick(&mut self) {
        self.ktime += 1;
    }

    pub fn ntickets(&self) -> i64 {
        self.ntickets
    }

    pub(crate) fn set_ntickets(&mut self, ntickets: i64) {
        self.ntickets = ntickets;
    }

    pub fn alarm(&self) -> u64 {
        self.alarm
    }

    pub(crate) fn set_alarm(&mut self, alarm: u64) {
        self.alarm = alarm;
    }

    pub fn father(&self) -> Option<ProcessId> {
        self.father
    }

    /// Queue a signal for later delivery. Delivery mechanics are external.
    pub fn queue_signal(&mut self, signal: u32) {
        self.pending |= 1 << signal;
    }

    /// Whether the given signal is queued.
    pub fn signal_pending(&self, signal: u32) -> bool {
        self.pending & (1 << signal) != 0
    }

    pub fn errno(&self) -> i32 {
        self.errno
    }

    pub fn set_errno(&mut self, errno: i32) {
        self.errno = errno;
    }

    pub fn waiting_on(&self) -> Option<SemId> {
        self.waiting_on
    }

    pub(crate) fn set_waiting_on(&mut self, queue: Option<SemId>) {
        self.waiting_on = queue;
    }

    pub(crate) fn mark_wait_interrupted(&mut self) {
        self.wait_interrupted = true;
    }

    /// Consume the interrupted-wait flag. Called once by the syscall layer
    /// when a blocked operation resumes.
    pub fn take_wait_interrupted(&mut self) -> bool {
        core::mem::replace(&mut self.wait_interrupted, false)
    }
}
