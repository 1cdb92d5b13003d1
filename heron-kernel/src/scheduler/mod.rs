//! Process scheduler with preemptive multitasking.
//!
//! One scheduling pass (`reschedule`) demotes a still-running previous
//! process, retires expired alarms, asks the configured selection policy
//! for a winner, and dispatches it. The pass runs to completion in whatever
//! interrupt or trap context invoked it; the context switch itself is
//! performed by the machine layer after every table lock is dropped.

mod policy;
pub mod wait;

pub use policy::{Policy, SelectionPolicy};
pub use wait::WaitQueue;

use alloc::boxed::Box;
use log::{debug, info};
use spinning_top::RwSpinlock;

use heron_abi::{SIGALRM, SIGCHLD};

use crate::hal::{self, IrqGuard};
use crate::process::{
    IDLE, PRIO_USER, PROC_QUANTUM, Process, ProcessId, ProcessState, ProcessTable,
};

/// Policy the scheduler runs when boot expresses no preference.
pub const DEFAULT_POLICY: Policy = Policy::CombinedAging;

/// Which privilege mode a clock tick interrupted; decides whether the tick
/// is charged to the current process's user or kernel time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuMode {
    User,
    Kernel,
}

/// A context switch the core decided on. Performed through the machine
/// layer once the scheduler lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    pub from: ProcessId,
    pub to: ProcessId,
}

pub(crate) struct Scheduler {
    table: ProcessTable,
    policy: Box<dyn SelectionPolicy>,
    /// The process currently holding the CPU.
    current: ProcessId,
    /// The process that held the CPU when the latest pass began.
    last: ProcessId,
    /// Global tick counter, advanced only by the external timer.
    ticks: u64,
}

impl Scheduler {
    pub(crate) fn new(policy: Box<dyn SelectionPolicy>) -> Scheduler {
        let mut table = ProcessTable::new();
        table.entry_mut(IDLE).set_state(ProcessState::Running);
        Scheduler {
            table,
            policy,
            current: IDLE,
            last: IDLE,
            ticks: 0,
        }
    }

    pub(crate) fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut ProcessTable {
        &mut self.table
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks
    }

    pub(crate) fn current(&self) -> ProcessId {
        self.current
    }

    pub(crate) fn current_process_mut(&mut self) -> &mut Process {
        let current = self.current;
        self.table.entry_mut(current)
    }

    /// Re-schedule a process for execution: READY with a zeroed aging
    /// counter, so it re-enters selection with no accumulated credit.
    pub(crate) fn sched(&mut self, pid: ProcessId) {
        let process = self.table.entry_mut(pid);
        process.set_state(ProcessState::Ready);
        process.set_counter(0);
    }

    /// One scheduling pass. Returns the context switch to perform, if the
    /// winner differs from the process that was running when the pass began.
    pub(crate) fn reschedule(&mut self) -> Option<Switch> {
        // A preempted process goes back into rotation; a process that
        // blocked or stopped keeps its state.
        if self.table.entry(self.current).state() == ProcessState::Running {
            self.sched(self.current);
        }
        self.last = self.current;

        // Alarms retire before any candidate state is read, whatever the
        // active policy.
        self.sweep_alarms();

        let ticks = self.ticks;
        let next = self.policy.select_next(&mut self.table, ticks);

        let winner = self.table.entry_mut(next);
        winner.set_priority(PRIO_USER);
        winner.set_state(ProcessState::Running);
        winner.set_counter(PROC_QUANTUM);
        self.current = next;

        if next != self.last {
            debug!("dispatching {next:?} in place of {:?}", self.last);
            Some(Switch {
                from: self.last,
                to: next,
            })
        } else {
            None
        }
    }

    /// Retire every alarm whose deadline has passed, queueing SIGALRM for
    /// its owner.
    fn sweep_alarms(&mut self) {
        let now = self.ticks;
        for (pid, process) in self.table.iter_mut() {
            if process.alarm() != 0 && process.alarm() < now {
                process.set_alarm(0);
                process.queue_signal(SIGALRM);
                debug!("alarm expired for {pid:?}");
            }
        }
    }

    /// Stop the current process: STOPPED, SIGCHLD queued for its father,
    /// and an immediate scheduling pass. Control does not return to the
    /// stopped process until it is resumed.
    pub(crate) fn stop_current(&mut self) -> Option<Switch> {
        let pid = self.current;
        self.table.entry_mut(pid).set_state(ProcessState::Stopped);
        if let Some(father) = self.table.entry(pid).father()
            && let Some(parent) = self.table.get_mut(father)
        {
            parent.queue_signal(SIGCHLD);
        }
        debug!("stopped {pid:?}");
        self.reschedule()
    }

    /// Resume a stopped process. Anything not currently STOPPED is left
    /// untouched.
    pub(crate) fn resume(&mut self, pid: ProcessId) {
        if self.table.get(pid).map(Process::state) == Some(ProcessState::Stopped) {
            self.sched(pid);
            debug!("resumed {pid:?}");
        }
    }

    /// Advance the clock by one tick, charging it to the current process.
    /// Returns whether the current quantum is exhausted and a scheduling
    /// pass is due.
    pub(crate) fn tick(&mut self, mode: CpuMode) -> bool {
        self.ticks += 1;
        let process = self.current_process_mut();
        match mode {
            CpuMode::User => process.charge_user_tick(),
            CpuMode::Kernel => process.charge_kernel_tick(),
        }
        process.set_counter(process.counter().saturating_sub(1));
        process.counter() <= 0
    }

    /// Arm the current process's alarm `interval` ticks from now, or
    /// disarm it when `interval` is 0. Returns the ticks that were left on
    /// the previously armed alarm, 0 if there was none.
    pub(crate) fn arm_alarm(&mut self, interval: u64) -> u64 {
        let now = self.ticks;
        let process = self.current_process_mut();
        let remaining = match process.alarm() {
            0 => 0,
            deadline => deadline.saturating_sub(now),
        };
        process.set_alarm(if interval == 0 { 0 } else { now + interval });
        remaining
    }

    /// Claim a table slot for a new embryo process. Part of the interface
    /// consumed by the external creation collaborator; fork proper is not
    /// this core's business.
    pub(crate) fn spawn(
        &mut self,
        priority: i32,
        nice: i32,
        father: Option<ProcessId>,
    ) -> Option<ProcessId> {
        let pid = self.table.alloc(priority, nice, father)?;
        debug!("spawned {pid:?} (father {father:?})");
        Some(pid)
    }

    /// Move a freshly created process into the ready rotation.
    pub(crate) fn make_ready(&mut self, pid: ProcessId) {
        if self.table.get(pid).map(Process::state) == Some(ProcessState::Embryo) {
            self.sched(pid);
        }
    }

    /// Mark a process dead. The external termination collaborator must
    /// already have removed it from any wait queue it occupied.
    pub(crate) fn terminate(&mut self, pid: ProcessId) {
        if let Some(process) = self.table.get_mut(pid) {
            process.set_state(ProcessState::Zombie);
            debug!("terminated {pid:?}");
        }
    }

    /// Release a reaped zombie's slot for reuse.
    pub(crate) fn release(&mut self, pid: ProcessId) {
        if self.table.get(pid).map(Process::state) == Some(ProcessState::Zombie) {
            self.table.release(pid);
        }
    }
}

pub(crate) static SCHEDULER: RwSpinlock<Option<Scheduler>> = RwSpinlock::new(None);

/// Initialize the scheduler with the policy chosen for this boot.
pub fn init(policy: Policy, seed: u64) {
    let mut scheduler = SCHEDULER.write();
    assert!(scheduler.is_none(), "scheduler already initialized");
    *scheduler = Some(Scheduler::new(policy.build(seed)));
    info!("scheduler initialized with {policy:?} policy");
}

/// Execute a closure with the scheduler locked.
pub(crate) fn with<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let mut scheduler = SCHEDULER.write();
    let scheduler = scheduler
        .as_mut()
        .expect("scheduler has not been initialized");
    f(scheduler)
}

/// Voluntarily enter a scheduling pass: from a blocking operation, from
/// `stop`, or from an explicit yield.
pub fn yield_now() {
    let _irq = IrqGuard::new();
    let switch = with(Scheduler::reschedule);
    // Lock is now dropped
    if let Some(switch) = switch {
        hal::switch_to(switch.from, switch.to);
    }
}

/// Tick-advance entry point, invoked periodically by the external timer
/// layer. Triggers a scheduling pass when the running quantum runs out.
pub fn clock_tick(mode: CpuMode) {
    let _irq = IrqGuard::new();
    let switch = with(|scheduler| {
        if scheduler.tick(mode) {
            scheduler.reschedule()
        } else {
            None
        }
    });
    if let Some(switch) = switch {
        hal::switch_to(switch.from, switch.to);
    }
}

/// Get the currently running process ID.
pub fn current_process_id() -> ProcessId {
    SCHEDULER
        .read()
        .as_ref()
        .expect("scheduler has not been initialized")
        .current()
}

/// Execute a closure with mutable access to the current process.
pub fn with_current_process<F, R>(f: F) -> R
where
    F: FnOnce(&mut Process) -> R,
{
    let _irq = IrqGuard::new();
    with(|scheduler| f(scheduler.current_process_mut()))
}

/// Current value of the global tick counter.
pub fn ticks() -> u64 {
    SCHEDULER
        .read()
        .as_ref()
        .expect("scheduler has not been initialized")
        .ticks()
}

/// Stop the current running process until it is resumed.
pub fn stop() {
    let _irq = IrqGuard::new();
    let switch = with(Scheduler::stop_current);
    if let Some(switch) = switch {
        hal::switch_to(switch.from, switch.to);
    }
}

/// Resume a stopped process.
pub fn resume(pid: ProcessId) {
    let _irq = IrqGuard::new();
    with(|scheduler| scheduler.resume(pid));
}

/// Claim a table slot for a new process (external creation interface).
pub fn spawn(priority: i32, nice: i32, father: Option<ProcessId>) -> Option<ProcessId> {
    let _irq = IrqGuard::new();
    with(|scheduler| scheduler.spawn(priority, nice, father))
}

/// Move a freshly created process into the ready rotation.
pub fn make_ready(pid: ProcessId) {
    let _irq = IrqGuard::new();
    with(|scheduler| scheduler.make_ready(pid));
}

/// Queue a signal for a process. Delivery mechanics are external; this
/// only records the signal for the next delivery pass.
pub fn send_signal(pid: ProcessId, signal: u32) {
    let _irq = IrqGuard::new();
    with(|scheduler| {
        if let Some(process) = scheduler.table_mut().get_mut(pid) {
            process.queue_signal(signal);
        }
    });
}

/// Mark a process dead (external termination interface). The caller must
/// first cancel any semaphore wait the process holds.
pub fn terminate(pid: ProcessId) {
    let _irq = IrqGuard::new();
    with(|scheduler| scheduler.terminate(pid));
}

/// Release a reaped zombie's slot.
pub fn release(pid: ProcessId) {
    let _irq = IrqGuard::new();
    with(|scheduler| scheduler.release(pid));
}
