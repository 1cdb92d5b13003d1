//! Counting semaphores.
//!
//! A fixed-capacity table of keyed semaphores, the only IPC this kernel
//! offers. `up` and `down` are atomic with respect to the timer interrupt:
//! the whole check-and-mutate sequence runs inside one interrupt-masked
//! section, because a tick landing in the middle would re-enter the
//! scheduler and see the count and the wait queue disagree.
//!
//! `up` uses hand-off semantics: with waiters present the freed unit goes
//! straight to one of them and the count is left alone. Banking the unit
//! in `n` as well would let a second `down` consume it while the woken
//! waiter also believes it holds it.
//!
//! The subsystem never touches scheduling state itself; blocking and
//! waking are requests to the scheduler's wait/wake service.

use log::debug;
use spinning_top::Spinlock;

use heron_abi::{ENOSPC, SemCommand};

use crate::hal::IrqGuard;
use crate::process::ProcessId;
use crate::scheduler::{self, Scheduler, WaitQueue};

/// Number of semaphore table slots.
pub const SEM_MAX: usize = 32;

/// Semaphore identity: its slot in the table, exposed to users as the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SemId(usize);

impl SemId {
    pub(crate) const fn from_index(index: usize) -> SemId {
        SemId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Why a semaphore call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemError {
    /// The id names no valid semaphore.
    InvalidId,
    /// The semaphore table is full.
    OutOfSlots,
}

/// How an `op` call left the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    /// The operation finished; the caller keeps running.
    Completed,
    /// A down could not proceed: the caller is blocked on the wait queue
    /// and must now yield. Its wait ends either with the resource handed
    /// off by an `up`, or interrupted by a destroy.
    Blocked,
}

struct Semaphore {
    /// External identifier; unique among valid slots.
    key: i32,
    /// The count. At or below zero, a down blocks.
    n: i32,
    queue: WaitQueue,
}

pub(crate) struct SemTable {
    slots: [Option<Semaphore>; SEM_MAX],
}

impl SemTable {
    pub(crate) const fn new() -> SemTable {
        SemTable {
            slots: [const { None }; SEM_MAX],
        }
    }

    fn slot(&self, id: SemId) -> Result<&Semaphore, SemError> {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(SemError::InvalidId)
    }

    fn slot_mut(&mut self, id: SemId) -> Result<&mut Semaphore, SemError> {
        self.slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(SemError::InvalidId)
    }

    /// Find the semaphore named `key`, creating it on first use. Reports
    /// `ENOSPC` on the calling process when the table is full.
    pub(crate) fn get(&mut self, sched: &mut Scheduler, key: i32) -> Result<SemId, SemError> {
        for (index, slot) in self.slots.iter().enumerate() {
            // A freed slot's stale key is gone with the slot, so a plain
            // scan over valid entries suffices.
            if let Some(sem) = slot
                && sem.key == key
            {
                return Ok(SemId::from_index(index));
            }
        }

        // No semaphore with this key; claim the first free slot.
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Semaphore {
                    key,
                    n: 0,
                    queue: WaitQueue::new(),
                });
                debug!("created semaphore {index} for key {key}");
                return Ok(SemId::from_index(index));
            }
        }

        sched.current_process_mut().set_errno(ENOSPC);
        Err(SemError::OutOfSlots)
    }

    /// Apply a control command. `GetValue` returns the raw count, which is
    /// free to be negative.
    pub(crate) fn control(
        &mut self,
        sched: &mut Scheduler,
        id: SemId,
        cmd: SemCommand,
        val: i32,
    ) -> Result<i32, SemError> {
        match cmd {
            SemCommand::GetValue => Ok(self.slot(id)?.n),
            SemCommand::SetValue => {
                self.slot_mut(id)?.n = val;
                Ok(0)
            }
            SemCommand::Remove => {
                self.destroy(sched, id)?;
                Ok(0)
            }
        }
    }

    /// Invalidate a slot and resolve its waiters. Every one of them wakes
    /// with its wait marked interrupted; a destroyed semaphore must never
    /// read as a successful acquisition.
    fn destroy(&mut self, sched: &mut Scheduler, id: SemId) -> Result<(), SemError> {
        let slot = self.slots.get_mut(id.index()).ok_or(SemError::InvalidId)?;
        let mut sem = slot.take().ok_or(SemError::InvalidId)?;
        let woken = sched.wake_all_interrupted(&mut sem.queue);
        debug!("destroyed semaphore {id:?}, woke {woken} waiters");
        Ok(())
    }

    /// Atomic up (`delta >= 0`) or down (`delta < 0`).
    pub(crate) fn op(
        &mut self,
        sched: &mut Scheduler,
        id: SemId,
        delta: i32,
    ) -> Result<OpOutcome, SemError> {
        let sem = self
            .slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(SemError::InvalidId)?;

        if delta >= 0 {
            if sem.n <= 0 && !sem.queue.is_empty() {
                // Hand the freed unit straight to a waiter; `n` stays put.
                sched.wake_one(&mut sem.queue);
            } else {
                sem.n += 1;
            }
            Ok(OpOutcome::Completed)
        } else if sem.n > 0 {
            sem.n -= 1;
            Ok(OpOutcome::Completed)
        } else {
            sched.block_current(&mut sem.queue, id);
            Ok(OpOutcome::Blocked)
        }
    }

    /// Remove `pid` from whatever wait queue its back-reference names.
    /// Interface for the external termination collaborator.
    pub(crate) fn cancel_wait(&mut self, sched: &mut Scheduler, pid: ProcessId) -> bool {
        let Some(id) = sched.table().get(pid).and_then(|p| p.waiting_on()) else {
            return false;
        };
        let Some(sem) = self.slots.get_mut(id.index()).and_then(Option::as_mut) else {
            return false;
        };
        sched.cancel_wait(&mut sem.queue, pid)
    }
}

static SEMAPHORES: Spinlock<SemTable> = Spinlock::new(SemTable::new());

/// Find or create the semaphore named `key`.
pub fn get(key: i32) -> Result<SemId, SemError> {
    let _irq = IrqGuard::new();
    let mut sems = SEMAPHORES.lock();
    scheduler::with(|sched| sems.get(sched, key))
}

/// Apply a control command to a semaphore.
pub fn control(id: SemId, cmd: SemCommand, val: i32) -> Result<i32, SemError> {
    let _irq = IrqGuard::new();
    let mut sems = SEMAPHORES.lock();
    scheduler::with(|sched| sems.control(sched, id, cmd, val))
}

/// Up or down a semaphore. On `Blocked` the caller must yield; the guard
/// has already been rebalanced by then on every path, the invalid-id
/// return included.
pub fn op(id: SemId, delta: i32) -> Result<OpOutcome, SemError> {
    let _irq = IrqGuard::new();
    let mut sems = SEMAPHORES.lock();
    scheduler::with(|sched| sems.op(sched, id, delta))
}

/// Detach a terminating process from any wait queue it occupies.
pub fn cancel_wait(pid: ProcessId) -> bool {
    let _irq = IrqGuard::new();
    let mut sems = SEMAPHORES.lock();
    scheduler::with(|sched| sems.cancel_wait(sched, pid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{IDLE, PRIO_USER, ProcessState};
    use crate::scheduler::Policy;
    use heron_abi::EINTR;

    fn setup() -> (Scheduler, SemTable) {
        (Scheduler::new(Policy::CombinedAging.build(0)), SemTable::new())
    }

    /// Dispatch a fresh process and make it the current one.
    fn dispatch(s: &mut Scheduler) -> ProcessId {
        let pid = s.spawn(PRIO_USER, 0, Some(IDLE)).unwrap();
        s.make_ready(pid);
        let current = s.current();
        if current != IDLE && s.table().entry(current).state() == ProcessState::Running {
            s.table_mut().entry_mut(current).set_state(ProcessState::Stopped);
        }
        s.reschedule();
        assert_eq!(s.current(), pid);
        pid
    }

    #[test]
    fn get_with_the_same_key_returns_the_same_id() {
        let (mut sched, mut sems) = setup();
        let first = sems.get(&mut sched, 7).unwrap();
        let second = sems.get(&mut sched, 7).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn get_with_distinct_keys_returns_distinct_ids() {
        let (mut sched, mut sems) = setup();
        let a = sems.get(&mut sched, 1).unwrap();
        let b = sems.get(&mut sched, 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn get_reports_enospc_when_the_table_is_full() {
        let (mut sched, mut sems) = setup();
        dispatch(&mut sched);
        for key in 0..SEM_MAX as i32 {
            sems.get(&mut sched, key).unwrap();
        }
        assert_eq!(
            sems.get(&mut sched, 1000),
            Err(SemError::OutOfSlots)
        );
        assert_eq!(sched.current_process_mut().errno(), ENOSPC);
    }

    #[test]
    fn destroyed_slot_is_reusable_and_its_key_forgotten() {
        let (mut sched, mut sems) = setup();
        let a = sems.get(&mut sched, 1).unwrap();
        let b = sems.get(&mut sched, 2).unwrap();
        sems.control(&mut sched, a, SemCommand::Remove, 0).unwrap();

        // The surviving semaphore still resolves, the dead key does not
        // alias onto it.
        assert_eq!(sems.get(&mut sched, 2).unwrap(), b);
        let again = sems.get(&mut sched, 1).unwrap();
        assert_eq!(again, a);
        assert_eq!(
            sems.control(&mut sched, again, SemCommand::GetValue, 0),
            Ok(0)
        );
    }

    #[test]
    fn up_with_no_waiters_increments() {
        let (mut sched, mut sems) = setup();
        let id = sems.get(&mut sched, 1).unwrap();

        assert_eq!(sems.op(&mut sched, id, 1), Ok(OpOutcome::Completed));
        assert_eq!(
            sems.control(&mut sched, id, SemCommand::GetValue, 0),
            Ok(1)
        );
    }

    #[test]
    fn up_increments_through_negative_counts() {
        let (mut sched, mut sems) = setup();
        let id = sems.get(&mut sched, 1).unwrap();
        sems.control(&mut sched, id, SemCommand::SetValue, -2).unwrap();

        sems.op(&mut sched, id, 1).unwrap();
        assert_eq!(
            sems.control(&mut sched, id, SemCommand::GetValue, 0),
            Ok(-1)
        );
    }

    #[test]
    fn down_with_a_positive_count_decrements_without_blocking() {
        let (mut sched, mut sems) = setup();
        let id = sems.get(&mut sched, 1).unwrap();
        sems.control(&mut sched, id, SemCommand::SetValue, 2).unwrap();

        assert_eq!(sems.op(&mut sched, id, -1), Ok(OpOutcome::Completed));
        assert_eq!(
            sems.control(&mut sched, id, SemCommand::GetValue, 0),
            Ok(1)
        );
    }

    #[test]
    fn down_at_zero_blocks_the_caller() {
        let (mut sched, mut sems) = setup();
        let id = sems.get(&mut sched, 1).unwrap();
        let caller = dispatch(&mut sched);

        assert_eq!(sems.op(&mut sched, id, -1), Ok(OpOutcome::Blocked));
        let blocked = sched.table().entry(caller);
        assert_eq!(blocked.state(), ProcessState::Blocked);
        assert_eq!(blocked.waiting_on(), Some(id));
    }

    #[test]
    fn up_hands_off_to_a_waiter_without_touching_the_count() {
        let (mut sched, mut sems) = setup();
        let id = sems.get(&mut sched, 1).unwrap();

        let waiter = dispatch(&mut sched);
        assert_eq!(sems.op(&mut sched, id, -1), Ok(OpOutcome::Blocked));

        let _releaser = dispatch(&mut sched);
        assert_eq!(sems.op(&mut sched, id, 1), Ok(OpOutcome::Completed));

        // Exactly one wake, count untouched, and the wait reads as a
        // grant, not an interruption.
        let woken = sched.table_mut().entry_mut(waiter);
        assert_eq!(woken.state(), ProcessState::Ready);
        assert!(!woken.take_wait_interrupted());
        assert_eq!(
            sems.control(&mut sched, id, SemCommand::GetValue, 0),
            Ok(0)
        );
    }

    #[test]
    fn up_wakes_exactly_one_of_many_waiters() {
        let (mut sched, mut sems) = setup();
        let id = sems.get(&mut sched, 1).unwrap();

        let first = dispatch(&mut sched);
        sems.op(&mut sched, id, -1).unwrap();
        let second = dispatch(&mut sched);
        sems.op(&mut sched, id, -1).unwrap();

        dispatch(&mut sched);
        sems.op(&mut sched, id, 1).unwrap();

        assert_eq!(sched.table().entry(first).state(), ProcessState::Ready);
        assert_eq!(sched.table().entry(second).state(), ProcessState::Blocked);
    }

    #[test]
    fn setval_then_three_downs_exhausts_the_count() {
        let (mut sched, mut sems) = setup();
        let id = sems.get(&mut sched, 7).unwrap();
        sems.control(&mut sched, id, SemCommand::SetValue, 3).unwrap();

        dispatch(&mut sched);
        for _ in 0..3 {
            assert_eq!(sems.op(&mut sched, id, -1), Ok(OpOutcome::Completed));
        }
        assert_eq!(
            sems.control(&mut sched, id, SemCommand::GetValue, 0),
            Ok(0)
        );
        // The fourth down finds nothing left and blocks.
        assert_eq!(sems.op(&mut sched, id, -1), Ok(OpOutcome::Blocked));
    }

    #[test]
    fn destroy_wakes_every_waiter_as_interrupted() {
        let (mut sched, mut sems) = setup();
        let id = sems.get(&mut sched, 1).unwrap();

        let a = dispatch(&mut sched);
        sems.op(&mut sched, id, -1).unwrap();
        let b = dispatch(&mut sched);
        sems.op(&mut sched, id, -1).unwrap();

        assert_eq!(
            sems.control(&mut sched, id, SemCommand::Remove, 0),
            Ok(0)
        );
        for pid in [a, b] {
            let woken = sched.table_mut().entry_mut(pid);
            assert_eq!(woken.state(), ProcessState::Ready);
            assert!(woken.take_wait_interrupted(), "{pid:?} saw a grant");
        }

        // The id is dead; every further use fails.
        assert_eq!(sems.op(&mut sched, id, 1), Err(SemError::InvalidId));
        assert_eq!(
            sems.control(&mut sched, id, SemCommand::GetValue, 0),
            Err(SemError::InvalidId)
        );
    }

    #[test]
    fn invalid_id_fails_without_side_effects() {
        let (mut sched, mut sems) = setup();
        let bogus = SemId::from_index(SEM_MAX + 5);
        assert_eq!(sems.op(&mut sched, bogus, -1), Err(SemError::InvalidId));
        assert_eq!(sems.op(&mut sched, bogus, 1), Err(SemError::InvalidId));
        assert_eq!(
            sems.control(&mut sched, bogus, SemCommand::SetValue, 9),
            Err(SemError::InvalidId)
        );

        // Nothing blocked, nothing woke.
        let current = sched.current();
        assert_ne!(sched.table().entry(current).state(), ProcessState::Blocked);
    }

    #[test]
    fn cancel_wait_detaches_a_terminating_waiter() {
        let (mut sched, mut sems) = setup();
        let id = sems.get(&mut sched, 1).unwrap();
        let doomed = dispatch(&mut sched);
        sems.op(&mut sched, id, -1).unwrap();

        assert!(sems.cancel_wait(&mut sched, doomed));
        assert_eq!(sched.table().entry(doomed).waiting_on(), None);

        // An up afterwards finds no waiter and banks the unit instead.
        dispatch(&mut sched);
        sems.op(&mut sched, id, 1).unwrap();
        assert_eq!(
            sems.control(&mut sched, id, SemCommand::GetValue, 0),
            Ok(1)
        );
    }

    #[test]
    fn interrupted_flag_reads_as_eintr_at_the_boundary() {
        // The syscall layer's contract: a destroy-cut wait surfaces EINTR,
        // not success.
        let (mut sched, mut sems) = setup();
        let id = sems.get(&mut sched, 1).unwrap();
        let waiter = dispatch(&mut sched);
        sems.op(&mut sched, id, -1).unwrap();
        sems.control(&mut sched, id, SemCommand::Remove, 0).unwrap();

        let process = sched.table_mut().entry_mut(waiter);
        if process.take_wait_interrupted() {
            process.set_errno(EINTR);
        }
        assert_eq!(sched.table().entry(waiter).errno(), EINTR);
    }
}
