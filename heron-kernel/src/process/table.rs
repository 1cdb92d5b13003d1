//! The process table: a fixed-capacity arena of process slots.

use super::{IDLE, PRIO_USER, PROC_MAX, Process, ProcessId, ProcessState};

/// Fixed-capacity arena of process control blocks.
///
/// Slot 0 always holds the IDLE process, ready from boot onward. Every
/// other slot is claimed through [`ProcessTable::alloc`] and handed back
/// through [`ProcessTable::release`] by the external creation/destruction
/// collaborator.
pub struct ProcessTable {
    slots: [Option<Process>; PROC_MAX],
}

impl ProcessTable {
    pub(crate) fn new() -> ProcessTable {
        let mut slots = [const { None }; PROC_MAX];

        let mut idle = Process::new(PRIO_USER, 0, None);
        idle.set_state(ProcessState::Ready);
        slots[IDLE.index()] = Some(idle);

        ProcessTable { slots }
    }

    /// Claim the first free slot for a new embryo process.
    pub(crate) fn alloc(
        &mut self,
        priority: i32,
        nice: i32,
        father: Option<ProcessId>,
    ) -> Option<ProcessId> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Process::new(priority, nice, father));
                return Some(ProcessId::from_index(index));
            }
        }
        None
    }

    /// Free a slot for reuse. The IDLE slot is never released.
    pub(crate) fn release(&mut self, pid: ProcessId) {
        if pid != IDLE {
            self.slots[pid.index()] = None;
        }
    }

    pub fn get(&self, pid: ProcessId) -> Option<&Process> {
        self.slots.get(pid.index())?.as_ref()
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.slots.get_mut(pid.index())?.as_mut()
    }

    /// Like [`ProcessTable::get`] for pids the caller just read out of the
    /// table, where a miss is table corruption.
    pub(crate) fn entry(&self, pid: ProcessId) -> &Process {
        let Some(process) = self.get(pid) else {
            panic!("No process exists with PID {pid:?}");
        };
        process
    }

    pub(crate) fn entry_mut(&mut self, pid: ProcessId) -> &mut Process {
        let Some(process) = self.get_mut(pid) else {
            panic!("No process exists with PID {pid:?}");
        };
        process
    }

    /// Valid entries with their ids, in table order.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (ProcessId, &mut Process)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|p| (ProcessId::from_index(index), p)))
    }

    /// Valid process ids, in table order. Table order is load-bearing: the
    /// selection policies scan it and the proportional-share draw walks it
    /// accumulating weight.
    pub fn pids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| ProcessId::from_index(index))
    }

    /// Ready process ids in table order, the IDLE process included only
    /// when it is itself ready.
    pub(crate) fn ready(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.as_ref()
                    .is_some_and(|p| p.state() == ProcessState::Ready)
            })
            .map(|(index, _)| ProcessId::from_index(index))
    }
}
