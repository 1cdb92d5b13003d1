//! Semaphore operation syscall handlers (OP_SEM_*).

use heron_abi::{EINTR, EINVAL, SemCommand};

use crate::scheduler;
use crate::sem::{self, OpOutcome, SemId};

/// Handle semget: find or create the semaphore named `key`.
pub fn handle_semget(key: i32) -> isize {
    match sem::get(key) {
        Ok(id) => id.index() as isize,
        // On exhaustion ENOSPC is already recorded on the caller.
        Err(_) => -1,
    }
}

/// Handle semctl. GETVAL returns the raw count, so a negative count is
/// indistinguishable from failure here, an ambiguity the interface
/// inherits from its POSIX shape.
pub fn handle_semctl(id: i32, cmd: i32, val: i32) -> isize {
    let Some(cmd) = SemCommand::from_raw(cmd) else {
        scheduler::with_current_process(|p| p.set_errno(EINVAL));
        return -1;
    };
    let Some(id) = decode_id(id) else {
        scheduler::with_current_process(|p| p.set_errno(EINVAL));
        return -1;
    };

    match sem::control(id, cmd, val) {
        Ok(value) => value as isize,
        Err(_) => {
            scheduler::with_current_process(|p| p.set_errno(EINVAL));
            -1
        }
    }
}

/// Handle semop: `op >= 0` is an up, `op < 0` a down. A down that cannot
/// proceed suspends here; once resumed it reports 0 if the unit was handed
/// over, or -1 with EINTR if a destroy cut the wait short.
pub fn handle_semop(id: i32, op: i32) -> isize {
    let Some(id) = decode_id(id) else {
        scheduler::with_current_process(|p| p.set_errno(EINVAL));
        return -1;
    };

    match sem::op(id, op) {
        Ok(OpOutcome::Completed) => 0,
        Ok(OpOutcome::Blocked) => {
            scheduler::yield_now();
            scheduler::with_current_process(|p| {
                if p.take_wait_interrupted() {
                    p.set_errno(EINTR);
                    -1
                } else {
                    0
                }
            })
        }
        Err(_) => {
            scheduler::with_current_process(|p| p.set_errno(EINVAL));
            -1
        }
    }
}

fn decode_id(id: i32) -> Option<SemId> {
    usize::try_from(id).ok().map(SemId::from_index)
}
