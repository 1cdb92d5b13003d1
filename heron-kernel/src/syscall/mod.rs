//! Syscall handling infrastructure.
//!
//! This layer starts where the external entry plumbing stops: it receives
//! the decoded operation code and raw arguments and dispatches to the
//! operation-specific handlers. Privilege transitions, register save and
//! restore, and the trap vector itself belong to the kernel binary.

mod process;
mod sem;

use log::debug;

/// Main syscall handler, called by the external syscall entry with the
/// operation code and raw arguments. Unknown operations fail with -1.
pub fn syscall_handler(operation: u32, arg0: usize, arg1: usize, arg2: usize) -> isize {
    debug!("SYSCALL: op={operation:X}, args: {arg0:X}, {arg1:X}, {arg2:X}");

    match operation {
        heron_abi::OP_PROCESS_ALARM => process::handle_alarm(arg0 as u64),
        heron_abi::OP_PROCESS_NICE => process::handle_nice(arg0 as isize as i32),
        heron_abi::OP_SEM_GET => sem::handle_semget(arg0 as isize as i32),
        heron_abi::OP_SEM_CTL => {
            sem::handle_semctl(arg0 as isize as i32, arg1 as isize as i32, arg2 as isize as i32)
        }
        heron_abi::OP_SEM_OP => sem::handle_semop(arg0 as isize as i32, arg1 as isize as i32),
        _ => -1,
    }
}
