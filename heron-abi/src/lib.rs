//! Shared ABI definitions between kernel and userspace.
//!
//! This crate contains syscall operation codes, semaphore control commands,
//! error numbers, and signal numbers that both the kernel and userspace
//! need to agree on.

#![no_std]

// =============================================================================
// Operation codes
// =============================================================================

// Process operations (0x1_0000 - 0x1_FFFF)
/// Arm or disarm the caller's alarm: (ticks) -> ticks remaining on the
/// previously armed alarm, 0 if none. Passing 0 disarms.
pub const OP_PROCESS_ALARM: u32 = 0x1_0000;
/// Adjust the caller's nice value: (incr) -> 0
pub const OP_PROCESS_NICE: u32 = 0x1_0001;

// Semaphore operations (0x2_0000 - 0x2_FFFF)
/// Find or create a semaphore: (key) -> id or -1
pub const OP_SEM_GET: u32 = 0x2_0000;
/// Control a semaphore: (id, cmd, val) -> cmd-specific or -1
pub const OP_SEM_CTL: u32 = 0x2_0001;
/// Operate on a semaphore: (id, op) -> 0 or -1. op >= 0 is an up,
/// op < 0 is a down.
pub const OP_SEM_OP: u32 = 0x2_0002;

// =============================================================================
// Semaphore control commands
// =============================================================================

/// Returns the value of a semaphore.
pub const GETVAL: i32 = 0;
/// Sets the value of a semaphore.
pub const SETVAL: i32 = 1;
/// Destroys a semaphore.
pub const IPC_RMID: i32 = 3;

/// A decoded semaphore control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemCommand {
    GetValue,
    SetValue,
    Remove,
}

impl SemCommand {
    /// Decode a raw command value. Unknown commands (including the gap at 2)
    /// decode to `None` and must fail at the syscall boundary.
    pub fn from_raw(cmd: i32) -> Option<SemCommand> {
        match cmd {
            GETVAL => Some(SemCommand::GetValue),
            SETVAL => Some(SemCommand::SetValue),
            IPC_RMID => Some(SemCommand::Remove),
            _ => None,
        }
    }
}

// =============================================================================
// Error numbers
// =============================================================================

/// Interrupted system call (a wait cut short by semaphore destruction).
pub const EINTR: i32 = 4;
/// Invalid argument.
pub const EINVAL: i32 = 22;
/// No space left (semaphore table exhausted).
pub const ENOSPC: i32 = 28;

// =============================================================================
// Signal numbers
// =============================================================================

/// Alarm clock expired.
pub const SIGALRM: u32 = 14;
/// Child stopped or terminated.
pub const SIGCHLD: u32 = 17;
