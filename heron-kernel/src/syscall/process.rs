//! Process operation syscall handlers (OP_PROCESS_*).

use crate::hal::IrqGuard;
use crate::process::NZERO;
use crate::scheduler;

/// Handle alarm: arm the caller's alarm `interval` ticks from now, or
/// disarm it when `interval` is 0. Returns the ticks that were left on the
/// previously armed alarm, 0 if there was none.
pub fn handle_alarm(interval: u64) -> isize {
    let _irq = IrqGuard::new();
    scheduler::with(|scheduler| scheduler.arm_alarm(interval) as isize)
}

/// Handle nice: shift the caller's bias by `incr`, clamped to the legal
/// range.
pub fn handle_nice(incr: i32) -> isize {
    scheduler::with_current_process(|process| {
        let nice = (process.nice() + incr).clamp(-NZERO, NZERO);
        process.set_nice(nice);
    });
    0
}
