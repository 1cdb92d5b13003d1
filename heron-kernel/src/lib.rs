//! Process scheduling and blocking synchronization for a small
//! uniprocessor monolithic kernel.
//!
//! The crate holds two cooperating cores:
//! - a preemptible process scheduler that picks exactly one runnable
//!   process per pass under a boot-selected fairness policy, retiring
//!   per-process alarms inline, and
//! - a counting-semaphore subsystem whose operations are atomic with
//!   respect to the timer interrupt that drives scheduling.
//!
//! Everything machine-shaped (the tick source, the context-switch
//! primitive, syscall entry, process creation proper) lives outside and
//! talks to this crate through `hal`, the `scheduler` entry points, and
//! the `syscall` dispatcher.

#![no_std]

extern crate alloc;

pub mod hal;
pub mod process;
pub mod scheduler;
pub mod sem;
pub mod syscall;
