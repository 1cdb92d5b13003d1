//! Machine interface consumed by the scheduling core.
//!
//! The core needs exactly two services from the machine layer: control over
//! the interrupt flag (the only synchronization primitive on this
//! uniprocessor) and the context-switch primitive. Both are behind the
//! [`Hal`] trait so the kernel binary can install the real implementation at
//! boot and tests can install a software one.

use spinning_top::RwSpinlock;

use crate::process::ProcessId;

/// Services the scheduling core consumes from the machine layer.
///
/// On x86_64 the interrupt-flag methods default to the CPU's real flag via
/// the `x86_64` instruction wrappers; other architectures must provide all
/// four methods. `switch_to` has no default anywhere: saving and restoring
/// execution context belongs to the kernel binary, not this core.
pub trait Hal: Sync {
    /// Whether maskable interrupts are currently enabled.
    #[cfg(target_arch = "x86_64")]
    fn interrupts_enabled(&self) -> bool {
        x86_64::instructions::interrupts::are_enabled()
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn interrupts_enabled(&self) -> bool;

    /// Mask maskable interrupts.
    #[cfg(target_arch = "x86_64")]
    fn disable_interrupts(&self) {
        x86_64::instructions::interrupts::disable();
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn disable_interrupts(&self);

    /// Unmask maskable interrupts.
    #[cfg(target_arch = "x86_64")]
    fn enable_interrupts(&self) {
        x86_64::instructions::interrupts::enable();
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn enable_interrupts(&self);

    /// Save `from`'s execution context and resume `to`'s. Called by the
    /// scheduler with all table locks already released.
    fn switch_to(&self, from: ProcessId, to: ProcessId);
}

static HAL: RwSpinlock<Option<&'static dyn Hal>> = RwSpinlock::new(None);

/// Install the machine layer. Must be called once, before any scheduling.
pub fn init(hal: &'static dyn Hal) {
    let mut slot = HAL.write();
    assert!(slot.is_none(), "HAL already installed");
    *slot = Some(hal);
}

fn hal() -> &'static dyn Hal {
    HAL.read().expect("HAL has not been installed")
}

pub(crate) fn switch_to(from: ProcessId, to: ProcessId) {
    hal().switch_to(from, to);
}

/// Scoped critical section.
///
/// Disables interrupts on construction and restores the prior interrupt
/// state on drop, so every exit path (normal return, early return, or
/// failure) rebalances the flag. Guards nest: an inner guard restores
/// "disabled" and the outermost restores the original state.
pub struct IrqGuard {
    was_enabled: bool,
}

impl IrqGuard {
    pub fn new() -> IrqGuard {
        let hal = hal();
        let was_enabled = hal.interrupts_enabled();
        hal.disable_interrupts();
        IrqGuard { was_enabled }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.was_enabled {
            hal().enable_interrupts();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, Ordering};

    /// Software interrupt flag standing in for the CPU's.
    struct SoftHal {
        enabled: AtomicBool,
    }

    impl Hal for SoftHal {
        fn interrupts_enabled(&self) -> bool {
            self.enabled.load(Ordering::Relaxed)
        }

        fn disable_interrupts(&self) {
            self.enabled.store(false, Ordering::Relaxed);
        }

        fn enable_interrupts(&self) {
            self.enabled.store(true, Ordering::Relaxed);
        }

        fn switch_to(&self, _from: ProcessId, _to: ProcessId) {}
    }

    static SOFT: SoftHal = SoftHal {
        enabled: AtomicBool::new(true),
    };

    // The HAL registry is process-global, so everything exercising it lives
    // in this one test to keep runs order-independent.
    #[test]
    fn guard_restores_prior_state_and_nests() {
        init(&SOFT);
        assert!(SOFT.interrupts_enabled());

        {
            let _outer = IrqGuard::new();
            assert!(!SOFT.interrupts_enabled());
            {
                let _inner = IrqGuard::new();
                assert!(!SOFT.interrupts_enabled());
            }
            // Inner guard restores the state it saw: still disabled.
            assert!(!SOFT.interrupts_enabled());
        }
        assert!(SOFT.interrupts_enabled());

        // Early-exit path rebalances too.
        let early_out = || -> Option<()> {
            let _g = IrqGuard::new();
            None
        };
        assert_eq!(early_out(), None);
        assert!(SOFT.interrupts_enabled());
    }
}
