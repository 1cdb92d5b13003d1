//! Candidate selection policies.
//!
//! The scheduler core is policy-agnostic: each pass it asks the active
//! [`SelectionPolicy`] for exactly one process drawn from the ready set,
//! with the IDLE process as the guaranteed fallback. Policies differ only
//! in their weighting and tie-break rules, and each applies its own aging
//! side effects on `counter`/`nice`; those side effects are observable
//! behavior, not an implementation detail.
//!
//! Exactly one policy is active per boot; see [`Policy`].

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::process::{IDLE, Process, ProcessId, ProcessTable};

/// Which selection policy the scheduler runs. Chosen once at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Aging round-robin on the combined |priority| + |nice| magnitude.
    CombinedAging,
    /// Static kernel priority, ties broken by waiting time.
    StaticPriority,
    /// Priority, then nice, then waiting time; each win costs a nice point.
    PriorityNice,
    /// Proportional share weighted by wait and accumulated CPU time.
    TicketShare,
    /// Lottery weighted inversely to accumulated CPU time.
    Lottery,
}

impl Policy {
    /// Instantiate the policy. `seed` feeds the lottery draw and is ignored
    /// by the deterministic policies.
    pub fn build(self, seed: u64) -> Box<dyn SelectionPolicy> {
        match self {
            Policy::CombinedAging => Box::new(CombinedAging),
            Policy::StaticPriority => Box::new(StaticPriority),
            Policy::PriorityNice => Box::new(PriorityNice),
            Policy::TicketShare => Box::new(TicketShare),
            Policy::Lottery => Box::new(Lottery::new(seed)),
        }
    }
}

/// A candidate selection strategy.
///
/// Given the table and the current tick, return exactly one process to
/// dispatch: a ready process, or IDLE when the ready set is empty. The
/// policy applies its aging side effects directly to the table.
pub trait SelectionPolicy: Send + Sync {
    fn select_next(&mut self, table: &mut ProcessTable, ticks: u64) -> ProcessId;
}

/// Ready processes other than IDLE, in table order.
fn contenders(table: &ProcessTable) -> Vec<ProcessId> {
    table.ready().filter(|&pid| pid != IDLE).collect()
}

/// Aging round-robin on combined priority/nice magnitude.
///
/// Candidates compare on |priority| + |nice|, sign stripped on purpose
/// (large bias in either direction reads as "more important"), and a
/// higher combined magnitude wins. Ties go to the larger `counter`,
/// and the loser of every comparison ages, so a repeatedly skipped process
/// eventually takes the tie-break. That includes last round's winner: its
/// counter was zeroed on demotion, and it ages like anyone else.
pub struct CombinedAging;

fn combined_magnitude(p: &Process) -> i32 {
    p.priority().abs() + p.nice().abs()
}

impl SelectionPolicy for CombinedAging {
    fn select_next(&mut self, table: &mut ProcessTable, _ticks: u64) -> ProcessId {
        let mut candidate = IDLE;
        for pid in contenders(table) {
            if candidate == IDLE {
                candidate = pid;
                continue;
            }

            let challenger = combined_magnitude(table.entry(pid));
            let incumbent = combined_magnitude(table.entry(candidate));
            if challenger > incumbent
                || (challenger == incumbent
                    && table.entry(pid).counter() > table.entry(candidate).counter())
            {
                table.entry_mut(candidate).age();
                candidate = pid;
            } else {
                table.entry_mut(pid).age();
            }
        }
        candidate
    }
}

/// Static kernel priority: the lowest numeric `priority` wins, ties go to
/// the larger `counter`, and the loser of every comparison ages.
pub struct StaticPriority;

impl SelectionPolicy for StaticPriority {
    fn select_next(&mut self, table: &mut ProcessTable, _ticks: u64) -> ProcessId {
        let mut candidate = IDLE;
        for pid in contenders(table) {
            if candidate == IDLE {
                candidate = pid;
                continue;
            }

            let challenger = table.entry(pid);
            let incumbent = table.entry(candidate);
            if challenger.priority() < incumbent.priority()
                || (challenger.priority() == incumbent.priority()
                    && challenger.counter() > incumbent.counter())
            {
                table.entry_mut(candidate).age();
                candidate = pid;
            } else {
                table.entry_mut(pid).age();
            }
        }
        candidate
    }
}

/// Lexicographic priority → nice → counter.
///
/// Lower `priority` wins, then lower `nice`, then larger `counter` (which
/// preserves FIFO order among otherwise-equal processes). The loser of
/// every comparison ages. The winner pays one nice point before dispatch,
/// making it progressively less preferred in future rounds; IDLE never
/// pays, its bias is meaningless.
pub struct PriorityNice;

impl SelectionPolicy for PriorityNice {
    fn select_next(&mut self, table: &mut ProcessTable, _ticks: u64) -> ProcessId {
        let mut candidate = IDLE;
        for pid in contenders(table) {
            if candidate == IDLE {
                candidate = pid;
                continue;
            }

            let challenger = table.entry(pid);
            let incumbent = table.entry(candidate);
            let wins = challenger.priority() < incumbent.priority()
                || (challenger.priority() == incumbent.priority()
                    && (challenger.nice() < incumbent.nice()
                        || (challenger.nice() == incumbent.nice()
                            && challenger.counter() > incumbent.counter())));
            if wins {
                table.entry_mut(candidate).age();
                candidate = pid;
            } else {
                table.entry_mut(pid).age();
            }
        }

        if candidate != IDLE {
            let winner = table.entry_mut(candidate);
            winner.set_nice(winner.nice() + 1);
        }
        candidate
    }
}

/// Proportional ticket share, weighted toward accumulated wait and usage.
///
/// Each ready process weighs `41 − nice + utime + ktime + counter`; the
/// draw is `ticks mod total`, and the table is walked in order accumulating
/// weight until the cumulative sum exceeds the draw. Processes walked
/// before that point age.
pub struct TicketShare;

fn share_weight(p: &Process) -> i64 {
    41 - p.nice() as i64 + p.utime() as i64 + p.ktime() as i64 + p.counter() as i64
}

impl SelectionPolicy for TicketShare {
    fn select_next(&mut self, table: &mut ProcessTable, ticks: u64) -> ProcessId {
        let ready = contenders(table);
        let Some(&fallback) = ready.first() else {
            return IDLE;
        };

        let total: i64 = ready.iter().map(|&pid| share_weight(table.entry(pid))).sum();
        if total <= 0 {
            // An unclamped nice can drive the sum non-positive; a modular
            // draw over it is meaningless.
            return fallback;
        }

        let draw = (ticks % total as u64) as i64;
        let mut cumulative = 0;
        for &pid in &ready {
            cumulative += share_weight(table.entry(pid));
            if cumulative > draw {
                return pid;
            }
            table.entry_mut(pid).age();
        }

        // The cumulative sum reaches `total` and `draw < total`, so the walk
        // always lands; this satisfies the compiler, not the scheduler.
        fallback
    }
}

/// Lottery scheduling, weighted inversely to accumulated CPU time.
///
/// Tickets are recomputed for the whole ready set whenever the pool is
/// exhausted, at `1000 / (utime + ktime + 1)` each. A draw is taken
/// uniformly in `[1, pool]` and the table walked in order, recomputing each
/// scanned process's tickets as it goes; the first process whose cumulative
/// ticket count exceeds the draw wins. Tickets of processes passed over are
/// added back into the pool, which therefore grows round over round.
/// The growth is deliberate, not a bookkeeping leak.
pub struct Lottery {
    pool: i64,
    rng: XorShift64,
}

impl Lottery {
    fn new(seed: u64) -> Lottery {
        Lottery {
            pool: 0,
            rng: XorShift64::new(seed),
        }
    }
}

fn lottery_tickets(p: &Process) -> i64 {
    1000 / (p.utime() as i64 + p.ktime() as i64 + 1)
}

impl SelectionPolicy for Lottery {
    fn select_next(&mut self, table: &mut ProcessTable, _ticks: u64) -> ProcessId {
        let ready = contenders(table);
        if ready.is_empty() {
            return IDLE;
        }

        if self.pool <= 0 {
            self.pool = ready
                .iter()
                .map(|&pid| {
                    let tickets = lottery_tickets(table.entry(pid));
                    table.entry_mut(pid).set_ntickets(tickets);
                    tickets
                })
                .sum();
        }
        if self.pool <= 0 {
            // Every ready process has burned past a thousand ticks and holds
            // zero tickets; there is nothing to draw from.
            return ready[0];
        }

        let draw = 1 + (self.rng.next() % self.pool as u64) as i64;
        let mut cumulative = 0;
        let mut winner = *ready.last().unwrap();
        for &pid in &ready {
            let tickets = lottery_tickets(table.entry(pid));
            table.entry_mut(pid).set_ntickets(tickets);
            cumulative += tickets;
            if cumulative > draw {
                winner = pid;
                break;
            }
            self.pool += tickets;
        }
        winner
    }
}

/// xorshift64 generator for the lottery draw. Not cryptographic; the draw
/// only needs to be uniform enough that tickets translate to share.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> XorShift64 {
        XorShift64 {
            state: seed.max(1),
        }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}
