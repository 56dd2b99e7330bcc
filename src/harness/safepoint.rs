//! Synthetic safepoints
//!
//! Workers call [`check`] at the transition points of the scatter protocol
//! to emulate the cooperative suspension points of a managed runtime: a
//! short stop-the-world sleep while a simulated collection is running, plus
//! occasional scheduler yields.

use super::context::HarnessContext;
use rand::Rng;
use std::thread;
use std::time::Duration;

/// How a safepoint gave up the CPU, if at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldKind {
    /// `thread::yield_now`
    Yield,
    /// Zero-length sleep
    ZeroSleep,
    None,
}

/// What one safepoint check did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafepointAction {
    /// Slept because the pause flag was raised
    pub paused: bool,
    pub yielded: YieldKind,
}

/// Run one safepoint check.
///
/// The pause and the yield are independent; both are evaluated every call.
pub fn check<R: Rng + ?Sized>(ctx: &HarnessContext, rng: &mut R) -> SafepointAction {
    let paused = ctx.is_paused();
    if paused {
        thread::sleep(ctx.safepoint_pause());
    }

    let yielded = match rng.gen_range(0..100u32) {
        0..=4 => {
            thread::yield_now();
            YieldKind::Yield
        }
        5..=9 => {
            thread::sleep(Duration::ZERO);
            YieldKind::ZeroSleep
        }
        _ => YieldKind::None,
    };

    SafepointAction { paused, yielded }
}
