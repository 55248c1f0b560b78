//! Wall-clock seam.
//!
//! Every timing rule in the decision engine (session windows, ledger
//! dates) reads time through this trait so tests can drive the clock.

use chrono::NaiveDateTime;

/// Provides the current local date and time.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// System wall clock in local time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}
