//! Cron expression evaluation.
//!
//! Wraps the `cron` crate behind the fallback policy this scheduler wants:
//! an expression that does not parse never fails a registration. It is
//! replaced by a sentinel expression that is syntactically valid but matches
//! no real calendar date, so the task stays registered and simply never
//! fires until restarted with a valid expression.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

/// A legal six-field expression that can never match: February 30th.
pub const NEVER_CRON: &str = "0 0 0 30 2 *";

/// A validated cron trigger: seconds, minutes, hours, day-of-month, month,
/// day-of-week.
///
/// Either *live* (built from caller input that parsed) or the never-firing
/// fallback, with `used_fallback` recording which.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    expression: String,
    schedule: Schedule,
    used_fallback: bool,
}

impl CronTrigger {
    /// Whether `expr` is a well-formed cron expression.
    ///
    /// This is a syntax check only; a self-contradictory date (like the
    /// sentinel) is valid here even though it never fires.
    pub fn is_valid(expr: &str) -> bool {
        Schedule::from_str(expr).is_ok()
    }

    /// Build a trigger from caller input. Never fails: malformed input
    /// degrades to the never-firing sentinel.
    pub fn parse(expr: &str) -> Self {
        match Schedule::from_str(expr) {
            Ok(schedule) => Self {
                expression: expr.to_string(),
                schedule,
                used_fallback: false,
            },
            Err(_) => Self::never(),
        }
    }

    /// The sentinel trigger that matches no real date.
    pub fn never() -> Self {
        let schedule =
            Schedule::from_str(NEVER_CRON).expect("sentinel cron expression must parse");
        Self {
            expression: NEVER_CRON.to_string(),
            schedule,
            used_fallback: true,
        }
    }

    /// The effective expression, after any fallback substitution.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// True when the caller's input was rejected and the sentinel installed.
    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    /// The next fire instant strictly after `after`, or `None` when the
    /// schedule can never fire again within the supported horizon.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}
