//! Poll-until-accepted driver for unreliable service calls.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::core::control::ControlFlags;

/// How a blocked call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed pause between attempts.
    pub delay: Duration,
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Whether an ABORT_LOOP request cancels the retry.
    pub abortable: bool,
}

impl RetryPolicy {
    /// Retry forever; only an abort request ends the wait early.
    pub fn abortable(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            abortable: true,
        }
    }

    /// Retry forever, ignoring abort requests.
    pub fn until_success(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            abortable: false,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// Result of a retried call.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    /// The call succeeded and its value was accepted.
    Completed { value: T, attempts: u32 },
    /// An abort request cancelled the wait. The operation may or may not have
    /// taken effect.
    Aborted { attempts: u32 },
    /// `max_attempts` was reached without an accepted value.
    Exhausted { attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Completed { attempts, .. }
            | RetryOutcome::Aborted { attempts }
            | RetryOutcome::Exhausted { attempts } => *attempts,
        }
    }

    pub fn completed(self) -> Option<T> {
        match self {
            RetryOutcome::Completed { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Call `operation` until it succeeds with a value `accept` approves.
///
/// After every failed attempt the driver sleeps `policy.delay`, runs
/// `between_attempts` (the caller drains its command inbox there), and then
/// checks the abort flag. Abort requests are one-shot: the flag is cleared when
/// the driver observes it, so only the call currently blocked is cancelled.
pub fn retry_until_accepted<T, E, Op, Accept, Between>(
    label: &str,
    policy: &RetryPolicy,
    flags: &ControlFlags,
    mut operation: Op,
    accept: Accept,
    mut between_attempts: Between,
) -> RetryOutcome<T>
where
    E: Display,
    Op: FnMut() -> Result<T, E>,
    Accept: Fn(&T) -> bool,
    Between: FnMut(),
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match operation() {
            Ok(value) if accept(&value) => {
                if policy.abortable && flags.take_abort() {
                    debug!(label, "abort request arrived after the call succeeded; cleared");
                }
                debug!(label, attempts, "call accepted");
                return RetryOutcome::Completed { value, attempts };
            }
            Ok(_) => info!(label, attempts, "call not accepted, trying again in a moment"),
            Err(err) => info!(label, attempts, %err, "call failed, trying again in a moment"),
        }

        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            info!(label, attempts, "giving up");
            return RetryOutcome::Exhausted { attempts };
        }

        thread::sleep(policy.delay);
        between_attempts();

        if policy.abortable && flags.take_abort() {
            info!(
                label,
                attempts, "abort requested, no longer waiting; the call may not have completed"
            );
            return RetryOutcome::Aborted { attempts };
        }
    }
}
