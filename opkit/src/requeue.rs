//! Translation of pass outcomes into scheduling decisions for a control loop.

use std::collections::HashMap;
use std::time::Duration;

use crate::engine::Action;
use crate::error::Error;
use crate::resource::ObjectKey;

/// Backoff settings for failed passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound for the delay.
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
        }
    }
}

/// Per-resource requeue bookkeeping.
///
/// Successful passes follow the [`Action`] they returned and reset the
/// failure count. Failed passes back off exponentially per key.
#[derive(Debug, Default)]
pub struct RequeuePolicy {
    config: BackoffConfig,
    failures: HashMap<ObjectKey, u32>,
}

impl RequeuePolicy {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: HashMap::new(),
        }
    }

    /// Delay before the next pass for `key`, or `None` if no pass is needed.
    pub fn next_delay(
        &mut self,
        key: &ObjectKey,
        outcome: &std::result::Result<Action, Error>,
    ) -> Option<Duration> {
        match outcome {
            Ok(action) => {
                self.failures.remove(key);
                match action {
                    Action::Done => None,
                    Action::Requeue => Some(Duration::ZERO),
                    Action::RequeueAfter(delay) => Some(*delay),
                }
            }
            Err(_) => {
                let failures = self.failures.entry(key.clone()).or_insert(0);
                let delay = backoff_delay(&self.config, *failures);
                *failures = failures.saturating_add(1);
                Some(delay)
            }
        }
    }

    /// Consecutive failures recorded for `key`.
    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Drop bookkeeping for a resource that no longer exists.
    pub fn forget(&mut self, key: &ObjectKey) {
        self.failures.remove(key);
    }
}

fn backoff_delay(config: &BackoffConfig, previous_failures: u32) -> Duration {
    let factor = 2u32.saturating_pow(previous_failures.min(31));
    config.base.saturating_mul(factor).min(config.max)
}
