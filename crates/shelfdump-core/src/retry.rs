//! Re-running whole units of work over a fresh session.
//!
//! A unit that fails with a transient connectivity error is not resumed:
//! the session is closed, a new one is established after an exponential
//! wait, and the unit runs again from its start.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::session::{Connector, ExportSession, SessionSettings};

/// Default number of attempts per unit.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff time unit.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Attempt budget and backoff unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Set the attempt budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the backoff time unit.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Wait after the given failed attempt: `2^attempt` time units.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

/// A unit of work that is redone from scratch on a transient failure.
#[async_trait]
pub trait RetryableUnit: Send {
    type Output: Send;

    /// Short description for log lines.
    fn describe(&self) -> String;

    async fn run(&mut self, session: &mut ExportSession) -> Result<Self::Output>;
}

/// Owns the export session and re-establishes it between attempts.
pub struct RetryController<'a> {
    connector: &'a dyn Connector,
    settings: SessionSettings,
    policy: RetryPolicy,
    session: Option<ExportSession>,
    establishments: u32,
}

impl<'a> RetryController<'a> {
    pub fn new(connector: &'a dyn Connector, settings: SessionSettings, policy: RetryPolicy) -> Self {
        Self {
            connector,
            settings,
            policy,
            session: None,
            establishments: 0,
        }
    }

    /// Number of sessions established so far.
    pub fn establishments(&self) -> u32 {
        self.establishments
    }

    /// The current session, if one is open.
    pub fn session_mut(&mut self) -> Option<&mut ExportSession> {
        self.session.as_mut()
    }

    async fn ensure_session(&mut self) -> Result<&mut ExportSession> {
        if self.session.is_none() {
            let session = ExportSession::establish(self.connector, self.settings.clone()).await;
            self.establishments += 1;
            debug!(establishments = self.establishments, "session established");
            self.session = Some(session?);
        }
        match self.session.as_mut() {
            Some(session) => Ok(session),
            None => Err(Error::config("no export session")),
        }
    }

    async fn discard_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    /// Run `unit` until it succeeds, fails terminally or the budget runs out.
    pub async fn with_retry<U: RetryableUnit>(&mut self, unit: &mut U) -> Result<U::Output> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match self.ensure_session().await {
                Ok(session) => unit.run(session).await,
                Err(e) => Err(e),
            };

            let err = match outcome {
                Ok(output) => return Ok(output),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            self.discard_session().await;
            if attempt >= max_attempts {
                return Err(Error::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.delay_after(attempt);
            warn!(
                unit = %unit.describe(),
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, reconnecting"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Close the session, if any.
    pub async fn shutdown(&mut self) {
        self.discard_session().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_without_cap() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
        assert_eq!(policy.delay_after(3), Duration::from_millis(800));
        assert_eq!(policy.delay_after(10), Duration::from_millis(102_400));
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(policy.base_delay, DEFAULT_BASE_DELAY);
        assert_eq!(RetryPolicy::default().with_max_attempts(7).max_attempts, 7);
    }
}
