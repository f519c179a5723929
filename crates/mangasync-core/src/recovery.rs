//! Per-call recovery from expired sessions and rate limiting
//!
//! Every HTTP-backed client routes its calls through a [`RecoveryPolicy`].
//! The policy allows, per logical call:
//!
//! - one re-authentication and retry after [`Error::AuthExpired`];
//! - one fixed backoff sleep and retry after [`Error::RateLimited`].
//!
//! A second occurrence of either signal within the same call is surfaced.
//! Every other error is returned immediately; there is no retry on transport
//! or decode failures.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded recovery policy for a single upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    rate_limit_backoff: Duration,
}

impl RecoveryPolicy {
    /// Create a policy that sleeps `rate_limit_backoff` after a rate limit
    pub fn new(rate_limit_backoff: Duration) -> Self {
        Self { rate_limit_backoff }
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        self.rate_limit_backoff
    }

    /// Run `attempt`, recovering once from a rate limit
    ///
    /// Authorization failures are returned as-is; use
    /// [`call_with_reauth`](Self::call_with_reauth) for upstreams with a
    /// refresh step.
    pub async fn call<T, F, Fut>(&self, what: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match attempt().await {
            Err(Error::RateLimited(msg)) => {
                self.back_off(what, &msg).await;
                attempt().await
            }
            other => other,
        }
    }

    /// Run `attempt`, recovering once from an expired session and once from
    /// a rate limit
    ///
    /// # Parameters
    ///
    /// - `what`: Call description for logs
    /// - `attempt`: The call; invoked at most three times
    /// - `reauth`: Refreshes the session; its failure is returned as-is
    ///
    /// # Errors
    ///
    /// A second authorization failure after a successful re-authentication
    /// is reported as [`Error::Network`], so the caller treats the call like
    /// any other transient failure.
    pub async fn call_with_reauth<T, F, Fut, R, RFut>(
        &self,
        what: &str,
        mut attempt: F,
        mut reauth: R,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        R: FnMut() -> RFut,
        RFut: Future<Output = Result<()>>,
    {
        let mut reauthenticated = false;
        let mut backed_off = false;

        loop {
            match attempt().await {
                Err(Error::AuthExpired(msg)) if !reauthenticated => {
                    warn!("{} rejected the session ({}), re-authenticating", what, msg);
                    reauth().await?;
                    reauthenticated = true;
                }
                Err(Error::AuthExpired(msg)) => {
                    return Err(Error::network(format!(
                        "{what}: session rejected again after re-authentication: {msg}"
                    )));
                }
                Err(Error::RateLimited(msg)) if !backed_off => {
                    self.back_off(what, &msg).await;
                    backed_off = true;
                }
                other => return other,
            }
        }
    }

    async fn back_off(&self, what: &str, msg: &str) {
        warn!(
            "{} was rate limited ({}), sleeping for {:?} before retrying",
            what, msg, self.rate_limit_backoff
        );
        tokio::time::sleep(self.rate_limit_backoff).await;
    }
}
