//! Async result polling
//!
//! An `Accepted` answer is resolved by polling `request/<request_id>` (or
//! the `location` the server handed back) until the status changes or the
//! poll budget runs out. Delays start at one second, double up to thirty
//! and carry a uniform jitter of up to a quarter of the delay.

use std::time::Duration;

use pangea_common::resilience::{sleep_or_cancel, BackoffStrategy, Jitter};
use pangea_core::CallContext;
use pangea_domain::constants::{
    POLL_INITIAL_DELAY_MS, POLL_JITTER_FRACTION, POLL_MAX_DELAY_MS, RESULT_ENDPOINT_PREFIX,
};
use pangea_domain::{AcceptedError, PangeaError, PangeaResponse, Result};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::envelope::decode;
use crate::http::{RequestLabels, Transport};

/// Where to ask for a pending result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTarget {
    pub request_id: String,
    pub location: Option<String>,
}

impl PollTarget {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self { request_id: request_id.into(), location: None }
    }
}

impl From<&AcceptedError> for PollTarget {
    fn from(accepted: &AcceptedError) -> Self {
        Self {
            request_id: accepted.request_id.clone(),
            location: accepted.accepted_result.as_ref().and_then(|handle| handle.location.clone()),
        }
    }
}

/// Delay schedule between polls
#[derive(Debug, Clone, PartialEq)]
pub struct PollSchedule {
    backoff: BackoffStrategy,
    jitter: Jitter,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(POLL_INITIAL_DELAY_MS),
                base: 2.0,
                max_delay: Duration::from_millis(POLL_MAX_DELAY_MS),
            },
            jitter: Jitter::Additive { fraction: POLL_JITTER_FRACTION },
        }
    }
}

impl PollSchedule {
    /// Jittered delay before poll number `poll` (zero-based)
    pub fn delay(&self, poll: u32) -> Duration {
        self.jitter.apply(self.backoff.calculate_delay(poll))
    }
}

/// Polls one service's result endpoint
pub struct Poller<'a> {
    transport: &'a Transport,
    service: &'a str,
    schedule: PollSchedule,
}

impl<'a> Poller<'a> {
    pub fn new(transport: &'a Transport, service: &'a str) -> Self {
        Self { transport, service, schedule: PollSchedule::default() }
    }

    fn target_url(&self, target: &PollTarget) -> Result<Url> {
        match target.location.as_deref().filter(|location| !location.is_empty()) {
            Some(location) => match Url::parse(location) {
                Ok(url) => Ok(url),
                Err(_) => self.transport.url(self.service, location),
            },
            None => self
                .transport
                .url(self.service, &format!("{RESULT_ENDPOINT_PREFIX}{}", target.request_id)),
        }
    }

    /// Ask once; a still-pending result comes back as `Accepted`
    ///
    /// # Errors
    ///
    /// `Accepted` while pending, otherwise whatever the envelope decodes to.
    pub async fn poll_once<R>(&self, ctx: &CallContext, target: &PollTarget) -> Result<PangeaResponse<R>>
    where
        R: DeserializeOwned,
    {
        let url = self.target_url(target)?;
        let path = url.path().to_string();
        let labels = RequestLabels {
            service: self.service,
            path: &path,
            request_id: Some(&target.request_id),
        };
        let response = self.transport.get(ctx, labels, url).await?;
        decode(&response)
    }

    /// Poll until the result is ready, the budget runs out or `ctx` is cancelled
    ///
    /// The budget is the configured poll-result timeout, further bounded by
    /// the call's own deadline.
    ///
    /// # Errors
    ///
    /// `Accepted` carrying the latest handle when the budget runs out,
    /// `Cancelled` when the token fires, otherwise the terminal outcome.
    pub async fn wait<R>(&self, ctx: &CallContext, accepted: AcceptedError) -> Result<PangeaResponse<R>>
    where
        R: DeserializeOwned,
    {
        let budget = self.transport.config().poll_result_timeout();
        let poll_ctx = ctx.child().with_timeout(budget);
        let mut pending = accepted;
        let mut target = PollTarget::from(&pending);

        info!(
            service = self.service,
            request_id = %target.request_id,
            budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            "request accepted, polling for result"
        );

        for poll in 0u32.. {
            let Some(remaining) = poll_ctx.remaining().filter(|left| !left.is_zero()) else {
                break;
            };
            let delay = self.schedule.delay(poll).min(remaining);
            if sleep_or_cancel(delay, ctx.cancellation()).await.is_err() {
                return Err(PangeaError::Cancelled);
            }

            match self.poll_once::<R>(&poll_ctx, &target).await {
                Err(PangeaError::Accepted(next)) => {
                    debug!(request_id = %next.request_id, poll, "result still pending");
                    pending = *next;
                    if pending.request_id.is_empty() {
                        pending.request_id.clone_from(&target.request_id);
                    }
                    let next_target = PollTarget::from(&pending);
                    if next_target.location.is_some() {
                        target = next_target;
                    }
                }
                Err(PangeaError::Timeout(_)) => break,
                outcome => return outcome,
            }
        }

        info!(service = self.service, request_id = %pending.request_id, "poll budget exhausted");
        Err(PangeaError::Accepted(Box::new(pending)))
    }
}
