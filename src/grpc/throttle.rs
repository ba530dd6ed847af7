//! Login throttle service implementation.

use std::sync::Arc;

use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::{Code, Request, Response, Status};
use tracing::{debug, info, instrument, warn};

use super::identity::client_identifier;
use super::proto::storeguard::v1::{
    login_throttle_server::LoginThrottle, AttemptStatus, GetAttemptStatusRequest,
    RecordAttemptRequest, ResetAttemptsRequest, ResetAttemptsResponse,
};
use crate::config::LoginThrottleConfig;
use crate::ratelimit::{describe_wait, RateLimiterBackend};

/// Implementation of the LoginThrottle gRPC interface.
pub struct LoginThrottleService<R: RateLimiterBackend> {
    /// The rate limiter instance
    rate_limiter: Arc<R>,
    /// Attempts and window applied to every identifier
    limits: LoginThrottleConfig,
}

impl<R: RateLimiterBackend> LoginThrottleService<R> {
    /// Create a new LoginThrottleService with the given rate limiter.
    pub fn new(rate_limiter: Arc<R>, limits: LoginThrottleConfig) -> Self {
        Self {
            rate_limiter,
            limits,
        }
    }

    async fn status(&self, identifier: String, limited: bool) -> AttemptStatus {
        let remaining = self
            .rate_limiter
            .remaining_attempts(&identifier, self.limits.max_attempts)
            .await;
        let reset_secs = self.rate_limiter.time_until_reset(&identifier).await;

        AttemptStatus {
            identifier,
            limited,
            max_attempts: self.limits.max_attempts,
            remaining_attempts: remaining,
            retry_after: Some(prost_types::Duration {
                seconds: i64::try_from(reset_secs).unwrap_or(i64::MAX),
                nanos: 0,
            }),
            message: if limited {
                describe_wait(reset_secs)
            } else {
                String::new()
            },
        }
    }
}

/// RESOURCE_EXHAUSTED carrying the retry hints an HTTP 429 would.
fn rate_limited_status(max_attempts: u32, remaining: u32, retry_after_secs: u64) -> Status {
    let mut metadata = MetadataMap::new();
    metadata.insert("retry-after", MetadataValue::from(retry_after_secs));
    metadata.insert("x-ratelimit-limit", MetadataValue::from(u64::from(max_attempts)));
    metadata.insert("x-ratelimit-remaining", MetadataValue::from(u64::from(remaining)));
    metadata.insert("x-ratelimit-reset", MetadataValue::from(retry_after_secs));

    Status::with_metadata(
        Code::ResourceExhausted,
        describe_wait(retry_after_secs),
        metadata,
    )
}

#[tonic::async_trait]
impl<R: RateLimiterBackend + 'static> LoginThrottle for LoginThrottleService<R> {
    /// Record a login attempt for the calling client.
    #[instrument(skip(self, request))]
    async fn record_attempt(
        &self,
        request: Request<RecordAttemptRequest>,
    ) -> Result<Response<AttemptStatus>, Status> {
        let identifier = client_identifier(&request, &request.get_ref().identifier);

        let limited = self
            .rate_limiter
            .is_rate_limited(&identifier, self.limits.max_attempts, self.limits.window())
            .await;

        if limited {
            let retry_after = self.rate_limiter.time_until_reset(&identifier).await;
            let remaining = self
                .rate_limiter
                .remaining_attempts(&identifier, self.limits.max_attempts)
                .await;

            warn!(
                identifier = %identifier,
                retry_after_secs = retry_after,
                "Login attempt rejected"
            );
            return Err(rate_limited_status(
                self.limits.max_attempts,
                remaining,
                retry_after,
            ));
        }

        let status = self.status(identifier, false).await;
        debug!(
            identifier = %status.identifier,
            remaining = status.remaining_attempts,
            "Login attempt allowed"
        );
        Ok(Response::new(status))
    }

    /// Report the calling client's attempt state without recording one.
    #[instrument(skip(self, request))]
    async fn get_attempt_status(
        &self,
        request: Request<GetAttemptStatusRequest>,
    ) -> Result<Response<AttemptStatus>, Status> {
        let identifier = client_identifier(&request, &request.get_ref().identifier);

        let remaining = self
            .rate_limiter
            .remaining_attempts(&identifier, self.limits.max_attempts)
            .await;
        let reset_secs = self.rate_limiter.time_until_reset(&identifier).await;
        let limited = remaining == 0 && reset_secs > 0;

        Ok(Response::new(self.status(identifier, limited).await))
    }

    /// Clear the calling client's attempt history.
    #[instrument(skip(self, request))]
    async fn reset_attempts(
        &self,
        request: Request<ResetAttemptsRequest>,
    ) -> Result<Response<ResetAttemptsResponse>, Status> {
        let identifier = client_identifier(&request, &request.get_ref().identifier);

        self.rate_limiter.reset(&identifier).await;
        info!(identifier = %identifier, "Login attempts reset");

        Ok(Response::new(ResetAttemptsResponse { identifier }))
    }
}
