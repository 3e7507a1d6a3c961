// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Retry Interceptors
//!
//! A retry interceptor wraps the invocation of a message listener with a bounded
//! number of attempts, an optional exponential backoff between attempts, and a
//! recovery action once the attempts are exhausted. Interceptors are stateless:
//! nothing is remembered across deliveries, so a redelivered message starts
//! counting from the first attempt again.

use crate::{
    errors::AmqpError,
    message::{Message, MessageListener},
};
use opentelemetry::Context;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Attempts made when no explicit maximum is configured
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Exponential backoff parameters applied between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffOptions {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        BackoffOptions {
            initial_interval: Duration::from_millis(100),
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
        }
    }
}

impl BackoffOptions {
    pub fn new(initial_interval: Duration, multiplier: f64, max_interval: Duration) -> Self {
        BackoffOptions {
            initial_interval,
            multiplier,
            max_interval,
        }
    }

    /// Delay to wait after the failed `attempt` (starting at 1).
    ///
    /// Multipliers below 1 are treated as 1; the result never exceeds `max_interval`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);

        Duration::try_from_secs_f64(self.initial_interval.as_secs_f64() * factor)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

/// Action taken when every attempt to handle a message failed.
pub trait MessageRecoverer: Send + Sync {
    fn recover(&self, message: &Message, cause: AmqpError) -> Result<(), AmqpError>;
}

/// Recoverer rejecting the message without requeueing it, so the broker drops it
/// or routes it to the queue's dead-letter exchange.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectAndDontRequeueRecoverer;

impl MessageRecoverer for RejectAndDontRequeueRecoverer {
    fn recover(&self, message: &Message, cause: AmqpError) -> Result<(), AmqpError> {
        warn!(
            queue = %message.queue,
            delivery_tag = message.delivery_tag,
            "retries exhausted, rejecting message without requeue"
        );
        Err(AmqpError::RejectAndDontRequeue(cause.to_string()))
    }
}

/// Stateless retry interceptor applied by a listener container.
#[derive(Clone)]
pub struct RetryInterceptor {
    max_attempts: u32,
    backoff: Option<BackoffOptions>,
    recoverer: Option<Arc<dyn MessageRecoverer>>,
}

impl RetryInterceptor {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Option<&BackoffOptions> {
        self.backoff.as_ref()
    }

    /// Invokes `listener` until it succeeds or the attempts are exhausted.
    ///
    /// Without a recoverer the last failure is returned as is.
    pub async fn invoke(
        &self,
        ctx: &Context,
        message: &Message,
        listener: &dyn MessageListener,
    ) -> Result<(), AmqpError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match listener.on_message(ctx, message).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                return match &self.recoverer {
                    Some(recoverer) => recoverer.recover(message, err),
                    None => Err(err),
                };
            }

            debug!(error = err.to_string(), attempt, "listener failed, retrying");
            if let Some(backoff) = &self.backoff {
                tokio::time::sleep(backoff.delay(attempt)).await;
            }
            attempt += 1;
        }
    }
}

/// Builder for [`RetryInterceptor`].
pub struct RetryInterceptorBuilder {
    max_attempts: u32,
    backoff: Option<BackoffOptions>,
    recoverer: Option<Arc<dyn MessageRecoverer>>,
}

impl RetryInterceptorBuilder {
    /// Starts a stateless interceptor with the default attempts and no backoff.
    pub fn stateless() -> Self {
        RetryInterceptorBuilder {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: None,
            recoverer: None,
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn backoff_options(mut self, options: BackoffOptions) -> Self {
        self.backoff = Some(options);
        self
    }

    pub fn recoverer(mut self, recoverer: Arc<dyn MessageRecoverer>) -> Self {
        self.recoverer = Some(recoverer);
        self
    }

    pub fn build(self) -> RetryInterceptor {
        RetryInterceptor {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            recoverer: self.recoverer,
        }
    }
}
