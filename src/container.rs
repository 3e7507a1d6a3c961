// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Listener Containers
//!
//! A listener container consumes one or more queues and hands every delivery to
//! a `MessageListener`. The container owns the acknowledgement decision:
//!
//! - the listener (wrapped by the retry interceptor, if any) succeeds: ack
//! - it fails and the error handler swallows the error: ack
//! - the error handler propagates `RejectAndDontRequeue`: nack without requeue
//! - the error handler propagates any other error: nack with requeue
//!
//! Consumption tasks run on the executor handed to the container and carry
//! OpenTelemetry consumer spans.

use crate::{
    connection::{close_within, ConnectionFactory},
    errors::AmqpError,
    message::{Message, MessageListener},
    modifier::Modifier,
    otel,
    retry::{BackoffOptions, RejectAndDontRequeueRecoverer, RetryInterceptor, RetryInterceptorBuilder},
};
use futures_util::{future::join_all, StreamExt};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::FieldTable,
    Channel,
};
use opentelemetry::{
    global::{self, BoxedTracer},
    trace::{Span, Status},
    Context,
};
use std::{borrow::Cow, sync::Arc, time::Duration};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Unacknowledged messages a consumer may hold at once
pub const DEFAULT_PREFETCH_COUNT: u16 = 1;

/// Strategy applied when a listener fails.
///
/// Returning `Ok` marks the failure as handled and the message is acknowledged.
/// Returning `Err` rejects the message.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, error: AmqpError) -> Result<(), AmqpError>;
}

/// Logs the failure and propagates it to the container. This is the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAndPropagateErrorHandler;

impl ErrorHandler for LogAndPropagateErrorHandler {
    fn handle_error(&self, error: AmqpError) -> Result<(), AmqpError> {
        error!(error = error.to_string(), "listener failed to handle message");
        Err(error)
    }
}

/// Logs the failure and treats the message as handled.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAndSuppressErrorHandler;

impl ErrorHandler for LogAndSuppressErrorHandler {
    fn handle_error(&self, error: AmqpError) -> Result<(), AmqpError> {
        warn!(error = error.to_string(), "listener failure suppressed");
        Ok(())
    }
}

/// What the container sends back to the broker for a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Ack,
    Reject { requeue: bool },
}

impl Acknowledgement {
    pub fn from_outcome(outcome: &Result<(), AmqpError>) -> Acknowledgement {
        match outcome {
            Ok(()) => Acknowledgement::Ack,
            Err(AmqpError::RejectAndDontRequeue(_)) => Acknowledgement::Reject { requeue: false },
            Err(_) => Acknowledgement::Reject { requeue: true },
        }
    }
}

/// Consumer container bound to a set of queues.
#[derive(Clone)]
pub struct SimpleListenerContainer {
    connection_factory: Arc<ConnectionFactory>,
    executor: Handle,
    queue_names: Vec<String>,
    error_handler: Arc<dyn ErrorHandler>,
    retry_interceptor: Option<RetryInterceptor>,
    prefetch_count: u16,
}

impl SimpleListenerContainer {
    /// Creates a container with the log-and-propagate error handler and no retry.
    pub fn new(
        connection_factory: Arc<ConnectionFactory>,
        executor: Handle,
        queue_names: &[&str],
    ) -> SimpleListenerContainer {
        SimpleListenerContainer {
            connection_factory,
            executor,
            queue_names: queue_names.iter().map(|q| q.to_string()).collect(),
            error_handler: Arc::new(LogAndPropagateErrorHandler),
            retry_interceptor: None,
            prefetch_count: DEFAULT_PREFETCH_COUNT,
        }
    }

    pub fn queue_names(&self) -> &[String] {
        &self.queue_names
    }

    pub fn error_handler(&self) -> &Arc<dyn ErrorHandler> {
        &self.error_handler
    }

    pub fn retry_interceptor(&self) -> Option<&RetryInterceptor> {
        self.retry_interceptor.as_ref()
    }

    pub fn prefetch_count(&self) -> u16 {
        self.prefetch_count
    }

    pub fn with_queue_names(mut self, queue_names: &[&str]) -> Self {
        self.queue_names = queue_names.iter().map(|q| q.to_string()).collect();
        self
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Replaces the interceptor wrapping listener invocations.
    pub fn with_retry_interceptor(mut self, interceptor: RetryInterceptor) -> Self {
        self.retry_interceptor = Some(interceptor);
        self
    }

    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }

    /// Starts consuming every configured queue, dispatching to `listener`.
    ///
    /// One channel is opened for the container and one consumer per queue is
    /// spawned on the executor. If any queue cannot be consumed, the consumers
    /// already spawned are aborted and the channel is closed.
    pub async fn start(
        &self,
        listener: Arc<dyn MessageListener>,
    ) -> Result<ListenerHandle, AmqpError> {
        if self.queue_names.is_empty() {
            warn!("starting a listener container without queues");
        }

        let channel = self.connection_factory.create_channel().await?;
        let mut handle = ListenerHandle {
            channel,
            tasks: vec![],
            close_timeout: self.connection_factory.close_timeout(),
        };

        let qos = handle
            .channel
            .basic_qos(self.prefetch_count, BasicQosOptions { global: false })
            .await;
        if let Err(err) = qos {
            error!(error = err.to_string(), "failure to configure qos");
            let _ = handle.stop().await;
            return Err(AmqpError::QoSDeclarationError(err.to_string()));
        }

        let dispatcher = Arc::new(Dispatcher {
            listener,
            error_handler: self.error_handler.clone(),
            retry_interceptor: self.retry_interceptor.clone(),
        });

        for queue in &self.queue_names {
            let consumer_tag = format!("{}-{}", queue, Uuid::new_v4());

            let consume = handle
                .channel
                .basic_consume(
                    queue,
                    &consumer_tag,
                    BasicConsumeOptions {
                        no_local: false,
                        no_ack: false,
                        exclusive: false,
                        nowait: false,
                    },
                    FieldTable::default(),
                )
                .await;
            let mut consumer = match consume {
                Ok(c) => c,
                Err(err) => {
                    error!(error = err.to_string(), queue = %queue, "error to create the consumer");
                    let _ = handle.stop().await;
                    return Err(AmqpError::ConsumerDeclarationError(queue.clone()));
                }
            };
            debug!(queue = %queue, consumer_tag = %consumer_tag, "consumer created");

            let dispatcher = dispatcher.clone();
            let queue = queue.clone();

            handle.tasks.push(self.executor.spawn(async move {
                let tracer = global::tracer("amqp listener container");

                while let Some(result) = consumer.next().await {
                    match result {
                        Ok(delivery) => {
                            if let Err(err) = dispatcher.on_delivery(&tracer, &queue, delivery).await
                            {
                                error!(error = err.to_string(), "error consume msg");
                            }
                        }
                        Err(err) => error!(error = err.to_string(), "errors consume msg"),
                    }
                }

                debug!(queue = %queue, "consumer stopped");
            }));
        }

        Ok(handle)
    }
}

/// Handle on a started container.
pub struct ListenerHandle {
    channel: Channel,
    tasks: Vec<JoinHandle<()>>,
    close_timeout: Option<Duration>,
}

impl ListenerHandle {
    /// Stops consumption and closes the container channel.
    ///
    /// Closing waits at most the close timeout of the connection factory.
    pub async fn stop(self) -> Result<(), AmqpError> {
        abort_all(&self.tasks);

        close_within(
            self.close_timeout,
            self.channel.close(200, "listener container stopped"),
            AmqpError::ChannelError,
        )
        .await
    }

    /// Waits until every consumer stream ends.
    pub async fn join(self) -> Result<(), AmqpError> {
        for res in join_all(self.tasks).await {
            if res.is_err() {
                error!("tokio process error");
                return Err(AmqpError::InternalError);
            }
        }

        Ok(())
    }
}

fn abort_all(tasks: &[JoinHandle<()>]) {
    for task in tasks {
        task.abort();
    }
}

/// Per-container delivery handling shared by the consumer tasks.
pub(crate) struct Dispatcher {
    pub(crate) listener: Arc<dyn MessageListener>,
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
    pub(crate) retry_interceptor: Option<RetryInterceptor>,
}

impl Dispatcher {
    /// Runs the listener chain and decides how to acknowledge the message.
    pub(crate) async fn handle(&self, ctx: &Context, message: &Message) -> Acknowledgement {
        let result = match &self.retry_interceptor {
            Some(interceptor) => {
                interceptor
                    .invoke(ctx, message, self.listener.as_ref())
                    .await
            }
            None => self.listener.on_message(ctx, message).await,
        };

        let outcome = match result {
            Ok(()) => Ok(()),
            Err(err) => self.error_handler.handle_error(err),
        };

        Acknowledgement::from_outcome(&outcome)
    }

    async fn on_delivery(
        &self,
        tracer: &BoxedTracer,
        queue: &str,
        delivery: Delivery,
    ) -> Result<(), AmqpError> {
        let (ctx, mut span) = otel::new_span(&delivery.properties, tracer, queue);
        let message = Message::from_delivery(queue, &delivery);

        match self.handle(&ctx, &message).await {
            Acknowledgement::Ack => match delivery.ack(BasicAckOptions { multiple: false }).await {
                Err(e) => {
                    error!("error whiling ack msg");
                    span.record_error(&e);
                    span.set_status(Status::Error {
                        description: Cow::from("error to ack msg"),
                    });
                    Err(AmqpError::AckMessageError)
                }
                _ => {
                    span.set_status(Status::Ok);
                    Ok(())
                }
            },
            Acknowledgement::Reject { requeue } => {
                span.set_status(Status::Error {
                    description: Cow::from("message rejected"),
                });

                match delivery
                    .nack(BasicNackOptions {
                        multiple: false,
                        requeue,
                    })
                    .await
                {
                    Err(e) => {
                        error!("error whiling nack msg");
                        span.record_error(&e);
                        Err(AmqpError::NackMessageError)
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

/// Returns a modifier installing `interceptor` on a container.
pub fn retry_operations(interceptor: RetryInterceptor) -> Modifier<SimpleListenerContainer> {
    Box::new(move |container: SimpleListenerContainer| container.with_retry_interceptor(interceptor))
}

/// Returns a modifier installing a stateless retry interceptor that rejects
/// without requeue once the attempts are exhausted.
///
/// Absent values keep the interceptor defaults: three attempts, no backoff.
pub fn retry(
    max_attempts: Option<u32>,
    backoff: Option<BackoffOptions>,
) -> Modifier<SimpleListenerContainer> {
    let mut builder = RetryInterceptorBuilder::stateless();
    if let Some(max_attempts) = max_attempts {
        builder = builder.max_attempts(max_attempts);
    }
    if let Some(backoff) = backoff {
        builder = builder.backoff_options(backoff);
    }

    retry_operations(
        builder
            .recoverer(Arc::new(RejectAndDontRequeueRecoverer))
            .build(),
    )
}

/// Returns a modifier replacing the container error handler.
pub fn error_handler(handler: Arc<dyn ErrorHandler>) -> Modifier<SimpleListenerContainer> {
    Box::new(move |container: SimpleListenerContainer| container.with_error_handler(handler))
}
