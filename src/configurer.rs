// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Configurer
//!
//! This module provides the fluent API application code uses to declare its
//! topology and build its listener containers. Each declaration is sent to the
//! broker admin before the call returns; a failing declaration is returned to the
//! caller untouched, which in practice makes application startup fail fast.

use crate::{
    admin::BrokerAdmin,
    binding::{Binding, DestinationKind},
    connection::ConnectionFactory,
    container::{self, ErrorHandler, SimpleListenerContainer},
    errors::AmqpError,
    exchange::{self, Exchange, Named},
    modifier::{modify, Modifier},
    queue::{self, Queue},
    retry::{BackoffOptions, RetryInterceptor},
};
use lapin::types::FieldTable;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::error;

/// Declares exchanges, queues, and bindings, and builds listener containers.
pub struct RabbitMqConfigurer {
    admin: Arc<dyn BrokerAdmin>,
    connection_factory: Arc<ConnectionFactory>,
}

impl RabbitMqConfigurer {
    /// Creates a configurer.
    ///
    /// # Parameters
    /// * `admin` - Receives every declaration
    /// * `connection_factory` - Used by the listener containers built here
    pub fn new(
        admin: Arc<dyn BrokerAdmin>,
        connection_factory: Arc<ConnectionFactory>,
    ) -> RabbitMqConfigurer {
        RabbitMqConfigurer {
            admin,
            connection_factory,
        }
    }

    /// Declares a topic exchange after applying `modifier`.
    pub async fn topic_exchange(
        &self,
        name: &str,
        modifier: Option<Modifier<Exchange>>,
    ) -> Result<Exchange, AmqpError> {
        self.declare_exchange(Exchange::topic(name), modifier).await
    }

    /// Declares a fanout exchange after applying `modifier`.
    pub async fn fanout_exchange(
        &self,
        name: &str,
        modifier: Option<Modifier<Exchange>>,
    ) -> Result<Exchange, AmqpError> {
        self.declare_exchange(Exchange::fanout(name), modifier).await
    }

    /// See [`exchange::alternate_exchange`].
    pub fn alternate_exchange<N: Named + ?Sized>(&self, exchange: &N) -> Modifier<Exchange> {
        exchange::alternate_exchange(exchange)
    }

    /// Declares a durable queue after applying `modifier`.
    pub async fn queue(
        &self,
        name: &str,
        modifier: Option<Modifier<Queue>>,
    ) -> Result<Queue, AmqpError> {
        let queue = modify(Queue::new(name), modifier);
        self.admin.declare_queue(&queue).await?;
        Ok(queue)
    }

    /// See [`queue::dead_letter_exchange`].
    pub fn dead_letter_exchange<N: Named + ?Sized>(&self, exchange: &N) -> Modifier<Queue> {
        queue::dead_letter_exchange(exchange)
    }

    /// Declares a binding from `exchange` to `destination`.
    ///
    /// A missing routing key is declared as the empty string.
    pub async fn bind(
        &self,
        exchange: &str,
        destination: &str,
        destination_kind: DestinationKind,
        routing_key: Option<&str>,
        arguments: Option<FieldTable>,
    ) -> Result<Binding, AmqpError> {
        let binding = Binding::new(
            exchange,
            destination,
            destination_kind,
            routing_key,
            arguments,
        );
        self.admin.declare_binding(&binding).await?;
        Ok(binding)
    }

    /// Declares a binding from `exchange` to `queue`.
    pub async fn bind_queue(
        &self,
        exchange: &str,
        queue: &Queue,
        routing_key: Option<&str>,
        arguments: Option<FieldTable>,
    ) -> Result<Binding, AmqpError> {
        self.bind(
            exchange,
            queue.name(),
            DestinationKind::Queue,
            routing_key,
            arguments,
        )
        .await
    }

    /// Builds a listener container consuming `queue_names` on `executor`.
    ///
    /// The container logs and propagates listener failures unless `modifier`
    /// installs another error handler.
    pub fn listener_container(
        &self,
        executor: Handle,
        modifier: Option<Modifier<SimpleListenerContainer>>,
        queue_names: &[&str],
    ) -> SimpleListenerContainer {
        modify(
            SimpleListenerContainer::new(self.connection_factory.clone(), executor, queue_names),
            modifier,
        )
    }

    /// Same as [`Self::listener_container`], running on the current tokio runtime.
    pub fn listener_container_on_current(
        &self,
        modifier: Option<Modifier<SimpleListenerContainer>>,
        queue_names: &[&str],
    ) -> Result<SimpleListenerContainer, AmqpError> {
        let executor = Handle::try_current().map_err(|err| {
            error!(error = err.to_string(), "no tokio runtime for the listener container");
            AmqpError::ExecutorError(err.to_string())
        })?;

        Ok(self.listener_container(executor, modifier, queue_names))
    }

    /// See [`container::retry_operations`].
    pub fn retry_operations(
        &self,
        interceptor: RetryInterceptor,
    ) -> Modifier<SimpleListenerContainer> {
        container::retry_operations(interceptor)
    }

    /// See [`container::retry`].
    pub fn retry(
        &self,
        max_attempts: Option<u32>,
        backoff: Option<BackoffOptions>,
    ) -> Modifier<SimpleListenerContainer> {
        container::retry(max_attempts, backoff)
    }

    /// See [`container::error_handler`].
    pub fn error_handler(&self, handler: Arc<dyn ErrorHandler>) -> Modifier<SimpleListenerContainer> {
        container::error_handler(handler)
    }

    async fn declare_exchange(
        &self,
        exchange: Exchange,
        modifier: Option<Modifier<Exchange>>,
    ) -> Result<Exchange, AmqpError> {
        let exchange = modify(exchange, modifier);
        self.admin.declare_exchange(&exchange).await?;
        Ok(exchange)
    }
}
