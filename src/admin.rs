// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Administration
//!
//! This module provides the seam between the configurer and the broker. Every
//! declaration is sent as soon as it is requested: there is no batching, no
//! deduplication, and nothing is rolled back when a later declaration fails.
//!
//! The main components are:
//! - `BrokerAdmin` trait: Interface for declaring exchanges, queues, and bindings
//! - `AmqpAdmin`: Implementation of the BrokerAdmin trait over a lapin channel

use crate::{
    binding::{Binding, DestinationKind},
    connection::ConnectionFactory,
    errors::AmqpError,
    exchange::Exchange,
    queue::Queue,
};
use async_trait::async_trait;
use lapin::{
    options::{ExchangeBindOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    Channel,
};
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error};

/// Trait defining the broker operations the configurer relies on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// Declares an exchange on the broker.
    async fn declare_exchange(&self, exchange: &Exchange) -> Result<(), AmqpError>;

    /// Declares a queue on the broker.
    async fn declare_queue(&self, queue: &Queue) -> Result<(), AmqpError>;

    /// Declares a binding between an exchange and a queue or another exchange.
    async fn declare_binding(&self, binding: &Binding) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the BrokerAdmin trait.
///
/// Uses a dedicated channel that is opened on the first declaration.
pub struct AmqpAdmin {
    connection_factory: Arc<ConnectionFactory>,
    channel: OnceCell<Channel>,
}

impl AmqpAdmin {
    /// Creates a new AmqpAdmin instance.
    ///
    /// # Parameters
    /// * `connection_factory` - Factory providing the shared connection
    ///
    /// # Returns
    /// A new AmqpAdmin instance
    pub fn new(connection_factory: Arc<ConnectionFactory>) -> AmqpAdmin {
        AmqpAdmin {
            connection_factory,
            channel: OnceCell::new(),
        }
    }

    async fn channel(&self) -> Result<&Channel, AmqpError> {
        self.channel
            .get_or_try_init(|| self.connection_factory.create_channel())
            .await
    }
}

#[async_trait]
impl BrokerAdmin for AmqpAdmin {
    async fn declare_exchange(&self, exchange: &Exchange) -> Result<(), AmqpError> {
        debug!("creating exchange: {}", exchange.name());

        match self
            .channel()
            .await?
            .exchange_declare(
                exchange.name(),
                exchange.kind().into(),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: exchange.durable(),
                    auto_delete: exchange.auto_delete(),
                    internal: false,
                    nowait: false,
                },
                exchange.arguments().clone(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = exchange.name(),
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(exchange.name().to_owned()))
            }
            _ => {
                debug!("exchange: {} was created", exchange.name());
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, queue: &Queue) -> Result<(), AmqpError> {
        debug!("creating queue: {}", queue.name());

        match self
            .channel()
            .await?
            .queue_declare(
                queue.name(),
                QueueDeclareOptions {
                    passive: false,
                    durable: queue.durable(),
                    exclusive: queue.exclusive(),
                    auto_delete: queue.auto_delete(),
                    nowait: false,
                },
                queue.arguments().clone(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = queue.name(),
                    "error to declare the queue"
                );
                Err(AmqpError::DeclareQueueError(queue.name().to_owned()))
            }
            _ => {
                debug!("queue: {} was created", queue.name());
                Ok(())
            }
        }
    }

    async fn declare_binding(&self, binding: &Binding) -> Result<(), AmqpError> {
        debug!(
            "binding {:?}: {} to the exchange: {} with the key: {}",
            binding.destination_kind(),
            binding.destination(),
            binding.exchange(),
            binding.routing_key()
        );

        let channel = self.channel().await?;
        let result = match binding.destination_kind() {
            DestinationKind::Queue => {
                channel
                    .queue_bind(
                        binding.destination(),
                        binding.exchange(),
                        binding.routing_key(),
                        QueueBindOptions { nowait: false },
                        binding.arguments().clone(),
                    )
                    .await
            }
            DestinationKind::Exchange => {
                channel
                    .exchange_bind(
                        binding.destination(),
                        binding.exchange(),
                        binding.routing_key(),
                        ExchangeBindOptions { nowait: false },
                        binding.arguments().clone(),
                    )
                    .await
            }
        };

        match result {
            Err(err) => {
                error!(error = err.to_string(), "error to bind to exchange");
                Err(AmqpError::BindingError(
                    binding.exchange().to_owned(),
                    binding.destination().to_owned(),
                ))
            }
            _ => Ok(()),
        }
    }
}
