// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Template
//!
//! This module provides the publishing side assembled by the configuration.
//! Payloads go through the configured `MessageConverter` and the OpenTelemetry
//! context is propagated in the message headers.

use crate::{connection::ConnectionFactory, converter::MessageConverter, errors::AmqpError, otel};
use lapin::{
    options::BasicPublishOptions,
    types::{FieldTable, ShortString},
    BasicProperties, Channel,
};
use opentelemetry::Context;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error};
use uuid::Uuid;

/// AMQP delivery mode marking a message as persistent
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Publishes messages through a dedicated channel opened on first use.
pub struct RabbitTemplate {
    connection_factory: Arc<ConnectionFactory>,
    converter: Arc<dyn MessageConverter>,
    channel: OnceCell<Channel>,
}

impl RabbitTemplate {
    pub fn new(
        connection_factory: Arc<ConnectionFactory>,
        converter: Arc<dyn MessageConverter>,
    ) -> RabbitTemplate {
        RabbitTemplate {
            connection_factory,
            converter,
            channel: OnceCell::new(),
        }
    }

    pub fn converter(&self) -> &Arc<dyn MessageConverter> {
        &self.converter
    }

    /// Properties of an outgoing message: content type of the converter, a fresh
    /// message id, persistent delivery, and the trace context of `ctx`.
    pub fn properties(&self, ctx: &Context, message_type: Option<&str>) -> BasicProperties {
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(self.converter.content_type()))
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
            .with_headers(FieldTable::from(otel::inject_context(ctx)));

        match message_type {
            Some(message_type) => properties.with_type(ShortString::from(message_type)),
            None => properties,
        }
    }

    /// Serializes `payload` with the converter and publishes it.
    pub async fn convert_and_send<T: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        exchange: &str,
        routing_key: &str,
        payload: &T,
    ) -> Result<(), AmqpError> {
        let value = serde_json::to_value(payload).map_err(|err| {
            error!(error = err.to_string(), "failure to serialize payload");
            AmqpError::SerializePayloadError
        })?;
        let body = self.converter.to_body(&value)?;

        self.send(exchange, routing_key, &body, self.properties(ctx, None))
            .await
    }

    /// Publishes a raw body.
    pub async fn send(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        let channel = self
            .channel
            .get_or_try_init(|| self.connection_factory.create_channel())
            .await?;

        debug!(exchange, routing_key, "publishing message");
        match channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                body,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError(exchange.to_owned()))
            }
            _ => Ok(()),
        }
    }
}
