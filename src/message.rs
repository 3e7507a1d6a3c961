// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumed Messages
//!
//! A `Message` is the view of a delivery handed to application listeners by the
//! listener container.

use crate::{converter::MessageConverter, errors::AmqpError};
use async_trait::async_trait;
use lapin::{message::Delivery, BasicProperties};
use opentelemetry::Context;
use serde::de::DeserializeOwned;
use tracing::error;

/// A message received from a queue.
#[derive(Debug, Clone)]
pub struct Message {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub properties: BasicProperties,
    pub body: Vec<u8>,
}

impl Message {
    /// Creates a message carrying `body` as if it was consumed from `queue`.
    pub fn new(queue: &str, body: &[u8]) -> Message {
        Message {
            queue: queue.to_owned(),
            exchange: String::new(),
            routing_key: String::new(),
            delivery_tag: 0,
            redelivered: false,
            properties: BasicProperties::default(),
            body: body.to_vec(),
        }
    }

    pub(crate) fn from_delivery(queue: &str, delivery: &Delivery) -> Message {
        Message {
            queue: queue.to_owned(),
            exchange: delivery.exchange.to_string(),
            routing_key: delivery.routing_key.to_string(),
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            properties: delivery.properties.clone(),
            body: delivery.data.clone(),
        }
    }

    /// Decodes the body with `converter` into `T`.
    pub fn payload<T: DeserializeOwned>(
        &self,
        converter: &dyn MessageConverter,
    ) -> Result<T, AmqpError> {
        let value = converter.from_body(&self.body)?;
        serde_json::from_value(value).map_err(|err| {
            error!(error = err.to_string(), queue = %self.queue, "failure to parse payload");
            AmqpError::ParsePayloadError
        })
    }
}

/// Application callback invoked by a listener container for every message.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, ctx: &Context, message: &Message) -> Result<(), AmqpError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::JsonMessageConverter;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct OrderPlaced {
        id: u32,
    }

    #[test]
    fn payload_is_decoded_through_the_converter() {
        let message = Message::new("orders", br#"{"id":7}"#);
        let order: OrderPlaced = message.payload(&JsonMessageConverter).unwrap();
        assert_eq!(order, OrderPlaced { id: 7 });
    }

    #[test]
    fn mismatched_payload_is_a_parse_error() {
        let message = Message::new("orders", br#"{"name":"x"}"#);
        let result = message.payload::<OrderPlaced>(&JsonMessageConverter);
        assert_eq!(result, Err(AmqpError::ParsePayloadError));
    }
}
