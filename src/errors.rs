// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the RabbitMQ Configurer
//!
//! This module provides the error type shared by every part of the crate.
//! The `AmqpError` enum covers configuration lookup, connection and channel
//! creation, topology declarations, publishing, and listener container failures.

use thiserror::Error;

/// Represents errors that can occur while configuring or talking to RabbitMQ.
///
/// Broker failures are not translated into a taxonomy of their own: the variant
/// names the operation that failed and carries the name of the entity involved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// A required property was not present in the property source
    #[error("missing property `{0}`")]
    MissingPropertyError(String),

    /// A property was present but could not be parsed
    #[error("invalid value `{1}` for property `{0}`")]
    InvalidPropertyError(String, String),

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a destination to an exchange
    #[error("failure to bind `{1}` to exchange `{0}`")]
    BindingError(String, String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error declaring a consumer on a queue
    #[error("failure to declare consumer on queue `{0}`")]
    ConsumerDeclarationError(String),

    /// A listener failed to handle a message
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// A message must be rejected and must not be requeued
    #[error("message rejected without requeue: {0}")]
    RejectAndDontRequeue(String),

    /// Error publishing a message
    #[error("failure to publish to `{0}`")]
    PublishingError(String),

    /// Error serializing a payload into a message body
    #[error("failure to serialize payload")]
    SerializePayloadError,

    /// Error parsing a message payload
    #[error("failure to parse payload")]
    ParsePayloadError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// No executor was available to run the listener container
    #[error("no executor available: {0}")]
    ExecutorError(String),
}
