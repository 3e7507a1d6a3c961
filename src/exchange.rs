// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! This module provides the exchange descriptor handed to the broker admin.
//! Exchanges are the routing mechanism in RabbitMQ that determine how messages are
//! distributed to queues. Only topic and fanout exchanges are declared by the
//! configurer; both are durable and never auto-deleted.

use crate::modifier::Modifier;
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};

/// Argument naming the exchange that receives messages this exchange could not route
pub const AMQP_ARGS_ALTERNATE_EXCHANGE: &str = "alternate-exchange";

/// Anything that names a broker entity.
///
/// Modifiers and bindings accept either a plain name or an already declared
/// entity through this trait.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for str {
    fn name(&self) -> &str {
        self
    }
}

impl Named for String {
    fn name(&self) -> &str {
        self
    }
}

/// Represents the types of exchanges the configurer declares.
///
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Topic,
    Fanout,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        }
    }
}

/// Definition of a RabbitMQ exchange as it is declared to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    name: String,
    kind: ExchangeKind,
    durable: bool,
    auto_delete: bool,
    arguments: FieldTable,
}

impl Exchange {
    /// Creates a durable, non auto-deleted topic exchange.
    pub fn topic(name: &str) -> Exchange {
        Exchange::new(name, ExchangeKind::Topic)
    }

    /// Creates a durable, non auto-deleted fanout exchange.
    pub fn fanout(name: &str) -> Exchange {
        Exchange::new(name, ExchangeKind::Fanout)
    }

    fn new(name: &str, kind: ExchangeKind) -> Exchange {
        Exchange {
            name: name.to_owned(),
            kind,
            durable: true,
            auto_delete: false,
            arguments: FieldTable::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    pub fn durable(&self) -> bool {
        self.durable
    }

    pub fn auto_delete(&self) -> bool {
        self.auto_delete
    }

    pub fn arguments(&self) -> &FieldTable {
        &self.arguments
    }

    /// Adds a single argument to the exchange.
    ///
    /// # Parameters
    /// * `key` - The argument name
    /// * `value` - The argument value
    ///
    /// # Returns
    /// Self for method chaining
    pub fn argument(mut self, key: &str, value: AMQPValue) -> Self {
        self.arguments.insert(ShortString::from(key), value);
        self
    }
}

impl Named for Exchange {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Returns a modifier setting the `alternate-exchange` argument to `exchange`.
///
/// The modifier performs no declaration by itself.
pub fn alternate_exchange<N: Named + ?Sized>(exchange: &N) -> Modifier<Exchange> {
    let name = exchange.name().to_owned();
    Box::new(move |ex: Exchange| {
        ex.argument(
            AMQP_ARGS_ALTERNATE_EXCHANGE,
            AMQPValue::LongString(LongString::from(name)),
        )
    })
}
