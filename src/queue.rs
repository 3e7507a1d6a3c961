// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! Queues declared through the configurer are always durable, shared between
//! connections and kept when their last consumer goes away. Routing of rejected
//! or expired messages is configured through the `x-dead-letter-exchange` argument.

use crate::{exchange::Named, modifier::Modifier};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};

/// Argument naming the exchange that receives dead-lettered messages
pub const AMQP_ARGS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// Definition of a RabbitMQ queue as it is declared to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Queue {
    name: String,
    arguments: FieldTable,
}

impl Queue {
    /// Creates a durable, non-exclusive, non auto-deleted queue.
    pub fn new(name: &str) -> Queue {
        Queue {
            name: name.to_owned(),
            arguments: FieldTable::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn durable(&self) -> bool {
        true
    }

    pub fn exclusive(&self) -> bool {
        false
    }

    pub fn auto_delete(&self) -> bool {
        false
    }

    pub fn arguments(&self) -> &FieldTable {
        &self.arguments
    }

    /// Adds a single argument to the queue.
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

impl Named for Queue {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Returns a modifier routing dead-lettered messages of a queue to `exchange`.
pub fn dead_letter_exchange<N: Named + ?Sized>(exchange: &N) -> Modifier<Queue> {
    let name = exchange.name().to_owned();
    Box::new(move |queue: Queue| {
        queue.argument(
            AMQP_ARGS_DEAD_LETTER_EXCHANGE,
            AMQPValue::LongString(LongString::from(name)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exchange::Exchange, modifier::modify};

    #[test]
    fn queue_flags_are_fixed() {
        let queue = Queue::new("orders");
        assert!(queue.durable());
        assert!(!queue.exclusive());
        assert!(!queue.auto_delete());
    }

    #[test]
    fn dead_letter_exchange_by_name_or_entity() {
        let by_name = modify(Queue::new("orders"), Some(dead_letter_exchange("orders.dlx")));
        let by_entity = modify(
            Queue::new("orders"),
            Some(dead_letter_exchange(&Exchange::fanout("orders.dlx"))),
        );

        assert_eq!(by_name, by_entity);
        assert_eq!(
            by_name.arguments().inner().get(AMQP_ARGS_DEAD_LETTER_EXCHANGE),
            Some(&AMQPValue::LongString(LongString::from("orders.dlx")))
        );
    }
}
