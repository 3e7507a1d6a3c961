// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Binding Definitions
//!
//! A binding links an exchange to a destination, either a queue or another
//! exchange, through a routing pattern.

use lapin::types::FieldTable;

/// Kind of entity a binding routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    Queue,
    Exchange,
}

/// Configuration for binding a destination to an exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    exchange: String,
    destination: String,
    destination_kind: DestinationKind,
    routing_key: String,
    arguments: FieldTable,
}

impl Binding {
    /// Creates a binding.
    ///
    /// An absent routing key becomes the empty string. Absent arguments and an
    /// explicitly empty table are the same thing on the wire, so both end up as
    /// an empty table.
    pub fn new(
        exchange: &str,
        destination: &str,
        destination_kind: DestinationKind,
        routing_key: Option<&str>,
        arguments: Option<FieldTable>,
    ) -> Binding {
        Binding {
            exchange: exchange.to_owned(),
            destination: destination.to_owned(),
            destination_kind,
            routing_key: routing_key.unwrap_or_default().to_owned(),
            arguments: arguments.unwrap_or_default(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn destination_kind(&self) -> DestinationKind {
        self.destination_kind
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn arguments(&self) -> &FieldTable {
        &self.arguments
    }
}
