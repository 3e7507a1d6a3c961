// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection Management
//!
//! This module handles the creation of the AMQP connection shared by the admin,
//! the template, and every listener container. The connection is opened lazily on
//! first use and then reused; each user gets its own channel on top of it.
//! Closing channels and the connection is bounded by the optional close timeout.

use crate::errors::AmqpError;
use lapin::{
    types::LongString,
    uri::AMQPUri,
    Channel, Connection, ConnectionProperties,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::OnceCell;
use tracing::{debug, error, warn};

/// Connection parameters resolved from a property source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RabbitMqSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Heartbeat interval in seconds requested from the broker
    pub requested_heartbeat: Option<u16>,
    /// Milliseconds to wait for a channel or the connection to close
    pub close_timeout: Option<u64>,
    pub virtual_host: Option<String>,
}

impl Default for RabbitMqSettings {
    fn default() -> Self {
        RabbitMqSettings {
            host: "localhost".to_owned(),
            port: 5672,
            username: "guest".to_owned(),
            password: "guest".to_owned(),
            requested_heartbeat: None,
            close_timeout: None,
            virtual_host: None,
        }
    }
}

/// Opens and caches the AMQP connection described by [`RabbitMqSettings`].
pub struct ConnectionFactory {
    settings: RabbitMqSettings,
    connection_name: Option<String>,
    connection: OnceCell<Arc<Connection>>,
}

impl ConnectionFactory {
    /// Creates a factory. No network activity happens until a channel is requested.
    pub fn new(settings: RabbitMqSettings) -> ConnectionFactory {
        ConnectionFactory {
            settings,
            connection_name: None,
            connection: OnceCell::new(),
        }
    }

    /// Sets the client-provided connection name shown in the broker management UI.
    pub fn with_connection_name(mut self, name: &str) -> Self {
        self.connection_name = Some(name.to_owned());
        self
    }

    pub fn settings(&self) -> &RabbitMqSettings {
        &self.settings
    }

    /// Bound on closing channels and the connection, if any.
    pub fn close_timeout(&self) -> Option<Duration> {
        self.settings.close_timeout.map(Duration::from_millis)
    }

    /// Builds the AMQP URI for the configured settings.
    ///
    /// Optional settings that are absent keep the client defaults.
    pub fn uri(&self) -> AMQPUri {
        let mut uri = AMQPUri::default();

        uri.authority.host = self.settings.host.clone();
        uri.authority.port = self.settings.port;
        uri.authority.userinfo.username = self.settings.username.clone();
        uri.authority.userinfo.password = self.settings.password.clone();

        if let Some(vhost) = &self.settings.virtual_host {
            uri.vhost = vhost.clone();
        }
        if let Some(heartbeat) = self.settings.requested_heartbeat {
            uri.query.heartbeat = Some(heartbeat);
        }

        uri
    }

    /// Returns the shared connection, connecting on the first call.
    pub async fn connection(&self) -> Result<Arc<Connection>, AmqpError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                debug!(
                    host = %self.settings.host,
                    port = self.settings.port,
                    "creating amqp connection..."
                );

                let mut options = ConnectionProperties::default();
                if let Some(name) = &self.connection_name {
                    options = options.with_connection_name(LongString::from(name.clone()));
                }

                match Connection::connect_uri(self.uri(), options).await {
                    Ok(c) => {
                        debug!("amqp connected");
                        Ok(Arc::new(c))
                    }
                    Err(err) => {
                        error!(error = err.to_string(), "failure to connect");
                        Err(AmqpError::ConnectionError)
                    }
                }
            })
            .await?;

        Ok(conn.clone())
    }

    /// Creates a new channel on the shared connection.
    pub async fn create_channel(&self) -> Result<Channel, AmqpError> {
        let conn = self.connection().await?;

        debug!("creating amqp channel...");
        match conn.create_channel().await {
            Ok(c) => {
                debug!("channel created");
                Ok(c)
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError)
            }
        }
    }

    /// Closes the shared connection if it was ever opened.
    pub async fn close(&self) -> Result<(), AmqpError> {
        match self.connection.get() {
            Some(conn) => {
                debug!("closing amqp connection...");
                close_within(
                    self.close_timeout(),
                    conn.close(200, "connection factory closed"),
                    AmqpError::ConnectionError,
                )
                .await
            }
            None => Ok(()),
        }
    }
}

/// Awaits `close`, giving up once `timeout` elapses.
///
/// `failure` is returned when the close fails or times out.
pub(crate) async fn close_within<F>(
    timeout: Option<Duration>,
    close: F,
    failure: AmqpError,
) -> Result<(), AmqpError>
where
    F: Future<Output = lapin::Result<()>>,
{
    let result = match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, close).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "close timed out");
                return Err(failure);
            }
        },
        None => close.await,
    };

    match result {
        Err(err) => {
            error!(error = err.to_string(), "failure to close");
            Err(failure)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_reflects_settings() {
        let factory = ConnectionFactory::new(RabbitMqSettings {
            host: "broker".to_owned(),
            port: 5673,
            username: "svc".to_owned(),
            password: "secret".to_owned(),
            requested_heartbeat: Some(30),
            close_timeout: Some(5_000),
            virtual_host: Some("orders".to_owned()),
        });

        let uri = factory.uri();
        assert_eq!(uri.authority.host, "broker");
        assert_eq!(uri.authority.port, 5673);
        assert_eq!(uri.authority.userinfo.username, "svc");
        assert_eq!(uri.authority.userinfo.password, "secret");
        assert_eq!(uri.vhost, "orders");
        assert_eq!(uri.query.heartbeat, Some(30));
        assert_eq!(uri.query.connection_timeout, None);
        assert_eq!(factory.close_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn absent_optionals_keep_client_defaults() {
        let factory = ConnectionFactory::new(RabbitMqSettings::default());
        let uri = factory.uri();

        assert_eq!(uri.vhost, AMQPUri::default().vhost);
        assert_eq!(uri.query.heartbeat, None);
        assert_eq!(uri.query.connection_timeout, None);
        assert_eq!(factory.close_timeout(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn close_gives_up_after_the_timeout() {
        let result = close_within(
            Some(Duration::from_millis(1234)),
            std::future::pending::<lapin::Result<()>>(),
            AmqpError::ChannelError,
        )
        .await;

        assert_eq!(result, Err(AmqpError::ChannelError));
    }

    #[tokio::test(start_paused = true)]
    async fn close_within_the_timeout_succeeds() {
        let close = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<(), lapin::Error>(())
        };

        let result = close_within(
            Some(Duration::from_millis(1234)),
            close,
            AmqpError::ChannelError,
        )
        .await;

        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn close_without_timeout_waits_for_completion() {
        let result = close_within(
            None,
            async { Ok::<(), lapin::Error>(()) },
            AmqpError::ChannelError,
        ).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn closing_an_unopened_factory_is_a_no_op() {
        let factory = ConnectionFactory::new(RabbitMqSettings::default());
        assert_eq!(factory.close().await, Ok(()));
    }
}
