// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Configuration
//!
//! This module reads the broker connection parameters from a property source
//! and assembles the components an application needs at startup. Keys can be
//! namespaced by a prefix, so that several brokers can be configured side by
//! side: with the prefix `test`, `rabbitmq.host` is read from `test.rabbitmq.host`.
//!
//! | key                            | required | default   |
//! |--------------------------------|----------|-----------|
//! | `rabbitmq.host`                | yes      |           |
//! | `rabbitmq.port`                | yes      |           |
//! | `rabbitmq.username`            | no       | `guest`   |
//! | `rabbitmq.password`            | no       | `guest`   |
//! | `rabbitmq.requestedHeartbeat`  | no       | client's  |
//! | `rabbitmq.connectionTimeout`   | no       | unbounded |
//! | `rabbitmq.virtualHost`         | no       | `/`       |
//!
//! `rabbitmq.connectionTimeout` is in milliseconds and bounds how long closing a
//! channel or the connection may take.

use crate::{
    admin::{AmqpAdmin, BrokerAdmin},
    configurer::RabbitMqConfigurer,
    connection::{ConnectionFactory, RabbitMqSettings},
    converter::{JsonMessageConverter, MessageConverter},
    errors::AmqpError,
    lifecycle::ConfigurationRegistry,
    template::RabbitTemplate,
};
#[cfg(test)]
use mockall::automock;
use std::{collections::HashMap, str::FromStr, sync::Arc};
use tracing::{debug, error};

pub const RABBITMQ_HOST_KEY: &str = "rabbitmq.host";
pub const RABBITMQ_PORT_KEY: &str = "rabbitmq.port";
pub const RABBITMQ_USERNAME_KEY: &str = "rabbitmq.username";
pub const RABBITMQ_PASSWORD_KEY: &str = "rabbitmq.password";
pub const RABBITMQ_REQUESTED_HEARTBEAT_KEY: &str = "rabbitmq.requestedHeartbeat";
pub const RABBITMQ_CONNECTION_TIMEOUT_KEY: &str = "rabbitmq.connectionTimeout";
pub const RABBITMQ_VIRTUAL_HOST_KEY: &str = "rabbitmq.virtualHost";

const DEFAULT_CREDENTIAL: &str = "guest";

/// Source of configuration properties.
#[cfg_attr(test, automock)]
pub trait PropertySource: Send + Sync {
    fn property(&self, key: &str) -> Option<String>;
}

/// Properties held in memory.
#[derive(Debug, Clone, Default)]
pub struct MapPropertySource {
    properties: HashMap<String, String>,
}

impl MapPropertySource {
    pub fn new() -> Self {
        MapPropertySource::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl From<HashMap<String, String>> for MapPropertySource {
    fn from(properties: HashMap<String, String>) -> Self {
        MapPropertySource { properties }
    }
}

impl PropertySource for MapPropertySource {
    fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }
}

/// Properties read from the process environment.
///
/// A key is looked up as is first, then upper-cased with dots replaced by
/// underscores: `test.rabbitmq.host` is also found as `TEST_RABBITMQ_HOST`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvPropertySource;

impl EnvPropertySource {
    pub fn env_key(key: &str) -> String {
        key.replace(['.', '-'], "_").to_uppercase()
    }
}

impl PropertySource for EnvPropertySource {
    fn property(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .or_else(|_| std::env::var(Self::env_key(key)))
            .ok()
    }
}

/// Components built from a [`RabbitMqConfiguration`].
pub struct RabbitMqComponents {
    pub connection_factory: Arc<ConnectionFactory>,
    pub admin: Arc<dyn BrokerAdmin>,
    pub configurer: Arc<RabbitMqConfigurer>,
    pub template: Arc<RabbitTemplate>,
    pub registry: ConfigurationRegistry,
}

/// Reads broker settings from a property source and builds the components.
pub struct RabbitMqConfiguration<P: PropertySource> {
    source: P,
    prefix: Option<String>,
    connection_name: Option<String>,
    message_converter: Option<Arc<dyn MessageConverter>>,
}

impl<P: PropertySource> RabbitMqConfiguration<P> {
    pub fn new(source: P) -> Self {
        RabbitMqConfiguration {
            source,
            prefix: None,
            connection_name: None,
            message_converter: None,
        }
    }

    /// Namespaces every key under `prefix`.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_owned());
        self
    }

    pub fn with_connection_name(mut self, name: &str) -> Self {
        self.connection_name = Some(name.to_owned());
        self
    }

    /// Overrides the converter used by the template.
    pub fn with_message_converter(mut self, converter: Arc<dyn MessageConverter>) -> Self {
        self.message_converter = Some(converter);
        self
    }

    /// Returns the converter handed to the template, JSON unless overridden.
    pub fn message_converter(&self) -> Arc<dyn MessageConverter> {
        match &self.message_converter {
            Some(converter) => converter.clone(),
            None => Arc::new(JsonMessageConverter),
        }
    }

    /// Resolves `key` against the configured prefix.
    pub fn property_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.to_owned(),
        }
    }

    fn property(&self, key: &str) -> Option<String> {
        self.source.property(&self.property_key(key))
    }

    fn required(&self, key: &str) -> Result<String, AmqpError> {
        self.property(key).ok_or_else(|| {
            let key = self.property_key(key);
            error!(key = %key, "missing rabbitmq property");
            AmqpError::MissingPropertyError(key)
        })
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, AmqpError> {
        match self.property(key) {
            None => Ok(None),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(value) => Ok(Some(value)),
                Err(_) => {
                    let key = self.property_key(key);
                    error!(key = %key, value = %raw, "invalid rabbitmq property");
                    Err(AmqpError::InvalidPropertyError(key, raw))
                }
            },
        }
    }

    pub fn host(&self) -> Result<String, AmqpError> {
        self.required(RABBITMQ_HOST_KEY)
    }

    pub fn port(&self) -> Result<u16, AmqpError> {
        self.parsed(RABBITMQ_PORT_KEY)?.ok_or_else(|| {
            AmqpError::MissingPropertyError(self.property_key(RABBITMQ_PORT_KEY))
        })
    }

    pub fn username(&self) -> String {
        self.property(RABBITMQ_USERNAME_KEY)
            .unwrap_or_else(|| DEFAULT_CREDENTIAL.to_owned())
    }

    pub fn password(&self) -> String {
        self.property(RABBITMQ_PASSWORD_KEY)
            .unwrap_or_else(|| DEFAULT_CREDENTIAL.to_owned())
    }

    pub fn requested_heartbeat(&self) -> Result<Option<u16>, AmqpError> {
        self.parsed(RABBITMQ_REQUESTED_HEARTBEAT_KEY)
    }

    /// Close timeout in milliseconds, read from `rabbitmq.connectionTimeout`.
    pub fn close_timeout(&self) -> Result<Option<u64>, AmqpError> {
        self.parsed(RABBITMQ_CONNECTION_TIMEOUT_KEY)
    }

    pub fn virtual_host(&self) -> Option<String> {
        self.property(RABBITMQ_VIRTUAL_HOST_KEY)
    }

    /// Resolves every connection parameter.
    pub fn settings(&self) -> Result<RabbitMqSettings, AmqpError> {
        Ok(RabbitMqSettings {
            host: self.host()?,
            port: self.port()?,
            username: self.username(),
            password: self.password(),
            requested_heartbeat: self.requested_heartbeat()?,
            close_timeout: self.close_timeout()?,
            virtual_host: self.virtual_host(),
        })
    }

    pub fn connection_factory(&self) -> Result<ConnectionFactory, AmqpError> {
        let factory = ConnectionFactory::new(self.settings()?);
        Ok(match &self.connection_name {
            Some(name) => factory.with_connection_name(name),
            None => factory,
        })
    }

    /// Builds connection factory, admin, configurer, registry, and template.
    ///
    /// Nothing connects to the broker until the first declaration or publish.
    pub fn build(&self) -> Result<RabbitMqComponents, AmqpError> {
        let connection_factory = Arc::new(self.connection_factory()?);
        debug!(
            host = %connection_factory.settings().host,
            port = connection_factory.settings().port,
            "rabbitmq configuration loaded"
        );

        let admin: Arc<dyn BrokerAdmin> = Arc::new(AmqpAdmin::new(connection_factory.clone()));
        let configurer = Arc::new(RabbitMqConfigurer::new(
            admin.clone(),
            connection_factory.clone(),
        ));
        let registry = ConfigurationRegistry::new(configurer.clone());
        let template = Arc::new(RabbitTemplate::new(
            connection_factory.clone(),
            self.message_converter(),
        ));

        Ok(RabbitMqComponents {
            connection_factory,
            admin,
            configurer,
            template,
            registry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::JSON_CONTENT_TYPE;
    use mockall::predicate::eq;
    use serde_json::Value;
    use std::time::Duration;

    #[test]
    fn config_prefix() {
        let mut env = MockPropertySource::new();
        env.expect_property()
            .with(eq("test.rabbitmq.host"))
            .returning(|_| Some("TEST_HOST".to_owned()));

        let conf = RabbitMqConfiguration::new(env).with_prefix("test");

        assert_eq!(conf.host(), Ok("TEST_HOST".to_owned()));
    }

    #[test]
    fn empty_config_prefix() {
        let mut env = MockPropertySource::new();
        env.expect_property()
            .with(eq("rabbitmq.host"))
            .returning(|_| Some("TEST_HOST".to_owned()));

        let conf = RabbitMqConfiguration::new(env);

        assert_eq!(conf.host(), Ok("TEST_HOST".to_owned()));
    }

    #[test]
    fn prefixed_and_plain_keys_never_cross() {
        let source = MapPropertySource::new()
            .with("test.rabbitmq.host", "PREFIXED")
            .with("rabbitmq.host", "PLAIN");

        let prefixed = RabbitMqConfiguration::new(source.clone()).with_prefix("test");
        let plain = RabbitMqConfiguration::new(source);

        assert_eq!(prefixed.host(), Ok("PREFIXED".to_owned()));
        assert_eq!(plain.host(), Ok("PLAIN".to_owned()));

        let only_plain = RabbitMqConfiguration::new(
            MapPropertySource::new().with("rabbitmq.host", "PLAIN"),
        )
        .with_prefix("test");
        assert_eq!(
            only_plain.host(),
            Err(AmqpError::MissingPropertyError("test.rabbitmq.host".to_owned()))
        );
    }

    #[test]
    fn settings_from_properties() {
        let conf = RabbitMqConfiguration::new(
            MapPropertySource::new()
                .with("rabbitmq.host", "broker")
                .with("rabbitmq.port", "5673")
                .with("rabbitmq.username", "svc")
                .with("rabbitmq.password", "secret")
                .with("rabbitmq.requestedHeartbeat", "15")
                .with("rabbitmq.connectionTimeout", "2000")
                .with("rabbitmq.virtualHost", "orders"),
        );

        assert_eq!(
            conf.settings(),
            Ok(RabbitMqSettings {
                host: "broker".to_owned(),
                port: 5673,
                username: "svc".to_owned(),
                password: "secret".to_owned(),
                requested_heartbeat: Some(15),
                close_timeout: Some(2000),
                virtual_host: Some("orders".to_owned()),
            })
        );
    }

    #[test]
    fn optional_settings_fall_back() {
        let conf = RabbitMqConfiguration::new(
            MapPropertySource::new()
                .with("rabbitmq.host", "broker")
                .with("rabbitmq.port", "5672"),
        );

        let settings = conf.settings().unwrap();
        assert_eq!(settings.username, "guest");
        assert_eq!(settings.password, "guest");
        assert_eq!(settings.requested_heartbeat, None);
        assert_eq!(settings.close_timeout, None);
        assert_eq!(settings.virtual_host, None);
    }

    #[test]
    fn connection_timeout_bounds_closing() {
        let conf = RabbitMqConfiguration::new(
            MapPropertySource::new()
                .with("rabbitmq.host", "broker")
                .with("rabbitmq.port", "5672")
                .with("rabbitmq.connectionTimeout", "1234"),
        );

        let factory = conf.connection_factory().unwrap();

        assert_eq!(factory.close_timeout(), Some(Duration::from_millis(1234)));
        assert_eq!(factory.uri().query.connection_timeout, None);
    }

    #[test]
    fn invalid_port_is_reported() {
        let conf = RabbitMqConfiguration::new(
            MapPropertySource::new()
                .with("rabbitmq.host", "broker")
                .with("rabbitmq.port", "amqp"),
        );

        assert_eq!(
            conf.settings(),
            Err(AmqpError::InvalidPropertyError(
                "rabbitmq.port".to_owned(),
                "amqp".to_owned()
            ))
        );
    }

    #[test]
    fn missing_port_is_reported() {
        let conf =
            RabbitMqConfiguration::new(MapPropertySource::new().with("rabbitmq.host", "broker"));

        assert_eq!(
            conf.port(),
            Err(AmqpError::MissingPropertyError("rabbitmq.port".to_owned()))
        );
    }

    #[test]
    fn env_keys_are_upper_snake_case() {
        assert_eq!(
            EnvPropertySource::env_key("test.rabbitmq.host"),
            "TEST_RABBITMQ_HOST"
        );
        assert_eq!(
            EnvPropertySource::env_key("rabbitmq.requestedHeartbeat"),
            "RABBITMQ_REQUESTEDHEARTBEAT"
        );
    }

    struct UpperCaseConverter;

    impl MessageConverter for UpperCaseConverter {
        fn content_type(&self) -> &str {
            "text/plain"
        }

        fn to_body(&self, payload: &Value) -> Result<Vec<u8>, AmqpError> {
            Ok(payload.to_string().to_uppercase().into_bytes())
        }

        fn from_body(&self, body: &[u8]) -> Result<Value, AmqpError> {
            Ok(Value::String(String::from_utf8_lossy(body).into_owned()))
        }
    }

    #[test]
    fn message_converter_defaults_to_json() {
        let conf = RabbitMqConfiguration::new(MapPropertySource::new());
        assert_eq!(conf.message_converter().content_type(), JSON_CONTENT_TYPE);

        let conf = conf.with_message_converter(Arc::new(UpperCaseConverter));
        assert_eq!(conf.message_converter().content_type(), "text/plain");
    }

    #[test]
    fn build_wires_the_components() {
        let conf = RabbitMqConfiguration::new(
            MapPropertySource::new()
                .with("test.rabbitmq.host", "broker")
                .with("test.rabbitmq.port", "5672"),
        )
        .with_prefix("test")
        .with_message_converter(Arc::new(UpperCaseConverter));

        let components = conf.build().unwrap();

        assert_eq!(components.connection_factory.settings().host, "broker");
        assert_eq!(components.template.converter().content_type(), "text/plain");
        assert_eq!(components.registry.pending(), 0);
    }
}
