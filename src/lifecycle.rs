// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Startup Configuration Callbacks
//!
//! Application components that declare topology or build listener containers
//! implement `AmqpConfiguration`. Startup code registers them explicitly with a
//! `ConfigurationRegistry`, which hands each of them the shared configurer
//! exactly once, in registration order.

use crate::{configurer::RabbitMqConfigurer, errors::AmqpError};
use async_trait::async_trait;
use std::{collections::VecDeque, sync::Arc};
use tracing::{debug, error};

/// Capability of declaring AMQP topology at startup.
#[async_trait]
pub trait AmqpConfiguration: Send + Sync {
    async fn configure(&self, configurer: &RabbitMqConfigurer) -> Result<(), AmqpError>;
}

/// Ordered list of configuration callbacks sharing one configurer.
pub struct ConfigurationRegistry {
    configurer: Arc<RabbitMqConfigurer>,
    pending: VecDeque<Arc<dyn AmqpConfiguration>>,
    configured: usize,
}

impl ConfigurationRegistry {
    pub fn new(configurer: Arc<RabbitMqConfigurer>) -> Self {
        ConfigurationRegistry {
            configurer,
            pending: VecDeque::new(),
            configured: 0,
        }
    }

    pub fn configurer(&self) -> &Arc<RabbitMqConfigurer> {
        &self.configurer
    }

    /// Queues `configuration` to run on the next [`Self::configure_all`].
    pub fn register(mut self, configuration: Arc<dyn AmqpConfiguration>) -> Self {
        self.pending.push_back(configuration);
        self
    }

    /// Callbacks registered but not run yet.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Callbacks already run.
    pub fn configured(&self) -> usize {
        self.configured
    }

    /// Runs every pending callback in registration order.
    ///
    /// Each callback is removed before it runs, so it is never invoked twice,
    /// even when it fails. The first failure stops the run and is returned;
    /// the callbacks after it stay pending.
    pub async fn configure_all(&mut self) -> Result<(), AmqpError> {
        while let Some(configuration) = self.pending.pop_front() {
            self.configured += 1;
            debug!(index = self.configured, "running amqp configuration");

            if let Err(err) = configuration.configure(&self.configurer).await {
                error!(error = err.to_string(), "amqp configuration failed");
                return Err(err);
            }
        }

        Ok(())
    }

    /// Configures `object` immediately and hands it back.
    ///
    /// Meant for components built after startup ran [`Self::configure_all`].
    /// A still pending registration of the same object is dropped, so it is not
    /// configured again. Objects already run by [`Self::configure_all`] are not
    /// tracked: post-processing one of them configures it a second time.
    pub async fn post_process<T: AmqpConfiguration>(
        &mut self,
        object: Arc<T>,
    ) -> Result<Arc<T>, AmqpError> {
        self.forget_pending(&object);

        self.configured += 1;
        object.configure(&self.configurer).await?;
        Ok(object)
    }

    fn forget_pending<T: AmqpConfiguration>(&mut self, object: &Arc<T>) {
        let address = Arc::as_ptr(object) as *const ();
        let before = self.pending.len();
        self.pending
            .retain(|pending| Arc::as_ptr(pending) as *const () != address);
        if self.pending.len() != before {
            debug!("pending amqp configuration post-processed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        admin::MockBrokerAdmin,
        connection::{ConnectionFactory, RabbitMqSettings},
    };
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl AmqpConfiguration for Recorder {
        async fn configure(&self, configurer: &RabbitMqConfigurer) -> Result<(), AmqpError> {
            self.calls.lock().unwrap().push(self.name);
            configurer.queue(self.name, None).await?;
            if self.fail {
                return Err(AmqpError::InternalError);
            }
            Ok(())
        }
    }

    fn registry(declared_queues: usize) -> ConfigurationRegistry {
        let mut admin = MockBrokerAdmin::new();
        admin
            .expect_declare_queue()
            .times(declared_queues)
            .returning(|_| Ok(()));

        ConfigurationRegistry::new(Arc::new(RabbitMqConfigurer::new(
            Arc::new(admin),
            Arc::new(ConnectionFactory::new(RabbitMqSettings::default())),
        )))
    }

    fn recorder(
        name: &'static str,
        calls: &Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    ) -> Arc<dyn AmqpConfiguration> {
        Arc::new(Recorder {
            name,
            calls: calls.clone(),
            fail,
        })
    }

    #[tokio::test]
    async fn runs_in_registration_order_once() {
        let calls = Arc::new(Mutex::new(vec![]));
        let mut registry = registry(3)
            .register(recorder("first", &calls, false))
            .register(recorder("second", &calls, false))
            .register(recorder("third", &calls, false));

        registry.configure_all().await.unwrap();
        registry.configure_all().await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(registry.configured(), 3);
        assert_eq!(registry.pending(), 0);
    }

    #[tokio::test]
    async fn failure_stops_the_run_without_rerunning() {
        let calls = Arc::new(Mutex::new(vec![]));
        let mut registry = registry(2)
            .register(recorder("first", &calls, true))
            .register(recorder("second", &calls, false));

        assert_eq!(registry.configure_all().await, Err(AmqpError::InternalError));
        assert_eq!(registry.pending(), 1);

        registry.configure_all().await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn post_process_configures_immediately() {
        let calls = Arc::new(Mutex::new(vec![]));
        let mut registry = registry(1);

        let object = Arc::new(Recorder {
            name: "late",
            calls: calls.clone(),
            fail: false,
        });
        let returned = registry.post_process(object.clone()).await.unwrap();

        assert!(Arc::ptr_eq(&object, &returned));
        assert_eq!(*calls.lock().unwrap(), vec!["late"]);
        assert_eq!(registry.configured(), 1);
    }

    #[tokio::test]
    async fn post_processing_a_registered_object_runs_it_once() {
        let calls = Arc::new(Mutex::new(vec![]));
        let object = Arc::new(Recorder {
            name: "both",
            calls: calls.clone(),
            fail: false,
        });
        let mut registry = registry(2)
            .register(object.clone())
            .register(recorder("other", &calls, false));

        registry.post_process(object).await.unwrap();
        assert_eq!(registry.pending(), 1);

        registry.configure_all().await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["both", "other"]);
        assert_eq!(registry.configured(), 2);
    }
}
