// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod otel;

pub mod admin;
pub mod binding;
pub mod configuration;
pub mod configurer;
pub mod connection;
pub mod container;
pub mod converter;
pub mod errors;
pub mod exchange;
pub mod lifecycle;
pub mod message;
pub mod modifier;
pub mod queue;
pub mod retry;
pub mod template;
