//! Conta Explicada API Library
//!
//! Reads electricity bills with a multimodal AI service, estimates solar
//! savings, drives the results-screen reveal and captures sales leads.
//!
//! # Modules
//!
//! - `api`: Router and documentation endpoints.
//! - `core`: Domain logic namespace.
//! - `integrations`: External service namespace.
//! - `cep_client`: ViaCEP region lookup.
//! - `circuit_breaker`: Circuit breaker for webhook deliveries.
//! - `clock`: Time source for the reveal timeline.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `estimator`: Solar savings estimate.
//! - `gemini_client`: Bill extraction and narrative via Gemini.
//! - `handlers`: HTTP request handlers.
//! - `lead_capture`: Lead form masks and validation.
//! - `models`: Core data models.
//! - `prompts`: Extraction instructions and response schema.
//! - `reveal`: Results-screen reveal timeline.
//! - `session`: Per-visitor screen sequencer.
//! - `webhook_client`: Event sinks.
//! - `webhook_models`: Webhook payload models.

pub mod api;
pub mod core;
pub mod integrations;

pub mod cep_client;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod errors;
pub mod estimator;
pub mod gemini_client;
pub mod handlers;
pub mod lead_capture;
pub mod models;
pub mod prompts;
pub mod reveal;
pub mod session;
pub mod webhook_client;
pub mod webhook_models;
