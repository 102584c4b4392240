//! HTTP service for the editorial content pipeline.
//!
//! Handlers validate input, check scope claims and hand off to the
//! [`editorial::orchestrator::JobOrchestrator`] (generation) or the
//! [`editorial::lifecycle::CardLifecycle`] (review and publishing).

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod editorial;
pub mod logging;
pub mod openapi;
pub mod state;
