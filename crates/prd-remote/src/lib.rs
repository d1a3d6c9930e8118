//! # prd-remote
//!
//! Resilient client for the remote document-processing platform.
//!
//! This crate provides:
//! - Two-tier retry policy (unbounded for 429, bounded for 408/5xx/network)
//! - Pluggable transport trait with a reqwest implementation
//! - Typed `RemoteApi` (fetch one/all, create, update, delete)
//! - In-memory mock remote and scripted transport (feature `mock`)

pub mod api;
pub mod client;
pub mod config;
pub mod policy;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use api::RemoteApi;
pub use client::RemoteClient;
pub use config::RemoteConfig;
pub use policy::{AttemptState, RetryDecision, RetryPolicy};
pub use reqwest::Method;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
