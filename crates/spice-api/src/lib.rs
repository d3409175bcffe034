//! Remote front end for one [`spice_core::SimRunner`].
//!
//! [`SimServer`] multiplexes client sessions onto the shared worker pool and ships result archives back.
//! [`HttpApi`] mounts it (or any other [`ApiHandler`]) on an axum router; [`SimClient`] talks to it.

mod error;
pub use error::ApiError;

mod handler;
pub use handler::ApiHandler;

pub mod archive;

mod wire;
pub use wire::*;

mod server;
pub use server::{ServerConfig, ServerTask, SimServer};

#[cfg(feature = "http")]
mod metrics;
#[cfg(feature = "http")]
pub use metrics::Metrics;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::HttpApi;

#[cfg(feature = "http")]
pub use axum;

#[cfg(feature = "client")]
mod client;
#[cfg(feature = "client")]
pub use client::{ClientError, SimClient};
