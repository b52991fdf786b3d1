//! Access to the container runtime.
//!
//! The reconciler only depends on the [`RuntimeClient`] contract. [`DockerClient`] implements
//! it on top of the Docker Engine HTTP API served on a local unix socket.
mod client;
mod docker;
mod error;
mod event;
mod models;

pub use client::{RuntimeClient, RuntimeInfo};
pub use docker::DockerClient;
pub use error::{Error, Result};
pub use event::{Event, EventStatus};
