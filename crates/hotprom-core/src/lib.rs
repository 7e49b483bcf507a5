//! hotprom core: plugin contract, metric registry, and the shared error surface.
//!
//! This crate defines what a metric plugin is and what it may touch. It carries
//! no transport, filesystem-watching, or scripting dependencies so native
//! providers and the exporter runtime can share it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! A misbehaving plugin must surface as `ExporterError`/`Result`, never as a
//! crashed exporter.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod provider;
pub mod registry;

/// Shared result type.
pub use error::{ErrorKind, ExporterError, Result};
pub use provider::{MetricProvider, PluginId};
pub use registry::{encode_text, Exposition, MetricKind, MetricRegistry};
