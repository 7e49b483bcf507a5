//! Top-level facade crate for hotprom.
//!
//! Re-exports core types and the exporter library so users can depend on a single crate.

pub mod core {
    pub use hotprom_core::*;
}

pub mod exporter {
    pub use hotprom_exporter::*;
}
