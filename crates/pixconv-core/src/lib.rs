//! pixconv-core: turns flat pixel hit tables into per-event hit groups.
//!
//! # Conventions
//!
//! - **Errors**: library code returns typed `thiserror` errors; each maps to
//!   a stable [`error::ErrorCode`].
//! - **Logging**: `tracing` macros only. Subscribers are installed by the
//!   binary.

pub mod companion;
pub mod config;
pub mod convert;
pub mod drift;
pub mod error;
pub mod lock;
pub mod model;
pub mod segment;
pub mod sink;
pub mod source;
pub mod store;
pub mod validate;

pub use config::ConvertConfig;
pub use convert::{ConversionReport, convert, inspect};
pub use error::{ConvertError, ErrorCode};
