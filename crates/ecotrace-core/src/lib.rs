//! # ecotrace-core
//!
//! Errors and logging shared by the ecotrace crates.
//!
//! - [`EcoError`] - configuration, I/O and parse failures
//! - [`logging`] - tracing setup
//!
//! ## Example
//!
//! ```no_run
//! use ecotrace_core::{EcoError, logging};
//!
//! fn main() -> ecotrace_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let config_path = std::path::Path::new("/etc/ecotrace/config.yaml");
//!     if !config_path.exists() {
//!         return Err(EcoError::config_not_found(config_path));
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{EcoError, Result};
pub use logging::{LogGuard, init_logging};
