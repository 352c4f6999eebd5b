//! Configuration for the nozzle.
//!
//! The configuration is read from a `config.yml` file within a configuration folder. All sections
//! are optional and fall back to defaults:
//!
//! ```yaml
//! logging:
//!   level: debug
//!   format: json
//! metrics:
//!   prefix: "cloudfoundry.nozzle."
//!   max_post_bytes: 5000000
//! statsd:
//!   host: "127.0.0.1:8125"
//! ```
#![warn(missing_docs)]

mod config;

pub use self::config::*;
