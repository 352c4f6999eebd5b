//! Application identifiers and their organizational metadata.
//!
//! Firehose events carry the emitting application as a compact 128-bit [`AppId`]. To make
//! forwarded metrics readable, the identifier is resolved to the names of the application, its
//! space and its organization through the [`AppMetadataCache`].
//!
//! The cache is bulk loaded from the [`ControlPlane`] once at startup. Identifiers that are not
//! part of the initial snapshot are resolved on first use and memoized for the lifetime of the
//! process, including failed resolutions:
//!
//! ```
//! use std::sync::Arc;
//! use nozzle_metadata::{AppId, AppMetadataCache, ControlPlane};
//! # use nozzle_metadata::{Application, ControlPlaneError, Organization, Space};
//! # struct Empty;
//! # impl ControlPlane for Empty {
//! #     fn list_applications(&self) -> Result<Vec<Application>, ControlPlaneError> { Ok(vec![]) }
//! #     fn list_organizations(&self) -> Result<Vec<Organization>, ControlPlaneError> { Ok(vec![]) }
//! #     fn list_spaces(&self) -> Result<Vec<Space>, ControlPlaneError> { Ok(vec![]) }
//! #     fn get_application(&self, guid: &str) -> Result<Application, ControlPlaneError> {
//! #         Err(ControlPlaneError::not_found(nozzle_metadata::RecordKind::Application, guid))
//! #     }
//! #     fn get_space(&self, guid: &str) -> Result<Space, ControlPlaneError> {
//! #         Err(ControlPlaneError::not_found(nozzle_metadata::RecordKind::Space, guid))
//! #     }
//! #     fn get_organization(&self, guid: &str) -> Result<Organization, ControlPlaneError> {
//! #         Err(ControlPlaneError::not_found(nozzle_metadata::RecordKind::Organization, guid))
//! #     }
//! # }
//! # let control_plane: Arc<dyn ControlPlane> = Arc::new(Empty);
//! let cache = AppMetadataCache::load(control_plane)?;
//!
//! let metadata = cache.lookup(&AppId::NIL.to_string());
//! assert_eq!(metadata.app_name(), "non-app-api-http-call");
//! # Ok::<(), nozzle_metadata::LoadError>(())
//! ```
#![warn(missing_docs)]

mod app_id;
mod cache;
mod control_plane;
mod statsd;

#[cfg(any(test, feature = "test"))]
pub mod testutils;

pub use self::app_id::*;
pub use self::cache::*;
pub use self::control_plane::*;
