use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An application registered with the control plane.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Application {
    /// Textual application identifier, see [`AppId`](crate::AppId).
    pub guid: String,
    /// Human readable name of the application.
    pub name: String,
    /// Identifier of the space the application is deployed to.
    pub space_guid: String,
    /// The space the application is deployed to, if embedded in the response.
    ///
    /// Single application fetches usually include the space inline. Listings leave it out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<Space>,
}

/// A space, grouping applications within an organization.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Space {
    /// Identifier of the space.
    pub guid: String,
    /// Human readable name of the space.
    pub name: String,
    /// Identifier of the organization owning the space.
    pub organization_guid: String,
}

/// An organization, the top level of the control plane's tenancy.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Organization {
    /// Identifier of the organization.
    pub guid: String,
    /// Human readable name of the organization.
    pub name: String,
}

/// The kind of record requested from the control plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// An [`Application`].
    Application,
    /// A [`Space`].
    Space,
    /// An [`Organization`].
    Organization,
}

impl RecordKind {
    /// Returns the name of the record kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Space => "space",
            Self::Organization => "organization",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error returned by a [`ControlPlane`] call.
#[derive(Debug, thiserror::Error)]
pub enum ControlPlaneError {
    /// The requested record does not exist.
    #[error("{kind} {guid} not found")]
    NotFound {
        /// The kind of record requested.
        kind: RecordKind,
        /// The identifier that was requested.
        guid: String,
    },
    /// The request could not be completed, for example due to a transport or auth failure.
    #[error("control plane request failed")]
    Request(#[source] Box<dyn Error + Send + Sync>),
}

impl ControlPlaneError {
    /// Creates a [`ControlPlaneError::NotFound`] error.
    pub fn not_found(kind: RecordKind, guid: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            guid: guid.into(),
        }
    }

    /// Creates a [`ControlPlaneError::Request`] error from any underlying error.
    pub fn request<E>(error: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::Request(error.into())
    }
}

/// The control plane API holding applications, spaces and organizations.
///
/// Calls are blocking. Transport, authentication and pagination are up to the implementation,
/// every call either returns the complete result or fails.
pub trait ControlPlane: Send + Sync {
    /// Lists all applications.
    fn list_applications(&self) -> Result<Vec<Application>, ControlPlaneError>;

    /// Lists all organizations.
    fn list_organizations(&self) -> Result<Vec<Organization>, ControlPlaneError>;

    /// Lists all spaces.
    fn list_spaces(&self) -> Result<Vec<Space>, ControlPlaneError>;

    /// Fetches a single application by its identifier.
    ///
    /// Implementations should embed the application's [`Space`] when the API returns it inline.
    fn get_application(&self, guid: &str) -> Result<Application, ControlPlaneError>;

    /// Fetches a single space by its identifier.
    ///
    /// Only used for applications fetched without an embedded space.
    fn get_space(&self, guid: &str) -> Result<Space, ControlPlaneError>;

    /// Fetches a single organization by its identifier.
    fn get_organization(&self, guid: &str) -> Result<Organization, ControlPlaneError>;
}
