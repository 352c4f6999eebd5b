//! Test helpers for code depending on the [`ControlPlane`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::{Application, ControlPlane, ControlPlaneError, Organization, RecordKind, Space};

/// An in-memory [`ControlPlane`] with call accounting.
///
/// Records are either listed, meaning they are part of the bulk listings, or unlisted, meaning
/// they can only be fetched individually. This simulates records created after startup.
#[derive(Debug, Default)]
pub struct MockControlPlane {
    applications: BTreeMap<String, (Application, bool)>,
    spaces: BTreeMap<String, (Space, bool)>,
    organizations: BTreeMap<String, (Organization, bool)>,
    failing_listings: BTreeSet<&'static str>,
    failing_gets: BTreeSet<String>,
    fetch_delay: Option<Duration>,
    omit_embedded_spaces: bool,
    application_fetches: AtomicUsize,
    space_fetches: AtomicUsize,
    organization_fetches: AtomicUsize,
}

impl MockControlPlane {
    /// Adds a listed application.
    pub fn with_application(
        self,
        guid: impl Into<String>,
        name: impl Into<String>,
        space_guid: impl Into<String>,
    ) -> Self {
        self.add_application(guid.into(), name.into(), space_guid.into(), true)
    }

    /// Adds an application that is only available through [`ControlPlane::get_application`].
    pub fn with_unlisted_application(
        self,
        guid: impl Into<String>,
        name: impl Into<String>,
        space_guid: impl Into<String>,
    ) -> Self {
        self.add_application(guid.into(), name.into(), space_guid.into(), false)
    }

    /// Adds a listed space.
    pub fn with_space(
        self,
        guid: impl Into<String>,
        name: impl Into<String>,
        organization_guid: impl Into<String>,
    ) -> Self {
        self.add_space(guid.into(), name.into(), organization_guid.into(), true)
    }

    /// Adds a space that is only available through [`ControlPlane::get_space`].
    pub fn with_unlisted_space(
        self,
        guid: impl Into<String>,
        name: impl Into<String>,
        organization_guid: impl Into<String>,
    ) -> Self {
        self.add_space(guid.into(), name.into(), organization_guid.into(), false)
    }

    /// Adds a listed organization.
    pub fn with_organization(self, guid: impl Into<String>, name: impl Into<String>) -> Self {
        self.add_organization(guid.into(), name.into(), true)
    }

    /// Adds an organization that is only available through [`ControlPlane::get_organization`].
    pub fn with_unlisted_organization(
        self,
        guid: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.add_organization(guid.into(), name.into(), false)
    }

    /// Makes the listing of the given record kind fail with a request error.
    pub fn fail_listing(mut self, kind: RecordKind) -> Self {
        self.failing_listings.insert(kind.as_str());
        self
    }

    /// Makes every individual fetch of the given identifier fail with a request error.
    pub fn fail_get(mut self, guid: impl Into<String>) -> Self {
        self.failing_gets.insert(guid.into());
        self
    }

    /// Delays every individual application fetch.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Returns fetched applications without their embedded [`Space`].
    ///
    /// By default, [`ControlPlane::get_application`] embeds the space if it is known.
    pub fn without_embedded_spaces(mut self) -> Self {
        self.omit_embedded_spaces = true;
        self
    }

    /// Number of calls to [`ControlPlane::get_application`].
    pub fn application_fetches(&self) -> usize {
        self.application_fetches.load(Ordering::SeqCst)
    }

    /// Number of calls to [`ControlPlane::get_space`].
    pub fn space_fetches(&self) -> usize {
        self.space_fetches.load(Ordering::SeqCst)
    }

    /// Number of calls to [`ControlPlane::get_organization`].
    pub fn organization_fetches(&self) -> usize {
        self.organization_fetches.load(Ordering::SeqCst)
    }

    fn add_application(
        mut self,
        guid: String,
        name: String,
        space_guid: String,
        listed: bool,
    ) -> Self {
        let app = Application {
            guid: guid.clone(),
            name,
            space_guid,
            space: None,
        };
        self.applications.insert(guid, (app, listed));
        self
    }

    fn add_space(
        mut self,
        guid: String,
        name: String,
        organization_guid: String,
        listed: bool,
    ) -> Self {
        let space = Space {
            guid: guid.clone(),
            name,
            organization_guid,
        };
        self.spaces.insert(guid, (space, listed));
        self
    }

    fn add_organization(mut self, guid: String, name: String, listed: bool) -> Self {
        let org = Organization {
            guid: guid.clone(),
            name,
        };
        self.organizations.insert(guid, (org, listed));
        self
    }

    fn list<T: Clone>(
        &self,
        kind: RecordKind,
        records: &BTreeMap<String, (T, bool)>,
    ) -> Result<Vec<T>, ControlPlaneError> {
        if self.failing_listings.contains(kind.as_str()) {
            return Err(ControlPlaneError::request(format!("listing {kind}s failed")));
        }

        Ok(records
            .values()
            .filter(|(_, listed)| *listed)
            .map(|(record, _)| record.clone())
            .collect())
    }

    fn get<T: Clone>(
        &self,
        kind: RecordKind,
        records: &BTreeMap<String, (T, bool)>,
        guid: &str,
    ) -> Result<T, ControlPlaneError> {
        if self.failing_gets.contains(guid) {
            return Err(ControlPlaneError::request(format!("fetching {kind} failed")));
        }

        records
            .get(guid)
            .map(|(record, _)| record.clone())
            .ok_or_else(|| ControlPlaneError::not_found(kind, guid))
    }
}

impl ControlPlane for MockControlPlane {
    fn list_applications(&self) -> Result<Vec<Application>, ControlPlaneError> {
        self.list(RecordKind::Application, &self.applications)
    }

    fn list_organizations(&self) -> Result<Vec<Organization>, ControlPlaneError> {
        self.list(RecordKind::Organization, &self.organizations)
    }

    fn list_spaces(&self) -> Result<Vec<Space>, ControlPlaneError> {
        self.list(RecordKind::Space, &self.spaces)
    }

    fn get_application(&self, guid: &str) -> Result<Application, ControlPlaneError> {
        self.application_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            std::thread::sleep(delay);
        }
        let mut app = self.get(RecordKind::Application, &self.applications, guid)?;
        if !self.omit_embedded_spaces {
            app.space = self.spaces.get(&app.space_guid).map(|(space, _)| space.clone());
        }
        Ok(app)
    }

    fn get_space(&self, guid: &str) -> Result<Space, ControlPlaneError> {
        self.space_fetches.fetch_add(1, Ordering::SeqCst);
        self.get(RecordKind::Space, &self.spaces, guid)
    }

    fn get_organization(&self, guid: &str) -> Result<Organization, ControlPlaneError> {
        self.organization_fetches.fetch_add(1, Ordering::SeqCst);
        self.get(RecordKind::Organization, &self.organizations, guid)
    }
}
