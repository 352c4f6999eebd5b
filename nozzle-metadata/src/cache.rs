use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use nozzle_log::LogError;
use nozzle_statsd::metric;
use parking_lot::Mutex;

use crate::statsd::{MetadataCounters, MetadataGauges, MetadataTimers};
use crate::{AppId, ControlPlane, ControlPlaneError, RecordKind};

/// Placeholder name for records that could not be resolved from the control plane.
pub const UNKNOWN: &str = "<unknown>";

/// Organization and space name bound to the all-zero identifier.
pub const NON_APP_SCOPE: &str = "NA";

/// Application name bound to the all-zero identifier.
pub const NON_APP_NAME: &str = "non-app-api-http-call";

/// Organizational metadata of a single application.
///
/// Names never change after construction. The usage counter is shared by everyone holding the
/// metadata and can be incremented concurrently.
#[derive(Debug)]
pub struct AppMetadata {
    org_name: String,
    space_name: String,
    app_name: String,
    usage_count: AtomicI64,
}

impl AppMetadata {
    /// Creates metadata with the given names and a zero usage count.
    pub fn new(
        org_name: impl Into<String>,
        space_name: impl Into<String>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            org_name: org_name.into(),
            space_name: space_name.into(),
            app_name: app_name.into(),
            usage_count: AtomicI64::new(0),
        }
    }

    /// Metadata for an identifier the control plane could not resolve.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN, UNKNOWN)
    }

    /// Metadata for platform traffic that is not attributable to any application.
    pub fn non_app() -> Self {
        Self::new(NON_APP_SCOPE, NON_APP_SCOPE, NON_APP_NAME)
    }

    /// Name of the organization owning the application.
    pub fn org_name(&self) -> &str {
        &self.org_name
    }

    /// Name of the space the application is deployed to.
    pub fn space_name(&self) -> &str {
        &self.space_name
    }

    /// Name of the application.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Returns `true` if none of the names could be resolved.
    pub fn is_unknown(&self) -> bool {
        self.org_name == UNKNOWN && self.space_name == UNKNOWN && self.app_name == UNKNOWN
    }

    /// Adds one to the usage counter.
    pub fn increment(&self) {
        self.usage_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current value of the usage counter.
    pub fn usage_count(&self) -> i64 {
        self.usage_count.load(Ordering::Relaxed)
    }
}

/// Failure to build the initial snapshot of the [`AppMetadataCache`].
#[derive(Debug, thiserror::Error)]
#[error("failed to list {kind}s from the control plane")]
pub struct LoadError {
    kind: RecordKind,
    #[source]
    error: ControlPlaneError,
}

impl LoadError {
    fn new(kind: RecordKind) -> impl FnOnce(ControlPlaneError) -> Self {
        move |error| Self { kind, error }
    }

    /// The kind of record that could not be listed.
    pub fn kind(&self) -> RecordKind {
        self.kind
    }
}

/// Indexed space record.
#[derive(Clone, Debug)]
struct SpaceEntry {
    name: String,
    organization_guid: String,
}

/// A read-through cache from application identifiers to [`AppMetadata`].
///
/// The cache is populated with a full snapshot of the control plane in [`load`](Self::load).
/// Identifiers missing from the snapshot are resolved on first use with a single application
/// fetch, and the result is bound for the lifetime of the cache. Failed resolutions bind
/// placeholder metadata, so an identifier is never fetched twice. Entries are never evicted.
///
/// Lookups of cached identifiers are lock-free. Concurrent lookups of the same missing
/// identifier are coalesced into a single control plane request, lookups of different missing
/// identifiers resolve in parallel.
pub struct AppMetadataCache {
    control_plane: Arc<dyn ControlPlane>,
    /// Bound metadata by textual application identifier.
    apps: papaya::HashMap<String, Arc<AppMetadata>>,
    /// Known spaces by identifier, used to resolve missing applications.
    spaces: papaya::HashMap<String, SpaceEntry>,
    /// Known organization names by identifier.
    orgs: papaya::HashMap<String, String>,
    /// Resolutions in flight, one lock per identifier.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppMetadataCache {
    /// Builds the cache from a full snapshot of the control plane.
    ///
    /// Lists all applications, organizations and spaces, and binds every application to the names
    /// of its space and organization. Links that cannot be followed within the snapshot leave the
    /// respective name empty. The all-zero identifier is always bound to the
    /// [non-application](AppMetadata::non_app) metadata.
    ///
    /// Returns an error if any of the listings fails. The cache cannot serve without an initial
    /// snapshot, so this error is fatal to startup.
    pub fn load(control_plane: Arc<dyn ControlPlane>) -> Result<Self, LoadError> {
        let start = Instant::now();

        nozzle_log::info!("fetching applications");
        let applications = control_plane
            .list_applications()
            .map_err(LoadError::new(RecordKind::Application))?;
        nozzle_log::info!("retrieved {} applications", applications.len());

        nozzle_log::info!("fetching organizations");
        let organizations = control_plane
            .list_organizations()
            .map_err(LoadError::new(RecordKind::Organization))?;
        nozzle_log::info!("retrieved {} organizations", organizations.len());

        nozzle_log::info!("fetching spaces");
        let spaces = control_plane
            .list_spaces()
            .map_err(LoadError::new(RecordKind::Space))?;
        nozzle_log::info!("retrieved {} spaces", spaces.len());

        let cache = Self {
            control_plane,
            apps: papaya::HashMap::new(),
            spaces: papaya::HashMap::new(),
            orgs: papaya::HashMap::new(),
            in_flight: Mutex::default(),
        };

        {
            let orgs = cache.orgs.pin();
            for org in organizations {
                orgs.insert(org.guid, org.name);
            }

            let spaces_index = cache.spaces.pin();
            for space in spaces {
                let entry = SpaceEntry {
                    name: space.name,
                    organization_guid: space.organization_guid,
                };
                spaces_index.insert(space.guid, entry);
            }

            let apps = cache.apps.pin();
            for app in applications {
                let (space_name, org_name) = match spaces_index.get(&app.space_guid) {
                    Some(space) => {
                        let org_name = orgs.get(&space.organization_guid).cloned();
                        (space.name.clone(), org_name.unwrap_or_default())
                    }
                    None => (String::new(), String::new()),
                };

                let metadata = AppMetadata::new(org_name, space_name, app.name);
                apps.insert(app.guid, Arc::new(metadata));
            }

            apps.insert(AppId::NIL.to_string(), Arc::new(AppMetadata::non_app()));
        }

        nozzle_log::info!("built application metadata index");
        metric!(timer(MetadataTimers::BulkLoad) = start.elapsed());
        metric!(gauge(MetadataGauges::CacheSize) = cache.len() as u64);

        Ok(cache)
    }

    /// Returns the metadata bound to the given textual application identifier.
    ///
    /// Never fails. Identifiers that are not cached yet are resolved from the control plane and
    /// bound, subsequent lookups return the same instance without another request.
    pub fn lookup(&self, app_id: &str) -> Arc<AppMetadata> {
        if let Some(metadata) = self.apps.pin().get(app_id) {
            return Arc::clone(metadata);
        }

        self.resolve_miss(app_id)
    }

    /// Adds one to the usage counter of the given application.
    pub fn increment(&self, app_id: &str) {
        self.lookup(app_id).increment();
    }

    /// Returns the usage counter of the given application.
    pub fn usage_count(&self, app_id: &str) -> i64 {
        self.lookup(app_id).usage_count()
    }

    /// Returns the number of identifiers bound in the cache.
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Returns `true` if no identifier is bound.
    ///
    /// A loaded cache is never empty, it always binds the all-zero identifier.
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    fn resolve_miss(&self, app_id: &str) -> Arc<AppMetadata> {
        metric!(counter(MetadataCounters::LookupMiss) += 1);

        let slot = Arc::clone(self.in_flight.lock().entry(app_id.to_owned()).or_default());
        let _guard = slot.lock();

        // Another lookup may have resolved the identifier while this one was waiting.
        let existing = self.apps.pin().get(app_id).map(Arc::clone);
        let metadata = match existing {
            Some(metadata) => metadata,
            None => {
                nozzle_log::info!(app_id, "unknown application id, updating");
                let metadata = Arc::new(self.fetch_metadata(app_id));
                let apps = self.apps.pin();
                Arc::clone(apps.get_or_insert(app_id.to_owned(), metadata))
            }
        };

        // Only remove after binding, so a lookup that misses the map concurrently always finds
        // the bound metadata once it holds a slot.
        self.in_flight.lock().remove(app_id);
        metric!(gauge(MetadataGauges::CacheSize) = self.len() as u64);

        metadata
    }

    fn fetch_metadata(&self, app_id: &str) -> AppMetadata {
        let app = match self.control_plane.get_application(app_id) {
            Ok(app) => app,
            Err(error) => {
                self.report_failure(RecordKind::Application, app_id, &error);
                return AppMetadata::unknown();
            }
        };

        let space = match app.space {
            Some(space) => {
                let entry = SpaceEntry {
                    name: space.name,
                    organization_guid: space.organization_guid,
                };
                self.spaces.pin().insert(space.guid, entry.clone());
                Some(entry)
            }
            None => self.resolve_space(&app.space_guid),
        };

        // Without the space, the organization cannot be determined. The space tag is omitted.
        let (space_name, org_name) = match space {
            Some(space) => {
                let org_name = self.resolve_org(&space.organization_guid);
                (space.name, org_name.unwrap_or_else(|| UNKNOWN.to_owned()))
            }
            None => (String::new(), UNKNOWN.to_owned()),
        };

        nozzle_log::debug!(app_id, app_name = %app.name, "resolved application");
        AppMetadata::new(org_name, space_name, app.name)
    }

    fn resolve_space(&self, guid: &str) -> Option<SpaceEntry> {
        if let Some(space) = self.spaces.pin().get(guid) {
            return Some(space.clone());
        }

        match self.control_plane.get_space(guid) {
            Ok(space) => {
                let entry = SpaceEntry {
                    name: space.name,
                    organization_guid: space.organization_guid,
                };
                self.spaces.pin().insert(space.guid, entry.clone());
                Some(entry)
            }
            Err(error) => {
                self.report_failure(RecordKind::Space, guid, &error);
                None
            }
        }
    }

    fn resolve_org(&self, guid: &str) -> Option<String> {
        if let Some(name) = self.orgs.pin().get(guid) {
            return Some(name.clone());
        }

        match self.control_plane.get_organization(guid) {
            Ok(org) => {
                self.orgs.pin().insert(org.guid, org.name.clone());
                Some(org.name)
            }
            Err(error) => {
                self.report_failure(RecordKind::Organization, guid, &error);
                None
            }
        }
    }

    fn report_failure(&self, kind: RecordKind, guid: &str, error: &ControlPlaneError) {
        nozzle_log::warn!(
            record = kind.as_str(),
            guid,
            "failed to resolve {kind} from the control plane: {}",
            LogError(error),
        );
        metric!(
            counter(MetadataCounters::ResolveFailed) += 1,
            record = kind.as_str()
        );
    }
}

impl fmt::Debug for AppMetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppMetadataCache")
            .field("apps", &self.apps.len())
            .field("spaces", &self.spaces.len())
            .field("orgs", &self.orgs.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::testutils::MockControlPlane;

    const CHECKOUT: &str = "6d0b1f32-8a3a-4f0e-9a5e-0a2c6f3c1b11";
    const BILLING: &str = "b7e4c2d9-1f1a-4c55-8d2e-5c9a7e3f2a22";
    const LATE: &str = "0c5f9b2e-7d41-4a8b-b6e3-2f1d8c4a9e33";

    fn control_plane() -> MockControlPlane {
        MockControlPlane::default()
            .with_organization("org-1", "Acme")
            .with_space("space-1", "prod-space", "org-1")
            .with_application(CHECKOUT, "checkout", "space-1")
            .with_application(BILLING, "billing", "space-missing")
    }

    fn load(control_plane: MockControlPlane) -> (Arc<MockControlPlane>, AppMetadataCache) {
        let control_plane = Arc::new(control_plane);
        let cache = AppMetadataCache::load(control_plane.clone()).unwrap();
        (control_plane, cache)
    }

    #[test]
    fn test_bulk_load_resolves_names() {
        let (control_plane, cache) = load(control_plane());

        let metadata = cache.lookup(CHECKOUT);
        assert_eq!(metadata.org_name(), "Acme");
        assert_eq!(metadata.space_name(), "prod-space");
        assert_eq!(metadata.app_name(), "checkout");

        // Two applications and the non-application identifier.
        assert_eq!(cache.len(), 3);
        assert_eq!(control_plane.application_fetches(), 0);
    }

    #[test]
    fn test_bulk_load_unresolved_space_leaves_names_empty() {
        let (_, cache) = load(control_plane());

        let metadata = cache.lookup(BILLING);
        assert_eq!(metadata.org_name(), "");
        assert_eq!(metadata.space_name(), "");
        assert_eq!(metadata.app_name(), "billing");
    }

    #[test]
    fn test_bulk_load_failure() {
        for kind in [
            RecordKind::Application,
            RecordKind::Organization,
            RecordKind::Space,
        ] {
            let control_plane = Arc::new(control_plane().fail_listing(kind));
            let error = AppMetadataCache::load(control_plane).unwrap_err();
            assert_eq!(error.kind(), kind);
        }
    }

    #[test]
    fn test_bulk_load_error_message() {
        let control_plane = Arc::new(control_plane().fail_listing(RecordKind::Space));
        let error = AppMetadataCache::load(control_plane).unwrap_err();
        assert_eq!(
            error.to_string(),
            "failed to list spaces from the control plane"
        );
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_non_app_sentinel() {
        let (control_plane, cache) = load(MockControlPlane::default());

        let metadata = cache.lookup("00000000-0000-0000-0000-000000000000");
        assert_eq!(metadata.org_name(), "NA");
        assert_eq!(metadata.space_name(), "NA");
        assert_eq!(metadata.app_name(), "non-app-api-http-call");
        assert_eq!(control_plane.application_fetches(), 0);
    }

    #[test]
    fn test_non_app_sentinel_overrides_listed_app() {
        let control_plane = control_plane().with_application(
            "00000000-0000-0000-0000-000000000000",
            "impostor",
            "space-1",
        );
        let (_, cache) = load(control_plane);

        let metadata = cache.lookup(&AppId::NIL.to_string());
        assert_eq!(metadata.app_name(), NON_APP_NAME);
    }

    #[test]
    fn test_lookup_returns_same_instance() {
        let (_, cache) = load(control_plane());

        let first = cache.lookup(CHECKOUT);
        let second = cache.lookup(CHECKOUT);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_miss_resolves_and_memoizes() {
        nozzle_log::init_test!();

        let control_plane = control_plane()
            .with_unlisted_organization("org-2", "Globex")
            .with_unlisted_space("space-2", "staging", "org-2")
            .with_unlisted_application(LATE, "late-app", "space-2");
        let (control_plane, cache) = load(control_plane);

        let first = cache.lookup(LATE);
        assert_eq!(first.org_name(), "Globex");
        assert_eq!(first.space_name(), "staging");
        assert_eq!(first.app_name(), "late-app");

        let second = cache.lookup(LATE);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(control_plane.application_fetches(), 1);
        assert_eq!(control_plane.space_fetches(), 0);
        assert_eq!(control_plane.organization_fetches(), 1);
    }

    #[test]
    fn test_miss_fetches_space_if_not_embedded() {
        let control_plane = control_plane()
            .with_unlisted_organization("org-2", "Globex")
            .with_unlisted_space("space-2", "staging", "org-2")
            .with_unlisted_application(LATE, "late-app", "space-2")
            .without_embedded_spaces();
        let (control_plane, cache) = load(control_plane);

        let metadata = cache.lookup(LATE);
        assert_eq!(metadata.org_name(), "Globex");
        assert_eq!(metadata.space_name(), "staging");
        assert_eq!(control_plane.space_fetches(), 1);
        assert_eq!(control_plane.organization_fetches(), 1);
    }

    #[test]
    fn test_miss_uses_bulk_loaded_space_and_org() {
        let control_plane = control_plane().with_unlisted_application(LATE, "late-app", "space-1");
        let (control_plane, cache) = load(control_plane);

        let metadata = cache.lookup(LATE);
        assert_eq!(metadata.org_name(), "Acme");
        assert_eq!(metadata.space_name(), "prod-space");
        assert_eq!(control_plane.space_fetches(), 0);
        assert_eq!(control_plane.organization_fetches(), 0);
    }

    #[test]
    fn test_miss_unknown_application_is_memoized() {
        let (control_plane, cache) = load(control_plane());

        let first = cache.lookup(LATE);
        assert!(first.is_unknown());
        assert_eq!(first.app_name(), "<unknown>");

        let second = cache.lookup(LATE);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(control_plane.application_fetches(), 1);
    }

    #[test]
    fn test_miss_request_failure_is_memoized() {
        let control_plane = control_plane()
            .with_unlisted_application(LATE, "late-app", "space-1")
            .fail_get(LATE);
        let (control_plane, cache) = load(control_plane);

        assert!(cache.lookup(LATE).is_unknown());
        assert!(cache.lookup(LATE).is_unknown());
        assert_eq!(control_plane.application_fetches(), 1);
    }

    #[test]
    fn test_miss_org_failure_degrades_org_only() {
        let control_plane = control_plane()
            .with_unlisted_space("space-2", "staging", "org-gone")
            .with_unlisted_application(LATE, "late-app", "space-2");
        let (_, cache) = load(control_plane);

        let metadata = cache.lookup(LATE);
        assert_eq!(metadata.org_name(), "<unknown>");
        assert_eq!(metadata.space_name(), "staging");
        assert_eq!(metadata.app_name(), "late-app");
        assert!(!metadata.is_unknown());
    }

    #[test]
    fn test_miss_space_failure_degrades_org_only() {
        let control_plane = control_plane()
            .with_unlisted_application(LATE, "late-app", "space-gone")
            .without_embedded_spaces();
        let (control_plane, cache) = load(control_plane);

        let metadata = cache.lookup(LATE);
        assert_eq!(metadata.org_name(), "<unknown>");
        assert_eq!(metadata.space_name(), "");
        assert_eq!(metadata.app_name(), "late-app");
        assert!(!metadata.is_unknown());
        assert_eq!(control_plane.space_fetches(), 1);
        assert_eq!(control_plane.organization_fetches(), 0);
    }

    #[test]
    fn test_miss_embedded_space_with_missing_org() {
        let control_plane = control_plane()
            .with_unlisted_space("space-2", "staging", "org-gone")
            .with_unlisted_application(LATE, "late-app", "space-2");
        let (control_plane, cache) = load(control_plane);

        let metadata = cache.lookup(LATE);
        assert_eq!(metadata.org_name(), "<unknown>");
        assert_eq!(metadata.space_name(), "staging");
        assert_eq!(control_plane.space_fetches(), 0);
    }

    #[test]
    fn test_miss_reports_failure_metric() {
        let (_, cache) = load(control_plane());

        let captures = nozzle_statsd::with_capturing_test_client(|| {
            cache.lookup(LATE);
        });

        assert_eq!(
            captures,
            [
                "metadata.lookup.miss:1|c",
                "metadata.resolve.failed:1|c|#record:application",
                "metadata.cache.size:4|g",
            ]
        );
    }

    #[test]
    fn test_unknown_instances_have_separate_counters() {
        let (_, cache) = load(control_plane());

        cache.increment(LATE);
        cache.increment(LATE);
        cache.increment("ffffffff-ffff-ffff-ffff-ffffffffffff");

        assert_eq!(cache.usage_count(LATE), 2);
        assert_eq!(cache.usage_count("ffffffff-ffff-ffff-ffff-ffffffffffff"), 1);
    }

    #[test]
    fn test_concurrent_increments() {
        let (_, cache) = load(control_plane());
        let cache = Arc::new(cache);

        let threads = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        cache.increment(CHECKOUT);
                    }
                })
            })
            .collect::<Vec<_>>();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(cache.usage_count(CHECKOUT), 8000);
    }

    #[test]
    fn test_concurrent_misses_are_coalesced() {
        let control_plane = control_plane()
            .with_unlisted_application(LATE, "late-app", "space-1")
            .with_fetch_delay(Duration::from_millis(50));
        let (control_plane, cache) = load(control_plane);
        let cache = Arc::new(cache);

        let threads = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.lookup(LATE))
            })
            .collect::<Vec<_>>();

        let results = threads
            .into_iter()
            .map(|thread| thread.join().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(control_plane.application_fetches(), 1);
        for metadata in &results {
            assert!(Arc::ptr_eq(metadata, &results[0]));
            assert_eq!(metadata.app_name(), "late-app");
        }
    }

    #[test]
    fn test_concurrent_misses_for_different_ids() {
        let mut control_plane = control_plane();
        let ids = (0..16u64)
            .map(|i| AppId::new(i + 1, 0).to_string())
            .collect::<Vec<_>>();
        for (i, id) in ids.iter().enumerate() {
            control_plane =
                control_plane.with_unlisted_application(id, format!("app-{i}"), "space-1");
        }
        let (control_plane, cache) = load(control_plane);
        let cache = Arc::new(cache);

        let threads = ids
            .iter()
            .cloned()
            .map(|id| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.lookup(&id))
            })
            .collect::<Vec<_>>();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(control_plane.application_fetches(), 16);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(cache.lookup(id).app_name(), format!("app-{i}"));
        }
        assert_eq!(control_plane.application_fetches(), 16);
    }
}
