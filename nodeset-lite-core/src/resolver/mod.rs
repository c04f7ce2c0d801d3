//! Dependency & version resolution.
//!
//! Given the documents a caller supplies, computes the closure of
//! namespaces they require, drawing missing ones from the cache or a
//! fetcher, and returns one version per namespace in dependency order.
//!
//! ```text
//! Collecting ──► ResolvingMissing ──► Ready
//!     ▲                │        └───► Failed { missing }
//!     └── fetched ─────┘
//! ```

mod cache;

pub use cache::{select_version, CacheKey, NamespaceCache, NamespaceRecord, VersionMatch};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{BatchWarning, Diagnostics, ModelError, Result};
use crate::wire::NodeSetDocument;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of namespaces that were neither supplied nor cached.
#[async_trait]
pub trait NamespaceFetcher: Send + Sync {
    async fn resolve(
        &self,
        uri: &str,
        publication_date: Option<DateTime<Utc>>,
        exact_match_only: bool,
    ) -> Result<Option<NamespaceRecord>>;
}

/// Never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFetcher;

#[async_trait]
impl NamespaceFetcher for NoFetcher {
    async fn resolve(
        &self,
        _uri: &str,
        _publication_date: Option<DateTime<Utc>>,
        _exact_match_only: bool,
    ) -> Result<Option<NamespaceRecord>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverState {
    Collecting,
    ResolvingMissing,
    Ready,
    Failed { missing: Vec<String> },
}

#[derive(Debug)]
pub struct Resolution {
    pub state: ResolverState,
    /// Selected namespaces, every namespace after the ones it requires.
    /// Empty unless `state` is `Ready`.
    pub namespaces: Vec<Arc<NamespaceRecord>>,
    /// Namespaces a fetch was attempted for, in attempt order.
    pub fetched: Vec<String>,
    /// The namespace whose requirement first went unresolved.
    pub requested_by: Option<String>,
}

impl Resolution {
    pub fn is_ready(&self) -> bool {
        self.state == ResolverState::Ready
    }

    pub fn documents(&self) -> impl Iterator<Item = &NodeSetDocument> {
        self.namespaces.iter().map(|r| r.document.as_ref())
    }

    /// `MissingDependency` for a failed resolution, naming the namespace
    /// that first required a missing one.
    pub fn into_ready(self) -> Result<Vec<Arc<NamespaceRecord>>> {
        match self.state {
            ResolverState::Ready => Ok(self.namespaces),
            ResolverState::Failed { missing } => Err(ModelError::MissingDependency {
                namespace: self.requested_by.unwrap_or_default(),
                missing,
            }),
            state => Err(ModelError::InvalidDocument(format!(
                "resolution stopped in state {:?}",
                state
            ))),
        }
    }
}

pub struct DependencyResolver<'a> {
    cache: &'a NamespaceCache,
    fetcher: &'a dyn NamespaceFetcher,
    exact_match_only: bool,
    timeout: Duration,
    state: ResolverState,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(cache: &'a NamespaceCache, fetcher: &'a dyn NamespaceFetcher) -> Self {
        Self {
            cache,
            fetcher,
            exact_match_only: false,
            timeout: DEFAULT_FETCH_TIMEOUT,
            state: ResolverState::Collecting,
        }
    }

    pub fn exact_match_only(mut self, exact: bool) -> Self {
        self.exact_match_only = exact;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> &ResolverState {
        &self.state
    }

    pub async fn resolve(
        &mut self,
        supplied: Vec<NodeSetDocument>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Resolution> {
        self.state = ResolverState::Collecting;
        let mut selected: BTreeMap<String, Arc<NamespaceRecord>> = BTreeMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut pending: VecDeque<Requirement> = VecDeque::new();

        // ── Collecting ──
        let mut supplied_uris: HashSet<String> = HashSet::new();
        for doc in supplied {
            let record = NamespaceRecord::from_document(doc)?;
            if let Some(prev) = selected.get(&record.uri) {
                if prev.content_hash == record.content_hash {
                    diagnostics.warn(BatchWarning::DuplicateDocument {
                        namespace: record.uri.clone(),
                        publication_date: record.publication_date,
                    });
                    continue;
                }
                return Err(ModelError::InvalidDocument(format!(
                    "{} supplied in two versions ({:?} and {:?})",
                    record.uri, prev.version, record.version
                )));
            }
            // Supplied content wins over a stale cached copy of the same key.
            let record = self.cache.put(record)?;
            debug!(namespace = %record.uri, version = ?record.version, "supplied namespace");
            self.collect(&record, &mut pending);
            order.push(record.uri.clone());
            supplied_uris.insert(record.uri.clone());
            selected.insert(record.uri.clone(), record);
        }

        // ── ResolvingMissing ──
        let mut attempted: HashSet<CacheKey> = HashSet::new();
        let mut fetched: Vec<String> = Vec::new();
        let mut missing: BTreeSet<String> = BTreeSet::new();
        let mut requested_by = None;

        while let Some(req) = pending.pop_front() {
            if missing.contains(&req.uri) {
                continue;
            }
            // A selected namespace older than this requirement must be
            // replaced by a version that satisfies it. Supplied ones cannot be.
            let replacing = match selected.get(&req.uri) {
                None => None,
                Some(have) => {
                    if self.check_selected(have, &req, diagnostics) {
                        continue;
                    }
                    if supplied_uris.contains(&req.uri) {
                        warn!(
                            namespace = %req.uri,
                            required_by = %req.required_by,
                            requested = ?req.publication_date,
                            supplied = ?have.publication_date,
                            "supplied namespace is older than required"
                        );
                        requested_by.get_or_insert_with(|| req.required_by.clone());
                        missing.insert(req.uri);
                        continue;
                    }
                    Some(Arc::clone(have))
                }
            };
            self.state = ResolverState::ResolvingMissing;

            let mut found = self.from_cache(&req)?;
            if found.is_none() && attempted.insert((req.uri.clone(), req.publication_date)) {
                if !fetched.contains(&req.uri) {
                    fetched.push(req.uri.clone());
                }
                if let Some(record) = self.fetch(&req).await {
                    self.cache.insert(record)?;
                    found = self.from_cache(&req)?;
                }
            }

            match found {
                Some((record, how)) => {
                    match &replacing {
                        // Earlier requirers now get a later version than they resolved.
                        Some(old) => {
                            diagnostics.warn(version_mismatch(&record, old.publication_date))
                        }
                        None if how == VersionMatch::Newer => {
                            diagnostics.warn(version_mismatch(&record, req.publication_date))
                        }
                        None => {}
                    }
                    // Re-enter collecting for the new namespace's own needs.
                    self.state = ResolverState::Collecting;
                    self.collect(&record, &mut pending);
                    if replacing.is_none() {
                        order.push(record.uri.clone());
                    }
                    selected.insert(record.uri.clone(), record);
                }
                None => {
                    warn!(namespace = %req.uri, required_by = %req.required_by, "namespace could not be resolved");
                    requested_by.get_or_insert_with(|| req.required_by.clone());
                    missing.insert(req.uri);
                }
            }
        }

        if !missing.is_empty() {
            self.state = ResolverState::Failed {
                missing: missing.into_iter().collect(),
            };
            return Ok(Resolution {
                state: self.state.clone(),
                namespaces: Vec::new(),
                fetched,
                requested_by,
            });
        }

        self.state = ResolverState::Ready;
        let namespaces = dependency_order(&order, &selected);
        info!(
            namespaces = namespaces.len(),
            fetched = fetched.len(),
            "dependencies resolved"
        );
        Ok(Resolution {
            state: self.state.clone(),
            namespaces,
            fetched,
            requested_by,
        })
    }

    fn collect(&self, record: &NamespaceRecord, pending: &mut VecDeque<Requirement>) {
        for req in record.required() {
            pending.push_back(Requirement {
                uri: req.model_uri.clone(),
                publication_date: req.publication_date,
                required_by: record.uri.clone(),
            });
        }
    }

    fn from_cache(&self, req: &Requirement) -> Result<Option<(Arc<NamespaceRecord>, VersionMatch)>> {
        let candidates = self.cache.candidates(&req.uri)?;
        Ok(select_version(
            &candidates,
            req.publication_date,
            self.exact_match_only,
        ))
    }

    /// One attempt. Errors and timeouts count as not found.
    async fn fetch(&self, req: &Requirement) -> Option<NamespaceRecord> {
        debug!(namespace = %req.uri, date = ?req.publication_date, "fetching namespace");
        let attempt = self
            .fetcher
            .resolve(&req.uri, req.publication_date, self.exact_match_only);
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(Some(record))) if record.uri == req.uri => Some(record),
            Ok(Ok(Some(record))) => {
                warn!(namespace = %req.uri, returned = %record.uri, "fetcher returned a different namespace");
                None
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(namespace = %req.uri, error = %e, "namespace fetch failed");
                None
            }
            Err(_) => {
                warn!(namespace = %req.uri, timeout_ms = self.timeout.as_millis() as u64, "namespace fetch timed out");
                None
            }
        }
    }

    /// Whether a namespace already selected for this batch serves `req`.
    /// Serving a later date than asked for is reported; an earlier one does
    /// not satisfy the requirement.
    fn check_selected(
        &self,
        have: &NamespaceRecord,
        req: &Requirement,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        let (Some(requested), Some(selected)) = (req.publication_date, have.publication_date)
        else {
            return true;
        };
        if selected > requested {
            diagnostics.warn(version_mismatch(have, req.publication_date));
        } else if selected < requested {
            debug!(
                namespace = %have.uri,
                requested = %requested,
                selected = %selected,
                "selected version is older than required"
            );
            return false;
        }
        true
    }
}

struct Requirement {
    uri: String,
    publication_date: Option<DateTime<Utc>>,
    required_by: String,
}

fn version_mismatch(record: &NamespaceRecord, requested: Option<DateTime<Utc>>) -> BatchWarning {
    BatchWarning::VersionMismatch {
        namespace: record.uri.clone(),
        requested,
        selected: record.publication_date,
        selected_version: record.version.clone(),
    }
}

/// Depth-first post-order over the required-model edges, starting from
/// namespaces in selection order. Cycles are cut at the first revisit.
fn dependency_order(
    order: &[String],
    selected: &BTreeMap<String, Arc<NamespaceRecord>>,
) -> Vec<Arc<NamespaceRecord>> {
    fn visit(
        uri: &str,
        selected: &BTreeMap<String, Arc<NamespaceRecord>>,
        seen: &mut HashSet<String>,
        out: &mut Vec<Arc<NamespaceRecord>>,
    ) {
        if !seen.insert(uri.to_string()) {
            return;
        }
        let Some(record) = selected.get(uri) else {
            return;
        };
        for req in record.required() {
            visit(&req.model_uri, selected, seen, out);
        }
        out.push(Arc::clone(record));
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(selected.len());
    for uri in order {
        visit(uri, selected, &mut seen, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn date(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn doc(uri: &str, version: &str, published: &str, requires: &[(&str, &str)]) -> NodeSetDocument {
        let required: String = requires
            .iter()
            .map(|(u, d)| format!(r#"<RequiredModel ModelUri="{u}" PublicationDate="{d}" />"#))
            .collect();
        crate::wire::parse_nodeset(&format!(
            r#"<UANodeSet><Models><Model ModelUri="{uri}" Version="{version}" PublicationDate="{published}">{required}</Model></Models></UANodeSet>"#
        ))
        .unwrap()
    }

    /// Serves from a fixed list and counts calls per namespace.
    #[derive(Default)]
    struct ListFetcher {
        docs: Vec<NodeSetDocument>,
        calls: Mutex<Vec<String>>,
        total: AtomicUsize,
    }

    #[async_trait]
    impl NamespaceFetcher for ListFetcher {
        async fn resolve(
            &self,
            uri: &str,
            publication_date: Option<DateTime<Utc>>,
            exact_match_only: bool,
        ) -> Result<Option<NamespaceRecord>> {
            self.total.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push(uri.to_string());
            let candidates: Vec<Arc<NamespaceRecord>> = self
                .docs
                .iter()
                .filter(|d| d.models[0].model_uri == uri)
                .map(|d| Arc::new(NamespaceRecord::from_document(d.clone()).unwrap()))
                .collect();
            Ok(select_version(&candidates, publication_date, exact_match_only)
                .map(|(r, _)| (*r).clone()))
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl NamespaceFetcher for SlowFetcher {
        async fn resolve(
            &self,
            _uri: &str,
            _publication_date: Option<DateTime<Utc>>,
            _exact_match_only: bool,
        ) -> Result<Option<NamespaceRecord>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn missing_requirement_is_fetched_once() {
        let cache = NamespaceCache::new();
        let fetcher = ListFetcher {
            docs: vec![doc("urn:a", "1.0", "2020-01-01T00:00:00Z", &[])],
            ..Default::default()
        };
        let b = doc(
            "urn:b",
            "1.0",
            "2020-02-01T00:00:00Z",
            &[("urn:a", "2020-01-01T00:00:00Z")],
        );
        let c = doc(
            "urn:c",
            "1.0",
            "2020-03-01T00:00:00Z",
            &[("urn:a", "2020-01-01T00:00:00Z"), ("urn:b", "2020-02-01T00:00:00Z")],
        );
        let mut diags = Diagnostics::new();
        let mut resolver = DependencyResolver::new(&cache, &fetcher);
        let resolution = resolver.resolve(vec![c, b], &mut diags).await.unwrap();

        assert!(resolution.is_ready());
        assert_eq!(fetcher.total.load(Ordering::SeqCst), 1);
        assert_eq!(*fetcher.calls.lock().unwrap(), vec!["urn:a".to_string()]);
        let uris: Vec<_> = resolution.namespaces.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, vec!["urn:a", "urn:b", "urn:c"]);
        assert!(diags.is_empty());
    }

    #[tokio::test]
    async fn unresolvable_requirement_fails_listing_it() {
        let cache = NamespaceCache::new();
        let fetcher = ListFetcher::default();
        let b = doc(
            "urn:b",
            "1.0",
            "2020-02-01T00:00:00Z",
            &[("urn:a", "2020-01-01T00:00:00Z")],
        );
        let mut diags = Diagnostics::new();
        let mut resolver = DependencyResolver::new(&cache, &fetcher);
        let resolution = resolver.resolve(vec![b], &mut diags).await.unwrap();

        assert_eq!(
            resolution.state,
            ResolverState::Failed {
                missing: vec!["urn:a".to_string()]
            }
        );
        assert!(resolution.namespaces.is_empty());
        assert_eq!(resolution.fetched, vec!["urn:a".to_string()]);
        match resolution.into_ready() {
            Err(ModelError::MissingDependency { namespace, missing }) => {
                assert_eq!(namespace, "urn:b");
                assert_eq!(missing, vec!["urn:a".to_string()]);
            }
            other => panic!("expected missing dependency, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn newer_cached_version_is_used_with_warning() {
        let cache = NamespaceCache::new();
        cache
            .insert(NamespaceRecord::from_document(doc("urn:a", "1.0", "2020-01-01T00:00:00Z", &[])).unwrap())
            .unwrap();
        cache
            .insert(NamespaceRecord::from_document(doc("urn:a", "1.1", "2021-06-01T00:00:00Z", &[])).unwrap())
            .unwrap();
        let b = doc(
            "urn:b",
            "1.0",
            "2021-07-01T00:00:00Z",
            &[("urn:a", "2021-01-01T00:00:00Z")],
        );
        let mut diags = Diagnostics::new();
        let resolution = DependencyResolver::new(&cache, &NoFetcher)
            .resolve(vec![b], &mut diags)
            .await
            .unwrap();

        assert!(resolution.is_ready());
        assert!(resolution.fetched.is_empty());
        assert_eq!(resolution.namespaces[0].version.as_deref(), Some("1.1"));
        assert_eq!(
            diags.warnings(),
            &[BatchWarning::VersionMismatch {
                namespace: "urn:a".into(),
                requested: Some(date("2021-01-01T00:00:00Z")),
                selected: Some(date("2021-06-01T00:00:00Z")),
                selected_version: Some("1.1".into()),
            }]
        );
    }

    #[tokio::test]
    async fn exact_only_rejects_newer_versions() {
        let cache = NamespaceCache::new();
        cache
            .insert(NamespaceRecord::from_document(doc("urn:a", "1.1", "2021-06-01T00:00:00Z", &[])).unwrap())
            .unwrap();
        let b = doc(
            "urn:b",
            "1.0",
            "2021-07-01T00:00:00Z",
            &[("urn:a", "2021-01-01T00:00:00Z")],
        );
        let mut diags = Diagnostics::new();
        let mut resolver = DependencyResolver::new(&cache, &NoFetcher).exact_match_only(true);
        let resolution = resolver.resolve(vec![b], &mut diags).await.unwrap();
        assert!(!resolution.is_ready());
        assert!(matches!(resolver.state(), ResolverState::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_timeout_counts_as_missing() {
        let cache = NamespaceCache::new();
        let b = doc(
            "urn:b",
            "1.0",
            "2020-02-01T00:00:00Z",
            &[("urn:a", "2020-01-01T00:00:00Z")],
        );
        let mut diags = Diagnostics::new();
        let resolution = DependencyResolver::new(&cache, &SlowFetcher)
            .timeout(Duration::from_millis(50))
            .resolve(vec![b], &mut diags)
            .await
            .unwrap();
        assert_eq!(
            resolution.state,
            ResolverState::Failed {
                missing: vec!["urn:a".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn supplied_document_replaces_stale_cached_copy() {
        let cache = NamespaceCache::new();
        cache
            .insert(NamespaceRecord::from_document(doc("urn:a", "1.0", "2020-01-01T00:00:00Z", &[])).unwrap())
            .unwrap();
        let edited = doc("urn:a", "1.0-edited", "2020-01-01T00:00:00Z", &[]);
        let mut diags = Diagnostics::new();
        let resolution = DependencyResolver::new(&cache, &NoFetcher)
            .resolve(vec![edited], &mut diags)
            .await
            .unwrap();

        assert!(resolution.is_ready());
        assert_eq!(resolution.namespaces[0].version.as_deref(), Some("1.0-edited"));
        let cached = cache
            .get("urn:a", Some(date("2020-01-01T00:00:00Z")))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&cached, &resolution.namespaces[0]));
        assert!(diags.is_empty());
    }

    #[tokio::test]
    async fn two_versions_of_one_supplied_namespace_are_rejected() {
        let cache = NamespaceCache::new();
        let a1 = doc("urn:a", "1.0", "2020-01-01T00:00:00Z", &[]);
        let a2 = doc("urn:a", "1.1", "2021-06-01T00:00:00Z", &[]);
        let mut diags = Diagnostics::new();
        let err = DependencyResolver::new(&cache, &NoFetcher)
            .resolve(vec![a1, a2], &mut diags)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn selected_newer_than_required_warns() {
        let cache = NamespaceCache::new();
        let a = doc("urn:a", "1.1", "2021-06-01T00:00:00Z", &[]);
        let b = doc(
            "urn:b",
            "1.0",
            "2021-07-01T00:00:00Z",
            &[("urn:a", "2020-01-01T00:00:00Z")],
        );
        let mut diags = Diagnostics::new();
        let resolution = DependencyResolver::new(&cache, &NoFetcher)
            .resolve(vec![a, b], &mut diags)
            .await
            .unwrap();

        assert!(resolution.is_ready());
        assert_eq!(
            diags.warnings(),
            &[BatchWarning::VersionMismatch {
                namespace: "urn:a".into(),
                requested: Some(date("2020-01-01T00:00:00Z")),
                selected: Some(date("2021-06-01T00:00:00Z")),
                selected_version: Some("1.1".into()),
            }]
        );
    }

    #[tokio::test]
    async fn supplied_older_than_required_fails() {
        let cache = NamespaceCache::new();
        let fetcher = ListFetcher::default();
        let a = doc("urn:a", "1.0", "2020-01-01T00:00:00Z", &[]);
        let b = doc(
            "urn:b",
            "1.0",
            "2021-07-01T00:00:00Z",
            &[("urn:a", "2021-06-01T00:00:00Z")],
        );
        let mut diags = Diagnostics::new();
        let resolution = DependencyResolver::new(&cache, &fetcher)
            .resolve(vec![a, b], &mut diags)
            .await
            .unwrap();

        assert_eq!(
            resolution.state,
            ResolverState::Failed {
                missing: vec!["urn:a".to_string()]
            }
        );
        assert_eq!(fetcher.total.load(Ordering::SeqCst), 0);
        match resolution.into_ready() {
            Err(ModelError::MissingDependency { namespace, missing }) => {
                assert_eq!(namespace, "urn:b");
                assert_eq!(missing, vec!["urn:a".to_string()]);
            }
            other => panic!("expected missing dependency, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fetched_version_is_upgraded_for_a_later_requirement() {
        let cache = NamespaceCache::new();
        let fetcher = ListFetcher {
            docs: vec![
                doc("urn:a", "1.0", "2020-01-01T00:00:00Z", &[]),
                doc("urn:a", "1.1", "2021-06-01T00:00:00Z", &[]),
            ],
            ..Default::default()
        };
        let b = doc(
            "urn:b",
            "1.0",
            "2020-02-01T00:00:00Z",
            &[("urn:a", "2020-01-01T00:00:00Z")],
        );
        let c = doc(
            "urn:c",
            "1.0",
            "2021-07-01T00:00:00Z",
            &[("urn:a", "2021-06-01T00:00:00Z")],
        );
        let mut diags = Diagnostics::new();
        let resolution = DependencyResolver::new(&cache, &fetcher)
            .resolve(vec![b, c], &mut diags)
            .await
            .unwrap();

        assert!(resolution.is_ready());
        assert_eq!(fetcher.total.load(Ordering::SeqCst), 2);
        assert_eq!(resolution.fetched, vec!["urn:a".to_string()]);
        let picked: Vec<_> = resolution
            .namespaces
            .iter()
            .map(|r| (r.uri.as_str(), r.version.as_deref()))
            .collect();
        assert_eq!(
            picked,
            vec![
                ("urn:a", Some("1.1")),
                ("urn:b", Some("1.0")),
                ("urn:c", Some("1.0"))
            ]
        );
        assert_eq!(
            diags.warnings(),
            &[BatchWarning::VersionMismatch {
                namespace: "urn:a".into(),
                requested: Some(date("2020-01-01T00:00:00Z")),
                selected: Some(date("2021-06-01T00:00:00Z")),
                selected_version: Some("1.1".into()),
            }]
        );
    }

    #[tokio::test]
    async fn duplicate_supplied_document_is_reported_once() {
        let cache = NamespaceCache::new();
        let a = doc("urn:a", "1.0", "2020-01-01T00:00:00Z", &[]);
        let mut diags = Diagnostics::new();
        let resolution = DependencyResolver::new(&cache, &NoFetcher)
            .resolve(vec![a.clone(), a], &mut diags)
            .await
            .unwrap();
        assert_eq!(resolution.namespaces.len(), 1);
        assert_eq!(diags.warnings().len(), 1);
    }
}
