//! Fetch coordinator
//!
//! Drives the cache to completeness against a [`RegistrySource`] in three
//! phases: listing, versions, node definitions. Listing pages are fetched
//! one after another. The other two phases fan out to a fixed pool of
//! worker tasks; results come back over one channel and are applied to the
//! cache by the coordinator alone, in job order, so the final cache does not
//! depend on which request finished first.

use super::retry::{with_retry, FetchFailure, RetryPolicy};
use crate::cache::{CacheStore, Checkpoint, FetchPhase};
use crate::config::RegistryConfig;
use crate::error::NodemapResult;
use crate::repo_url::SYNTHETIC_PREFIX;
use crate::registry::{
    NodeDefinition, PackageMetadata, RegistrySource, VersionMetadata,
};
use crate::ui::{BatchProgress, UiContext};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How much of the cache a run re-fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Only packages that are new, changed, or past the refresh window
    #[default]
    Incremental,
    /// Every package's version list
    Full,
}

/// Fetch settings for one run
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub mode: FetchMode,

    /// Re-fetch metadata that is already cached; `first_seen` is still kept
    pub refresh_metadata: bool,

    pub concurrency: usize,
    pub page_size: u32,
    pub max_pages: Option<u32>,
    pub rate_limit_delay: Duration,
    pub retry: RetryPolicy,
    pub checkpoint_interval: usize,

    /// Newest non-deprecated versions per package to fetch definitions for
    /// (0 = all)
    pub max_versions: usize,

    pub refresh_after: chrono::Duration,
}

impl FetchOptions {
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            mode: FetchMode::Incremental,
            refresh_metadata: false,
            concurrency: config.concurrency,
            page_size: config.page_size,
            max_pages: config.max_pages,
            rate_limit_delay: config.rate_limit_delay(),
            retry: RetryPolicy::from_config(config),
            checkpoint_interval: config.checkpoint_interval,
            max_versions: config.max_versions,
            refresh_after: chrono::Duration::hours(i64::from(config.refresh_after_hours)),
        }
    }
}

/// Outcome of one fetch phase
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub phase: FetchPhase,
    pub processed: usize,
    pub failed: Vec<FetchFailure>,

    /// Items skipped because a previous run's checkpoint already covered them
    pub skipped_resumed: usize,

    pub cancelled: bool,
}

impl BatchReport {
    fn new(phase: FetchPhase) -> Self {
        Self {
            phase,
            processed: 0,
            failed: Vec::new(),
            skipped_resumed: 0,
            cancelled: false,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.processed - self.failed.len()
    }
}

/// Outcome of a whole fetch run
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub listing: BatchReport,
    pub versions: BatchReport,
    pub definitions: BatchReport,
}

impl FetchReport {
    pub fn phases(&self) -> [&BatchReport; 3] {
        [&self.listing, &self.versions, &self.definitions]
    }

    pub fn failures(&self) -> impl Iterator<Item = &FetchFailure> {
        self.phases().into_iter().flat_map(|r| r.failed.iter())
    }

    pub fn failed_count(&self) -> usize {
        self.phases().iter().map(|r| r.failed.len()).sum()
    }

    pub fn cancelled(&self) -> bool {
        self.phases().iter().any(|r| r.cancelled)
    }
}

/// A unit of per-package work handed to the worker pool
#[derive(Debug, Clone)]
enum Job {
    Versions(PackageMetadata),
    Definitions { package_id: String, version: String },
}

impl Job {
    /// Position in the phase's job order; also the checkpoint cursor
    fn key(&self) -> String {
        match self {
            Self::Versions(metadata) => metadata.id.clone(),
            Self::Definitions {
                package_id,
                version,
            } => format!("{}@{}", package_id, version),
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Versions {
        metadata: PackageMetadata,
        versions: Vec<VersionMetadata>,
    },
    Definitions {
        package_id: String,
        version: String,
        nodes: Vec<NodeDefinition>,
    },
}

type JobQueue = Arc<Mutex<std::iter::Enumerate<std::vec::IntoIter<Job>>>>;

/// Drives the registry fetch into a [`CacheStore`]
pub struct FetchCoordinator {
    registry: Arc<dyn RegistrySource>,
    options: FetchOptions,
    stop: Arc<AtomicBool>,
    ui: UiContext,
}

impl FetchCoordinator {
    pub fn new(registry: Arc<dyn RegistrySource>, options: FetchOptions) -> Self {
        Self {
            registry,
            options,
            stop: Arc::new(AtomicBool::new(false)),
            ui: UiContext::non_interactive(),
        }
    }

    /// Share a stop flag; once set, workers take no new jobs
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_ui(mut self, ui: UiContext) -> Self {
        self.ui = ui;
        self
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Run every phase against `store`, persisting as it goes
    ///
    /// Individual item failures end up in the report. Only a failure to
    /// persist the cache is returned as an error.
    pub async fn run(
        &self,
        store: &mut CacheStore,
        now: DateTime<Utc>,
    ) -> NodemapResult<FetchReport> {
        info!(
            source = self.registry.source_name(),
            mode = ?self.options.mode,
            refresh_metadata = self.options.refresh_metadata,
            "Starting registry fetch"
        );

        // Later phases overwrite the stored cursor, so take it up front
        let resume = store.checkpoint().cloned();
        let resume_for = |phase: FetchPhase| resume.clone().filter(|cp| cp.phase == phase);

        let listing = self.fetch_listing(store, now).await?;

        let versions = if listing.cancelled {
            cancelled_report(FetchPhase::Versions)
        } else {
            let jobs = self.plan_versions(store, now);
            let resume = resume_for(FetchPhase::Versions);
            self.run_batch(FetchPhase::Versions, jobs, resume, store, now)
                .await?
        };

        let definitions = if versions.cancelled {
            cancelled_report(FetchPhase::Definitions)
        } else {
            let jobs = self.plan_definitions(store);
            let resume = resume_for(FetchPhase::Definitions);
            self.run_batch(FetchPhase::Definitions, jobs, resume, store, now)
                .await?
        };

        let report = FetchReport {
            listing,
            versions,
            definitions,
        };
        info!(
            packages = store.len(),
            failed = report.failed_count(),
            cancelled = report.cancelled(),
            "Registry fetch finished"
        );
        Ok(report)
    }

    /// Walk the package listing page by page
    async fn fetch_listing(
        &self,
        store: &mut CacheStore,
        now: DateTime<Utc>,
    ) -> NodemapResult<BatchReport> {
        let mut report = BatchReport::new(FetchPhase::Listing);
        let limit = self.options.page_size.max(1);
        let mut total_pages: Option<u32> = None;
        let mut page = 1u32;

        loop {
            if let Some(max) = self.options.max_pages {
                if page > max {
                    break;
                }
            }
            if let Some(total) = total_pages {
                if page > total {
                    break;
                }
            }
            if self.stopped() {
                report.cancelled = true;
                break;
            }

            let item = format!("page {}", page);
            let registry = self.registry.as_ref();
            let result = with_retry(&self.options.retry, &item, || {
                registry.list_packages(page, limit)
            })
            .await;
            report.processed += 1;

            match result {
                Ok(listing) => {
                    if total_pages.is_none() {
                        total_pages = Some(listing.total_pages.max(1));
                    }
                    debug!(page, packages = listing.nodes.len(), "Listing page fetched");
                    for metadata in listing.nodes {
                        if metadata.id.trim().is_empty() {
                            debug!("Skipping listed package without id");
                            continue;
                        }
                        if metadata.id.starts_with(SYNTHETIC_PREFIX) {
                            warn!(
                                package = metadata.id.as_str(),
                                "Skipping listed package in the community namespace"
                            );
                            continue;
                        }
                        store.record_summary(metadata, now);
                    }
                }
                Err(failure) => {
                    warn!("Skipping listing {}", failure);
                    report.failed.push(failure);
                    if total_pages.is_none() {
                        // Without the first page the page count is unknown
                        break;
                    }
                }
            }

            page += 1;
            tokio::time::sleep(self.options.rate_limit_delay).await;
        }

        if report.cancelled {
            store.set_checkpoint(Checkpoint {
                phase: FetchPhase::Listing,
                last_item: None,
                processed: report.processed,
                failed: report.failed.len(),
            });
        }
        store.persist(now).await?;
        info!(
            pages = report.processed,
            failed = report.failed.len(),
            packages = store.len(),
            "Listing complete"
        );
        Ok(report)
    }

    /// Packages whose version list should be fetched this run, in id order
    fn plan_versions(&self, store: &CacheStore, now: DateTime<Utc>) -> Vec<Job> {
        let force = self.options.mode == FetchMode::Full || self.options.refresh_metadata;
        store
            .packages()
            .values()
            .filter(|pkg| {
                force
                    || store.needs_version_refresh(
                        &pkg.metadata.id,
                        pkg.metadata.latest_version_str(),
                        now,
                        self.options.refresh_after,
                    )
            })
            .map(|pkg| Job::Versions(pkg.metadata.clone()))
            .collect()
    }

    /// Versions whose node definitions should be fetched this run
    fn plan_definitions(&self, store: &CacheStore) -> Vec<Job> {
        let mut jobs = Vec::new();
        for pkg in store.packages().values() {
            let mut current = pkg.current_versions();
            if self.options.max_versions > 0 {
                current.truncate(self.options.max_versions);
            }
            for version in current {
                let missing = pkg
                    .versions
                    .get(&version)
                    .is_some_and(|v| v.node_definitions.is_none());
                if missing || self.options.refresh_metadata {
                    jobs.push(Job::Definitions {
                        package_id: pkg.metadata.id.clone(),
                        version,
                    });
                }
            }
        }
        jobs
    }

    /// Whether the cache already holds what `job` would fetch
    fn settled(&self, store: &CacheStore, job: &Job, now: DateTime<Utc>) -> bool {
        match job {
            Job::Versions(metadata) => !store.needs_version_refresh(
                &metadata.id,
                metadata.latest_version_str(),
                now,
                self.options.refresh_after,
            ),
            Job::Definitions {
                package_id,
                version,
            } => store
                .get(package_id)
                .and_then(|pkg| pkg.versions.get(version))
                .is_some_and(|v| v.node_definitions.is_some()),
        }
    }

    /// Fan `jobs` out to the worker pool and apply results in order
    async fn run_batch(
        &self,
        phase: FetchPhase,
        mut jobs: Vec<Job>,
        resume: Option<Checkpoint>,
        store: &mut CacheStore,
        now: DateTime<Utc>,
    ) -> NodemapResult<BatchReport> {
        let mut report = BatchReport::new(phase);
        jobs.sort_by_key(Job::key);

        let mut checkpoint = match resume {
            Some(cp) => {
                if let Some(ref cursor) = cp.last_item {
                    // Only settled work behind the cursor is skipped; failed
                    // and newly due items run again
                    let before = jobs.len();
                    jobs.retain(|job| {
                        job.key().as_str() > cursor.as_str() || !self.settled(store, job, now)
                    });
                    report.skipped_resumed = before - jobs.len();
                    info!(
                        %phase,
                        cursor = cursor.as_str(),
                        skipped = report.skipped_resumed,
                        "Resuming from checkpoint"
                    );
                }
                cp
            }
            None => Checkpoint::start(phase),
        };

        let total = jobs.len();
        info!(%phase, items = total, "Fetch phase starting");
        if total == 0 {
            store.clear_checkpoint();
            store.persist(now).await?;
            return Ok(report);
        }

        let workers = self.options.concurrency.clamp(1, total);
        let queue: JobQueue = Arc::new(Mutex::new(jobs.into_iter().enumerate()));
        let (tx, mut rx) = mpsc::channel(workers * 2);

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let registry = Arc::clone(&self.registry);
            let stop = Arc::clone(&self.stop);
            let retry = self.options.retry;
            let delay = self.options.rate_limit_delay;

            handles.push(tokio::spawn(async move {
                loop {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let next = queue.lock().ok().and_then(|mut queue| queue.next());
                    let Some((index, job)) = next else {
                        break;
                    };

                    let key = job.key();
                    let result = execute(registry.as_ref(), job, &retry).await;
                    if tx.send((index, key, result)).await.is_err() {
                        break;
                    }
                    tokio::time::sleep(delay).await;
                }
                debug!(worker, "Worker finished");
            }));
        }
        drop(tx);

        let mut progress = BatchProgress::new(&self.ui, &phase.to_string(), total as u64);
        let mut pending: BTreeMap<usize, (String, Result<Outcome, FetchFailure>)> =
            BTreeMap::new();
        let mut next_index = 0usize;
        let mut since_checkpoint = 0usize;
        let interval = self.options.checkpoint_interval.max(1);

        while let Some((index, key, result)) = rx.recv().await {
            pending.insert(index, (key, result));

            while let Some((key, result)) = pending.remove(&next_index) {
                match result {
                    Ok(outcome) => apply(store, outcome, now),
                    Err(failure) => {
                        warn!("{}", failure);
                        checkpoint.failed += 1;
                        report.failed.push(failure);
                    }
                }
                report.processed += 1;
                checkpoint.processed += 1;
                progress.inc(&key);
                checkpoint.last_item = Some(key);
                next_index += 1;
                since_checkpoint += 1;

                if since_checkpoint >= interval && next_index < total {
                    store.set_checkpoint(checkpoint.clone());
                    store.persist(now).await?;
                    since_checkpoint = 0;
                }
            }
        }
        progress.finish();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Fetch worker panicked: {}", e);
            }
        }

        if next_index == total {
            store.clear_checkpoint();
        } else {
            // Results past a gap are dropped; they are fetched again on resume
            report.cancelled = true;
            store.set_checkpoint(checkpoint);
            warn!(
                %phase,
                applied = next_index,
                remaining = total - next_index,
                "Fetch phase interrupted"
            );
        }
        store.persist(now).await?;

        info!(
            %phase,
            processed = report.processed,
            failed = report.failed.len(),
            "Fetch phase complete"
        );
        Ok(report)
    }
}

fn cancelled_report(phase: FetchPhase) -> BatchReport {
    let mut report = BatchReport::new(phase);
    report.cancelled = true;
    report
}

/// Fetch one job with retries
async fn execute(
    registry: &dyn RegistrySource,
    job: Job,
    retry: &RetryPolicy,
) -> Result<Outcome, FetchFailure> {
    let key = job.key();
    match job {
        Job::Versions(metadata) => {
            let mut versions = with_retry(retry, &key, || {
                registry.package_versions(&metadata.id)
            })
            .await?;

            for version in versions.iter_mut().filter(|v| !v.has_download_url()) {
                fill_install_info(registry, &metadata.id, version, retry).await;
            }
            Ok(Outcome::Versions { metadata, versions })
        }
        Job::Definitions {
            package_id,
            version,
        } => {
            let nodes = with_retry(retry, &key, || {
                registry.node_definitions(&package_id, &version)
            })
            .await?;
            Ok(Outcome::Definitions {
                package_id,
                version,
                nodes,
            })
        }
    }
}

/// Best-effort lookup of install details for a version without a download url
async fn fill_install_info(
    registry: &dyn RegistrySource,
    package_id: &str,
    version: &mut VersionMetadata,
    retry: &RetryPolicy,
) {
    let item = format!("{}@{} install", package_id, version.version);
    let number = version.version.clone();
    match with_retry(retry, &item, || registry.install_info(package_id, &number)).await {
        Ok(info) => {
            if !version.has_download_url() {
                version.download_url = info.download_url;
            }
            if version.dependencies.is_empty() {
                version.dependencies = info.dependencies;
            }
            if version.install_type.is_none() {
                version.install_type = info.install_type;
            }
        }
        Err(failure) => debug!("Install info unavailable: {}", failure),
    }
}

fn apply(store: &mut CacheStore, outcome: Outcome, now: DateTime<Utc>) {
    match outcome {
        Outcome::Versions { metadata, versions } => {
            debug!(package = metadata.id.as_str(), versions = versions.len(), "Versions fetched");
            store.upsert(metadata, versions, now);
        }
        Outcome::Definitions {
            package_id,
            version,
            nodes,
        } => {
            store.record_node_definitions(&package_id, &version, nodes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fake::FakeRegistry;
    use crate::registry::{FetchError, InstallInfo, LatestVersion};
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn options() -> FetchOptions {
        FetchOptions {
            mode: FetchMode::Incremental,
            refresh_metadata: false,
            concurrency: 4,
            page_size: 2,
            max_pages: None,
            rate_limit_delay: Duration::ZERO,
            retry: RetryPolicy {
                max_retries: 3,
                base_delay: Duration::ZERO,
            },
            checkpoint_interval: 2,
            max_versions: 0,
            refresh_after: chrono::Duration::hours(24),
        }
    }

    fn package(id: &str, latest: &str) -> PackageMetadata {
        let mut meta = PackageMetadata::new(id);
        meta.latest_version = Some(LatestVersion {
            version: Some(latest.to_string()),
            ..Default::default()
        });
        meta
    }

    fn version(v: &str) -> VersionMetadata {
        let mut meta = VersionMetadata::new(v);
        meta.download_url = Some(format!("https://cdn.example/{}.zip", v));
        meta
    }

    fn node(name: &str) -> NodeDefinition {
        NodeDefinition::new(name, json!({"required": {"x": ["INT"]}}))
    }

    /// Three packages: `alpha` (two versions), `beta`, `gamma`
    fn registry() -> FakeRegistry {
        FakeRegistry::new()
            .with_package(package("alpha", "1.1.0"), vec![version("1.0.0"), version("1.1.0")])
            .with_package(package("beta", "0.2.0"), vec![version("0.2.0")])
            .with_package(package("gamma", "3.0.0"), vec![version("3.0.0")])
            .with_definitions("alpha", "1.1.0", vec![node("AlphaNode")])
            .with_definitions("alpha", "1.0.0", vec![node("AlphaNode")])
            .with_definitions("beta", "0.2.0", vec![node("BetaNode"), node("BetaOther")])
    }

    fn coordinator(fake: Arc<FakeRegistry>, options: FetchOptions) -> FetchCoordinator {
        FetchCoordinator::new(fake, options)
    }

    #[tokio::test]
    async fn full_run_populates_cache() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::new(temp.path().join("cache.json"));
        let fake = Arc::new(registry());

        let report = coordinator(fake.clone(), options())
            .run(&mut store, t0())
            .await
            .unwrap();

        assert_eq!(report.failed_count(), 0);
        assert!(!report.cancelled());
        assert_eq!(report.listing.processed, 2);
        assert_eq!(report.versions.processed, 3);
        assert_eq!(report.definitions.processed, 4);

        let alpha = store.get("alpha").unwrap();
        assert_eq!(alpha.versions.len(), 2);
        assert_eq!(alpha.last_checked, Some(t0()));
        assert_eq!(
            alpha.versions["1.1.0"].node_definitions.as_ref().unwrap()[0].comfy_node_name,
            "AlphaNode"
        );
        // Fetched with no nodes is distinct from not fetched
        assert_eq!(
            store.get("gamma").unwrap().versions["3.0.0"].node_definitions,
            Some(vec![])
        );
        assert!(store.checkpoint().is_none());

        let on_disk = CacheStore::load(store.path()).await.unwrap();
        assert_eq!(on_disk.document().package_count, 3);
        assert_eq!(on_disk.document().metadata_entries, 4);
    }

    #[tokio::test]
    async fn incremental_run_skips_fresh_packages() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::new(temp.path().join("cache.json"));
        let fake = Arc::new(registry());
        let coordinator = coordinator(fake.clone(), options());

        coordinator.run(&mut store, t0()).await.unwrap();
        let report = coordinator
            .run(&mut store, t0() + chrono::Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(report.versions.processed, 0);
        assert_eq!(report.definitions.processed, 0);
        assert_eq!(fake.calls("versions:"), 3);
        assert_eq!(fake.calls("definitions:"), 4);
    }

    #[tokio::test]
    async fn metadata_override_refetches_and_keeps_first_seen() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::new(temp.path().join("cache.json"));
        let fake = Arc::new(registry());

        coordinator(fake.clone(), options())
            .run(&mut store, t0())
            .await
            .unwrap();

        let later = t0() + chrono::Duration::hours(2);
        let mut opts = options();
        opts.refresh_metadata = true;
        coordinator(fake.clone(), opts)
            .run(&mut store, later)
            .await
            .unwrap();

        assert_eq!(fake.calls("versions:"), 6);
        assert_eq!(fake.calls("definitions:"), 8);
        let alpha = store.get("alpha").unwrap();
        assert_eq!(alpha.first_seen, t0());
        assert_eq!(alpha.versions["1.0.0"].first_seen, t0());
        assert_eq!(alpha.last_checked, Some(later));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::new(temp.path().join("cache.json"));
        let fake = Arc::new(
            registry()
                .failing("versions:beta", FetchError::Server(503), 2)
                .failing("page:1", FetchError::RateLimited, 1),
        );

        let report = coordinator(fake.clone(), options())
            .run(&mut store, t0())
            .await
            .unwrap();

        assert_eq!(report.failed_count(), 0);
        assert_eq!(fake.calls("versions:beta"), 3);
        assert!(store.get("beta").unwrap().last_checked.is_some());
    }

    #[tokio::test]
    async fn permanent_failure_does_not_stop_the_batch() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::new(temp.path().join("cache.json"));
        let fake = Arc::new(registry().failing("versions:beta", FetchError::Client(400), 1));

        let report = coordinator(fake.clone(), options())
            .run(&mut store, t0())
            .await
            .unwrap();

        assert_eq!(report.versions.failed.len(), 1);
        assert_eq!(report.versions.failed[0].item, "beta");
        assert_eq!(report.versions.failed[0].attempts, 1);
        assert_eq!(report.versions.succeeded(), 2);
        assert!(store.get("beta").unwrap().last_checked.is_none());
        assert!(store.get("gamma").unwrap().last_checked.is_some());

        // Next run picks the failed package up again
        let retry = coordinator(fake.clone(), options())
            .run(&mut store, t0())
            .await
            .unwrap();
        assert_eq!(retry.versions.processed, 1);
        assert!(store.get("beta").unwrap().last_checked.is_some());
    }

    #[tokio::test]
    async fn failed_listing_page_is_skipped() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::new(temp.path().join("cache.json"));
        let mut opts = options();
        opts.page_size = 1;
        let fake = Arc::new(registry().failing("page:2", FetchError::Client(400), 1));

        let report = coordinator(fake, opts).run(&mut store, t0()).await.unwrap();

        assert_eq!(report.listing.processed, 3);
        assert_eq!(report.listing.failed.len(), 1);
        assert!(store.get("alpha").is_some());
        assert!(store.get("beta").is_none());
        assert!(store.get("gamma").is_some());
    }

    #[tokio::test]
    async fn community_namespace_ids_are_not_cached() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::new(temp.path().join("cache.json"));
        let fake = Arc::new(
            registry().with_package(package("community:acme_tool", "1.0.0"), vec![version("1.0.0")]),
        );

        coordinator(fake.clone(), options())
            .run(&mut store, t0())
            .await
            .unwrap();

        assert!(store.get("community:acme_tool").is_none());
        assert_eq!(store.len(), 3);
        assert_eq!(fake.calls("versions:community:"), 0);
    }

    #[tokio::test]
    async fn max_pages_caps_listing() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::new(temp.path().join("cache.json"));
        let mut opts = options();
        opts.page_size = 1;
        opts.max_pages = Some(2);

        coordinator(Arc::new(registry()), opts)
            .run(&mut store, t0())
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn result_is_independent_of_concurrency() {
        let temp = TempDir::new().unwrap();
        let mut bytes = Vec::new();

        for concurrency in [1, 8] {
            let path = temp.path().join(format!("cache-{}.json", concurrency));
            let mut store = CacheStore::new(&path);
            let mut opts = options();
            opts.concurrency = concurrency;
            coordinator(Arc::new(registry()), opts)
                .run(&mut store, t0())
                .await
                .unwrap();
            bytes.push(tokio::fs::read(&path).await.unwrap());
        }

        assert_eq!(bytes[0], bytes[1]);
    }

    #[tokio::test]
    async fn install_info_fills_missing_download_url() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::new(temp.path().join("cache.json"));
        let fake = Arc::new(
            FakeRegistry::new()
                .with_package(package("solo", "1.0.0"), vec![VersionMetadata::new("1.0.0")])
                .with_install(
                    "solo",
                    "1.0.0",
                    InstallInfo {
                        download_url: Some("https://cdn.example/solo.zip".into()),
                        dependencies: vec!["numpy".into()],
                        install_type: None,
                    },
                ),
        );

        coordinator(fake.clone(), options())
            .run(&mut store, t0())
            .await
            .unwrap();

        let cached = &store.get("solo").unwrap().versions["1.0.0"].metadata;
        assert_eq!(cached.download_url.as_deref(), Some("https://cdn.example/solo.zip"));
        assert_eq!(cached.dependencies, vec!["numpy".to_string()]);
        assert_eq!(fake.calls("install:"), 1);
    }

    #[tokio::test]
    async fn max_versions_limits_definition_fetches() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::new(temp.path().join("cache.json"));
        let mut opts = options();
        opts.max_versions = 1;
        let fake = Arc::new(registry());

        coordinator(fake.clone(), opts)
            .run(&mut store, t0())
            .await
            .unwrap();

        assert_eq!(fake.calls("definitions:alpha@"), 1);
        let alpha = store.get("alpha").unwrap();
        assert!(alpha.versions["1.1.0"].node_definitions.is_some());
        assert!(alpha.versions["1.0.0"].node_definitions.is_none());
    }

    #[tokio::test]
    async fn stop_flag_checkpoints_and_resume_skips_done_items() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        let stop = Arc::new(AtomicBool::new(false));
        let mut opts = options();
        opts.concurrency = 1;
        opts.mode = FetchMode::Full;
        let fake = Arc::new(registry().stopping_on("versions:alpha", stop.clone()));

        let mut store = CacheStore::new(&path);
        let report = coordinator(fake.clone(), opts.clone())
            .with_stop_flag(stop)
            .run(&mut store, t0())
            .await
            .unwrap();

        assert!(report.versions.cancelled);
        assert!(report.definitions.cancelled);
        assert_eq!(report.versions.processed, 1);

        let mut reloaded = CacheStore::load(&path).await.unwrap();
        let checkpoint = reloaded.checkpoint().cloned().unwrap();
        assert_eq!(checkpoint.phase, FetchPhase::Versions);
        assert_eq!(checkpoint.last_item.as_deref(), Some("alpha"));

        let resumed = coordinator(fake.clone(), opts)
            .run(&mut reloaded, t0())
            .await
            .unwrap();
        assert_eq!(resumed.versions.skipped_resumed, 1);
        assert_eq!(resumed.versions.processed, 2);
        assert_eq!(fake.calls("versions:alpha"), 1);
        assert!(reloaded.checkpoint().is_none());
    }

    #[tokio::test]
    async fn resume_retries_failed_items_behind_the_cursor() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        let stop = Arc::new(AtomicBool::new(false));
        let mut opts = options();
        opts.concurrency = 1;
        let fake = Arc::new(
            registry()
                .failing("definitions:alpha@1.0.0", FetchError::Client(400), 1)
                .stopping_on("definitions:beta@0.2.0", stop.clone()),
        );

        let mut store = CacheStore::new(&path);
        let first = coordinator(fake.clone(), opts.clone())
            .with_stop_flag(stop)
            .run(&mut store, t0())
            .await
            .unwrap();
        assert!(first.definitions.cancelled);
        assert_eq!(first.definitions.failed.len(), 1);

        let mut reloaded = CacheStore::load(&path).await.unwrap();
        let checkpoint = reloaded.checkpoint().cloned().unwrap();
        assert_eq!(checkpoint.phase, FetchPhase::Definitions);
        assert_eq!(checkpoint.last_item.as_deref(), Some("beta@0.2.0"));
        assert_eq!(checkpoint.failed, 1);

        let resumed = coordinator(fake.clone(), opts)
            .run(&mut reloaded, t0())
            .await
            .unwrap();
        assert!(!resumed.cancelled());
        assert_eq!(resumed.definitions.skipped_resumed, 0);
        assert!(resumed.definitions.failed.is_empty());
        assert_eq!(fake.calls("definitions:alpha@1.0.0"), 2);
        assert_eq!(fake.calls("definitions:beta@0.2.0"), 1);
        assert!(reloaded.get("alpha").unwrap().versions["1.0.0"]
            .node_definitions
            .is_some());
        assert!(reloaded.checkpoint().is_none());
    }
}
