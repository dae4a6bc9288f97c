//! Update pipeline
//!
//! fetch → community refresh → build → augment → filter → write, with one
//! history line per run. Every stage takes the run timestamp captured by
//! the caller so that reruns over unchanged inputs reproduce their output.

use crate::cache::CacheStore;
use crate::community::{self, RefreshOutcome};
use crate::config::Config;
use crate::error::{NodemapError, NodemapResult};
use crate::fetch::{FetchCoordinator, FetchOptions, FetchReport};
use crate::fsutil::write_atomic;
use crate::history::{RunHistory, RunRecord};
use crate::mapping::{self, filter_document, MappingStats};
use crate::registry::RegistrySource;
use crate::ui::UiContext;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

/// Files an offline build reads and writes
#[derive(Debug, Clone)]
pub struct BuildInputs {
    pub cache: PathBuf,
    /// Community snapshot to merge; `None` skips augmentation
    pub community: Option<PathBuf>,
    pub output: PathBuf,
    pub schema: Option<PathBuf>,
}

impl BuildInputs {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache: config.paths.cache_path(),
            community: config
                .community
                .enabled
                .then(|| config.paths.community_path()),
            output: config.paths.mappings_path(),
            schema: config.paths.schema_file.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub output: PathBuf,
    pub stats: MappingStats,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub fetch: Option<FetchOptions>,
    pub community: bool,
    pub force_community: bool,
}

#[derive(Debug)]
pub struct UpdateOutcome {
    pub fetch: FetchReport,
    pub community: Option<RefreshOutcome>,
    /// `None` when the fetch was cancelled before mappings were built
    pub build: Option<BuildOutcome>,
}

pub struct Pipeline {
    config: Config,
    ui: UiContext,
    stop: Arc<AtomicBool>,
    history: RunHistory,
}

impl Pipeline {
    pub fn new(config: Config, ui: UiContext, stop: Arc<AtomicBool>) -> Self {
        let history = RunHistory::new(&config);
        Self {
            config,
            ui,
            stop,
            history,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch phases only
    pub async fn fetch(
        &self,
        registry: Arc<dyn RegistrySource>,
        options: FetchOptions,
        now: DateTime<Utc>,
    ) -> NodemapResult<FetchReport> {
        let mut run = RunRecord::start("fetch", now);
        let result = async {
            let mut store = CacheStore::load_or_cold_start(self.config.paths.cache_path()).await?;
            let report = self.run_fetch(registry, options, &mut store, now).await?;
            run.packages_cached = store.len();
            Ok::<_, NodemapError>(report)
        }
        .await;

        if let Ok(report) = &result {
            note_fetch(&mut run, report);
        }
        self.finish(run, &result).await;
        result
    }

    /// Refresh the stored community snapshot
    pub async fn refresh_community(
        &self,
        force: bool,
        now: DateTime<Utc>,
    ) -> NodemapResult<RefreshOutcome> {
        community::refresh_snapshot(
            &self.config.community,
            &self.config.paths.community_path(),
            self.config.registry.request_timeout(),
            force,
            now,
        )
        .await
    }

    /// Build the mapping document from files on disk
    pub async fn build(&self, inputs: &BuildInputs, now: DateTime<Utc>) -> NodemapResult<BuildOutcome> {
        let mut run = RunRecord::start("build", now);
        let result = async {
            let store = CacheStore::load(&inputs.cache).await?;
            run.packages_cached = store.len();
            self.build_from(&store, inputs, now).await
        }
        .await;

        if let Ok(outcome) = &result {
            note_build(&mut run, outcome);
        }
        self.finish(run, &result).await;
        result
    }

    /// Full run: fetch, refresh community data, build
    pub async fn update(
        &self,
        registry: Arc<dyn RegistrySource>,
        options: UpdateOptions,
        now: DateTime<Utc>,
    ) -> NodemapResult<UpdateOutcome> {
        let mut run = RunRecord::start("update", now);
        let result = self.update_inner(registry, options, now, &mut run).await;

        if let Ok(outcome) = &result {
            note_fetch(&mut run, &outcome.fetch);
            if let Some(build) = &outcome.build {
                note_build(&mut run, build);
            }
        }
        self.finish(run, &result).await;
        result
    }

    async fn update_inner(
        &self,
        registry: Arc<dyn RegistrySource>,
        options: UpdateOptions,
        now: DateTime<Utc>,
        run: &mut RunRecord,
    ) -> NodemapResult<UpdateOutcome> {
        let fetch_options = options
            .fetch
            .unwrap_or_else(|| FetchOptions::from_config(&self.config.registry));
        let mut store = CacheStore::load_or_cold_start(self.config.paths.cache_path()).await?;
        let fetch = self.run_fetch(registry, fetch_options, &mut store, now).await?;
        run.packages_cached = store.len();

        if fetch.cancelled() {
            warn!("Run interrupted; progress checkpointed, mappings not rebuilt");
            return Ok(UpdateOutcome {
                fetch,
                community: None,
                build: None,
            });
        }

        let mut inputs = BuildInputs::from_config(&self.config);
        inputs.community = None;
        let mut refreshed = None;
        if options.community {
            let path = self.config.paths.community_path();
            match self.refresh_community(options.force_community, now).await {
                Ok(outcome) => {
                    refreshed = Some(outcome);
                    inputs.community = Some(path);
                }
                Err(e) if e.is_recoverable() && path.exists() => {
                    warn!("{}; using the existing community snapshot", e);
                    inputs.community = Some(path);
                }
                Err(e) if e.is_recoverable() => {
                    warn!("{}; building without community data", e);
                }
                Err(e) => return Err(e),
            }
        }

        let build = self.build_from(&store, &inputs, now).await?;
        Ok(UpdateOutcome {
            fetch,
            community: refreshed,
            build: Some(build),
        })
    }

    async fn run_fetch(
        &self,
        registry: Arc<dyn RegistrySource>,
        options: FetchOptions,
        store: &mut CacheStore,
        now: DateTime<Utc>,
    ) -> NodemapResult<FetchReport> {
        FetchCoordinator::new(registry, options)
            .with_stop_flag(Arc::clone(&self.stop))
            .with_ui(self.ui)
            .run(store, now)
            .await
    }

    async fn build_from(
        &self,
        store: &CacheStore,
        inputs: &BuildInputs,
        now: DateTime<Utc>,
    ) -> NodemapResult<BuildOutcome> {
        let community = match &inputs.community {
            Some(path) => load_community(path).await,
            None => None,
        };

        let document = mapping::build_document(
            store.packages(),
            community.as_ref().map(|c| &c.extensions),
            now,
            &self.config.scoring,
        );

        let bytes = match inputs.schema.as_deref() {
            Some(schema) => {
                let mut value = serde_json::to_value(&document)?;
                filter_document(&mut value, Some(schema)).await;
                serde_json::to_vec_pretty(&value)?
            }
            None => serde_json::to_vec_pretty(&document)?,
        };
        write_atomic(&inputs.output, &bytes).await?;

        info!(
            output = %inputs.output.display(),
            signatures = document.stats.signatures,
            packages = document.stats.packages,
            "Mappings written"
        );
        Ok(BuildOutcome {
            output: inputs.output.clone(),
            stats: document.stats,
        })
    }

    async fn finish<T>(&self, mut run: RunRecord, result: &NodemapResult<T>) {
        run.finished_at = Utc::now().max(run.started_at);
        run.success = result.is_ok();
        run.error = result.as_ref().err().map(|e| e.to_string());
        self.history.record(&run).await;
    }
}

/// A community snapshot that cannot be read is skipped, not fatal
async fn load_community(path: &Path) -> Option<community::CommunitySnapshot> {
    match community::load_snapshot(path).await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!("{}; building without community data", e);
            None
        }
    }
}

fn note_fetch(run: &mut RunRecord, report: &FetchReport) {
    run.items_fetched = report.phases().iter().map(|p| p.succeeded()).sum();
    run.items_failed = report.failed_count();
    run.cancelled = report.cancelled();
}

fn note_build(run: &mut RunRecord, build: &BuildOutcome) {
    run.signatures = Some(build.stats.signatures);
    run.total_mappings = Some(build.stats.total_mappings);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchMode, RetryPolicy};
    use crate::mapping::{MappingDocument, Provenance};
    use crate::registry::fake::FakeRegistry;
    use crate::registry::{LatestVersion, NodeDefinition, PackageMetadata, VersionMetadata};
    use chrono::TimeZone;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::fs;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.paths.data_dir = Some(dir.path().to_path_buf());
        config
    }

    fn options() -> FetchOptions {
        FetchOptions {
            mode: FetchMode::Incremental,
            refresh_metadata: false,
            concurrency: 3,
            page_size: 10,
            max_pages: None,
            rate_limit_delay: Duration::ZERO,
            retry: RetryPolicy {
                max_retries: 1,
                base_delay: Duration::ZERO,
            },
            checkpoint_interval: 5,
            max_versions: 0,
            refresh_after: chrono::Duration::hours(24),
        }
    }

    fn registry() -> Arc<FakeRegistry> {
        let mut meta = PackageMetadata::new("math");
        meta.repository = Some("https://github.com/acme/math.git".into());
        meta.downloads = 400;
        meta.latest_version = Some(LatestVersion {
            version: Some("1.0.0".into()),
            ..Default::default()
        });
        let mut version = VersionMetadata::new("1.0.0");
        version.created_at = Some((now() - chrono::Duration::days(10)).to_rfc3339());

        Arc::new(
            FakeRegistry::new()
                .with_package(meta, vec![version])
                .with_definitions(
                    "math",
                    "1.0.0",
                    vec![NodeDefinition::new("Add", json!({"required": {"a": ["INT"], "b": ["INT"]}}))],
                ),
        )
    }

    async fn write_community(config: &Config) {
        let wrapped = json!({
            "fetched_at": now().to_rfc3339(),
            "source": "test",
            "extension_count": 2,
            "extensions": {
                "https://raw.githubusercontent.com/acme/math/main/nodes.py": [["Add", "Multiply"], {}],
                "https://github.com/solo/extra": [["Multiply"], {"title_aux": "Extra"}]
            }
        });
        fs::write(config.paths.community_path(), wrapped.to_string())
            .await
            .unwrap();
    }

    fn update_options() -> UpdateOptions {
        UpdateOptions {
            fetch: Some(options()),
            community: true,
            force_community: false,
        }
    }

    #[tokio::test]
    async fn update_fetches_builds_and_augments() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        write_community(&config).await;
        let pipeline = Pipeline::new(config.clone(), UiContext::non_interactive(), Arc::default());

        let outcome = pipeline.update(registry(), update_options(), now()).await.unwrap();
        assert_eq!(outcome.community, Some(RefreshOutcome::Reused { age_hours: 0 }));

        let doc = MappingDocument::load(&config.paths.mappings_path()).await.unwrap();
        let add_key = doc
            .mappings
            .keys()
            .find(|k| k.starts_with("Add::") && k.as_str() != "Add::_")
            .unwrap()
            .clone();
        assert_eq!(doc.mappings[&add_key][0].package_id, "math");
        assert_eq!(doc.mappings["Add::_"][0].package_id, "math");

        let multiply = &doc.mappings["Multiply::_"];
        assert_eq!(multiply.len(), 2);
        assert_eq!((multiply[0].package_id.as_str(), multiply[0].rank), ("math", 1));
        assert_eq!(
            (multiply[1].package_id.as_str(), multiply[1].rank),
            ("community:solo_extra", 2)
        );
        assert_eq!(multiply[1].provenance, Provenance::Community);

        let augmentation = doc.stats.augmentation.unwrap();
        assert_eq!(augmentation.synthetic_packages, 1);
        assert_eq!(augmentation.packages_augmented, 1);

        let history = fs::read_to_string(config.paths.history_path()).await.unwrap();
        assert_eq!(history.lines().count(), 1);
        assert!(history.contains("\"success\":true"));
    }

    #[tokio::test]
    async fn reruns_are_byte_identical() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        write_community(&config).await;
        let pipeline = Pipeline::new(config.clone(), UiContext::non_interactive(), Arc::default());

        pipeline.update(registry(), update_options(), now()).await.unwrap();
        let mappings_first = fs::read(config.paths.mappings_path()).await.unwrap();
        let cache_first = fs::read(config.paths.cache_path()).await.unwrap();

        pipeline.update(registry(), update_options(), now()).await.unwrap();
        assert_eq!(fs::read(config.paths.mappings_path()).await.unwrap(), mappings_first);
        assert_eq!(fs::read(config.paths.cache_path()).await.unwrap(), cache_first);
    }

    #[tokio::test]
    async fn missing_community_data_builds_registry_only() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.community.url = "not a url".into();
        let pipeline = Pipeline::new(config.clone(), UiContext::non_interactive(), Arc::default());

        let outcome = pipeline.update(registry(), update_options(), now()).await.unwrap();
        assert!(outcome.community.is_none());
        let stats = outcome.build.unwrap().stats;
        assert!(stats.augmentation.is_none());
        assert_eq!(stats.packages, 1);
    }

    #[tokio::test]
    async fn offline_build_applies_schema() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let pipeline = Pipeline::new(config.clone(), UiContext::non_interactive(), Arc::default());
        pipeline.fetch(registry(), options(), now()).await.unwrap();

        let schema = dir.path().join("schema.toml");
        fs::write(&schema, "[mappings]\nversions = false\n").await.unwrap();
        let inputs = BuildInputs {
            cache: config.paths.cache_path(),
            community: None,
            output: dir.path().join("out.json"),
            schema: Some(schema),
        };
        let outcome = pipeline.build(&inputs, now()).await.unwrap();
        assert_eq!(outcome.stats.signatures, 1);

        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(&inputs.output).await.unwrap()).unwrap();
        let entry = written["mappings"].as_object().unwrap().values().next().unwrap()[0].clone();
        assert!(entry.get("versions").is_none());
        assert_eq!(entry["rank"], 1);
    }

    #[tokio::test]
    async fn build_without_cache_fails_and_is_recorded() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let pipeline = Pipeline::new(config.clone(), UiContext::non_interactive(), Arc::default());

        let err = pipeline
            .build(&BuildInputs::from_config(&config), now())
            .await
            .unwrap_err();
        assert!(matches!(err, NodemapError::CacheNotFound(_)));

        let history = fs::read_to_string(config.paths.history_path()).await.unwrap();
        assert!(history.contains("\"success\":false"));
    }
}
