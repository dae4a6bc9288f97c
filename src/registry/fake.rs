//! In-memory registry for tests

use super::types::{InstallInfo, NodeDefinition, PackageMetadata, PackagePage, VersionMetadata};
use super::{FetchError, RegistrySource};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Scriptable registry
///
/// Every request is logged under a key (`page:N`, `versions:ID`,
/// `install:ID@V`, `definitions:ID@V`). Queued errors for a key are returned
/// before the real answer.
#[derive(Default)]
pub struct FakeRegistry {
    packages: Vec<PackageMetadata>,
    versions: BTreeMap<String, Vec<VersionMetadata>>,
    installs: BTreeMap<String, InstallInfo>,
    definitions: BTreeMap<String, Vec<NodeDefinition>>,
    failures: Mutex<BTreeMap<String, VecDeque<FetchError>>>,
    calls: Mutex<Vec<String>>,
    stop_on: Option<(String, Arc<AtomicBool>)>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, metadata: PackageMetadata, versions: Vec<VersionMetadata>) -> Self {
        self.versions.insert(metadata.id.clone(), versions);
        self.packages.push(metadata);
        self
    }

    pub fn with_definitions(mut self, id: &str, version: &str, nodes: Vec<NodeDefinition>) -> Self {
        self.definitions.insert(format!("{}@{}", id, version), nodes);
        self
    }

    pub fn with_install(mut self, id: &str, version: &str, info: InstallInfo) -> Self {
        self.installs.insert(format!("{}@{}", id, version), info);
        self
    }

    /// Fail the next `times` requests for `key`
    pub fn failing(self, key: &str, error: FetchError, times: usize) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            let queue = failures.entry(key.to_string()).or_default();
            for _ in 0..times {
                queue.push_back(error.clone());
            }
        }
        self
    }

    /// Raise `flag` when a request for `key` arrives
    pub fn stopping_on(mut self, key: &str, flag: Arc<AtomicBool>) -> Self {
        self.stop_on = Some((key.to_string(), flag));
        self
    }

    /// Number of requests made for keys starting with `prefix`
    pub fn calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|c| c.starts_with(prefix)).count())
            .unwrap_or(0)
    }

    fn record(&self, key: String) -> Result<(), FetchError> {
        if let Some((ref trigger, ref flag)) = self.stop_on {
            if *trigger == key {
                flag.store(true, Ordering::SeqCst);
            }
        }
        let scripted = self
            .failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.get_mut(&key).and_then(VecDeque::pop_front));
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key);
        }
        match scripted {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RegistrySource for FakeRegistry {
    async fn list_packages(&self, page: u32, limit: u32) -> Result<PackagePage, FetchError> {
        self.record(format!("page:{}", page))?;
        let limit = limit.max(1) as usize;
        let total_pages = self.packages.len().div_ceil(limit).max(1) as u32;
        let nodes = self
            .packages
            .iter()
            .skip((page.saturating_sub(1)) as usize * limit)
            .take(limit)
            .cloned()
            .collect();
        Ok(PackagePage { nodes, total_pages })
    }

    async fn package_versions(&self, package_id: &str) -> Result<Vec<VersionMetadata>, FetchError> {
        self.record(format!("versions:{}", package_id))?;
        self.versions
            .get(package_id)
            .cloned()
            .ok_or(FetchError::NotFound)
    }

    async fn install_info(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<InstallInfo, FetchError> {
        let key = format!("{}@{}", package_id, version);
        self.record(format!("install:{}", key))?;
        self.installs.get(&key).cloned().ok_or(FetchError::NotFound)
    }

    async fn node_definitions(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<Vec<NodeDefinition>, FetchError> {
        let key = format!("{}@{}", package_id, version);
        self.record(format!("definitions:{}", key))?;
        Ok(self.definitions.get(&key).cloned().unwrap_or_default())
    }

    fn source_name(&self) -> &str {
        "fake"
    }
}
