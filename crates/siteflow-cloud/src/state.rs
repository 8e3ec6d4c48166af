//! Deployment state
//!
//! One JSON record per (application, environment) under
//! `.siteflow/state/<app>/<env>.json`. The record names every remote resource
//! siteflow created for that pair plus the digest of every uploaded file, so
//! the next deployment only uploads what changed.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".siteflow";
const STATE_SUBDIR: &str = "state";

/// State of a single application/environment deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentState {
    pub app: String,

    pub environment: String,

    /// State file version
    pub version: u32,

    /// Last time the record was persisted
    pub last_deployed: DateTime<Utc>,

    #[serde(default)]
    pub resources: Resources,

    /// Normalized relative path → hex SHA-256
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<StorageResource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudfront: Option<CdnResource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acm: Option<CertificateResource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route53: Option<DnsResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageResource {
    pub bucket_name: String,
    pub region: String,
    pub website_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnResource {
    pub distribution_id: String,
    pub domain_name: String,
    pub distribution_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_arn: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_invalidation: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateResource {
    pub certificate_arn: String,
    pub domain_name: String,
    pub validation_method: String,
    pub status: String,
    /// Requested by siteflow (and therefore deleted by `remove`)
    #[serde(default)]
    pub auto_created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsResource {
    pub hosted_zone_id: String,
    pub hosted_zone_name: String,
    #[serde(default)]
    pub records: Vec<String>,
}

fn guard_identifier(resource: &'static str, recorded: &str, requested: &str) -> Result<()> {
    if recorded != requested {
        return Err(CloudError::StateConflict {
            resource,
            recorded: recorded.to_string(),
            requested: requested.to_string(),
        });
    }
    Ok(())
}

impl DeploymentState {
    pub fn new(app: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            environment: environment.into(),
            version: STATE_VERSION,
            last_deployed: Utc::now(),
            resources: Resources::default(),
            files: BTreeMap::new(),
        }
    }

    /// No resource has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.resources.s3.is_none()
            && self.resources.cloudfront.is_none()
            && self.resources.acm.is_none()
            && self.resources.route53.is_none()
    }

    /// Record (or refresh) the bucket. Fails if a different bucket is recorded.
    pub fn record_storage(&mut self, storage: StorageResource) -> Result<()> {
        if let Some(existing) = &self.resources.s3 {
            guard_identifier("bucket", &existing.bucket_name, &storage.bucket_name)?;
        }
        self.resources.s3 = Some(storage);
        Ok(())
    }

    /// Record (or refresh) the distribution. Fails if a different id is recorded.
    /// The last invalidation timestamp survives refreshes.
    pub fn record_distribution(&mut self, mut cdn: CdnResource) -> Result<()> {
        if let Some(existing) = &self.resources.cloudfront {
            guard_identifier(
                "distribution",
                &existing.distribution_id,
                &cdn.distribution_id,
            )?;
            if cdn.last_invalidation.is_none() {
                cdn.last_invalidation = existing.last_invalidation;
            }
        }
        self.resources.cloudfront = Some(cdn);
        Ok(())
    }

    pub fn record_certificate(&mut self, certificate: CertificateResource) -> Result<()> {
        if let Some(existing) = &self.resources.acm {
            guard_identifier(
                "certificate",
                &existing.certificate_arn,
                &certificate.certificate_arn,
            )?;
        }
        self.resources.acm = Some(certificate);
        Ok(())
    }

    pub fn record_dns(&mut self, dns: DnsResource) -> Result<()> {
        if let Some(existing) = &self.resources.route53 {
            guard_identifier("hosted zone", &existing.hosted_zone_id, &dns.hosted_zone_id)?;
        }
        self.resources.route53 = Some(dns);
        Ok(())
    }

    /// Explicit re-provision: overwrite whatever certificate was recorded
    pub fn replace_certificate(&mut self, certificate: CertificateResource) {
        self.resources.acm = Some(certificate);
    }

    /// Replace the whole resource block (recovery)
    pub fn replace_resources(&mut self, resources: Resources) {
        self.resources = resources;
    }

    pub fn clear_storage(&mut self) {
        self.resources.s3 = None;
        self.files.clear();
    }

    pub fn clear_distribution(&mut self) {
        self.resources.cloudfront = None;
    }

    pub fn clear_certificate(&mut self) {
        self.resources.acm = None;
    }

    pub fn clear_dns(&mut self) {
        self.resources.route53 = None;
    }

    pub fn mark_invalidated(&mut self, at: DateTime<Utc>) {
        if let Some(cdn) = self.resources.cloudfront.as_mut() {
            cdn.last_invalidation = Some(at);
        }
    }

    pub fn bucket_name(&self) -> Option<&str> {
        self.resources.s3.as_ref().map(|s| s.bucket_name.as_str())
    }

    pub fn distribution_id(&self) -> Option<&str> {
        self.resources
            .cloudfront
            .as_ref()
            .map(|c| c.distribution_id.as_str())
    }
}

/// Identity of a persisted state record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EnvironmentRef {
    pub app: String,
    pub environment: String,
}

/// State store for reading/writing state files
pub struct StateStore {
    /// Project root directory
    project_root: PathBuf,
}

fn validate_segment(kind: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
    {
        return Err(CloudError::InvalidConfig(format!(
            "{} name `{}` cannot be used as a state file name",
            kind, value
        )));
    }
    Ok(())
}

fn corrupt(path: &Path, reason: impl Into<String>) -> CloudError {
    CloudError::CorruptState {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

impl StateStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    /// Directory holding every state record
    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR).join(STATE_SUBDIR)
    }

    /// Path of the record for the given pair
    pub fn state_path(&self, app: &str, environment: &str) -> PathBuf {
        self.state_dir()
            .join(app)
            .join(format!("{}.json", environment))
    }

    fn backup_path(path: &Path) -> PathBuf {
        path.with_extension("json.backup")
    }

    fn temp_path(path: &Path) -> PathBuf {
        path.with_extension("json.tmp")
    }

    /// Load the record for the pair. `Ok(None)` means no prior deployment.
    pub async fn load(&self, app: &str, environment: &str) -> Result<Option<DeploymentState>> {
        validate_segment("application", app)?;
        validate_segment("environment", environment)?;

        let path = self.state_path(app, environment);
        if !fs::try_exists(&path).await? {
            tracing::debug!("State file not found: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| corrupt(&path, e.to_string()))?;

        for field in ["app", "environment"] {
            match value.get(field).and_then(|v| v.as_str()) {
                Some(s) if !s.trim().is_empty() => {}
                _ => return Err(corrupt(&path, format!("missing required field `{}`", field))),
            }
        }

        let state: DeploymentState =
            serde_json::from_value(value).map_err(|e| corrupt(&path, e.to_string()))?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        if state.app != app || state.environment != environment {
            return Err(corrupt(
                &path,
                format!(
                    "record belongs to {}/{}, expected {}/{}",
                    state.app, state.environment, app, environment
                ),
            ));
        }

        if let Some(bad) = state
            .files
            .keys()
            .find(|k| k.is_empty() || k.starts_with('/') || k.contains('\\'))
        {
            return Err(corrupt(&path, format!("non-normalized file key `{}`", bad)));
        }

        tracing::debug!(
            "Loaded state {}/{} with {} files",
            app,
            environment,
            state.files.len()
        );
        Ok(Some(state))
    }

    /// Persist the record atomically.
    ///
    /// Stamps `lastDeployed` and `version`. The previous file (if any) is kept
    /// as `<env>.json.backup`.
    pub async fn save(&self, state: &mut DeploymentState) -> Result<()> {
        validate_segment("application", &state.app)?;
        validate_segment("environment", &state.environment)?;

        let path = self.state_path(&state.app, &state.environment);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        state.last_deployed = Utc::now();
        state.version = STATE_VERSION;

        let content = serde_json::to_string_pretty(state)?;
        let temp = Self::temp_path(&path);
        fs::write(&temp, content).await?;

        if fs::try_exists(&path).await? {
            fs::copy(&path, Self::backup_path(&path)).await?;
        }
        fs::rename(&temp, &path).await?;

        tracing::debug!(
            "Saved state {}/{} with {} files",
            state.app,
            state.environment,
            state.files.len()
        );
        Ok(())
    }

    /// Existing record or a fresh, unsaved one
    pub async fn get_or_create(&self, app: &str, environment: &str) -> Result<DeploymentState> {
        Ok(self
            .load(app, environment)
            .await?
            .unwrap_or_else(|| DeploymentState::new(app, environment)))
    }

    /// Remove the record. Returns whether one existed.
    pub async fn delete(&self, app: &str, environment: &str) -> Result<bool> {
        validate_segment("application", app)?;
        validate_segment("environment", environment)?;

        let path = self.state_path(app, environment);
        if !fs::try_exists(&path).await? {
            return Ok(false);
        }
        fs::remove_file(&path).await?;

        let backup = Self::backup_path(&path);
        if fs::try_exists(&backup).await? {
            fs::remove_file(&backup).await?;
        }

        // drop the per-app directory once it is empty
        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir(dir).await;
        }

        tracing::debug!("Deleted state {}/{}", app, environment);
        Ok(true)
    }

    /// Every persisted record, sorted by app then environment
    pub async fn list_environments(&self) -> Result<Vec<EnvironmentRef>> {
        let dir = self.state_dir();
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut apps = fs::read_dir(&dir).await?;
        while let Some(app_entry) = apps.next_entry().await? {
            if !app_entry.file_type().await?.is_dir() {
                continue;
            }
            let app = app_entry.file_name().to_string_lossy().to_string();

            let mut files = fs::read_dir(app_entry.path()).await?;
            while let Some(entry) = files.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    found.push(EnvironmentRef {
                        app: app.clone(),
                        environment: stem.to_string(),
                    });
                }
            }
        }

        found.sort();
        Ok(found)
    }
}
