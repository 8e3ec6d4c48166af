//! siteflow.yaml model
//!
//! ```yaml
//! app: my-site
//! region: ap-northeast-1
//! source: dist
//! s3:
//!   bucketName: my-site-prod
//!   exclude: ["*.map"]
//! cloudfront:
//!   priceClass: PriceClass_200
//!   customDomain:
//!     domainName: example.com
//!     aliases: [www.example.com]
//! environments:
//!   staging:
//!     s3:
//!       bucketName: my-site-staging
//!     cloudfront:
//!       customDomain: null
//!   production: {}
//! ```
//!
//! Environment overrides are deep-merged over the top-level settings:
//! mappings merge key by key, everything else (lists included) is replaced.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Environment used when none is requested and the file does not force a choice
pub const DEFAULT_ENVIRONMENT: &str = "default";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_SOURCE: &str = "dist";
pub const DEFAULT_CONCURRENCY: usize = 10;
/// Twenty minutes, matching the CDN's usual propagation time
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 20 * 60;

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_source() -> PathBuf {
    PathBuf::from(DEFAULT_SOURCE)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SiteConfig {
    pub app: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Named credentials profile
    #[serde(default)]
    pub profile: Option<String>,

    /// Directory holding the built site, relative to the project directory
    #[serde(default = "default_source")]
    pub source: PathBuf,

    #[serde(default)]
    pub s3: S3Config,

    #[serde(default)]
    pub cloudfront: CloudFrontConfig,

    /// Raw per-environment overrides
    #[serde(default, skip_serializing)]
    pub environments: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct S3Config {
    /// Defaults to `<app>-<environment>`
    pub bucket_name: Option<String>,
    /// Served for the site root only. Behind the CDN a directory URL such as
    /// `/docs/` does not resolve to `docs/index.html`; link to the file itself.
    pub index_document: String,
    pub error_document: Option<String>,
    /// Glob patterns matched against object keys
    pub exclude: Vec<String>,
    pub concurrency: usize,
    pub gzip: bool,
    /// Cache-Control for non-HTML objects
    pub cache_control: Option<String>,
    /// Delete remote objects whose local file is gone
    pub cleanup: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket_name: None,
            index_document: "index.html".to_string(),
            error_document: None,
            exclude: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
            gzip: true,
            cache_control: None,
            cleanup: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CloudFrontConfig {
    /// `false` deploys to the bucket's website endpoint only
    pub enabled: bool,
    pub price_class: String,
    pub ipv6: bool,
    /// Serve `/index.html` for 403/404 so client-side routes resolve
    pub spa: bool,
    pub custom_domain: Option<CustomDomainConfig>,
    /// Paths fetched through the CDN after each invalidation
    pub cache_warming: Vec<String>,
    pub wait_timeout_secs: u64,
}

impl Default for CloudFrontConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            price_class: "PriceClass_100".to_string(),
            ipv6: true,
            spa: false,
            custom_domain: None,
            cache_warming: Vec::new(),
            wait_timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CustomDomainConfig {
    pub domain_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Existing certificate; skips certificate provisioning
    #[serde(default)]
    pub certificate_arn: Option<String>,
}

impl SiteConfig {
    /// Declared environment names, sorted
    pub fn environment_names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }

    /// Pick the environment to operate on.
    ///
    /// An explicit name wins. Otherwise `default` is used when no
    /// environments are declared or one is named `default`, and a single
    /// declared environment is used as is.
    pub fn resolve_environment(&self, requested: Option<&str>) -> Result<String> {
        if let Some(name) = requested.map(str::trim).filter(|n| !n.is_empty()) {
            return Ok(name.to_string());
        }
        if self.environments.is_empty() || self.environments.contains_key(DEFAULT_ENVIRONMENT) {
            return Ok(DEFAULT_ENVIRONMENT.to_string());
        }
        if self.environments.len() == 1
            && let Some(only) = self.environments.keys().next()
        {
            return Ok(only.clone());
        }
        Err(ConfigError::EnvironmentRequired {
            available: self.environment_names(),
        })
    }

    /// Settings with the overrides of `environment` applied
    pub fn for_environment(&self, environment: &str) -> Result<SiteConfig> {
        let overrides = match self.environments.get(environment) {
            Some(value) => value.clone(),
            None if self.environments.is_empty() => Value::Null,
            None => {
                return Err(ConfigError::UnknownEnvironment {
                    name: environment.to_string(),
                    available: self.environment_names(),
                });
            }
        };

        let mut merged = serde_yaml::to_value(self)?;
        match overrides {
            Value::Null => {}
            Value::Mapping(map) => {
                for key in ["app", "environments"] {
                    if map.contains_key(key) {
                        return Err(ConfigError::Invalid(format!(
                            "environment `{}` cannot override `{}`",
                            environment, key
                        )));
                    }
                }
                merge(&mut merged, Value::Mapping(map));
            }
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "environment `{}` must be a mapping",
                    environment
                )));
            }
        }

        Ok(serde_yaml::from_value(merged)?)
    }

    /// Bucket for `environment`, falling back to `<app>-<environment>`
    pub fn bucket_name(&self, environment: &str) -> String {
        self.s3
            .bucket_name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.app, environment).to_lowercase())
    }

    /// Whether a CDN distribution is part of the deployment
    pub fn cdn_enabled(&self) -> bool {
        self.cloudfront.enabled
    }
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                if let Some(existing) = base.get_mut(&key) {
                    merge(existing, value);
                } else {
                    base.insert(key, value);
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
