//! Convention tags
//!
//! Every resource siteflow provisions carries these tags. Discovery relies on
//! them (never on naming conventions) to map remote resources back to an
//! application/environment pair.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TOOL_NAME: &str = "siteflow";

pub const TAG_MANAGED: &str = "siteflow:managed";
pub const TAG_APP: &str = "siteflow:app";
pub const TAG_ENVIRONMENT: &str = "siteflow:environment";
pub const TAG_TOOL: &str = "siteflow:tool";
pub const TAG_DOMAIN: &str = "siteflow:domain";
pub const TAG_AUTO_CREATED: &str = "siteflow:auto-created";

/// Ordered key/value tag set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base convention tags for an application/environment pair
    pub fn convention(app: &str, environment: &str) -> Self {
        let mut tags = Self::new();
        tags.insert(TAG_MANAGED, "true");
        tags.insert(TAG_APP, app);
        tags.insert(TAG_ENVIRONMENT, environment);
        tags.insert(TAG_TOOL, TOOL_NAME);
        tags
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.insert(TAG_DOMAIN, domain);
        self
    }

    pub fn auto_created(mut self) -> Self {
        self.insert(TAG_AUTO_CREATED, "true");
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Carries `siteflow:managed=true`
    pub fn is_managed(&self) -> bool {
        self.get(TAG_MANAGED) == Some("true")
    }

    pub fn is_auto_created(&self) -> bool {
        self.get(TAG_AUTO_CREATED) == Some("true")
    }

    pub fn app(&self) -> Option<&str> {
        self.get(TAG_APP)
    }

    pub fn environment(&self) -> Option<&str> {
        self.get(TAG_ENVIRONMENT)
    }

    pub fn domain(&self) -> Option<&str> {
        self.get(TAG_DOMAIN)
    }

    /// Managed by siteflow and owned by the given pair
    pub fn belongs_to(&self, app: &str, environment: &str) -> bool {
        self.is_managed() && self.app() == Some(app) && self.environment() == Some(environment)
    }
}

impl FromIterator<(String, String)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
