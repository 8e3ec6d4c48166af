//! Credential resolution
//!
//! Precedence:
//! 1. An explicit profile (command line or `profile` in the config file)
//! 2. `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
//! 3. The SDK's default provider chain (shared config, SSO, instance metadata, ...)

use crate::acm::CERTIFICATE_REGION;
use aws_config::environment::EnvironmentVariableCredentialsProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::debug;

pub const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";

/// Where the credentials of a session come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Profile(String),
    Environment,
    DefaultChain,
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::Profile(name) => write!(f, "profile `{}`", name),
            CredentialSource::Environment => write!(f, "environment variables"),
            CredentialSource::DefaultChain => write!(f, "default provider chain"),
        }
    }
}

fn resolve_with(profile: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> CredentialSource {
    if let Some(name) = profile.map(str::trim).filter(|p| !p.is_empty()) {
        return CredentialSource::Profile(name.to_string());
    }
    let present = |var: &str| lookup(var).is_some_and(|v| !v.is_empty());
    if present(ACCESS_KEY_VAR) && present(SECRET_KEY_VAR) {
        return CredentialSource::Environment;
    }
    CredentialSource::DefaultChain
}

/// Pick the credential source for an optional explicit profile
pub fn resolve_source(profile: Option<&str>) -> CredentialSource {
    resolve_with(profile, |var| std::env::var(var).ok())
}

/// SDK configuration for one deployment
#[derive(Debug, Clone)]
pub struct AwsSession {
    /// Targets the deployment region
    pub config: SdkConfig,
    /// Same credentials, pinned to the certificate region
    pub certificate_config: SdkConfig,
    pub source: CredentialSource,
}

pub async fn load_session(region: &str, profile: Option<&str>) -> AwsSession {
    let source = resolve_source(profile);
    debug!("Loading AWS credentials from {} for {}", source, region);

    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    match &source {
        CredentialSource::Profile(name) => loader = loader.profile_name(name),
        CredentialSource::Environment => {
            loader = loader.credentials_provider(EnvironmentVariableCredentialsProvider::new())
        }
        CredentialSource::DefaultChain => {}
    }
    let config = loader.load().await;
    let certificate_config = config
        .to_builder()
        .region(Region::new(CERTIFICATE_REGION))
        .build();

    AwsSession {
        config,
        certificate_config,
        source,
    }
}
