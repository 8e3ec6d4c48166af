//! Certificate provisioning
//!
//! Per-domain state machine:
//!
//! ```text
//! NoCertificate ──(issued certificate covers the domain)──────────────▶ Ready
//! NoCertificate ──▶ Requested ──▶ AwaitingValidation ──(issued)──────▶ Ready
//!                        └───────────────┴──(failed / timeout)───────▶ Failed
//! ```
//!
//! Certificates are requested in the CDN's certificate region with DNS
//! validation; the validation CNAMEs are published into the hosted zone that
//! serves the domain.

use crate::dns::{self, normalize_domain};
use crate::error::{CloudError, Result};
use crate::event::{self, DeployEvent, ProgressReporter};
use crate::provider::{
    CertificateAuthority, CertificateDetails, CertificateStatus, DnsRecord, DnsService,
    HostedZone, RecordTarget, RecordType, ValidationRecord,
};
use crate::retry::{PollConfig, PollStatus, RetryConfig, poll_until, with_retry};
use crate::tags::TagSet;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

pub const VALIDATION_METHOD: &str = "DNS";
const VALIDATION_RECORD_TTL: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificatePhase {
    NoCertificate,
    Requested,
    AwaitingValidation,
    Ready,
    Failed,
}

impl std::fmt::Display for CertificatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertificatePhase::NoCertificate => write!(f, "no certificate"),
            CertificatePhase::Requested => write!(f, "requested"),
            CertificatePhase::AwaitingValidation => write!(f, "awaiting validation"),
            CertificatePhase::Ready => write!(f, "ready"),
            CertificatePhase::Failed => write!(f, "failed"),
        }
    }
}

/// Timing for certificate provisioning
#[derive(Debug, Clone)]
pub struct CertificateConfig {
    /// Describe attempts while validation records are not yet published
    pub validation_record_attempts: u32,
    pub validation_record_delay: Duration,
    /// Issuance polling (default: 30 minutes)
    pub issuance: PollConfig,
    pub retry: RetryConfig,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            validation_record_attempts: 12,
            validation_record_delay: Duration::from_secs(5),
            issuance: PollConfig::backoff(
                Duration::from_secs(15),
                Duration::from_secs(60),
                Duration::from_secs(30 * 60),
            ),
            retry: RetryConfig::default(),
        }
    }
}

/// What to provision
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub domain: String,
    pub alternate_names: Vec<String>,
    pub app: String,
    pub environment: String,
}

/// A certificate that is ready to attach to the distribution
#[derive(Debug, Clone)]
pub struct ProvisionedCertificate {
    pub arn: String,
    pub domain: String,
    pub status: CertificateStatus,
    /// Requested by siteflow (and therefore removed with the environment)
    pub auto_created: bool,
    /// Zone the validation records were published into
    pub zone: Option<HostedZone>,
}

/// Whether a certificate name (possibly `*.` wildcard) covers `domain`.
///
/// A wildcard covers exactly one extra label.
pub fn name_matches(pattern: &str, domain: &str) -> bool {
    let pattern = normalize_domain(pattern);
    let domain = normalize_domain(domain);
    if pattern == domain {
        return true;
    }
    match pattern.strip_prefix("*.") {
        Some(suffix) => domain
            .split_once('.')
            .is_some_and(|(label, rest)| !label.is_empty() && rest == suffix),
        None => false,
    }
}

fn covers(names: &[&str], wanted: &str) -> bool {
    names.iter().any(|name| name_matches(name, wanted))
}

/// Issued certificate covering `domain` and every alternate name.
///
/// Certificates whose primary domain is an exact match are preferred.
pub async fn find_existing(
    acm: &dyn CertificateAuthority,
    domain: &str,
    alternate_names: &[String],
    retry: &RetryConfig,
) -> Result<Option<String>> {
    let certificates = with_retry(retry, "list certificates", || acm.list_certificates()).await?;
    let wanted = normalize_domain(domain);

    let mut candidates: Vec<_> = certificates
        .iter()
        .filter(|c| c.status == CertificateStatus::Issued)
        .filter(|c| {
            let mut names: Vec<&str> = vec![c.domain_name.as_str()];
            names.extend(c.alternate_names.iter().map(String::as_str));
            covers(&names, &wanted) && alternate_names.iter().all(|alt| covers(&names, alt))
        })
        .collect();
    candidates.sort_by_key(|c| normalize_domain(&c.domain_name) != wanted);

    Ok(candidates.first().map(|c| c.arn.clone()))
}

/// Pending certificate previously requested by siteflow for this environment
pub async fn find_pending(
    acm: &dyn CertificateAuthority,
    domain: &str,
    app: &str,
    environment: &str,
    retry: &RetryConfig,
) -> Result<Option<String>> {
    let certificates = with_retry(retry, "list certificates", || acm.list_certificates()).await?;
    let wanted = normalize_domain(domain);

    for cert in certificates
        .iter()
        .filter(|c| c.status == CertificateStatus::PendingValidation)
        .filter(|c| normalize_domain(&c.domain_name) == wanted)
    {
        let tags = match with_retry(retry, "get certificate tags", || {
            acm.certificate_tags(&cert.arn)
        })
        .await
        {
            Ok(tags) => tags,
            Err(e) => {
                debug!("Skipping certificate {}: {}", cert.arn, e);
                continue;
            }
        };
        if tags.belongs_to(app, environment) && tags.is_auto_created() {
            return Ok(Some(cert.arn.clone()));
        }
    }
    Ok(None)
}

/// Request a DNS-validated certificate tagged as auto-created
pub async fn request(
    acm: &dyn CertificateAuthority,
    domain: &str,
    alternate_names: &[String],
    tags: &TagSet,
    retry: &RetryConfig,
) -> Result<String> {
    let tags = tags.clone().with_domain(domain).auto_created();
    let arn = with_retry(retry, "request certificate", || {
        acm.request_certificate(domain, alternate_names, &tags)
    })
    .await?;
    info!("Requested certificate {} for {}", arn, domain);
    Ok(arn)
}

fn dedup_records(records: Vec<ValidationRecord>) -> Vec<ValidationRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

/// Publish the validation CNAMEs for `arn` into `zone_id`.
///
/// Validation data can be missing right after the request; describe is
/// retried a bounded number of times before giving up. Returns the number of
/// records written.
pub async fn publish_validation_records(
    acm: &dyn CertificateAuthority,
    dns: &dyn DnsService,
    arn: &str,
    zone_id: &str,
    config: &CertificateConfig,
) -> Result<usize> {
    let mut attempt = 0;
    let details = loop {
        let details = with_retry(&config.retry, "describe certificate", || {
            acm.describe_certificate(arn)
        })
        .await?;

        if details.status.is_terminal_failure() {
            return Err(failure(&details));
        }
        if details.status == CertificateStatus::Issued {
            debug!("Certificate {} already issued", arn);
            return Ok(0);
        }
        if !details.validation_records.is_empty() {
            break details;
        }

        attempt += 1;
        if attempt >= config.validation_record_attempts {
            return Err(CloudError::timeout(
                format!("validation records for {} were not published", arn),
                "Re-run the deployment in a few minutes",
            ));
        }
        debug!("Validation records for {} not available yet", arn);
        tokio::time::sleep(config.validation_record_delay).await;
    };

    let records: Vec<DnsRecord> = dedup_records(details.validation_records)
        .into_iter()
        .filter(|r| r.record_type.eq_ignore_ascii_case("CNAME"))
        .map(|r| DnsRecord {
            name: r.name,
            record_type: RecordType::Cname,
            target: RecordTarget::Value {
                value: r.value,
                ttl: VALIDATION_RECORD_TTL,
            },
        })
        .collect();

    with_retry(&config.retry, "upsert validation records", || {
        dns.upsert_records(zone_id, &records)
    })
    .await?;
    info!("Published {} validation records for {}", records.len(), arn);
    Ok(records.len())
}

fn failure(details: &CertificateDetails) -> CloudError {
    CloudError::CertificateFailed {
        domain: details.domain_name.clone(),
        reason: details
            .failure_reason
            .clone()
            .unwrap_or_else(|| details.status.to_string()),
    }
}

/// Poll until the certificate is issued
pub async fn await_issuance(
    acm: &dyn CertificateAuthority,
    arn: &str,
    config: &CertificateConfig,
) -> Result<CertificateDetails> {
    let issued = poll_until(&config.issuance, || async move {
        let details = with_retry(&config.retry, "describe certificate", || {
            acm.describe_certificate(arn)
        })
        .await?;
        match &details.status {
            CertificateStatus::Issued => Ok(PollStatus::Ready(details)),
            status if status.is_terminal_failure() => Err(failure(&details)),
            status => Ok(PollStatus::Pending(status.to_string())),
        }
    })
    .await?;

    issued.ok_or_else(|| {
        CloudError::timeout(
            format!(
                "certificate {} was not issued within {:?}",
                arn, config.issuance.timeout
            ),
            "Check that the validation CNAME records resolve publicly, then re-run the deployment",
        )
    })
}

/// Drive the certificate state machine to `Ready`.
///
/// Failures after the hosted zone is known are wrapped in
/// [`CloudError::CertificateNotReady`] with the zone's name servers.
pub async fn provision_certificate(
    acm: &dyn CertificateAuthority,
    dns_service: &dyn DnsService,
    cert: &CertificateRequest,
    config: &CertificateConfig,
    reporter: &dyn ProgressReporter,
) -> Result<ProvisionedCertificate> {
    let domain = normalize_domain(&cert.domain);
    let phase = |p: CertificatePhase| {
        reporter.report(DeployEvent::CertificatePhase {
            domain: domain.clone(),
            phase: p,
        })
    };
    phase(CertificatePhase::NoCertificate);

    if let Some(arn) = find_existing(
        acm,
        &domain,
        &cert.alternate_names,
        &config.retry,
    )
    .await?
    {
        info!("Reusing issued certificate {} for {}", arn, domain);
        phase(CertificatePhase::Ready);
        return Ok(ProvisionedCertificate {
            arn,
            domain,
            status: CertificateStatus::Issued,
            auto_created: false,
            zone: None,
        });
    }

    let zone = dns::resolve_hosted_zone(
        dns_service,
        &domain,
        &cert.app,
        &cert.environment,
        &config.retry,
        reporter,
    )
    .await?;

    let pending = find_pending(
        acm,
        &domain,
        &cert.app,
        &cert.environment,
        &config.retry,
    )
    .await?;
    let arn = match pending {
        Some(arn) => {
            info!("Resuming pending certificate {} for {}", arn, domain);
            arn
        }
        None => {
            let tags = TagSet::convention(&cert.app, &cert.environment);
            request(
                acm,
                &domain,
                &cert.alternate_names,
                &tags,
                &config.retry,
            )
            .await?
        }
    };
    phase(CertificatePhase::Requested);

    let validated = async {
        publish_validation_records(acm, dns_service, &arn, &zone.zone.id, config).await?;
        phase(CertificatePhase::AwaitingValidation);
        await_issuance(acm, &arn, config).await
    }
    .await;

    match validated {
        Ok(details) => {
            phase(CertificatePhase::Ready);
            Ok(ProvisionedCertificate {
                arn,
                domain,
                status: details.status,
                auto_created: true,
                zone: Some(zone.zone),
            })
        }
        Err(e) => {
            phase(CertificatePhase::Failed);
            let name_servers = if zone.name_servers.is_empty() {
                match dns_service.name_servers(&zone.zone.id).await {
                    Ok(servers) => servers,
                    Err(lookup) => {
                        event::warn(
                            reporter,
                            format!(
                                "Could not look up name servers of hosted zone {}: {}",
                                zone.zone.id, lookup
                            ),
                        );
                        Vec::new()
                    }
                }
            } else {
                zone.name_servers
            };
            Err(CloudError::CertificateNotReady {
                domain,
                name_servers,
                source: Box::new(e),
            })
        }
    }
}

/// Delete a certificate; an already-deleted one is success
pub async fn delete(acm: &dyn CertificateAuthority, arn: &str, retry: &RetryConfig) -> Result<()> {
    match with_retry(retry, "delete certificate", || acm.delete_certificate(arn)).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}
