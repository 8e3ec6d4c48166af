//! Hosted zone resolution and alias records

use crate::error::{CloudError, Result};
use crate::event::{self, DeployEvent, ProgressReporter};
use crate::provider::{DnsRecord, DnsService, HostedZone, RecordTarget, RecordType};
use crate::retry::{RetryConfig, with_retry};
use crate::tags::TagSet;
use tracing::{debug, info};

/// Hosted zone id every CloudFront alias target lives in
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// Lowercase, without the trailing dot
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Two-label registrable domain such as `example.com`.
///
/// Multi-label public suffixes (`example.co.uk`) are treated as subdomains.
pub fn is_apex(domain: &str) -> bool {
    normalize_domain(domain).split('.').count() == 2
}

/// Domain with its first label removed
pub fn parent_domain(domain: &str) -> Option<String> {
    let domain = normalize_domain(domain);
    domain
        .split_once('.')
        .map(|(_, parent)| parent.to_string())
        .filter(|parent| parent.contains('.'))
}

/// Resolved hosted zone for a domain
#[derive(Debug, Clone)]
pub struct ZoneResolution {
    pub zone: HostedZone,
    pub created: bool,
    /// Populated when the zone was created by this call
    pub name_servers: Vec<String>,
}

/// Public zone whose name is the longest suffix of `domain`
pub fn best_zone(zones: &[HostedZone], domain: &str) -> Option<HostedZone> {
    let domain = normalize_domain(domain);
    zones
        .iter()
        .filter(|z| !z.private)
        .filter(|z| {
            let name = normalize_domain(&z.name);
            domain == name || domain.ends_with(&format!(".{}", name))
        })
        .max_by_key(|z| z.name.len())
        .cloned()
}

/// Find the hosted zone serving `domain`.
///
/// Apex domains without a zone get a freshly created, tagged public zone whose
/// name servers are reported so the user can delegate the domain. Subdomains
/// never trigger creation.
pub async fn resolve_hosted_zone(
    dns: &dyn DnsService,
    domain: &str,
    app: &str,
    environment: &str,
    retry: &RetryConfig,
    reporter: &dyn ProgressReporter,
) -> Result<ZoneResolution> {
    let domain = normalize_domain(domain);
    let zones = with_retry(retry, "list hosted zones", || dns.list_hosted_zones()).await?;

    if let Some(zone) = best_zone(&zones, &domain) {
        debug!("Using hosted zone {} ({}) for {}", zone.name, zone.id, domain);
        return Ok(ZoneResolution {
            zone,
            created: false,
            name_servers: Vec::new(),
        });
    }

    if !is_apex(&domain) {
        let parent = parent_domain(&domain).unwrap_or_else(|| domain.clone());
        return Err(CloudError::HostedZoneNotFound { domain, parent });
    }

    info!("Creating hosted zone for {}", domain);
    let zone = with_retry(retry, "create hosted zone", || dns.create_hosted_zone(&domain)).await?;

    let tags = TagSet::convention(app, environment)
        .with_domain(&domain)
        .auto_created();
    if let Err(e) = with_retry(retry, "tag hosted zone", || {
        dns.tag_hosted_zone(&zone.id, &tags)
    })
    .await
    {
        event::warn(
            reporter,
            format!("Failed to tag hosted zone {}: {}", zone.id, e),
        );
    }

    let name_servers = with_retry(retry, "get name servers", || dns.name_servers(&zone.id)).await?;
    reporter.report(DeployEvent::HostedZoneCreated {
        zone: domain.clone(),
        name_servers: name_servers.clone(),
    });

    Ok(ZoneResolution {
        zone,
        created: true,
        name_servers,
    })
}

/// A and AAAA alias records for the primary domain and every alias
pub fn alias_records(domain: &str, aliases: &[String], cdn_domain: &str) -> Vec<DnsRecord> {
    let mut names = vec![normalize_domain(domain)];
    for alias in aliases {
        let alias = normalize_domain(alias);
        if !names.contains(&alias) {
            names.push(alias);
        }
    }

    let target = RecordTarget::Alias {
        dns_name: normalize_domain(cdn_domain),
        hosted_zone_id: CLOUDFRONT_HOSTED_ZONE_ID.to_string(),
    };

    names
        .into_iter()
        .flat_map(|name| {
            [RecordType::A, RecordType::Aaaa].map(|record_type| DnsRecord {
                name: name.clone(),
                record_type,
                target: target.clone(),
            })
        })
        .collect()
}

/// UPSERT the alias records and return their labels
pub async fn publish_alias_records(
    dns: &dyn DnsService,
    zone_id: &str,
    domain: &str,
    aliases: &[String],
    cdn_domain: &str,
    retry: &RetryConfig,
) -> Result<Vec<String>> {
    let records = alias_records(domain, aliases, cdn_domain);
    with_retry(retry, "upsert alias records", || {
        dns.upsert_records(zone_id, &records)
    })
    .await?;
    info!("Published {} alias records in {}", records.len(), zone_id);
    Ok(records.iter().map(DnsRecord::label).collect())
}

/// Remove previously published alias records
pub async fn delete_alias_records(
    dns: &dyn DnsService,
    zone_id: &str,
    domain: &str,
    aliases: &[String],
    cdn_domain: &str,
    retry: &RetryConfig,
) -> Result<()> {
    let records = alias_records(domain, aliases, cdn_domain);
    match with_retry(retry, "delete alias records", || {
        dns.delete_records(zone_id, &records)
    })
    .await
    {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SilentReporter;
    use crate::testing::{FakeCloud, RecordingReporter};

    fn zone(id: &str, name: &str, private: bool) -> HostedZone {
        HostedZone {
            id: id.into(),
            name: name.into(),
            private,
        }
    }

    #[test]
    fn test_apex_detection() {
        assert!(is_apex("example.com"));
        assert!(is_apex("Example.COM."));
        assert!(!is_apex("www.example.com"));
        assert!(!is_apex("localhost"));
        assert_eq!(parent_domain("www.example.com").as_deref(), Some("example.com"));
        assert_eq!(parent_domain("example.com"), None);
    }

    #[test]
    fn test_best_zone_prefers_longest_public_suffix() {
        let zones = vec![
            zone("Z1", "example.com", false),
            zone("Z2", "dev.example.com", false),
            zone("Z3", "app.dev.example.com", true),
            zone("Z4", "ample.com", false),
        ];
        assert_eq!(best_zone(&zones, "app.dev.example.com").unwrap().id, "Z2");
        assert_eq!(best_zone(&zones, "example.com").unwrap().id, "Z1");
        assert_eq!(best_zone(&zones, "www.example.com").unwrap().id, "Z1");
        assert!(best_zone(&zones, "other.org").is_none());
    }

    #[test]
    fn test_alias_records_cover_every_name() {
        let records = alias_records(
            "example.com",
            &["www.example.com".into(), "example.com".into()],
            "d111.cloudfront.net",
        );
        let labels: Vec<String> = records.iter().map(DnsRecord::label).collect();
        assert_eq!(
            labels,
            vec![
                "example.com A",
                "example.com AAAA",
                "www.example.com A",
                "www.example.com AAAA",
            ]
        );
        assert!(records.iter().all(|r| r.target
            == RecordTarget::Alias {
                dns_name: "d111.cloudfront.net".into(),
                hosted_zone_id: CLOUDFRONT_HOSTED_ZONE_ID.into(),
            }));
    }

    #[tokio::test]
    async fn test_resolve_existing_zone() {
        let cloud = FakeCloud::new();
        let id = cloud.add_zone("example.com");

        let resolved = resolve_hosted_zone(
            &cloud,
            "www.example.com",
            "web",
            "prod",
            &RetryConfig::immediate(1),
            &SilentReporter,
        )
        .await
        .unwrap();

        assert_eq!(resolved.zone.id, id);
        assert!(!resolved.created);
        assert!(cloud.calls().iter().all(|c| !c.starts_with("create_hosted_zone")));
    }

    #[tokio::test]
    async fn test_apex_zone_is_created_and_tagged() {
        let cloud = FakeCloud::new();
        let reporter = RecordingReporter::new();

        let resolved = resolve_hosted_zone(
            &cloud,
            "example.com",
            "web",
            "prod",
            &RetryConfig::immediate(1),
            &reporter,
        )
        .await
        .unwrap();

        assert!(resolved.created);
        assert_eq!(resolved.name_servers.len(), 2);
        let stored = cloud.zone(&resolved.zone.id).unwrap();
        assert!(stored.tags.belongs_to("web", "prod"));
        assert!(stored.tags.is_auto_created());
        assert!(reporter.events().iter().any(|e| matches!(
            e,
            DeployEvent::HostedZoneCreated { zone, .. } if zone == "example.com"
        )));
    }

    #[tokio::test]
    async fn test_subdomain_without_zone_is_fatal() {
        let cloud = FakeCloud::new();

        let err = resolve_hosted_zone(
            &cloud,
            "www.example.com",
            "web",
            "prod",
            &RetryConfig::immediate(1),
            &SilentReporter,
        )
        .await
        .unwrap_err();

        match err {
            CloudError::HostedZoneNotFound { domain, parent } => {
                assert_eq!(domain, "www.example.com");
                assert_eq!(parent, "example.com");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(cloud.state().zones.is_empty());
    }

    #[tokio::test]
    async fn test_publish_alias_records_is_idempotent() {
        let cloud = FakeCloud::new();
        let id = cloud.add_zone("example.com");
        let retry = RetryConfig::immediate(1);

        for _ in 0..2 {
            let labels = publish_alias_records(
                &cloud,
                &id,
                "example.com",
                &["www.example.com".into()],
                "d1.cloudfront.net",
                &retry,
            )
            .await
            .unwrap();
            assert_eq!(labels.len(), 4);
        }
        assert_eq!(cloud.zone(&id).unwrap().records.len(), 4);

        delete_alias_records(
            &cloud,
            &id,
            "example.com",
            &["www.example.com".into()],
            "d1.cloudfront.net",
            &retry,
        )
        .await
        .unwrap();
        assert!(cloud.zone(&id).unwrap().records.is_empty());
    }
}
