//! Route 53 adapter

use crate::error::{Failure, Operation, build_error, classify, sdk};
use crate::field;
use async_trait::async_trait;
use aws_sdk_route53::Client;
use aws_sdk_route53::types::{
    AliasTarget, Change, ChangeAction, ChangeBatch, HostedZoneConfig, ResourceRecord,
    ResourceRecordSet, ResourceTagSet, RrType, Tag, TagResourceType,
};
use chrono::Utc;
use siteflow_cloud::provider::{DnsRecord, DnsService, HostedZone, RecordTarget, RecordType};
use siteflow_cloud::{Result, TagSet};
use tracing::debug;

const LIST_ZONES: Operation = Operation::new("list hosted zones", "route53:ListHostedZones");
const CREATE_ZONE: Operation = Operation::new("create hosted zone", "route53:CreateHostedZone");
const GET_ZONE: Operation = Operation::new("get hosted zone", "route53:GetHostedZone");
const TAG_ZONE: Operation = Operation::new("tag hosted zone", "route53:ChangeTagsForResource");
const LIST_TAGS: Operation = Operation::new("list hosted zone tags", "route53:ListTagsForResource");
const CHANGE_RECORDS: Operation =
    Operation::new("change record sets", "route53:ChangeResourceRecordSets");

/// Route 53 returns ids as `/hostedzone/Z123`
pub fn zone_id(raw: &str) -> &str {
    raw.trim_start_matches("/hostedzone/")
}

fn zone_from(zone: &aws_sdk_route53::types::HostedZone) -> HostedZone {
    HostedZone {
        id: zone_id(field::<&str>(zone.id()).unwrap_or_default()).to_string(),
        name: field::<&str>(zone.name())
            .unwrap_or_default()
            .trim_end_matches('.')
            .to_string(),
        private: zone
            .config()
            .and_then(|c| field::<bool>(c.private_zone()))
            .unwrap_or(false),
    }
}

fn rr_type(record_type: RecordType) -> RrType {
    match record_type {
        RecordType::A => RrType::A,
        RecordType::Aaaa => RrType::Aaaa,
        RecordType::Cname => RrType::Cname,
    }
}

fn change(action: ChangeAction, record: &DnsRecord) -> Result<Change> {
    let invalid = |e| build_error("record set", e);
    let builder = ResourceRecordSet::builder()
        .name(&record.name)
        .r#type(rr_type(record.record_type));
    let set = match &record.target {
        RecordTarget::Value { value, ttl } => builder
            .ttl(*ttl)
            .resource_records(ResourceRecord::builder().value(value).build().map_err(invalid)?)
            .build()
            .map_err(invalid)?,
        RecordTarget::Alias {
            dns_name,
            hosted_zone_id,
        } => builder
            .alias_target(
                AliasTarget::builder()
                    .hosted_zone_id(hosted_zone_id)
                    .dns_name(dns_name)
                    .evaluate_target_health(false)
                    .build()
                    .map_err(invalid)?,
            )
            .build()
            .map_err(invalid)?,
    };
    Change::builder()
        .action(action)
        .resource_record_set(set)
        .build()
        .map_err(invalid)
}

fn batch(action: ChangeAction, records: &[DnsRecord]) -> Result<ChangeBatch> {
    let changes = records
        .iter()
        .map(|r| change(action.clone(), r))
        .collect::<Result<Vec<_>>>()?;
    ChangeBatch::builder()
        .comment("siteflow")
        .set_changes(Some(changes))
        .build()
        .map_err(|e| build_error("change batch", e))
}

/// Route 53 rejects the whole batch when one DELETE targets a missing record
fn is_missing_record(failure: &Failure) -> bool {
    failure.code.as_deref() == Some("InvalidChangeBatch")
        && failure.message.contains("not found")
}

pub struct Route53Dns {
    client: Client,
}

impl Route53Dns {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    async fn change(&self, zone_id: &str, batch: ChangeBatch) -> std::result::Result<(), Failure> {
        self.client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(Failure::from_sdk)?;
        Ok(())
    }
}

#[async_trait]
impl DnsService for Route53Dns {
    async fn list_hosted_zones(&self) -> Result<Vec<HostedZone>> {
        let mut zones = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .client
                .list_hosted_zones()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(sdk(LIST_ZONES, ""))?;
            zones.extend(output.hosted_zones().iter().map(zone_from));
            if !field::<bool>(output.is_truncated()).unwrap_or(false) {
                break;
            }
            match output.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }
        Ok(zones)
    }

    async fn create_hosted_zone(&self, name: &str) -> Result<HostedZone> {
        let output = self
            .client
            .create_hosted_zone()
            .name(name)
            .caller_reference(format!("siteflow-{}-{}", name, Utc::now().timestamp_millis()))
            .hosted_zone_config(
                HostedZoneConfig::builder()
                    .comment("Created by siteflow")
                    .private_zone(false)
                    .build(),
            )
            .send()
            .await
            .map_err(sdk(CREATE_ZONE, name))?;
        let zone = field::<&aws_sdk_route53::types::HostedZone>(output.hosted_zone())
            .map(zone_from)
            .ok_or_else(|| crate::error::missing(CREATE_ZONE, "HostedZone"))?;
        debug!("Created hosted zone {} ({})", zone.name, zone.id);
        Ok(zone)
    }

    async fn name_servers(&self, zone_id: &str) -> Result<Vec<String>> {
        let output = self
            .client
            .get_hosted_zone()
            .id(zone_id)
            .send()
            .await
            .map_err(sdk(GET_ZONE, zone_id))?;
        Ok(output
            .delegation_set()
            .map(|d| d.name_servers().to_vec())
            .unwrap_or_default())
    }

    async fn tag_hosted_zone(&self, zone_id: &str, tags: &TagSet) -> Result<()> {
        let tags = tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<Vec<_>>();
        self.client
            .change_tags_for_resource()
            .resource_type(TagResourceType::Hostedzone)
            .resource_id(zone_id)
            .set_add_tags(Some(tags))
            .send()
            .await
            .map_err(sdk(TAG_ZONE, zone_id))?;
        Ok(())
    }

    async fn hosted_zone_tags(&self, zone_id: &str) -> Result<TagSet> {
        let output = self
            .client
            .list_tags_for_resource()
            .resource_type(TagResourceType::Hostedzone)
            .resource_id(zone_id)
            .send()
            .await
            .map_err(sdk(LIST_TAGS, zone_id))?;
        let mut tags = TagSet::new();
        if let Some(set) = field::<&ResourceTagSet>(output.resource_tag_set()) {
            for tag in set.tags() {
                if let (Some(key), Some(value)) = (tag.key(), tag.value()) {
                    tags.insert(key, value);
                }
            }
        }
        Ok(tags)
    }

    async fn upsert_records(&self, zone_id: &str, records: &[DnsRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.change(zone_id, batch(ChangeAction::Upsert, records)?)
            .await
            .map_err(|f| classify(CHANGE_RECORDS, zone_id, f))
    }

    async fn delete_records(&self, zone_id: &str, records: &[DnsRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        match self.change(zone_id, batch(ChangeAction::Delete, records)?).await {
            Ok(()) => Ok(()),
            Err(f) if is_missing_record(&f) => {
                // retry one by one so the records that do exist still go
                for record in records {
                    match self
                        .change(zone_id, batch(ChangeAction::Delete, std::slice::from_ref(record))?)
                        .await
                    {
                        Ok(()) => {}
                        Err(f) if is_missing_record(&f) => {
                            debug!("Record {} already absent", record.label());
                        }
                        Err(f) => return Err(classify(CHANGE_RECORDS, zone_id, f)),
                    }
                }
                Ok(())
            }
            Err(f) => Err(classify(CHANGE_RECORDS, zone_id, f)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_id_strips_prefix() {
        assert_eq!(zone_id("/hostedzone/Z123ABC"), "Z123ABC");
        assert_eq!(zone_id("Z123ABC"), "Z123ABC");
    }

    #[test]
    fn test_missing_record_detection() {
        let failure = Failure {
            code: Some("InvalidChangeBatch".into()),
            message: "Tried to delete resource record set [name='www.example.com.', type='A'] but it was not found".into(),
            status: Some(400),
            transport: false,
        };
        assert!(is_missing_record(&failure));

        let failure = Failure {
            code: Some("InvalidChangeBatch".into()),
            message: "RRSet of type CNAME with DNS name www.example.com. is not permitted".into(),
            status: Some(400),
            transport: false,
        };
        assert!(!is_missing_record(&failure));
    }

    #[test]
    fn test_alias_change_batch_builds() {
        let records = [DnsRecord {
            name: "example.com".into(),
            record_type: RecordType::Aaaa,
            target: RecordTarget::Alias {
                dns_name: "d1.cloudfront.net".into(),
                hosted_zone_id: "Z2FDTNDATAQYW2".into(),
            },
        }];
        let batch = batch(ChangeAction::Upsert, &records).unwrap();
        assert_eq!(batch.changes().len(), 1);
    }
}
