//! CloudFront adapter
//!
//! Translates the provider-neutral [`DistributionConfig`] into the SDK's
//! distribution config and back. Updates overlay the managed fields onto the
//! live config, so extra origins and behaviors, WAF, logging and TTLs set
//! outside siteflow survive, and are conditional on the ETag.

use crate::error::{Operation, build_error, missing, sdk};
use crate::field;
use async_trait::async_trait;
use aws_sdk_cloudfront::Client;
use aws_sdk_cloudfront::types::{
    Aliases, CustomErrorResponse, CustomErrorResponses, DefaultCacheBehavior,
    Distribution as AwsDistribution, DistributionConfig as AwsDistributionConfig,
    InvalidationBatch, MinimumProtocolVersion, OriginAccessControlConfig,
    OriginAccessControlOriginTypes, OriginAccessControlSigningBehaviors,
    OriginAccessControlSigningProtocols, Origin, Origins, Paths, PriceClass as AwsPriceClass,
    S3OriginConfig, SslSupportMethod, Tag, Tags, ViewerCertificate, ViewerProtocolPolicy,
};
use chrono::Utc;
use siteflow_cloud::provider::{
    CdnService, DistributionConfig, DistributionInfo, ErrorPage, VersionedConfig,
};
use siteflow_cloud::{PriceClass, Result, TagSet};
use tracing::debug;

const CREATE_DISTRIBUTION: Operation =
    Operation::new("create distribution", "cloudfront:CreateDistribution");
const GET_DISTRIBUTION: Operation = Operation::new("get distribution", "cloudfront:GetDistribution");
const GET_CONFIG: Operation =
    Operation::new("get distribution config", "cloudfront:GetDistributionConfig");
const UPDATE_DISTRIBUTION: Operation =
    Operation::new("update distribution", "cloudfront:UpdateDistribution");
const DELETE_DISTRIBUTION: Operation =
    Operation::new("delete distribution", "cloudfront:DeleteDistribution");
const LIST_DISTRIBUTIONS: Operation =
    Operation::new("list distributions", "cloudfront:ListDistributions");
const TAG_RESOURCE: Operation = Operation::new("tag distribution", "cloudfront:TagResource");
const LIST_TAGS: Operation =
    Operation::new("list distribution tags", "cloudfront:ListTagsForResource");
const CREATE_INVALIDATION: Operation =
    Operation::new("create invalidation", "cloudfront:CreateInvalidation");
const GET_INVALIDATION: Operation = Operation::new("get invalidation", "cloudfront:GetInvalidation");
const LIST_OAC: Operation = Operation::new(
    "list origin access controls",
    "cloudfront:ListOriginAccessControls",
);
const CREATE_OAC: Operation = Operation::new(
    "create origin access control",
    "cloudfront:CreateOriginAccessControl",
);

/// AWS managed `CachingOptimized` policy
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";
const MINIMUM_TLS: &str = "TLSv1.2_2021";
const INVALIDATION_COMPLETED: &str = "Completed";

pub struct CloudFrontCdn {
    client: Client,
}

impl CloudFrontCdn {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

// ============ Translation ============

fn to_aws(config: &DistributionConfig) -> Result<AwsDistributionConfig> {
    let invalid = |e| build_error("distribution", e);

    let origin = Origin::builder()
        .id(&config.origin_id)
        .domain_name(&config.origin_domain)
        .set_origin_access_control_id(config.origin_access_control_id.clone())
        // OAC requires an empty legacy identity
        .s3_origin_config(
            S3OriginConfig::builder()
                .origin_access_identity("")
                .build(),
        )
        .build()
        .map_err(invalid)?;
    let origins = Origins::builder()
        .quantity(1)
        .items(origin)
        .build()
        .map_err(invalid)?;

    let behavior = DefaultCacheBehavior::builder()
        .target_origin_id(&config.origin_id)
        .viewer_protocol_policy(ViewerProtocolPolicy::RedirectToHttps)
        .cache_policy_id(CACHING_OPTIMIZED_POLICY_ID)
        .compress(true)
        .build()
        .map_err(invalid)?;

    let aliases = Aliases::builder()
        .quantity(config.aliases.len() as i32)
        .set_items((!config.aliases.is_empty()).then(|| config.aliases.clone()))
        .build()
        .map_err(invalid)?;

    let certificate = match &config.certificate_arn {
        Some(arn) => ViewerCertificate::builder()
            .acm_certificate_arn(arn)
            .ssl_support_method(SslSupportMethod::SniOnly)
            .minimum_protocol_version(MinimumProtocolVersion::from(MINIMUM_TLS))
            .build(),
        None => ViewerCertificate::builder()
            .cloud_front_default_certificate(true)
            .build(),
    };

    let error_pages = config
        .error_pages
        .iter()
        .map(|page| {
            CustomErrorResponse::builder()
                .error_code(page.error_code)
                .response_code(page.response_code.to_string())
                .response_page_path(&page.response_page_path)
                .error_caching_min_ttl(page.min_ttl)
                .build()
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(invalid)?;
    let error_responses = CustomErrorResponses::builder()
        .quantity(error_pages.len() as i32)
        .set_items((!error_pages.is_empty()).then_some(error_pages))
        .build()
        .map_err(invalid)?;

    AwsDistributionConfig::builder()
        .caller_reference(&config.caller_reference)
        .comment(&config.comment)
        .enabled(config.enabled)
        .origins(origins)
        .default_cache_behavior(behavior)
        .default_root_object(&config.default_root_object)
        .price_class(AwsPriceClass::from(config.price_class.as_str()))
        .is_ipv6_enabled(config.ipv6)
        .aliases(aliases)
        .viewer_certificate(certificate)
        .custom_error_responses(error_responses)
        .build()
        .map_err(invalid)
}

/// The origin the default cache behavior targets, else the first one
fn managed_origin(config: &AwsDistributionConfig) -> Option<&Origin> {
    let items = field::<&Origins>(config.origins())?.items();
    let target = field::<&DefaultCacheBehavior>(config.default_cache_behavior())
        .and_then(|b| field::<&str>(b.target_origin_id()));
    items
        .iter()
        .find(|o| field::<&str>(o.id()) == target)
        .or_else(|| items.first())
}

/// Apply the managed settings of `desired` to the live config `base`
fn overlay(
    base: &AwsDistributionConfig,
    desired: &DistributionConfig,
) -> Result<AwsDistributionConfig> {
    let managed = to_aws(desired)?;
    let origin = managed_origin(&managed)
        .cloned()
        .ok_or_else(|| missing(UPDATE_DISTRIBUTION, "Origin"))?;
    let previous = managed_origin(base).and_then(|o| field::<&str>(o.id()));

    let mut origins: Vec<Origin> = field::<&Origins>(base.origins())
        .map(|o| o.items().to_vec())
        .unwrap_or_default();
    match origins
        .iter_mut()
        .find(|o| previous.is_some() && field::<&str>(o.id()) == previous)
    {
        Some(current) => {
            current.id = origin.id.clone();
            current.domain_name = origin.domain_name.clone();
            current.origin_access_control_id = origin.origin_access_control_id.clone();
            current.s3_origin_config = origin.s3_origin_config.clone();
            current.custom_origin_config = None;
        }
        None => origins.insert(0, origin.clone()),
    }

    let mut config = base.clone();
    config.origins = Origins::builder()
        .quantity(origins.len() as i32)
        .set_items(Some(origins))
        .build()
        .map_err(|e| build_error("distribution", e))?
        .into();
    if let Some(behavior) = field::<&DefaultCacheBehavior>(base.default_cache_behavior()) {
        let mut behavior = behavior.clone();
        behavior.target_origin_id = origin.id.clone();
        config.default_cache_behavior = behavior.into();
    } else {
        config.default_cache_behavior = managed.default_cache_behavior.clone();
    }
    config.enabled = managed.enabled;
    config.default_root_object = managed.default_root_object.clone();
    config.price_class = managed.price_class.clone();
    config.is_ipv6_enabled = managed.is_ipv6_enabled;
    config.aliases = managed.aliases.clone();
    config.viewer_certificate = managed.viewer_certificate.clone();
    config.custom_error_responses = managed.custom_error_responses.clone();
    Ok(config)
}

fn from_aws(config: &AwsDistributionConfig) -> DistributionConfig {
    let origin = managed_origin(config);
    let error_pages = field::<&CustomErrorResponses>(config.custom_error_responses())
        .map(|responses| {
            responses
                .items()
                .iter()
                .filter_map(|r| {
                    Some(ErrorPage {
                        error_code: field::<i32>(r.error_code())?,
                        response_code: r.response_code()?.parse().ok()?,
                        response_page_path: r.response_page_path()?.to_string(),
                        min_ttl: field::<i64>(r.error_caching_min_ttl()).unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    DistributionConfig {
        caller_reference: field::<&str>(config.caller_reference()).unwrap_or_default().to_string(),
        comment: field::<&str>(config.comment()).unwrap_or_default().to_string(),
        enabled: field::<bool>(config.enabled()).unwrap_or(false),
        origin_id: origin
            .and_then(|o| field::<&str>(o.id()))
            .unwrap_or_default()
            .to_string(),
        origin_domain: origin
            .and_then(|o| field::<&str>(o.domain_name()))
            .unwrap_or_default()
            .to_string(),
        origin_access_control_id: origin
            .and_then(|o| o.origin_access_control_id())
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        default_root_object: config.default_root_object().unwrap_or_default().to_string(),
        price_class: config
            .price_class()
            .and_then(|p| p.as_str().parse::<PriceClass>().ok())
            .unwrap_or(PriceClass::All),
        ipv6: field::<bool>(config.is_ipv6_enabled()).unwrap_or(false),
        aliases: field::<&Aliases>(config.aliases())
            .map(|a| a.items().to_vec())
            .unwrap_or_default(),
        certificate_arn: config
            .viewer_certificate()
            .and_then(|v| v.acm_certificate_arn())
            .map(str::to_string),
        error_pages,
    }
}

fn info_from(distribution: &AwsDistribution) -> DistributionInfo {
    let config = distribution.distribution_config();
    DistributionInfo {
        id: field::<&str>(distribution.id()).unwrap_or_default().to_string(),
        arn: field::<&str>(distribution.arn()).unwrap_or_default().to_string(),
        domain_name: field::<&str>(distribution.domain_name())
            .unwrap_or_default()
            .to_string(),
        status: field::<&str>(distribution.status()).unwrap_or_default().to_string(),
        enabled: config.and_then(|c| field::<bool>(c.enabled())).unwrap_or(false),
        aliases: config
            .and_then(|c| field::<&Aliases>(c.aliases()))
            .map(|a| a.items().to_vec())
            .unwrap_or_default(),
    }
}

fn aws_tags(tags: &TagSet) -> Result<Tags> {
    let items = tags
        .iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| build_error("tagging", e))?;
    Ok(Tags::builder().set_items(Some(items)).build())
}

// ============ Port ============

#[async_trait]
impl CdnService for CloudFrontCdn {
    async fn create_distribution(&self, config: &DistributionConfig) -> Result<DistributionInfo> {
        let output = self
            .client
            .create_distribution()
            .distribution_config(to_aws(config)?)
            .send()
            .await
            .map_err(sdk(CREATE_DISTRIBUTION, &config.origin_domain))?;
        let distribution = output
            .distribution()
            .ok_or_else(|| missing(CREATE_DISTRIBUTION, "Distribution"))?;
        Ok(info_from(distribution))
    }

    async fn get_distribution(&self, id: &str) -> Result<DistributionInfo> {
        let output = self
            .client
            .get_distribution()
            .id(id)
            .send()
            .await
            .map_err(sdk(GET_DISTRIBUTION, id))?;
        let distribution = output
            .distribution()
            .ok_or_else(|| missing(GET_DISTRIBUTION, "Distribution"))?;
        Ok(info_from(distribution))
    }

    async fn get_distribution_config(&self, id: &str) -> Result<VersionedConfig> {
        let output = self
            .client
            .get_distribution_config()
            .id(id)
            .send()
            .await
            .map_err(sdk(GET_CONFIG, id))?;
        let config = output
            .distribution_config()
            .ok_or_else(|| missing(GET_CONFIG, "DistributionConfig"))?;
        let etag = output.e_tag().ok_or_else(|| missing(GET_CONFIG, "ETag"))?;
        Ok(VersionedConfig {
            config: from_aws(config),
            etag: etag.to_string(),
        })
    }

    async fn update_distribution(
        &self,
        id: &str,
        config: &DistributionConfig,
        etag: &str,
    ) -> Result<DistributionInfo> {
        // a base newer than `etag` fails the If-Match check like any stale write
        let live = self
            .client
            .get_distribution_config()
            .id(id)
            .send()
            .await
            .map_err(sdk(GET_CONFIG, id))?;
        let base = live
            .distribution_config()
            .ok_or_else(|| missing(GET_CONFIG, "DistributionConfig"))?;

        let output = self
            .client
            .update_distribution()
            .id(id)
            .if_match(etag)
            .distribution_config(overlay(base, config)?)
            .send()
            .await
            .map_err(sdk(UPDATE_DISTRIBUTION, id))?;
        let distribution = output
            .distribution()
            .ok_or_else(|| missing(UPDATE_DISTRIBUTION, "Distribution"))?;
        Ok(info_from(distribution))
    }

    async fn delete_distribution(&self, id: &str, etag: &str) -> Result<()> {
        self.client
            .delete_distribution()
            .id(id)
            .if_match(etag)
            .send()
            .await
            .map_err(sdk(DELETE_DISTRIBUTION, id))?;
        Ok(())
    }

    async fn list_distributions(&self) -> Result<Vec<DistributionInfo>> {
        let mut found = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .client
                .list_distributions()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(sdk(LIST_DISTRIBUTIONS, ""))?;
            let Some(list) = output.distribution_list() else {
                break;
            };
            for summary in list.items() {
                found.push(DistributionInfo {
                    id: field::<&str>(summary.id()).unwrap_or_default().to_string(),
                    arn: field::<&str>(summary.arn()).unwrap_or_default().to_string(),
                    domain_name: field::<&str>(summary.domain_name())
                        .unwrap_or_default()
                        .to_string(),
                    status: field::<&str>(summary.status()).unwrap_or_default().to_string(),
                    enabled: field::<bool>(summary.enabled()).unwrap_or(false),
                    aliases: field::<&Aliases>(summary.aliases())
                        .map(|a| a.items().to_vec())
                        .unwrap_or_default(),
                });
            }
            if !field::<bool>(list.is_truncated()).unwrap_or(false) {
                break;
            }
            match list.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }
        Ok(found)
    }

    async fn tag_resource(&self, arn: &str, tags: &TagSet) -> Result<()> {
        self.client
            .tag_resource()
            .resource(arn)
            .tags(aws_tags(tags)?)
            .send()
            .await
            .map_err(sdk(TAG_RESOURCE, arn))?;
        Ok(())
    }

    async fn resource_tags(&self, arn: &str) -> Result<TagSet> {
        let output = self
            .client
            .list_tags_for_resource()
            .resource(arn)
            .send()
            .await
            .map_err(sdk(LIST_TAGS, arn))?;
        let mut tags = TagSet::new();
        if let Some(set) = field::<&Tags>(output.tags()) {
            for tag in set.items() {
                tags.insert(
                    field::<&str>(tag.key()).unwrap_or_default(),
                    tag.value().unwrap_or_default(),
                );
            }
        }
        Ok(tags)
    }

    async fn create_invalidation(&self, id: &str, paths: &[String]) -> Result<String> {
        let invalid = |e| build_error("invalidation", e);
        let batch = InvalidationBatch::builder()
            .paths(
                Paths::builder()
                    .quantity(paths.len() as i32)
                    .set_items(Some(paths.to_vec()))
                    .build()
                    .map_err(invalid)?,
            )
            .caller_reference(format!("siteflow-{}", Utc::now().timestamp_millis()))
            .build()
            .map_err(invalid)?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(sdk(CREATE_INVALIDATION, id))?;
        let invalidation = output
            .invalidation()
            .ok_or_else(|| missing(CREATE_INVALIDATION, "Invalidation"))?;
        let invalidation_id = field::<&str>(invalidation.id()).unwrap_or_default().to_string();
        debug!("Created invalidation {} on {}", invalidation_id, id);
        Ok(invalidation_id)
    }

    async fn invalidation_completed(&self, id: &str, invalidation_id: &str) -> Result<bool> {
        let output = self
            .client
            .get_invalidation()
            .distribution_id(id)
            .id(invalidation_id)
            .send()
            .await
            .map_err(sdk(GET_INVALIDATION, invalidation_id))?;
        Ok(output
            .invalidation()
            .and_then(|i| field::<&str>(i.status()))
            .is_some_and(|status| status == INVALIDATION_COMPLETED))
    }

    async fn find_origin_access_control(&self, name: &str) -> Result<Option<String>> {
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .client
                .list_origin_access_controls()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(sdk(LIST_OAC, name))?;
            let Some(list) = output.origin_access_control_list() else {
                return Ok(None);
            };
            if let Some(found) = list
                .items()
                .iter()
                .find(|oac| field::<&str>(oac.name()) == Some(name))
            {
                return Ok(field::<&str>(found.id()).map(str::to_string));
            }
            if !field::<bool>(list.is_truncated()).unwrap_or(false) {
                return Ok(None);
            }
            match list.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => return Ok(None),
            }
        }
    }

    async fn create_origin_access_control(&self, name: &str) -> Result<String> {
        let config = OriginAccessControlConfig::builder()
            .name(name)
            .description("siteflow bucket access")
            .signing_protocol(OriginAccessControlSigningProtocols::Sigv4)
            .signing_behavior(OriginAccessControlSigningBehaviors::Always)
            .origin_access_control_origin_type(OriginAccessControlOriginTypes::S3)
            .build()
            .map_err(|e| build_error("origin access control", e))?;

        let output = self
            .client
            .create_origin_access_control()
            .origin_access_control_config(config)
            .send()
            .await
            .map_err(sdk(CREATE_OAC, name))?;
        output
            .origin_access_control()
            .and_then(|oac| field::<&str>(oac.id()))
            .map(str::to_string)
            .ok_or_else(|| missing(CREATE_OAC, "OriginAccessControl"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cloudfront::types::HttpVersion;

    fn config() -> DistributionConfig {
        DistributionConfig {
            caller_reference: "siteflow-web-prod-1".into(),
            comment: "siteflow web/prod".into(),
            enabled: true,
            origin_id: "s3-web-prod-site".into(),
            origin_domain: "web-prod-site.s3.ap-northeast-1.amazonaws.com".into(),
            origin_access_control_id: Some("OAC1".into()),
            default_root_object: "index.html".into(),
            price_class: PriceClass::P200,
            ipv6: true,
            aliases: vec!["example.com".into(), "www.example.com".into()],
            certificate_arn: Some("arn:aws:acm:us-east-1:123456789012:certificate/abc".into()),
            error_pages: vec![ErrorPage {
                error_code: 404,
                response_code: 200,
                response_page_path: "/index.html".into(),
                min_ttl: 0,
            }],
        }
    }

    #[test]
    fn test_translation_keeps_managed_fields() {
        let original = config();
        let aws = to_aws(&original).unwrap();
        assert_eq!(from_aws(&aws), original);
    }

    #[test]
    fn test_update_keeps_unmanaged_settings() {
        const WEB_ACL: &str = "arn:aws:wafv2:us-east-1:123456789012:global/webacl/site/abc";
        let mut live = to_aws(&config()).unwrap();
        live.web_acl_id = Some(WEB_ACL.into());
        live.http_version = Some(HttpVersion::from("http2and3"));
        let managed = managed_origin(&live).unwrap().clone();
        let logs = Origin::builder()
            .id("logs")
            .domain_name("logs.example.com")
            .build()
            .unwrap();
        live.origins = Origins::builder()
            .quantity(2)
            .items(managed)
            .items(logs)
            .build()
            .unwrap()
            .into();

        let mut desired = config();
        desired.price_class = PriceClass::P100;
        desired.aliases = vec!["example.com".into()];
        desired.origin_id = "s3-web-prod-next".into();
        desired.origin_domain = "web-prod-next.s3.ap-northeast-1.amazonaws.com".into();
        let updated = overlay(&live, &desired).unwrap();

        assert_eq!(updated.web_acl_id(), Some(WEB_ACL));
        assert_eq!(updated.http_version().map(|v| v.as_str()), Some("http2and3"));
        let ids: Vec<&str> = field::<&Origins>(updated.origins())
            .unwrap()
            .items()
            .iter()
            .filter_map(|o| field::<&str>(o.id()))
            .collect();
        assert_eq!(ids, vec!["s3-web-prod-next", "logs"]);
        assert_eq!(from_aws(&updated), desired);
    }

    #[test]
    fn test_default_certificate_without_aliases() {
        let mut plain = config();
        plain.aliases.clear();
        plain.certificate_arn = None;
        plain.error_pages.clear();

        let aws = to_aws(&plain).unwrap();
        let back = from_aws(&aws);
        assert!(back.aliases.is_empty());
        assert!(back.certificate_arn.is_none());
        assert!(back.error_pages.is_empty());
    }
}
