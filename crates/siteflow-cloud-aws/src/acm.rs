//! ACM adapter
//!
//! CloudFront only accepts certificates from `us-east-1`, so the client is
//! always pinned there whatever region the site is deployed to.

use crate::error::{Operation, build_error, missing, sdk};
use crate::field;
use async_trait::async_trait;
use aws_sdk_acm::Client;
use aws_sdk_acm::types::{
    CertificateDetail, CertificateStatus as AwsStatus, RecordType as AwsRecordType, Tag,
    ValidationMethod,
};
use sha2::{Digest, Sha256};
use siteflow_cloud::provider::{
    CertificateAuthority, CertificateDetails, CertificateStatus, CertificateSummary,
    ValidationRecord,
};
use siteflow_cloud::{Result, TagSet};
use tracing::debug;

pub const CERTIFICATE_REGION: &str = "us-east-1";

const LIST_CERTIFICATES: Operation = Operation::new("list certificates", "acm:ListCertificates");
const REQUEST_CERTIFICATE: Operation =
    Operation::new("request certificate", "acm:RequestCertificate");
const DESCRIBE_CERTIFICATE: Operation =
    Operation::new("describe certificate", "acm:DescribeCertificate");
const LIST_TAGS: Operation = Operation::new("list certificate tags", "acm:ListTagsForCertificate");
const DELETE_CERTIFICATE: Operation = Operation::new("delete certificate", "acm:DeleteCertificate");

/// Alphanumeric, at most 32 characters, stable for the same request
pub fn idempotency_token(domain: &str, alternate_names: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    for name in alternate_names {
        hasher.update(b"\n");
        hasher.update(name.as_bytes());
    }
    hex::encode(hasher.finalize())[..32].to_string()
}

fn status(status: Option<&AwsStatus>) -> CertificateStatus {
    status
        .map(|s| CertificateStatus::parse(s.as_str()))
        .unwrap_or_else(|| CertificateStatus::Other("UNKNOWN".to_string()))
}

fn details_from(detail: &CertificateDetail) -> CertificateDetails {
    let validation_records = detail
        .domain_validation_options()
        .iter()
        .filter_map(|option| option.resource_record())
        .filter_map(|record| {
            Some(ValidationRecord {
                name: field::<&str>(record.name())?.to_string(),
                record_type: field::<&AwsRecordType>(record.r#type())?.as_str().to_string(),
                value: field::<&str>(record.value())?.to_string(),
            })
        })
        .collect();

    CertificateDetails {
        arn: detail.certificate_arn().unwrap_or_default().to_string(),
        domain_name: detail.domain_name().unwrap_or_default().to_string(),
        alternate_names: detail.subject_alternative_names().to_vec(),
        status: status(detail.status()),
        validation_records,
        failure_reason: detail.failure_reason().map(|r| r.as_str().to_string()),
        in_use_by: detail.in_use_by().to_vec(),
    }
}

pub struct AcmAuthority {
    client: Client,
}

impl AcmAuthority {
    /// `config` must already target [`CERTIFICATE_REGION`]
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl CertificateAuthority for AcmAuthority {
    async fn list_certificates(&self) -> Result<Vec<CertificateSummary>> {
        let mut found = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_certificates()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(sdk(LIST_CERTIFICATES, ""))?;
            for summary in output.certificate_summary_list() {
                let Some(arn) = summary.certificate_arn() else {
                    continue;
                };
                let domain = summary.domain_name().unwrap_or_default().to_string();
                let mut alternate_names = summary.subject_alternative_name_summaries().to_vec();
                if alternate_names.is_empty() {
                    alternate_names.push(domain.clone());
                }
                found.push(CertificateSummary {
                    arn: arn.to_string(),
                    domain_name: domain,
                    alternate_names,
                    status: status(summary.status()),
                });
            }
            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(found)
    }

    async fn request_certificate(
        &self,
        domain: &str,
        alternate_names: &[String],
        tags: &TagSet,
    ) -> Result<String> {
        let tags = tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| build_error("certificate", e))?;
        let sans = (!alternate_names.is_empty()).then(|| alternate_names.to_vec());

        let output = self
            .client
            .request_certificate()
            .domain_name(domain)
            .validation_method(ValidationMethod::Dns)
            .set_subject_alternative_names(sans)
            .idempotency_token(idempotency_token(domain, alternate_names))
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(sdk(REQUEST_CERTIFICATE, domain))?;
        let arn = output
            .certificate_arn()
            .ok_or_else(|| missing(REQUEST_CERTIFICATE, "CertificateArn"))?;
        debug!("Requested certificate {} for {}", arn, domain);
        Ok(arn.to_string())
    }

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetails> {
        let output = self
            .client
            .describe_certificate()
            .certificate_arn(arn)
            .send()
            .await
            .map_err(sdk(DESCRIBE_CERTIFICATE, arn))?;
        let detail = output
            .certificate()
            .ok_or_else(|| missing(DESCRIBE_CERTIFICATE, "Certificate"))?;
        Ok(details_from(detail))
    }

    async fn certificate_tags(&self, arn: &str) -> Result<TagSet> {
        let output = self
            .client
            .list_tags_for_certificate()
            .certificate_arn(arn)
            .send()
            .await
            .map_err(sdk(LIST_TAGS, arn))?;
        let mut tags = TagSet::new();
        for tag in output.tags() {
            tags.insert(
                field::<&str>(tag.key()).unwrap_or_default(),
                tag.value().unwrap_or_default(),
            );
        }
        Ok(tags)
    }

    async fn delete_certificate(&self, arn: &str) -> Result<()> {
        self.client
            .delete_certificate()
            .certificate_arn(arn)
            .send()
            .await
            .map_err(sdk(DELETE_CERTIFICATE, arn))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_token_is_stable_and_short() {
        let sans = vec!["www.example.com".to_string()];
        let token = idempotency_token("example.com", &sans);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(token, idempotency_token("example.com", &sans));
        assert_ne!(token, idempotency_token("example.com", &[]));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status(Some(&AwsStatus::Issued)), CertificateStatus::Issued);
        assert_eq!(
            status(Some(&AwsStatus::PendingValidation)),
            CertificateStatus::PendingValidation
        );
        assert!(matches!(status(None), CertificateStatus::Other(_)));
    }
}
