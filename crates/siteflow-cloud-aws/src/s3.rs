//! S3 object storage adapter

use crate::error::{Operation, build_error, sdk};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ErrorDocument, IndexDocument,
    ObjectIdentifier, PublicAccessBlockConfiguration, Tag, Tagging, WebsiteConfiguration,
};
use siteflow_cloud::provider::{ObjectStore, ObjectUpload};
use siteflow_cloud::{CloudError, Result, TagSet};
use tracing::debug;

const HEAD_BUCKET: Operation = Operation::new("head bucket", "s3:ListBucket");
const CREATE_BUCKET: Operation = Operation::new("create bucket", "s3:CreateBucket");
const PUT_PUBLIC_ACCESS_BLOCK: Operation =
    Operation::new("put public access block", "s3:PutBucketPublicAccessBlock");
const PUT_WEBSITE: Operation = Operation::new("put bucket website", "s3:PutBucketWebsite");
const PUT_POLICY: Operation = Operation::new("put bucket policy", "s3:PutBucketPolicy");
const PUT_TAGS: Operation = Operation::new("put bucket tagging", "s3:PutBucketTagging");
const GET_TAGS: Operation = Operation::new("get bucket tagging", "s3:GetBucketTagging");
const GET_LOCATION: Operation = Operation::new("get bucket location", "s3:GetBucketLocation");
const LIST_BUCKETS: Operation = Operation::new("list buckets", "s3:ListAllMyBuckets");
const PUT_OBJECT: Operation = Operation::new("put object", "s3:PutObject");
const LIST_OBJECTS: Operation = Operation::new("list objects", "s3:ListBucket");
const DELETE_OBJECTS: Operation = Operation::new("delete objects", "s3:DeleteObject");
const DELETE_BUCKET: Operation = Operation::new("delete bucket", "s3:DeleteBucket");

/// Region S3 reports as an empty location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// Normalize a `GetBucketLocation` constraint to a region name
pub fn region_from_location(constraint: Option<&str>) -> String {
    match constraint {
        None | Some("") => DEFAULT_REGION.to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(sdk(HEAD_BUCKET, bucket))?;
        Ok(())
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint
        if region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(sdk(CREATE_BUCKET, bucket))?;
        debug!("Created bucket {} in {}", bucket, region);
        Ok(())
    }

    async fn put_public_access_block(&self, bucket: &str) -> Result<()> {
        let block = PublicAccessBlockConfiguration::builder()
            .block_public_acls(true)
            .ignore_public_acls(true)
            .block_public_policy(true)
            .restrict_public_buckets(true)
            .build();
        self.client
            .put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(block)
            .send()
            .await
            .map_err(sdk(PUT_PUBLIC_ACCESS_BLOCK, bucket))?;
        Ok(())
    }

    async fn put_website(
        &self,
        bucket: &str,
        index_document: &str,
        error_document: Option<&str>,
    ) -> Result<()> {
        let index = IndexDocument::builder()
            .suffix(index_document)
            .build()
            .map_err(|e| build_error("website", e))?;
        let error = error_document
            .map(|key| ErrorDocument::builder().key(key).build())
            .transpose()
            .map_err(|e| build_error("website", e))?;
        let website = WebsiteConfiguration::builder()
            .index_document(index)
            .set_error_document(error)
            .build();

        self.client
            .put_bucket_website()
            .bucket(bucket)
            .website_configuration(website)
            .send()
            .await
            .map_err(sdk(PUT_WEBSITE, bucket))?;
        Ok(())
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<()> {
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map_err(sdk(PUT_POLICY, bucket))?;
        Ok(())
    }

    async fn put_bucket_tags(&self, bucket: &str, tags: &TagSet) -> Result<()> {
        let tag_set = tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| build_error("tagging", e))?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| build_error("tagging", e))?;

        self.client
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(tagging)
            .send()
            .await
            .map_err(sdk(PUT_TAGS, bucket))?;
        Ok(())
    }

    async fn bucket_tags(&self, bucket: &str) -> Result<TagSet> {
        let output = match self.client.get_bucket_tagging().bucket(bucket).send().await {
            Ok(output) => output,
            Err(e) if e.code() == Some("NoSuchTagSet") => return Ok(TagSet::new()),
            Err(e) => return Err(sdk(GET_TAGS, bucket)(e)),
        };

        let mut tags = TagSet::new();
        for tag in output.tag_set() {
            tags.insert(tag.key(), tag.value());
        }
        Ok(tags)
    }

    async fn bucket_region(&self, bucket: &str) -> Result<String> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(sdk(GET_LOCATION, bucket))?;
        Ok(region_from_location(
            output.location_constraint().map(|c| c.as_str()),
        ))
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(sdk(LIST_BUCKETS, ""))?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn put_object(&self, bucket: &str, object: &ObjectUpload) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(&object.key)
            .body(ByteStream::from(object.body.clone()))
            .content_type(&object.content_type)
            .set_content_encoding(object.content_encoding.clone())
            .set_cache_control(object.cache_control.clone())
            .send()
            .await
            .map_err(sdk(PUT_OBJECT, &object.key))?;
        Ok(())
    }

    async fn list_object_keys(&self, bucket: &str) -> Result<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(sdk(LIST_OBJECTS, bucket))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );
        }
        Ok(keys)
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| build_error("delete", e))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| build_error("delete", e))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(sdk(DELETE_OBJECTS, bucket))?;

        // per-key failures come back in a 200 response
        if let Some(first) = output.errors().first() {
            return Err(CloudError::ApiError(format!(
                "{} of {} objects could not be deleted from {} (first: {} {})",
                output.errors().len(),
                keys.len(),
                bucket,
                first.key().unwrap_or("?"),
                first.code().unwrap_or("unknown error"),
            )));
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(sdk(DELETE_BUCKET, bucket))?;
        Ok(())
    }
}
