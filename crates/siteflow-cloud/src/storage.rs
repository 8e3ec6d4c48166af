//! Object storage provisioning
//!
//! Bucket lifecycle, origin access policy and the incremental upload pool.

use crate::error::{CloudError, ErrorKind, Result};
use crate::event::{self, DeployEvent, ProgressReporter};
use crate::provider::{ObjectStore, ObjectUpload};
use crate::retry::{RetryConfig, with_retry};
use crate::tags::TagSet;
use crate::tracker::FileDescriptor;
use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use futures_util::{StreamExt, TryStreamExt, stream};
use std::io::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info};

/// Maximum keys per delete request
pub const DELETE_BATCH_SIZE: usize = 1000;
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const HTML_CACHE_CONTROL: &str = "no-cache";
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=86400";

/// Public website endpoint of a bucket
pub fn website_endpoint(bucket: &str, region: &str) -> String {
    format!("http://{}.s3-website-{}.amazonaws.com", bucket, region)
}

/// Regional REST endpoint used as the CDN origin
pub fn regional_domain(bucket: &str, region: &str) -> String {
    format!("{}.s3.{}.amazonaws.com", bucket, region)
}

/// Bucket policy granting read access to one distribution only
pub fn origin_policy(bucket: &str, distribution_arn: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "AllowCloudFrontServicePrincipalReadOnly",
            "Effect": "Allow",
            "Principal": { "Service": "cloudfront.amazonaws.com" },
            "Action": "s3:GetObject",
            "Resource": format!("arn:aws:s3:::{}/*", bucket),
            "Condition": {
                "StringEquals": { "AWS:SourceArn": distribution_arn }
            }
        }]
    })
    .to_string()
}

/// Website hosting settings applied on every `ensure_bucket`
#[derive(Debug, Clone)]
pub struct HostingOptions {
    pub index_document: String,
    pub error_document: Option<String>,
    /// Known once the distribution exists
    pub distribution_arn: Option<String>,
}

impl Default for HostingOptions {
    fn default() -> Self {
        Self {
            index_document: "index.html".to_string(),
            error_document: None,
            distribution_arn: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketOutcome {
    pub bucket: String,
    pub region: String,
    /// True only when this call created the bucket
    pub created: bool,
    pub website_url: String,
}

/// Create the bucket if absent and (re)apply its configuration
pub async fn ensure_bucket(
    store: &dyn ObjectStore,
    name: &str,
    region: &str,
    hosting: &HostingOptions,
    tags: &TagSet,
    retry: &RetryConfig,
    reporter: &dyn ProgressReporter,
) -> Result<BucketOutcome> {
    let created = match with_retry(retry, "head bucket", || store.head_bucket(name)).await {
        Ok(()) => false,
        Err(e) if e.is_not_found() => {
            match with_retry(retry, "create bucket", || store.create_bucket(name, region)).await {
                Ok(()) => {
                    info!("Created bucket {} in {}", name, region);
                    true
                }
                // already owned by us
                Err(e) if e.kind() == ErrorKind::Conflict => false,
                Err(e) => return Err(e),
            }
        }
        Err(e) => return Err(e),
    };

    with_retry(retry, "put public access block", || {
        store.put_public_access_block(name)
    })
    .await?;

    with_retry(retry, "put website configuration", || {
        store.put_website(
            name,
            &hosting.index_document,
            hosting.error_document.as_deref(),
        )
    })
    .await?;

    if let Some(arn) = &hosting.distribution_arn {
        apply_origin_policy(store, name, arn, retry).await?;
    }

    if let Err(e) = with_retry(retry, "tag bucket", || store.put_bucket_tags(name, tags)).await {
        event::warn(reporter, format!("Failed to tag bucket {}: {}", name, e));
    }

    reporter.report(DeployEvent::BucketReady {
        bucket: name.to_string(),
        created,
    });

    Ok(BucketOutcome {
        bucket: name.to_string(),
        region: region.to_string(),
        created,
        website_url: website_endpoint(name, region),
    })
}

/// Restrict bucket reads to the given distribution
pub async fn apply_origin_policy(
    store: &dyn ObjectStore,
    bucket: &str,
    distribution_arn: &str,
    retry: &RetryConfig,
) -> Result<()> {
    let policy = origin_policy(bucket, distribution_arn);
    with_retry(retry, "put bucket policy", || {
        store.put_bucket_policy(bucket, &policy)
    })
    .await?;
    debug!("Applied origin policy for {} on {}", distribution_arn, bucket);
    Ok(())
}

/// Upload pool settings
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub concurrency: usize,
    pub gzip: bool,
    /// Cache-Control for HTML documents
    pub html_cache_control: String,
    /// Cache-Control for every other asset
    pub cache_control: String,
    pub retry: RetryConfig,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            gzip: false,
            html_cache_control: HTML_CACHE_CONTROL.to_string(),
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: usize,
    pub bytes: u64,
    pub compressed: usize,
}

fn gzip(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    Ok(encoder.finish()?)
}

/// Read and encode one file for upload
pub async fn prepare_upload(file: &FileDescriptor, options: &UploadOptions) -> Result<ObjectUpload> {
    let raw = tokio::fs::read(&file.path).await.map_err(|e| CloudError::Scan {
        path: file.path.clone(),
        message: e.to_string(),
    })?;

    let (body, content_encoding) = if options.gzip && file.compressible {
        (gzip(&raw)?, Some("gzip".to_string()))
    } else {
        (raw, None)
    };

    let cache_control = if file.content_type.starts_with("text/html") {
        options.html_cache_control.clone()
    } else {
        options.cache_control.clone()
    };

    Ok(ObjectUpload {
        key: file.key.clone(),
        body: Bytes::from(body),
        content_type: file.content_type.clone(),
        content_encoding,
        cache_control: Some(cache_control),
    })
}

/// Upload exactly `files` with a bounded worker pool.
///
/// Transient failures are retried per file; the first other failure aborts.
pub async fn upload_changed_files(
    store: &dyn ObjectStore,
    bucket: &str,
    files: &[FileDescriptor],
    options: &UploadOptions,
    reporter: &dyn ProgressReporter,
) -> Result<UploadReport> {
    let total = files.len();
    if total == 0 {
        return Ok(UploadReport::default());
    }
    reporter.report(DeployEvent::UploadProgress {
        completed: 0,
        total,
    });

    let completed = &AtomicUsize::new(0);
    let bytes = &AtomicU64::new(0);
    let compressed = &AtomicUsize::new(0);

    stream::iter(files.iter())
        .map(Ok::<_, CloudError>)
        .try_for_each_concurrent(options.concurrency.max(1), |file| async move {
            let object = prepare_upload(file, options).await?;
            let size = object.body.len() as u64;
            let encoded = object.content_encoding.is_some();

            with_retry(&options.retry, &format!("upload {}", file.key), || {
                store.put_object(bucket, &object)
            })
            .await?;

            bytes.fetch_add(size, Ordering::Relaxed);
            if encoded {
                compressed.fetch_add(1, Ordering::Relaxed);
            }
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            reporter.report(DeployEvent::UploadProgress {
                completed: done,
                total,
            });
            Ok(())
        })
        .await?;

    let report = UploadReport {
        uploaded: completed.load(Ordering::SeqCst),
        bytes: bytes.load(Ordering::Relaxed),
        compressed: compressed.load(Ordering::Relaxed),
    };
    info!("Uploaded {} files to {}", report.uploaded, bucket);
    Ok(report)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: usize,
    /// Keys of every failed batch
    pub failed_keys: Vec<String>,
    /// One message per failed batch
    pub failures: Vec<String>,
}

/// Delete `keys` in batches; a failed batch is reported and skipped
pub async fn delete_removed_files(
    store: &dyn ObjectStore,
    bucket: &str,
    keys: &[String],
    retry: &RetryConfig,
    reporter: &dyn ProgressReporter,
) -> DeleteReport {
    let mut report = DeleteReport::default();
    for batch in keys.chunks(DELETE_BATCH_SIZE) {
        match with_retry(retry, "delete objects", || store.delete_objects(bucket, batch)).await {
            Ok(()) => report.deleted += batch.len(),
            Err(e) => {
                let message = format!(
                    "Failed to delete {} objects from {} (first: {}): {}",
                    batch.len(),
                    bucket,
                    batch[0],
                    e
                );
                event::warn(reporter, message.clone());
                report.failures.push(message);
                report.failed_keys.extend(batch.iter().cloned());
            }
        }
    }
    if report.deleted > 0 {
        reporter.report(DeployEvent::ObjectsDeleted {
            count: report.deleted,
        });
    }
    report
}

/// Delete every object and then the bucket; a missing bucket is success
pub async fn tear_down(store: &dyn ObjectStore, bucket: &str, retry: &RetryConfig) -> Result<()> {
    let keys = match with_retry(retry, "list objects", || store.list_object_keys(bucket)).await {
        Ok(keys) => keys,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e),
    };

    for batch in keys.chunks(DELETE_BATCH_SIZE) {
        match with_retry(retry, "delete objects", || store.delete_objects(bucket, batch)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }
    }

    match with_retry(retry, "delete bucket", || store.delete_bucket(bucket)).await {
        Ok(()) => {
            info!("Deleted bucket {} ({} objects)", bucket, keys.len());
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SilentReporter;
    use crate::testing::{FakeCloud, RecordingReporter};
    use crate::tracker::{ExcludeSet, scan};
    use flate2::read::GzDecoder;
    use std::fs;
    use std::io::Read;
    use tempfile::tempdir;

    fn retry() -> RetryConfig {
        RetryConfig::immediate(3)
    }

    fn options() -> UploadOptions {
        UploadOptions {
            retry: retry(),
            ..Default::default()
        }
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(
            website_endpoint("site", "ap-northeast-1"),
            "http://site.s3-website-ap-northeast-1.amazonaws.com"
        );
        assert_eq!(
            regional_domain("site", "us-east-1"),
            "site.s3.us-east-1.amazonaws.com"
        );
    }

    #[test]
    fn test_origin_policy_names_distribution() {
        let policy: serde_json::Value = serde_json::from_str(&origin_policy(
            "site",
            "arn:aws:cloudfront::1:distribution/E1",
        ))
        .unwrap();
        let statement = &policy["Statement"][0];
        assert_eq!(statement["Resource"], "arn:aws:s3:::site/*");
        assert_eq!(
            statement["Condition"]["StringEquals"]["AWS:SourceArn"],
            "arn:aws:cloudfront::1:distribution/E1"
        );
        assert_eq!(
            statement["Principal"]["Service"],
            "cloudfront.amazonaws.com"
        );
    }

    #[tokio::test]
    async fn test_ensure_bucket_created_only_once() {
        let cloud = FakeCloud::new();
        let tags = TagSet::convention("web", "prod");

        let first = ensure_bucket(
            &cloud,
            "site",
            "us-east-1",
            &HostingOptions::default(),
            &tags,
            &retry(),
            &SilentReporter,
        )
        .await
        .unwrap();
        assert!(first.created);

        let second = ensure_bucket(
            &cloud,
            "site",
            "us-east-1",
            &HostingOptions::default(),
            &tags,
            &retry(),
            &SilentReporter,
        )
        .await
        .unwrap();
        assert!(!second.created);

        let bucket = cloud.bucket("site").unwrap();
        assert!(bucket.public_access_blocked);
        assert_eq!(bucket.website, Some(("index.html".to_string(), None)));
        assert!(bucket.tags.belongs_to("web", "prod"));
        assert!(bucket.policy.is_none());
    }

    #[tokio::test]
    async fn test_ensure_bucket_already_owned_is_not_created() {
        let cloud = FakeCloud::new();
        cloud.add_bucket("site", "us-east-1", TagSet::new());
        // a racing head reports missing while create reports owned
        cloud.fail("head_bucket", 1, || CloudError::ResourceNotFound("site".into()));

        let outcome = ensure_bucket(
            &cloud,
            "site",
            "us-east-1",
            &HostingOptions::default(),
            &TagSet::new(),
            &retry(),
            &SilentReporter,
        )
        .await
        .unwrap();
        assert!(!outcome.created);
    }

    #[tokio::test]
    async fn test_ensure_bucket_foreign_name_is_fatal() {
        let cloud = FakeCloud::new();
        cloud.state().foreign_buckets.push("taken".into());

        let err = ensure_bucket(
            &cloud,
            "taken",
            "us-east-1",
            &HostingOptions::default(),
            &TagSet::new(),
            &retry(),
            &SilentReporter,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CloudError::BucketNameTaken(_)));
    }

    #[tokio::test]
    async fn test_ensure_bucket_applies_origin_policy_and_tolerates_tag_failure() {
        let cloud = FakeCloud::new();
        cloud.fail_always("put_bucket_tags", || {
            CloudError::ApiError("tagging disabled".into())
        });
        let reporter = RecordingReporter::new();
        let hosting = HostingOptions {
            distribution_arn: Some("arn:aws:cloudfront::1:distribution/E1".into()),
            ..Default::default()
        };

        ensure_bucket(
            &cloud,
            "site",
            "eu-west-1",
            &hosting,
            &TagSet::new(),
            &retry(),
            &reporter,
        )
        .await
        .unwrap();

        assert!(cloud.bucket("site").unwrap().policy.is_some());
        assert_eq!(reporter.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_sets_headers_and_gzip() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>hello</h1>").unwrap();
        fs::write(dir.path().join("logo.png"), [0x89u8, 0x50, 0x4e, 0x47]).unwrap();
        let files = scan(dir.path(), &ExcludeSet::default()).unwrap();

        let cloud = FakeCloud::new();
        cloud.add_bucket("site", "us-east-1", TagSet::new());
        let options = UploadOptions {
            gzip: true,
            ..options()
        };
        let reporter = RecordingReporter::new();

        let report = upload_changed_files(&cloud, "site", &files, &options, &reporter)
            .await
            .unwrap();
        assert_eq!(report.uploaded, 2);
        assert_eq!(report.compressed, 1);

        let bucket = cloud.bucket("site").unwrap();
        let html = &bucket.objects["index.html"];
        assert_eq!(html.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(html.cache_control.as_deref(), Some(HTML_CACHE_CONTROL));
        let mut decoded = String::new();
        GzDecoder::new(&html.body[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "<h1>hello</h1>");

        let png = &bucket.objects["logo.png"];
        assert_eq!(png.content_type, "image/png");
        assert!(png.content_encoding.is_none());
        assert_eq!(png.cache_control.as_deref(), Some(DEFAULT_CACHE_CONTROL));

        let last = reporter.events().into_iter().rev().find_map(|e| match e {
            DeployEvent::UploadProgress { completed, total } => Some((completed, total)),
            _ => None,
        });
        assert_eq!(last, Some((2, 2)));
    }

    #[tokio::test]
    async fn test_upload_retries_transient_and_aborts_on_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let files = scan(dir.path(), &ExcludeSet::default()).unwrap();

        let cloud = FakeCloud::new();
        cloud.add_bucket("site", "us-east-1", TagSet::new());
        cloud.fail("put_object", 2, || CloudError::Transient("SlowDown".into()));
        upload_changed_files(&cloud, "site", &files, &options(), &SilentReporter)
            .await
            .unwrap();
        assert_eq!(cloud.state().uploads, vec!["a.txt"]);

        cloud.fail("put_object", 1, || CloudError::AccessDenied {
            message: "denied".into(),
            permission: "s3:PutObject".into(),
        });
        let err = upload_changed_files(&cloud, "site", &files, &options(), &SilentReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::AccessDenied { .. }));
        assert_eq!(cloud.state().uploads.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_batches_continue_after_failure() {
        let cloud = FakeCloud::new();
        cloud.add_bucket("site", "us-east-1", TagSet::new());
        let keys: Vec<String> = (0..2500).map(|i| format!("file-{:04}.txt", i)).collect();
        cloud.fail("delete_objects", 1, || CloudError::ApiError("InternalError".into()));
        let reporter = RecordingReporter::new();

        let report = delete_removed_files(&cloud, "site", &keys, &retry(), &reporter).await;

        assert_eq!(report.deleted, 1500);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failed_keys.len(), 1000);
        assert_eq!(report.failed_keys[0], "file-0000.txt");
        assert_eq!(reporter.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_tear_down_empties_and_deletes() {
        let cloud = FakeCloud::new();
        cloud.add_bucket("site", "us-east-1", TagSet::new());
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let files = scan(dir.path(), &ExcludeSet::default()).unwrap();
        upload_changed_files(&cloud, "site", &files, &options(), &SilentReporter)
            .await
            .unwrap();

        tear_down(&cloud, "site", &retry()).await.unwrap();
        assert!(cloud.bucket("site").is_none());

        // already gone
        tear_down(&cloud, "site", &retry()).await.unwrap();
    }
}
