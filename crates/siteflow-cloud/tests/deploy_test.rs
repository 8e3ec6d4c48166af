mod common;

use common::TestProject;
use siteflow_cloud::deploy::{RemoveRequest, deploy, remove, status};
use siteflow_cloud::state::DeploymentState;
use siteflow_cloud::state::StorageResource;
use siteflow_cloud::{CloudError, DeployEvent, LiveStatus, Step, TagSet};

fn position(calls: &[String], prefix: &str) -> usize {
    calls
        .iter()
        .position(|c| c.starts_with(prefix))
        .unwrap_or_else(|| panic!("no call starting with {prefix}: {calls:?}"))
}

// ============ Incremental uploads ============

#[tokio::test]
async fn test_first_deploy_uploads_everything() {
    let project = TestProject::new();
    project.write_site(50);
    project.write(".DS_Store", "junk");

    let report = deploy(&project.context(), &project.request())
        .await
        .unwrap();

    assert!(report.bucket_created);
    assert_eq!(report.changes.added, 50);
    assert_eq!(report.upload.uploaded, 50);
    assert_eq!(project.cloud.state().uploads.len(), 50);
    assert!(report.invalidation_id.is_some());
    assert_eq!(report.deployed, Some(true));

    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    assert_eq!(state.files.len(), 50);
    assert!(!state.files.contains_key(".DS_Store"));
    assert_eq!(state.bucket_name(), Some("web-prod-site"));
    let cdn = state.resources.cloudfront.unwrap();
    assert_eq!(Some(cdn.distribution_id.as_str()), report.distribution_id.as_deref());
    assert!(cdn.last_invalidation.is_some());
    assert_eq!(report.url, Some(format!("https://{}", cdn.domain_name)));

    let bucket = project.cloud.bucket("web-prod-site").unwrap();
    assert!(bucket.tags.belongs_to("web", "prod"));
    assert!(bucket.policy.unwrap().contains(&cdn.distribution_id));
}

#[tokio::test]
async fn test_second_deploy_uploads_only_modified_file() {
    let project = TestProject::new();
    project.write_site(50);
    let ctx = project.context();
    deploy(&ctx, &project.request()).await.unwrap();

    project.write("assets/file-007.css", "body { color: red; }");
    let report = deploy(&ctx, &project.request()).await.unwrap();

    assert!(!report.bucket_created);
    assert_eq!(report.changes.modified, 1);
    assert_eq!(report.changes.unchanged, 49);
    assert_eq!(report.upload.uploaded, 1);
    let state = project.cloud.state();
    assert_eq!(state.uploads.len(), 51);
    assert_eq!(state.uploads[50], "assets/file-007.css");
    assert_eq!(state.invalidations.len(), 2);
    assert_eq!(state.distributions.len(), 1);
}

#[tokio::test]
async fn test_unchanged_deploy_skips_invalidation() {
    let project = TestProject::new();
    project.write_site(5);
    let ctx = project.context();
    deploy(&ctx, &project.request()).await.unwrap();

    let report = deploy(&ctx, &project.request()).await.unwrap();

    assert_eq!(report.upload.uploaded, 0);
    assert!(report.invalidation_id.is_none());
    assert_eq!(project.cloud.state().invalidations.len(), 1);
    assert!(project.reporter.events().contains(&DeployEvent::StepSkipped {
        step: Step::Invalidation,
        reason: "no changes".into(),
    }));

    let mut forced = project.request();
    forced.force_invalidate = true;
    let report = deploy(&ctx, &forced).await.unwrap();
    assert!(report.invalidation_id.is_some());
}

#[tokio::test]
async fn test_deleted_file_is_removed_with_cleanup() {
    let project = TestProject::new();
    project.write_site(3);
    let ctx = project.context();
    deploy(&ctx, &project.request()).await.unwrap();

    project.remove("assets/file-001.css");
    let report = deploy(&ctx, &project.request()).await.unwrap();

    assert_eq!(report.changes.deleted, 1);
    assert_eq!(report.deleted, 1);
    let bucket = project.cloud.bucket("web-prod-site").unwrap();
    assert!(!bucket.objects.contains_key("assets/file-001.css"));
    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    assert!(!state.files.contains_key("assets/file-001.css"));
    assert_eq!(state.files.len(), 2);
}

#[tokio::test]
async fn test_deleted_file_is_kept_without_cleanup() {
    let project = TestProject::new();
    project.write_site(3);
    let ctx = project.context();
    deploy(&ctx, &project.request()).await.unwrap();

    project.remove("assets/file-001.css");
    let mut request = project.request();
    request.cleanup = false;
    let report = deploy(&ctx, &request).await.unwrap();

    assert_eq!(report.deleted, 0);
    // nothing changed in the bucket, so the edge cache is still valid
    assert!(report.invalidation_id.is_none());
    let bucket = project.cloud.bucket("web-prod-site").unwrap();
    assert!(bucket.objects.contains_key("assets/file-001.css"));
    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    assert!(state.files.contains_key("assets/file-001.css"));
}

#[tokio::test]
async fn test_failed_delete_batch_is_retried_next_run() {
    let project = TestProject::new();
    project.write_site(3);
    let ctx = project.context();
    deploy(&ctx, &project.request()).await.unwrap();

    project.remove("assets/file-002.css");
    project
        .cloud
        .fail("delete_objects", 1, || CloudError::ApiError("InternalError".into()));
    let report = deploy(&ctx, &project.request()).await.unwrap();
    assert_eq!(report.delete_failures.len(), 1);
    assert!(!project.reporter.warnings().is_empty());
    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    assert!(state.files.contains_key("assets/file-002.css"));

    let report = deploy(&ctx, &project.request()).await.unwrap();
    assert_eq!(report.deleted, 1);
    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    assert!(!state.files.contains_key("assets/file-002.css"));
}

#[tokio::test]
async fn test_transient_upload_failures_are_retried() {
    let project = TestProject::new();
    project.write_site(4);
    project
        .cloud
        .fail("put_object", 2, || CloudError::Transient("SlowDown".into()));

    let report = deploy(&project.context(), &project.request())
        .await
        .unwrap();
    assert_eq!(report.upload.uploaded, 4);
}

// ============ Rollback ============

#[tokio::test]
async fn test_rollback_on_invalidation_failure() {
    let project = TestProject::new();
    project.write_site(10);
    project.cloud.fail_always("create_invalidation", || {
        CloudError::ApiError("TooManyInvalidationsInProgress".into())
    });

    let err = deploy(&project.context(), &project.request())
        .await
        .unwrap_err();

    // the original error is returned
    assert!(matches!(err, CloudError::ApiError(ref m) if m.contains("TooManyInvalidations")));
    assert!(project.cloud.bucket("web-prod-site").is_none());

    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    assert!(state.resources.s3.is_none());
    assert!(state.files.is_empty());
    assert!(project.reporter.events().contains(&DeployEvent::RolledBack {
        bucket: "web-prod-site".into(),
    }));
}

#[tokio::test]
async fn test_no_rollback_for_existing_bucket() {
    let project = TestProject::new();
    project.write_site(10);
    project
        .cloud
        .add_bucket("web-prod-site", "ap-northeast-1", TagSet::new());
    project.cloud.fail_always("create_invalidation", || {
        CloudError::ApiError("TooManyInvalidationsInProgress".into())
    });

    let err = deploy(&project.context(), &project.request())
        .await
        .unwrap_err();

    assert!(matches!(err, CloudError::ApiError(_)));
    let bucket = project.cloud.bucket("web-prod-site").unwrap();
    assert_eq!(bucket.objects.len(), 10);
    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    assert_eq!(state.bucket_name(), Some("web-prod-site"));
    assert_eq!(state.files.len(), 10);
}

#[tokio::test]
async fn test_rollback_can_be_disabled() {
    let project = TestProject::new();
    project.write_site(2);
    project.cloud.fail_always("create_distribution", || {
        CloudError::AccessDenied {
            message: "not authorized".into(),
            permission: "cloudfront:CreateDistribution".into(),
        }
    });
    let mut request = project.request();
    request.rollback = false;

    let err = deploy(&project.context(), &request).await.unwrap_err();

    assert!(matches!(err, CloudError::AccessDenied { .. }));
    assert!(project.cloud.bucket("web-prod-site").is_some());
    assert!(
        project
            .reporter
            .warnings()
            .iter()
            .any(|w| w.contains("Rollback disabled"))
    );
}

#[tokio::test]
async fn test_recorded_bucket_is_never_replaced() {
    let project = TestProject::new();
    project.write_site(2);
    let mut state = DeploymentState::new("web", "prod");
    state
        .record_storage(StorageResource {
            bucket_name: "older-bucket".into(),
            region: "ap-northeast-1".into(),
            website_url: "http://older-bucket".into(),
        })
        .unwrap();
    project.store().save(&mut state).await.unwrap();

    let err = deploy(&project.context(), &project.request())
        .await
        .unwrap_err();

    assert!(matches!(err, CloudError::StateConflict { resource: "bucket", .. }));
    assert!(project.cloud.bucket("web-prod-site").is_none());
}

// ============ Storage only ============

#[tokio::test]
async fn test_storage_only_deploy() {
    let project = TestProject::new();
    project.write_site(3);
    let mut request = project.request();
    request.cdn = None;

    let report = deploy(&project.context(), &request).await.unwrap();

    // the bucket stays private, so there is nothing public to link to
    assert!(report.url.is_none());
    assert!(
        project
            .reporter
            .warnings()
            .iter()
            .any(|w| w.contains("no public URL"))
    );
    assert!(report.distribution_id.is_none());
    assert!(project.cloud.state().distributions.is_empty());
    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    assert!(state.resources.cloudfront.is_none());
}

#[tokio::test]
async fn test_nested_index_documents_are_flagged() {
    let project = TestProject::new();
    project.write_site(2);
    project.write("docs/index.html", "<html><body>docs</body></html>");

    deploy(&project.context(), &project.request()).await.unwrap();

    assert!(
        project
            .reporter
            .warnings()
            .iter()
            .any(|w| w.contains("/docs/") && w.contains("docs/index.html"))
    );
}

#[tokio::test]
async fn test_cache_warming_after_invalidation() {
    let project = TestProject::new();
    project.write_site(2);
    let mut request = project.request();
    if let Some(cdn) = request.cdn.as_mut() {
        cdn.cache_warming = vec!["/".into(), "about.html".into()];
    }

    let report = deploy(&project.context(), &request).await.unwrap();

    let domain = report.distribution_domain.unwrap();
    assert_eq!(
        project.cloud.state().warmed,
        vec![
            format!("https://{}/", domain),
            format!("https://{}/about.html", domain),
        ]
    );
}

// ============ Custom domain ============

#[tokio::test]
async fn test_custom_domain_requests_certificate_and_aliases() {
    let project = TestProject::new();
    project.write_site(3);
    let zone_id = project.cloud.add_zone("example.com");
    let request = project.request_with_domain("example.com", &["www.example.com"]);
    let ctx = project.context();

    let report = deploy(&ctx, &request).await.unwrap();

    assert_eq!(report.url.as_deref(), Some("https://example.com"));
    assert_eq!(report.alias_records.len(), 4);
    assert_eq!(project.cloud.state().certificate_requests, vec!["example.com"]);

    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    let acm = state.resources.acm.clone().unwrap();
    assert!(acm.auto_created);
    assert_eq!(acm.status, "ISSUED");
    let dns = state.resources.route53.clone().unwrap();
    assert_eq!(dns.hosted_zone_id, zone_id);
    assert!(dns.records.contains(&"www.example.com AAAA".to_string()));

    let dist = project
        .cloud
        .distribution(report.distribution_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(dist.config.aliases, vec!["example.com", "www.example.com"]);
    assert_eq!(dist.config.certificate_arn, Some(acm.certificate_arn.clone()));

    // the issued certificate is reused and keeps its origin
    deploy(&ctx, &request).await.unwrap();
    assert_eq!(project.cloud.state().certificate_requests.len(), 1);
    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    assert!(state.resources.acm.unwrap().auto_created);
}

#[tokio::test]
async fn test_changed_domain_retires_auto_created_certificate() {
    let project = TestProject::new();
    project.write_site(2);
    project.cloud.add_zone("example.com");
    let ctx = project.context();
    deploy(&ctx, &project.request_with_domain("example.com", &[]))
        .await
        .unwrap();
    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    let first = state.resources.acm.unwrap().certificate_arn;

    let report = deploy(
        &ctx,
        &project.request_with_domain("example.com", &["www.example.com"]),
    )
    .await
    .unwrap();

    let second = report.certificate_arn.clone().unwrap();
    assert_ne!(first, second);
    assert_eq!(project.cloud.state().certificate_requests.len(), 2);
    assert!(!project.cloud.state().certificates.contains_key(&first));
    assert!(project.cloud.state().certificates.contains_key(&second));
    assert!(project.reporter.events().contains(&DeployEvent::ResourceDeleted {
        kind: "certificate".into(),
        id: first.clone(),
    }));

    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    let acm = state.resources.acm.unwrap();
    assert_eq!(acm.certificate_arn, second);
    assert!(acm.auto_created);
}

#[tokio::test]
async fn test_supplied_certificate_skips_provisioning() {
    let project = TestProject::new();
    project.write_site(2);
    project.cloud.add_zone("example.com");
    let mut request = project.request_with_domain("www.example.com", &[]);
    if let Some(domain) = request
        .cdn
        .as_mut()
        .and_then(|cdn| cdn.custom_domain.as_mut())
    {
        domain.certificate_arn = Some("arn:aws:acm:us-east-1:123456789012:certificate/given".into());
    }

    let report = deploy(&project.context(), &request).await.unwrap();

    assert!(project.cloud.state().certificate_requests.is_empty());
    assert_eq!(
        report.certificate_arn.as_deref(),
        Some("arn:aws:acm:us-east-1:123456789012:certificate/given")
    );
    assert_eq!(report.alias_records, vec!["www.example.com A", "www.example.com AAAA"]);
    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    assert!(state.resources.acm.is_none());
}

#[tokio::test]
async fn test_subdomain_without_zone_fails_before_any_mutation() {
    let project = TestProject::new();
    project.write_site(2);
    let request = project.request_with_domain("www.example.com", &[]);

    let err = deploy(&project.context(), &request).await.unwrap_err();

    assert!(matches!(err, CloudError::HostedZoneNotFound { .. }));
    assert!(project.cloud.bucket("web-prod-site").is_none());
    assert!(project.cloud.state().certificate_requests.is_empty());
}

// ============ Remove & status ============

#[tokio::test]
async fn test_remove_tears_down_in_reverse_order() {
    let project = TestProject::new();
    project.write_site(3);
    project.cloud.add_zone("example.com");
    let ctx = project.context();
    deploy(&ctx, &project.request_with_domain("example.com", &[]))
        .await
        .unwrap();

    let report = remove(
        &ctx,
        &RemoveRequest {
            app: "web".into(),
            environment: "prod".into(),
            keep_bucket: false,
        },
    )
    .await
    .unwrap();

    let kinds: Vec<&str> = report.deleted.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(kinds, vec!["alias records", "distribution", "certificate", "bucket"]);
    assert!(report.state_deleted);

    let calls = project.cloud.calls();
    let records = position(&calls, "delete_records");
    let distribution = position(&calls, "delete_distribution");
    let certificate = position(&calls, "delete_certificate");
    let bucket = position(&calls, "delete_bucket");
    assert!(records < distribution && distribution < certificate && certificate < bucket);

    assert!(project.cloud.state().distributions.is_empty());
    assert!(project.cloud.state().certificates.is_empty());
    assert!(project.cloud.bucket("web-prod-site").is_none());
    assert!(project.store().load("web", "prod").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_can_keep_bucket() {
    let project = TestProject::new();
    project.write_site(2);
    let ctx = project.context();
    deploy(&ctx, &project.request()).await.unwrap();

    let report = remove(
        &ctx,
        &RemoveRequest {
            app: "web".into(),
            environment: "prod".into(),
            keep_bucket: true,
        },
    )
    .await
    .unwrap();

    assert!(!report.state_deleted);
    assert!(project.cloud.bucket("web-prod-site").is_some());
    let state = project.store().load("web", "prod").await.unwrap().unwrap();
    assert!(state.resources.cloudfront.is_none());
    assert_eq!(state.bucket_name(), Some("web-prod-site"));
}

#[tokio::test]
async fn test_remove_without_state_fails() {
    let project = TestProject::new();

    let err = remove(
        &project.context(),
        &RemoveRequest {
            app: "web".into(),
            environment: "prod".into(),
            keep_bucket: false,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CloudError::StateError(_)));
}

#[tokio::test]
async fn test_status_reports_live_resources() {
    let project = TestProject::new();
    project.write_site(2);
    let ctx = project.context();
    assert!(status(&ctx, "web", "prod").await.unwrap().is_none());
    deploy(&ctx, &project.request()).await.unwrap();

    let report = status(&ctx, "web", "prod").await.unwrap().unwrap();
    assert_eq!(report.resources.len(), 2);
    assert_eq!(report.resources[0].live, LiveStatus::Present(None));
    assert_eq!(
        report.resources[1].live,
        LiveStatus::Present(Some("Deployed".into()))
    );

    project.cloud.state().buckets.remove("web-prod-site");
    let report = status(&ctx, "web", "prod").await.unwrap().unwrap();
    assert_eq!(report.resources[0].live, LiveStatus::Missing);
}
