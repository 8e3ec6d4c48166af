use siteflow_cloud::cdn::CdnConfig;
use siteflow_cloud::certificate::CertificateConfig;
use siteflow_cloud::testing::{FakeCloud, RecordingReporter};
use siteflow_cloud::{
    CdnRequest, CustomDomain, DeployContext, DeployRequest, PollConfig, PriceClass, RetryConfig,
    StateStore, Timing,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
    pub cloud: Arc<FakeCloud>,
    pub reporter: Arc<RecordingReporter>,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("site")).unwrap();
        Self {
            root,
            cloud: Arc::new(FakeCloud::new()),
            reporter: Arc::new(RecordingReporter::new()),
        }
    }

    pub fn site(&self) -> PathBuf {
        self.root.path().join("site")
    }

    pub fn write(&self, key: &str, content: &str) {
        let path = self.site().join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[allow(dead_code)]
    pub fn remove(&self, key: &str) {
        fs::remove_file(self.site().join(key)).unwrap();
    }

    /// `index.html` plus `count - 1` assets
    pub fn write_site(&self, count: usize) {
        self.write("index.html", "<html><body>home</body></html>");
        for i in 1..count {
            self.write(&format!("assets/file-{:03}.css", i), &format!("body {{ order: {}; }}", i));
        }
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(self.root.path())
    }

    pub fn context(&self) -> DeployContext {
        DeployContext {
            store: Arc::new(self.store()),
            clients: self.cloud.clients(),
            reporter: self.reporter.clone(),
            timing: quick_timing(),
        }
    }

    pub fn request(&self) -> DeployRequest {
        DeployRequest {
            app: "web".into(),
            environment: "prod".into(),
            source: self.site(),
            region: "ap-northeast-1".into(),
            bucket: "web-prod-site".into(),
            index_document: "index.html".into(),
            error_document: None,
            exclude: vec![".DS_Store".into()],
            concurrency: 4,
            gzip: false,
            cache_control: None,
            cleanup: true,
            cdn: Some(CdnRequest {
                price_class: PriceClass::P100,
                ipv6: true,
                spa: false,
                custom_domain: None,
                cache_warming: Vec::new(),
            }),
            rollback: true,
            force_invalidate: false,
            wait_invalidation: false,
        }
    }

    #[allow(dead_code)]
    pub fn request_with_domain(&self, domain: &str, aliases: &[&str]) -> DeployRequest {
        let mut request = self.request();
        if let Some(cdn) = request.cdn.as_mut() {
            cdn.custom_domain = Some(CustomDomain {
                domain_name: domain.into(),
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
                certificate_arn: None,
            });
        }
        request
    }
}

pub fn quick_timing() -> Timing {
    let retry = RetryConfig::immediate(3);
    let poll = PollConfig::fixed(Duration::from_millis(1), Duration::from_secs(5));
    Timing {
        retry: retry.clone(),
        certificate: CertificateConfig {
            validation_record_attempts: 5,
            validation_record_delay: Duration::from_millis(1),
            issuance: poll.clone(),
            retry: retry.clone(),
        },
        cdn: CdnConfig {
            retry,
            deployment: poll.clone(),
            invalidation: poll,
        },
    }
}
