//! Console rendering of deployment events

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use siteflow_cloud::certificate::CertificatePhase;
use siteflow_cloud::{DeployEvent, ProgressReporter, Step};
use std::sync::Mutex;

#[derive(Default)]
pub struct ConsoleReporter {
    upload: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn upload_bar(total: usize) -> ProgressBar {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} files")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb
    }

    /// Print above the upload bar while it is running
    fn line(&self, text: String) {
        if let Ok(guard) = self.upload.lock()
            && let Some(pb) = guard.as_ref()
            && !pb.is_finished()
        {
            pb.println(text);
            return;
        }
        println!("{}", text);
    }

    fn progress(&self, completed: usize, total: usize) {
        let Ok(mut guard) = self.upload.lock() else {
            return;
        };
        let pb = guard.get_or_insert_with(|| Self::upload_bar(total));
        pb.set_position(completed as u64);
        if completed >= total {
            pb.finish_and_clear();
            *guard = None;
            drop(guard);
            println!("  ✓ Uploaded {} files", total);
        }
    }
}

fn step_label(step: Step) -> String {
    match step {
        Step::Rollback => format!("↺ {}", step).yellow().bold().to_string(),
        _ => format!("→ {}", step).blue().bold().to_string(),
    }
}

impl ProgressReporter for ConsoleReporter {
    fn report(&self, event: DeployEvent) {
        match event {
            DeployEvent::StepStarted(step) => self.line(step_label(step)),
            DeployEvent::StepSkipped { step, reason } => {
                self.line(format!("  - {} skipped ({})", step, reason).dimmed().to_string())
            }
            DeployEvent::BucketReady { bucket, created } => {
                let how = if created { "created" } else { "exists" };
                self.line(format!("  ✓ Bucket {} ({})", bucket.cyan(), how));
            }
            DeployEvent::ChangesDetected(summary) => self.line(format!("  {}", summary)),
            DeployEvent::UploadProgress { completed, total } => self.progress(completed, total),
            DeployEvent::ObjectsDeleted { count } => {
                self.line(format!("  ✓ Deleted {} objects", count))
            }
            DeployEvent::CertificatePhase { domain, phase } => {
                let text = format!("  {} certificate: {}", domain.cyan(), phase);
                match phase {
                    CertificatePhase::Ready => self.line(format!("  ✓ {} certificate ready", domain.cyan())),
                    CertificatePhase::Failed => self.line(text.red().to_string()),
                    _ => self.line(text),
                }
            }
            DeployEvent::HostedZoneCreated { zone, name_servers } => {
                self.line(format!("  ✓ Created hosted zone {}", zone.cyan()));
                self.line(
                    "  ⚠ Delegate the domain to these name servers at your registrar:"
                        .yellow()
                        .to_string(),
                );
                for ns in name_servers {
                    self.line(format!("      {}", ns));
                }
            }
            DeployEvent::DistributionReady { id, domain, created } => {
                let how = if created { "created" } else { "updated" };
                self.line(format!("  ✓ Distribution {} ({}) {}", id.cyan(), domain, how));
            }
            DeployEvent::DistributionDeployed { id } => {
                self.line(format!("  ✓ Distribution {} deployed", id.cyan()))
            }
            DeployEvent::InvalidationCreated { id, paths } => {
                self.line(format!("  ✓ Invalidation {} ({})", id.cyan(), paths.join(", ")))
            }
            DeployEvent::AliasRecordsPublished { records } => {
                for record in records {
                    self.line(format!("  ✓ {}", record));
                }
            }
            DeployEvent::ResourceDeleted { kind, id } => {
                self.line(format!("  ✓ Deleted {} {}", kind, id.cyan()))
            }
            DeployEvent::RolledBack { bucket } => {
                self.line(format!("  ↺ Removed bucket {}", bucket).yellow().to_string())
            }
            DeployEvent::Warning(message) => self.line(format!("  ⚠ {}", message).yellow().to_string()),
        }
    }
}
