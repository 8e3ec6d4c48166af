//! Configuration validation

use crate::error::{ConfigError, Result};
use crate::model::SiteConfig;

pub const PRICE_CLASSES: [&str; 3] = ["PriceClass_All", "PriceClass_200", "PriceClass_100"];
pub const MAX_CONCURRENCY: usize = 100;

/// Application and environment names end up in tags and state file paths
fn check_name(kind: &str, name: &str, problems: &mut Vec<String>) {
    if name.is_empty() {
        problems.push(format!("{} name must not be empty", kind));
        return;
    }
    let allowed = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !allowed || name.starts_with('-') || name.len() > 63 {
        problems.push(format!(
            "{} name `{}` may only contain letters, digits, `-` and `_` (max 63 characters)",
            kind, name
        ));
    }
}

/// S3 bucket naming rules for general purpose buckets
pub fn check_bucket_name(name: &str) -> std::result::Result<(), String> {
    if !(3..=63).contains(&name.len()) {
        return Err(format!("bucket name `{}` must be 3-63 characters long", name));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(format!(
            "bucket name `{}` may only contain lowercase letters, digits, `.` and `-`",
            name
        ));
    }
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return Err(format!(
            "bucket name `{}` must begin and end with a letter or digit",
            name
        ));
    }
    if name.contains("..") || name.contains(".-") || name.contains("-.") {
        return Err(format!(
            "bucket name `{}` must not contain adjacent periods or dashes next to periods",
            name
        ));
    }
    if name.split('.').count() == 4 && name.split('.').all(|p| p.parse::<u8>().is_ok()) {
        return Err(format!(
            "bucket name `{}` must not be formatted as an IP address",
            name
        ));
    }
    if name.starts_with("xn--") || name.starts_with("sthree-") || name.ends_with("-s3alias") {
        return Err(format!("bucket name `{}` uses a reserved prefix or suffix", name));
    }
    Ok(())
}

/// `us-east-1`, `ap-northeast-1`, `us-gov-west-1`, ...
pub fn check_region(region: &str) -> std::result::Result<(), String> {
    let parts: Vec<&str> = region.split('-').collect();
    let well_formed = parts.len() >= 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
        && parts
            .last()
            .is_some_and(|p| p.chars().all(|c| c.is_ascii_digit()));
    if well_formed {
        Ok(())
    } else {
        Err(format!("`{}` is not a valid region name", region))
    }
}

fn check_domain(kind: &str, domain: &str, problems: &mut Vec<String>) {
    let domain = domain.trim_end_matches('.');
    let labels: Vec<&str> = domain.split('.').collect();
    let valid = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '*')
        });
    if !valid {
        problems.push(format!("{} `{}` is not a valid domain name", kind, domain));
    }
}

impl SiteConfig {
    /// Check a resolved configuration for `environment`.
    ///
    /// Every problem is reported at once.
    pub fn validate(&self, environment: &str) -> Result<()> {
        let mut problems = Vec::new();

        check_name("application", &self.app, &mut problems);
        check_name("environment", environment, &mut problems);

        if let Err(problem) = check_region(&self.region) {
            problems.push(problem);
        }
        if let Err(problem) = check_bucket_name(&self.bucket_name(environment)) {
            problems.push(problem);
        }

        let s3 = &self.s3;
        if s3.index_document.is_empty() || s3.index_document.starts_with('/') {
            problems.push(format!(
                "s3.indexDocument `{}` must be a relative key",
                s3.index_document
            ));
        }
        if let Some(error_document) = &s3.error_document
            && (error_document.is_empty() || error_document.starts_with('/'))
        {
            problems.push(format!(
                "s3.errorDocument `{}` must be a relative key",
                error_document
            ));
        }
        if !(1..=MAX_CONCURRENCY).contains(&s3.concurrency) {
            problems.push(format!(
                "s3.concurrency must be between 1 and {} (got {})",
                MAX_CONCURRENCY, s3.concurrency
            ));
        }

        let cloudfront = &self.cloudfront;
        if cloudfront.enabled {
            if !PRICE_CLASSES.contains(&cloudfront.price_class.as_str()) {
                problems.push(format!(
                    "cloudfront.priceClass `{}` must be one of {}",
                    cloudfront.price_class,
                    PRICE_CLASSES.join(", ")
                ));
            }
            if cloudfront.wait_timeout_secs == 0 {
                problems.push("cloudfront.waitTimeoutSecs must be positive".to_string());
            }
            for path in &cloudfront.cache_warming {
                if !path.starts_with('/') {
                    problems.push(format!(
                        "cloudfront.cacheWarming path `{}` must start with `/`",
                        path
                    ));
                }
            }
            if let Some(domain) = &cloudfront.custom_domain {
                check_domain("cloudfront.customDomain.domainName", &domain.domain_name, &mut problems);
                for alias in &domain.aliases {
                    check_domain("cloudfront.customDomain.aliases", alias, &mut problems);
                }
                if let Some(arn) = &domain.certificate_arn
                    && !arn.starts_with("arn:")
                {
                    problems.push(format!(
                        "cloudfront.customDomain.certificateArn `{}` is not an ARN",
                        arn
                    ));
                }
            }
        } else if self.cloudfront.custom_domain.is_some() {
            problems.push("cloudfront.customDomain requires cloudfront.enabled".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("\n  - ")))
        }
    }
}
