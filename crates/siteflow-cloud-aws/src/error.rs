//! Provider error classification
//!
//! Every SDK failure is reduced to a [`Failure`] (code, message, HTTP status)
//! and then mapped onto a [`CloudError`]. Code matching lives here and nowhere
//! else.

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use siteflow_cloud::CloudError;

/// Codes that signal throttling or a transient service problem
const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "Throttled",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "SlowDown",
    "ServiceUnavailable",
    "InternalError",
    "InternalFailure",
    "RequestTimeout",
    "PriorRequestNotComplete",
];

const NOT_FOUND_CODES: &[&str] = &[
    "NotFound",
    "NoSuchBucket",
    "NoSuchKey",
    "NoSuchDistribution",
    "NoSuchInvalidation",
    "NoSuchOriginAccessControl",
    "NoSuchResource",
    "NoSuchHostedZone",
    "ResourceNotFoundException",
];

const CONFLICT_CODES: &[&str] = &[
    "BucketAlreadyOwnedByYou",
    "PreconditionFailed",
    "InvalidIfMatchVersion",
    "OriginAccessControlAlreadyExists",
    "HostedZoneAlreadyExists",
];

const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "InvalidClientTokenId",
    "ExpiredToken",
    "SignatureDoesNotMatch",
];

/// Provider failure stripped of SDK types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: Option<String>,
    pub message: String,
    pub status: Option<u16>,
    /// Never reached the service or got no parsable response
    pub transport: bool,
}

impl Failure {
    pub fn from_sdk<E>(err: SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let status = err.raw_response().map(|r| r.status().as_u16());
        let transport = matches!(
            err,
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
        );
        let code = err.code().map(str::to_string);
        let message = err
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
        Self {
            code,
            message,
            status,
            transport,
        }
    }

    fn code_in(&self, codes: &[&str]) -> bool {
        self.code.as_deref().is_some_and(|c| codes.contains(&c))
    }

    fn describe(&self) -> String {
        match &self.code {
            Some(code) => format!("{}: {}", code, self.message),
            None => self.message.clone(),
        }
    }
}

/// The operation that failed, used for messages and IAM hints
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    pub name: &'static str,
    /// IAM action that grants it
    pub permission: &'static str,
}

impl Operation {
    pub const fn new(name: &'static str, permission: &'static str) -> Self {
        Self { name, permission }
    }
}

/// Map a failure onto the engine's error kinds
pub fn classify(op: Operation, target: &str, failure: Failure) -> CloudError {
    let context = format!("{} {}: {}", op.name, target, failure.describe());

    if failure.transport
        || failure.code_in(TRANSIENT_CODES)
        || matches!(failure.status, Some(429 | 500 | 502 | 503 | 504))
    {
        return CloudError::Transient(context);
    }

    if failure.code.as_deref() == Some("BucketAlreadyExists") {
        return CloudError::BucketNameTaken(target.to_string());
    }

    if failure.code_in(CONFLICT_CODES) {
        return CloudError::ResourceAlreadyExists(context);
    }

    if failure.code_in(NOT_FOUND_CODES) || (failure.code.is_none() && failure.status == Some(404))
    {
        return CloudError::ResourceNotFound(context);
    }

    if failure.code_in(ACCESS_DENIED_CODES) || failure.status == Some(403) {
        return CloudError::AccessDenied {
            message: context,
            permission: op.permission.to_string(),
        };
    }

    if is_price_class_rejection(&failure) {
        return CloudError::PriceClassRestricted(failure.describe());
    }

    CloudError::ApiError(context)
}

/// CloudFront refuses price class changes the account's pricing plan does not allow
fn is_price_class_rejection(failure: &Failure) -> bool {
    let message = failure.message.to_ascii_lowercase();
    failure.code_in(&["InvalidArgument", "IllegalUpdate", "InvalidRequest"])
        && message.contains("price")
        && (message.contains("class") || message.contains("plan"))
}

/// Shorthand for `map_err` at call sites
pub fn sdk<E>(op: Operation, target: &str) -> impl FnOnce(SdkError<E, HttpResponse>) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let target = target.to_string();
    move |err| classify(op, &target, Failure::from_sdk(err))
}

/// A request that could not be built locally
pub fn build_error(what: &str, err: impl std::fmt::Display) -> CloudError {
    CloudError::InvalidConfig(format!("invalid {} request: {}", what, err))
}

/// A response missing a field the service always returns
pub fn missing(op: Operation, field: &str) -> CloudError {
    CloudError::ApiError(format!("{} response is missing `{}`", op.name, field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteflow_cloud::ErrorKind;

    const OP: Operation = Operation::new("create bucket", "s3:CreateBucket");

    fn failure(code: Option<&str>, message: &str, status: Option<u16>) -> Failure {
        Failure {
            code: code.map(str::to_string),
            message: message.to_string(),
            status,
            transport: false,
        }
    }

    #[test]
    fn test_throttling_is_transient() {
        let err = classify(OP, "site", failure(Some("SlowDown"), "reduce rate", Some(503)));
        assert_eq!(err.kind(), ErrorKind::Transient);

        let err = classify(OP, "site", failure(None, "bad gateway", Some(502)));
        assert_eq!(err.kind(), ErrorKind::Transient);

        let mut dropped = failure(None, "connection reset", None);
        dropped.transport = true;
        assert_eq!(classify(OP, "site", dropped).kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_bucket_ownership_codes() {
        let err = classify(OP, "site", failure(Some("BucketAlreadyOwnedByYou"), "", Some(409)));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = classify(OP, "site", failure(Some("BucketAlreadyExists"), "", Some(409)));
        assert!(matches!(err, CloudError::BucketNameTaken(ref b) if b == "site"));
    }

    #[test]
    fn test_not_found() {
        let err = classify(OP, "site", failure(Some("NoSuchBucket"), "", Some(404)));
        assert!(err.is_not_found());

        // HEAD responses carry no body and therefore no code
        let err = classify(OP, "site", failure(None, "", Some(404)));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_access_denied_names_permission() {
        let err = classify(OP, "site", failure(Some("AccessDenied"), "nope", Some(403)));
        match err {
            CloudError::AccessDenied { permission, .. } => assert_eq!(permission, "s3:CreateBucket"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_price_class_rejection() {
        let err = classify(
            Operation::new("update distribution", "cloudfront:UpdateDistribution"),
            "E1",
            failure(
                Some("InvalidArgument"),
                "The PriceClass is not supported by your pricing plan",
                Some(400),
            ),
        );
        assert!(matches!(err, CloudError::PriceClassRestricted(_)));

        let err = classify(OP, "site", failure(Some("InvalidArgument"), "bad origin", Some(400)));
        assert!(matches!(err, CloudError::ApiError(_)));
    }

    #[test]
    fn test_stale_etag_is_conflict() {
        let err = classify(OP, "E1", failure(Some("PreconditionFailed"), "", Some(412)));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
