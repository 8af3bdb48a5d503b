//! Error taxonomy for switchyard.
//!
//! - [`BackendError`]: raw failure raised by a provider implementation.
//! - [`ErrorRecord`]: one classified attempt failure (category, severity,
//!   retry/fallback flags). Created once per failed attempt, never mutated.
//! - [`RouterError`]: terminal outcome of a request, always carrying every
//!   record collected along the way.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Fixed error category taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Connection,
    Authentication,
    RateLimit,
    QuotaExceeded,
    Validation,
    Timeout,
    ContextOverflow,
    /// Backend/model-side failure (5xx, overloaded, model error).
    Provider,
    Configuration,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 10] = [
        ErrorCategory::Connection,
        ErrorCategory::Authentication,
        ErrorCategory::RateLimit,
        ErrorCategory::QuotaExceeded,
        ErrorCategory::Validation,
        ErrorCategory::Timeout,
        ErrorCategory::ContextOverflow,
        ErrorCategory::Provider,
        ErrorCategory::Configuration,
        ErrorCategory::Unknown,
    ];

    /// Default severity of this category.
    pub fn severity(self) -> ErrorSeverity {
        match self {
            ErrorCategory::Connection
            | ErrorCategory::Authentication
            | ErrorCategory::QuotaExceeded
            | ErrorCategory::Provider
            | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::RateLimit
            | ErrorCategory::Validation
            | ErrorCategory::Timeout
            | ErrorCategory::ContextOverflow
            | ErrorCategory::Unknown => ErrorSeverity::Medium,
        }
    }

    /// Whether retrying the same provider can help.
    ///
    /// Context overflow is not retryable as-is: the message list must be
    /// truncated first.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::Connection
                | ErrorCategory::RateLimit
                | ErrorCategory::Timeout
                | ErrorCategory::Provider
                | ErrorCategory::Unknown
        )
    }

    /// Whether moving to another provider can help.
    ///
    /// Validation errors are caller input errors and fail everywhere.
    pub fn allows_fallback(self) -> bool {
        !matches!(self, ErrorCategory::Validation)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Connection => "connection",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::QuotaExceeded => "quota_exceeded",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::ContextOverflow => "context_overflow",
            ErrorCategory::Provider => "provider",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCategory::ALL
            .into_iter()
            .find(|c| c.to_string() == s.to_lowercase())
            .ok_or_else(|| format!("invalid error category: '{s}'"))
    }
}

/// How bad an error is. Ordered: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "low"),
            ErrorSeverity::Medium => write!(f, "medium"),
            ErrorSeverity::High => write!(f, "high"),
            ErrorSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// A classified failure of one attempt.
///
/// Severity and the retry/fallback flags are fixed by the category at
/// construction and cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("[{category}] {message}")]
pub struct ErrorRecord {
    category: ErrorCategory,
    severity: ErrorSeverity,
    message: String,
    #[serde(default)]
    details: BTreeMap<String, Value>,
    retryable: bool,
    fallback_allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attempt: Option<u32>,
    /// Display text of the wrapped original error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cause: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            severity: category.severity(),
            message: message.into(),
            details: BTreeMap::new(),
            retryable: category.is_retryable(),
            fallback_allowed: category.allows_fallback(),
            provider: None,
            attempt: None,
            cause: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &BTreeMap<String, Value> {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn allows_fallback(&self) -> bool {
        self.fallback_allowed
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn attempt(&self) -> Option<u32> {
        self.attempt
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Raw failure raised by a provider implementation.
///
/// Typed variants are classified directly; `Http` and `Other` fall back to
/// status-code and keyword heuristics. `Classified` passes through untouched.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("context length exceeded: max {max}, requested {requested}")]
    ContextLengthExceeded { max: u32, requested: u32 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Classified(ErrorRecord),
}

fn summarize(errors: &[ErrorRecord]) -> String {
    match errors.last() {
        Some(last) => format!("{} error(s), last: {last}", errors.len()),
        None => "no attempts were made".to_string(),
    }
}

/// Terminal outcome of an inference request.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Malformed request; surfaced immediately, never retried or failed over.
    #[error("invalid request: {record}")]
    Validation { record: ErrorRecord },

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("no eligible provider available ({})", summarize(.errors))]
    NoProviderAvailable { errors: Vec<ErrorRecord> },

    #[error("request aborted on '{provider}' ({})", summarize(.errors))]
    Aborted {
        provider: String,
        errors: Vec<ErrorRecord>,
    },

    #[error("request deadline exceeded after {elapsed_ms}ms ({})", summarize(.errors))]
    DeadlineExceeded {
        elapsed_ms: u64,
        errors: Vec<ErrorRecord>,
    },

    #[error("all providers failed ({})", summarize(.errors))]
    Exhausted { errors: Vec<ErrorRecord> },
}

impl RouterError {
    /// Every attempt record collected before the request failed.
    pub fn records(&self) -> &[ErrorRecord] {
        match self {
            RouterError::Validation { record } => std::slice::from_ref(record),
            RouterError::UnknownProvider(_) => &[],
            RouterError::NoProviderAvailable { errors }
            | RouterError::Aborted { errors, .. }
            | RouterError::DeadlineExceeded { errors, .. }
            | RouterError::Exhausted { errors } => errors,
        }
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors from snapshot repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("entity not found")]
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_defaults_match_taxonomy() {
        use ErrorCategory::*;
        let expected = [
            (Connection, ErrorSeverity::High, true, true),
            (Authentication, ErrorSeverity::High, false, true),
            (RateLimit, ErrorSeverity::Medium, true, true),
            (QuotaExceeded, ErrorSeverity::High, false, true),
            (Validation, ErrorSeverity::Medium, false, false),
            (Timeout, ErrorSeverity::Medium, true, true),
            (ContextOverflow, ErrorSeverity::Medium, false, true),
            (Provider, ErrorSeverity::High, true, true),
            (Configuration, ErrorSeverity::High, false, true),
            (Unknown, ErrorSeverity::Medium, true, true),
        ];
        for (category, severity, retry, fallback) in expected {
            assert_eq!(category.severity(), severity, "{category}");
            assert_eq!(category.is_retryable(), retry, "{category}");
            assert_eq!(category.allows_fallback(), fallback, "{category}");
        }
    }

    #[test]
    fn test_record_flags_follow_category() {
        let record = ErrorRecord::new(ErrorCategory::Authentication, "bad key")
            .with_provider("openai")
            .with_attempt(1)
            .with_detail("status", 401);
        assert!(!record.is_retryable());
        assert!(record.allows_fallback());
        assert_eq!(record.severity(), ErrorSeverity::High);
        assert_eq!(record.provider(), Some("openai"));
        assert_eq!(record.detail("status"), Some(&Value::from(401)));
        assert_eq!(record.to_string(), "[authentication] bad key");
    }

    #[test]
    fn test_category_roundtrip() {
        for category in ErrorCategory::ALL {
            let parsed: ErrorCategory = category.to_string().parse().unwrap();
            assert_eq!(parsed, category);
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Low < ErrorSeverity::Medium);
        assert!(ErrorSeverity::High < ErrorSeverity::Critical);
    }

    #[test]
    fn test_router_error_carries_records() {
        let errors = vec![
            ErrorRecord::new(ErrorCategory::Connection, "refused").with_provider("a"),
            ErrorRecord::new(ErrorCategory::Timeout, "slow").with_provider("b"),
        ];
        let err = RouterError::Exhausted { errors };
        assert_eq!(err.records().len(), 2);
        let text = err.to_string();
        assert!(text.contains("2 error(s)"));
        assert!(text.contains("slow"));
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::ContextLengthExceeded {
            max: 8_192,
            requested: 9_000,
        };
        assert!(err.to_string().contains("8192"));
        let wrapped = BackendError::Classified(ErrorRecord::new(ErrorCategory::Validation, "nope"));
        assert_eq!(wrapped.to_string(), "[validation] nope");
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let record = ErrorRecord::new(ErrorCategory::RateLimit, "slow down")
            .with_detail("retry_after_ms", 1500);
        let json = serde_json::to_string(&record).unwrap();
        let parsed: ErrorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
