//! Error classification.
//!
//! Typed first: `BackendError` variants that already say what went wrong map
//! straight to a category, HTTP statuses map by code. Free text falls back to
//! keyword matching in a fixed precedence order, defaulting to `Unknown`.
//! Every failed attempt is classified exactly once.

use switchyard_types::error::{BackendError, ErrorCategory, ErrorRecord};

// Context overflow first: "request too large" style messages overlap with
// validation wording.
const CONTEXT_OVERFLOW_PATTERNS: &[&str] = &[
    "context length",
    "context_length",
    "context window",
    "maximum context",
    "too many tokens",
    "token limit",
    "prompt is too long",
    "request too large",
];

const RATE_LIMIT_PATTERNS: &[&str] = &[
    "429",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
];

const AUTHENTICATION_PATTERNS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "invalid api key",
    "invalid_api_key",
    "authentication",
    "permission denied",
];

const QUOTA_PATTERNS: &[&str] = &[
    "quota",
    "insufficient_quota",
    "billing",
    "usage limit",
    "credit",
];

const TIMEOUT_PATTERNS: &[&str] = &["timed out", "timeout", "deadline exceeded"];

const CONNECTION_PATTERNS: &[&str] = &[
    "connection",
    "connect error",
    "network",
    "dns",
    "unreachable",
    "broken pipe",
    "reset by peer",
];

const CONFIGURATION_PATTERNS: &[&str] = &[
    "model not found",
    "unknown model",
    "not configured",
    "missing api key",
    "no such model",
];

const VALIDATION_PATTERNS: &[&str] = &[
    "400",
    "bad request",
    "invalid_request",
    "invalid request",
    "validation",
    "must be",
];

const PROVIDER_PATTERNS: &[&str] = &[
    "500",
    "502",
    "503",
    "504",
    "internal server error",
    "bad gateway",
    "service unavailable",
    "overloaded",
    "model error",
];

/// Keyword sets in precedence order.
const KEYWORD_RULES: &[(ErrorCategory, &[&str])] = &[
    (ErrorCategory::ContextOverflow, CONTEXT_OVERFLOW_PATTERNS),
    (ErrorCategory::RateLimit, RATE_LIMIT_PATTERNS),
    (ErrorCategory::Authentication, AUTHENTICATION_PATTERNS),
    (ErrorCategory::QuotaExceeded, QUOTA_PATTERNS),
    (ErrorCategory::Timeout, TIMEOUT_PATTERNS),
    (ErrorCategory::Connection, CONNECTION_PATTERNS),
    (ErrorCategory::Configuration, CONFIGURATION_PATTERNS),
    (ErrorCategory::Validation, VALIDATION_PATTERNS),
    (ErrorCategory::Provider, PROVIDER_PATTERNS),
];

/// Match free text against the keyword sets.
pub fn classify_message(message: &str) -> ErrorCategory {
    let lowered = message.to_lowercase();
    KEYWORD_RULES
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lowered.contains(p)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Map an HTTP status code to a category.
pub fn classify_status(status: u16) -> ErrorCategory {
    match status {
        400 | 422 => ErrorCategory::Validation,
        401 | 403 => ErrorCategory::Authentication,
        402 => ErrorCategory::QuotaExceeded,
        404 => ErrorCategory::Configuration,
        408 | 504 => ErrorCategory::Timeout,
        413 => ErrorCategory::ContextOverflow,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::Provider,
        _ => ErrorCategory::Unknown,
    }
}

/// Classify one failed attempt against `provider`.
pub fn classify(error: &BackendError, provider: &str, attempt: u32) -> ErrorRecord {
    let record = match error {
        BackendError::Classified(record) => {
            let mut record = record.clone();
            if record.provider().is_none() {
                record = record.with_provider(provider);
            }
            if record.attempt().is_none() {
                record = record.with_attempt(attempt);
            }
            return record;
        }
        BackendError::Connection(_) => ErrorRecord::new(ErrorCategory::Connection, error.to_string()),
        BackendError::Authentication(_) => {
            ErrorRecord::new(ErrorCategory::Authentication, error.to_string())
        }
        BackendError::RateLimited { retry_after_ms } => {
            let record = ErrorRecord::new(ErrorCategory::RateLimit, error.to_string());
            match retry_after_ms {
                Some(ms) => record.with_detail("retry_after_ms", *ms),
                None => record,
            }
        }
        BackendError::QuotaExceeded(_) => {
            ErrorRecord::new(ErrorCategory::QuotaExceeded, error.to_string())
        }
        BackendError::Timeout { elapsed_ms } => {
            ErrorRecord::new(ErrorCategory::Timeout, error.to_string())
                .with_detail("elapsed_ms", *elapsed_ms)
        }
        BackendError::ContextLengthExceeded { max, requested } => {
            ErrorRecord::new(ErrorCategory::ContextOverflow, error.to_string())
                .with_detail("max_tokens", *max)
                .with_detail("requested_tokens", *requested)
        }
        BackendError::InvalidRequest(message) => {
            // Backends often report context overflow as a plain 400.
            let category = match classify_message(message) {
                ErrorCategory::ContextOverflow => ErrorCategory::ContextOverflow,
                _ => ErrorCategory::Validation,
            };
            ErrorRecord::new(category, error.to_string())
        }
        BackendError::Http { status, body } => {
            let category = match classify_message(body) {
                ErrorCategory::Unknown => classify_status(*status),
                // Status codes in a body are weaker evidence than the status itself.
                ErrorCategory::Validation | ErrorCategory::Provider => classify_status(*status),
                keyword => keyword,
            };
            ErrorRecord::new(category, error.to_string()).with_detail("status", *status)
        }
        BackendError::Other(message) => ErrorRecord::new(classify_message(message), message.clone()),
    };

    record
        .with_provider(provider)
        .with_attempt(attempt)
        .with_cause(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn category(error: BackendError) -> ErrorCategory {
        classify(&error, "p", 1).category()
    }

    #[test]
    fn test_typed_variants_map_directly() {
        assert_eq!(category(BackendError::Connection("refused".into())), ErrorCategory::Connection);
        assert_eq!(
            category(BackendError::Authentication("bad key".into())),
            ErrorCategory::Authentication
        );
        assert_eq!(
            category(BackendError::QuotaExceeded("out of credit".into())),
            ErrorCategory::QuotaExceeded
        );
        assert_eq!(
            category(BackendError::Timeout { elapsed_ms: 30_000 }),
            ErrorCategory::Timeout
        );
        assert_eq!(
            category(BackendError::ContextLengthExceeded {
                max: 4_096,
                requested: 5_000
            }),
            ErrorCategory::ContextOverflow
        );
        assert_eq!(
            category(BackendError::InvalidRequest("temperature must be <= 2".into())),
            ErrorCategory::Validation
        );
    }

    #[test]
    fn test_rate_limit_keeps_retry_after() {
        let record = classify(
            &BackendError::RateLimited {
                retry_after_ms: Some(2_500),
            },
            "openai",
            2,
        );
        assert_eq!(record.category(), ErrorCategory::RateLimit);
        assert_eq!(record.detail("retry_after_ms"), Some(&json!(2_500)));
        assert_eq!(record.provider(), Some("openai"));
        assert_eq!(record.attempt(), Some(2));
        assert!(record.cause().is_some());
    }

    #[test]
    fn test_http_status_mapping() {
        let http = |status| BackendError::Http {
            status,
            body: String::new(),
        };
        assert_eq!(category(http(401)), ErrorCategory::Authentication);
        assert_eq!(category(http(429)), ErrorCategory::RateLimit);
        assert_eq!(category(http(503)), ErrorCategory::Provider);
        assert_eq!(category(http(404)), ErrorCategory::Configuration);
        assert_eq!(category(http(400)), ErrorCategory::Validation);
        assert_eq!(category(http(418)), ErrorCategory::Unknown);
    }

    #[test]
    fn test_http_body_overrides_generic_status() {
        let err = BackendError::Http {
            status: 400,
            body: "This model's maximum context length is 8192 tokens".into(),
        };
        assert_eq!(category(err), ErrorCategory::ContextOverflow);

        let quota = BackendError::Http {
            status: 429,
            body: "You exceeded your current quota".into(),
        };
        assert_eq!(category(quota), ErrorCategory::QuotaExceeded);
    }

    #[test]
    fn test_keyword_precedence() {
        assert_eq!(
            classify_message("request too large: context window exceeded (400)"),
            ErrorCategory::ContextOverflow
        );
        assert_eq!(
            classify_message("429 Too Many Requests"),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            classify_message("Unauthorized: invalid api key"),
            ErrorCategory::Authentication
        );
        assert_eq!(classify_message("operation timed out"), ErrorCategory::Timeout);
        assert_eq!(
            classify_message("connection refused"),
            ErrorCategory::Connection
        );
        assert_eq!(classify_message("model not found"), ErrorCategory::Configuration);
        assert_eq!(classify_message("server overloaded"), ErrorCategory::Provider);
        assert_eq!(classify_message("something odd"), ErrorCategory::Unknown);
    }

    #[test]
    fn test_classified_passes_through() {
        let original = ErrorRecord::new(ErrorCategory::Configuration, "no base url");
        let record = classify(&BackendError::Classified(original.clone()), "p", 3);
        assert_eq!(record.category(), ErrorCategory::Configuration);
        assert_eq!(record.message(), "no base url");
        assert_eq!(record.provider(), Some("p"));
        assert_eq!(record.attempt(), Some(3));
    }
}
