// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::delivery::transport::TransportError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// The provider asks us to slow down.
    Throttle,
    /// Retrying the same message will not help.
    Permanent,
    /// Timeouts, dropped connections and temporary server errors.
    Transient,
}

pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &TransportError) -> ErrorClass;
}

const THROTTLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ServiceUnavailable",
    "SlowDown",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "MaxSendingRateExceeded",
    "421",
];

const THROTTLE_PATTERNS: &[&str] = &[
    "too many requests",
    "quota exceeded",
    "service unavailable",
    "slow down",
    "rate exceeded",
    "throttl",
    "maximum sending rate",
    "rate limit",
];

const TRANSIENT_CODES: &[&str] = &[
    "450",
    "451",
    "452",
    // std::io::ErrorKind names
    "ConnectionReset",
    "ConnectionAborted",
    "ConnectionRefused",
    "BrokenPipe",
    "UnexpectedEof",
    "TimedOut",
    // connection pool errors
    "SmtpConnectionFailed",
    "ConnectionPoolTimeout",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection closed",
    "broken pipe",
];

/// Case-insensitive matching of provider codes and message fragments.
/// False negatives are expected for unknown provider error shapes; those
/// fall through to `Permanent`.
#[derive(Clone, Debug)]
pub struct PatternClassifier {
    throttle_codes: Vec<String>,
    throttle_patterns: Vec<String>,
    transient_codes: Vec<String>,
    transient_patterns: Vec<String>,
}

impl Default for PatternClassifier {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_lowercase()).collect();
        Self {
            throttle_codes: owned(THROTTLE_CODES),
            throttle_patterns: owned(THROTTLE_PATTERNS),
            transient_codes: owned(TRANSIENT_CODES),
            transient_patterns: owned(TRANSIENT_PATTERNS),
        }
    }
}

impl PatternClassifier {
    pub fn with_throttle_code(mut self, code: &str) -> Self {
        self.throttle_codes.push(code.to_lowercase());
        self
    }

    pub fn with_throttle_pattern(mut self, pattern: &str) -> Self {
        self.throttle_patterns.push(pattern.to_lowercase());
        self
    }

    fn matches(code: Option<&str>, message: &str, codes: &[String], patterns: &[String]) -> bool {
        if let Some(code) = code {
            if codes.iter().any(|c| c == code) {
                return true;
            }
            if patterns.iter().any(|p| code.contains(p.as_str())) {
                return true;
            }
        }
        patterns.iter().any(|p| message.contains(p.as_str()))
    }
}

impl ErrorClassifier for PatternClassifier {
    fn classify(&self, error: &TransportError) -> ErrorClass {
        if error.timed_out {
            return ErrorClass::Transient;
        }
        let code = error.code.as_deref().map(|c| c.trim().to_lowercase());
        let message = error.message.to_lowercase();

        if Self::matches(
            code.as_deref(),
            &message,
            &self.throttle_codes,
            &self.throttle_patterns,
        ) {
            return ErrorClass::Throttle;
        }
        if Self::matches(
            code.as_deref(),
            &message,
            &self.transient_codes,
            &self.transient_patterns,
        ) {
            return ErrorClass::Transient;
        }
        ErrorClass::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(code: Option<&str>, message: &str) -> TransportError {
        TransportError {
            code: code.map(str::to_string),
            message: message.to_string(),
            timed_out: false,
        }
    }

    #[test]
    fn provider_codes_and_text_are_throttles() {
        let classifier = PatternClassifier::default();
        for error in [
            err(Some("Throttling"), "Rate exceeded"),
            err(Some("THROTTLINGEXCEPTION"), ""),
            err(Some("421"), "4.7.0 Try again later"),
            err(None, "Maximum sending rate exceeded."),
            err(None, "HTTP 429: Too Many Requests"),
            err(Some("550"), "Daily Quota Exceeded for account"),
            err(None, "Service Unavailable"),
        ] {
            assert_eq!(classifier.classify(&error), ErrorClass::Throttle, "{:?}", error);
        }
    }

    #[test]
    fn timeouts_and_temporary_codes_are_transient() {
        let classifier = PatternClassifier::default();
        let mut timeout = err(None, "whatever");
        timeout.timed_out = true;
        assert_eq!(classifier.classify(&timeout), ErrorClass::Transient);
        assert_eq!(
            classifier.classify(&err(None, "Connection reset by peer")),
            ErrorClass::Transient
        );
        assert_eq!(
            classifier.classify(&err(Some("451"), "4.3.0 Mail server temporarily rejected")),
            ErrorClass::Transient
        );
    }

    #[test]
    fn everything_else_is_permanent() {
        let classifier = PatternClassifier::default();
        assert_eq!(
            classifier.classify(&err(Some("550"), "5.1.1 mailbox unavailable")),
            ErrorClass::Permanent
        );
        assert_eq!(
            classifier.classify(&err(Some("MessageRejected"), "Email address is not verified")),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn custom_rules_extend_the_defaults() {
        let classifier = PatternClassifier::default()
            .with_throttle_code("554")
            .with_throttle_pattern("back off");
        assert_eq!(
            classifier.classify(&err(Some("554"), "transaction failed")),
            ErrorClass::Throttle
        );
        assert_eq!(
            classifier.classify(&err(None, "please BACK OFF for a while")),
            ErrorClass::Throttle
        );
    }
}
