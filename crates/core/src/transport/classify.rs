//! Classification of GraphQL `errors` arrays
//!
//! A response can carry `data` and `errors` together. Only codes on the
//! informational allow-list are tolerated alongside data; any other entry
//! fails the call. The failure class is picked in order: unauthorized,
//! throttled, transient (every failing entry has a transient code), fatal.

use std::collections::HashSet;

use crawlsync_domain::{GraphqlError, TransportConfig};

use crate::errors::TransportError;

/// What a response's error list means for the call.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorVerdict {
    /// No errors
    Clean,
    /// Only informational errors, and data is present
    Warnings(Vec<GraphqlError>),
    Fail(TransportError),
}

#[derive(Debug, Clone, Default)]
pub struct ErrorPolicy {
    informational: HashSet<String>,
    transient: HashSet<String>,
    throttle: HashSet<String>,
    unauthorized: HashSet<String>,
    unauthorized_patterns: Vec<String>,
}

impl ErrorPolicy {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            informational: code_set(&config.informational_codes),
            transient: code_set(&config.transient_codes),
            throttle: code_set(&config.throttle_codes),
            unauthorized: code_set(&config.unauthorized_codes),
            unauthorized_patterns: config
                .unauthorized_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    /// Whether `error` means the credential was rejected
    pub fn is_unauthorized(&self, error: &GraphqlError) -> bool {
        if code_in(error, &self.unauthorized) {
            return true;
        }
        let message = error.message.to_lowercase();
        self.unauthorized_patterns.iter().any(|p| message.contains(p.as_str()))
    }

    /// Classify `errors`; `has_data` says whether the response carried a
    /// non-null `data` object.
    pub fn classify(&self, errors: &[GraphqlError], has_data: bool) -> ErrorVerdict {
        if errors.is_empty() {
            return ErrorVerdict::Clean;
        }

        if let Some(err) = errors.iter().find(|e| self.is_unauthorized(e)) {
            return ErrorVerdict::Fail(TransportError::unauthorized(err.message.clone()));
        }

        let failing: Vec<GraphqlError> =
            errors.iter().filter(|e| !code_in(e, &self.informational)).cloned().collect();

        if failing.is_empty() {
            if has_data {
                return ErrorVerdict::Warnings(errors.to_vec());
            }
            return ErrorVerdict::Fail(TransportError::GraphQl {
                errors: errors.to_vec(),
                retryable: false,
            });
        }

        if failing.iter().any(|e| code_in(e, &self.throttle)) {
            return ErrorVerdict::Fail(TransportError::Throttled { retry_after: None });
        }

        let retryable = failing.iter().all(|e| code_in(e, &self.transient));
        ErrorVerdict::Fail(TransportError::GraphQl { errors: failing, retryable })
    }
}

fn code_set(codes: &[String]) -> HashSet<String> {
    codes.iter().map(|c| c.to_ascii_uppercase()).collect()
}

fn code_in(error: &GraphqlError, codes: &HashSet<String>) -> bool {
    error.code().is_some_and(|code| codes.contains(&code.to_ascii_uppercase()))
}
