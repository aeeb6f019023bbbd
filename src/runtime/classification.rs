// src/runtime/classification.rs
//! Failure classification
//!
//! Maps what went wrong to a `FailureKind`, a severity, a retry decision, and
//! a non-technical message for the tenant. Every user-visible failure is
//! paired with a support code of the form `KIND-AGENT-SUFFIX`, e.g.
//! `EXEC-DATA_AGENT-3F9A1C`.

use crate::agents::AgentError;
use crate::model::FailureKind;
use rand::Rng;
use serde::Serialize;

/// How bad a failure is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Result of classifying one failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: FailureKind,
    pub severity: Severity,
    pub retryable: bool,
    pub user_message: &'static str,
}

/// Classify an error raised by an agent
pub fn classify_agent_error(error: &AgentError) -> Classification {
    match error {
        AgentError::Execution(_) => Classification {
            kind: FailureKind::Execution,
            severity: Severity::Medium,
            retryable: true,
            user_message: user_message(FailureKind::Execution),
        },
        AgentError::Tool { .. } => Classification {
            kind: FailureKind::Execution,
            severity: Severity::Medium,
            retryable: true,
            user_message: "One of the tools the assistant relies on did not respond as expected. Please try again.",
        },
        AgentError::Llm(_) => Classification {
            kind: FailureKind::Execution,
            severity: Severity::High,
            retryable: true,
            user_message: "The assistant could not generate a response right now. Please try again shortly.",
        },
        AgentError::Network(_) => Classification {
            kind: FailureKind::Execution,
            severity: Severity::Medium,
            retryable: true,
            user_message: "The assistant had trouble reaching a required service. Please try again.",
        },
        AgentError::InvalidInput(_) => Classification {
            kind: FailureKind::Execution,
            severity: Severity::Low,
            retryable: false,
            user_message: "The request could not be processed as written. Please rephrase and try again.",
        },
        AgentError::Panicked(_) => Classification {
            kind: FailureKind::Execution,
            severity: Severity::High,
            retryable: true,
            user_message: user_message(FailureKind::Execution),
        },
        AgentError::ResourceExhausted(_) | AgentError::System(_) => Classification {
            kind: FailureKind::System,
            severity: Severity::Critical,
            retryable: false,
            user_message: user_message(FailureKind::System),
        },
    }
}

/// Classification for failures that do not come from an agent error
pub fn classify_kind(kind: FailureKind) -> Classification {
    let severity = match kind {
        FailureKind::Validation => Severity::Low,
        FailureKind::NotFound => Severity::Medium,
        FailureKind::Execution => Severity::Medium,
        FailureKind::Timeout => Severity::High,
        FailureKind::SilentDeath | FailureKind::Dead => Severity::High,
        FailureKind::System => Severity::Critical,
    };
    Classification {
        kind,
        severity,
        retryable: false,
        user_message: user_message(kind),
    }
}

/// Default non-technical message per failure kind
pub fn user_message(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Validation => "The request could not be accepted. Please refresh and try again.",
        FailureKind::NotFound => "The requested assistant is not available right now.",
        FailureKind::Execution => "Something went wrong while working on your request. Please try again.",
        FailureKind::Timeout => "This is taking longer than expected, so the request was stopped. Please try again.",
        FailureKind::SilentDeath => "The assistant stopped without producing a result. Please try again.",
        FailureKind::Dead => "The assistant stopped responding and was shut down. Please try again.",
        FailureKind::System => "We are experiencing a temporary system problem. Please try again later.",
    }
}

/// Build an opaque support code: `KIND-AGENT-SUFFIX`
pub fn support_code(kind: FailureKind, agent_name: &str) -> String {
    let agent: String = agent_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .take(24)
        .collect();
    let agent = if agent.is_empty() { "UNKNOWN".to_string() } else { agent };
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("{}-{}-{:06X}", kind.code(), agent, suffix)
}

/// Exponential backoff: `base * 2^retry_count`
pub fn backoff_delay(base: std::time::Duration, retry_count: u32) -> std::time::Duration {
    base.saturating_mul(2u32.saturating_pow(retry_count.min(16)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_execution_errors_retry() {
        let c = classify_agent_error(&AgentError::Network("reset".into()));
        assert_eq!(c.kind, FailureKind::Execution);
        assert!(c.retryable);
    }

    #[test]
    fn test_system_errors_are_critical_and_final() {
        for err in [
            AgentError::System("disk".into()),
            AgentError::ResourceExhausted("memory".into()),
        ] {
            let c = classify_agent_error(&err);
            assert_eq!(c.kind, FailureKind::System);
            assert_eq!(c.severity, Severity::Critical);
            assert!(!c.retryable);
        }
    }

    #[test]
    fn test_messages_do_not_leak_internals() {
        let c = classify_agent_error(&AgentError::Llm("HTTP 500 from upstream at 10.0.0.3".into()));
        assert!(!c.user_message.contains("10.0.0.3"));
        assert!(!c.user_message.contains("500"));
    }

    #[test]
    fn test_support_code_format() {
        let code = support_code(FailureKind::Execution, "data-agent v2");
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "EXEC");
        assert_eq!(parts[1], "DATA_AGENT_V2");
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));

        assert!(support_code(FailureKind::Timeout, "").starts_with("TMO-UNKNOWN-"));
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
    }
}
