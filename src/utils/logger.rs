//! Structured logging helpers shared by the studio, the API clients and the
//! media layer.
//!
//! User-visible operations are logged at `info` with their timing; failures
//! go to `error` together with their context.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

/// Structured log event types
#[derive(Debug, Clone, Serialize)]
pub enum LogEvent {
    Operation {
        name: String,
        phase: OperationPhase,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<LogContext>,
    },
    Network {
        operation: String,
        status: NetworkStatus,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<NetworkDetails>,
    },
    Playback {
        resource: String,
        action: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub enum OperationPhase {
    Start,
    Complete { duration_ms: u64 },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct LogContext {
    #[serde(flatten)]
    pub fields: HashMap<String, String>,
}

impl LogContext {
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum NetworkStatus {
    Success,
    RateLimited,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkDetails {
    pub endpoint: String,
    pub method: String,
    pub status_code: Option<u16>,
}

pub fn log_event(event: LogEvent) {
    match event {
        LogEvent::Operation {
            name,
            phase,
            context,
        } => {
            let ctx_str = context
                .map(|c| format!(" | {:?}", c.fields))
                .unwrap_or_default();
            match phase {
                OperationPhase::Start => {
                    log::info!("🚀 {} STARTING{}", name, ctx_str);
                }
                OperationPhase::Complete { duration_ms } => {
                    log::info!("✅ {} COMPLETE in {}ms{}", name, duration_ms, ctx_str);
                }
                OperationPhase::Failed { error } => {
                    log::error!("❌ {} FAILED: {}{}", name, error, ctx_str);
                }
            }
        }
        LogEvent::Network {
            operation,
            status,
            duration_ms,
            details,
        } => {
            let detail_str = details
                .map(|d| {
                    let code = d
                        .status_code
                        .map(|c| format!(" -> {}", c))
                        .unwrap_or_default();
                    format!(" | {} {}{}", d.method, d.endpoint, code)
                })
                .unwrap_or_default();
            match status {
                NetworkStatus::Success => {
                    log::info!("🌐 {} SUCCESS in {}ms{}", operation, duration_ms, detail_str);
                }
                NetworkStatus::RateLimited => {
                    log::warn!("⚠️ {} RATE LIMITED{}", operation, detail_str);
                }
                NetworkStatus::Failed { error } => {
                    log::error!("❌ {} FAILED: {}{}", operation, error, detail_str);
                }
            }
        }
        LogEvent::Playback { resource, action } => {
            log::debug!("🎵 {} | {}", action, resource);
        }
    }
}

/// Log an operation start
pub fn log_start(name: &str, context: Option<LogContext>) {
    log_event(LogEvent::Operation {
        name: name.to_string(),
        phase: OperationPhase::Start,
        context,
    });
}

/// Log an operation completion measured from `started`
pub fn log_complete(name: &str, started: Instant) {
    log_event(LogEvent::Operation {
        name: name.to_string(),
        phase: OperationPhase::Complete {
            duration_ms: started.elapsed().as_millis() as u64,
        },
        context: None,
    });
}

/// Log an operation failure
pub fn log_failed(name: &str, error: &str, context: Option<LogContext>) {
    log_event(LogEvent::Operation {
        name: name.to_string(),
        phase: OperationPhase::Failed {
            error: error.to_string(),
        },
        context,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_builder() {
        let ctx = LogContext::new().with("voice", "aria-01").with("chars", 5);
        assert_eq!(ctx.fields.get("voice").map(String::as_str), Some("aria-01"));
        assert_eq!(ctx.fields.get("chars").map(String::as_str), Some("5"));
    }

    #[test]
    fn test_log_event_serializes() {
        let event = LogEvent::Network {
            operation: "synthesize".to_string(),
            status: NetworkStatus::RateLimited,
            duration_ms: 12,
            details: Some(NetworkDetails {
                endpoint: "/text-to-speech/aria-01".to_string(),
                method: "POST".to_string(),
                status_code: Some(429),
            }),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("RateLimited"));
        assert!(json.contains("429"));
        // Logging without an installed logger must not panic
        log_event(event);
    }
}
