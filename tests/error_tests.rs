//! Tests for the error system.

use pretty_assertions::assert_eq;
use threadrun::channel::{OutputMessage, TerminalError};
use threadrun::error::*;

#[test]
fn error_api_creation() {
    let err = ThreadRunError::api(404, "No thread found with id 't_missing'");
    assert!(matches!(&err, ThreadRunError::Api { status: 404, .. }));
    assert_eq!(
        err.to_string(),
        "API error (status 404): No thread found with id 't_missing'"
    );
}

#[test]
fn error_helper_mappings_are_stable_for_major_variants() {
    struct Case {
        error: ThreadRunError,
        expected_category: ErrorCategory,
        expected_retryable: bool,
    }

    let network_error = reqwest::Client::new()
        .get("http://[::1")
        .build()
        .unwrap_err();
    let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk");
    let serde_error = serde_json::from_str::<serde_json::Value>("{not-json}").unwrap_err();

    let cases = vec![
        Case {
            error: ThreadRunError::Authentication("bad-key".to_string()),
            expected_category: ErrorCategory::Authentication,
            expected_retryable: false,
        },
        Case {
            error: ThreadRunError::RateLimited {
                retry_after_ms: Some(1000),
            },
            expected_category: ErrorCategory::RateLimit,
            expected_retryable: true,
        },
        Case {
            error: ThreadRunError::Timeout(5000),
            expected_category: ErrorCategory::Timeout,
            expected_retryable: true,
        },
        Case {
            error: ThreadRunError::Configuration("ASSISTANT_ID is not set".to_string()),
            expected_category: ErrorCategory::Configuration,
            expected_retryable: false,
        },
        Case {
            error: ThreadRunError::Network(network_error),
            expected_category: ErrorCategory::Network,
            expected_retryable: true,
        },
        Case {
            error: ThreadRunError::Serialization(serde_error),
            expected_category: ErrorCategory::Serialization,
            expected_retryable: false,
        },
        Case {
            error: ThreadRunError::ToolExecution {
                tool_name: "search_emails".to_string(),
                message: "failed".to_string(),
            },
            expected_category: ErrorCategory::ToolExecution,
            expected_retryable: false,
        },
        Case {
            error: ThreadRunError::api(401, "Unauthorized"),
            expected_category: ErrorCategory::Authentication,
            expected_retryable: false,
        },
        Case {
            error: ThreadRunError::api(429, "Rate limited"),
            expected_category: ErrorCategory::RateLimit,
            expected_retryable: true,
        },
        Case {
            error: ThreadRunError::api(503, "Server unavailable"),
            expected_category: ErrorCategory::Server,
            expected_retryable: true,
        },
        Case {
            error: ThreadRunError::api(400, "Run is active"),
            expected_category: ErrorCategory::Api,
            expected_retryable: false,
        },
        Case {
            error: ThreadRunError::Io(io_error),
            expected_category: ErrorCategory::Unknown,
            expected_retryable: false,
        },
        Case {
            error: ThreadRunError::Stream("connection reset".to_string()),
            expected_category: ErrorCategory::Stream,
            expected_retryable: false,
        },
        Case {
            error: ThreadRunError::InvalidState("no run".to_string()),
            expected_category: ErrorCategory::Unknown,
            expected_retryable: false,
        },
        Case {
            error: ThreadRunError::Canceled,
            expected_category: ErrorCategory::Canceled,
            expected_retryable: false,
        },
    ];

    for case in cases {
        assert_eq!(case.error.category(), case.expected_category, "{}", case.error);
        assert_eq!(case.error.is_retryable(), case.expected_retryable, "{}", case.error);
    }
}

#[test]
fn category_serializes_in_snake_case() {
    assert_eq!(ErrorCategory::RateLimit.to_string(), "rate_limit");
    assert_eq!(
        serde_json::to_value(ErrorCategory::ToolExecution).unwrap(),
        "tool_execution"
    );
}

#[test]
fn provider_error_becomes_an_error_event() {
    let err = ThreadRunError::Timeout(120_000);
    let message: OutputMessage = TerminalError::from(&err).into();
    assert_eq!(
        message,
        OutputMessage::Error {
            message: "Timeout after 120000ms".into(),
            category: ErrorCategory::Timeout,
            retryable: true,
        }
    );
    assert!(message.is_terminal());
}

#[test]
fn tool_errors_render_with_the_tool_name() {
    let cases = [
        (ToolError::UnknownTool("fly".into()), "Tool 'fly' not found"),
        (
            ToolError::InvalidArguments {
                tool_name: "get_weather".into(),
                message: "missing required field 'latitude'".into(),
            },
            "Invalid arguments for 'get_weather': missing required field 'latitude'",
        ),
        (
            ToolError::Panicked {
                tool_name: "search_emails".into(),
                message: "index out of bounds".into(),
            },
            "Tool 'search_emails' panicked: index out of bounds",
        ),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
        assert_eq!(err.to_output_payload()["error"], expected);
    }
}
