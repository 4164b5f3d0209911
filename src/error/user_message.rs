/// User-facing messages for classified errors
///
/// Messages are fixed per kind so nothing technical (status codes, type names,
/// stack traces, vendor codes) from the underlying failure can leak to the user.
use super::classification::{ClassifiedError, ErrorKind};
use serde_json::Value;

const OFFLINE_TOKENS: [&str; 4] = ["offline", "enotfound", "no internet", "network is unreachable"];
const TIMEOUT_TOKENS: [&str; 3] = ["timeout", "timed out", "etimedout"];

/// Network failure sub-cases that get their own wording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkCondition {
    Offline,
    Timeout,
    Generic,
}

impl NetworkCondition {
    /// Derive the sub-case from the error's context and message
    pub fn of(error: &ClassifiedError) -> Self {
        if error.context().get("offline") == Some(&Value::Bool(true)) {
            return NetworkCondition::Offline;
        }

        let lower = error.message().to_lowercase();
        if OFFLINE_TOKENS.iter().any(|t| lower.contains(t)) {
            NetworkCondition::Offline
        } else if TIMEOUT_TOKENS.iter().any(|t| lower.contains(t))
            || matches!(error.status(), Some(408) | Some(504))
        {
            NetworkCondition::Timeout
        } else {
            NetworkCondition::Generic
        }
    }
}

/// Map a classified error to a message that is safe to show to the user
pub fn user_friendly_message(error: &ClassifiedError) -> String {
    let message = match error.kind() {
        ErrorKind::Network => match NetworkCondition::of(error) {
            NetworkCondition::Offline => {
                "You appear to be offline. Please check your internet connection and try again."
            }
            NetworkCondition::Timeout => {
                "The server is taking too long to respond. Please try again in a moment."
            }
            NetworkCondition::Generic => {
                "We couldn't reach the server. Please check your connection and try again."
            }
        },
        ErrorKind::Validation => {
            "Some of the information provided is not valid. Please verify your input and try again."
        }
        ErrorKind::Authentication => {
            "Your session has expired. Please refresh the page and sign in again."
        }
        ErrorKind::Upload => {
            "Your file could not be uploaded. Please check the file and try again."
        }
        ErrorKind::Payment => {
            "Your payment could not be processed. Please verify your payment details or contact support."
        }
        ErrorKind::Server => {
            "Something went wrong on our side. Please try again later or contact support."
        }
        ErrorKind::Client => {
            "The request could not be completed. Please refresh the page and try again."
        }
        ErrorKind::Unknown => {
            "An unexpected error occurred. Please try again or contact support if it keeps happening."
        }
    };

    message.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTION_VERBS: [&str; 4] = ["check", "try", "refresh", "verify"];

    fn all_kinds() -> Vec<ClassifiedError> {
        vec![
            ClassifiedError::network("TypeError: fetch failed"),
            ClassifiedError::network("net::ERR_INTERNET_DISCONNECTED offline"),
            ClassifiedError::network("ETIMEDOUT 10.0.0.1:443"),
            ClassifiedError::validation("ValidationError: email is required"),
            ClassifiedError::authentication("401 Unauthorized"),
            ClassifiedError::upload("S3 PutObject failed: 503 SlowDown", true),
            ClassifiedError::payment("stripe card_declined"),
            ClassifiedError::server("NullPointerException at Handler.java:42"),
            ClassifiedError::client("404 Not Found"),
            ClassifiedError::unknown("[object Object]"),
        ]
    }

    #[test]
    fn test_network_sub_cases() {
        let offline = ClassifiedError::network("x").with_context("offline", true);
        assert_eq!(NetworkCondition::of(&offline), NetworkCondition::Offline);

        let timeout = ClassifiedError::network("Request timed out");
        assert_eq!(NetworkCondition::of(&timeout), NetworkCondition::Timeout);

        let gateway = ClassifiedError::network("bad gateway").with_context("status", 504);
        assert_eq!(NetworkCondition::of(&gateway), NetworkCondition::Timeout);

        let generic = ClassifiedError::network("fetch failed");
        assert_eq!(NetworkCondition::of(&generic), NetworkCondition::Generic);

        assert_ne!(
            user_friendly_message(&offline),
            user_friendly_message(&generic)
        );
    }

    #[test]
    fn test_messages_hide_technical_detail() {
        for error in all_kinds() {
            let message = user_friendly_message(&error);
            assert!(
                !message.chars().any(|c| c.is_ascii_digit()),
                "digits leaked: {}",
                message
            );
            for token in ["Error", "Exception", "ETIMEDOUT", "card_declined", "S3", "at "] {
                assert!(!message.contains(token), "{} leaked into {}", token, message);
            }
        }
    }

    #[test]
    fn test_messages_are_actionable_sentences() {
        for error in all_kinds() {
            let message = user_friendly_message(&error);
            let lower = message.to_lowercase();
            assert!(message.len() > 10);
            assert!(message.ends_with('.'));
            assert!(
                ACTION_VERBS.iter().any(|v| lower.contains(v)),
                "no action verb in {}",
                message
            );
        }
    }

    #[test]
    fn test_deterministic() {
        let error = ClassifiedError::payment("declined");
        assert_eq!(user_friendly_message(&error), user_friendly_message(&error));
    }
}
