// ABOUTME: Wire types for the local control socket.
// ABOUTME: One JSON request line per connection, answered by one JSON response line.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Stop,
    Restart,
    Status,
    /// Rescan the services directory and register new definitions
    Reload,
    /// Forget a stopped service
    Remove,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Status => "status",
            Action::Reload => "reload",
            Action::Remove => "remove",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    pub action: Action,
    /// Ignored by `reload`
    #[serde(default)]
    pub service: String,
}

impl Request {
    pub fn new(action: Action, service: impl Into<String>) -> Self {
        Self {
            action,
            service: service.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    pub success: bool,
    pub message: String,
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let req = Request::new(Action::Restart, "web");
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"action":"restart","service":"web"}"#);
    }

    #[test]
    fn test_reload_without_service() {
        let req: Request = serde_json::from_str(r#"{"action":"reload"}"#).unwrap();
        assert_eq!(req.action, Action::Reload);
        assert!(req.service.is_empty());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result = serde_json::from_str::<Request>(r#"{"action":"explode","service":"web"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_response_constructors() {
        assert_eq!(
            serde_json::to_string(&Response::ok("running")).unwrap(),
            r#"{"success":true,"message":"running"}"#
        );
        assert!(!Response::error("nope").success);
    }

    #[test]
    fn test_action_display_matches_wire_name() {
        for action in [
            Action::Start,
            Action::Stop,
            Action::Restart,
            Action::Status,
            Action::Reload,
            Action::Remove,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action));
        }
    }
}
