//! # Message routing by `type` tag.
//!
//! A decoded frame is a JSON object with a `type` field:
//!
//! | `type`  | fields                 | route                                  |
//! |---------|------------------------|----------------------------------------|
//! | `pid`   | `pid`: integer         | [`Route::Pid`], recorded for the role  |
//! | `stats` | opaque                 | [`Route::Stats`], broadcast as an event|
//! | other   | -                      | [`Route::Ignored`]                     |
//!
//! A missing tag, a non-object value, or a `pid` message without an integer
//! `pid` is ignored, never an error.

use serde_json::Value;

pub const MESSAGE_PID: &str = "pid";
pub const MESSAGE_STATS: &str = "stats";

/// Where a decoded message goes.
#[derive(Debug, PartialEq)]
pub enum Route {
    /// The child reported its OS process id.
    Pid(i32),
    /// A stats snapshot; the whole message is the payload.
    Stats(Value),
    /// Unknown or incomplete message.
    Ignored,
}

/// Classifies a decoded message.
pub fn route(message: Value) -> Route {
    let kind = message.get("type").and_then(Value::as_str);
    match kind {
        Some(MESSAGE_PID) => message
            .get("pid")
            .and_then(Value::as_i64)
            .and_then(|pid| i32::try_from(pid).ok())
            .filter(|pid| *pid > 0)
            .map_or(Route::Ignored, Route::Pid),
        Some(MESSAGE_STATS) => Route::Stats(message),
        _ => Route::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pid_message() {
        assert_eq!(route(json!({"type": "pid", "pid": 4321})), Route::Pid(4321));
    }

    #[test]
    fn test_pid_without_number_is_ignored() {
        assert_eq!(route(json!({"type": "pid", "pid": "4321"})), Route::Ignored);
        assert_eq!(route(json!({"type": "pid"})), Route::Ignored);
        assert_eq!(route(json!({"type": "pid", "pid": 0})), Route::Ignored);
        assert_eq!(route(json!({"type": "pid", "pid": 1u64 << 40})), Route::Ignored);
    }

    #[test]
    fn test_stats_keeps_whole_message() {
        let msg = json!({"type": "stats", "accounts": [{"name": "work", "unread": 4}]});
        assert_eq!(route(msg.clone()), Route::Stats(msg));
    }

    #[test]
    fn test_unknown_type_ignored() {
        assert_eq!(route(json!({"type": "hello"})), Route::Ignored);
        assert_eq!(route(json!({"pid": 1})), Route::Ignored);
        assert_eq!(route(json!([1, 2, 3])), Route::Ignored);
    }
}
