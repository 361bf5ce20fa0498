//! Cross-frame message parsing.
//!
//! Providers post progress in different shapes. Parsers are tried in table order; the
//! first one whose host matches the embed URL and that understands the payload wins.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// A structured time report from an embed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressMessage {
    pub current_time: f64,
    pub duration: Option<f64>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

type ParseFn = fn(&Value) -> Option<ProgressMessage>;

struct MessageParser {
    /// Substring of the embed URL; empty matches every provider.
    url_pattern: &'static str,
    parse: ParseFn,
}

const PARSERS: &[MessageParser] = &[
    MessageParser {
        url_pattern: "vidlink.pro",
        parse: parse_player_event,
    },
    MessageParser {
        url_pattern: "vidfast.pro",
        parse: parse_player_event,
    },
    MessageParser {
        url_pattern: "videasy.net",
        parse: parse_videasy,
    },
    MessageParser {
        url_pattern: "",
        parse: parse_timeupdate,
    },
];

static ERROR_TEXT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(network\s*error|failed to fetch|not available|\bhttp\s*[45]\d\d\b|\b[45]\d\d\s+(?:error|not found|forbidden)\b)",
    )
    .expect("valid error text regex")
});

/// Parse a progress message posted by the embed at `embed_url`.
///
/// Payloads may arrive as JSON values or as JSON encoded in a string.
pub fn parse_progress(embed_url: &str, payload: &Value) -> Option<ProgressMessage> {
    let decoded;
    let payload = match payload {
        Value::String(s) => {
            decoded = serde_json::from_str::<Value>(s).ok()?;
            &decoded
        }
        other => other,
    };

    PARSERS
        .iter()
        .filter(|p| embed_url.contains(p.url_pattern))
        .find_map(|p| (p.parse)(payload))
}

/// An error the embed announced, as opposed to progress or chatter.
pub fn reported_error(payload: &Value) -> Option<String> {
    match payload {
        Value::Object(map) => {
            let tag = map
                .get("type")
                .or_else(|| map.get("event"))
                .and_then(Value::as_str)?;
            if !tag.eq_ignore_ascii_case("error") {
                return None;
            }
            let reason = ["message", "error", "data"]
                .iter()
                .find_map(|k| map.get(*k))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "unknown error".to_string());
            Some(reason)
        }
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(decoded @ Value::Object(_)) => reported_error(&decoded),
            _ => ERROR_TEXT_REGEX.is_match(s).then(|| s.clone()),
        },
        _ => None,
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn index(value: Option<&Value>) -> Option<u32> {
    number(value)
        .filter(|n| *n >= 0.0 && n.fract() == 0.0)
        .map(|n| n as u32)
}

fn message(time: Option<f64>, duration: Option<f64>, data: &Value) -> Option<ProgressMessage> {
    let current_time = time.filter(|t| *t >= 0.0)?;
    Some(ProgressMessage {
        current_time,
        duration: duration.filter(|d| *d > 0.0),
        season: index(data.get("season")),
        episode: index(data.get("episode")),
    })
}

/// `{"type": "PLAYER_EVENT", "data": {"event": "timeupdate", "currentTime": 12.3, ...}}`
fn parse_player_event(payload: &Value) -> Option<ProgressMessage> {
    if payload.get("type")?.as_str()? != "PLAYER_EVENT" {
        return None;
    }
    let data = payload.get("data")?;
    message(number(data.get("currentTime")), number(data.get("duration")), data)
}

/// `{"id": "1399", "type": "tv", "progress": 4.2, "timestamp": 120.5, "duration": 3300, ...}`
fn parse_videasy(payload: &Value) -> Option<ProgressMessage> {
    let timestamp = number(payload.get("timestamp"))?;
    message(Some(timestamp), number(payload.get("duration")), payload)
}

/// `{"type": "timeupdate", "time": 12.3, "duration": 5400}`
fn parse_timeupdate(payload: &Value) -> Option<ProgressMessage> {
    let tag = payload
        .get("type")
        .or_else(|| payload.get("event"))
        .and_then(Value::as_str)?;
    if !tag.eq_ignore_ascii_case("timeupdate") {
        return None;
    }
    let data = payload.get("data").unwrap_or(payload);
    let time = number(data.get("time")).or_else(|| number(data.get("currentTime")));
    message(time, number(data.get("duration")), data)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_player_event_shape() {
        let payload = json!({
            "type": "PLAYER_EVENT",
            "data": {"event": "timeupdate", "currentTime": 321.5, "duration": 5400, "season": 1, "episode": 2}
        });
        let msg = parse_progress("https://vidlink.pro/tv/1399/1/2", &payload).unwrap();
        assert_eq!(msg.current_time, 321.5);
        assert_eq!(msg.duration, Some(5400.0));
        assert_eq!(msg.season, Some(1));
        assert_eq!(msg.episode, Some(2));
    }

    #[test]
    fn test_videasy_string_payload() {
        let payload = Value::String(
            r#"{"id":"1399","type":"tv","progress":12.5,"timestamp":"450.25","duration":3600,"season":"2","episode":"3"}"#
                .to_string(),
        );
        let msg = parse_progress("https://player.videasy.net/tv/1399/2/3", &payload).unwrap();
        assert_eq!(msg.current_time, 450.25);
        assert_eq!(msg.season, Some(2));
        assert_eq!(msg.episode, Some(3));
    }

    #[test]
    fn test_generic_timeupdate() {
        let payload = json!({"type": "timeupdate", "time": 60, "duration": 0});
        let msg = parse_progress("https://zeta.example/embed/550", &payload).unwrap();
        assert_eq!(msg.current_time, 60.0);
        assert_eq!(msg.duration, None);
    }

    #[test]
    fn test_provider_shapes_do_not_leak() {
        // A PLAYER_EVENT from an unknown provider is not trusted.
        let payload = json!({"type": "PLAYER_EVENT", "data": {"currentTime": 10}});
        assert!(parse_progress("https://zeta.example/embed/550", &payload).is_none());
    }

    #[test]
    fn test_unrecognised_payloads() {
        let url = "https://vidlink.pro/movie/550";
        assert!(parse_progress(url, &json!({"type": "PLAYER_EVENT", "data": {"event": "play"}})).is_none());
        assert!(parse_progress(url, &json!("hello")).is_none());
        assert!(parse_progress(url, &json!({"type": "timeupdate", "time": -1})).is_none());
        assert!(parse_progress(url, &json!(42)).is_none());
    }

    #[test]
    fn test_reported_errors() {
        assert_eq!(
            reported_error(&json!({"type": "error", "message": "Source not found"})).as_deref(),
            Some("Source not found")
        );
        assert!(reported_error(&json!("NetworkError when attempting to fetch resource")).is_some());
        assert!(reported_error(&json!("HTTP 404 while loading")).is_some());
        assert!(reported_error(&json!({"type": "timeupdate", "time": 3})).is_none());
        assert!(reported_error(&json!("ready")).is_none());
    }
}
