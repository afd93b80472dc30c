// Wire payload parser and normalizer
//
// Turns a raw stream message (JSON object or whitespace-delimited text)
// into a canonical `Frame`, or `None` when no usable identifier can be
// found. Unparseable input is an expected condition on a live bus feed,
// so nothing in here returns an error.

use crate::frame::{format_id, Direction, Frame, MAX_EXTENDED_ID};
use crate::types::now_ms;
use chrono::{Local, NaiveDateTime, TimeZone};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

// Identifier candidates tried in priority order; first present and
// parseable field wins.
const ID_FIELDS: [&str; 5] = ["id", "can_id", "identifier", "frame_id", "arbitration_id"];
const PAYLOAD_FIELDS: [&str; 3] = ["data", "payload", "bytes"];
const TIMESTAMP_FIELDS: [&str; 6] = ["timestamp", "ts", "time", "createdAt", "created_at", "capture_ts"];
const DIRECTION_FIELDS: [&str; 3] = ["direction", "dir", "channel"];

fn id_shape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:0[xX])?[0-9a-fA-F]{1,8}$").expect("valid regex"))
}

fn time_of_day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2}):(\d{2}):(\d{2})(?:\.(\d{1,3}))?$").expect("valid regex")
    })
}

fn clamp_id_u128(v: u128) -> u32 {
    if v > MAX_EXTENDED_ID as u128 {
        MAX_EXTENDED_ID
    } else {
        v as u32
    }
}

fn clamp_id_f64(v: f64) -> u32 {
    if !v.is_finite() || v <= 0.0 {
        0
    } else if v >= MAX_EXTENDED_ID as f64 {
        MAX_EXTENDED_ID
    } else {
        v as u32
    }
}

fn parse_hex_digits(hex: &str) -> Option<u32> {
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match u128::from_str_radix(hex, 16) {
        Ok(v) => Some(clamp_id_u128(v)),
        // only possible failure left is overflow of a very long digit run
        Err(_) => Some(MAX_EXTENDED_ID),
    }
}

/// Parse an identifier from text.
///
/// `0x`-prefixed and bare hex-looking strings (containing `a`–`f`) parse
/// base-16, everything else base-10. The result is clamped to the 29-bit
/// extended identifier space; empty or unparseable input yields `None`.
pub fn parse_id(input: &str) -> Option<u32> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return parse_hex_digits(hex);
    }
    let hex_looking = s.chars().all(|c| c.is_ascii_hexdigit())
        && s.chars().any(|c| matches!(c, 'a'..='f' | 'A'..='F'));
    if hex_looking {
        return parse_hex_digits(s);
    }
    if let Ok(n) = s.parse::<i128>() {
        if n <= 0 {
            return Some(0);
        }
        return Some(clamp_id_u128(n as u128));
    }
    s.parse::<f64>().ok().map(clamp_id_f64)
}

/// Parse an identifier from a JSON value (number or string).
pub fn parse_id_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_f64().map(clamp_id_f64),
        Value::String(s) => parse_id(s),
        _ => None,
    }
}

fn millis_from_numeric(v: f64) -> i64 {
    if v > 1e12 {
        // already epoch milliseconds
        v as i64
    } else if v > 1e9 {
        // epoch seconds
        (v * 1000.0) as i64
    } else {
        v as i64
    }
}

/// Parse a timestamp from text into epoch milliseconds.
///
/// Numeric strings go through the milliseconds/seconds heuristics, full
/// date-times are parsed as local wall-clock time, and a bare
/// `HH:MM:SS[.fff]` is applied to today's date. Anything else yields the
/// current time.
pub fn parse_timestamp(input: &str) -> i64 {
    let s = input.trim();
    if s.is_empty() {
        return now_ms();
    }

    if let Ok(n) = s.parse::<f64>() {
        if n.is_finite() {
            return millis_from_numeric(n);
        }
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_millis();
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y/%m/%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                return local.timestamp_millis();
            }
        }
    }

    if let Some(caps) = time_of_day_re().captures(s) {
        let hour: u32 = caps[1].parse().unwrap_or(0);
        let minute: u32 = caps[2].parse().unwrap_or(0);
        let second: u32 = caps[3].parse().unwrap_or(0);
        let millis: u32 = caps
            .get(4)
            .map(|m| format!("{:0<3}", m.as_str()))
            .and_then(|padded| padded.parse().ok())
            .unwrap_or(0);
        let today = Local::now().date_naive();
        if let Some(naive) = today.and_hms_milli_opt(hour, minute, second, millis) {
            if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                return local.timestamp_millis();
            }
        }
    }

    now_ms()
}

/// Parse a timestamp from a JSON value into epoch milliseconds.
pub fn parse_timestamp_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(millis_from_numeric).unwrap_or_else(now_ms),
        Value::String(s) => parse_timestamp(s),
        _ => now_ms(),
    }
}

/// Normalize a payload value into an uppercase hex string.
///
/// Hex strings are stripped of separators, numeric arrays are rendered
/// as clamped bytes, and objects recurse into their `data`/`bytes`
/// field. Anything unusable becomes the empty string.
pub fn normalize_payload(value: &Value) -> String {
    match value {
        Value::String(s) => s
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .collect::<String>()
            .to_uppercase(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let byte = item.as_f64().unwrap_or(0.0).clamp(0.0, 255.0) as u8;
                format!("{:02X}", byte)
            })
            .collect(),
        Value::Number(n) => {
            let byte = n.as_f64().unwrap_or(0.0).clamp(0.0, 255.0) as u8;
            format!("{:02X}", byte)
        }
        Value::Object(map) => map
            .get("data")
            .or_else(|| map.get("bytes"))
            .map(normalize_payload)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Resolve a direction token; only a case-insensitive `RX` reads as
/// receive, everything else is a transmission.
pub fn resolve_direction(input: &str) -> Direction {
    if input.trim().eq_ignore_ascii_case("rx") {
        Direction::Rx
    } else {
        Direction::Tx
    }
}

fn build_frame(
    id: u32,
    data: String,
    direction: Direction,
    timestamp: i64,
    source_timestamp: Option<String>,
    raw: &str,
) -> Frame {
    Frame {
        id,
        id_hex: format_id(id),
        data,
        direction,
        timestamp,
        source_timestamp,
        raw: raw.to_string(),
    }
}

/// Parse one raw stream message into a canonical frame.
///
/// JSON objects are mined for candidate fields; anything else is
/// tokenized by whitespace and matched heuristically. A message with no
/// usable identifier yields `None`.
pub fn parse_frame(raw: &str) -> Option<Frame> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if text.starts_with('{') || text.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            return frame_from_json(&value, raw);
        }
        // not actually JSON, fall through to the token heuristics
    }
    frame_from_tokens(text, raw)
}

fn frame_from_json(value: &Value, raw: &str) -> Option<Frame> {
    // a top-level array carries no identifier fields
    let obj = value.as_object()?;

    let id = ID_FIELDS
        .iter()
        .find_map(|key| obj.get(*key).and_then(parse_id_value))?;

    let data = PAYLOAD_FIELDS
        .iter()
        .find_map(|key| obj.get(*key))
        .map(normalize_payload)
        .or_else(|| {
            obj.get("frame")
                .filter(|v| v.is_array())
                .map(normalize_payload)
        })
        .unwrap_or_default();

    let ts_field = TIMESTAMP_FIELDS.iter().find_map(|key| obj.get(*key));
    let timestamp = ts_field.map(parse_timestamp_value).unwrap_or_else(now_ms);
    let source_timestamp = ts_field.map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });

    let direction = DIRECTION_FIELDS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(resolve_direction)
        .unwrap_or_default();

    Some(build_frame(id, data, direction, timestamp, source_timestamp, raw))
}

fn frame_from_tokens(text: &str, raw: &str) -> Option<Frame> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut used = vec![false; tokens.len()];

    let mut id = None;
    for (i, token) in tokens.iter().enumerate() {
        if id_shape_re().is_match(token) {
            if let Some(value) = parse_id(token) {
                id = Some(value);
                used[i] = true;
                break;
            }
        }
    }
    let id = id?;

    let mut source_timestamp = None;
    for (i, token) in tokens.iter().enumerate() {
        if !used[i] && time_of_day_re().is_match(token) {
            source_timestamp = Some(token.to_string());
            used[i] = true;
            break;
        }
    }
    let timestamp = source_timestamp
        .as_deref()
        .map(parse_timestamp)
        .unwrap_or_else(now_ms);

    let mut direction = Direction::Tx;
    for (i, token) in tokens.iter().enumerate() {
        if !used[i] && (token.eq_ignore_ascii_case("tx") || token.eq_ignore_ascii_case("rx")) {
            direction = resolve_direction(token);
            used[i] = true;
            break;
        }
    }

    let mut data = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if !used[i]
            && !token.is_empty()
            && token.len() % 2 == 0
            && token.chars().all(|c| c.is_ascii_hexdigit())
        {
            data = token.to_uppercase();
            used[i] = true;
            break;
        }
    }

    Some(build_frame(id, data, direction, timestamp, source_timestamp, raw))
}
