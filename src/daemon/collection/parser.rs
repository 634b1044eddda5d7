//! Classifies raw lines of the event source into [InputEvent]s.
//!
//! Two grammars are accepted:
//!  - a JSON object per line with a `type` discriminator (`pointer_button`, `key`,
//!    `keyboard_key`), a `state` and numeric `button`/`key` codes.
//!  - the free text `libinput debug-events` format, for example
//!    `event7   POINTER_BUTTON    +1.234s   BTN_LEFT (272) pressed, seat count: 1`.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::daemon::storage::activity_event::Side;

/// Device id assigned to debug lines that don't start with an `eventN` token.
pub const UNKNOWN_DEVICE: &str = "unknown";
/// Device id assigned to JSON events, which carry no device identity.
pub const JSON_DEVICE: &str = "json";

pub const BTN_LEFT: u64 = 272;
pub const BTN_RIGHT: u64 = 273;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerButton {
        device_id: String,
        button: Side,
        edge: Edge,
    },
    /// Tap or hold gesture on a touchpad. Has no release counterpart.
    Tap {
        device_id: String,
        button: Side,
    },
    /// Only presses are produced.
    Key {
        device_id: String,
        key: String,
    },
    Scroll {
        vertical: Option<f64>,
        horizontal: Option<f64>,
    },
    DeviceAdded {
        device_id: String,
        description: String,
    },
    DeviceRemoved {
        device_id: String,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("invalid json event: {0}")]
    InvalidJson(String),
    #[error("unknown event type {0:?}")]
    UnknownEventType(String),
    #[error("unsupported pointer button")]
    UnsupportedButton,
    #[error("event is neither pressed nor released")]
    MissingEdge,
    #[error("line matches no known event")]
    Unrecognized,
}

pub fn parse_line(line: &str) -> Result<InputEvent, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }
    if line.starts_with('{') {
        parse_json_line(line)
    } else {
        parse_debug_line(line)
    }
}

#[derive(Deserialize)]
struct JsonEvent {
    #[serde(rename = "type")]
    kind: Option<String>,
    state: Option<String>,
    button: Option<Value>,
    key: Option<Value>,
}

/// Numeric code of a JSON field. Whole floats such as `272.0` are the same code.
fn json_code(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|v| v.fract() == 0. && (0. ..=u64::MAX as f64).contains(v))
                .map(|v| v as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_json_line(line: &str) -> Result<InputEvent, ParseError> {
    let event = serde_json::from_str::<JsonEvent>(line)
        .map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let kind = event.kind.unwrap_or_default();
    // The JSON producer has no device identity, so only presses are meaningful.
    let pressed = event.state.as_deref() == Some("pressed");

    match kind.as_str() {
        "pointer_button" => {
            if !pressed {
                return Err(ParseError::MissingEdge);
            }
            let button = match event.button.as_ref().and_then(json_code) {
                Some(BTN_LEFT) => Side::Left,
                Some(BTN_RIGHT) => Side::Right,
                _ => return Err(ParseError::UnsupportedButton),
            };
            Ok(InputEvent::PointerButton {
                device_id: JSON_DEVICE.into(),
                button,
                edge: Edge::Pressed,
            })
        }
        "key" | "keyboard_key" => {
            if !pressed {
                return Err(ParseError::MissingEdge);
            }
            let code = match event.key {
                None | Some(Value::Null) => "UNKNOWN".to_string(),
                Some(Value::String(s)) => s,
                Some(other) => match json_code(&other) {
                    Some(code) => code.to_string(),
                    None => other.to_string(),
                },
            };
            Ok(InputEvent::Key {
                device_id: JSON_DEVICE.into(),
                key: format!("KEY_{code}"),
            })
        }
        _ => Err(ParseError::UnknownEventType(kind)),
    }
}

fn parse_debug_line(line: &str) -> Result<InputEvent, ParseError> {
    let upper = line.to_ascii_uppercase();
    let lower = line.to_ascii_lowercase();
    let device_id = device_id(line);

    if let Some(index) = upper.find("DEVICE_ADDED") {
        return Ok(InputEvent::DeviceAdded {
            device_id,
            description: line[index + "DEVICE_ADDED".len()..].trim().to_string(),
        });
    }
    if upper.contains("DEVICE_REMOVED") {
        return Ok(InputEvent::DeviceRemoved { device_id });
    }
    if upper.contains("POINTER_SCROLL_") {
        return Ok(InputEvent::Scroll {
            vertical: decimal_after(&lower, "vert").or_else(|| decimal_after(&lower, "vertical")),
            horizontal: decimal_after(&lower, "horiz")
                .or_else(|| decimal_after(&lower, "horizontal")),
        });
    }
    if upper.contains("POINTER_BUTTON") {
        let edge = if lower.contains("pressed") {
            Edge::Pressed
        } else if lower.contains("released") {
            Edge::Released
        } else {
            return Err(ParseError::MissingEdge);
        };
        return Ok(InputEvent::PointerButton {
            device_id,
            button: debug_button(&upper, &lower)?,
            edge,
        });
    }
    if ["POINTER_TAP", "TOUCHPAD_TAP", "GESTURE_TAP"]
        .iter()
        .any(|v| upper.contains(v))
    {
        let fingers = integer_after(&lower, "finger");
        let button = if matches!(fingers, Some(2) | Some(3)) {
            Side::Right
        } else {
            Side::Left
        };
        return Ok(InputEvent::Tap { device_id, button });
    }
    if upper.contains("GESTURE_HOLD_BEGIN") {
        let fingers = line
            .split_whitespace()
            .last()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1);
        let button = if fingers >= 2 { Side::Right } else { Side::Left };
        return Ok(InputEvent::Tap { device_id, button });
    }
    if upper.contains("KEYBOARD_KEY") {
        if !lower.contains("pressed") {
            return Err(ParseError::MissingEdge);
        }
        return Ok(InputEvent::Key {
            device_id,
            key: key_name(line, &lower),
        });
    }

    Err(ParseError::Unrecognized)
}

/// Leading `eventN` token. libinput prefixes hot-plug lines with `-`.
fn device_id(line: &str) -> String {
    line.split_whitespace()
        .next()
        .map(|token| token.trim_start_matches('-'))
        .filter(|token| {
            token
                .get(.."event".len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("event"))
                && token.len() > "event".len()
                && token["event".len()..].bytes().all(|b| b.is_ascii_digit())
        })
        .map(|token| token.to_ascii_lowercase())
        .unwrap_or_else(|| UNKNOWN_DEVICE.to_string())
}

fn debug_button(upper: &str, lower: &str) -> Result<Side, ParseError> {
    if upper.contains("BTN_LEFT") {
        return Ok(Side::Left);
    }
    if upper.contains("BTN_RIGHT") {
        return Ok(Side::Right);
    }
    match integer_after(lower, "button") {
        Some(BTN_LEFT) | Some(1) => Ok(Side::Left),
        Some(BTN_RIGHT) | Some(3) => Ok(Side::Right),
        _ => Err(ParseError::UnsupportedButton),
    }
}

fn key_name(line: &str, lower: &str) -> String {
    parenthesized_key(line)
        .or_else(|| bare_key(line))
        .map(str::to_string)
        .or_else(|| integer_after(lower, "key").map(|code| format!("KEY_{code}")))
        .unwrap_or_else(|| "KEY_UNKNOWN".to_string())
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_key_byte(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_'
}

/// Length of the `KEY_[A-Z0-9_]+` name starting at the beginning of `text`.
fn key_len(text: &str) -> Option<usize> {
    let rest = text.strip_prefix("KEY_")?;
    let len = rest.bytes().take_while(|b| is_key_byte(*b)).count();
    (len > 0).then_some("KEY_".len() + len)
}

/// `(KEY_NAME)`
fn parenthesized_key(line: &str) -> Option<&str> {
    line.match_indices("(KEY_").find_map(|(index, _)| {
        let start = index + 1;
        let len = key_len(&line[start..])?;
        (line.as_bytes().get(start + len) == Some(&b')')).then(|| &line[start..start + len])
    })
}

/// `KEY_NAME` standing on its own as a word.
fn bare_key(line: &str) -> Option<&str> {
    let bytes = line.as_bytes();
    line.match_indices("KEY_").find_map(|(index, _)| {
        if index > 0 && is_word_byte(bytes[index - 1]) {
            return None;
        }
        let len = key_len(&line[index..])?;
        match bytes.get(index + len) {
            Some(b) if is_word_byte(*b) => None,
            _ => Some(&line[index..index + len]),
        }
    })
}

/// Finds `token` as the start of a word, followed by whitespace, and hands the remainder to
/// `parse`. The first occurrence that parses wins.
fn value_after<T>(lower: &str, token: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let bytes = lower.as_bytes();
    lower.match_indices(token).find_map(|(index, _)| {
        if index > 0 && is_word_byte(bytes[index - 1]) {
            return None;
        }
        let rest = &lower[index + token.len()..];
        let trimmed = rest.trim_start();
        if trimmed.len() == rest.len() {
            return None;
        }
        parse(trimmed)
    })
}

/// `token <digits>`
fn integer_after(lower: &str, token: &str) -> Option<u64> {
    value_after(lower, token, |text| {
        let len = text.bytes().take_while(u8::is_ascii_digit).count();
        text[..len].parse().ok()
    })
}

/// `token <[-+]digits[.digits]>`
fn decimal_after(lower: &str, token: &str) -> Option<f64> {
    value_after(lower, token, |text| {
        let bytes = text.as_bytes();
        let mut end = usize::from(matches!(bytes.first(), Some(b'-') | Some(b'+')));
        let digits_start = end;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
        if end == digits_start {
            return None;
        }
        if bytes.get(end) == Some(&b'.') && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) {
            end += 1;
            while bytes.get(end).is_some_and(u8::is_ascii_digit) {
                end += 1;
            }
        }
        text[..end].parse::<f64>().ok().filter(|v| v.is_finite())
    })
}
