//! Structured-call extractor.
//!
//! Finds one tool call embedded in free-form model output. Recognised
//! markers, tried in order:
//!
//! ```text
//! TOOL_CALL: check_inventory_detail
//! ARGS: {"name": "iPhone 15 Pro Max", "storage": "256GB"}
//!
//! check_inventory_detail({"name": "iPhone 15 Pro Max"})
//!
//! {"tool": "get_order", "arguments": {"order_id": "order_1a2b3c4d5e6f7a8b"}}
//! ```
//!
//! The argument object is cut out by a balanced-brace scan that ignores
//! braces inside quoted strings. Text that does not parse as JSON gets one
//! repair pass (code fences, single quotes, trailing commas, Python
//! literals) before the call is reported as malformed.

use regex_lite::Regex;
use salesdesk_core::tool::ToolCall;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::LazyLock;

static TOOL_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)TOOL_CALL\s*:\s*([A-Za-z_][A-Za-z0-9_]*)").expect("static pattern")
});

static ARGS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ARGS\s*:").expect("static pattern"));

static FN_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*\{").expect("static pattern")
});

static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?(</think>|$)").expect("static pattern"));

/// Keys that name the tool in the JSON-object form.
const NAME_KEYS: [&str; 4] = ["tool", "name", "function", "tool_name"];

/// Keys that carry the arguments in the JSON-object form.
const ARG_KEYS: [&str; 4] = ["arguments", "args", "parameters", "input"];

/// Outcome of [`extract`].
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// A well-formed call.
    Found(ToolCall),
    /// Plain text answer. Not an error.
    NotFound,
    /// A call marker was present but its arguments could not be parsed.
    Malformed(MalformedCall),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MalformedCall {
    /// Tool name, when the marker exposed one
    pub name: Option<String>,
    pub reason: String,
}

impl MalformedCall {
    fn new(name: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            name: name.map(str::to_string),
            reason: reason.into(),
        }
    }
}

/// Rendered without braces, so feeding it back to [`extract`] never yields
/// a call.
impl std::fmt::Display for MalformedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason: String = self
            .reason
            .chars()
            .filter(|c| !matches!(c, '{' | '}'))
            .collect();
        match &self.name {
            Some(name) => {
                let name: String = name
                    .chars()
                    .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '))
                    .collect();
                write!(f, "could not parse arguments for tool '{name}' ({reason})")
            }
            None => write!(f, "could not parse tool call ({reason})"),
        }
    }
}

type MarkerResult = Option<Result<ToolCall, MalformedCall>>;

/// Extract a single tool call from model output.
pub fn extract(text: &str) -> Extraction {
    let text = strip_reasoning(text);
    let markers: [fn(&str) -> MarkerResult; 3] =
        [tool_call_marker, function_call_marker, json_object_marker];

    let mut malformed = None;
    for marker in markers {
        match marker(&text) {
            Some(Ok(call)) => return Extraction::Found(call),
            Some(Err(m)) => {
                malformed.get_or_insert(m);
            }
            None => {}
        }
    }
    malformed.map_or(Extraction::NotFound, Extraction::Malformed)
}

/// Return the first JSON object in `text`, repaired if needed.
///
/// Tolerates prose, code fences and reasoning blocks around the object.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let text = strip_reasoning(text);
    text.match_indices('{')
        .find_map(|(start, _)| parse_region(&text[start..]).ok())
}

/// Remove `<think>...</think>` blocks some models emit before answering.
pub fn strip_reasoning(text: &str) -> Cow<'_, str> {
    if text.contains("<think>") {
        Cow::Owned(THINK_RE.replace_all(text, "").trim().to_string())
    } else {
        Cow::Borrowed(text)
    }
}

fn tool_call_marker(text: &str) -> MarkerResult {
    let caps = TOOL_CALL_RE.captures(text)?;
    let name_match = caps.get(1)?;
    let name = name_match.as_str();
    let rest = &text[name_match.end()..];

    let Some(args) = ARGS_RE.find(rest) else {
        return Some(Err(MalformedCall::new(Some(name), "missing ARGS section")));
    };
    let after = &rest[args.end()..];
    let Some(open) = after.find('{') else {
        return Some(Err(MalformedCall::new(Some(name), "ARGS is not an object")));
    };

    Some(
        parse_region(&after[open..])
            .map(|arguments| ToolCall::new(name, arguments))
            .map_err(|reason| MalformedCall::new(Some(name), reason)),
    )
}

fn function_call_marker(text: &str) -> MarkerResult {
    let caps = FN_CALL_RE.captures(text)?;
    let whole = caps.get(0)?;
    let name = caps.get(1)?.as_str();
    let open = whole.end() - 1;

    Some(
        parse_region(&text[open..])
            .map(|arguments| ToolCall::new(name, arguments))
            .map_err(|reason| MalformedCall::new(Some(name), reason)),
    )
}

fn json_object_marker(text: &str) -> MarkerResult {
    let mut malformed = None;
    for (start, _) in text.match_indices('{') {
        let Ok(object) = parse_region(&text[start..]) else {
            continue;
        };
        match call_from_object(&object) {
            Some(Ok(call)) => return Some(Ok(call)),
            Some(Err(m)) => {
                malformed.get_or_insert(m);
            }
            None => {}
        }
    }
    malformed.map(Err)
}

fn call_from_object(object: &Map<String, Value>) -> MarkerResult {
    let name = NAME_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())?;
    let args = ARG_KEYS.iter().find_map(|key| object.get(*key))?;

    let arguments = match args {
        Value::Object(map) => Ok(map.clone()),
        Value::String(encoded) => match encoded.find('{') {
            Some(open) => parse_region(&encoded[open..]),
            None => Err("arguments string is not a JSON object".to_string()),
        },
        _ => Err("arguments are not an object".to_string()),
    };

    Some(
        arguments
            .map(|arguments| ToolCall::new(name, arguments))
            .map_err(|reason| MalformedCall::new(Some(name), reason)),
    )
}

/// Cut the balanced region starting at `text[0] == '{'` and parse it.
fn parse_region(text: &str) -> Result<Map<String, Value>, String> {
    parse_object(&balanced_region(text))
}

/// Scan from the `{` at the start of `text` to its matching `}`.
///
/// Braces inside `"` or `'` strings do not count. A closer that skips over
/// open delimiters closes them first, and a closer with no opener is
/// ignored. If the text ends first, the open string and delimiters are
/// closed.
fn balanced_region(text: &str) -> Cow<'_, str> {
    let mut closers: Vec<char> = Vec::new();
    let mut inserts: Vec<(usize, String)> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                let Some(pos) = closers.iter().rposition(|&open| open == c) else {
                    continue;
                };
                let missing: String = closers.drain(pos + 1..).rev().collect();
                closers.pop();
                if !missing.is_empty() {
                    inserts.push((i, missing));
                }
                if closers.is_empty() {
                    return splice(&text[..i + c.len_utf8()], &inserts, String::new());
                }
            }
            _ => {}
        }
    }

    let mut tail = String::new();
    if let Some(q) = quote {
        tail.push(q);
    }
    tail.extend(closers.iter().rev());
    splice(text.trim_end(), &inserts, tail)
}

/// `region` with each `(offset, text)` inserted and `tail` appended.
fn splice<'a>(region: &'a str, inserts: &[(usize, String)], tail: String) -> Cow<'a, str> {
    if inserts.is_empty() && tail.is_empty() {
        return Cow::Borrowed(region);
    }
    let mut out = String::with_capacity(region.len() + tail.len());
    let mut last = 0;
    for (at, text) in inserts {
        let at = (*at).min(region.len());
        out.push_str(&region[last..at]);
        out.push_str(text);
        last = at;
    }
    out.push_str(&region[last..]);
    out.push_str(&tail);
    Cow::Owned(out)
}

fn parse_object(region: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(region) {
        Ok(Value::Object(map)) => return Ok(map),
        Ok(_) => return Err("arguments are not a JSON object".into()),
        Err(_) => {}
    }
    match serde_json::from_str::<Value>(&repair(region)) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("arguments are not a JSON object".into()),
        Err(e) => Err(format!("invalid JSON after repair: {e}")),
    }
}

/// Best-effort cleanup of almost-JSON.
///
/// Drops code-fence lines, turns single-quoted strings into double-quoted
/// ones, removes trailing commas before `}`/`]`, and maps Python's
/// `True`/`False`/`None` to JSON literals. Double-quoted strings pass
/// through untouched.
pub fn repair(text: &str) -> String {
    let unfenced = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");
    let chars: Vec<char> = unfenced.chars().collect();
    let mut out = String::with_capacity(unfenced.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let end = string_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
                continue;
            }
            '\'' => {
                out.push('"');
                i += 1;
                while i < chars.len() {
                    match chars[i] {
                        '\\' if i + 1 < chars.len() => {
                            if chars[i + 1] != '\'' {
                                out.push('\\');
                            }
                            out.push(chars[i + 1]);
                            i += 2;
                        }
                        '\'' => {
                            i += 1;
                            break;
                        }
                        '"' => {
                            out.push_str("\\\"");
                            i += 1;
                        }
                        other => {
                            out.push(other);
                            i += 1;
                        }
                    }
                }
                out.push('"');
                continue;
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(next, Some('}') | Some(']')) {
                    i += 1;
                    continue;
                }
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
                continue;
            }
            _ => {}
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Index just past the closing `"` of the string opening at `start`.
fn string_end(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}
