//! Stack trace normalization.
//!
//! Scripting engines hand over stacks either as one string or as an array of
//! frame objects. Both become [`StackFrame`] lists, innermost first.
//!
//! Recognized string formats:
//!
//! | Engine        | Line shape                              |
//! |---------------|-----------------------------------------|
//! | V8 / Hermes   | `at fn (file:line:col)`, `at file:line:col` |
//! | JavaScriptCore| `fn@file:line:col`, `@file:line:col`    |
//!
//! Anything else (the leading `TypeError: ...` line, blank lines, engine
//! noise) is skipped.

use bridge_traits::StackFrame;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static V8_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*at\s+(?:(?P<function>.+?)\s+\((?P<location>.*)\)|(?P<bare>\S.*?))\s*$")
        .expect("valid V8 frame pattern")
});

static JSC_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<function>[^@\s]*|global code|eval code|module code)@(?P<location>.+?)\s*$")
        .expect("valid JSC frame pattern")
});

static LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<file>.*?)(?::(?P<line>\d+))?(?::(?P<column>\d+))?$")
        .expect("valid location pattern")
});

/// Parses a stack string, keeping at most `max_frames` innermost frames.
pub fn parse_stack(stack: &str, max_frames: usize) -> Vec<StackFrame> {
    stack
        .lines()
        .filter_map(parse_frame_line)
        .take(max_frames)
        .collect()
}

/// Parses a single stack line, or `None` if it is not a frame.
pub fn parse_frame_line(line: &str) -> Option<StackFrame> {
    if let Some(caps) = V8_FRAME.captures(line) {
        let (function, location) = match caps.name("bare") {
            Some(bare) => (None, bare.as_str()),
            None => (
                caps.name("function").map(|m| m.as_str()),
                caps.name("location").map_or("", |m| m.as_str()),
            ),
        };
        // Hermes bytecode frames read "address at file:line:col"
        let location = location.strip_prefix("address at ").unwrap_or(location);
        return build_frame(function, location);
    }

    let caps = JSC_FRAME.captures(line)?;
    build_frame(
        caps.name("function").map(|m| m.as_str()),
        caps.name("location").map_or("", |m| m.as_str()),
    )
}

fn build_frame(function: Option<&str>, location: &str) -> Option<StackFrame> {
    let mut frame = StackFrame::new();

    if let Some(function) = function.and_then(clean_function_name) {
        frame = frame.with_function(function);
    }

    let (file, line, column) = split_location(location.trim());
    if let Some(file) = file {
        frame = frame.with_file(file);
    }
    frame = frame.with_location(line, column);

    (!frame.is_empty()).then_some(frame)
}

fn split_location(location: &str) -> (Option<&str>, Option<u32>, Option<u32>) {
    let Some(caps) = LOCATION.captures(location) else {
        return (non_empty(location), None, None);
    };

    let number = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());
    let file = caps.name("file").and_then(|m| non_empty(m.as_str()));

    (file, number("line"), number("column"))
}

fn clean_function_name(name: &str) -> Option<&str> {
    let name = name.trim();
    match name {
        "" | "?" | "<unknown>" | "anonymous" | "<anonymous>" | "global code" | "eval code"
        | "module code" => None,
        other => Some(other),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Converts an array of frame objects, keeping at most `max_frames`.
///
/// Accepts `methodName`/`function`, `file`/`fileName`, `lineNumber`/`line`
/// and `column`/`columnNumber`. Line and column may be numbers or numeric
/// strings. Entries that are not objects, or carry no usable field, are
/// skipped.
pub fn frames_from_array(values: &[Value], max_frames: usize) -> Vec<StackFrame> {
    values
        .iter()
        .filter_map(Value::as_object)
        .filter_map(frame_from_object)
        .take(max_frames)
        .collect()
}

fn frame_from_object(object: &Map<String, Value>) -> Option<StackFrame> {
    let mut frame = StackFrame::new();

    if let Some(function) = first_str(object, &["methodName", "function", "functionName"])
        .and_then(clean_function_name)
    {
        frame = frame.with_function(function);
    }

    if let Some(file) = first_str(object, &["file", "fileName"]).and_then(non_empty) {
        frame = frame.with_file(file);
    }

    frame = frame.with_location(
        first_number(object, &["lineNumber", "line"]),
        first_number(object, &["column", "columnNumber"]),
    );

    (!frame.is_empty()).then_some(frame)
}

fn first_str<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| object.get(*key).and_then(Value::as_str))
}

pub(crate) fn first_number(object: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(location_number))
}

/// Reads a line or column value given as a number or numeric string.
pub(crate) fn location_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_v8_frame_with_function() {
        let frame = parse_frame_line("    at Object.render (/app/src/view.js:42:17)").unwrap();

        assert_eq!(frame.function.as_deref(), Some("Object.render"));
        assert_eq!(frame.file.as_deref(), Some("/app/src/view.js"));
        assert_eq!(frame.line, Some(42));
        assert_eq!(frame.column, Some(17));
    }

    #[test]
    fn test_v8_bare_location() {
        let frame = parse_frame_line("at http://localhost:8081/index.bundle:120:9").unwrap();

        assert_eq!(frame.function, None);
        assert_eq!(frame.file.as_deref(), Some("http://localhost:8081/index.bundle"));
        assert_eq!(frame.line, Some(120));
        assert_eq!(frame.column, Some(9));
    }

    #[test]
    fn test_hermes_address_frame() {
        let frame = parse_frame_line("at onPress (address at index.android.bundle:1:53420)").unwrap();

        assert_eq!(frame.function.as_deref(), Some("onPress"));
        assert_eq!(frame.file.as_deref(), Some("index.android.bundle"));
        assert_eq!(frame.column, Some(53420));
    }

    #[test]
    fn test_native_frame_without_position() {
        let frame = parse_frame_line("at forEach (native)").unwrap();

        assert_eq!(frame.function.as_deref(), Some("forEach"));
        assert_eq!(frame.file.as_deref(), Some("native"));
        assert_eq!(frame.line, None);
    }

    #[test]
    fn test_jsc_frames() {
        let frame = parse_frame_line("handlePress@main.jsbundle:310:22").unwrap();
        assert_eq!(frame.function.as_deref(), Some("handlePress"));
        assert_eq!(frame.line, Some(310));

        let global = parse_frame_line("global code@main.jsbundle:1:1").unwrap();
        assert_eq!(global.function, None);
        assert_eq!(global.file.as_deref(), Some("main.jsbundle"));

        assert!(parse_frame_line("Error: failed for user a@b").is_none());

        let anonymous = parse_frame_line("@main.jsbundle:5:1").unwrap();
        assert_eq!(anonymous.function, None);
        assert_eq!(anonymous.file.as_deref(), Some("main.jsbundle"));

        let native = parse_frame_line("forEach@[native code]").unwrap();
        assert_eq!(native.file.as_deref(), Some("[native code]"));
    }

    #[test]
    fn test_placeholder_function_names_dropped() {
        let frame = parse_frame_line("at <unknown> (app.js:1:2)").unwrap();
        assert_eq!(frame.function, None);

        let frame = parse_frame_line("at anonymous (app.js:3:4)").unwrap();
        assert_eq!(frame.function, None);
        assert_eq!(frame.line, Some(3));
    }

    #[test]
    fn test_parse_stack_skips_header_and_noise() {
        let stack = "TypeError: undefined is not a function\n\
                     \x20   at inner (app.js:10:5)\n\
                     \n\
                     \x20   at outer (app.js:20:1)\n\
                     some engine noise";

        let frames = parse_stack(stack, 128);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].function.as_deref(), Some("inner"));
        assert_eq!(frames[1].function.as_deref(), Some("outer"));
    }

    #[test]
    fn test_parse_stack_keeps_innermost_frames() {
        let stack = (0..10)
            .map(|i| format!("at f{i} (app.js:{i}:1)"))
            .collect::<Vec<_>>()
            .join("\n");

        let frames = parse_stack(&stack, 3);
        let names: Vec<_> = frames.iter().filter_map(|f| f.function.as_deref()).collect();
        assert_eq!(names, vec!["f0", "f1", "f2"]);
    }

    #[test]
    fn test_frames_from_array() {
        let frames = json!([
            { "methodName": "render", "file": "view.js", "lineNumber": 12, "column": 4 },
            { "function": "?", "fileName": "lib.js", "line": "7" },
            "not a frame",
            {},
        ]);

        let frames = frames_from_array(frames.as_array().unwrap(), 128);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].function.as_deref(), Some("render"));
        assert_eq!(frames[0].column, Some(4));
        assert_eq!(frames[1].function, None);
        assert_eq!(frames[1].file.as_deref(), Some("lib.js"));
        assert_eq!(frames[1].line, Some(7));
    }

    #[test]
    fn test_location_number_shapes() {
        assert_eq!(location_number(&json!(12)), Some(12));
        assert_eq!(location_number(&json!(12.0)), Some(12));
        assert_eq!(location_number(&json!(" 9 ")), Some(9));
        assert_eq!(location_number(&json!(-1)), None);
        assert_eq!(location_number(&json!(1.5)), None);
        assert_eq!(location_number(&json!(true)), None);
    }
}
