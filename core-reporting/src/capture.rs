//! # Capture Adapter
//!
//! Turns whatever the scripting side threw into an [`ErrorDescriptor`].
//!
//! Capture never fails and never waits on delivery: unknown shapes get
//! defaults (`name = "Error"`, empty message, no frames), and the only
//! shared state touched is an atomic counter and a short-lived lock on the
//! report context.
//!
//! ## Raw value shapes
//!
//! | Thrown value        | Result                                          |
//! |---------------------|-------------------------------------------------|
//! | error-like object   | `name`, `message`, `stack`, `isFatal`/`fatal`   |
//! | other object        | message is the object's JSON                     |
//! | string              | message                                          |
//! | number / boolean    | stringified message                              |
//! | `null`              | empty message                                    |
//! | array               | message is the array's JSON                      |

use crate::stack::{self, first_number};
use bridge_traits::{
    AttributeValue, Attributes, Breadcrumb, Clock, ErrorDescriptor, ReportLevel, SequenceId,
    StackFrame,
};
use core_runtime::config::{BridgeConfig, SequenceScope};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

// ============================================================================
// Sequence Counter
// ============================================================================

/// Issues strictly increasing sequence ids, starting at 1.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: AtomicU64,
}

static PROCESS_COUNTER: OnceLock<Arc<SequenceCounter>> = OnceLock::new();

impl SequenceCounter {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// The counter shared by every reporter in this process.
    ///
    /// Lives until process exit; there is no reset.
    pub fn process() -> Arc<SequenceCounter> {
        Arc::clone(PROCESS_COUNTER.get_or_init(|| Arc::new(SequenceCounter::new())))
    }

    pub fn for_scope(scope: SequenceScope) -> Arc<SequenceCounter> {
        match scope {
            SequenceScope::Process => Self::process(),
            SequenceScope::Isolated => Arc::new(SequenceCounter::new()),
        }
    }

    pub fn next(&self) -> SequenceId {
        SequenceId::new(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Most recently issued id, or 0 if none yet.
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Capture Options
// ============================================================================

/// Per-report overrides for [`CaptureAdapter::capture_with`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureOptions {
    /// Overrides any `isFatal`/`fatal` flag on the raw value
    pub fatal: Option<bool>,
    /// Defaults to `critical` for fatal errors and `error` otherwise
    pub level: Option<ReportLevel>,
    /// Merged over the context attributes; these keys win
    pub attributes: Attributes,
}

impl CaptureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fatal(mut self, fatal: bool) -> Self {
        self.fatal = Some(fatal);
        self
    }

    pub fn level(mut self, level: ReportLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }
}

// ============================================================================
// Report Context
// ============================================================================

/// Session state stamped onto every descriptor at capture time.
#[derive(Debug)]
pub struct ReportContext {
    state: Mutex<ContextState>,
    max_breadcrumbs: usize,
}

#[derive(Debug, Default)]
struct ContextState {
    user_id: Option<String>,
    attributes: Attributes,
    breadcrumbs: VecDeque<Breadcrumb>,
}

/// Copy of the context taken for one capture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSnapshot {
    pub user_id: Option<String>,
    pub attributes: Attributes,
    /// Oldest first
    pub breadcrumbs: Vec<Breadcrumb>,
}

impl ReportContext {
    pub fn new(max_breadcrumbs: usize) -> Self {
        Self {
            state: Mutex::new(ContextState::default()),
            max_breadcrumbs,
        }
    }

    /// Sets or clears the user id. Blank ids clear it.
    pub fn set_user_id(&self, user_id: Option<String>) {
        let user_id = user_id.filter(|id| !id.trim().is_empty());
        self.state.lock().user_id = user_id;
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.state.lock().attributes.insert(key.into(), value.into());
    }

    pub fn set_attributes(&self, attributes: Attributes) {
        self.state.lock().attributes.extend(attributes);
    }

    pub fn remove_attribute(&self, key: &str) -> Option<AttributeValue> {
        self.state.lock().attributes.remove(key)
    }

    /// Appends a breadcrumb, forgetting the oldest one past the limit.
    pub fn record_breadcrumb(&self, breadcrumb: Breadcrumb) {
        if self.max_breadcrumbs == 0 {
            return;
        }

        let mut state = self.state.lock();
        while state.breadcrumbs.len() >= self.max_breadcrumbs {
            state.breadcrumbs.pop_front();
        }
        state.breadcrumbs.push_back(breadcrumb);
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        let state = self.state.lock();
        ContextSnapshot {
            user_id: state.user_id.clone(),
            attributes: state.attributes.clone(),
            breadcrumbs: state.breadcrumbs.iter().cloned().collect(),
        }
    }
}

// ============================================================================
// Capture Adapter
// ============================================================================

pub struct CaptureAdapter {
    counter: Arc<SequenceCounter>,
    clock: Arc<dyn Clock>,
    context: Arc<ReportContext>,
    max_stack_frames: usize,
    last_captured_at: AtomicI64,
}

impl CaptureAdapter {
    pub fn new(
        counter: Arc<SequenceCounter>,
        clock: Arc<dyn Clock>,
        context: Arc<ReportContext>,
        max_stack_frames: usize,
    ) -> Self {
        Self {
            counter,
            clock,
            context,
            max_stack_frames,
            last_captured_at: AtomicI64::new(i64::MIN),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            SequenceCounter::for_scope(config.sequence_scope),
            Arc::clone(&config.clock),
            Arc::new(ReportContext::new(config.max_breadcrumbs)),
            config.max_stack_frames,
        )
    }

    pub fn context(&self) -> &Arc<ReportContext> {
        &self.context
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Normalizes `raw` with default options.
    pub fn capture(&self, raw: &Value) -> ErrorDescriptor {
        self.capture_with(raw, CaptureOptions::default())
    }

    /// Normalizes `raw`, assigning the next sequence id.
    pub fn capture_with(&self, raw: &Value, options: CaptureOptions) -> ErrorDescriptor {
        let parts = RawError::normalize(raw, self.max_stack_frames);

        let fatal = options.fatal.or(parts.fatal).unwrap_or(false);
        let level = options.level.unwrap_or(if fatal {
            ReportLevel::Critical
        } else {
            ReportLevel::Error
        });

        let context = self.context.snapshot();
        let mut attributes = context.attributes;
        attributes.extend(options.attributes);

        let sequence_id = self.counter.next();
        let captured_at = self.captured_at_millis();

        ErrorDescriptor::new(
            sequence_id,
            parts.name.unwrap_or_default(),
            parts.message,
            parts.frames,
            captured_at,
        )
        .with_fatal(fatal)
        .with_level(level)
        .with_attributes(attributes)
        .with_user_id(context.user_id)
        .with_breadcrumbs(context.breadcrumbs)
    }

    /// Wall-clock millis, never earlier than a previous capture's.
    fn captured_at_millis(&self) -> i64 {
        let now = self.clock.unix_timestamp_millis();
        let previous = self.last_captured_at.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }
}

impl std::fmt::Debug for CaptureAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureAdapter")
            .field("last_sequence_id", &self.counter.last())
            .field("max_stack_frames", &self.max_stack_frames)
            .finish()
    }
}

// ============================================================================
// Raw value normalization
// ============================================================================

#[derive(Debug, Default)]
struct RawError {
    name: Option<String>,
    message: String,
    frames: Vec<StackFrame>,
    fatal: Option<bool>,
}

impl RawError {
    fn normalize(raw: &Value, max_frames: usize) -> Self {
        match raw {
            Value::Object(object) => Self::from_object(object, max_frames),
            Value::String(message) => Self::with_message(message.clone()),
            Value::Number(number) => Self::with_message(number.to_string()),
            Value::Bool(flag) => Self::with_message(flag.to_string()),
            Value::Null => Self::default(),
            Value::Array(_) => Self::with_message(raw.to_string()),
        }
    }

    fn with_message(message: String) -> Self {
        Self {
            message,
            ..Self::default()
        }
    }

    fn from_object(object: &Map<String, Value>, max_frames: usize) -> Self {
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let message = match object.get("message") {
            Some(Value::String(message)) => Some(message.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(scalar_text(other)),
        };

        let mut frames = match object.get("stack") {
            Some(Value::String(stack)) => stack::parse_stack(stack, max_frames),
            Some(Value::Array(entries)) => stack::frames_from_array(entries, max_frames),
            _ => Vec::new(),
        };

        if frames.is_empty() && max_frames > 0 {
            frames.extend(legacy_frame(object));
        }

        let fatal = ["isFatal", "fatal"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_bool));

        let error_like = name.is_some() || message.is_some() || object.contains_key("stack");
        let message = match message {
            Some(message) => message,
            // A plain thrown object carries its information in its fields
            None if !error_like && !object.is_empty() => Value::Object(object.clone()).to_string(),
            None => String::new(),
        };

        Self {
            name,
            message,
            frames,
            fatal,
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}

/// Frame built from `fileName`/`lineNumber`/`columnNumber` when the stack
/// itself produced nothing.
fn legacy_frame(object: &Map<String, Value>) -> Option<StackFrame> {
    let file = object
        .get("fileName")
        .or_else(|| object.get("sourceURL"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|file| !file.is_empty());
    let line = first_number(object, &["lineNumber", "line"]);
    let column = first_number(object, &["columnNumber", "column"]);

    if file.is_none() && line.is_none() {
        return None;
    }

    let mut frame = StackFrame::new().with_location(line, column);
    if let Some(file) = file {
        frame = frame.with_file(file);
    }
    Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::DEFAULT_ERROR_NAME;
    use serde_json::json;

    /// Clock whose reading is set by the test.
    struct FixedClock(AtomicI64);

    impl Clock for FixedClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            chrono::DateTime::from_timestamp_millis(self.unix_timestamp_millis()).unwrap_or_default()
        }

        fn unix_timestamp_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn adapter_with_clock(clock: Arc<FixedClock>) -> CaptureAdapter {
        CaptureAdapter::new(
            Arc::new(SequenceCounter::new()),
            clock,
            Arc::new(ReportContext::new(3)),
            128,
        )
    }

    fn adapter() -> CaptureAdapter {
        adapter_with_clock(Arc::new(FixedClock(AtomicI64::new(1_700_000_000_000))))
    }

    #[test]
    fn test_sequence_counter_starts_at_one() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.last(), 0);
        assert_eq!(counter.next().value(), 1);
        assert_eq!(counter.next().value(), 2);
        assert_eq!(counter.last(), 2);
    }

    #[test]
    fn test_process_counter_is_shared() {
        let a = SequenceCounter::process();
        let b = SequenceCounter::for_scope(SequenceScope::Process);
        assert!(Arc::ptr_eq(&a, &b));

        let isolated = SequenceCounter::for_scope(SequenceScope::Isolated);
        assert!(!Arc::ptr_eq(&a, &isolated));
        assert_eq!(isolated.next().value(), 1);
    }

    #[test]
    fn test_every_shape_yields_a_valid_descriptor() {
        let adapter = adapter();
        let shapes = [
            json!({ "name": "TypeError", "message": "x is undefined" }),
            json!({ "message": "no name" }),
            json!({ "name": "   ", "message": 42 }),
            json!({ "code": 7 }),
            json!({}),
            json!("plain string"),
            json!(404),
            json!(false),
            json!(null),
            json!([1, "two"]),
        ];

        let mut last = 0;
        for shape in &shapes {
            let descriptor = adapter.capture(shape);
            assert!(!descriptor.name().is_empty(), "{shape}");
            assert!(descriptor.sequence_id().value() > last);
            assert!(descriptor.validate().is_ok());
            last = descriptor.sequence_id().value();
        }
    }

    #[test]
    fn test_error_object_fields() {
        let descriptor = adapter().capture(&json!({
            "name": "RangeError",
            "message": "index out of bounds",
            "stack": "RangeError: index out of bounds\n    at get (list.js:3:9)\n    at main (app.js:1:1)",
            "isFatal": true,
        }));

        assert_eq!(descriptor.name(), "RangeError");
        assert_eq!(descriptor.message(), "index out of bounds");
        assert_eq!(descriptor.stack_frames().len(), 2);
        assert_eq!(descriptor.stack_frames()[0].function.as_deref(), Some("get"));
        assert!(descriptor.fatal());
        assert_eq!(descriptor.level(), ReportLevel::Critical);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let descriptor = adapter().capture(&json!({}));

        assert_eq!(descriptor.name(), DEFAULT_ERROR_NAME);
        assert_eq!(descriptor.message(), "");
        assert!(descriptor.stack_frames().is_empty());
        assert!(!descriptor.fatal());
        assert_eq!(descriptor.level(), ReportLevel::Error);
    }

    #[test]
    fn test_scalar_shapes() {
        let adapter = adapter();
        assert_eq!(adapter.capture(&json!("boom")).message(), "boom");
        assert_eq!(adapter.capture(&json!(3.5)).message(), "3.5");
        assert_eq!(adapter.capture(&json!(true)).message(), "true");
        assert_eq!(adapter.capture(&json!(null)).message(), "");
        assert_eq!(adapter.capture(&json!([1, 2])).message(), "[1,2]");
        assert_eq!(adapter.capture(&json!({ "code": 7 })).message(), r#"{"code":7}"#);
    }

    #[test]
    fn test_frame_array_stack() {
        let descriptor = adapter().capture(&json!({
            "name": "Error",
            "message": "from native",
            "stack": [
                { "methodName": "a", "file": "x.js", "lineNumber": 1, "column": 2 },
                { "methodName": "b", "file": "y.js", "lineNumber": 3, "column": 4 },
            ],
        }));

        let names: Vec<_> = descriptor
            .stack_frames()
            .iter()
            .filter_map(|f| f.function.as_deref())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_legacy_location_fields() {
        let descriptor = adapter().capture(&json!({
            "name": "SyntaxError",
            "message": "Unexpected token",
            "fileName": "bundle.js",
            "lineNumber": "12",
            "columnNumber": 8,
        }));

        let frames = descriptor.stack_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].file.as_deref(), Some("bundle.js"));
        assert_eq!(frames[0].line, Some(12));
        assert_eq!(frames[0].column, Some(8));
    }

    #[test]
    fn test_stack_depth_capped() {
        let stack = (0..50)
            .map(|i| format!("at f{i} (app.js:{i}:1)"))
            .collect::<Vec<_>>()
            .join("\n");
        let adapter = CaptureAdapter::new(
            Arc::new(SequenceCounter::new()),
            Arc::new(FixedClock(AtomicI64::new(0))),
            Arc::new(ReportContext::new(0)),
            5,
        );

        let descriptor = adapter.capture(&json!({ "stack": stack }));
        assert_eq!(descriptor.stack_frames().len(), 5);
        assert_eq!(descriptor.stack_frames()[0].function.as_deref(), Some("f0"));
    }

    #[test]
    fn test_options_override_raw_fatal() {
        let raw = json!({ "message": "handled", "isFatal": true });

        let descriptor = adapter().capture_with(&raw, CaptureOptions::new().fatal(false));
        assert!(!descriptor.fatal());
        assert_eq!(descriptor.level(), ReportLevel::Error);

        let descriptor =
            adapter().capture_with(&raw, CaptureOptions::new().level(ReportLevel::Warning));
        assert!(descriptor.fatal());
        assert_eq!(descriptor.level(), ReportLevel::Warning);
    }

    #[test]
    fn test_context_stamped_on_capture() {
        let adapter = adapter();
        let context = adapter.context();
        context.set_user_id(Some("user-1".to_string()));
        context.set_attribute("screen", "checkout");
        context.set_attribute("build", 12i64);
        for i in 0..5 {
            context.record_breadcrumb(Breadcrumb::new(format!("tap-{i}"), i));
        }

        let descriptor = adapter.capture_with(
            &json!("boom"),
            CaptureOptions::new().attribute("screen", "payment"),
        );

        assert_eq!(descriptor.user_id(), Some("user-1"));
        assert_eq!(
            descriptor.attributes().get("screen"),
            Some(&AttributeValue::from("payment"))
        );
        assert_eq!(
            descriptor.attributes().get("build"),
            Some(&AttributeValue::from(12i64))
        );
        let crumbs: Vec<_> = descriptor.breadcrumbs().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(crumbs, vec!["tap-2", "tap-3", "tap-4"]);
    }

    #[test]
    fn test_context_mutation() {
        let context = ReportContext::new(2);
        context.set_attribute("a", true);
        assert_eq!(context.remove_attribute("a"), Some(AttributeValue::Bool(true)));
        assert_eq!(context.remove_attribute("a"), None);

        context.set_user_id(Some("  ".to_string()));
        assert_eq!(context.snapshot().user_id, None);

        let disabled = ReportContext::new(0);
        disabled.record_breadcrumb(Breadcrumb::new("ignored", 0));
        assert!(disabled.snapshot().breadcrumbs.is_empty());
    }

    #[test]
    fn test_capture_timestamps_never_go_backwards() {
        let clock = Arc::new(FixedClock(AtomicI64::new(5_000)));
        let adapter = adapter_with_clock(Arc::clone(&clock));

        let first = adapter.capture(&json!("a"));
        clock.0.store(4_000, Ordering::SeqCst);
        let second = adapter.capture(&json!("b"));

        assert_eq!(first.captured_at_millis(), 5_000);
        assert_eq!(second.captured_at_millis(), 5_000);
    }
}
