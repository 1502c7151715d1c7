//! Test script data model
//!
//! A script is an ordered list of steps ingested as structured JSON. Field
//! names follow the wire format produced by the front end (`type`, `isHex`,
//! `time`), and unrecognized step or validation types survive parsing so the
//! sequencer can mark them failed instead of rejecting the whole script.

use serde::{Deserialize, Serialize};

/// What a step does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    /// Send a payload to the device
    Send,
    /// Poll for a reply and validate it
    Receive,
    /// Sleep for a fixed time
    Delay,
    /// Clear the transport's receive buffer
    Clear,
    /// Anything else; always fails at execution
    Unknown(String),
}

impl From<String> for StepKind {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "send" => Self::Send,
            "receive" => Self::Receive,
            "delay" => Self::Delay,
            "clear" => Self::Clear,
            _ => Self::Unknown(s),
        }
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        match kind {
            StepKind::Send => "send".to_string(),
            StepKind::Receive => "receive".to_string(),
            StepKind::Delay => "delay".to_string(),
            StepKind::Clear => "clear".to_string(),
            StepKind::Unknown(s) => s,
        }
    }
}

/// How a received reply is judged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValidationKind {
    /// Any non-empty reply passes
    Exists,
    /// Exact string match
    Equals,
    /// Substring match
    Contains,
    /// Anything else; always fails
    Unknown(String),
}

impl From<String> for ValidationKind {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "exists" => Self::Exists,
            "equals" => Self::Equals,
            "contains" => Self::Contains,
            _ => Self::Unknown(s),
        }
    }
}

impl From<ValidationKind> for String {
    fn from(kind: ValidationKind) -> Self {
        match kind {
            ValidationKind::Exists => "exists".to_string(),
            ValidationKind::Equals => "equals".to_string(),
            ValidationKind::Contains => "contains".to_string(),
            ValidationKind::Unknown(s) => s,
        }
    }
}

/// Validation rule attached to a `receive` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    /// Rule type
    #[serde(rename = "type")]
    pub kind: ValidationKind,
    /// Expected value (unused for `exists`)
    #[serde(default)]
    pub value: String,
}

impl Validation {
    /// Build a `contains` rule.
    pub fn contains(value: &str) -> Self {
        Self {
            kind: ValidationKind::Contains,
            value: value.to_string(),
        }
    }

    /// Build an `equals` rule.
    pub fn equals(value: &str) -> Self {
        Self {
            kind: ValidationKind::Equals,
            value: value.to_string(),
        }
    }

    /// Build an `exists` rule.
    pub fn exists() -> Self {
        Self {
            kind: ValidationKind::Exists,
            value: String::new(),
        }
    }
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step identifier (uniqueness not enforced)
    #[serde(default)]
    pub id: String,
    /// Step type
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Payload: literal text, or space-separated hex pairs when `is_hex`
    #[serde(default)]
    pub content: String,
    /// Interpret `content` as hex, and render replies as hex
    #[serde(rename = "isHex", default)]
    pub is_hex: bool,
    /// Sleep time in milliseconds (delay steps only)
    #[serde(rename = "time", default)]
    pub delay_ms: u64,
    /// Validation rule (receive steps only); absence always passes
    #[serde(default)]
    pub validation: Option<Validation>,
}

impl Step {
    /// Build a `send` step.
    pub fn send(content: &str, is_hex: bool) -> Self {
        Self {
            kind: StepKind::Send,
            content: content.to_string(),
            is_hex,
            ..Self::empty()
        }
    }

    /// Build a `receive` step.
    pub fn receive(is_hex: bool, validation: Option<Validation>) -> Self {
        Self {
            kind: StepKind::Receive,
            is_hex,
            validation,
            ..Self::empty()
        }
    }

    /// Build a `delay` step.
    pub fn delay(ms: u64) -> Self {
        Self {
            kind: StepKind::Delay,
            delay_ms: ms,
            ..Self::empty()
        }
    }

    /// Build a `clear` step.
    pub fn clear() -> Self {
        Self {
            kind: StepKind::Clear,
            ..Self::empty()
        }
    }

    fn empty() -> Self {
        Self {
            id: String::new(),
            kind: StepKind::Clear,
            name: String::new(),
            content: String::new(),
            is_hex: false,
            delay_ms: 0,
            validation: None,
        }
    }
}

/// Replace-only script holder.
///
/// Loading new steps atomically discards the previous ones; there is no
/// incremental edit. Runs receive the steps by value, so later loads do not
/// affect an in-flight run.
#[derive(Debug, Clone, Default)]
pub struct ScriptStore {
    steps: Vec<Step>,
}

impl ScriptStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held script with `steps`.
    pub fn load(&mut self, steps: Vec<Step>) {
        self.steps.clear();
        self.steps.extend(steps);
    }

    /// Drop all steps.
    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// View the held steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Copy the held steps for handing to a run.
    pub fn to_vec(&self) -> Vec<Step> {
        self.steps.clone()
    }

    /// Number of held steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when no script is loaded.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Parse a script from its JSON ingestion form (an ordered array of steps).
pub fn parse_script(json: &str) -> Result<Vec<Step>, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingestion_format() {
        let json = r#"[
            {"id":"1","type":"send","name":"ping","content":"AA BB","isHex":true},
            {"id":"2","type":"delay","time":50},
            {"id":"3","type":"receive","isHex":false,"validation":{"type":"contains","value":"OK"}},
            {"id":"4","type":"clear"}
        ]"#;
        let steps = parse_script(json).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].kind, StepKind::Send);
        assert!(steps[0].is_hex);
        assert_eq!(steps[1].delay_ms, 50);
        assert_eq!(
            steps[2].validation,
            Some(Validation::contains("OK"))
        );
        assert_eq!(steps[3].kind, StepKind::Clear);
    }

    #[test]
    fn test_unknown_types_survive_parsing() {
        let json = r#"[
            {"type":"frobnicate"},
            {"type":"receive","validation":{"type":"regex","value":"^OK$"}}
        ]"#;
        let steps = parse_script(json).unwrap();
        assert_eq!(steps[0].kind, StepKind::Unknown("frobnicate".to_string()));
        assert_eq!(
            steps[1].validation.as_ref().unwrap().kind,
            ValidationKind::Unknown("regex".to_string())
        );
    }

    #[test]
    fn test_type_names_are_case_insensitive() {
        let json = r#"[{"type":"SEND","content":"hi"}]"#;
        let steps = parse_script(json).unwrap();
        assert_eq!(steps[0].kind, StepKind::Send);
    }

    #[test]
    fn test_store_load_replaces() {
        let mut store = ScriptStore::new();
        store.load(vec![Step::delay(10), Step::delay(20)]);
        store.load(vec![Step::clear()]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.steps()[0].kind, StepKind::Clear);
    }

    #[test]
    fn test_store_load_is_idempotent() {
        let script = vec![Step::send("AT", false), Step::receive(false, None)];
        let mut store = ScriptStore::new();
        store.load(script.clone());
        store.load(script.clone());
        assert_eq!(store.steps(), script.as_slice());
    }

    #[test]
    fn test_store_clear() {
        let mut store = ScriptStore::new();
        store.load(vec![Step::delay(1)]);
        store.clear();
        assert!(store.is_empty());
    }
}
