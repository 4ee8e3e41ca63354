//! Parsing of configuration attribute values
//!
//! `<props>`, `<methods>` and `<eventMethods>` carry their values as
//! attribute strings. A value is an object literal, an inline function or an
//! array literal, recognised by shape in that order.
//!
//! Inline functions are executable code taken from markup; only trusted
//! HTML may flow through here.

use super::script::{Scope, ScriptContext, ScriptFunction};
use crate::utils::ScriptError;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static OBJECT_SHAPE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)^\{.*\}$").ok());
static FUNCTION_SHAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)^(?:\(?[\w\s,$]*\)?\s*=>|function\b)").ok());
static ARRAY_SHAPE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)^\[.*\]$").ok());

/// A parsed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Object(Value),
    Function(ScriptFunction),
    Array(Value),
}

impl AttributeValue {
    /// The data value; functions have none
    pub fn into_value(self) -> Option<Value> {
        match self {
            AttributeValue::Object(v) | AttributeValue::Array(v) => Some(v),
            AttributeValue::Function(_) => None,
        }
    }
}

fn is_shape(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

/// Strict JSON first, then the same text as an expression (`{a: 'x'}`)
fn literal(text: &str) -> Result<Value, ScriptError> {
    serde_json::from_str(text).or_else(|json_err| {
        ScriptContext::detached(Map::new())
            .and_then(|mut script| script.eval(text))
            .map_err(|e| ScriptError::Syntax(format!("{json_err}; {e}")))
    })
}

/// Parse an attribute value by shape: object, then function, then array
pub fn parse_attribute_value(raw: &str) -> Result<AttributeValue, ScriptError> {
    let text = raw.trim();
    if is_shape(&OBJECT_SHAPE, text) {
        return match literal(text)? {
            value @ Value::Object(_) => Ok(AttributeValue::Object(value)),
            other => Err(ScriptError::Type(format!("expected an object, got {other}"))),
        };
    }
    if is_shape(&FUNCTION_SHAPE, text) {
        return ScriptFunction::parse(text).map(AttributeValue::Function);
    }
    if is_shape(&ARRAY_SHAPE, text) {
        return match literal(text)? {
            value @ Value::Array(_) => Ok(AttributeValue::Array(value)),
            other => Err(ScriptError::Type(format!("expected an array, got {other}"))),
        };
    }
    Err(ScriptError::Syntax(format!("unrecognised value format: {text:?}")))
}
