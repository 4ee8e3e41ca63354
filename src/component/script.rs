//! Script evaluation for placeholders and inline component methods
//!
//! Expressions and method bodies run in a Boa [`Context`]. A context is
//! loaded with a chain of frames, the component `this` refers to followed by
//! its ancestors. Inside an expression the props of `this` are free
//! variables, methods are reachable by name (case-insensitive, nearest
//! frame first) and `this` is the component itself. Values cross the
//! boundary as JSON; prop writes are read back after every request.
//!
//! Markup is trusted input: anything reaching this module can call every
//! method of the component it belongs to.

use crate::utils::ScriptError;
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{Context, JsArgs, JsResult, JsValue, NativeFunction, Source, js_string};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Nested JavaScript calls allowed before evaluation gives up
pub const MAX_DEPTH: usize = 64;

/// Iterations a single loop may run
const LOOP_LIMIT: u64 = 100_000;

pub type ScriptResult<T> = std::result::Result<T, ScriptError>;

const PRELUDE: &str = r#"
(function (global) {
  const hasOwn = (object, key) => Object.prototype.hasOwnProperty.call(object, key);
  let frames = {};
  let proxies = {};
  let compiled = {};

  function findKey(object, name) {
    if (hasOwn(object, name)) return name;
    const lower = name.toLowerCase();
    return Object.keys(object).find((key) => key.toLowerCase() === lower);
  }

  function resolve(id, name) {
    const lower = name.toLowerCase();
    for (let frame = frames[id]; frame; frame = frames[frame.parent]) {
      if (hasOwn(frame.methods, lower)) return { source: frame.methods[lower], self: frame.id };
    }
    return undefined;
  }

  function scope(id) {
    if (!hasOwn(proxies, id)) {
      proxies[id] = new Proxy(frames[id].props, {
        has(target, name) {
          return typeof name === 'string' && (findKey(target, name) !== undefined || resolve(id, name) !== undefined);
        },
        get(target, name) {
          if (typeof name !== 'string') return undefined;
          const key = findKey(target, name);
          if (key !== undefined) return target[key];
          const method = resolve(id, name);
          return method ? bind(method.source, method.self) : undefined;
        },
        set(target, name, value) {
          if (typeof name !== 'string') return false;
          const key = findKey(target, name);
          target[key === undefined ? name : key] = value;
          return true;
        },
      });
    }
    return proxies[id];
  }

  function run(self, source) {
    const body = 'with (__scope) { return (' + source + '\n); }';
    return new Function('__scope', body).call(scope(self), scope(self));
  }

  function bind(source, self) {
    const key = self + ':' + source;
    if (!hasOwn(compiled, key)) compiled[key] = run(self, source);
    const fn = compiled[key];
    if (typeof fn !== 'function') throw new TypeError(source + ' is not a function');
    return function (...args) {
      if (args.length === 0 && fn.length > 0) args = [frames[self].props];
      return fn.apply(scope(self), args);
    };
  }

  function snapshot() {
    const out = {};
    for (const id of Object.keys(frames)) out[id] = frames[id].props;
    return out;
  }

  function settle(task) {
    let reply;
    try {
      reply = { ok: task() };
    } catch (e) {
      const name = e && e.name ? String(e.name) : 'Error';
      const message = e && e.message !== undefined ? String(e.message) : String(e);
      reply = { error: name, message };
    }
    try {
      reply.props = snapshot();
      return JSON.stringify(reply);
    } catch (e) {
      return JSON.stringify({ error: 'TypeError', message: 'value cannot be converted to JSON: ' + e.message });
    }
  }

  global.__lonewolf = {
    load(list) {
      frames = {};
      proxies = {};
      compiled = {};
      for (const frame of list) frames[frame.id] = frame;
    },
    evaluate(self, source) {
      return settle(() => run(self, source));
    },
    call(self, name, args) {
      const method = resolve(self, name);
      if (!method) return JSON.stringify({ missing: true });
      return settle(() => bind(method.source, method.self)(...args));
    },
    invoke(self, source, args) {
      return settle(() => bind(source, self)(...args));
    },
    arity(source) {
      return settle(() => {
        const fn = new Function('return (' + source + '\n);')();
        if (typeof fn !== 'function') throw new SyntaxError('not a function: ' + source);
        return fn.length;
      });
    },
  };

  const emit = (level) => (...parts) => __lonewolfHost.log(level, parts.map(String).join(' '));
  global.console = { log: emit('info'), info: emit('info'), debug: emit('debug'), warn: emit('warn'), error: emit('error') };
})(globalThis);
"#;

/// Name resolution for placeholders and method calls
pub trait Scope {
    /// Evaluate an expression against the scope
    fn eval(&mut self, source: &str) -> ScriptResult<Value>;
    /// Invoke a named method; `None` when no such method exists
    fn call(&mut self, name: &str, args: Vec<Value>) -> Option<ScriptResult<Value>>;
}

/// One component as seen by scripts
#[derive(Debug, Clone, Default, Serialize)]
pub struct Frame {
    pub id: usize,
    pub parent: Option<usize>,
    pub props: Map<String, Value>,
    /// Method sources keyed by lowercase name
    pub methods: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct Reply {
    #[serde(default)]
    ok: Value,
    error: Option<String>,
    message: Option<String>,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    props: BTreeMap<usize, Map<String, Value>>,
}

fn host_log(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let level = args.get_or_undefined(0).to_string(ctx)?.to_std_string_escaped();
    let text = args.get_or_undefined(1).to_string(ctx)?.to_std_string_escaped();
    match level.as_str() {
        "error" => log::error!(target: "lonewolf::script", "{text}"),
        "warn" => log::warn!(target: "lonewolf::script", "{text}"),
        "debug" => log::debug!(target: "lonewolf::script", "{text}"),
        _ => log::info!(target: "lonewolf::script", "{text}"),
    }
    Ok(JsValue::undefined())
}

/// JavaScript string literal for `text`
fn quote(text: &str) -> String {
    Value::String(text.to_owned()).to_string()
}

fn classify(name: &str, message: String) -> ScriptError {
    let lower = message.to_lowercase();
    if lower.contains("recursi") || lower.contains("call stack") {
        return ScriptError::RecursionLimit;
    }
    match name {
        "SyntaxError" => ScriptError::Syntax(message),
        "ReferenceError" => ScriptError::Reference(message),
        "TypeError" => ScriptError::Type(message),
        "" => ScriptError::Thrown(message),
        _ => ScriptError::Thrown(format!("{name}: {message}")),
    }
}

/// A Boa context loaded with a frame chain
pub struct ScriptContext {
    context: Context,
    this: usize,
    snapshot: BTreeMap<usize, Map<String, Value>>,
}

impl ScriptContext {
    /// Context for `this`; `frames` holds it and its ancestors
    pub fn new(frames: Vec<Frame>, this: usize) -> ScriptResult<Self> {
        let mut context = Context::default();
        context.runtime_limits_mut().set_recursion_limit(MAX_DEPTH);
        context.runtime_limits_mut().set_loop_iteration_limit(LOOP_LIMIT);

        let host = ObjectInitializer::new(&mut context)
            .function(NativeFunction::from_fn_ptr(host_log), js_string!("log"), 2)
            .build();
        context
            .register_global_property(js_string!("__lonewolfHost"), host, Attribute::all())
            .map_err(|e| ScriptError::Type(e.to_string()))?;
        context
            .eval(Source::from_bytes(PRELUDE))
            .map_err(|e| ScriptError::Syntax(e.to_string()))?;

        let frames = serde_json::to_string(&frames).map_err(|e| ScriptError::Type(e.to_string()))?;
        context
            .eval(Source::from_bytes(&format!("__lonewolf.load({frames})")))
            .map_err(|e| ScriptError::Type(e.to_string()))?;
        Ok(Self {
            context,
            this,
            snapshot: BTreeMap::new(),
        })
    }

    /// Context over plain data, without methods or ancestors
    pub fn detached(props: Map<String, Value>) -> ScriptResult<Self> {
        Self::new(
            vec![Frame {
                props,
                ..Frame::default()
            }],
            0,
        )
    }

    fn request(&mut self, code: &str) -> ScriptResult<Reply> {
        // Runtime limit errors cannot be caught by the prelude and land here
        let value = self.context.eval(Source::from_bytes(code)).map_err(|e| {
            let message = e.to_string();
            log::warn!(target: "lonewolf::script", "{message}");
            classify("", message)
        })?;
        let text = value
            .as_string()
            .map(|s| s.to_std_string_escaped())
            .ok_or_else(|| ScriptError::Type("script host returned no reply".into()))?;
        let mut reply: Reply = serde_json::from_str(&text).map_err(|e| ScriptError::Type(e.to_string()))?;
        self.snapshot.append(&mut reply.props);
        Ok(reply)
    }

    fn settle(reply: Reply) -> ScriptResult<Value> {
        match reply.error {
            Some(name) => Err(classify(&name, reply.message.unwrap_or_default())),
            None => Ok(reply.ok),
        }
    }

    /// Run `function` with `this` bound to the context's component.
    ///
    /// A call without arguments hands the props of `this` to the first
    /// parameter.
    pub fn invoke(&mut self, function: &ScriptFunction, args: Vec<Value>) -> ScriptResult<Value> {
        let code = format!(
            "__lonewolf.invoke({}, {}, {})",
            self.this,
            quote(function.source()),
            Value::Array(args)
        );
        self.request(&code).and_then(Self::settle)
    }

    /// Prop values written since the last call, per frame
    pub fn take_props(&mut self) -> BTreeMap<usize, Map<String, Value>> {
        std::mem::take(&mut self.snapshot)
    }
}

impl Scope for ScriptContext {
    fn eval(&mut self, source: &str) -> ScriptResult<Value> {
        let code = format!("__lonewolf.evaluate({}, {})", self.this, quote(source));
        self.request(&code).and_then(Self::settle)
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Option<ScriptResult<Value>> {
        let code = format!("__lonewolf.call({}, {}, {})", self.this, quote(name), Value::Array(args));
        match self.request(&code) {
            Ok(reply) if reply.missing => None,
            Ok(reply) => Some(Self::settle(reply)),
            Err(e) => Some(Err(e)),
        }
    }
}

impl std::fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptContext").field("this", &self.this).finish()
    }
}

/// An inline function taken from markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFunction {
    source: String,
    arity: usize,
}

impl ScriptFunction {
    /// Check that `source` is a function expression and record its arity
    pub fn parse(source: &str) -> ScriptResult<Self> {
        let source = source.trim();
        let mut script = ScriptContext::detached(Map::new())?;
        let reply = script.request(&format!("__lonewolf.arity({})", quote(source)))?;
        let arity = ScriptContext::settle(reply)?;
        Ok(Self {
            source: source.to_string(),
            arity: arity.as_u64().map_or(0, |n| n as usize),
        })
    }

    /// Declared parameter count
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Truthiness as in JavaScript
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text form used when a value is written into markup; `null` renders as nothing
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> ScriptContext {
        ScriptContext::detached(value.as_object().cloned().unwrap_or_default()).unwrap()
    }

    fn chain() -> Vec<Frame> {
        let methods = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };
        vec![
            Frame {
                id: 1,
                parent: Some(0),
                props: json!({"count": 1}).as_object().cloned().unwrap_or_default(),
                methods: methods(&[("bump", "() => { this.count = this.count + 1; return this.count; }")]),
            },
            Frame {
                id: 0,
                parent: None,
                props: json!({"label": "root"}).as_object().cloned().unwrap_or_default(),
                methods: methods(&[("describe", "(x) => this.label + ':' + x")]),
            },
        ]
    }

    #[test]
    fn test_expressions_see_props() {
        let mut s = data(json!({"userName": "ada", "items": [1, 2, 3]}));
        assert_eq!(s.eval("username + '!'").unwrap(), json!("ada!"));
        assert_eq!(s.eval("items.map(i => i * 2)").unwrap(), json!([2, 4, 6]));
        assert_eq!(s.eval("items.length > 2 && 'many'").unwrap(), json!("many"));
        assert_eq!(s.eval("Math.max(...items)").unwrap(), json!(3));
    }

    #[test]
    fn test_negative_index_and_errors() {
        let mut s = data(json!({"items": [1, 2], "user": null}));
        assert_eq!(s.eval("items[-1]").unwrap(), Value::Null);
        assert_eq!(s.eval("(1.5).toFixed(2)").unwrap(), json!("1.50"));
        assert!(matches!(s.eval("(1).toFixed(500)"), Err(ScriptError::Thrown(_))));
        assert!(matches!(s.eval("user.name"), Err(ScriptError::Type(_))));
        assert!(matches!(s.eval("nothing"), Err(ScriptError::Reference(_))));
        assert!(matches!(s.eval("1 +"), Err(ScriptError::Syntax(_))));
    }

    #[test]
    fn test_assignment_is_read_back() {
        let mut s = data(json!({"count": 1}));
        s.eval("count = count + 1").unwrap();
        s.eval("this.fresh = 'x'").unwrap();
        let props = s.take_props();
        assert_eq!(props[&0]["count"], json!(2));
        assert_eq!(props[&0]["fresh"], json!("x"));
        assert!(s.take_props().is_empty());
    }

    #[test]
    fn test_methods_resolve_through_frames() {
        let mut s = ScriptContext::new(chain(), 1).unwrap();
        assert_eq!(s.call("BUMP", vec![]).unwrap().unwrap(), json!(2));
        assert_eq!(s.eval("describe(count)").unwrap(), json!("root:2"));
        assert!(s.call("missing", vec![]).is_none());
        assert_eq!(s.take_props()[&1]["count"], json!(2));
    }

    #[test]
    fn test_runaway_recursion_is_stopped() {
        let mut frames = chain();
        frames[0]
            .methods
            .insert("spin".into(), "(n) => this.spin(n + 1)".into());
        let mut s = ScriptContext::new(frames, 1).unwrap();
        assert_eq!(s.call("spin", vec![json!(0)]), Some(Err(ScriptError::RecursionLimit)));
    }

    #[test]
    fn test_runaway_loop_is_stopped() {
        let mut s = data(json!({}));
        assert!(s.eval("(() => { while (true) {} })()").is_err());
    }

    #[test]
    fn test_function_parse() {
        assert_eq!(ScriptFunction::parse("(props) => props.x").unwrap().arity(), 1);
        assert_eq!(ScriptFunction::parse(" function (a, b) { return a } ").unwrap().arity(), 2);
        assert_eq!(ScriptFunction::parse("() => {}").unwrap().source(), "() => {}");
        assert!(matches!(ScriptFunction::parse("42"), Err(ScriptError::Syntax(_))));
        assert!(ScriptFunction::parse("(a) => { return }}").is_err());
    }

    #[test]
    fn test_display_and_truthy() {
        assert_eq!(display(&json!(null)), "");
        assert_eq!(display(&json!(2.0)), "2");
        assert_eq!(display(&json!([1, "a"])), "1,a");
        assert!(truthy(&json!("x")));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
    }
}
