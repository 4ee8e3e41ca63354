//! Route key compilation
//!
//! A route key is a path made of literal text and typed parameter blocks:
//!
//! ```text
//! /users/:id type:number/posts/:slug type:string
//! ```
//!
//! Compilation produces one matcher per `/`-delimited segment. A candidate
//! location matches when it has exactly as many segments and every segment
//! satisfies its matcher in full.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

static TYPED_PARAM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^:(\w+) type:(\w+)").ok());
static UNTYPED_PARAM: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^:(\w+)").ok());

/// Parameter kinds understood in route keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    /// Unrecognised or omitted kind
    Any,
}

impl ParamKind {
    /// Kind for a `type:` name; unknown names fall back to [`ParamKind::Any`] with a warning
    pub fn from_name(name: &str) -> Self {
        match name {
            "string" => ParamKind::String,
            "number" => ParamKind::Number,
            "boolean" => ParamKind::Boolean,
            other => {
                log::warn!(target: "lonewolf::router", "Unrecognized type: {other}. Using default (.*)");
                ParamKind::Any
            }
        }
    }

    /// Regular sub-pattern matching one value of this kind
    pub fn fragment(self) -> &'static str {
        match self {
            ParamKind::String => r"[\w\d\-_]+",
            ParamKind::Number => "[0-9]+",
            ParamKind::Boolean => "true|false",
            ParamKind::Any => ".*",
        }
    }
}

/// One token of a route key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Param { name: String, kind: ParamKind },
}

/// Split a key into literal runs and parameter blocks.
///
/// A `:` that does not start a parameter name stays in the literal text.
pub fn tokenize(key: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = key;

    while let Some(c) = rest.chars().next() {
        if c == ':' {
            let typed = TYPED_PARAM.as_ref().and_then(|re| re.captures(rest));
            let untyped = UNTYPED_PARAM.as_ref().and_then(|re| re.captures(rest));
            let found = match (typed, untyped) {
                (Some(caps), _) => Some((caps[0].len(), caps[1].to_string(), ParamKind::from_name(&caps[2]))),
                (None, Some(caps)) => Some((caps[0].len(), caps[1].to_string(), ParamKind::Any)),
                _ => None,
            };
            if let Some((consumed, name, kind)) = found {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Param { name, kind });
                rest = &rest[consumed..];
                continue;
            }
        }
        literal.push(c);
        rest = &rest[c.len_utf8()..];
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    tokens
}

#[derive(Debug, Clone)]
enum SegmentMatcher {
    Literal(String),
    Pattern { regex: Regex, params: Vec<String> },
}

impl SegmentMatcher {
    fn matches(&self, candidate: &str) -> bool {
        match self {
            SegmentMatcher::Literal(text) => text == candidate,
            SegmentMatcher::Pattern { regex, .. } => regex.is_match(candidate),
        }
    }
}

/// Captured parameter values keyed by name
pub type Params = HashMap<String, String>;

/// A compiled route key
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    key: String,
    matcher_source: String,
    param_names: Vec<String>,
    structure: Vec<String>,
    segments: Vec<SegmentMatcher>,
}

fn strip_trailing_slash(s: &str) -> &str {
    s.strip_suffix('/').unwrap_or(s)
}

impl CompiledPattern {
    /// Compile a route key. A key without tokens compiles to a matcher that never matches.
    pub fn compile(key: &str) -> Self {
        let trimmed = strip_trailing_slash(key.trim());
        let tokens = tokenize(trimmed);

        let mut matcher_source = String::new();
        let mut param_names = Vec::new();
        let mut structure = Vec::new();
        // Per-segment parts, split on literal '/'
        let mut segment_parts: Vec<Vec<Token>> = vec![Vec::new()];

        for token in &tokens {
            match token {
                Token::Literal(text) => {
                    matcher_source.push_str(text);
                    structure.push(text.clone());
                    let mut pieces = text.split('/');
                    if let Some(first) = pieces.next() {
                        push_literal(&mut segment_parts, first);
                    }
                    for piece in pieces {
                        segment_parts.push(Vec::new());
                        push_literal(&mut segment_parts, piece);
                    }
                }
                Token::Param { name, kind } => {
                    matcher_source.push_str(kind.fragment());
                    structure.push(format!(":{name}"));
                    param_names.push(name.clone());
                    if let Some(last) = segment_parts.last_mut() {
                        last.push(token.clone());
                    }
                }
            }
        }

        let segments = if tokens.is_empty() {
            Vec::new()
        } else {
            segment_parts.iter().filter_map(|parts| build_segment(parts)).collect()
        };

        Self {
            key: key.to_string(),
            matcher_source,
            param_names,
            structure,
            segments,
        }
    }

    /// The key as registered
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Literal text and kind fragments, concatenated
    pub fn matcher_source(&self) -> &str {
        &self.matcher_source
    }

    /// Parameter names in key order
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Literal runs and `:name` markers in key order
    pub fn structure(&self) -> &[String] {
        &self.structure
    }

    /// Number of `/`-delimited segments a location must have
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Check a location against the pattern
    pub fn matches(&self, location: &str) -> bool {
        if self.segments.is_empty() {
            return false;
        }
        let parts: Vec<&str> = strip_trailing_slash(location).split('/').collect();
        parts.len() == self.segments.len()
            && parts
                .iter()
                .zip(&self.segments)
                .all(|(part, segment)| segment.matches(part))
    }

    /// Parameter values of a matching location, `None` when it does not match
    pub fn extract_params(&self, location: &str) -> Option<Params> {
        if !self.matches(location) {
            return None;
        }
        let mut params = Params::new();
        for (part, segment) in strip_trailing_slash(location).split('/').zip(&self.segments) {
            if let SegmentMatcher::Pattern { regex, params: names } = segment {
                if let Some(caps) = regex.captures(part) {
                    for (i, name) in names.iter().enumerate() {
                        if let Some(value) = caps.get(i + 1) {
                            params.insert(name.clone(), value.as_str().to_string());
                        }
                    }
                }
            }
        }
        Some(params)
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.matcher_source)
    }
}

fn push_literal(segments: &mut [Vec<Token>], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(last) = segments.last_mut() {
        last.push(Token::Literal(text.to_string()));
    }
}

fn build_segment(parts: &[Token]) -> Option<SegmentMatcher> {
    if parts.iter().all(|p| matches!(p, Token::Literal(_))) {
        let text: String = parts
            .iter()
            .filter_map(|p| match p {
                Token::Literal(t) => Some(t.as_str()),
                Token::Param { .. } => None,
            })
            .collect();
        return Some(SegmentMatcher::Literal(text));
    }

    let mut source = String::from("^");
    let mut params = Vec::new();
    for part in parts {
        match part {
            Token::Literal(text) => source.push_str(&regex::escape(text)),
            Token::Param { name, kind } => {
                source.push('(');
                source.push_str(kind.fragment());
                source.push(')');
                params.push(name.clone());
            }
        }
    }
    source.push('$');
    match Regex::new(&source) {
        Ok(regex) => Some(SegmentMatcher::Pattern { regex, params }),
        Err(e) => {
            log::error!(target: "lonewolf::router", "cannot compile segment {source}: {e}");
            None
        }
    }
}
