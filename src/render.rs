//! Template rendering
//!
//! Evaluates `${{ ... }}` tags embedded in YAML string fields against the
//! resolved variable context. The expression language is deliberately
//! minimal: literals, `env`/`vars`/`args` lookups with attribute and index
//! access, `get("...")` for dash-named keys, comparisons, and boolean
//! operators. General-purpose scripting is not exposed.

use crate::error::{RenderError, RenderResult};
use regex::Regex;
use serde_yaml::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Everything an expression may reference, plus the scope name used in
/// error messages
pub struct RenderContext<'a> {
    pub env: &'a HashMap<String, String>,
    pub vars: &'a HashMap<String, Value>,
    pub args: &'a HashMap<String, Value>,
    pub scope: &'a str,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        env: &'a HashMap<String, String>,
        vars: &'a HashMap<String, Value>,
        args: &'a HashMap<String, Value>,
        scope: &'a str,
    ) -> Self {
        RenderContext {
            env,
            vars,
            args,
            scope,
        }
    }
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{\{(.*?)\}\}").expect("tag regex"))
}

/// Render every `${{ ... }}` tag in `text`. A string without tags is
/// returned unchanged, so re-rendering already-rendered output is a no-op.
pub fn render(text: &str, ctx: &RenderContext<'_>) -> RenderResult<String> {
    let re = tag_regex();
    let mut result = String::with_capacity(text.len());
    let mut last_end = 0;

    for caps in re.captures_iter(text) {
        let whole = caps.get(0).expect("tag match");
        let expr = caps.get(1).expect("tag body").as_str();

        result.push_str(&text[last_end..whole.start()]);
        let value = evaluate(expr, ctx)?;
        result.push_str(&stringify(&value));
        last_end = whole.end();
    }

    result.push_str(&text[last_end..]);
    Ok(result)
}

/// Render a conditional expression to a boolean. The rendered text is
/// YAML-parsed first, so `"false"`, `"0"`, `"null"` and the empty string
/// are all falsy.
pub fn render_bool(text: &str, ctx: &RenderContext<'_>) -> RenderResult<bool> {
    let rendered = render(text, ctx)?;
    Ok(truthy(&parse_scalar(rendered.trim())))
}

/// Render a templated field and reparse it as a YAML value, so numeric and
/// boolean argument overrides keep their type
pub fn render_value(text: &str, ctx: &RenderContext<'_>) -> RenderResult<Value> {
    let rendered = render(text, ctx)?;
    Ok(parse_scalar(rendered.trim()))
}

/// Plain-text form of a value for substitution into command bodies
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// YAML truthiness used by `if` conditions
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(seq) => !seq.is_empty(),
        Value::Mapping(map) => !map.is_empty(),
        Value::Tagged(tagged) => truthy(&tagged.value),
    }
}

fn parse_scalar(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_yaml::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

// --- expression evaluation ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Not,
    And,
    Or,
}

fn evaluate(expr: &str, ctx: &RenderContext<'_>) -> RenderResult<Value> {
    let tokens = tokenize(expr).map_err(|e| invalid(expr, e))?;
    let mut parser = Parser {
        expr,
        tokens,
        pos: 0,
        ctx,
    };
    let value = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(invalid(expr, "trailing input after expression".to_string()));
    }
    Ok(value)
}

fn invalid(expr: &str, message: String) -> RenderError {
    RenderError::InvalidExpression(expr.trim().to_string(), message)
}

fn tokenize(expr: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                if i == chars.len() {
                    return Err("unterminated string literal".to_string());
                }
                i += 1;
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", text))?;
                tokens.push(Token::Num(num));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

struct Parser<'a, 'b> {
    expr: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a RenderContext<'b>,
}

impl Parser<'_, '_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token) -> RenderResult<()> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            other => Err(invalid(
                self.expr,
                format!("expected {:?}, found {:?}", expected, other),
            )),
        }
    }

    fn parse_or(&mut self) -> RenderResult<Value> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> RenderResult<Value> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_unary()?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> RenderResult<Value> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let value = self.parse_unary()?;
            return Ok(Value::Bool(!truthy(&value)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> RenderResult<Value> {
        let left = self.parse_term()?;

        let op = match self.peek() {
            Some(Token::Eq) => Token::Eq,
            Some(Token::Ne) => Token::Ne,
            Some(Token::Lt) => Token::Lt,
            Some(Token::Le) => Token::Le,
            Some(Token::Gt) => Token::Gt,
            Some(Token::Ge) => Token::Ge,
            _ => return Ok(left),
        };
        self.next();
        let right = self.parse_term()?;

        let result = match op {
            Token::Eq => values_equal(&left, &right),
            Token::Ne => !values_equal(&left, &right),
            Token::Lt | Token::Le | Token::Gt | Token::Ge => {
                let ord = compare_values(&left, &right).ok_or_else(|| {
                    invalid(self.expr, "values are not comparable".to_string())
                })?;
                match op {
                    Token::Lt => ord == std::cmp::Ordering::Less,
                    Token::Le => ord != std::cmp::Ordering::Greater,
                    Token::Gt => ord == std::cmp::Ordering::Greater,
                    Token::Ge => ord != std::cmp::Ordering::Less,
                    _ => unreachable!(),
                }
            }
            _ => unreachable!(),
        };

        Ok(Value::Bool(result))
    }

    fn parse_term(&mut self) -> RenderResult<Value> {
        match self.next() {
            Some(Token::Num(n)) => Ok(number_value(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" | "none" => Ok(Value::Null),
                "env" | "vars" | "args" => self.parse_path(&word),
                other => Err(invalid(
                    self.expr,
                    format!(
                        "unknown name '{}' (expressions may reference env, vars and args)",
                        other
                    ),
                )),
            },
            other => Err(invalid(self.expr, format!("unexpected token {:?}", other))),
        }
    }

    /// Attribute/index access rooted at env, vars or args:
    /// `vars.a_b`, `vars.get("a-b")`, `vars.x["k"][0]`
    fn parse_path(&mut self, root: &str) -> RenderResult<Value> {
        let mut current = self.root_value(root);
        let mut resolved = root.to_string();

        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.next();
                    let name = match self.next() {
                        Some(Token::Ident(name)) => name,
                        other => {
                            return Err(invalid(
                                self.expr,
                                format!("expected attribute name, found {:?}", other),
                            ))
                        }
                    };
                    // .get("key") form for keys that are not valid identifiers
                    if name == "get" && self.peek() == Some(&Token::LParen) {
                        self.next();
                        let key = match self.next() {
                            Some(Token::Str(key)) => key,
                            other => {
                                return Err(invalid(
                                    self.expr,
                                    format!("get() expects a string key, found {:?}", other),
                                ))
                            }
                        };
                        self.expect(Token::RParen)?;
                        current = self.index_into(current, &resolved, &Value::String(key.clone()))?;
                        resolved = format!("{}.{}", resolved, key);
                    } else {
                        current =
                            self.index_into(current, &resolved, &Value::String(name.clone()))?;
                        resolved = format!("{}.{}", resolved, name);
                    }
                }
                Some(Token::LBracket) => {
                    self.next();
                    let index = self.parse_or()?;
                    self.expect(Token::RBracket)?;
                    current = self.index_into(current, &resolved, &index)?;
                    resolved = format!("{}[..]", resolved);
                }
                _ => break,
            }
        }

        match current {
            Some(value) => Ok(value),
            None => Err(RenderError::UndefinedVariable {
                name: resolved,
                scope: self.ctx.scope.to_string(),
            }),
        }
    }

    fn root_value(&self, root: &str) -> Option<Value> {
        let map = |entries: serde_yaml::Mapping| Some(Value::Mapping(entries));
        match root {
            "env" => map(self
                .ctx
                .env
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), Value::String(v.clone())))
                .collect()),
            "vars" => map(self
                .ctx
                .vars
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                .collect()),
            "args" => map(self
                .ctx
                .args
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                .collect()),
            _ => None,
        }
    }

    fn index_into(
        &self,
        current: Option<Value>,
        resolved: &str,
        index: &Value,
    ) -> RenderResult<Option<Value>> {
        let container = current.ok_or_else(|| RenderError::UndefinedVariable {
            name: resolved.to_string(),
            scope: self.ctx.scope.to_string(),
        })?;

        Ok(match (&container, index) {
            (Value::Mapping(map), key) => map.get(key).cloned(),
            (Value::Sequence(seq), Value::Number(n)) => n
                .as_u64()
                .and_then(|i| seq.get(i as usize))
                .cloned(),
            _ => None,
        })
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(serde_yaml::Number::from(n as i64))
    } else {
        Value::Number(serde_yaml::Number::from(n))
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return l == r;
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) => l == r,
        (l, r) => l == r,
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return l.partial_cmp(&r);
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}
