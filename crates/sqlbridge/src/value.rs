//! Bound values and PDO-style parameter types.

use crate::error::{BridgeError, BridgeResult};
use std::fmt;

/// A scalar value bound to a `?` placeholder or read back from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Bind type for a placeholder, mirroring the `PDO::PARAM_*` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Lob,
}

impl ParamType {
    /// Best bind type for `value` when the caller supplied none.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Null => ParamType::Null,
            Value::Bool(_) => ParamType::Bool,
            Value::Int(_) => ParamType::Int,
            Value::Float(_) => ParamType::Float,
            Value::Text(_) => ParamType::Str,
            Value::Bytes(_) => ParamType::Lob,
        }
    }
}

/// A value paired with the type it is bound as.
#[derive(Debug, Clone, PartialEq)]
pub struct Bind {
    pub value: Value,
    pub ty: ParamType,
}

impl Bind {
    pub fn inferred(value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = ParamType::infer(&value);
        Self { value, ty }
    }

    pub fn typed(value: impl Into<Value>, ty: ParamType) -> Self {
        Self {
            value: value.into(),
            ty,
        }
    }

    /// Convert the value to the declared bind type.
    pub fn coerced(&self) -> BridgeResult<Value> {
        let mismatch = || {
            BridgeError::Bind(format!(
                "cannot bind {:?} as {:?}",
                self.value, self.ty
            ))
        };

        Ok(match (self.ty, &self.value) {
            (_, Value::Null) | (ParamType::Null, _) => Value::Null,
            (ParamType::Bool, Value::Bool(v)) => Value::Bool(*v),
            (ParamType::Bool, Value::Int(v)) => Value::Bool(*v != 0),
            (ParamType::Int, Value::Int(v)) => Value::Int(*v),
            (ParamType::Int, Value::Bool(v)) => Value::Int(i64::from(*v)),
            (ParamType::Int, Value::Text(s)) => {
                Value::Int(s.trim().parse().map_err(|_| mismatch())?)
            }
            (ParamType::Float, Value::Float(v)) => Value::Float(*v),
            (ParamType::Float, Value::Int(v)) => Value::Float(*v as f64),
            (ParamType::Float, Value::Text(s)) => {
                Value::Float(s.trim().parse().map_err(|_| mismatch())?)
            }
            (ParamType::Str, Value::Bytes(b)) => {
                Value::Text(String::from_utf8(b.clone()).map_err(|_| mismatch())?)
            }
            (ParamType::Str, v) => Value::Text(v.to_string()),
            (ParamType::Lob, Value::Bytes(b)) => Value::Bytes(b.clone()),
            (ParamType::Lob, Value::Text(s)) => Value::Bytes(s.as_bytes().to_vec()),
            _ => return Err(mismatch()),
        })
    }
}

/// Quote a string literal the way MySQL's `quote()` does.
pub fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render `value` as an SQL literal.
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(s) => quote_str(s),
        Value::Bytes(b) => {
            let mut out = String::with_capacity(b.len() * 2 + 3);
            out.push_str("X'");
            for byte in b {
                out.push_str(&format!("{byte:02X}"));
            }
            out.push('\'');
            out
        }
    }
}

/// Lexical context of the placeholder scanner.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Substitute placeholders and report how many values were consumed.
fn substitute_counted(sql: &str, values: &[Value]) -> (String, usize) {
    let mut out = String::with_capacity(sql.len() + values.len() * 8);
    let mut used = 0;
    let mut lex = Lex::Code;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match lex {
            Lex::Quoted(q) => {
                out.push(ch);
                if ch == '\\' && q != '`' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if ch == q {
                    lex = Lex::Code;
                }
            }
            Lex::LineComment => {
                out.push(ch);
                if ch == '\n' {
                    lex = Lex::Code;
                }
            }
            Lex::BlockComment => {
                out.push(ch);
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push('/');
                    lex = Lex::Code;
                }
            }
            Lex::Code => match ch {
                '\'' | '"' | '`' => {
                    out.push(ch);
                    lex = Lex::Quoted(ch);
                }
                '#' => {
                    out.push(ch);
                    lex = Lex::LineComment;
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    out.push_str("--");
                    // MySQL only treats `--` as a comment when whitespace follows.
                    if chars.peek().is_none_or(|c| c.is_whitespace() || c.is_control()) {
                        lex = Lex::LineComment;
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push_str("/*");
                    lex = Lex::BlockComment;
                }
                '?' => match values.get(used) {
                    Some(value) => {
                        out.push_str(&render_literal(value));
                        used += 1;
                    }
                    None => out.push_str("NULL"),
                },
                c => out.push(c),
            },
        }
    }
    (out, used)
}

/// Replace each `?` placeholder in `sql` with the rendered literal of the
/// matching value. Placeholders inside quoted literals, quoted identifiers
/// and comments are left alone; surplus placeholders render as NULL.
pub fn substitute_placeholders(sql: &str, values: &[Value]) -> String {
    substitute_counted(sql, values).0
}

/// Result cache key: the substituted text, followed by every value no
/// placeholder consumed, each after a NUL separator.
pub fn cache_key(sql: &str, values: &[Value]) -> String {
    let (mut key, used) = substitute_counted(sql, values);
    for value in &values[used..] {
        key.push('\0');
        key.push_str(&render_literal(value));
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_param_types() {
        assert_eq!(ParamType::infer(&Value::Null), ParamType::Null);
        assert_eq!(ParamType::infer(&true.into()), ParamType::Bool);
        assert_eq!(ParamType::infer(&7.into()), ParamType::Int);
        assert_eq!(ParamType::infer(&"x".into()), ParamType::Str);
        assert_eq!(ParamType::infer(&1.5.into()), ParamType::Float);
        assert_eq!(ParamType::infer(&vec![1u8].into()), ParamType::Lob);
    }

    #[test]
    fn option_maps_none_to_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::Text("a".into()));
    }

    #[test]
    fn coerces_to_declared_type() {
        assert_eq!(
            Bind::typed(42, ParamType::Str).coerced().unwrap(),
            Value::Text("42".into())
        );
        assert_eq!(
            Bind::typed(" 12 ", ParamType::Int).coerced().unwrap(),
            Value::Int(12)
        );
        assert_eq!(
            Bind::typed(0, ParamType::Bool).coerced().unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            Bind::typed("x", ParamType::Null).coerced().unwrap(),
            Value::Null
        );
        assert!(Bind::typed("abc", ParamType::Int).coerced().is_err());
        assert!(Bind::typed(1.5, ParamType::Bool).coerced().is_err());
    }

    #[test]
    fn quotes_strings_mysql_style() {
        assert_eq!(quote_str("O'Brien"), "'O''Brien'");
        assert_eq!(quote_str(r"a\b"), r"'a\\b'");
        assert_eq!(quote_str("line\nbreak"), r"'line\nbreak'");
    }

    #[test]
    fn renders_literals() {
        assert_eq!(render_literal(&Value::Null), "NULL");
        assert_eq!(render_literal(&true.into()), "TRUE");
        assert_eq!(render_literal(&false.into()), "FALSE");
        assert_eq!(render_literal(&(-3).into()), "-3");
        assert_eq!(render_literal(&vec![0xABu8, 0x01].into()), "X'AB01'");
    }

    #[test]
    fn substitutes_each_placeholder_in_order() {
        let sql = "SELECT * FROM `users` WHERE id=? AND name=? AND active=?";
        let out = substitute_placeholders(sql, &[7.into(), "Ana".into(), true.into()]);
        assert_eq!(
            out,
            "SELECT * FROM `users` WHERE id=7 AND name='Ana' AND active=TRUE"
        );
    }

    #[test]
    fn substitution_skips_quoted_question_marks() {
        let sql = "SELECT '?' AS q, `wh?` FROM t WHERE a=? AND b=?";
        let out = substitute_placeholders(sql, &[1.into()]);
        assert_eq!(out, "SELECT '?' AS q, `wh?` FROM t WHERE a=1 AND b=NULL");
    }

    #[test]
    fn substitution_skips_comments_and_escaped_quotes() {
        let sql = "SELECT * FROM `users` -- don't use ?\nWHERE id=? /* it's ? */ # ?'\nAND n=?";
        let out = substitute_placeholders(sql, &[7.into(), 8.into()]);
        assert_eq!(
            out,
            "SELECT * FROM `users` -- don't use ?\nWHERE id=7 /* it's ? */ # ?'\nAND n=8"
        );

        let sql = r"SELECT 'it\'s ?' AS q FROM `t` WHERE n=?";
        assert_eq!(
            substitute_placeholders(sql, &[1.into()]),
            r"SELECT 'it\'s ?' AS q FROM `t` WHERE n=1"
        );
    }

    #[test]
    fn double_dash_needs_whitespace_to_open_a_comment() {
        assert_eq!(substitute_placeholders("SELECT 1--?", &[2.into()]), "SELECT 1--2");
    }

    #[test]
    fn cache_key_keeps_unplaced_values() {
        let sql = "SELECT '?";
        assert_ne!(cache_key(sql, &[1.into()]), cache_key(sql, &[2.into()]));
        assert_eq!(
            cache_key("SELECT ? AS a", &[1.into(), "x".into()]),
            "SELECT 1 AS a\0'x'"
        );
    }
}
