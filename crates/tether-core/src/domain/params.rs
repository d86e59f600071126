//! JSON parameters for native requests.
//!
//! ネイティブの入口はオプションをスカラー値だけのフラットな JSON オブジェクトで受け取る。
//! [`JsonParameterSet`] はキーを挿入順に保持し、同じセットからは常に同じバイト列を出力する。
//!
//! 値は閉じた union（[`ParamValue`]）。JSON スカラーでないものは変換時に
//! `InvalidParameterType` で拒否し、型変換で丸めることはしない。
//!
//! # エスケープ
//! `\` と `"` のみ。キーとテキスト値の両方に適用する。その他の制御文字は
//! そのまま出力する（既存の利用側が受け取るバイト列を変えない）。

use serde_json::Number;
use std::fmt;

use super::errors::TetherError;

/// A single scalar parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamValue {
    Text(String),
    Bool(bool),
    /// Always finite.
    Number(Number),
    Null,
}

impl ParamValue {
    fn write_json(&self, out: &mut String) {
        match self {
            ParamValue::Text(text) => {
                out.push('"');
                escape_into(text, out);
                out.push('"');
            }
            ParamValue::Bool(true) => out.push_str("true"),
            ParamValue::Bool(false) => out.push_str("false"),
            ParamValue::Number(number) => out.push_str(&number.to_string()),
            ParamValue::Null => out.push_str("null"),
        }
    }

    /// Convert a JSON value, rejecting arrays and objects.
    pub fn from_json(key: &str, value: serde_json::Value) -> Result<Self, TetherError> {
        match value {
            serde_json::Value::String(text) => Ok(ParamValue::Text(text)),
            serde_json::Value::Bool(b) => Ok(ParamValue::Bool(b)),
            serde_json::Value::Number(n) => Ok(ParamValue::Number(n)),
            serde_json::Value::Null => Ok(ParamValue::Null),
            serde_json::Value::Array(_) => Err(TetherError::invalid_parameter(key, "array")),
            serde_json::Value::Object(_) => Err(TetherError::invalid_parameter(key, "object")),
        }
    }

    /// Convert a float; NaN and infinities have no JSON representation.
    pub fn from_f64(key: &str, value: f64) -> Result<Self, TetherError> {
        Number::from_f64(value)
            .map(ParamValue::Number)
            .ok_or_else(|| TetherError::invalid_parameter(key, format!("non-finite number {value}")))
    }
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Number> for ParamValue {
    fn from(value: Number) -> Self {
        ParamValue::Number(value)
    }
}

macro_rules! param_from_int {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    ParamValue::Number(Number::from(value))
                }
            }
        )+
    };
}

param_from_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

/// Ordered, unique-keyed set of request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JsonParameterSet {
    entries: Vec<(String, ParamValue)>,
}

impl JsonParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build a set from a JSON object. Nested values are rejected.
    pub fn try_from_json(value: serde_json::Value) -> Result<Self, TetherError> {
        let serde_json::Value::Object(map) = value else {
            return Err(TetherError::invalid_parameter("<root>", "non-object"));
        };
        let mut set = Self::new();
        for (key, value) in map {
            let value = ParamValue::from_json(&key, value)?;
            set.insert(key, value);
        }
        Ok(set)
    }

    pub fn to_json(&self) -> String {
        serialize(self)
    }
}

/// Render `params` as compact JSON: `{"k1":v1,"k2":v2}`.
pub fn serialize(params: &JsonParameterSet) -> String {
    let mut out = String::with_capacity(2 + params.entries.len() * 16);
    out.push('{');
    for (i, (key, value)) in params.entries.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        escape_into(key, &mut out);
        out.push_str("\":");
        value.write_json(&mut out);
    }
    out.push('}');
    out
}

impl fmt::Display for JsonParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize(self))
    }
}
