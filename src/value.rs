//! Values bound to SQL statements and read back from rows.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A value a driver accepts as an argument or produces in a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("<nil>"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(bytes) => {
                f.write_str("[")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{b}")?;
                }
                f.write_str("]")
            }
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
    &[u8] => Bytes,
    DateTime<Utc> => Timestamp,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Argument of a context-aware call. `name` is set only for named
/// parameters; positional arguments carry just their 1-based ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    pub name: Option<String>,
    pub ordinal: usize,
    pub value: Value,
}

impl NamedValue {
    pub fn positional(ordinal: usize, value: impl Into<Value>) -> Self {
        Self {
            name: None,
            ordinal,
            value: value.into(),
        }
    }

    pub fn named(name: impl Into<String>, ordinal: usize, value: impl Into<Value>) -> Self {
        Self {
            name: Some(name.into()),
            ordinal,
            value: value.into(),
        }
    }

    /// The parameter name, if one is set and non-empty.
    pub fn param_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    /// Bind a list of positional values, numbering them from 1.
    pub fn from_values(values: &[Value]) -> Vec<NamedValue> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| NamedValue::positional(i + 1, v.clone()))
            .collect()
    }
}

/// Render bound arguments as `[a b c]`.
pub fn render_args(args: &[Value]) -> String {
    let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(" "))
}

/// Transaction isolation levels a driver may honour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    WriteCommitted,
    RepeatableRead,
    Snapshot,
    Serializable,
    Linearizable,
}

/// Options for starting a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
}

impl TxOptions {
    pub fn is_default(&self) -> bool {
        *self == TxOptions::default()
    }
}
