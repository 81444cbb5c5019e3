use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ArgumentError;

/// Declared type of a literal argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    String,
    Bool,
    /// 32-bit integer, the type of an unsuffixed numeric literal.
    Integer,
    /// 64-bit integer, `L` suffix.
    Long,
    /// 64-bit float, `D` suffix.
    Double,
}

impl ArgType {
    /// Whether a parameter of this type can receive an argument of type `arg`.
    ///
    /// Besides an exact match only lossless numeric widening is accepted.
    pub fn accepts(self, arg: ArgType) -> bool {
        self == arg
            || matches!(
                (self, arg),
                (ArgType::Long, ArgType::Integer)
                    | (ArgType::Double, ArgType::Integer)
                    | (ArgType::Double, ArgType::Long)
            )
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArgType::String => "string",
            ArgType::Bool => "bool",
            ArgType::Integer => "integer",
            ArgType::Long => "long",
            ArgType::Double => "double",
        };
        write!(f, "{s}")
    }
}

/// Render a parameter list the way it shows up in error messages: `(string, long)`.
pub fn signature(types: &[ArgType]) -> String {
    let names: Vec<String> = types.iter().map(ToString::to_string).collect();
    format!("({})", names.join(", "))
}

/// A typed literal argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    String(String),
    Bool(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
}

impl Arg {
    pub fn arg_type(&self) -> ArgType {
        match self {
            Arg::String(_) => ArgType::String,
            Arg::Bool(_) => ArgType::Bool,
            Arg::Integer(_) => ArgType::Integer,
            Arg::Long(_) => ArgType::Long,
            Arg::Double(_) => ArgType::Double,
        }
    }

    /// Convert to `ty`, widening numbers. `None` when `ty` cannot hold this value.
    pub fn coerce(self, ty: ArgType) -> Option<Arg> {
        match (self, ty) {
            (arg, ty) if arg.arg_type() == ty => Some(arg),
            (Arg::Integer(v), ArgType::Long) => Some(Arg::Long(v.into())),
            (Arg::Integer(v), ArgType::Double) => Some(Arg::Double(v.into())),
            (Arg::Long(v), ArgType::Double) => Some(Arg::Double(v as f64)),
            _ => None,
        }
    }
}

/// Renders the literal form accepted by the target parser.
impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::String(s) => {
                let quote = ['\'', '"']
                    .into_iter()
                    .find(|q| delimits(s, *q))
                    .unwrap_or('\'');
                write!(f, "{quote}{s}{quote}")
            }
            Arg::Bool(b) => write!(f, "{b}"),
            Arg::Integer(v) => write!(f, "{v}"),
            Arg::Long(v) => write!(f, "{v}L"),
            Arg::Double(v) => write!(f, "{v}D"),
        }
    }
}

/// Whether `quote` can wrap `value`: every occurrence inside it must
/// already carry the escape marker.
fn delimits(value: &str, quote: char) -> bool {
    let mut prev = None;
    for c in value.chars() {
        if c == quote && prev != Some('\\') {
            return false;
        }
        prev = Some(c);
    }
    true
}

/// Positional arguments handed to a registered method.
///
/// Values are already coerced to the method's declared parameter types, so
/// the typed accessors only fail when a handler disagrees with its own
/// registration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Arg>);

impl Args {
    pub fn new(values: Vec<Arg>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Arg] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Result<&Arg, ArgumentError> {
        self.0.get(index).ok_or(ArgumentError::Missing { index })
    }

    pub fn string(&self, index: usize) -> Result<&str, ArgumentError> {
        match self.get(index)? {
            Arg::String(s) => Ok(s.as_str()),
            other => Err(mismatch(index, ArgType::String, other)),
        }
    }

    pub fn bool(&self, index: usize) -> Result<bool, ArgumentError> {
        match self.get(index)? {
            Arg::Bool(b) => Ok(*b),
            other => Err(mismatch(index, ArgType::Bool, other)),
        }
    }

    pub fn int(&self, index: usize) -> Result<i32, ArgumentError> {
        match self.get(index)? {
            Arg::Integer(v) => Ok(*v),
            other => Err(mismatch(index, ArgType::Integer, other)),
        }
    }

    pub fn long(&self, index: usize) -> Result<i64, ArgumentError> {
        match self.get(index)? {
            Arg::Long(v) => Ok(*v),
            other => Err(mismatch(index, ArgType::Long, other)),
        }
    }

    pub fn double(&self, index: usize) -> Result<f64, ArgumentError> {
        match self.get(index)? {
            Arg::Double(v) => Ok(*v),
            other => Err(mismatch(index, ArgType::Double, other)),
        }
    }
}

fn mismatch(index: usize, expected: ArgType, actual: &Arg) -> ArgumentError {
    ArgumentError::Mismatch {
        index,
        expected,
        actual: actual.arg_type(),
    }
}
