use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::args::ArgType;

/// The invocation-target text could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invocation target is empty")]
    Empty,

    /// No dot separates the component from the method.
    #[error("expected `Component.Method`, got `{text}`")]
    MissingMethod { text: String },

    /// A component segment or the method is not an identifier.
    #[error("invalid name `{name}`")]
    InvalidName { name: String },

    #[error("unterminated parenthesis: argument list has no closing `)`")]
    UnterminatedParen,

    #[error("unterminated {quote} quote opened at byte {offset}")]
    UnterminatedQuote { quote: char, offset: usize },

    #[error("unexpected input after argument list: `{rest}`")]
    TrailingInput { rest: String },

    #[error("argument {index} is empty")]
    EmptyArgument { index: usize },

    /// Quoted literal with text after its closing quote.
    #[error("malformed string literal {literal}")]
    MalformedString { literal: String },

    #[error("invalid {expected} literal `{literal}`")]
    InvalidNumber { literal: String, expected: ArgType },
}

/// No registered component/method matches the parsed target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("component not found: {component}")]
    ComponentNotFound { component: String },

    #[error("method not found: {component}.{method}{signature}")]
    MethodNotFound {
        component: String,
        method: String,
        signature: String,
    },
}

/// The job body itself failed.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The handler returned an error.
    #[error("job body failed: {0:#}")]
    Fault(#[source] anyhow::Error),

    #[error("job body panicked: {0}")]
    Panicked(String),

    /// Arguments could not be bound to the handler's parameters.
    #[error("argument binding failed: {0}")]
    Arguments(#[from] ArgumentError),
}

/// A handler asked for an argument that is absent or of another type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("argument {index} is missing")]
    Missing { index: usize },

    #[error("{given} arguments given, method takes {expected}")]
    Arity { given: usize, expected: usize },

    #[error("argument {index} is {actual}, expected {expected}")]
    Mismatch {
        index: usize,
        expected: ArgType,
        actual: ArgType,
    },
}

/// Registration-time failures of the component registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid component name `{name}`")]
    InvalidComponentName { name: String },

    #[error("invalid method name `{name}` on {component}")]
    InvalidMethodName { component: String, name: String },

    #[error("component already registered: {name}")]
    DuplicateComponent { name: String },

    /// Rejected because short names must stay unambiguous.
    #[error("short name `{short}` of {name} is already used by {existing}")]
    AmbiguousShortName {
        short: String,
        name: String,
        existing: String,
    },

    #[error("duplicate overload {component}.{method}{signature}")]
    DuplicateMethod {
        component: String,
        method: String,
        signature: String,
    },
}

/// Pipeline stage that produced an [`InvokeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parse,
    Resolve,
    Invoke,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Parse => "parse",
            Stage::Resolve => "resolve",
            Stage::Invoke => "invoke",
        };
        write!(f, "{s}")
    }
}

/// Failure of the parse → resolve → invoke pipeline, tagged by stage.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolve(#[from] ResolutionError),

    #[error(transparent)]
    Invoke(#[from] InvocationError),
}

impl InvokeError {
    pub fn stage(&self) -> Stage {
        match self {
            InvokeError::Parse(_) => Stage::Parse,
            InvokeError::Resolve(_) => Stage::Resolve,
            InvokeError::Invoke(_) => Stage::Invoke,
        }
    }
}

pub type Result<T> = std::result::Result<T, InvokeError>;
