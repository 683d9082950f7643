//! Domain error types.

use crate::domain::expr::NodeKind;

/// A syntax error with position information for expression parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("syntax error at position {position}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub position: usize,
}

impl SyntaxError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let byte = self.position.min(input.len());
        let column = input
            .char_indices()
            .take_while(|(i, _)| *i < byte)
            .count();
        let caret = " ".repeat(column) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Failure while evaluating a parsed expression tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("unbound identifier: {name}")]
    UnknownIdentifier { name: String },

    #[error("evaluation error at node {node}: unsupported operand types for {op}: {left} and {right}")]
    UnsupportedOperand {
        node: NodeKind,
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("evaluation error at node Unary: bad operand type for unary {op}: {operand}")]
    BadUnaryOperand { op: String, operand: &'static str },

    #[error("evaluation error at node {node}: bitwise {op} requires integral numbers")]
    NotIntegral { node: NodeKind, op: String },

    #[error("evaluation error at node {node}: division by zero")]
    DivisionByZero { node: NodeKind },

    #[error("error calling function {name}: {reason}")]
    Function { name: String, reason: String },

    #[error("evaluation error at node Subscript: {type_name} is not subscriptable")]
    NotSubscriptable { type_name: &'static str },

    #[error("evaluation error at node Subscript: index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("evaluation error at node Subscript: key not found: {key}")]
    KeyNotFound { key: String },
}

impl EvalError {
    /// The node kind the failure surfaced at.
    pub fn node(&self) -> NodeKind {
        match self {
            EvalError::UnknownFunction { .. } | EvalError::Function { .. } => NodeKind::Call,
            EvalError::UnknownIdentifier { .. } => NodeKind::Identifier,
            EvalError::BadUnaryOperand { .. } => NodeKind::Unary,
            EvalError::UnsupportedOperand { node, .. }
            | EvalError::NotIntegral { node, .. }
            | EvalError::DivisionByZero { node } => *node,
            EvalError::NotSubscriptable { .. }
            | EvalError::IndexOutOfRange { .. }
            | EvalError::KeyNotFound { .. } => NodeKind::Subscript,
        }
    }
}

/// Trigger factory failure. Raised at creation time, never at check time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown trigger type: {trigger_type}")]
    UnknownTriggerType { trigger_type: String },

    #[error("{trigger_type} trigger requires parameter '{param}'")]
    MissingParam {
        trigger_type: String,
        param: String,
    },

    #[error("{trigger_type} trigger has invalid parameter '{param}': {reason}")]
    InvalidParam {
        trigger_type: String,
        param: String,
        reason: String,
    },

    #[error("composite trigger nesting exceeds maximum depth of {max_depth}")]
    TooDeep { max_depth: usize },

    #[error("invalid expression: {0}")]
    InvalidExpression(#[from] SyntaxError),
}

/// Failure raised by a trigger's `check`. The manager contains these per tick.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TriggerError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("snapshot field '{field}' is not {expected}")]
    FieldType {
        field: String,
        expected: &'static str,
    },
}

/// Top-level error type for alertengine.
#[derive(Debug, thiserror::Error)]
pub enum AlertEngineError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Trigger(#[from] ConfigError),

    #[error("market data error: {reason}")]
    Data { reason: String },

    #[error("alert repository error: {reason}")]
    Repository { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&AlertEngineError> for std::process::ExitCode {
    fn from(err: &AlertEngineError) -> Self {
        let code: u8 = match err {
            AlertEngineError::Io(_) => 1,
            AlertEngineError::ConfigParse { .. }
            | AlertEngineError::ConfigInvalid { .. } => 2,
            AlertEngineError::Data { .. } | AlertEngineError::Repository { .. } => 3,
            AlertEngineError::Syntax(_) | AlertEngineError::Eval(_) => 4,
            AlertEngineError::Trigger(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}
