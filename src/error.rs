//! Error types for loading, binding and evaluating TrafCOD programs.

use std::fmt;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Any error raised by a TrafCOD controller.
#[derive(Debug, Error)]
pub enum Error {
    /// The program text could not be loaded. The controller never starts.
    #[error("{kind} at {location}")]
    Parse { kind: ParseError, location: Location },
    /// The program could not be bound to the traffic lights and detectors.
    #[error(transparent)]
    Setup(#[from] SetupError),
    /// The evaluator found a rule that does not match the grammar.
    #[error("{kind} in rule {rule}")]
    Eval { kind: EvalError, rule: String },
}

/// A location in the program text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// The line number, starting at 1.
    pub line: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrafCOD rule({})", self.line)
    }
}

/// Errors found while reading the program text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing variable")]
    MissingVariable,
    #[error("bad variable name {0:?}")]
    BadVariableName(String),
    #[error("number too large")]
    NumberTooLarge,
    #[error("missing assignment operator")]
    MissingAssignment,
    #[error("bad assignment")]
    BadAssignment,
    #[error("bad time initialization")]
    BadTimeInitialization,
    #[error("missing operand at end of expression")]
    MissingOperand,
    #[error("operand expected after unary minus")]
    OperandExpectedAfterUnaryMinus,
    #[error("missing variable after {0}")]
    MissingFlagVariable(char),
    #[error("missing binary operator")]
    MissingBinaryOperator,
    #[error("missing closing parenthesis")]
    MissingCloseParen,
    #[error("too many closing parentheses")]
    TooManyCloseParens,
    #[error("conflicting rules: {first} vs {second}")]
    ConflictingRules { first: Location, second: Location },
    #[error("wrong TrafCOD version (expected {expected}, got {got})")]
    WrongVersion { expected: i32, got: i32 },
    #[error("could not parse TrafCOD version (got {0:?})")]
    BadVersion(String),
    #[error("missing TrafCOD version")]
    MissingVersion,
    #[error("unexpected end of file (reading {0})")]
    UnexpectedEof(&'static str),
    #[error("bad sequence information line {0:?}")]
    BadSequence(String),
    #[error("bad structure number {0:?}")]
    BadStructureNumber(String),
    #[error("structure information before sequence information")]
    StructureBeforeSequence,
    #[error("bad conflict group line {0:?}")]
    BadConflictGroup(String),
    #[error("missing value in {0:?}")]
    MissingValue(String),
    #[error("bad value {0:?}")]
    BadValue(String),
    #[error("{0} is not a timer")]
    NotATimer(String),
    #[error("bad color value {0:?}")]
    BadColor(String),
    #[error("{0} is already an output")]
    AlreadyOutput(String),
}

impl ParseError {
    /// Attaches a program location to this error.
    pub fn at(self, location: Location) -> Error {
        Error::Parse {
            kind: self,
            location,
        }
    }
}

impl From<EvalError> for ParseError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::StackEmpty | EvalError::MissingOperand | EvalError::OperandMissing => {
                ParseError::MissingOperand
            }
            EvalError::OperandExpectedAfterUnaryMinus => ParseError::OperandExpectedAfterUnaryMinus,
            EvalError::MissingFlagVariable(flag) => ParseError::MissingFlagVariable(flag),
            EvalError::MissingBinaryOperator | EvalError::LeftoverValues(_) => {
                ParseError::MissingBinaryOperator
            }
            EvalError::MissingCloseParen => ParseError::MissingCloseParen,
            EvalError::TooManyCloseParens => ParseError::TooManyCloseParens,
        }
    }
}

/// Errors found while binding a program to the traffic lights and detectors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("no traffic light for stream {0} found")]
    NoTrafficLight(String),
    #[error("no sensor found that matches {0}")]
    NoDetector(String),
    #[error("output {0} has no stream")]
    OutputWithoutStream(String),
    #[error("conflict group {name} has rank {rank} but the program has {groups} conflict groups")]
    ConflictGroupRank {
        name: String,
        rank: usize,
        groups: usize,
    },
    #[error("unknown detector {0}")]
    UnknownDetector(String),
    #[error("unknown variable {0}")]
    UnknownVariable(String),
    #[error("controller {0} is not part of the simulation")]
    UnknownController(String),
}

/// Inconsistencies found by the expression evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("stack empty")]
    StackEmpty,
    #[error("missing operand at end of expression")]
    MissingOperand,
    #[error("operand missing")]
    OperandMissing,
    #[error("operand expected after unary minus")]
    OperandExpectedAfterUnaryMinus,
    #[error("missing variable after {0}")]
    MissingFlagVariable(char),
    #[error("missing binary operator")]
    MissingBinaryOperator,
    #[error("missing closing parenthesis")]
    MissingCloseParen,
    #[error("too many closing parentheses")]
    TooManyCloseParens,
    #[error("{0} values left on the stack")]
    LeftoverValues(usize),
}
