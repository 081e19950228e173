use crate::error::Location;
use crate::variable::{IdStyle, VariableTable};
use crate::VariableId;
use std::fmt;

/// An element of a tokenized rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    UnaryMinus,
    LessEq,
    NotEq,
    Less,
    GreaterEq,
    Greater,
    Eq,
    /// Tests the START flag of the variable in the next token.
    Start,
    /// Tests the END flag of the variable in the next token.
    End,
    Variable(VariableId),
    NegVariable(VariableId),
    Constant(i32),
    Plus,
    Minus,
    Times,
    OpenParen,
    CloseParen,
}

/// The binding strength of relational operators.
pub const BIND_RELATIONAL: u8 = 1;
/// The binding strength of `+` and `-`.
pub const BIND_ADDITIVE: u8 = 2;
/// The binding strength of `.`.
pub const BIND_MULTIPLICATIVE: u8 = 3;
/// The binding strength of unary minus.
pub const BIND_UNARY_MINUS: u8 = 4;

impl Token {
    /// Gets the binding strength of a binary operator.
    pub fn binding_strength(&self) -> Option<u8> {
        use Token::*;
        match self {
            LessEq | NotEq | Less | GreaterEq | Greater | Eq => Some(BIND_RELATIONAL),
            Plus | Minus => Some(BIND_ADDITIVE),
            Times => Some(BIND_MULTIPLICATIVE),
            _ => None,
        }
    }

    /// Returns true if the token can start an operand that follows a unary minus.
    pub fn starts_operand(&self) -> bool {
        use Token::*;
        matches!(
            self,
            Start | End | Variable(_) | NegVariable(_) | Constant(_) | OpenParen
        )
    }

    fn symbol(&self) -> &'static str {
        use Token::*;
        match self {
            UnaryMinus | Minus => "-",
            LessEq => "<=",
            NotEq => "<>",
            Less => "<",
            GreaterEq => ">=",
            Greater => ">",
            Eq => "=",
            Start => "S",
            End => "E",
            Plus => "+",
            Times => ".",
            OpenParen => "(",
            CloseParen => ")",
            Variable(_) | NegVariable(_) | Constant(_) => "",
        }
    }
}

/// The kind of assignment a rule performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleKind {
    /// `X=...`: the destination takes the value of the expression.
    Equals,
    /// `XN=...`: the destination takes the value of the expression.
    NegEquals,
    /// `X.=...`: the destination is set when the expression is true.
    Start,
    /// `XN.=...`: the destination is cleared when the expression is true.
    End,
    /// `ITX.=...`: the timer is armed when the expression is true.
    InitTimer,
    /// `RITX.=...`: the timer is re-armed when the expression is true.
    ReinitTimer,
}

/// A tokenized assignment rule.
#[derive(Clone, Debug)]
pub struct Rule {
    /// The kind of assignment.
    pub kind: RuleKind,
    /// The variable assigned to.
    pub destination: VariableId,
    /// The right hand side.
    pub tokens: Vec<Token>,
    /// Where the rule was defined.
    pub location: Location,
}

impl Rule {
    /// Prints the rule back to TrafCOD text.
    ///
    /// If `values` is set, every variable is followed by its current value in angle brackets.
    pub fn display<'a>(&'a self, variables: &'a VariableTable, values: bool) -> RulePrinter<'a> {
        RulePrinter {
            rule: self,
            variables,
            values,
        }
    }
}

/// Formats a [Rule] as TrafCOD text.
pub struct RulePrinter<'a> {
    rule: &'a Rule,
    variables: &'a VariableTable,
    values: bool,
}

impl RulePrinter<'_> {
    fn variable(&self, f: &mut fmt::Formatter<'_>, id: VariableId, style: IdStyle) -> fmt::Result {
        let var = &self.variables[id];
        f.write_str(&var.id_string(style))?;
        if self.values {
            write!(f, "<{}>", var.value())?;
        }
        Ok(())
    }
}

impl fmt::Display for RulePrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (style, assign) = match self.rule.kind {
            RuleKind::Equals => (IdStyle::Plain, "="),
            RuleKind::NegEquals => (IdStyle::Negated, "="),
            RuleKind::Start => (IdStyle::Plain, ".="),
            RuleKind::End => (IdStyle::Negated, ".="),
            RuleKind::InitTimer => (IdStyle::InitTimer, ".="),
            RuleKind::ReinitTimer => (IdStyle::ReinitTimer, ".="),
        };
        self.variable(f, self.rule.destination, style)?;
        f.write_str(assign)?;
        for token in &self.rule.tokens {
            match *token {
                Token::Variable(id) => self.variable(f, id, IdStyle::Plain)?,
                Token::NegVariable(id) => self.variable(f, id, IdStyle::Negated)?,
                Token::Constant(value) => write!(f, "{}", value)?,
                other => f.write_str(other.symbol())?,
            }
        }
        Ok(())
    }
}
