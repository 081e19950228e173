//! Evaluation of the right hand side of tokenized rules.
//!
//! The evaluator is a precedence climber over the token array. `expr` evaluates one
//! operand and then hands over to `rhs`, which keeps applying binary operators for as
//! long as they bind more strongly than the operator that is still pending in the caller.

use crate::error::EvalError;
use crate::rule::{Token, BIND_UNARY_MINUS};
use crate::variable::{Flags, VariableTable};
use smallvec::SmallVec;

/// Evaluates the tokens of a rule against the current variable values.
pub fn evaluate(tokens: &[Token], variables: &VariableTable) -> Result<i32, EvalError> {
    let mut evaluator = Evaluator {
        tokens,
        variables,
        pos: 0,
        stack: SmallVec::new(),
    };
    evaluator.expr(0)?;
    if evaluator.peek() == Some(Token::CloseParen) {
        return Err(EvalError::TooManyCloseParens);
    }
    let result = evaluator.pop()?;
    match evaluator.stack.len() {
        0 => Ok(result),
        n => Err(EvalError::LeftoverValues(n)),
    }
}

struct Evaluator<'a> {
    tokens: &'a [Token],
    variables: &'a VariableTable,
    /// The next token.
    pos: usize,
    stack: SmallVec<[i32; 16]>,
}

impl Evaluator<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn push(&mut self, value: i32) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<i32, EvalError> {
        self.stack.pop().ok_or(EvalError::StackEmpty)
    }

    /// Evaluates an operand and all following operators that bind more strongly
    /// than `binding_strength`.
    fn expr(&mut self, binding_strength: u8) -> Result<(), EvalError> {
        let token = self.peek().ok_or(EvalError::MissingOperand)?;
        self.pos += 1;
        match token {
            Token::UnaryMinus => {
                if !self.peek().map_or(false, |next| next.starts_operand()) {
                    return Err(EvalError::OperandExpectedAfterUnaryMinus);
                }
                self.expr(BIND_UNARY_MINUS)?;
                let value = self.pop()?;
                self.push(value.wrapping_neg());
            }
            Token::OpenParen => {
                self.expr(0)?;
                if self.peek() != Some(Token::CloseParen) {
                    return Err(EvalError::MissingCloseParen);
                }
                self.pos += 1;
            }
            Token::Start | Token::End => {
                let (flag, name) = match token {
                    Token::Start => (Flags::START, 'S'),
                    _ => (Flags::END, 'E'),
                };
                let Some(Token::Variable(id)) = self.peek() else {
                    return Err(EvalError::MissingFlagVariable(name));
                };
                self.pos += 1;
                let set = self.variables[id].flags().contains(flag);
                self.push(set as i32);
            }
            Token::Variable(id) => {
                let var = &self.variables[id];
                let value = match var.is_timer() {
                    true => (var.value() != 0) as i32,
                    false => var.value(),
                };
                self.push(value);
            }
            Token::NegVariable(id) => {
                let value = self.variables[id].value();
                self.push((value == 0) as i32);
            }
            Token::Constant(value) => self.push(value),
            _ => return Err(EvalError::OperandMissing),
        }
        self.rhs(binding_strength)
    }

    /// Applies binary operators while they bind more strongly than `binding_strength`.
    fn rhs(&mut self, binding_strength: u8) -> Result<(), EvalError> {
        while let Some(token) = self.peek() {
            if token == Token::CloseParen {
                break;
            }
            let strength = token
                .binding_strength()
                .ok_or(EvalError::MissingBinaryOperator)?;
            if strength <= binding_strength {
                // The pending operator must be applied first
                break;
            }
            self.pos += 1;
            self.expr(strength)?;
            let right = self.pop()?;
            let left = self.pop()?;
            self.push(apply(token, left, right));
        }
        Ok(())
    }
}

fn apply(operator: Token, left: i32, right: i32) -> i32 {
    let result = match operator {
        Token::Times => left != 0 && right != 0,
        Token::Plus => left != 0 || right != 0,
        Token::Minus => return left.wrapping_sub(right),
        Token::Eq => left == right,
        Token::NotEq => left != right,
        Token::Less => left < right,
        Token::LessEq => left <= right,
        Token::Greater => left > right,
        Token::GreaterEq => left >= right,
        _ => unreachable!("not a binary operator"),
    };
    result as i32
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::VariableId;

    struct Fixture {
        variables: VariableTable,
        a: VariableId,
        b: VariableId,
        t: VariableId,
    }

    fn fixture() -> Fixture {
        let mut variables = VariableTable::new();
        let a = variables.install("A", None);
        let b = variables.install("B", None);
        let t = variables.install("TA", None);
        variables[a].set_value(1, 0);
        variables[t].set_value(25, 0);
        Fixture { variables, a, b, t }
    }

    fn eval(fixture: &Fixture, tokens: &[Token]) -> Result<i32, EvalError> {
        evaluate(tokens, &fixture.variables)
    }

    #[test]
    fn logic_operators() {
        use Token::*;
        let f = fixture();
        assert_eq!(eval(&f, &[Variable(f.a), Plus, Variable(f.b)]), Ok(1));
        assert_eq!(eval(&f, &[Variable(f.a), Times, Variable(f.b)]), Ok(0));
        assert_eq!(eval(&f, &[Variable(f.a), Times, NegVariable(f.b)]), Ok(1));
        assert_eq!(eval(&f, &[NegVariable(f.a)]), Ok(0));
    }

    #[test]
    fn timers_collapse_to_booleans() {
        use Token::*;
        let f = fixture();
        assert_eq!(eval(&f, &[Variable(f.t)]), Ok(1));
        assert_eq!(eval(&f, &[Variable(f.t), Plus, Constant(3)]), Ok(1));
    }

    #[test]
    fn arithmetic_and_comparison() {
        use Token::*;
        let f = fixture();
        assert_eq!(eval(&f, &[Constant(7), Minus, Constant(2)]), Ok(5));
        assert_eq!(
            eval(&f, &[Constant(7), Minus, Constant(2), Minus, Constant(1)]),
            Ok(4)
        );
        assert_eq!(eval(&f, &[Constant(2), Less, Constant(7)]), Ok(1));
        assert_eq!(eval(&f, &[Constant(2), GreaterEq, Constant(7)]), Ok(0));
        assert_eq!(eval(&f, &[Constant(3), NotEq, Constant(3)]), Ok(0));
        assert_eq!(eval(&f, &[UnaryMinus, Constant(3), Minus, Constant(1)]), Ok(-4));
    }

    #[test]
    fn precedence() {
        use Token::*;
        let f = fixture();
        // 1 + 0.0 = 1, (1 + 0).0 = 0
        let tokens = [Constant(1), Plus, Constant(0), Times, Constant(0)];
        assert_eq!(eval(&f, &tokens), Ok(1));
        let tokens = [
            OpenParen,
            Constant(1),
            Plus,
            Constant(0),
            CloseParen,
            Times,
            Constant(0),
        ];
        assert_eq!(eval(&f, &tokens), Ok(0));
        // 5 - 3 = 2 binds before the comparison
        let tokens = [Constant(5), Minus, Constant(3), Eq, Constant(2)];
        assert_eq!(eval(&f, &tokens), Ok(1));
    }

    #[test]
    fn flag_tests() {
        use Token::*;
        let mut f = fixture();
        assert_eq!(eval(&f, &[Start, Variable(f.a)]), Ok(1));
        assert_eq!(eval(&f, &[End, Variable(f.a)]), Ok(0));
        f.variables[f.a].clear_flag(Flags::START);
        assert_eq!(eval(&f, &[Start, Variable(f.a)]), Ok(0));
        assert_eq!(
            eval(&f, &[Start, NegVariable(f.a)]),
            Err(EvalError::MissingFlagVariable('S'))
        );
    }

    #[test]
    fn malformed_rules() {
        use Token::*;
        let f = fixture();
        assert_eq!(eval(&f, &[]), Err(EvalError::MissingOperand));
        assert_eq!(
            eval(&f, &[Variable(f.a), Plus]),
            Err(EvalError::MissingOperand)
        );
        assert_eq!(
            eval(&f, &[Variable(f.a), Variable(f.b)]),
            Err(EvalError::MissingBinaryOperator)
        );
        assert_eq!(
            eval(&f, &[OpenParen, Variable(f.a)]),
            Err(EvalError::MissingCloseParen)
        );
        assert_eq!(
            eval(&f, &[Variable(f.a), CloseParen]),
            Err(EvalError::TooManyCloseParens)
        );
        assert_eq!(
            eval(&f, &[UnaryMinus, Plus]),
            Err(EvalError::OperandExpectedAfterUnaryMinus)
        );
        assert_eq!(eval(&f, &[Times]), Err(EvalError::OperandMissing));
    }
}
