use crate::error::{Location, ParseError};
use crate::eval::evaluate;
use crate::ident::Identifier;
use crate::rule::{Rule, RuleKind, Token};
use crate::variable::{Variable, VariableTable};

/// The states of the rule parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Looking for the destination and the kind of the rule.
    FindLhs,
    /// Looking for `=` or `.=`.
    FindAssign,
    /// A unary minus may follow.
    MayUminus,
    /// Reading the right hand side.
    FindExpr,
}

/// Parses one TrafCOD rule, installing every variable it refers to.
pub fn parse_rule(
    text: &str,
    location: Location,
    variables: &mut VariableTable,
) -> Result<Rule, ParseError> {
    let line = text.to_ascii_uppercase();
    let bytes = line.as_bytes();
    let mut state = State::FindLhs;
    let mut kind = RuleKind::Equals;
    let mut lhs = None;
    let mut destination = None;
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        match state {
            State::FindLhs => {
                let rest = &line[pos..];
                // The T of a timer is part of its name
                let skip = if rest.starts_with("RIT") {
                    kind = RuleKind::ReinitTimer;
                    2
                } else if rest.starts_with("IT") {
                    kind = RuleKind::InitTimer;
                    1
                } else if c == b'S' {
                    kind = RuleKind::Start;
                    1
                } else if c == b'E' {
                    kind = RuleKind::End;
                    1
                } else {
                    0
                };
                let ident = Identifier::parse(&rest[skip..])?;
                if kind == RuleKind::Equals && ident.negated {
                    kind = RuleKind::NegEquals;
                }
                pos += skip + ident.len;
                lhs = Some(ident);
                state = State::FindAssign;
            }
            State::FindAssign => {
                let Some(ident) = lhs.take() else {
                    return Err(ParseError::MissingVariable);
                };
                if line[pos..].starts_with(".=") {
                    kind = match kind {
                        RuleKind::Equals => RuleKind::Start,
                        RuleKind::NegEquals => RuleKind::End,
                        other => other,
                    };
                    pos += 2;
                } else if c == b'=' {
                    if kind != RuleKind::Equals && kind != RuleKind::NegEquals {
                        return Err(ParseError::BadAssignment);
                    }
                    if kind == RuleKind::Equals && Variable::is_timer_name(&ident.name) {
                        return Err(ParseError::BadTimeInitialization);
                    }
                    pos += 1;
                } else {
                    return Err(ParseError::MissingAssignment);
                }
                destination =
                    Some(variables.install_target(&ident.name, ident.stream, kind, location)?);
                state = State::MayUminus;
            }
            State::MayUminus => {
                if c == b'-' {
                    tokens.push(Token::UnaryMinus);
                    pos += 1;
                }
                state = State::FindExpr;
            }
            State::FindExpr => {
                if c.is_ascii_digit() {
                    let (value, len) = parse_constant(&bytes[pos..])?;
                    tokens.push(Token::Constant(value));
                    pos += len;
                } else if let Some((token, len)) = parse_operator(&bytes[pos..]) {
                    tokens.push(token);
                    pos += len;
                    if token == Token::OpenParen {
                        state = State::MayUminus;
                    }
                } else {
                    let flag = match c {
                        b'S' => Some((Token::Start, 'S')),
                        b'E' => Some((Token::End, 'E')),
                        _ => None,
                    };
                    if let Some((token, _)) = flag {
                        tokens.push(token);
                        pos += 1;
                    }
                    let ident = match (Identifier::parse(&line[pos..]), flag) {
                        (Err(ParseError::MissingVariable), Some((_, name))) => {
                            return Err(ParseError::MissingFlagVariable(name));
                        }
                        (result, _) => result?,
                    };
                    pos += ident.len;
                    let id = variables.install(&ident.name, ident.stream);
                    if Some(id) != destination {
                        variables[id].increment_ref_count();
                    }
                    match (ident.negated, flag) {
                        (true, Some((_, name))) => {
                            return Err(ParseError::MissingFlagVariable(name));
                        }
                        (true, None) => tokens.push(Token::NegVariable(id)),
                        (false, _) => tokens.push(Token::Variable(id)),
                    }
                }
            }
        }
    }

    let destination = match (state, destination) {
        (State::FindLhs, _) => return Err(ParseError::MissingVariable),
        (State::FindAssign, _) | (_, None) => return Err(ParseError::MissingAssignment),
        (_, Some(destination)) => destination,
    };

    // Reject rules that do not match the grammar now, rather than in the first tick
    evaluate(&tokens, variables)?;

    Ok(Rule {
        kind,
        destination,
        tokens,
        location,
    })
}

/// Reads a decimal constant that must fit in an `i32`.
fn parse_constant(bytes: &[u8]) -> Result<(i32, usize), ParseError> {
    let len = bytes.iter().take_while(|c| c.is_ascii_digit()).count();
    let value = bytes[..len].iter().try_fold(0i32, |value, digit| {
        value
            .checked_mul(10)
            .and_then(|value| value.checked_add((digit - b'0') as i32))
            .ok_or(ParseError::NumberTooLarge)
    })?;
    Ok((value, len))
}

/// Reads an operator or parenthesis.
fn parse_operator(bytes: &[u8]) -> Option<(Token, usize)> {
    let token = match bytes {
        [b'<', b'=', ..] | [b'=', b'<', ..] => (Token::LessEq, 2),
        [b'>', b'=', ..] | [b'=', b'>', ..] => (Token::GreaterEq, 2),
        [b'<', b'>', ..] | [b'>', b'<', ..] => (Token::NotEq, 2),
        [b'<', ..] => (Token::Less, 1),
        [b'>', ..] => (Token::Greater, 1),
        [b'=', ..] => (Token::Eq, 1),
        [b'+', ..] => (Token::Plus, 1),
        [b'-', ..] => (Token::Minus, 1),
        [b'.', ..] => (Token::Times, 1),
        [b'(', ..] => (Token::OpenParen, 1),
        [b')', ..] => (Token::CloseParen, 1),
        _ => return None,
    };
    Some(token)
}
