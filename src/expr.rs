//! Basic floating point arithmetic expression evaluation engine.
//!
//! Only numeric literals, `+`, `-`, `*`, `/`, unary `+` and `-`, and
//! parentheses are accepted. Expressions come from untrusted page content, so
//! anything else is rejected as an unknown token rather than interpreted.

// Adapted from ExprParser.php in the MediaWiki ParserFunctions extension
// <https://github.com/wikimedia/mediawiki-extensions-ParserFunctions/>
// SPDX-License-Identifier: GPL-2.0-or-later

use arrayvec::ArrayVec;
use std::{
    borrow::Cow,
    iter::Peekable,
    num::ParseFloatError,
    str::CharIndices,
};

/// An expression evaluation error.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// Someone tried to do too much arithmetic at once.
    #[error("stack exhausted at {0}")]
    StackExhausted(usize),
    /// Encountered an unknown token.
    #[error("unknown token '{1}' at {0}")]
    UnknownToken(usize, Cow<'static, str>),
    /// Encountered a number where it shouldn’t’ve been.
    #[error("unexpected number {1} at {0}")]
    UnexpectedNumber(usize, f64),
    /// Encountered an operator where it shouldn’t’ve been.
    #[error("unexpected operator '{1}' at {0}")]
    UnexpectedOperator(usize, Cow<'static, str>),
    /// Encountered a close bracket where it shouldn’t’ve been.
    #[error("unexpected closing bracket at {0}")]
    UnexpectedCloseBracket(usize),
    /// Never encountered a close bracket where it should’ve been.
    #[error("unclosed bracket")]
    MissingCloseBracket,
    /// A required operand was missing.
    #[error("missing operand for '{0}'")]
    MissingOperand(Cow<'static, str>),
    /// Someone tried to do that thing you’re not supposed to do with numbers.
    #[error("division by zero in operator '{0}'")]
    DivisionByZero(Cow<'static, str>),
    /// A number that should have been a float turned out to not be a float.
    #[error("could not parse number at {0}: {1}")]
    ParseFloat(usize, ParseFloatError),
}

/// Evaluates an arithmetic expression. Returns `None` if the expression is
/// empty.
///
/// This is Dijkstra’s shunting yard algorithm, reducing operators as soon as
/// their precedence allows instead of building an RPN queue.
pub fn do_expression(expr: &str) -> Result<Option<f64>, Error> {
    let expr = expr.replace("&minus;", "-").replace('−', "-");
    let mut evaluator = Evaluator::default();
    let mut chars = expr.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        evaluator.check_capacity(pos)?;
        match c {
            ' ' | '\t' | '\r' | '\n' => {}
            '0'..='9' | '.' => {
                let end = scan_number(&mut chars, pos, c);
                let number = expr[pos..end]
                    .parse::<f64>()
                    .map_err(|err| Error::ParseFloat(pos, err))?;
                evaluator.operand(pos, number)?;
            }
            '+' if evaluator.expect == Expect::Operand => evaluator.unary(Op::Positive),
            '-' if evaluator.expect == Expect::Operand => evaluator.unary(Op::Negative),
            '+' => evaluator.binary(pos, Op::Plus)?,
            '-' => evaluator.binary(pos, Op::Minus)?,
            '*' => evaluator.binary(pos, Op::Times)?,
            '/' => evaluator.binary(pos, Op::Divide)?,
            '(' => evaluator.open(pos)?,
            ')' => evaluator.close(pos)?,
            _ => {
                let mut end = pos + c.len_utf8();
                while let Some((next, c)) = chars.next_if(|(_, c)| c.is_alphanumeric()) {
                    end = next + c.len_utf8();
                }
                return Err(Error::UnknownToken(pos, expr[pos..end].to_string().into()));
            }
        }
    }

    evaluator.finish(expr.len())
}

/// Formats the result of an expression the way it is shown in page output:
/// integral values without a fractional part, everything else in the
/// shortest form that round-trips.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        // Avoid "-0"
        "0".into()
    } else if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else if value.is_nan() {
        "NAN".into()
    } else if value.is_infinite() {
        if value.is_sign_negative() { "-INF" } else { "INF" }.into()
    } else {
        format!("{value}")
    }
}

/// Maximum allowed number of in-flight operators or operands.
const MAX_STACK_SIZE: usize = 100;

/// Consumes the rest of a number which started with `first` at `start`, and
/// returns the end of the part which should be parsed.
fn scan_number(chars: &mut Peekable<CharIndices<'_>>, start: usize, first: char) -> usize {
    let mut separators = usize::from(first == '.');
    let mut end = start + 1;
    while let Some((pos, c)) = chars.next_if(|(_, c)| c.is_ascii_digit() || *c == '.') {
        if c == '.' {
            separators += 1;
        }
        // "1.2.3" is 1.2
        if separators < 2 {
            end = pos + 1;
        }
    }
    end
}

/// An operator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Op {
    /// Unary `-`.
    Negative,
    /// Unary `+`.
    Positive,
    /// Binary `+`.
    Plus,
    /// Binary `-`.
    Minus,
    /// `*`
    Times,
    /// `/`
    Divide,
    /// `(`
    Open,
}

impl Op {
    /// The binding strength of the operator.
    const fn precedence(self) -> i32 {
        match self {
            Self::Negative | Self::Positive => 10,
            Self::Times | Self::Divide => 7,
            Self::Plus | Self::Minus => 6,
            Self::Open => -1,
        }
    }

    /// The source spelling of the operator.
    const fn name(self) -> Cow<'static, str> {
        Cow::Borrowed(match self {
            Self::Negative | Self::Minus => "-",
            Self::Positive | Self::Plus => "+",
            Self::Times => "*",
            Self::Divide => "/",
            Self::Open => "(",
        })
    }
}

/// What the evaluator will accept next.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Expect {
    /// A number, a unary operator, or an open bracket.
    #[default]
    Operand,
    /// A binary operator or a close bracket.
    Operator,
}

/// Shunting yard state.
#[derive(Debug, Default)]
struct Evaluator {
    /// Values waiting for an operator.
    operands: ArrayVec<f64, MAX_STACK_SIZE>,
    /// Operators waiting for operands of lower precedence to finish.
    operators: ArrayVec<Op, MAX_STACK_SIZE>,
    /// What comes next.
    expect: Expect,
}

impl Evaluator {
    /// Fails if either stack is full.
    fn check_capacity(&self, pos: usize) -> Result<(), Error> {
        if self.operands.is_full() || self.operators.is_full() {
            Err(Error::StackExhausted(pos))
        } else {
            Ok(())
        }
    }

    /// Pushes a number.
    fn operand(&mut self, pos: usize, number: f64) -> Result<(), Error> {
        if self.expect != Expect::Operand {
            return Err(Error::UnexpectedNumber(pos, number));
        }
        self.operands.push(number);
        self.expect = Expect::Operator;
        Ok(())
    }

    /// Pushes a unary operator. It applies to the next operand.
    fn unary(&mut self, op: Op) {
        self.operators.push(op);
    }

    /// Pushes a binary operator, first reducing every stacked operator which
    /// binds at least as tightly.
    fn binary(&mut self, pos: usize, op: Op) -> Result<(), Error> {
        if self.expect == Expect::Operand {
            return Err(Error::UnexpectedOperator(pos, op.name()));
        }
        self.reduce_while(|top| top.precedence() >= op.precedence())?;
        self.operators.push(op);
        self.expect = Expect::Operand;
        Ok(())
    }

    /// Opens a bracket.
    fn open(&mut self, pos: usize) -> Result<(), Error> {
        if self.expect == Expect::Operator {
            return Err(Error::UnexpectedOperator(pos, Op::Open.name()));
        }
        self.operators.push(Op::Open);
        Ok(())
    }

    /// Closes a bracket, reducing everything since it was opened.
    fn close(&mut self, pos: usize) -> Result<(), Error> {
        self.reduce_while(|top| top != Op::Open)?;
        if self.operators.pop().is_none() {
            return Err(Error::UnexpectedCloseBracket(pos));
        }
        self.expect = Expect::Operator;
        Ok(())
    }

    /// Reduces every remaining operator and returns the result.
    fn finish(mut self, len: usize) -> Result<Option<f64>, Error> {
        while let Some(op) = self.operators.pop() {
            if op == Op::Open {
                return Err(Error::MissingCloseBracket);
            }
            self.apply(op)?;
        }

        if let Some(extra) = self.operands.get(1) {
            return Err(Error::UnexpectedNumber(len, *extra));
        }
        Ok(self.operands.pop())
    }

    /// Pops and applies operators from the top of the stack while `predicate`
    /// holds for them.
    fn reduce_while(&mut self, predicate: impl Fn(Op) -> bool) -> Result<(), Error> {
        while let Some(&top) = self.operators.last()
            && predicate(top)
        {
            self.operators.pop();
            self.apply(top)?;
        }
        Ok(())
    }

    /// Applies `op` to the operands at the top of the stack.
    #[allow(clippy::float_cmp)]
    fn apply(&mut self, op: Op) -> Result<(), Error> {
        let stack = &mut self.operands;
        match op {
            Op::Positive => {
                if stack.is_empty() {
                    return Err(Error::MissingOperand(op.name()));
                }
            }
            Op::Negative => {
                let value = stack.pop().ok_or(Error::MissingOperand(op.name()))?;
                stack.push(-value);
            }
            Op::Plus | Op::Minus | Op::Times | Op::Divide => {
                let (Some(right), Some(left)) = (stack.pop(), stack.pop()) else {
                    return Err(Error::MissingOperand(op.name()));
                };
                let value = match op {
                    Op::Plus => left + right,
                    Op::Minus => left - right,
                    Op::Times => left * right,
                    _ if right == 0.0 => return Err(Error::DivisionByZero(op.name())),
                    _ => left / right,
                };
                stack.push(value);
            }
            Op::Open => return Err(Error::MissingCloseBracket),
        }
        Ok(())
    }
}
