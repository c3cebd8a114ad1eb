//! Tokenizer, parser and evaluator for raster-calculator expressions.
//!
//! Covers the numpy-flavoured subset the band-algebra calculator accepts:
//! arithmetic, `**`, comparisons, parentheses, calls such as `abs(...)` or
//! `numpy.sqrt(...)`, and the constants `pi` and `e`.

use crate::types::{SpectralError, SpectralResult};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Operator,
    Whitespace,
}

/// A lexical token borrowing its text from the source formula
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

const TWO_CHAR_OPERATORS: [&str; 5] = ["**", "<=", ">=", "==", "!="];

/// Names the calculator resolves itself; band keys may not use them
pub const RESERVED_NAMES: [&str; 19] = [
    "pi", "e", "abs", "sqrt", "exp", "log", "log10", "sin", "cos", "tan", "arcsin", "arccos",
    "arctan", "minimum", "maximum", "power", "where", "numpy", "np",
];

/// Whether `name` (optionally `numpy.`-qualified) is a calculator constant or function
pub fn is_calculator_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&strip_namespace(name))
}

/// Split `text` into tokens. Concatenating the token texts gives back `text`.
pub fn tokenize(text: &str) -> SpectralResult<Vec<Token<'_>>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        let kind = if c.is_ascii_whitespace() {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            TokenKind::Whitespace
        } else if c.is_ascii_alphabetic() || c == b'_' {
            i += 1;
            loop {
                if i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                } else if i + 1 < bytes.len() && bytes[i] == b'.' && (bytes[i + 1].is_ascii_alphabetic() || bytes[i + 1] == b'_') {
                    // dotted names such as numpy.where
                    i += 1;
                } else {
                    break;
                }
            }
            TokenKind::Ident
        } else if c.is_ascii_digit() || (c == b'.' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit()) {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                let mut j = i + 1;
                if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    while j < bytes.len() && bytes[j].is_ascii_digit() {
                        j += 1;
                    }
                    i = j;
                }
            }
            TokenKind::Number
        } else if c.is_ascii() {
            if TWO_CHAR_OPERATORS.iter().any(|op| text[i..].starts_with(op)) {
                i += 2;
            } else {
                i += 1;
            }
            TokenKind::Operator
        } else {
            return Err(SpectralError::FormulaSyntax(format!(
                "Unexpected character '{}' at byte {} in '{}'",
                text[i..].chars().next().unwrap_or('?'),
                i,
                text
            )));
        };

        tokens.push(Token {
            kind,
            text: &text[start..i],
        });
    }

    Ok(tokens)
}

/// Whether `key` lexes as exactly one identifier token
pub fn is_identifier(key: &str) -> bool {
    matches!(tokenize(key).as_deref(), Ok([Token { kind: TokenKind::Ident, .. }])) && !key.contains('.')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    pub fn parse(text: &str) -> SpectralResult<Expr> {
        let tokens: Vec<Token> = tokenize(text)?
            .into_iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .collect();
        let mut parser = Parser { tokens: &tokens, pos: 0, source: text };
        let expr = parser.comparison()?;
        if let Some(tok) = parser.peek() {
            return Err(parser.error(&format!("unexpected '{}'", tok.text)));
        }
        Ok(expr)
    }

    /// Free variables (constants excluded), sorted
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Var(name) => {
                if constant(name).is_none() {
                    vars.insert(name.clone());
                }
            }
            Expr::Neg(inner) => inner.collect_variables(vars),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_variables(vars);
                rhs.collect_variables(vars);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_variables(vars)),
        }
    }

    /// Evaluate with `lookup` resolving free variables
    pub fn evaluate<F>(&self, lookup: &F) -> SpectralResult<f64>
    where
        F: Fn(&str) -> Option<f64>,
    {
        match self {
            Expr::Number(v) => Ok(*v),
            Expr::Var(name) => constant(name)
                .or_else(|| lookup(name))
                .ok_or_else(|| SpectralError::FormulaSyntax(format!("Unbound symbol '{}'", name))),
            Expr::Neg(inner) => Ok(-inner.evaluate(lookup)?),
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.evaluate(lookup)?;
                let b = rhs.evaluate(lookup)?;
                let truth = |cond: bool| if cond { 1.0 } else { 0.0 };
                Ok(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Rem => a % b,
                    BinaryOp::Pow => a.powf(b),
                    BinaryOp::Lt => truth(a < b),
                    BinaryOp::Le => truth(a <= b),
                    BinaryOp::Gt => truth(a > b),
                    BinaryOp::Ge => truth(a >= b),
                    BinaryOp::Eq => truth(a == b),
                    BinaryOp::Ne => truth(a != b),
                })
            }
            Expr::Call(name, args) => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(lookup))
                    .collect::<SpectralResult<Vec<f64>>>()?;
                call(name, &values)
            }
        }
    }
}

fn strip_namespace(name: &str) -> &str {
    name.strip_prefix("numpy.")
        .or_else(|| name.strip_prefix("np."))
        .unwrap_or(name)
}

fn constant(name: &str) -> Option<f64> {
    match strip_namespace(name) {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

fn call(name: &str, args: &[f64]) -> SpectralResult<f64> {
    let unary = |f: fn(f64) -> f64| -> SpectralResult<f64> {
        match args {
            [x] => Ok(f(*x)),
            _ => Err(SpectralError::FormulaSyntax(format!("{}() takes 1 argument, got {}", name, args.len()))),
        }
    };
    let binary = |f: fn(f64, f64) -> f64| -> SpectralResult<f64> {
        match args {
            [x, y] => Ok(f(*x, *y)),
            _ => Err(SpectralError::FormulaSyntax(format!("{}() takes 2 arguments, got {}", name, args.len()))),
        }
    };

    match strip_namespace(name) {
        "abs" => unary(f64::abs),
        "sqrt" => unary(f64::sqrt),
        "exp" => unary(f64::exp),
        "log" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "arcsin" => unary(f64::asin),
        "arccos" => unary(f64::acos),
        "arctan" => unary(f64::atan),
        "minimum" => binary(f64::min),
        "maximum" => binary(f64::max),
        "power" => binary(f64::powf),
        "where" => match args {
            [cond, a, b] => Ok(if *cond != 0.0 { *a } else { *b }),
            _ => Err(SpectralError::FormulaSyntax(format!("where() takes 3 arguments, got {}", args.len()))),
        },
        other => Err(SpectralError::FormulaSyntax(format!("Unsupported function '{}'", other))),
    }
}

struct Parser<'t, 's> {
    tokens: &'t [Token<'s>],
    pos: usize,
    source: &'s str,
}

impl<'t, 's> Parser<'t, 's> {
    fn peek(&self) -> Option<&Token<'s>> {
        self.tokens.get(self.pos)
    }

    fn peek_op(&self) -> Option<&'s str> {
        self.peek()
            .filter(|t| t.kind == TokenKind::Operator)
            .map(|t| t.text)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.peek_op() == Some(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: &str) -> SpectralError {
        SpectralError::FormulaSyntax(format!("{} in '{}'", message, self.source))
    }

    fn comparison(&mut self) -> SpectralResult<Expr> {
        let lhs = self.additive()?;
        let op = match self.peek_op() {
            Some("<") => BinaryOp::Lt,
            Some("<=") => BinaryOp::Le,
            Some(">") => BinaryOp::Gt,
            Some(">=") => BinaryOp::Ge,
            Some("==") => BinaryOp::Eq,
            Some("!=") => BinaryOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> SpectralResult<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek_op() {
                Some("+") => BinaryOp::Add,
                Some("-") => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> SpectralResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek_op() {
                Some("*") => BinaryOp::Mul,
                Some("/") => BinaryOp::Div,
                Some("%") => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> SpectralResult<Expr> {
        if self.eat_op("-") {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat_op("+") {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> SpectralResult<Expr> {
        let base = self.primary()?;
        if self.eat_op("**") {
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> SpectralResult<Expr> {
        let token = *self.peek().ok_or_else(|| self.error("unexpected end of formula"))?;
        self.pos += 1;

        match token.kind {
            TokenKind::Number => token
                .text
                .parse::<f64>()
                .map(Expr::Number)
                .map_err(|e| self.error(&format!("invalid number '{}': {}", token.text, e))),
            TokenKind::Ident => {
                if !self.eat_op("(") {
                    return Ok(Expr::Var(token.text.to_string()));
                }
                let mut args = Vec::new();
                if !self.eat_op(")") {
                    loop {
                        args.push(self.comparison()?);
                        if self.eat_op(",") {
                            continue;
                        }
                        if self.eat_op(")") {
                            break;
                        }
                        return Err(self.error(&format!("expected ',' or ')' in call to {}", token.text)));
                    }
                }
                Ok(Expr::Call(token.text.to_string(), args))
            }
            TokenKind::Operator if token.text == "(" => {
                let inner = self.comparison()?;
                if !self.eat_op(")") {
                    return Err(self.error("missing ')'"));
                }
                Ok(inner)
            }
            _ => Err(self.error(&format!("unexpected '{}'", token.text))),
        }
    }
}
