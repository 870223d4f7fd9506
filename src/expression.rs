//! Arithmetic expressions over metric ids, e.g. `revenue24h / mcap * 100`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;

pub const EXPRESSION_CACHE_CAPACITY: usize = 100;

/// Deepest allowed nesting of parentheses, signs and exponents.
pub const MAX_EXPRESSION_DEPTH: usize = 256;

/// Longest accepted expression in tokens; bounds the depth of operator chains.
pub const MAX_EXPRESSION_TOKENS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("Expression cannot be empty")]
    Empty,
    #[error("Invalid expression syntax: unexpected character '{ch}' at {position}")]
    UnexpectedChar { ch: char, position: usize },
    #[error("Invalid expression syntax: unexpected '{found}' at {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("Invalid expression syntax: unexpected end of expression")]
    UnexpectedEnd,
    #[error("{}", unknown_variables_message(.0))]
    UnknownVariables(Vec<String>),
    #[error("Expression is nested too deeply (limit {limit})")]
    TooDeep { limit: usize },
    #[error("Expression is too long (limit {limit} tokens)")]
    TooLong { limit: usize },
    #[error("Expression evaluation failed against sample data")]
    Evaluation,
}

fn unknown_variables_message(names: &[String]) -> String {
    let noun = if names.len() > 1 { "variables" } else { "variable" };
    format!("Unknown {noun}: {}", names.join(", "))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinaryOp {
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
            BinaryOp::Rem => lhs % rhs,
            BinaryOp::Pow => lhs.powf(rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Referenced variable names, first occurrence order, no duplicates.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Neg(inner) => inner.collect_variables(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }

    /// Evaluates with `resolve`; any unresolved variable makes the whole result `None`.
    pub fn eval(&self, resolve: &dyn Fn(&str) -> Option<f64>) -> Option<f64> {
        match self {
            Expr::Number(value) => Some(*value),
            Expr::Variable(name) => resolve(name).filter(|value| !value.is_nan()),
            Expr::Neg(inner) => inner.eval(resolve).map(|value| -value),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.eval(resolve)?;
                let rhs = rhs.eval(resolve)?;
                Some(op.apply(lhs, rhs))
            }
        }
    }

    /// Like `eval` but rejects infinities and NaN.
    pub fn eval_finite(&self, resolve: &dyn Fn(&str) -> Option<f64>) -> Option<f64> {
        self.eval(resolve).filter(|value| value.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(value) => value.to_string(),
            Token::Ident(name) => name.clone(),
            Token::Op(op) => op.to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        if ch.is_ascii_digit() || (ch == '.' && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())) {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ExpressionError::UnexpectedToken {
                    found: text.clone(),
                    position: start,
                })?;
            tokens.push((Token::Number(value), start));
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push((Token::Ident(chars[start..i].iter().collect()), start));
            continue;
        }

        let token = match ch {
            '+' | '-' | '*' | '/' | '%' | '^' => Token::Op(ch),
            '(' => Token::LParen,
            ')' => Token::RParen,
            _ => return Err(ExpressionError::UnexpectedChar { ch, position: start }),
        };
        tokens.push((token, start));
        i += 1;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_op(&self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn expression(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.term()?;
        while let Some(op) = self.peek_op(&['+', '-']) {
            self.pos += 1;
            let rhs = self.term()?;
            let op = if op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek_op(&['*', '/', '%']) {
            self.pos += 1;
            let rhs = self.unary()?;
            let op = match op {
                '*' => BinaryOp::Mul,
                '/' => BinaryOp::Div,
                _ => BinaryOp::Rem,
            };
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    /// Every recursive path runs through here, so this is where nesting is bounded.
    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.depth >= MAX_EXPRESSION_DEPTH {
            return Err(ExpressionError::TooDeep {
                limit: MAX_EXPRESSION_DEPTH,
            });
        }
        self.depth += 1;
        let expr = self.signed();
        self.depth -= 1;
        expr
    }

    fn signed(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek_op(&['-', '+']) {
            Some('-') => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(_) => {
                self.pos += 1;
                self.unary()
            }
            None => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.primary()?;
        if self.peek_op(&['^']).is_some() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some((Token::Number(value), _)) => Ok(Expr::Number(value)),
            Some((Token::Ident(name), _)) => Ok(Expr::Variable(name)),
            Some((Token::LParen, _)) => {
                let inner = self.expression()?;
                match self.next() {
                    Some((Token::RParen, _)) => Ok(inner),
                    Some((token, position)) => Err(ExpressionError::UnexpectedToken {
                        found: token.describe(),
                        position,
                    }),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            Some((token, position)) => Err(ExpressionError::UnexpectedToken {
                found: token.describe(),
                position,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

pub fn parse_expression(source: &str) -> Result<Expr, ExpressionError> {
    if source.trim().is_empty() {
        return Err(ExpressionError::Empty);
    }
    let tokens = tokenize(source)?;
    if tokens.len() > MAX_EXPRESSION_TOKENS {
        return Err(ExpressionError::TooLong {
            limit: MAX_EXPRESSION_TOKENS,
        });
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    match parser.next() {
        None => Ok(expr),
        Some((token, position)) => Err(ExpressionError::UnexpectedToken {
            found: token.describe(),
            position,
        }),
    }
}

#[derive(Debug, Default)]
struct CacheState {
    parsed: HashMap<String, Arc<Expr>>,
    order: VecDeque<String>,
}

/// Bounded parse cache; the oldest entry is evicted once `capacity` is reached.
/// Failed parses are not cached.
#[derive(Debug)]
pub struct ExpressionCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::new(EXPRESSION_CACHE_CAPACITY)
    }
}

impl ExpressionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Process-wide cache shared by custom column evaluation.
    pub fn shared() -> &'static ExpressionCache {
        static SHARED: OnceLock<ExpressionCache> = OnceLock::new();
        SHARED.get_or_init(ExpressionCache::default)
    }

    pub fn parse(&self, source: &str) -> Result<Arc<Expr>, ExpressionError> {
        {
            let state = self.state.lock().unwrap_or_else(|err| err.into_inner());
            if let Some(expr) = state.parsed.get(source) {
                return Ok(Arc::clone(expr));
            }
        }

        let expr = Arc::new(parse_expression(source)?);
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        if !state.parsed.contains_key(source) {
            if state.parsed.len() >= self.capacity {
                if let Some(oldest) = state.order.pop_front() {
                    state.parsed.remove(&oldest);
                }
            }
            state.order.push_back(source.to_string());
            state.parsed.insert(source.to_string(), Arc::clone(&expr));
        }
        Ok(expr)
    }

    pub fn contains(&self, source: &str) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .parsed
            .contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .parsed
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, vars: &[(&str, f64)]) -> Option<f64> {
        let expr = parse_expression(source).unwrap();
        expr.eval_finite(&|name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| *value)
        })
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3", &[]), Some(7.0));
        assert_eq!(eval("(1 + 2) * 3", &[]), Some(9.0));
        assert_eq!(eval("10 - 4 - 3", &[]), Some(3.0));
        assert_eq!(eval("2 ^ 3 ^ 2", &[]), Some(512.0));
        assert_eq!(eval("-2 ^ 2", &[]), Some(-4.0));
        assert_eq!(eval("7 % 4", &[]), Some(3.0));
        assert_eq!(eval("1.5e3 / .5", &[]), Some(3000.0));
    }

    #[test]
    fn variables_are_collected_once() {
        let expr = parse_expression("fees24h / tvl + fees24h * mcap").unwrap();
        assert_eq!(expr.variables(), vec!["fees24h", "tvl", "mcap"]);
    }

    #[test]
    fn missing_variables_and_division_by_zero_yield_none() {
        assert_eq!(eval("a / b", &[("a", 1.0)]), None);
        assert_eq!(eval("a / b", &[("a", 1.0), ("b", 0.0)]), None);
        assert_eq!(eval("a / b", &[("a", 1.0), ("b", 4.0)]), Some(0.25));
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert_eq!(parse_expression("   "), Err(ExpressionError::Empty));
        assert_eq!(parse_expression("tvl +"), Err(ExpressionError::UnexpectedEnd));
        assert!(matches!(
            parse_expression("tvl $ 2"),
            Err(ExpressionError::UnexpectedChar { ch: '$', position: 4 })
        ));
        assert!(matches!(
            parse_expression("(tvl"),
            Err(ExpressionError::UnexpectedEnd)
        ));
        assert!(matches!(
            parse_expression("tvl tvl"),
            Err(ExpressionError::UnexpectedToken { position: 4, .. })
        ));
    }

    #[test]
    fn unknown_variable_message_pluralizes() {
        assert_eq!(
            ExpressionError::UnknownVariables(vec!["a".into()]).to_string(),
            "Unknown variable: a"
        );
        assert_eq!(
            ExpressionError::UnknownVariables(vec!["a".into(), "b".into()]).to_string(),
            "Unknown variables: a, b"
        );
    }

    #[test]
    fn cache_evicts_oldest_entry() {
        let cache = ExpressionCache::new(2);
        cache.parse("a + 1").unwrap();
        cache.parse("a + 2").unwrap();
        cache.parse("a + 1").unwrap();
        cache.parse("a + 3").unwrap();
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a + 1"));
        assert!(cache.contains("a + 3"));
        assert!(cache.parse("a +").is_err());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn deep_nesting_is_rejected_instead_of_overflowing() {
        let nested = |depth: usize| format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(eval(&nested(100), &[]), Some(1.0));
        assert_eq!(
            parse_expression(&nested(300)),
            Err(ExpressionError::TooDeep {
                limit: MAX_EXPRESSION_DEPTH
            })
        );
        assert!(matches!(
            parse_expression(&format!("{}1", "-".repeat(300))),
            Err(ExpressionError::TooDeep { .. })
        ));
        assert!(matches!(
            parse_expression(&nested(2000)),
            Err(ExpressionError::TooLong { .. })
        ));
    }
}
