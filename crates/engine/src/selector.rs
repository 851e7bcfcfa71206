//! Label selector expressions for filtering rules and dependencies.
//!
//! Grammar: atoms are `key` (any value) or `key=value` (`key=*` for any
//! value), combined with `&&`/`AND`, `||`/`OR`, `!`/`NOT`, and parentheses.
//! Expressions are compiled once at construction and reused across every
//! rule/dependency they filter, so a malformed selector fails before any
//! rule runs.

/// Errors raised while compiling a selector expression.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SelectorError {
    #[error("empty selector expression")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { pos: usize, ch: char },

    #[error("unexpected token '{token}' at position {pos}")]
    UnexpectedToken { pos: usize, token: String },

    #[error("unexpected end of expression")]
    UnexpectedEnd,
}

/// Anything carrying a label list a selector can match against.
pub trait Labeled {
    fn labels(&self) -> &[String];
}

impl Labeled for crate::schema::Rule {
    fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Labeled for crate::schema::RuleSet {
    fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Labeled for sieve_provider::Dependency {
    fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// A compiled boolean label expression.
#[derive(Debug, Clone)]
pub struct LabelSelector {
    expr: Expr,
    raw: String,
}

impl LabelSelector {
    /// Compile an expression. Fails fast on malformed input.
    pub fn new(expression: &str) -> Result<Self, SelectorError> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Err(SelectorError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some((pos, token)) = parser.peek_raw() {
            return Err(SelectorError::UnexpectedToken { pos, token });
        }
        Ok(Self {
            expr,
            raw: expression.to_string(),
        })
    }

    /// The original expression text.
    pub fn expression(&self) -> &str {
        &self.raw
    }

    /// Evaluate the expression against a label list.
    ///
    /// Labels are `key=value` or bare `key`; a bare label matches any
    /// value asked of its key.
    pub fn matches(&self, labels: &[String]) -> bool {
        self.expr.eval(labels)
    }

    pub fn matches_entity<T: Labeled>(&self, entity: &T) -> bool {
        self.matches(entity.labels())
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Atom { key: String, value: Option<String> },
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    fn eval(&self, labels: &[String]) -> bool {
        match self {
            Expr::Atom { key, value } => labels.iter().any(|label| {
                let (lkey, lvalue) = split_label(label);
                if lkey != key {
                    return false;
                }
                match (value.as_deref(), lvalue) {
                    // Key-only atom: any label with the key matches.
                    (None, _) => true,
                    // Wildcard asks for the key with some value.
                    (Some("*"), _) => true,
                    // A valueless label satisfies any requested value.
                    (Some(_), None) => true,
                    (Some(want), Some(have)) => want == have,
                }
            }),
            Expr::Not(inner) => !inner.eval(labels),
            Expr::And(children) => children.iter().all(|c| c.eval(labels)),
            Expr::Or(children) => children.iter().any(|c| c.eval(labels)),
        }
    }
}

/// Split a label into key and optional value at the first `=`.
pub(crate) fn split_label(label: &str) -> (&str, Option<&str>) {
    match label.split_once('=') {
        Some((k, v)) => (k, Some(v)),
        None => (label, None),
    }
}

// ── Tokenizer ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Atom(String),
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, SelectorError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((i, Token::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((i, Token::RParen));
                i += 1;
            }
            '!' => {
                tokens.push((i, Token::Not));
                i += 1;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&ch) {
                    return Err(SelectorError::UnexpectedChar { pos: i, ch });
                }
                tokens.push((i, if ch == '&' { Token::And } else { Token::Or }));
                i += 2;
            }
            _ => {
                let start = i;
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !matches!(chars[i], '(' | ')' | '!' | '&' | '|')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Atom(word),
                };
                tokens.push((start, token));
            }
        }
    }

    Ok(tokens)
}

// ── Parser ──────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_raw(&self) -> Option<(usize, String)> {
        self.tokens
            .get(self.pos)
            .map(|(pos, t)| (*pos, format!("{t:?}")))
    }

    fn advance(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Expr, SelectorError> {
        let first = self.parse_and()?;
        if self.peek() != Some(&Token::Or) {
            return Ok(first);
        }
        let mut children = vec![first];
        while self.peek() == Some(&Token::Or) {
            self.advance();
            children.push(self.parse_and()?);
        }
        Ok(Expr::Or(children))
    }

    fn parse_and(&mut self) -> Result<Expr, SelectorError> {
        let first = self.parse_unary()?;
        if self.peek() != Some(&Token::And) {
            return Ok(first);
        }
        let mut children = vec![first];
        while self.peek() == Some(&Token::And) {
            self.advance();
            children.push(self.parse_unary()?);
        }
        Ok(Expr::And(children))
    }

    fn parse_unary(&mut self) -> Result<Expr, SelectorError> {
        match self.advance() {
            Some((_, Token::Not)) => Ok(Expr::Not(Box::new(self.parse_unary()?))),
            Some((_, Token::LParen)) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some((_, Token::RParen)) => Ok(inner),
                    Some((pos, token)) => Err(SelectorError::UnexpectedToken {
                        pos,
                        token: format!("{token:?}"),
                    }),
                    None => Err(SelectorError::UnexpectedEnd),
                }
            }
            Some((_, Token::Atom(word))) => {
                let (key, value) = split_label(&word);
                Ok(Expr::Atom {
                    key: key.to_string(),
                    value: value.map(str::to_string),
                })
            }
            Some((pos, token)) => Err(SelectorError::UnexpectedToken {
                pos,
                token: format!("{token:?}"),
            }),
            None => Err(SelectorError::UnexpectedEnd),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn key_value_atom() {
        let sel = LabelSelector::new("source=java").unwrap();
        assert!(sel.matches(&labels(&["source=java", "target=quarkus"])));
        assert!(!sel.matches(&labels(&["source=go"])));
        assert!(!sel.matches(&labels(&[])));
    }

    #[test]
    fn key_only_atom_matches_any_value() {
        let sel = LabelSelector::new("source").unwrap();
        assert!(sel.matches(&labels(&["source=java"])));
        assert!(sel.matches(&labels(&["source"])));
        assert!(!sel.matches(&labels(&["target=java"])));
    }

    #[test]
    fn wildcard_value() {
        let sel = LabelSelector::new("source=*").unwrap();
        assert!(sel.matches(&labels(&["source=java"])));
        assert!(!sel.matches(&labels(&["target=java"])));
    }

    #[test]
    fn valueless_label_satisfies_any_value() {
        let sel = LabelSelector::new("source=java").unwrap();
        assert!(sel.matches(&labels(&["source"])));
    }

    #[test]
    fn and_or_precedence() {
        // AND binds tighter than OR.
        let sel = LabelSelector::new("a=1 || b=1 && c=1").unwrap();
        assert!(sel.matches(&labels(&["a=1"])));
        assert!(sel.matches(&labels(&["b=1", "c=1"])));
        assert!(!sel.matches(&labels(&["b=1"])));
    }

    #[test]
    fn parentheses_override_precedence() {
        let sel = LabelSelector::new("(a=1 || b=1) && c=1").unwrap();
        assert!(!sel.matches(&labels(&["a=1"])));
        assert!(sel.matches(&labels(&["a=1", "c=1"])));
    }

    #[test]
    fn negation() {
        let sel = LabelSelector::new("!source=java").unwrap();
        assert!(sel.matches(&labels(&["source=go"])));
        assert!(!sel.matches(&labels(&["source=java"])));
    }

    #[test]
    fn keyword_operators() {
        let sel = LabelSelector::new("source=java AND NOT target=quarkus").unwrap();
        assert!(sel.matches(&labels(&["source=java"])));
        assert!(!sel.matches(&labels(&["source=java", "target=quarkus"])));
    }

    #[test]
    fn namespaced_keys() {
        let sel = LabelSelector::new("vendor.io/source=java").unwrap();
        assert!(sel.matches(&labels(&["vendor.io/source=java"])));
    }

    #[test]
    fn malformed_expressions_fail_at_construction() {
        assert_eq!(LabelSelector::new("").unwrap_err(), SelectorError::Empty);
        assert_eq!(LabelSelector::new("   ").unwrap_err(), SelectorError::Empty);
        assert!(matches!(
            LabelSelector::new("a=1 &&").unwrap_err(),
            SelectorError::UnexpectedEnd
        ));
        assert!(matches!(
            LabelSelector::new("a=1 & b=1").unwrap_err(),
            SelectorError::UnexpectedChar { .. }
        ));
        assert!(matches!(
            LabelSelector::new("(a=1").unwrap_err(),
            SelectorError::UnexpectedEnd
        ));
        assert!(matches!(
            LabelSelector::new("a=1 b=1").unwrap_err(),
            SelectorError::UnexpectedToken { .. }
        ));
    }
}
