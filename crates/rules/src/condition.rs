//! Condition language: selection names combined with `and` / `or` / `not`,
//! parentheses, and the quantifiers `1 of <glob>`, `any of <glob>` and
//! `all of <glob>` (`them` means every selection).
//!
//! A condition is parsed into an [`Expr`], then resolved against the rule's
//! selection names into a [`Condition`]: quantifiers become explicit
//! aggregates over the matching selections and unknown names are rejected.
//! Evaluation interprets the tree against precomputed selection results.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use thiserror::Error;

/// Errors raised while parsing, resolving or evaluating a condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,

    #[error("unexpected character '{0}' at offset {1}")]
    InvalidCharacter(char, usize),

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("unexpected end of condition")]
    UnexpectedEnd,

    #[error("unsupported quantifier '{0} of' (only '1', 'any' and 'all' are supported)")]
    UnsupportedQuantifier(String),

    #[error("unknown selection '{0}'")]
    UnknownSelection(String),

    #[error("condition must be a string or a list of strings")]
    InvalidShape,
}

// ── Tokens ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Word(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Word(w) => write!(f, "{}", w),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '*' | '-' | '.')
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '(' {
            tokens.push(Token::LParen);
            chars.next();
        } else if c == ')' {
            tokens.push(Token::RParen);
            chars.next();
        } else if is_word_char(c) {
            let mut word = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if !is_word_char(c) {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token::Word(word));
        } else {
            return Err(ConditionError::InvalidCharacter(c, offset));
        }
    }

    Ok(tokens)
}

// ── Parsed expression ───────────────────────────────────────────────

/// Quantifier kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// `1 of` / `any of`
    Any,
    /// `all of`
    All,
}

/// Condition as written, before selection names are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Selection(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// Quantifier over a name glob (`*` wildcard, `them` = everything).
    Quantified(Quantifier, String),
}

fn keyword(token: Option<&Token>, kw: &str) -> bool {
    matches!(token, Some(Token::Word(w)) if w.eq_ignore_ascii_case(kw))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // expr := and ('or' and)*
    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut terms = vec![self.parse_and()?];
        while keyword(self.peek(), "or") {
            self.next();
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { Expr::Or(terms) })
    }

    // and := unary ('and' unary)*
    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut terms = vec![self.parse_unary()?];
        while keyword(self.peek(), "and") {
            self.next();
            terms.push(self.parse_unary()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { Expr::And(terms) })
    }

    // unary := 'not' unary | primary
    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if keyword(self.peek(), "not") {
            self.next();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    // primary := '(' expr ')' | quantifier 'of' glob | name
    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        match self.next() {
            None => Err(ConditionError::UnexpectedEnd),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(ConditionError::UnexpectedToken(other.to_string())),
                    None => Err(ConditionError::UnexpectedEnd),
                }
            }
            Some(Token::RParen) => Err(ConditionError::UnexpectedToken(")".to_string())),
            Some(Token::Word(word)) => {
                if keyword(self.peek(), "of") {
                    self.next();
                    let quantifier = match word.to_ascii_lowercase().as_str() {
                        "1" | "any" => Quantifier::Any,
                        "all" => Quantifier::All,
                        _ => return Err(ConditionError::UnsupportedQuantifier(word)),
                    };
                    return match self.next() {
                        Some(Token::Word(glob)) if !is_reserved(&glob) => {
                            Ok(Expr::Quantified(quantifier, glob))
                        }
                        Some(other) => Err(ConditionError::UnexpectedToken(other.to_string())),
                        None => Err(ConditionError::UnexpectedEnd),
                    };
                }
                if is_reserved(&word) {
                    return Err(ConditionError::UnexpectedToken(word));
                }
                Ok(Expr::Selection(word))
            }
        }
    }
}

fn is_reserved(word: &str) -> bool {
    ["and", "or", "not", "of"].iter().any(|kw| word.eq_ignore_ascii_case(kw))
}

impl Expr {
    /// Parse a condition string.
    pub fn parse(input: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.peek_at(0) {
            None => Ok(expr),
            Some(extra) => Err(ConditionError::UnexpectedToken(extra.to_string())),
        }
    }

    /// Bind selection names: expand quantifiers and reject unknown names.
    pub fn resolve(&self, selections: &[String]) -> Result<Condition, ConditionError> {
        match self {
            Expr::Selection(name) => {
                if selections.iter().any(|s| s == name) {
                    Ok(Condition::Selection(name.clone()))
                } else {
                    Err(ConditionError::UnknownSelection(name.clone()))
                }
            }
            Expr::Not(inner) => Ok(Condition::Not(Box::new(inner.resolve(selections)?))),
            Expr::And(terms) => Ok(Condition::And(
                terms.iter().map(|t| t.resolve(selections)).collect::<Result<_, _>>()?,
            )),
            Expr::Or(terms) => Ok(Condition::Or(
                terms.iter().map(|t| t.resolve(selections)).collect::<Result<_, _>>()?,
            )),
            Expr::Quantified(quantifier, glob) => {
                let names = matching_selections(glob, selections);
                Ok(match quantifier {
                    Quantifier::Any => Condition::AnyOf(names),
                    Quantifier::All => Condition::AllOf(names),
                })
            }
        }
    }
}

/// Selection names matched by a quantifier target, in declaration order.
fn matching_selections(glob: &str, selections: &[String]) -> Vec<String> {
    if glob.eq_ignore_ascii_case("them") {
        return selections.to_vec();
    }
    let pattern = format!(
        "^{}$",
        glob.split('*').map(regex::escape).collect::<Vec<_>>().join(".*")
    );
    // Escaped literals joined by `.*` always form a valid regex.
    match Regex::new(&pattern) {
        Ok(re) => selections.iter().filter(|s| re.is_match(s)).cloned().collect(),
        Err(_) => Vec::new(),
    }
}

// ── Resolved condition ──────────────────────────────────────────────

/// A condition bound to a rule's selections, ready for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Selection(String),
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    /// True if any listed selection is true. Empty is false.
    AnyOf(Vec<String>),
    /// True if every listed selection is true and the list is non-empty.
    AllOf(Vec<String>),
}

impl Condition {
    /// Parse and resolve in one step.
    pub fn compile(input: &str, selections: &[String]) -> Result<Self, ConditionError> {
        Expr::parse(input)?.resolve(selections)
    }

    /// Compile the raw `condition` entry of a detection block. A list of
    /// condition strings is the disjunction of its members.
    pub fn from_value(
        raw: &serde_json::Value,
        selections: &[String],
    ) -> Result<Self, ConditionError> {
        match raw {
            serde_json::Value::String(s) => Self::compile(s, selections),
            serde_json::Value::Array(items) if !items.is_empty() => {
                let terms = items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => Self::compile(s, selections),
                        _ => Err(ConditionError::InvalidShape),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if terms.len() == 1 {
                    terms.into_iter().next().unwrap_or(Condition::Or(Vec::new()))
                } else {
                    Condition::Or(terms)
                })
            }
            _ => Err(ConditionError::InvalidShape),
        }
    }

    /// Evaluate against `name → selection result`.
    pub fn evaluate(&self, results: &HashMap<String, bool>) -> Result<bool, ConditionError> {
        let lookup = |name: &String| {
            results
                .get(name)
                .copied()
                .ok_or_else(|| ConditionError::UnknownSelection(name.clone()))
        };

        match self {
            Condition::Selection(name) => lookup(name),
            Condition::Not(inner) => Ok(!inner.evaluate(results)?),
            Condition::And(terms) => {
                for term in terms {
                    if !term.evaluate(results)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or(terms) => {
                for term in terms {
                    if term.evaluate(results)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::AnyOf(names) => {
                for name in names {
                    if lookup(name)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::AllOf(names) => {
                if names.is_empty() {
                    return Ok(false);
                }
                for name in names {
                    if !lookup(name)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn env(pairs: &[(&str, bool)]) -> HashMap<String, bool> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn eval(condition: &str, pairs: &[(&str, bool)]) -> bool {
        let selections: Vec<String> = pairs.iter().map(|(k, _)| k.to_string()).collect();
        Condition::compile(condition, &selections)
            .unwrap()
            .evaluate(&env(pairs))
            .unwrap()
    }

    #[test]
    fn parse_precedence_not_and_or() {
        let expr = Expr::parse("a or not b and c").unwrap();
        assert_eq!(
            expr,
            Expr::Or(vec![
                Expr::Selection("a".into()),
                Expr::And(vec![
                    Expr::Not(Box::new(Expr::Selection("b".into()))),
                    Expr::Selection("c".into()),
                ]),
            ])
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert!(eval("sel AND NOT filter", &[("sel", true), ("filter", false)]));
        assert!(eval("1 OF sel* Or x", &[("sel1", false), ("x", true)]));
    }

    #[test]
    fn parentheses_group() {
        let pairs = [("a", false), ("b", true), ("c", false)];
        assert!(!eval("(a or b) and c", &pairs));
        assert!(eval("a or (b and not c)", &pairs));
    }

    #[test]
    fn one_of_is_true_iff_any_prefixed_selection_holds() {
        assert!(eval("1 of sel_*", &[("sel_a", false), ("sel_b", true)]));
        assert!(!eval("1 of sel_*", &[("sel_a", false), ("sel_b", false), ("other", true)]));
        assert!(eval("any of sel_*", &[("sel_a", true)]));
    }

    #[test]
    fn all_of_requires_every_match_and_at_least_one() {
        assert!(!eval("all of sel_*", &[("sel_a", false), ("sel_b", true)]));
        assert!(eval("all of sel_*", &[("sel_a", true), ("sel_b", true), ("other", false)]));
        assert!(!eval("all of nothing_*", &[("sel_a", true)]));
        assert!(!eval("1 of nothing_*", &[("sel_a", true)]));
    }

    #[test]
    fn them_covers_every_selection() {
        assert!(eval("all of them", &[("a", true), ("b", true)]));
        assert!(!eval("all of them", &[("a", true), ("b", false)]));
        assert!(eval("1 of them", &[("a", false), ("b", true)]));
    }

    #[test]
    fn glob_does_not_collide_on_partial_names() {
        let selections = names(&["selection", "selection_extra"]);
        let resolved = Condition::compile("selection", &selections).unwrap();
        assert_eq!(resolved, Condition::Selection("selection".into()));

        let resolved = Condition::compile("all of selection", &selections).unwrap();
        assert_eq!(resolved, Condition::AllOf(names(&["selection"])));
    }

    #[test]
    fn glob_wildcard_in_the_middle() {
        let selections = names(&["sel_proc_a", "sel_net_a", "sel_proc_b"]);
        let resolved = Condition::compile("1 of sel_*_a", &selections).unwrap();
        assert_eq!(resolved, Condition::AnyOf(names(&["sel_proc_a", "sel_net_a"])));
    }

    #[test]
    fn unknown_selection_is_rejected() {
        let err = Condition::compile("selection and filter", &names(&["selection"])).unwrap_err();
        assert_eq!(err, ConditionError::UnknownSelection("filter".into()));
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(Expr::parse("   ").unwrap_err(), ConditionError::Empty);
        assert_eq!(Expr::parse("a and").unwrap_err(), ConditionError::UnexpectedEnd);
        assert_eq!(Expr::parse("(a or b").unwrap_err(), ConditionError::UnexpectedEnd);
        assert!(matches!(Expr::parse("a b").unwrap_err(), ConditionError::UnexpectedToken(_)));
        assert!(matches!(
            Expr::parse("selection | count() > 5").unwrap_err(),
            ConditionError::InvalidCharacter('|', _)
        ));
        assert_eq!(
            Expr::parse("2 of sel*").unwrap_err(),
            ConditionError::UnsupportedQuantifier("2".into())
        );
    }

    #[test]
    fn no_execution_surface() {
        // Anything that is not a selection name is refused at resolve time.
        let err = Condition::compile("__import__", &names(&["selection"])).unwrap_err();
        assert!(matches!(err, ConditionError::UnknownSelection(_)));
        assert!(Expr::parse("results['x']").is_err());
    }

    #[test]
    fn condition_list_is_a_disjunction() {
        let raw = serde_json::json!(["a and b", "c"]);
        let cond = Condition::from_value(&raw, &names(&["a", "b", "c"])).unwrap();
        assert!(cond.evaluate(&env(&[("a", false), ("b", true), ("c", true)])).unwrap());
        assert!(!cond.evaluate(&env(&[("a", false), ("b", true), ("c", false)])).unwrap());

        assert_eq!(
            Condition::from_value(&serde_json::json!(42), &names(&["a"])).unwrap_err(),
            ConditionError::InvalidShape
        );
    }

    #[test]
    fn missing_result_is_an_error() {
        let cond = Condition::Selection("ghost".into());
        assert!(cond.evaluate(&HashMap::new()).is_err());
    }
}
