//! Glob pattern matching for the KEYS command.
//!
//! Supported syntax:
//!
//! - `*` matches any run of characters, including none
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]`, `[^a-z]` match one character from (or not from) a class
//! - `\x` matches `x` literally
//!
//! Patterns are compiled once per call. A pattern that fails to compile is
//! not an error for the caller: [`KeyMatcher`] falls back to comparing keys
//! for exact equality with the raw pattern.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GlobError {
    #[error("unterminated character class")]
    UnterminatedClass,

    #[error("empty character class")]
    EmptyClass,

    #[error("invalid range {0}-{1}")]
    InvalidRange(char, char),

    #[error("trailing escape character")]
    TrailingEscape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassItem {
    Single(char),
    Range(char, char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyChar,
    Star,
    Class { negated: bool, items: Vec<ClassItem> },
}

impl Token {
    fn matches_char(&self, c: char) -> bool {
        match self {
            Token::Literal(l) => *l == c,
            Token::AnyChar => true,
            Token::Star => false,
            Token::Class { negated, items } => {
                let hit = items.iter().any(|item| match *item {
                    ClassItem::Single(s) => s == c,
                    ClassItem::Range(lo, hi) => lo <= c && c <= hi,
                });
                hit != *negated
            }
        }
    }
}

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    tokens: Vec<Token>,
}

impl GlobPattern {
    pub fn parse(pattern: &str) -> Result<Self, GlobError> {
        let mut tokens = Vec::new();
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            let token = match c {
                '*' => {
                    // Consecutive stars behave like one
                    if tokens.last() == Some(&Token::Star) {
                        continue;
                    }
                    Token::Star
                }
                '?' => Token::AnyChar,
                '\\' => Token::Literal(chars.next().ok_or(GlobError::TrailingEscape)?),
                '[' => {
                    let negated = chars.next_if_eq(&'^').is_some();
                    let mut items = Vec::new();
                    loop {
                        let c = match chars.next() {
                            None => return Err(GlobError::UnterminatedClass),
                            Some(']') => break,
                            Some('\\') => chars.next().ok_or(GlobError::UnterminatedClass)?,
                            Some(c) => c,
                        };
                        // A '-' right before ']' is a literal dash
                        if chars.peek() == Some(&'-') {
                            let mut lookahead = chars.clone();
                            lookahead.next();
                            if matches!(lookahead.peek(), Some(&hi) if hi != ']') {
                                chars.next();
                                let hi = match chars.next() {
                                    Some('\\') => {
                                        chars.next().ok_or(GlobError::UnterminatedClass)?
                                    }
                                    Some(hi) => hi,
                                    None => return Err(GlobError::UnterminatedClass),
                                };
                                if hi < c {
                                    return Err(GlobError::InvalidRange(c, hi));
                                }
                                items.push(ClassItem::Range(c, hi));
                                continue;
                            }
                        }
                        items.push(ClassItem::Single(c));
                    }
                    if items.is_empty() {
                        return Err(GlobError::EmptyClass);
                    }
                    Token::Class { negated, items }
                }
                c => Token::Literal(c),
            };
            tokens.push(token);
        }

        Ok(Self { tokens })
    }

    /// Matches the whole of `text` against the pattern.
    ///
    /// Backtracks only to the most recent `*`, so the cost is bounded by
    /// `pattern length * text length`.
    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        let mut p = 0;
        let mut t = 0;
        // (token index after the last star, text index it was tried at)
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match self.tokens.get(p) {
                Some(Token::Star) => {
                    p += 1;
                    backtrack = Some((p, t));
                    continue;
                }
                Some(token) if token.matches_char(text[t]) => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }

            match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p;
                    t = star_t + 1;
                    backtrack = Some((star_p, t));
                }
                None => return false,
            }
        }

        self.tokens[p..].iter().all(|token| *token == Token::Star)
    }
}

/// Decides which keys a KEYS pattern selects.
#[derive(Debug, Clone)]
pub enum KeyMatcher {
    /// The pattern `*`
    All,
    Glob(GlobPattern),
    /// A malformed pattern, compared for exact equality
    Exact(String),
}

impl KeyMatcher {
    pub fn new(pattern: &str) -> Self {
        if pattern == "*" {
            return KeyMatcher::All;
        }
        match GlobPattern::parse(pattern) {
            Ok(glob) => KeyMatcher::Glob(glob),
            Err(e) => {
                tracing::debug!(pattern, error = %e, "Malformed pattern, using exact match");
                KeyMatcher::Exact(pattern.to_string())
            }
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyMatcher::All => true,
            KeyMatcher::Glob(glob) => glob.matches(key),
            KeyMatcher::Exact(exact) => exact == key,
        }
    }
}
