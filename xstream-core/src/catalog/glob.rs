//! Shell-style glob patterns for identity matching.
//!
//! Supported syntax (case-sensitive, `*` also crosses `/`):
//!
//! | Token     | Matches                                   |
//! |-----------|-------------------------------------------|
//! | `*`       | any run of characters, including none     |
//! | `?`       | exactly one character                     |
//! | `[abc]`   | one character from the set                |
//! | `[a-z]`   | one character in the inclusive range      |
//! | `[!a-z]`  | one character *not* in the set (`^` too)  |
//! | `\x`      | the literal character `x`                 |
//!
//! A `]` directly after the opening `[` (or after the negation mark) is
//! a literal member of the class.

use std::fmt;

use crate::error::XStreamError;

// ── Token ────────────────────────────────────────────────────────

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
            Token::Star => true,
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

// ── GlobPattern ──────────────────────────────────────────────────

/// A compiled glob pattern.
#[derive(Clone, PartialEq, Eq)]
pub struct GlobPattern {
    source: String,
    tokens: Vec<Token>,
}

impl GlobPattern {
    /// Compile `pattern`, rejecting unterminated classes and trailing escapes.
    pub fn new(pattern: &str) -> Result<Self, XStreamError> {
        let invalid = |reason| XStreamError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let mut tokens = Vec::new();
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            let token = match c {
                '*' => {
                    // Collapse runs of stars; they match the same set.
                    if tokens.last() == Some(&Token::Star) {
                        continue;
                    }
                    Token::Star
                }
                '?' => Token::AnyChar,
                '\\' => Token::Literal(chars.next().ok_or_else(|| invalid("trailing escape"))?),
                '[' => {
                    let negated = matches!(chars.peek(), Some('!') | Some('^'));
                    if negated {
                        chars.next();
                    }

                    let mut items = Vec::new();
                    let mut first = true;
                    loop {
                        let member = match chars.next() {
                            None => return Err(invalid("unterminated character class")),
                            Some(']') if !first => break,
                            Some('\\') => {
                                chars.next().ok_or_else(|| invalid("trailing escape"))?
                            }
                            Some(m) => m,
                        };
                        first = false;

                        // `a-z` unless the dash is the last member.
                        let mut lookahead = chars.clone();
                        if lookahead.next() == Some('-') {
                            match lookahead.next() {
                                Some(']') | None => items.push(ClassItem::Single(member)),
                                Some(hi) => {
                                    chars.next();
                                    chars.next();
                                    if hi < member {
                                        return Err(invalid("reversed range in character class"));
                                    }
                                    items.push(ClassItem::Range(member, hi));
                                }
                            }
                        } else {
                            items.push(ClassItem::Single(member));
                        }
                    }
                    Token::Class { negated, items }
                }
                other => Token::Literal(other),
            };
            tokens.push(token);
        }

        Ok(Self {
            source: pattern.to_string(),
            tokens,
        })
    }

    /// The pattern text as written in the catalog.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `subject` matches this pattern in full.
    pub fn matches(&self, subject: &str) -> bool {
        let subject: Vec<char> = subject.chars().collect();
        let mut p = 0;
        let mut i = 0;
        // Position of the last star and the subject index it resumes from.
        let mut backtrack: Option<(usize, usize)> = None;

        while i < subject.len() {
            match self.tokens.get(p) {
                Some(Token::Star) => {
                    backtrack = Some((p, i));
                    p += 1;
                    continue;
                }
                Some(token) if token.matches_char(subject[i]) => {
                    p += 1;
                    i += 1;
                    continue;
                }
                _ => {}
            }

            match backtrack {
                Some((star, resume)) => {
                    p = star + 1;
                    i = resume + 1;
                    backtrack = Some((star, resume + 1));
                }
                None => return false,
            }
        }

        self.tokens[p..].iter().all(|t| *t == Token::Star)
    }
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobPattern").field(&self.source).finish()
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ── Tests ────────────────────────────────────────────────────────
