//! Address pattern compilation and matching
//!
//! OSC address patterns are matched segment by segment; a wildcard never
//! crosses a `/`.
//!
//! - `?` matches one character
//! - `*` matches zero or more characters
//! - `[abc]`, `[a-z]` match one character from the set; `[!abc]` negates it
//! - `{foo,bar}` matches any one of the comma-separated alternatives
//!
//! ```
//! use oscwire_core::AddressPattern;
//!
//! let pattern = AddressPattern::compile("/mixer/[1-8]/{gain,pan}").unwrap();
//! assert!(pattern.matches("/mixer/3/pan"));
//! assert!(!pattern.matches("/mixer/9/pan"));
//! ```

use tracing::warn;

use crate::message::PATTERN_CHARS;
use crate::{Error, Result};

/// Backtracking steps allowed for one segment before matching gives up
pub const MAX_MATCH_STEPS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    AnyChar,
    AnySeq,
    Class {
        negated: bool,
        ranges: Vec<(char, char)>,
    },
    Alternation(Vec<Vec<Token>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Exact(String),
    Tokens(Vec<Token>),
}

/// A compiled, reusable address matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPattern {
    raw: String,
    segments: Vec<Segment>,
    literal: bool,
}

impl AddressPattern {
    /// Compile a pattern. Fails on unbalanced `[` / `{` or stray `]` / `}`.
    pub fn compile(pattern: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for part in pattern.split('/') {
            if is_pattern(part) {
                let tokens = Parser::new(part).parse_segment().map_err(|e| match e {
                    Error::Pattern(reason) => {
                        Error::Pattern(format!("{} in {:?}", reason, pattern))
                    }
                    other => other,
                })?;
                segments.push(Segment::Tokens(tokens));
            } else {
                segments.push(Segment::Exact(part.to_string()));
            }
        }

        let literal = segments.iter().all(|s| matches!(s, Segment::Exact(_)));
        Ok(Self {
            raw: pattern.to_string(),
            segments,
            literal,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern contains no wildcards
    pub fn is_literal(&self) -> bool {
        self.literal
    }

    /// Match a concrete address. Never fails; an address that cannot match
    /// (or exhausts the step bound) is simply not a match.
    pub fn matches(&self, address: &str) -> bool {
        match self.try_matches(address) {
            Ok(matched) => matched,
            Err(e) => {
                warn!("Giving up on {:?} against {}: {}", address, self.raw, e);
                false
            }
        }
    }

    /// Match, reporting [`Error::Match`] when the backtracking bound is hit
    pub fn try_matches(&self, address: &str) -> Result<bool> {
        if self.literal {
            return Ok(self.raw == address);
        }

        let mut parts = address.split('/');
        for segment in &self.segments {
            let Some(part) = parts.next() else {
                return Ok(false);
            };
            let matched = match segment {
                Segment::Exact(s) => s == part,
                Segment::Tokens(tokens) => {
                    let mut budget = MAX_MATCH_STEPS;
                    match_here(tokens, None, part, &mut budget)?
                }
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(parts.next().is_none())
    }
}

impl std::fmt::Display for AddressPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for AddressPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AddressPattern::compile(s)
    }
}

/// Whether `s` contains any pattern syntax
pub fn is_pattern(s: &str) -> bool {
    s.contains(PATTERN_CHARS)
}

/// One-shot compile and match
pub fn pattern_matches(pattern: &str, address: &str) -> Result<bool> {
    AddressPattern::compile(pattern)?.try_matches(address)
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(segment: &'a str) -> Self {
        Self {
            chars: segment.chars().peekable(),
        }
    }

    fn parse_segment(&mut self) -> Result<Vec<Token>> {
        let tokens = self.parse_sequence(false)?;
        debug_assert!(self.chars.peek().is_none());
        Ok(tokens)
    }

    /// Parse until end of input, or until `,` / `}` inside an alternation
    fn parse_sequence(&mut self, in_alternation: bool) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut literal = String::new();

        while let Some(&c) = self.chars.peek() {
            if in_alternation && (c == ',' || c == '}') {
                break;
            }
            self.chars.next();

            let token = match c {
                '?' => Token::AnyChar,
                '*' => Token::AnySeq,
                '[' => self.parse_class()?,
                '{' => self.parse_alternation()?,
                ']' => return Err(Error::Pattern("unmatched ']'".to_string())),
                '}' => return Err(Error::Pattern("unmatched '}'".to_string())),
                other => {
                    literal.push(other);
                    continue;
                }
            };

            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            // Adjacent stars are equivalent to one
            if token == Token::AnySeq && tokens.last() == Some(&Token::AnySeq) {
                continue;
            }
            tokens.push(token);
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }
        Ok(tokens)
    }

    fn parse_class(&mut self) -> Result<Token> {
        let mut negated = false;
        if matches!(self.chars.peek(), Some('!') | Some('^')) {
            negated = true;
            self.chars.next();
        }

        let mut ranges = Vec::new();
        loop {
            let c = self
                .chars
                .next()
                .ok_or_else(|| Error::Pattern("unclosed '['".to_string()))?;
            if c == ']' {
                break;
            }

            if self.chars.peek() == Some(&'-') {
                let mut ahead = self.chars.clone();
                ahead.next();
                match ahead.next() {
                    Some(end) if end != ']' => {
                        self.chars.next();
                        self.chars.next();
                        ranges.push(if c <= end { (c, end) } else { (end, c) });
                        continue;
                    }
                    // trailing '-' is a literal; the next iteration picks it up
                    _ => {}
                }
            }
            ranges.push((c, c));
        }

        Ok(Token::Class { negated, ranges })
    }

    fn parse_alternation(&mut self) -> Result<Token> {
        let mut alternatives = Vec::new();
        loop {
            alternatives.push(self.parse_sequence(true)?);
            match self.chars.next() {
                Some(',') => continue,
                Some('}') => break,
                _ => return Err(Error::Pattern("unclosed '{'".to_string())),
            }
        }
        Ok(Token::Alternation(alternatives))
    }
}

/// Tokens still to be matched after the current alternative finishes
struct Cont<'a> {
    tokens: &'a [Token],
    next: Option<&'a Cont<'a>>,
}

fn match_here<'a>(
    tokens: &'a [Token],
    next: Option<&'a Cont<'a>>,
    input: &str,
    budget: &mut usize,
) -> Result<bool> {
    if *budget == 0 {
        return Err(Error::Match(format!(
            "backtracking bound of {} steps exhausted",
            MAX_MATCH_STEPS
        )));
    }
    *budget -= 1;

    let Some((first, rest)) = tokens.split_first() else {
        return match next {
            Some(cont) => match_here(cont.tokens, cont.next, input, budget),
            None => Ok(input.is_empty()),
        };
    };

    match first {
        Token::Literal(lit) => match input.strip_prefix(lit.as_str()) {
            Some(remaining) => match_here(rest, next, remaining, budget),
            None => Ok(false),
        },
        Token::AnyChar => {
            let mut chars = input.chars();
            match chars.next() {
                Some(_) => match_here(rest, next, chars.as_str(), budget),
                None => Ok(false),
            }
        }
        Token::Class { negated, ranges } => {
            let mut chars = input.chars();
            let Some(c) = chars.next() else {
                return Ok(false);
            };
            let in_set = ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi);
            if in_set == *negated {
                return Ok(false);
            }
            match_here(rest, next, chars.as_str(), budget)
        }
        Token::AnySeq => {
            // Greedy: longest candidate first, backing off one char at a time
            let mut end = input.len();
            loop {
                if match_here(rest, next, &input[end..], budget)? {
                    return Ok(true);
                }
                match input[..end].char_indices().next_back() {
                    Some((i, _)) => end = i,
                    None => return Ok(false),
                }
            }
        }
        Token::Alternation(alternatives) => {
            let cont = Cont { tokens: rest, next };
            for alt in alternatives {
                if match_here(alt, Some(&cont), input, budget)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn m(pattern: &str, address: &str) -> bool {
        AddressPattern::compile(pattern).unwrap().matches(address)
    }

    #[test]
    fn test_literal() {
        assert!(m("/test/path", "/test/path"));
        assert!(m("/", "/"));
        assert!(!m("/test", "/Test"));
        assert!(!m("/test/", "/test"));
        assert!(!m("/test", "/test/"));
        assert!(AddressPattern::compile("/a/b").unwrap().is_literal());
    }

    #[test]
    fn test_star_stays_in_segment() {
        assert!(m("/foo/*", "/foo/bar"));
        assert!(m("/foo/*", "/foo/"));
        assert!(!m("/foo/*", "/foo"));
        assert!(!m("/foo/*", "/foo/bar/baz"));
        assert!(!m("/te*st", "/te/st"));
    }

    #[test]
    fn test_star_backtracks() {
        assert!(m("/te*s*t", "/teABCsDEFt"));
        assert!(m("/*test", "/ABCtest"));
        assert!(m("/a*a", "/aaaa"));
        assert!(!m("/a*b", "/aaaa"));
    }

    #[test]
    fn test_question_mark() {
        assert!(m("/te?t", "/text"));
        assert!(!m("/te?t", "/tet"));
        assert!(m("/???", "/äbc"));
    }

    #[test]
    fn test_classes() {
        assert!(m("/a/[bc]", "/a/b"));
        assert!(m("/a/[bc]", "/a/c"));
        assert!(!m("/a/[bc]", "/a/d"));
        assert!(m("/t[a-z]st", "/test"));
        assert!(!m("/t[a-z]st", "/tAst"));
        assert!(m("/t[!a-z]st", "/t9st"));
        assert!(!m("/t[!eao]st", "/test"));
        assert!(m("/[a-]", "/-"));
        assert!(m("/[z-a]", "/m"));
    }

    #[test]
    fn test_alternation() {
        assert!(m("/x/{on,off}", "/x/on"));
        assert!(m("/x/{on,off}", "/x/off"));
        assert!(!m("/x/{on,off}", "/x/o"));
        assert!(!m("/x/{on,off}", "/x/onoff"));
        assert!(m("/{foo,ba{r,z}}", "/baz"));
        assert!(m("/{te*,re*}", "/results"));
        assert!(m("/test/{a,b,}", "/test/"));
        assert!(m("/{a,b}c", "/bc"));
    }

    #[test]
    fn test_malformed_patterns() {
        for pattern in ["/a/[", "/a/{b,c", "/a/b]", "/a/}", "/t[a/o]st"] {
            let err = AddressPattern::compile(pattern).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Pattern, "{}", pattern);
        }
    }

    #[test]
    fn test_step_bound() {
        let pattern = AddressPattern::compile("/*a*a*a*a*a*a*a*a*a*a*b").unwrap();
        let address = format!("/{}", "a".repeat(200));
        assert_eq!(
            pattern.try_matches(&address).unwrap_err().kind(),
            ErrorKind::Match
        );
        assert!(!pattern.matches(&address));
    }
}
