//! LDAP-style filters over capability properties.
//!
//! The grammar is the classic parenthesized prefix form:
//!
//! ```text
//! filter     = '(' filtercomp ')'
//! filtercomp = '&' filter+ | '|' filter+ | '!' filter | item
//! item       = attr '=' value        equality, presence ("*"), substring
//!            | attr '>=' value       greater-or-equal
//!            | attr '<=' value       less-or-equal
//! ```
//!
//! Values may escape `(`, `)`, `*` and `\` with a backslash. Evaluation is
//! typed: comparing against a [`PropertyValue::Version`] parses the operand
//! as a version, against [`PropertyValue::Int`] as an integer, and falls
//! back to string comparison otherwise.
//!
//! Filters are parsed once into an AST and kept; conjunction for dynamic
//! imports is built structurally with [`Filter::and`] rather than by string
//! splicing.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::capability::PropertyValue;
use crate::version::Version;

// =============================================================================
// AST
// =============================================================================

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `(&(f1)(f2)...)` — all operands must match.
    And(Vec<Filter>),
    /// `(|(f1)(f2)...)` — at least one operand must match.
    Or(Vec<Filter>),
    /// `(!(f))` — operand must not match.
    Not(Box<Filter>),
    /// `(attr=value)` — typed equality.
    Eq { attr: Arc<str>, value: Arc<str> },
    /// `(attr>=value)` — typed greater-or-equal.
    Ge { attr: Arc<str>, value: Arc<str> },
    /// `(attr<=value)` — typed less-or-equal.
    Le { attr: Arc<str>, value: Arc<str> },
    /// `(attr=*)` — attribute presence.
    Present { attr: Arc<str> },
    /// `(attr=ab*cd*)` — substring match; `parts` are the literal segments
    /// between `*` wildcards.
    Substring {
        attr: Arc<str>,
        parts: Vec<Arc<str>>,
        anchored_start: bool,
        anchored_end: bool,
    },
}

impl Filter {
    /// Parse a filter string.
    pub fn parse(input: &str) -> Result<Filter, FilterError> {
        let mut parser = Parser {
            input: input.as_bytes(),
            pos: 0,
        };
        let filter = parser.parse_filter()?;
        parser.skip_whitespace();
        if parser.pos != parser.input.len() {
            return Err(parser.error("trailing characters after filter"));
        }
        Ok(filter)
    }

    /// Structural equality test: `(attr=value)`.
    pub fn eq(attr: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> Filter {
        Filter::Eq {
            attr: attr.into(),
            value: value.into(),
        }
    }

    /// Conjoin filters; flattens nested conjunctions one level.
    pub fn and(operands: Vec<Filter>) -> Filter {
        let mut flat = Vec::with_capacity(operands.len());
        for op in operands {
            match op {
                Filter::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Filter::And(flat)
    }

    /// Evaluate against a property map.
    pub fn matches(&self, props: &FxHashMap<Arc<str>, PropertyValue>) -> bool {
        match self {
            Filter::And(fs) => fs.iter().all(|f| f.matches(props)),
            Filter::Or(fs) => fs.iter().any(|f| f.matches(props)),
            Filter::Not(f) => !f.matches(props),
            Filter::Present { attr } => props.contains_key(attr.as_ref()),
            Filter::Eq { attr, value } => match props.get(attr.as_ref()) {
                Some(PropertyValue::Str(s)) => s.as_ref() == value.as_ref(),
                Some(PropertyValue::Version(v)) => {
                    Version::parse(value).map_or(false, |w| *v == w)
                }
                Some(PropertyValue::Int(i)) => value.parse::<i64>().map_or(false, |j| *i == j),
                None => false,
            },
            Filter::Ge { attr, value } => compare(props.get(attr.as_ref()), value, |o| o >= 0),
            Filter::Le { attr, value } => compare(props.get(attr.as_ref()), value, |o| o <= 0),
            Filter::Substring {
                attr,
                parts,
                anchored_start,
                anchored_end,
            } => match props.get(attr.as_ref()) {
                Some(PropertyValue::Str(s)) => {
                    match_substring(s, parts, *anchored_start, *anchored_end)
                }
                _ => false,
            },
        }
    }
}

/// Three-way comparison of a property against a textual operand; `accept`
/// receives the sign of `property - operand`.
fn compare(
    prop: Option<&PropertyValue>,
    operand: &str,
    accept: impl Fn(i32) -> bool,
) -> bool {
    let ordering = match prop {
        Some(PropertyValue::Version(v)) => match Version::parse(operand) {
            Some(w) => v.cmp(&w),
            None => return false,
        },
        Some(PropertyValue::Int(i)) => match operand.parse::<i64>() {
            Ok(j) => i.cmp(&j),
            Err(_) => return false,
        },
        Some(PropertyValue::Str(s)) => s.as_ref().cmp(operand),
        None => return false,
    };
    accept(match ordering {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    })
}

fn match_substring(
    text: &str,
    parts: &[Arc<str>],
    anchored_start: bool,
    anchored_end: bool,
) -> bool {
    let mut rest = text;
    let last_idx = parts.len().saturating_sub(1);

    for (i, part) in parts.iter().enumerate() {
        let first = i == 0;
        let last = i == last_idx;
        if first && anchored_start && last && anchored_end {
            return rest == part.as_ref();
        } else if first && anchored_start {
            match rest.strip_prefix(part.as_ref()) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if last && anchored_end {
            // The final segment must close out the text, strictly after
            // everything already consumed.
            return rest.len() >= part.len() && rest.ends_with(part.as_ref());
        } else {
            match rest.find(part.as_ref()) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }

    true
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(fs) => {
                write!(f, "(&")?;
                for sub in fs {
                    write!(f, "{}", sub)?;
                }
                write!(f, ")")
            }
            Filter::Or(fs) => {
                write!(f, "(|")?;
                for sub in fs {
                    write!(f, "{}", sub)?;
                }
                write!(f, ")")
            }
            Filter::Not(sub) => write!(f, "(!{})", sub),
            Filter::Eq { attr, value } => write!(f, "({}={})", attr, Escaped(value)),
            Filter::Ge { attr, value } => write!(f, "({}>={})", attr, Escaped(value)),
            Filter::Le { attr, value } => write!(f, "({}<={})", attr, Escaped(value)),
            Filter::Present { attr } => write!(f, "({}=*)", attr),
            Filter::Substring {
                attr,
                parts,
                anchored_start,
                anchored_end,
            } => {
                write!(f, "({}=", attr)?;
                if !anchored_start {
                    write!(f, "*")?;
                }
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    write!(f, "{}", Escaped(part))?;
                }
                if !anchored_end {
                    write!(f, "*")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Escapes `( ) * \` when re-serializing a value.
struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            if matches!(c, '(' | ')' | '*' | '\\') {
                write!(f, "\\")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// A malformed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterError {
    position: usize,
    reason: Arc<str>,
}

impl FilterError {
    /// Byte offset at which parsing failed.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid filter at offset {}: {}", self.position, self.reason)
    }
}

impl std::error::Error for FilterError {}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> FilterError {
        FilterError {
            position: self.pos,
            reason: Arc::from(reason),
        }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    #[inline]
    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: u8) -> Result<(), FilterError> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(match c {
                b'(' => "expected '('",
                b')' => "expected ')'",
                _ => "unexpected character",
            }))
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterError> {
        self.skip_whitespace();
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.parse_filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.parse_filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.skip_whitespace();
        self.expect(b')')?;
        Ok(filter)
    }

    fn parse_filter_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut list = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'(') => list.push(self.parse_filter()?),
                _ => break,
            }
        }
        if list.is_empty() {
            return Err(self.error("empty operand list"));
        }
        Ok(list)
    }

    fn parse_item(&mut self) -> Result<Filter, FilterError> {
        let attr = self.parse_attr()?;

        // Operator: '=', '>=', '<='.
        let op = match self.bump() {
            Some(b'=') => b'=',
            Some(b'>') => {
                self.expect(b'=')?;
                b'>'
            }
            Some(b'<') => {
                self.expect(b'=')?;
                b'<'
            }
            _ => return Err(self.error("expected '=', '>=' or '<='")),
        };

        let (segments, wildcards) = self.parse_value()?;

        match op {
            b'>' => Ok(Filter::Ge {
                attr,
                value: join_plain(&segments, wildcards, self)?,
            }),
            b'<' => Ok(Filter::Le {
                attr,
                value: join_plain(&segments, wildcards, self)?,
            }),
            _ => {
                if wildcards == 0 {
                    Ok(Filter::Eq {
                        attr,
                        value: segments.into_iter().next().unwrap_or_else(|| Arc::from("")),
                    })
                } else if segments.iter().all(|s| s.is_empty()) {
                    if wildcards == 1 {
                        Ok(Filter::Present { attr })
                    } else {
                        Err(self.error("bare wildcards in substring value"))
                    }
                } else {
                    let anchored_start = !segments.first().map_or(true, |s| s.is_empty());
                    let anchored_end = !segments.last().map_or(true, |s| s.is_empty());
                    let parts: Vec<Arc<str>> =
                        segments.into_iter().filter(|s| !s.is_empty()).collect();
                    Ok(Filter::Substring {
                        attr,
                        parts,
                        anchored_start,
                        anchored_end,
                    })
                }
            }
        }
    }

    fn parse_attr(&mut self) -> Result<Arc<str>, FilterError> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, b'=' | b'<' | b'>' | b'(' | b')' | b'~' | b'*') {
                break;
            }
            self.pos += 1;
        }
        let attr = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("attribute is not valid UTF-8"))?
            .trim();
        if attr.is_empty() {
            return Err(self.error("empty attribute name"));
        }
        Ok(Arc::from(attr))
    }

    /// Parse a value up to the closing `)`, splitting on unescaped `*`.
    /// Returns the literal segments (possibly empty strings at the ends)
    /// and the number of wildcards seen.
    fn parse_value(&mut self) -> Result<(Vec<Arc<str>>, usize), FilterError> {
        let mut segments = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        let mut wildcards = 0usize;

        loop {
            match self.peek() {
                Some(b')') | None => break,
                Some(b'(') => return Err(self.error("unescaped '(' in value")),
                Some(b'*') => {
                    self.pos += 1;
                    wildcards += 1;
                    segments.push(self.finish_segment(&mut current)?);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.bump() {
                        Some(c) => current.push(c),
                        None => return Err(self.error("dangling escape")),
                    }
                }
                Some(c) => {
                    self.pos += 1;
                    current.push(c);
                }
            }
        }
        segments.push(self.finish_segment(&mut current)?);
        Ok((segments, wildcards))
    }

    fn finish_segment(&self, bytes: &mut Vec<u8>) -> Result<Arc<str>, FilterError> {
        let segment = std::str::from_utf8(bytes)
            .map(Arc::from)
            .map_err(|_| self.error("value is not valid UTF-8"))?;
        bytes.clear();
        Ok(segment)
    }
}

/// Ordering operators take no wildcards; rejoin the single segment.
fn join_plain(
    segments: &[Arc<str>],
    wildcards: usize,
    parser: &Parser<'_>,
) -> Result<Arc<str>, FilterError> {
    if wildcards != 0 {
        return Err(parser.error("wildcard not allowed with ordering operator"));
    }
    Ok(segments.first().cloned().unwrap_or_else(|| Arc::from("")))
}

// =============================================================================
// Tests
// =============================================================================
