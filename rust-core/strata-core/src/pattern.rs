//! # Placeholder Patterns
//!
//! Compiles route templates such as `/items/{id:\d+}/{slug}` into a single
//! anchored regular expression plus the ordered list of placeholder names.
//!
//! ## Syntax
//!
//! - `{name}` matches one or more non-slash characters (`[^/]+`)
//! - `{name:regex}` matches `regex`; balanced braces are allowed inside
//!   (`{code:\d{3}}`). Escaped braces (`\{`) and braces inside a character
//!   class (`[{}]`) do not count towards the balance
//! - everything else is literal text and is matched verbatim
//!
//! Captures are addressed through synthetic group names, so groups inside a
//! custom expression never shift argument positions.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Write as _;

/// Opening placeholder delimiter
pub const DELIMITER_OPENING: char = '{';

/// Closing placeholder delimiter
pub const DELIMITER_CLOSING: char = '}';

/// Separates a placeholder name from its expression
pub const DELIMITER_SEPARATOR: char = ':';

/// Expression used for placeholders without an explicit one
pub const DEFAULT_EXPRESSION: &str = "[^/]+";

const GROUP_PREFIX: &str = "__arg";

/// Strip the trailing slash, keeping the root `/`
///
/// An empty pattern is coerced to `/`.
#[must_use]
pub fn normalize(pattern: &str) -> String {
    let trimmed = pattern.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder {
        name: &'a str,
        expression: Option<&'a str>,
    },
}

/// Offset of the brace closing a placeholder body
///
/// Tracks nested braces the way the regex engine reads them: the character
/// after `\` is skipped and braces inside `[...]` classes are literal.
fn closing_delimiter(body: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut class_depth = 0usize;
    let mut chars = body.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '[' => {
                class_depth += 1;
                // `]` right after `[` or `[^` is a literal member
                chars.next_if(|&(_, c)| c == '^');
                chars.next_if(|&(_, c)| c == ']');
            }
            ']' if class_depth > 0 => class_depth -= 1,
            _ if class_depth > 0 => {}
            DELIMITER_OPENING => depth += 1,
            DELIMITER_CLOSING => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a template into literal and placeholder segments
fn parse(pattern: &str) -> std::result::Result<Vec<Segment<'_>>, String> {
    let mut segments = Vec::new();
    let mut rest = pattern;

    while let Some(open) = rest.find(DELIMITER_OPENING) {
        if open > 0 {
            segments.push(Segment::Literal(&rest[..open]));
        }

        let body_start = open + DELIMITER_OPENING.len_utf8();
        let close = closing_delimiter(&rest[body_start..]).map(|offset| body_start + offset);
        let close = close.ok_or_else(|| "unclosed placeholder".to_string())?;

        let body = &rest[body_start..close];
        let (name, expression) = match body.split_once(DELIMITER_SEPARATOR) {
            Some((name, expression)) => (name, Some(expression)),
            None => (body, None),
        };

        if name.is_empty() {
            return Err("placeholder without a name".to_string());
        }
        if name.contains('/') || name.contains(DELIMITER_OPENING) {
            return Err(format!("invalid placeholder name '{name}'"));
        }
        if expression.is_some_and(str::is_empty) {
            return Err(format!("empty expression for placeholder '{name}'"));
        }

        segments.push(Segment::Placeholder { name, expression });
        rest = &rest[close + DELIMITER_CLOSING.len_utf8()..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }

    Ok(segments)
}

/// A compiled route template
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    prefix: String,
    names: Vec<String>,
    matcher: Option<Matcher>,
}

#[derive(Debug, Clone)]
struct Matcher {
    regex: Regex,
    groups: Vec<usize>,
}

impl Pattern {
    /// Normalize and compile a route template
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` for unclosed placeholders, empty or
    /// duplicate names, and expressions the regex engine rejects.
    pub fn compile(pattern: &str) -> Result<Self> {
        let source = normalize(pattern);
        let invalid = |reason: String| Error::InvalidRoutePattern {
            pattern: source.clone(),
            reason,
        };

        let segments = parse(&source).map_err(invalid)?;

        let prefix = match segments.first() {
            Some(Segment::Literal(text)) => (*text).to_string(),
            _ => String::new(),
        };

        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut expression = String::from("^");

        for segment in &segments {
            match segment {
                Segment::Literal(text) => expression.push_str(&regex::escape(text)),
                Segment::Placeholder {
                    name,
                    expression: custom,
                } => {
                    if !seen.insert(*name) {
                        return Err(invalid(format!("duplicate placeholder '{name}'")));
                    }
                    let _ = write!(
                        expression,
                        "(?P<{GROUP_PREFIX}{}>{})",
                        names.len(),
                        custom.unwrap_or(DEFAULT_EXPRESSION)
                    );
                    names.push((*name).to_string());
                }
            }
        }
        expression.push('$');

        let matcher = if names.is_empty() {
            None
        } else {
            let regex = Regex::new(&expression).map_err(|e| invalid(e.to_string()))?;
            let groups = (0..names.len())
                .map(|index| {
                    let wanted = format!("{GROUP_PREFIX}{index}");
                    regex
                        .capture_names()
                        .position(|name| name == Some(wanted.as_str()))
                        .ok_or_else(|| invalid(format!("capture group for '{}' was lost", names[index])))
                })
                .collect::<Result<Vec<_>>>()?;
            Some(Matcher { regex, groups })
        };

        Ok(Self {
            source,
            prefix,
            names,
            matcher,
        })
    }

    /// The normalized template
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names in declaration order
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether the template has no placeholders
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.matcher.is_none()
    }

    /// Literal text before the first placeholder
    #[must_use]
    pub fn literal_prefix(&self) -> &str {
        &self.prefix
    }

    /// Cheap pre-check run before the regex
    ///
    /// A path that does not start with the literal prefix can never match.
    #[must_use]
    pub fn may_match(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Match `path` against the whole template
    ///
    /// Returns the captured values in placeholder order. Literal templates
    /// match only their exact text and capture nothing.
    #[must_use]
    pub fn captures(&self, path: &str) -> Option<Vec<String>> {
        let Some(matcher) = &self.matcher else {
            return (path == self.source).then(Vec::new);
        };

        let captures = matcher.regex.captures(path)?;
        matcher
            .groups
            .iter()
            .map(|&group| captures.get(group).map(|m| m.as_str().to_string()))
            .collect()
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
