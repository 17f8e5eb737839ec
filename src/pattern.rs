use std::fmt;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatternError {
    #[error("empty highway name pattern")]
    Empty,
    #[error("pattern {0:?} ends with a dangling escape")]
    TrailingEscape(String),
    #[error("pattern {0:?} has '?' with nothing to make optional")]
    DanglingOptional(String),
    #[error("pattern {0:?} failed to compile: {1}")]
    Compile(String, String),
}

impl PatternError {
    pub fn pattern(&self) -> &str {
        match self {
            PatternError::Empty => "",
            PatternError::TrailingEscape(p)
            | PatternError::DanglingOptional(p)
            | PatternError::Compile(p, _) => p,
        }
    }
}

/// Highway name pattern.
///
/// Everything is literal except `.` (any single character) and `?` (the
/// preceding character is optional); `\` escapes either of them. OSM names
/// differ in punctuation, so `St.? Kilda Rd` finds both "St Kilda Rd" and
/// "St. Kilda Rd". Matching searches anywhere in the name, case-sensitively.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    pub fn new(source: &str) -> Result<Self, PatternError> {
        let translated = translate(source)?;
        let regex = Regex::new(&translated)
            .map_err(|e| PatternError::Compile(source.to_string(), e.to_string()))?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The compiled regular expression. Plain groups only, so it doubles as a
    /// POSIX filter in Overpass queries.
    pub fn regex_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn translate(source: &str) -> Result<String, PatternError> {
    if source.is_empty() {
        return Err(PatternError::Empty);
    }

    // (regex fragment, already optional)
    let mut tokens: Vec<(String, bool)> = Vec::new();
    let mut chars = source.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| PatternError::TrailingEscape(source.to_string()))?;
                tokens.push((regex::escape(&escaped.to_string()), false));
            }
            '.' => tokens.push((".".to_string(), false)),
            '?' => match tokens.last_mut() {
                Some((fragment, optional)) if !*optional => {
                    *fragment = format!("({})?", fragment);
                    *optional = true;
                }
                _ => return Err(PatternError::DanglingOptional(source.to_string())),
            },
            other => tokens.push((regex::escape(&other.to_string()), false)),
        }
    }

    Ok(tokens.into_iter().map(|(fragment, _)| fragment).collect())
}
