// Package cache compiles glob-style key patterns used for bulk invalidation.

use regex::Regex;

use super::error::CacheError;

/// A glob pattern over cache keys: `*` matches any run, `?` one character.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    glob: String,
    re: Regex,
}

impl KeyPattern {
    /// Compiles a glob. Empty patterns and patterns with whitespace are rejected.
    pub fn new(glob: &str) -> Result<Self, CacheError> {
        if glob.is_empty() || glob.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CacheError::InvalidPattern(glob.to_string()));
        }

        let mut re = String::with_capacity(glob.len() + 8);
        re.push('^');
        for c in glob.chars() {
            match c {
                '*' => re.push_str(".*"),
                '?' => re.push('.'),
                c => re.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
            }
        }
        re.push('$');

        let re = Regex::new(&re).map_err(|_| CacheError::InvalidPattern(glob.to_string()))?;
        Ok(Self {
            glob: glob.to_string(),
            re,
        })
    }

    /// Checks whether `key` matches the pattern.
    pub fn matches(&self, key: &str) -> bool {
        self.re.is_match(key)
    }

    /// The original glob, as understood by `SCAN MATCH`.
    pub fn as_glob(&self) -> &str {
        &self.glob
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_any_suffix() {
        let p = KeyPattern::new("printer:status:*").unwrap();
        assert!(p.matches("printer:status:1"));
        assert!(p.matches("printer:status:"));
        assert!(!p.matches("printer:config:1"));
    }

    #[test]
    fn test_question_mark_matches_one_char() {
        let p = KeyPattern::new("alert:?").unwrap();
        assert!(p.matches("alert:7"));
        assert!(!p.matches("alert:17"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let p = KeyPattern::new("report.(q1)*").unwrap();
        assert!(p.matches("report.(q1)-fleet"));
        assert!(!p.matches("reportX(q1)-fleet"));
    }

    #[test]
    fn test_rejects_empty_and_whitespace() {
        assert!(KeyPattern::new("").is_err());
        assert!(KeyPattern::new("a b*").is_err());
    }
}
