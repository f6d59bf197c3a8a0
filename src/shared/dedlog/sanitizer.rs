//! Log message sanitization for deduplicated logging.
//
//! Volatile fragments (job ids, addresses, timestamps) are replaced with
//! placeholders so messages that differ only in them collapse together.

use regex::Regex;

/// Sanitization rule with regex pattern and placeholder
struct Rule {
    re: Regex,
    placeholder: &'static str,
}

/// Sanitizer applies an ordered set of sanitization rules
pub struct Sanitizer {
    rules: Vec<Rule>,
    collapse_spaces: bool,
}

/// Options for customizing Sanitizer
pub struct WithCollapseSpaces(pub bool);

const RULES: &[(&str, &str)] = &[
    // RFC3339 timestamps
    (
        r"\b\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?(?:Z|[+-]\d{2}:\d{2})\b",
        "<ts>",
    ),
    // Job ids and other UUIDs
    (
        r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[1-5][0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}\b",
        "<uuid>",
    ),
    // URLs, before hosts so the whole connection string collapses
    (r"\b(?:https?|rediss?)://[^\s]+", "<url>"),
    // IPv4 with optional port
    (r"\b(?:\d{1,3}\.){3}\d{1,3}(?::\d{1,5})?\b", "<ip4>"),
    // Hostnames
    (r"\b(?:[A-Za-z0-9-]{1,63}\.)+[A-Za-z]{2,}\b", "<host>"),
    // Elapsed durations such as 512ms or 1.5s
    (r"\b\d+(?:\.\d+)?(?:ns|us|µs|ms|s)\b", "<dur>"),
];

impl Sanitizer {
    /// Creates a new log sanitizer.
    pub fn new(opts: WithCollapseSpaces) -> Self {
        let rules = RULES
            .iter()
            .filter_map(|&(pattern, placeholder)| {
                Regex::new(pattern).ok().map(|re| Rule { re, placeholder })
            })
            .collect();

        Self {
            rules,
            collapse_spaces: opts.0,
        }
    }

    /// Sanitizes a message string according to the configured rules
    pub fn sanitize(&self, err: &str) -> String {
        if err.is_empty() {
            return String::new();
        }

        let mut result = err.to_string();
        for rule in &self.rules {
            result = rule.re.replace_all(&result, rule.placeholder).into_owned();
        }

        if self.collapse_spaces {
            result = result.split_whitespace().collect::<Vec<_>>().join(" ");
        }

        result
    }
}
