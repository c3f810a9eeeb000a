//! Plaintext-secret patterns.
//!
//! Two kinds: file names that are plaintext secret files on sight, and
//! `NAME=value` assignments whose name marks a secret. Lines are pre-filtered
//! with an Aho-Corasick automaton over the secret-name keywords, so the
//! assignment regex only runs on lines that can possibly match.

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::error::{AuditError, Result};

/// (label, file-name regex)
const DEFAULT_FILENAME_PATTERNS: &[(&str, &str)] = &[
    ("dotenv", r"^\.env$"),
    ("dotenv_variant", r"^\.env\..+$"),
    ("env_file", r"^.+\.env$"),
    ("secrets_file", r"^secrets?\.(?:json|ya?ml|toml|txt|env)$"),
    ("credentials_file", r"^credentials\.json$"),
    ("decrypted_bundle", r"\.decrypted$"),
];

/// File names that look like env files but never hold live values.
const ALLOWED_FILENAMES: &[&str] = &[
    ".env.enc",
    ".env.example",
    ".env.sample",
    ".env.template",
    ".env.dist",
];

/// Upper-cased name fragments that mark a variable as secret.
const SECRET_NAME_KEYWORDS: &[&str] = &[
    "PASSWORD",
    "PASSWD",
    "SECRET",
    "TOKEN",
    "API_KEY",
    "APIKEY",
    "PRIVATE_KEY",
    "ACCESS_KEY",
    "CREDENTIAL",
];

/// Names ending like this refer to a secret rather than holding one
/// (`ADMIN_PASSWORD_ENV`, `TOKEN_URL`).
const REFERENCE_SUFFIXES: &[&str] = &[
    "_URL", "_URI", "_PATH", "_FILE", "_DIR", "_ENV", "_NAME", "_ID", "_TYPE",
];

const PLACEHOLDER_VALUES: &[&str] = &[
    "changeme",
    "change-me",
    "change_me",
    "redacted",
    "placeholder",
    "null",
    "none",
    "true",
    "false",
];

static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(?:export\s+)?["']?([A-Za-z_][A-Za-z0-9_.\-]*)["']?\s*[:=]\s*(.*)$"#)
        .expect("assignment regex")
});

/// A secret assignment found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// 1-based line number.
    pub line: usize,
    pub name: String,
}

/// Compiled file-name and assignment patterns.
pub struct PatternSet {
    filename_patterns: Vec<(String, Regex)>,
    keyword_matcher: AhoCorasick,
    extra_names: BTreeSet<String>,
}

impl PatternSet {
    /// Default patterns plus user-supplied extras.
    pub fn new(extra_filename_patterns: &[String], extra_secret_names: &[String]) -> Result<Self> {
        let mut filename_patterns = DEFAULT_FILENAME_PATTERNS
            .iter()
            .map(|(label, pattern)| compile(pattern).map(|re| (label.to_string(), re)))
            .collect::<Result<Vec<_>>>()?;
        for pattern in extra_filename_patterns {
            filename_patterns.push((format!("custom:{pattern}"), compile(pattern)?));
        }

        let extra_names: BTreeSet<String> = extra_secret_names.iter().cloned().collect();
        let keywords: Vec<&str> = SECRET_NAME_KEYWORDS
            .iter()
            .copied()
            .chain(extra_names.iter().map(String::as_str))
            .collect();
        let keyword_matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&keywords)
            .map_err(|e| AuditError::InvalidPattern {
                pattern: keywords.join(","),
                reason: e.to_string(),
            })?;

        Ok(Self {
            filename_patterns,
            keyword_matcher,
            extra_names,
        })
    }

    /// Label of the first file-name pattern matching `file_name`.
    pub fn match_filename(&self, file_name: &str) -> Option<&str> {
        if ALLOWED_FILENAMES.contains(&file_name) {
            return None;
        }
        self.filename_patterns
            .iter()
            .find(|(_, re)| re.is_match(file_name))
            .map(|(label, _)| label.as_str())
    }

    /// Whether a variable name denotes a secret value.
    pub fn is_secret_name(&self, name: &str) -> bool {
        if self.extra_names.contains(name) {
            return true;
        }
        let upper = name.to_ascii_uppercase().replace(|c: char| c == '.' || c == '-', "_");
        SECRET_NAME_KEYWORDS.iter().any(|k| upper.contains(k))
            && !REFERENCE_SUFFIXES.iter().any(|s| upper.ends_with(s))
    }

    /// Secret assignments with a literal, non-placeholder value.
    pub fn scan_text(&self, text: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if !self.keyword_matcher.is_match(line) {
                continue;
            }
            let Some(caps) = ASSIGNMENT.captures(line) else {
                continue;
            };
            let name = &caps[1];
            let rest = &caps[2];
            // `==`, `:=` and friends are comparisons or code, not assignments.
            if rest.starts_with('=') || !self.is_secret_name(name) {
                continue;
            }
            match literal_value(rest) {
                Some(value) if !is_placeholder(value) => findings.push(Finding {
                    line: idx + 1,
                    name: name.to_string(),
                }),
                _ => {}
            }
        }
        findings
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AuditError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// The literal on the right of an assignment, or `None` when it is an
/// expression (function call, interpolation, indexing).
fn literal_value(rest: &str) -> Option<&str> {
    let rest = rest.trim();
    let Some(first) = rest.chars().next() else {
        return Some("");
    };
    if first == '"' || first == '\'' {
        let inner = &rest[1..];
        return inner.find(first).map(|end| &inner[..end]);
    }

    let value = rest
        .split(" #")
        .next()
        .unwrap_or(rest)
        .trim_end_matches(|c: char| c == ',' || c == ';')
        .trim();
    if value
        .chars()
        .any(|c| c.is_whitespace() || "()[]{}".contains(c))
    {
        return None;
    }
    Some(value)
}

fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty()
        || v.starts_with('$')
        || (v.starts_with('<') && v.ends_with('>'))
        || v.chars().all(|c| c == '*')
        || PLACEHOLDER_VALUES.contains(&v.to_ascii_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> PatternSet {
        PatternSet::new(&[], &[]).unwrap()
    }

    #[test]
    fn test_filename_patterns() {
        let p = defaults();
        assert_eq!(p.match_filename(".env"), Some("dotenv"));
        assert_eq!(p.match_filename(".env.production"), Some("dotenv_variant"));
        assert_eq!(p.match_filename("prod.env"), Some("env_file"));
        assert_eq!(p.match_filename("secrets.yaml"), Some("secrets_file"));
        assert_eq!(p.match_filename("credentials.json"), Some("credentials_file"));

        assert_eq!(p.match_filename(".env.enc"), None);
        assert_eq!(p.match_filename(".env.example"), None);
        assert_eq!(p.match_filename(".encryption-salt"), None);
        assert_eq!(p.match_filename("environment.rs"), None);
    }

    #[test]
    fn test_custom_filename_pattern() {
        let p = PatternSet::new(&[r"^vault-dump\.txt$".to_string()], &[]).unwrap();
        assert!(p.match_filename("vault-dump.txt").is_some());
        assert!(PatternSet::new(&["(".to_string()], &[]).is_err());
    }

    #[test]
    fn test_secret_names() {
        let p = defaults();
        assert!(p.is_secret_name("DB_PASSWORD"));
        assert!(p.is_secret_name("client_secret"));
        assert!(p.is_secret_name("spring.datasource.password"));
        assert!(!p.is_secret_name("ADMIN_PASSWORD_ENV"));
        assert!(!p.is_secret_name("TOKEN_URL"));
        assert!(!p.is_secret_name("LOG_LEVEL"));
    }

    #[test]
    fn test_scan_text_assignments() {
        let text = "\
# comment
LOG_LEVEL=debug
DB_PASSWORD=abc123
export API_KEY=\"xyz789\"
  jwt_secret: 'k3y'
\"CLIENT_SECRET\": \"s3cr3t\",
";
        let findings = defaults().scan_text(text);
        let got: Vec<_> = findings.iter().map(|f| (f.line, f.name.as_str())).collect();
        assert_eq!(
            got,
            vec![
                (3, "DB_PASSWORD"),
                (4, "API_KEY"),
                (5, "jwt_secret"),
                (6, "CLIENT_SECRET"),
            ]
        );
    }

    #[test]
    fn test_placeholders_and_code_are_not_findings() {
        let text = "\
DB_PASSWORD=
DB_PASSWORD=${DB_PASSWORD}
API_KEY=<your-api-key>
JWT_SECRET=changeme
CLIENT_SECRET=REDACTED
GITHUB_TOKEN=***
password = os.environ[\"DB_PASSWORD\"]
if token == expected:
let secret = read_secret(path);
";
        assert!(defaults().scan_text(text).is_empty());
    }

    #[test]
    fn test_extra_secret_names() {
        let p = PatternSet::new(&[], &["DSN".to_string()]).unwrap();
        let findings = p.scan_text("DSN=postgres://u:p@db/app\n");
        assert_eq!(findings, vec![Finding { line: 1, name: "DSN".into() }]);
    }
}
