//! The secrets bundle and its line-oriented text form.

use envseal_core::{env, SecretString};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{Result, SecretError};

/// Every credential a set of services needs at startup, keyed by variable name.
///
/// Keys are unique. The canonical text form is one `KEY=value` line per entry
/// in key order, which is what gets encrypted.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretsBundle {
    entries: BTreeMap<String, SecretString>,
}

impl SecretsBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bundle from name/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut bundle = Self::new();
        for (i, (k, v)) in pairs.into_iter().enumerate() {
            bundle.insert_at(i + 1, k.into(), SecretString::new(v))?;
        }
        Ok(bundle)
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: SecretString) -> Result<()> {
        let key = key.into();
        validate_entry(0, &key, &value)?;
        self.entries.insert(key, value);
        Ok(())
    }

    /// Insert a new entry, rejecting duplicates. `line` is used for error reporting.
    fn insert_at(&mut self, line: usize, key: String, value: SecretString) -> Result<()> {
        validate_entry(line, &key, &value)?;
        if self.entries.contains_key(&key) {
            return Err(SecretError::invalid_bundle(line, format!("duplicate key {key}")));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecretString)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Required keys absent from this bundle, in the order given.
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|k| !self.entries.contains_key(k.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Canonical `KEY=value` serialization, zeroed when dropped.
    pub fn to_lines(&self) -> Zeroizing<String> {
        let capacity = self
            .entries
            .iter()
            .map(|(k, v)| k.len() + v.len() + 2)
            .sum();
        let mut out = Zeroizing::new(String::with_capacity(capacity));
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value.expose_secret());
            out.push('\n');
        }
        out
    }

    /// Parse the canonical form produced by [`to_lines`](Self::to_lines).
    ///
    /// Every non-empty line must be `KEY=value` with a valid key; anything
    /// else is an error. Used on decrypted plaintext.
    pub fn parse_strict(text: &str) -> Result<Self> {
        let mut bundle = Self::new();
        for (i, line) in text.split('\n').enumerate() {
            let line_no = i + 1;
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| SecretError::invalid_bundle(line_no, "expected KEY=value"))?;
            bundle.insert_at(line_no, key.to_string(), SecretString::new(value))?;
        }
        Ok(bundle)
    }

    /// Parse a dotenv-style plaintext file.
    ///
    /// Accepts blank lines, `#` comments, an optional `export ` prefix and
    /// single- or double-quoted values. Unquoted values are taken verbatim
    /// after trimming, so `#` inside a password is preserved.
    pub fn parse_dotenv(text: &str) -> Result<Self> {
        let mut bundle = Self::new();
        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| SecretError::invalid_bundle(line_no, "expected KEY=value"))?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            bundle.insert_at(line_no, key.trim().to_string(), SecretString::new(value))?;
        }
        Ok(bundle)
    }

    /// Parse a flat JSON object of string values.
    pub fn parse_json(text: &str) -> Result<Self> {
        let map: HashMap<String, String> = serde_json::from_str(text)
            .map_err(|e| SecretError::invalid_bundle(e.line(), "expected a JSON object of strings"))?;
        Self::from_pairs(map)
    }

    /// Parse plaintext input, choosing JSON when it looks like an object.
    pub fn parse_input(text: &str) -> Result<Self> {
        if text.trim_start().starts_with('{') {
            Self::parse_json(text)
        } else {
            Self::parse_dotenv(text)
        }
    }
}

fn validate_entry(line: usize, key: &str, value: &SecretString) -> Result<()> {
    if !env::is_valid_name(key) {
        return Err(SecretError::invalid_bundle(
            line,
            format!("invalid key '{key}' (allowed: letters, digits, underscore)"),
        ));
    }
    let v = value.expose_secret();
    if v.contains('\n') || v.contains('\r') || v.contains('\0') {
        return Err(SecretError::invalid_bundle(
            line,
            format!("value of {key} contains a line break or NUL"),
        ));
    }
    Ok(())
}

// Key names only; values never appear.
impl fmt::Debug for SecretsBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsBundle")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SecretsBundle {
        SecretsBundle::from_pairs([("DB_PASSWORD", "abc123"), ("API_KEY", "xyz789")]).unwrap()
    }

    #[test]
    fn test_canonical_form_is_sorted() {
        assert_eq!(sample().to_lines().as_str(), "API_KEY=xyz789\nDB_PASSWORD=abc123\n");
    }

    #[test]
    fn test_parse_strict_inverse_of_to_lines() {
        let bundle = sample();
        let parsed = SecretsBundle::parse_strict(&bundle.to_lines()).unwrap();
        assert_eq!(parsed, bundle);
    }

    #[test]
    fn test_parse_strict_keeps_equals_in_value() {
        let parsed = SecretsBundle::parse_strict("TOKEN=a=b==\n").unwrap();
        assert_eq!(parsed.get("TOKEN").unwrap().expose_secret(), "a=b==");
    }

    #[test]
    fn test_parse_strict_rejects_garbage() {
        assert!(matches!(
            SecretsBundle::parse_strict("A=1\nnot a pair\n"),
            Err(SecretError::InvalidBundle { line: 2, .. })
        ));
        assert!(SecretsBundle::parse_strict("1BAD=x").is_err());
        assert!(SecretsBundle::parse_strict("A=1\nA=2").is_err());
    }

    #[test]
    fn test_parse_dotenv() {
        let text = "# database\nexport DB_PASSWORD=\"abc123\"\n\nAPI_KEY='xyz789'\nHASHED=pa#ss\n";
        let bundle = SecretsBundle::parse_dotenv(text).unwrap();
        assert_eq!(bundle.len(), 3);
        assert_eq!(bundle.get("DB_PASSWORD").unwrap().expose_secret(), "abc123");
        assert_eq!(bundle.get("API_KEY").unwrap().expose_secret(), "xyz789");
        assert_eq!(bundle.get("HASHED").unwrap().expose_secret(), "pa#ss");
    }

    #[test]
    fn test_parse_json_input() {
        let bundle =
            SecretsBundle::parse_input(r#"{"DB_PASSWORD":"abc123","API_KEY":"xyz789"}"#).unwrap();
        assert_eq!(bundle, sample());
        assert!(SecretsBundle::parse_input(r#"{"A": 1}"#).is_err());
    }

    #[test]
    fn test_rejects_multiline_values() {
        let mut bundle = SecretsBundle::new();
        let err = bundle
            .insert("PEM", SecretString::new("line1\nline2"))
            .unwrap_err();
        assert!(matches!(err, SecretError::InvalidBundle { .. }));
        assert!(!err.to_string().contains("line1"));
    }

    #[test]
    fn test_missing_keys() {
        let required = vec!["DB_PASSWORD".to_string(), "JWT_SECRET".to_string()];
        assert_eq!(sample().missing(&required), vec!["JWT_SECRET"]);
    }

    #[test]
    fn test_debug_lists_keys_only() {
        let rendered = format!("{:?}", sample());
        assert!(rendered.contains("DB_PASSWORD"));
        assert!(!rendered.contains("abc123"));
    }
}
