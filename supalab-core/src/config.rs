//! Line-oriented `key = value` configuration files.
//!
//! Values are stored either as booleans (`t`, `true`, `y`, `1` and their
//! negative counterparts, case-insensitive) or as raw text. Spaces inside
//! `{...}` blocks are replaced with [`SPACE_DELIM`] so that a later
//! whitespace split of a command line keeps the block in one piece; use
//! [`unescape_spaces`] to get the original text back.

use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Non-printable stand-in for a space inside a brace-delimited value.
pub const SPACE_DELIM: char = '\0';

/// File that is always read first.
pub const DEFAULT_CONFIG_FILE: &str = "default.cfg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Bool(bool),
    Text(String),
}

impl ConfigValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(s) => Some(s),
            ConfigValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::Text(_) => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Text(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Text(s)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

/// Configuration values in the order their keys were first seen.
///
/// Re-inserting an existing key replaces the value but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    entries: Vec<(String, ConfigValue)>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigValue::as_text)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ConfigValue::as_bool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No such file or directory: '{}'", .0.display())]
    NotFound(PathBuf),
    #[error("Is a directory: '{}'", .0.display())]
    IsADirectory(PathBuf),
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Skip,
    Entry(String, ConfigValue),
    Rejected(String),
}

/// What happened while loading a set of files.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub rejected: Vec<String>,
    pub errors: Vec<ConfigError>,
    pub loaded: Vec<PathBuf>,
}

fn entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\S*)\s*=\s*(.*)$").expect("valid config entry regex"))
}

fn brace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^}]*)\}").expect("valid brace regex"))
}

/// Replace spaces inside every `{...}` block with [`SPACE_DELIM`].
pub fn escape_brace_spaces(value: &str) -> String {
    brace_regex()
        .replace_all(value, |caps: &regex::Captures| {
            format!("{{{}}}", caps[1].replace(' ', &SPACE_DELIM.to_string()))
        })
        .into_owned()
}

/// Turn [`SPACE_DELIM`] back into spaces.
pub fn unescape_spaces(value: &str) -> String {
    value.replace(SPACE_DELIM, " ")
}

fn coerce(value: String) -> ConfigValue {
    match value.to_lowercase().as_str() {
        "t" | "true" | "y" | "1" => ConfigValue::Bool(true),
        "f" | "false" | "n" | "0" => ConfigValue::Bool(false),
        _ => ConfigValue::Text(value),
    }
}

pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return ParsedLine::Skip;
    }

    match entry_regex().captures(line) {
        Some(caps) => {
            let key = caps[1].to_string();
            let value = escape_brace_spaces(&caps[2]);
            ParsedLine::Entry(key, coerce(value))
        }
        None => ParsedLine::Rejected(line.to_string()),
    }
}

/// Parse the full text of one config file into `config`.
///
/// Returns the lines that did not look like `key = value`.
pub fn parse_str(text: &str, config: &mut ConfigMap) -> Vec<String> {
    let mut rejected = Vec::new();
    for line in text.lines() {
        match parse_line(line) {
            ParsedLine::Skip => {}
            ParsedLine::Entry(key, value) => config.insert(key, value),
            ParsedLine::Rejected(line) => rejected.push(line),
        }
    }
    rejected
}

pub fn load_file(path: &Path, config: &mut ConfigMap) -> Result<Vec<String>, ConfigError> {
    if path.is_dir() {
        return Err(ConfigError::IsADirectory(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    debug!("Read config file {}", path.display());
    Ok(parse_str(&text, config))
}

/// Load `files` (relative to `dir`) in order. A file that cannot be read is
/// recorded in the report and the remaining files are still loaded.
pub fn load_files<S: AsRef<str>>(dir: &Path, files: &[S], config: &mut ConfigMap) -> LoadReport {
    let mut report = LoadReport::default();
    for file in files {
        let path = dir.join(file.as_ref());
        match load_file(&path, config) {
            Ok(rejected) => {
                report.rejected.extend(rejected);
                report.loaded.push(path);
            }
            Err(e) => report.errors.push(e),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        assert_eq!(parse_line(""), ParsedLine::Skip);
        assert_eq!(parse_line("   "), ParsedLine::Skip);
        assert_eq!(parse_line("# url = nope"), ParsedLine::Skip);
        assert_eq!(parse_line("   # indented comment"), ParsedLine::Skip);
    }

    #[test]
    fn test_plain_entries() {
        assert_eq!(
            parse_line("url = http://127.0.0.1:54321"),
            ParsedLine::Entry("url".into(), "http://127.0.0.1:54321".into())
        );
        assert_eq!(
            parse_line("email=someone@example.com"),
            ParsedLine::Entry("email".into(), "someone@example.com".into())
        );
        assert_eq!(
            parse_line("password ="),
            ParsedLine::Entry("password".into(), "".into())
        );
    }

    #[test]
    fn test_boolean_coercion() {
        for truthy in ["t", "True", "Y", "1", "TRUE"] {
            assert_eq!(
                parse_line(&format!("verbose = {truthy}")),
                ParsedLine::Entry("verbose".into(), ConfigValue::Bool(true))
            );
        }
        for falsy in ["f", "False", "n", "0"] {
            assert_eq!(
                parse_line(&format!("verbose = {falsy}")),
                ParsedLine::Entry("verbose".into(), ConfigValue::Bool(false))
            );
        }
        assert_eq!(
            parse_line("verbose = yes"),
            ParsedLine::Entry("verbose".into(), "yes".into())
        );
    }

    #[test]
    fn test_spaces_inside_braces_are_escaped() {
        let parsed = parse_line(r#"payload = {"name": "Jane Doe"} tail here"#);
        assert_eq!(
            parsed,
            ParsedLine::Entry(
                "payload".into(),
                "{\"name\":\0\"Jane\0Doe\"} tail here".into()
            )
        );

        if let ParsedLine::Entry(_, ConfigValue::Text(v)) = parsed {
            assert_eq!(unescape_spaces(&v), r#"{"name": "Jane Doe"} tail here"#);
        }
    }

    #[test]
    fn test_rejected_line() {
        assert_eq!(
            parse_line("just some words"),
            ParsedLine::Rejected("just some words".into())
        );
    }

    #[test]
    fn test_later_values_override_in_place() {
        let mut config = ConfigMap::new();
        parse_str("url = a\napi_key = k\n", &mut config);
        parse_str("url = b\n", &mut config);
        let keys: Vec<&str> = config.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["url", "api_key"]);
        assert_eq!(config.get_text("url"), Some("b"));
    }

    #[test]
    fn test_load_files_reports_missing_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("default.cfg")).unwrap();
        writeln!(f, "# defaults\nurl = http://localhost:54321\nbogus line").unwrap();
        let mut f = std::fs::File::create(dir.path().join("local.cfg")).unwrap();
        writeln!(f, "suppress_header = y").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let mut config = ConfigMap::new();
        let report = load_files(
            dir.path(),
            &["default.cfg", "missing.cfg", "nested", "local.cfg"],
            &mut config,
        );

        assert_eq!(report.rejected, vec!["bogus line".to_string()]);
        assert_eq!(report.errors.len(), 2);
        assert!(matches!(report.errors[0], ConfigError::NotFound(_)));
        assert!(matches!(report.errors[1], ConfigError::IsADirectory(_)));
        assert_eq!(report.loaded.len(), 2);
        assert_eq!(config.get_text("url"), Some("http://localhost:54321"));
        assert_eq!(config.get_bool("suppress_header"), Some(true));
    }
}
