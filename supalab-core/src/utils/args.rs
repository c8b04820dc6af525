//! Splitting and rewriting of REPL input lines.

use crate::config::{ConfigMap, ConfigValue};
use crate::utils::sensitive_data::{is_hidden_key, mask_all};
use regex::Regex;
use std::sync::OnceLock;

fn dot_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.\w+").expect("valid dot reference regex"))
}

/// Replace `.key` references with values from the config.
///
/// Unknown keys are left as typed. Hidden keys (the password) are replaced
/// by asterisks of the same length so that `print .password` does not leak
/// it.
pub fn substitute_dot_references(line: &str, config: &ConfigMap) -> String {
    dot_reference_regex()
        .replace_all(line, |caps: &regex::Captures| {
            let whole = &caps[0];
            let key = &whole[1..];
            match config.get(key) {
                Some(value) if is_hidden_key(key) => mask_all(&value.to_string()),
                Some(ConfigValue::Bool(b)) => b.to_string(),
                Some(ConfigValue::Text(s)) => s.clone(),
                None => whole.to_string(),
            }
        })
        .into_owned()
}

/// Split a line at its first whitespace character into command and
/// arguments. Without whitespace the whole line is the command.
pub fn split_command(line: &str) -> (&str, Option<&str>) {
    match line.char_indices().find(|(_, c)| c.is_whitespace()) {
        Some((i, c)) => (&line[..i], Some(&line[i + c.len_utf8()..])),
        None => (line, None),
    }
}

/// Split off the leading run of non-whitespace; the remainder keeps its
/// leading whitespace.
pub fn split_subcommand(args: &str) -> (&str, &str) {
    let end = args
        .char_indices()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(args.len());
    (&args[..end], &args[end..])
}

/// Split arguments on whitespace, grouping `"double"` and `'single'`
/// quoted runs into one argument with the quotes removed. A `{...}` block is
/// always kept whole, quotes and whitespace included, so JSON payloads
/// survive.
pub fn parse_args(args: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in args.chars() {
        if depth > 0 {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            current.push(c);
            continue;
        }
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '{' => {
                depth = 1;
                current.push(c);
                in_token = true;
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    result.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        result.push(current);
    }
    result
}
