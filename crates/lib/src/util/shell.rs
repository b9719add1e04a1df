//! Quoting helpers for POSIX shells and PowerShell.

/// Quote `s` as a single POSIX shell word.
///
/// Words made only of safe characters are returned bare so generated command
/// lines stay readable.
pub fn quote(s: &str) -> String {
  if s.is_empty() {
    "''".to_string()
  } else if s.chars().all(|c| c.is_ascii_alphanumeric() || "-_=./:@+,%".contains(c)) {
    s.to_string()
  } else {
    format!("'{}'", s.replace('\'', "'\"'\"'"))
  }
}

/// Render `s` inside double quotes for a POSIX assignment (`NAME="value"`).
pub fn double_quote(s: &str) -> String {
  let mut out = String::with_capacity(s.len() + 2);
  out.push('"');
  for c in s.chars() {
    if matches!(c, '"' | '\\' | '$' | '`') {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('"');
  out
}

/// Quote `s` as a PowerShell single-quoted string literal.
pub fn powershell_quote(s: &str) -> String {
  format!("'{}'", s.replace('\'', "''"))
}

/// Render `s` inside PowerShell double quotes, escaping with backticks.
pub fn powershell_double_quote(s: &str) -> String {
  let mut out = String::with_capacity(s.len() + 2);
  out.push('"');
  for c in s.chars() {
    if matches!(c, '"' | '`' | '$') {
      out.push('`');
    }
    out.push(c);
  }
  out.push('"');
  out
}

/// Whether `name` is usable as an environment variable name in generated scripts.
pub fn is_env_name(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quote_leaves_plain_words_bare() {
    assert_eq!(quote("/tmp/compose-abc/compose.yaml"), "/tmp/compose-abc/compose.yaml");
    assert_eq!(quote("user@host:22"), "user@host:22");
  }

  #[test]
  fn quote_wraps_specials() {
    assert_eq!(quote(""), "''");
    assert_eq!(quote("a b"), "'a b'");
    assert_eq!(quote("it's"), "'it'\"'\"'s'");
    assert_eq!(quote("$(reboot)"), "'$(reboot)'");
  }

  #[test]
  fn double_quote_escapes_expansions() {
    assert_eq!(double_quote("1"), "\"1\"");
    assert_eq!(double_quote("a\"b$c`d\\"), "\"a\\\"b\\$c\\`d\\\\\"");
  }

  #[test]
  fn powershell_quoting() {
    assert_eq!(powershell_quote("C:\\it's"), "'C:\\it''s'");
    assert_eq!(powershell_double_quote("$x\"y"), "\"`$x`\"y\"");
  }

  #[test]
  fn env_names() {
    assert!(is_env_name("DEBIAN_FRONTEND"));
    assert!(is_env_name("_x1"));
    assert!(!is_env_name(""));
    assert!(!is_env_name("1X"));
    assert!(!is_env_name("A-B"));
    assert!(!is_env_name("A B"));
  }
}
