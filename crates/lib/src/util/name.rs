//! Bounded resource names.
//!
//! Cloud APIs cap identifier length, so names derived from user labels are
//! truncated and suffixed with a slice of the label's fingerprint. There is no
//! registry of issued names: two labels whose truncated prefix and 3-character
//! suffix both collide produce the same name, and the engine reports the
//! duplicate.

use crate::util::hash::fingerprint_strings;

/// Shorten `label` to at most `max_len` characters.
///
/// - labels that fit are returned unchanged
/// - for `max_len <= 4` the first `max_len` fingerprint characters are returned
/// - otherwise `label[..max_len - 4] + "-" + fingerprint[..3]`
///
/// The result always has exactly `min(len(label), max_len)` characters.
pub fn shorten_name(label: &str, max_len: usize) -> String {
  let len = label.chars().count();
  if len <= max_len {
    return label.to_string();
  }

  let hash = fingerprint_strings([label]);
  if max_len <= 4 {
    return hash.prefix(max_len).to_string();
  }

  let head: String = label.chars().take(max_len - 4).collect();
  format!("{}-{}", head, hash.prefix(3))
}
