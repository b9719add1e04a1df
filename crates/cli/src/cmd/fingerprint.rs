//! Implementation of the `provis fingerprint` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use provis_lib::util::hash::{fingerprint_file, fingerprint_reader, fingerprint_strings};

/// Print fingerprints.
///
/// With `--string` values, prints one fingerprint of their concatenation.
/// Otherwise prints `<fingerprint>  <path>` per file, or the fingerprint of
/// stdin when no files are given.
pub fn cmd_fingerprint(files: &[PathBuf], strings: &[String]) -> Result<()> {
  if !strings.is_empty() {
    println!("{}", fingerprint_strings(strings));
    return Ok(());
  }

  if files.is_empty() {
    let fp = fingerprint_reader(std::io::stdin().lock()).context("Failed to read stdin")?;
    println!("{}", fp);
    return Ok(());
  }

  for file in files {
    let fp = fingerprint_file(file).with_context(|| format!("Failed to read {}", file.display()))?;
    println!("{}  {}", fp, file.display());
  }
  Ok(())
}
