use anyhow::Result;

use provis_lib::util::name::shorten_name;

pub fn cmd_name(label: &str, max_len: usize) -> Result<()> {
  println!("{}", shorten_name(label, max_len));
  Ok(())
}
