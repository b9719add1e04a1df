//! CLI output formatting utilities.
//!
//! Status lines, plan change markers and duration formatting. Color is only
//! applied when the target stream supports it.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{AnsiColors, OwoColorize, Stream};

use provis_lib::engine::Change;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

/// Kinds of one-line status messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
  Success,
  Error,
  Warning,
  Info,
}

impl Status {
  fn symbol(self) -> &'static str {
    match self {
      Status::Success => symbols::SUCCESS,
      Status::Error => symbols::ERROR,
      Status::Warning => symbols::WARNING,
      Status::Info => symbols::INFO,
    }
  }

  fn color(self) -> AnsiColors {
    match self {
      Status::Success => AnsiColors::Green,
      Status::Error => AnsiColors::Red,
      Status::Warning => AnsiColors::Yellow,
      Status::Info => AnsiColors::Blue,
    }
  }

  /// Problems go to stderr with the message colored too.
  fn stream(self) -> Stream {
    match self {
      Status::Error | Status::Warning => Stream::Stderr,
      Status::Success | Status::Info => Stream::Stdout,
    }
  }

  fn print(self, message: &str) {
    let stream = self.stream();
    let symbol_text = self.symbol();
    let symbol = symbol_text.if_supports_color(stream, |s| s.color(self.color()));
    match stream {
      Stream::Stderr => eprintln!(
        "{} {}",
        symbol,
        message.if_supports_color(stream, |s| s.color(self.color()))
      ),
      _ => println!("{} {}", symbol, message),
    }
  }
}

/// Marker printed in front of a node in a plan.
pub fn change_marker(change: Change) -> String {
  let (marker, color) = match change {
    Change::Create => ("+", AnsiColors::Green),
    Change::Update => ("~", AnsiColors::Yellow),
    Change::Replace => ("-/+", AnsiColors::Yellow),
    Change::Delete => ("-", AnsiColors::Red),
    Change::Unchanged => return " ".to_string(),
  };
  marker
    .if_supports_color(Stream::Stdout, |s| s.color(color))
    .to_string()
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  match secs {
    60.. => format!("{}m {}s", secs / 60, secs % 60),
    1.. => format!("{}.{:02}s", secs, duration.subsec_millis() / 10),
    0 => format!("{}ms", duration.subsec_millis()),
  }
}

pub fn print_success(message: &str) {
  Status::Success.print(message);
}

pub fn print_error(message: &str) {
  Status::Error.print(message);
}

pub fn print_warning(message: &str) {
  Status::Warning.print(message);
}

pub fn print_info(message: &str) {
  Status::Info.print(message);
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
