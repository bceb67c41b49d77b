//! Terminal output for keel commands.
//!
//! Status lines carry a colored marker; color is only emitted when the
//! stream supports it. `-o json` output is pretty-printed JSON on stdout.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

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

pub const ARROW: &str = "→";

/// The kind of a status line, which picks its marker, color and stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Success,
  Failure,
  Warning,
  Info,
}

impl Status {
  fn marker(self) -> &'static str {
    match self {
      Status::Success => "✓",
      Status::Failure => "✗",
      Status::Warning => "⚠",
      Status::Info => "•",
    }
  }

  /// Warnings go to stderr, everything else to stdout.
  fn stream(self) -> Stream {
    match self {
      Status::Warning => Stream::Stderr,
      _ => Stream::Stdout,
    }
  }

  pub fn print(self, message: &str) {
    let stream = self.stream();
    let marker = self.marker();
    let line = match self {
      Status::Success => format!("{} {}", marker.if_supports_color(stream, |s| s.green()), message),
      Status::Info => format!("{} {}", marker.if_supports_color(stream, |s| s.blue()), message),
      Status::Failure => format!(
        "{} {}",
        marker.if_supports_color(stream, |s| s.red()),
        message.if_supports_color(stream, |s| s.red())
      ),
      Status::Warning => format!(
        "{} {}",
        marker.if_supports_color(stream, |s| s.yellow()),
        message.if_supports_color(stream, |s| s.yellow())
      ),
    };
    match stream {
      Stream::Stderr => eprintln!("{}", line),
      _ => println!("{}", line),
    }
  }
}

/// An indented `label: value` line.
pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// `850ms`, `1.50s`, `1m 5s`.
pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  match secs {
    0 => format!("{}ms", duration.subsec_millis()),
    1..60 => format!("{}.{:02}s", secs, duration.subsec_millis() / 10),
    _ => format!("{}m {}s", secs / 60, secs % 60),
  }
}

/// `1 file`, `2 files`.
pub fn count(n: usize, noun: &str) -> String {
  if n == 1 {
    format!("{} {}", n, noun)
  } else {
    format!("{} {}s", n, noun)
  }
}
