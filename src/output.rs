//! Status line rendering for the terminal.
//!
//! Status text overwrites the previous line on a terminal; when output is
//! piped, every status goes on its own line.

use crate::config::StatusTarget;
use crate::defaults;
use owo_colors::OwoColorize;
use std::io::{self, IsTerminal, Write};

/// Coarse classification of a status line, used for highlighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Prediction,
    NoPrediction,
    Failure,
    Lifecycle,
}

pub fn classify_status(text: &str) -> StatusKind {
    if text.starts_with("Failed") || text.starts_with("Error") {
        StatusKind::Failure
    } else if text.starts_with("Prediction: ") {
        if text.contains(defaults::NO_PREDICTION_LABEL)
            || text.starts_with(&format!("Prediction: {},", defaults::NONE_LABEL))
        {
            StatusKind::NoPrediction
        } else {
            StatusKind::Prediction
        }
    } else {
        StatusKind::Lifecycle
    }
}

/// Apply terminal colours to a status line.
pub fn colorize_status(text: &str) -> String {
    match classify_status(text) {
        StatusKind::Prediction => text.green().to_string(),
        StatusKind::NoPrediction => text.dimmed().to_string(),
        StatusKind::Failure => text.red().to_string(),
        StatusKind::Lifecycle => text.cyan().to_string(),
    }
}

/// Clear the current terminal line.
fn clear_line(out: &mut impl Write) -> io::Result<()> {
    write!(out, "\r\x1b[2K")
}

fn write_status(out: &mut impl Write, text: &str, terminal: bool) -> io::Result<()> {
    if terminal {
        clear_line(out)?;
        write!(out, "{}", colorize_status(text))?;
    } else {
        writeln!(out, "{text}")?;
    }
    out.flush()
}

/// Show one status line on the configured target.
pub fn render_status(target: StatusTarget, text: &str) {
    let result = match target {
        StatusTarget::Stdout => {
            let terminal = io::stdout().is_terminal();
            write_status(&mut io::stdout().lock(), text, terminal)
        }
        StatusTarget::Stderr => {
            let terminal = io::stderr().is_terminal();
            write_status(&mut io::stderr().lock(), text, terminal)
        }
        StatusTarget::Log => {
            tracing::info!(target: "visionloop::status", "{text}");
            Ok(())
        }
    };
    if let Err(e) = result {
        tracing::debug!("failed to render status: {e}");
    }
}

/// End an overwritten status line so later output starts on a fresh line.
pub fn finish_status(target: StatusTarget) {
    let result = match target {
        StatusTarget::Stdout if io::stdout().is_terminal() => writeln!(io::stdout()),
        StatusTarget::Stderr if io::stderr().is_terminal() => writeln!(io::stderr()),
        _ => Ok(()),
    };
    if let Err(e) = result {
        tracing::debug!("failed to finish status line: {e}");
    }
}
