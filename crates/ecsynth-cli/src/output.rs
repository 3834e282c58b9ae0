//! Output helpers for CLI commands.
//!
//! Command results go to stdout; logs stay on stderr.

use std::io::Write;
use std::path::Path;

use anyhow::Context;

/// Width of the rule under report headings.
const RULE_WIDTH: usize = 35;

/// Writes `text` to stdout, adding a trailing newline if missing.
///
/// # Errors
///
/// Returns an error if stdout is closed.
pub fn emit(text: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

/// Writes `text` to `path`, or to stdout without a path.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn emit_to(path: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = text.len(), "wrote template");
            Ok(())
        }
        None => emit(text),
    }
}

/// A heading followed by a rule of the same style on the next line.
#[must_use]
pub fn heading(title: &str) -> String {
    format!("{title}\n{}\n", "\u{2550}".repeat(RULE_WIDTH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_is_underlined() {
        let text = heading("Plan");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Plan"));
        assert_eq!(lines.next().map(|l| l.chars().count()), Some(RULE_WIDTH));
    }

    #[test]
    fn emit_to_file_writes_contents() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("template.json");
        emit_to(Some(&path), "{}").expect("write");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "{}");
    }
}
