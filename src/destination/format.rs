// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Code formatting of rendered destination files.
//!
//! Structured destinations pass their final text through a
//! [`CodeFormatter`] before it is written. The default [`PlainFormatter`]
//! only guarantees a trailing newline, while [`CommandFormatter`] pipes the
//! text through an external formatter configured by the workspace.

use std::{
    ffi::OsString,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::debug;

/// Formatter applied to final destination text.
pub trait CodeFormatter: Send + Sync {
    /// Format text that will be written to path.
    ///
    /// # Errors
    ///
    /// - Return [`FormatError`] if text cannot be formatted.
    fn format(&self, path: &Path, text: String) -> Result<String>;
}

/// Ensure text ends with exactly one newline.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainFormatter;

impl CodeFormatter for PlainFormatter {
    fn format(&self, _: &Path, text: String) -> Result<String> {
        let mut text = text.trim_end_matches('\n').to_string();
        text.push('\n');
        Ok(text)
    }
}

/// Pipe text through external command.
///
/// Destination path is passed as the last argument so the command can pick
/// its parser, e.g. `prettier --stdin-filepath <path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFormatter {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandFormatter {
    /// Construct formatter from command line, returning `None` if empty.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.into(),
            args: args.iter().map(OsString::from).collect(),
        })
    }
}

impl CodeFormatter for CommandFormatter {
    fn format(&self, path: &Path, text: String) -> Result<String> {
        let fail = |message: String| FormatError {
            path: path.to_path_buf(),
            message,
        };

        debug!("format {:?} with {:?}", path.display(), self.program);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| fail(err.to_string()))?;

        // INVARIANT: stdin is dropped after writing so that the command sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|err| fail(err.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| fail(err.to_string()))?;
        if !output.status.success() {
            return Err(fail(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        String::from_utf8(output.stdout).map_err(|err| fail(err.to_string()))
    }
}

/// Formatter failure.
#[derive(Debug, thiserror::Error)]
#[error("failed to format {:?}: {message}", path.display())]
pub struct FormatError {
    pub path: PathBuf,
    pub message: String,
}

/// Friendly result alias :3
pub type Result<T, E = FormatError> = std::result::Result<T, E>;
