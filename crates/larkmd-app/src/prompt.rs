//! Permission grant policies for the CLI.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::ValueEnum;
use larkmd_core::GrantPolicy;
use tracing::warn;

/// How new permission requests are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GrantMode {
    /// Ask on the terminal.
    Prompt,
    /// Grant every request.
    Allow,
    /// Deny every request.
    Deny,
}

impl GrantMode {
    /// Builds the matching [`GrantPolicy`].
    pub fn policy(self) -> GrantPolicy {
        match self {
            GrantMode::Prompt => terminal_prompt(),
            GrantMode::Allow => GrantPolicy::Allow,
            GrantMode::Deny => GrantPolicy::Deny,
        }
    }
}

/// Asks whether `origins` may be granted. Only `y` or `yes` grants.
pub fn confirm_origins<R: BufRead, W: Write>(
    origins: &[String],
    input: &mut R,
    output: &mut W,
) -> io::Result<bool> {
    writeln!(output, "larkmd requests access to:")?;
    for origin in origins {
        writeln!(output, "  {}", origin)?;
    }
    write!(output, "Grant access? [y/N] ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// Policy that asks on stdin, writing the question to stderr.
pub fn terminal_prompt() -> GrantPolicy {
    GrantPolicy::Prompt(Arc::new(|origins: &[String]| {
        let stdin = io::stdin();
        confirm_origins(origins, &mut stdin.lock(), &mut io::stderr()).unwrap_or_else(|e| {
            warn!("Permission prompt failed, denying: {}", e);
            false
        })
    }))
}
