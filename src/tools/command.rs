//! Running external tools.

use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};

/// Runs `program` with `args`, failing with `MutationFailure` on a non-zero exit.
pub fn run_tool(program: &str, args: &[&str]) -> Result<()> {
    let rendered = command_line(program, args);
    debug!("    {}", rendered);

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::mutation(&rendered, format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = match stderr.trim() {
            "" => output.status.to_string(),
            message => message.to_string(),
        };
        return Err(Error::mutation(rendered, reason));
    }

    Ok(())
}

/// Renders a command line the way a user would type it.
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                format!("\"{arg}\"")
            } else {
                arg.to_string()
            }
        }))
        .collect::<Vec<_>>()
        .join(" ")
}
