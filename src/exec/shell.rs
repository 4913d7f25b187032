// ABOUTME: POSIX shell quoting and command composition.
// ABOUTME: Every path interpolated into a command goes through `quote`.

use super::RunOptions;

/// Single-quote `s` for `sh`, escaping embedded single quotes.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Apply the working directory and privilege options to a command for a
/// host shell (local or SSH).
pub(crate) fn compose(command: &str, options: &RunOptions) -> String {
    let command = match &options.cwd {
        Some(cwd) => format!("cd {} && {}", quote(cwd), command),
        None => command.to_string(),
    };

    if options.sudo {
        format!("sudo -n sh -c {}", quote(&command))
    } else {
        command
    }
}
