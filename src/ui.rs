//! The operator-facing prompts `cli_session` handlers use to refine the
//! option store before anything is written to disk. This is the minimal
//! slice of "the interactive terminal UI" this crate owns directly - picking
//! a disk, confirming a destructive wipe, entering a shrink size - not a
//! general-purpose TUI framework; a richer front-end is an out-of-scope
//! collaborator per the overview.

use std::io::{self, Write as _};

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

/// A single selectable line in a disk/option picker: a short token the
/// operator types back, plus a human description shown next to it.
pub struct UiOption {
    pub token: String,
    pub description: String,
}

impl UiOption {
    pub fn new(token: impl Into<String>, description: impl Into<String>) -> Self {
        UiOption {
            token: token.into(),
            description: description.into(),
        }
    }
}

fn terminal_width() -> usize {
    termsize::get().map(|s| s.cols as usize).unwrap_or(80)
}

fn rule() {
    eprintln!("{}", "-".repeat(terminal_width().min(72)).dimmed());
}

fn read_line(prompt: &str) -> Result<String> {
    eprint!("{} ", prompt.bold());
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin().read_line(&mut line).context("failed to read from the terminal")?;
    Ok(line.trim().to_owned())
}

/// Present a numbered list of options and read back the chosen token.
/// Re-prompts on an unrecognized entry rather than failing the whole run -
/// a typo at the keyboard is not a fatal condition the way a missing option
/// or bad config value is.
pub fn prompt_choice(title: &str, options: &[UiOption]) -> Result<String> {
    rule();
    eprintln!("{}", title.cyan().bold());
    for opt in options {
        eprintln!("  {} - {}", opt.token.green(), opt.description);
    }
    loop {
        let answer = read_line("> ")?;
        if options.iter().any(|o| o.token == answer) {
            return Ok(answer);
        }
        eprintln!("{}", format!("'{}' is not one of the choices above.", answer).red());
    }
}

/// A yes/no prompt; accepts `y`/`yes`/`n`/`no` case-insensitively.
pub fn prompt_yes_no(question: &str, default: bool) -> Result<bool> {
    let hint = if default { "Y/n" } else { "y/N" };
    loop {
        let answer = read_line(&format!("{} [{}]", question, hint))?;
        if answer.is_empty() {
            return Ok(default);
        }
        match answer.to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => eprintln!("{}", "please answer 'y' or 'n'.".red()),
        }
    }
}

/// Prompt for an integer value constrained to `[min, max]` (inclusive),
/// re-prompting until the operator enters something in range.
pub fn prompt_u64_in_range(question: &str, min: u64, max: u64) -> Result<u64> {
    loop {
        let answer = read_line(&format!("{} [{}-{}]", question, min, max))?;
        match answer.parse::<u64>() {
            Ok(v) if v >= min && v <= max => return Ok(v),
            Ok(_) => eprintln!("{}", format!("value must be between {} and {}.", min, max).red()),
            Err(_) => eprintln!("{}", "please enter a whole number.".red()),
        }
    }
}

/// A phrase-gated confirmation for an irreversible action: the operator must
/// type the exact phrase back, not just "y".
pub fn confirm_phrase(question: &str, phrase: &str) -> Result<bool> {
    eprintln!("{}", question.yellow().bold());
    let answer = read_line(&format!("type '{}' to continue, anything else to cancel:", phrase))?;
    Ok(answer == phrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_option_carries_token_and_description() {
        let opt = UiOption::new("sda", "500 GiB disk");
        assert_eq!(opt.token, "sda");
        assert_eq!(opt.description, "500 GiB disk");
    }
}
