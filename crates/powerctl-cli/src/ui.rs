use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

// ---------------------------------------------------------------------------
// Colored message helpers
// ---------------------------------------------------------------------------

fn prefix() -> String {
    "[powerctl]".bold().cyan().to_string()
}

/// Print an informational message: [powerctl] message
pub fn info(msg: &str) {
    eprintln!("{} {}", prefix(), msg);
}

/// Print a success message in green.
pub fn success(msg: &str) {
    eprintln!("{} {}", prefix(), msg.green());
}

/// Print a warning message in yellow.
pub fn warn(msg: &str) {
    eprintln!("{} {}", prefix(), msg.yellow());
}

// ---------------------------------------------------------------------------
// Banner
// ---------------------------------------------------------------------------

/// Print a bold banner box; yellow for confirmations and problems.
pub fn banner(lines: &[&str], attention: bool) {
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    let rule = "=".repeat(width);
    let paint = |s: &str| {
        if attention {
            s.bold().yellow().to_string()
        } else {
            s.bold().green().to_string()
        }
    };

    eprintln!();
    eprintln!("{}", paint(&rule));
    for line in lines {
        let pad = width - line.len() - 4;
        eprintln!("{}", paint(&format!("  {}{}  ", line, " ".repeat(pad))));
    }
    eprintln!("{}", paint(&rule));
    eprintln!();
}

// ---------------------------------------------------------------------------
// Interactive prompts
// ---------------------------------------------------------------------------

/// Show an interactive confirmation prompt. Returns true if confirmed;
/// an interrupted or failed prompt counts as "no".
pub fn confirm(msg: &str) -> bool {
    inquire::Confirm::new(msg)
        .with_default(false)
        .prompt()
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Spinners
// ---------------------------------------------------------------------------

/// Create and start a spinner with the given message.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}
