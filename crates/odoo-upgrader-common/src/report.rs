//! Human-facing progress lines, printed to stderr next to the tracing output.

use color_eyre::owo_colors::OwoColorize;

pub const WIDTH: usize = 4;

pub fn banner(msg: &str) {
    eprintln!(
        "\n{:<WIDTH$}{stage}  {msg}",
        "",
        stage = " OdooUpgrader ".bright_white().bold().on_magenta(),
    );
}

pub fn step(msg: &str) {
    eprintln!("{} {}", "•".bright_blue().bold(), msg.bright_blue());
}

pub fn success(msg: &str) {
    eprintln!("{} {}", "✔".bright_green().bold(), msg.green());
}

pub fn warning(msg: &str) {
    eprintln!("{} {}", "⚠️".bright_yellow(), msg.yellow());
}

pub fn failure(msg: &str) {
    eprintln!("{} {}", "❌".bright_red(), msg.bold().bright_red());
}

pub fn detail(msg: &str) {
    eprintln!("{}", msg.dimmed());
}
