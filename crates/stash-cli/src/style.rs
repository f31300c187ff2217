use std::env;

use color_eyre::owo_colors::OwoColorize;
use stash_core::CommandStatus;

pub struct Style {
    enabled: bool,
}

impl Style {
    pub fn new(force_no_color: bool, is_tty: bool) -> Self {
        let env_no_color = env::var_os("NO_COLOR").is_some();
        Self {
            enabled: !(force_no_color || env_no_color) && is_tty,
        }
    }

    pub fn status(&self, status: CommandStatus, text: &str) -> String {
        let symbol = match status {
            CommandStatus::Ok => "✔",
            CommandStatus::UserError => "✗",
            CommandStatus::Failure => "✖",
        };
        let line = format!("{symbol} {text}");
        if !self.enabled {
            return line;
        }
        match status {
            CommandStatus::Ok => line.green().bold().to_string(),
            CommandStatus::UserError => line.yellow().bold().to_string(),
            CommandStatus::Failure => line.red().bold().to_string(),
        }
    }

    pub fn info(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }
        text.cyan().to_string()
    }
}
