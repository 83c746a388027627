use std::path::Path;

use color_eyre::Result;
use colored::{ColoredString, Colorize};
use log::debug;

use crate::{model::Model, GenerationSettings};

/// What every command works with: a fully built model and the settings.
pub struct State {
    pub model: Model,
    pub settings: GenerationSettings,
}

impl State {
    pub fn load(model: &str, settings_path: Option<&Path>) -> Result<Self> {
        let model = if Path::new(model).exists() {
            debug!("Loading model from {}", model);
            Model::from_file(model)?
        } else {
            debug!("Loading built-in model {}", model);
            Model::builtin(model)?
        };

        let settings = match settings_path {
            Some(path) => {
                debug!("Loading generation settings from {}", path.display());
                GenerationSettings::from_file(path)?
            }
            None => GenerationSettings::default(),
        };

        Ok(State { model, settings })
    }
}

pub(crate) fn format_level(level: log::Level) -> ColoredString {
    match level {
        log::Level::Error => format!("{:<8}", "ERROR").red(),
        log::Level::Warn => format!("{:<8}", "WARNING").yellow(),
        log::Level::Info => format!("{:<8}", "INFO").into(),
        log::Level::Debug => format!("{:<8}", "DEBUG").bright_black(),
        log::Level::Trace => format!("{:<8}", "TRACE").into(),
    }
}

pub(crate) fn format_target(target: &str, level: log::Level) -> ColoredString {
    let split_targets = target.split("::").collect::<Vec<_>>();
    let start = split_targets.len().saturating_sub(2);
    let mut shortened_path = split_targets[start..].join("::");
    if level < log::Level::Debug && shortened_path.len() > 20 {
        shortened_path = format!("{}...", shortened_path.chars().take(17).collect::<String>());
    }
    format!("{:<20}", shortened_path).bright_blue()
}
