use std::path::PathBuf;

use chrono::{Datelike, Local, Timelike};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use colored::Colorize;
use log::{debug, LevelFilter};
use state::{format_level, format_target, State};

pub mod generate;
pub mod inspect;
pub mod state;

#[derive(Parser, Debug)]
#[command(name = "feynexpr", version, about)]
#[command(next_line_help = true)]
pub struct Cli {
    /// Path to the generation settings file
    #[arg(short = 's', long)]
    pub settings: Option<PathBuf>,

    /// Model file, or the name of a built-in model (phi3, ght)
    #[arg(short = 'm', long, default_value = "ght")]
    pub model: String,

    /// Maximum level of the messages shown
    #[arg(short = 'l', long, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,

    #[arg(long, value_enum, default_value_t = LogFormat::Short)]
    pub log_format: LogFormat,

    /// Also write the log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the expression of every diagram in a record file
    Generate(generate::Generate),
    /// List the content of a model
    InspectModel(inspect::InspectModel),
}

#[repr(usize)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, ValueEnum)]
pub enum LogFormat {
    Long,
    Short,
    Min,
    None,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        setup_log(self.log_level, self.log_format, self.log_file.as_ref())?;
        debug!("Loading model {}", self.model);
        let state = State::load(&self.model, self.settings.as_deref())?;

        match &self.command {
            Commands::Generate(generate) => generate.run(&state),
            Commands::InspectModel(inspect) => inspect.run(&state),
        }
    }
}

pub(crate) fn setup_log(
    level: LevelFilter,
    format: LogFormat,
    log_file: Option<&PathBuf>,
) -> Result<()> {
    let mut dispatch = fern::Dispatch::new()
        .level(level)
        .format(move |out, message, record| {
            let now = Local::now();
            match format {
                LogFormat::Long => out.finish(format_args!(
                    "[{}] @{} {}: {}",
                    format!(
                        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
                        now.year(),
                        now.month(),
                        now.day(),
                        now.hour(),
                        now.minute(),
                        now.second(),
                        now.timestamp_subsec_millis()
                    )
                    .bright_green(),
                    format_target(record.target(), record.level()),
                    format_level(record.level()),
                    message
                )),
                LogFormat::Short => out.finish(format_args!(
                    "[{}] {}: {}",
                    format!("{:02}:{:02}:{:02}", now.hour(), now.minute(), now.second())
                        .bright_green(),
                    format_level(record.level()),
                    message
                )),
                LogFormat::Min => out.finish(format_args!(
                    "{}: {}",
                    format_level(record.level()),
                    message
                )),
                LogFormat::None => out.finish(format_args!("{}", message)),
            }
        })
        // Results go to stdout, so the log goes to stderr
        .chain(std::io::stderr());
    if let Some(path) = log_file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }
    dispatch.apply()?;

    Ok(())
}
