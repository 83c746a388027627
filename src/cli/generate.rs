use std::{fs, path::PathBuf};

use clap::Args;
use color_eyre::{Result, Section};
use colored::Colorize;
use eyre::WrapErr;
use itertools::Itertools;
use log::{info, warn};

use crate::process::DiagramSet;

use super::state::State;

#[derive(Debug, Args)]
pub struct Generate {
    /// Diagram records, as a yaml or json list
    #[arg(short = 'd', long, value_name = "FILE")]
    diagrams: PathBuf,

    /// Write the expressions to this file instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Number of workers, overrides the settings file
    #[arg(short = 'n', long)]
    n_cores: Option<usize>,

    /// Show a progress bar
    #[arg(long)]
    progress: bool,
}

impl Generate {
    pub fn run(&self, state: &State) -> Result<()> {
        let mut settings = state.settings.clone();
        if let Some(n_cores) = self.n_cores {
            settings.n_cores = n_cores;
        }
        settings.show_progress |= self.progress;

        let set = DiagramSet::from_file(&self.diagrams)?;
        info!(
            "Read {} diagram records from {}",
            set.len(),
            self.diagrams.display()
        );
        let outcome = set.generate(&state.model, &settings)?;

        let text = outcome.generated.iter().map(|g| g.to_string()).join("\n");
        match &self.output {
            Some(path) => {
                fs::write(path, text + "\n")
                    .wrap_err_with(|| format!("Could not write {}", path.display()))
                    .suggestion("Does the parent directory exist?")?;
                info!(
                    "Wrote {} expressions to {}",
                    outcome.generated.len(),
                    path.display()
                );
            }
            None => println!("{}", text),
        }

        if !outcome.skipped.is_empty() {
            warn!(
                "{} diagram(s) skipped: {}",
                format!("{}", outcome.skipped.len()).red(),
                outcome.skipped.iter().map(|(id, _)| id).join(", ")
            );
        }
        Ok(())
    }
}
