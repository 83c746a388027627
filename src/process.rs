use std::{fmt, fs, path::Path};

use color_eyre::{Report, Section};
use eyre::WrapErr;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::{prelude::*, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};
use thiserror::Error;

use crate::{
    diagram::{Diagram, DiagramError, DiagramRecord},
    expression::{ExpressionGenerator, GenerationError},
    model::Model,
    GenerationSettings,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    #[error(transparent)]
    Diagram(#[from] DiagramError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDiagram {
    pub id: SmartString<LazyCompact>,
    pub expression: String,
}

impl fmt::Display for GeneratedDiagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "diagram {}: {}", self.id, self.expression)
    }
}

/// Result of a batch: expressions in input order, and the diagrams left out.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub generated: Vec<GeneratedDiagram>,
    pub skipped: Vec<(SmartString<LazyCompact>, ProcessError)>,
}

/// Build one diagram and generate its expression. Nothing of a failing diagram
/// is kept.
pub fn process_record(
    model: &Model,
    settings: &GenerationSettings,
    record: &DiagramRecord,
) -> Result<GeneratedDiagram, ProcessError> {
    let diagram = Diagram::from_record(model, record)?;
    let expression = ExpressionGenerator::new(settings).generate(&diagram)?;
    Ok(GeneratedDiagram {
        id: diagram.id,
        expression,
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DiagramSet {
    pub records: Vec<DiagramRecord>,
}

impl DiagramSet {
    /// Load records from a `.json` file, or from YAML for any other extension.
    pub fn from_file(file_path: impl AsRef<Path>) -> Result<DiagramSet, Report> {
        let file_path = file_path.as_ref();
        let content = fs::read_to_string(file_path)
            .wrap_err_with(|| format!("Could not open diagram file {}", file_path.display()))
            .suggestion("Does the path exist?")?;
        let is_json = file_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            DiagramSet::from_json_str(&content)
                .wrap_err("Could not parse diagram records")
                .suggestion("Is it a json list of diagram records?")
        } else {
            DiagramSet::from_yaml_str(&content)
                .wrap_err("Could not parse diagram records")
                .suggestion("Is it a yaml list of diagram records?")
        }
    }

    pub fn from_yaml_str(yaml_str: &str) -> Result<DiagramSet, serde_yaml::Error> {
        serde_yaml::from_str(yaml_str)
    }

    pub fn from_json_str(json_str: &str) -> Result<DiagramSet, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Generate every diagram on a pool of `settings.n_cores` workers. Diagrams
    /// are independent; a failing one is logged and skipped.
    pub fn generate(
        &self,
        model: &Model,
        settings: &GenerationSettings,
    ) -> Result<BatchOutcome, Report> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.n_cores.max(1))
            .build()
            .wrap_err("Could not build the worker pool")?;
        debug!(
            "Generating {} diagrams over {} cores for model {}",
            self.len(),
            pool.current_num_threads(),
            model.name
        );

        let results: Vec<Result<GeneratedDiagram, ProcessError>> = if settings.show_progress {
            let bar = ProgressBar::new(self.len() as u64);
            bar.set_style(
                ProgressStyle::with_template(
                    "[{elapsed_precise} | ETA: {eta_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} ({percent}%) {msg}",
                )
                .wrap_err("Invalid progress bar template")?,
            );
            bar.set_message("Generating expressions...");
            pool.install(|| {
                self.records
                    .par_iter()
                    .progress_with(bar)
                    .map(|record| process_record(model, settings, record))
                    .collect()
            })
        } else {
            pool.install(|| {
                self.records
                    .par_iter()
                    .map(|record| process_record(model, settings, record))
                    .collect()
            })
        };

        let mut outcome = BatchOutcome::default();
        for (record, result) in self.records.iter().zip(results) {
            match result {
                Ok(generated) => outcome.generated.push(generated),
                Err(e) => {
                    warn!("Skipping diagram {}: {}", record.id, e);
                    outcome.skipped.push((record.id.clone(), e));
                }
            }
        }
        info!(
            "Generated {} of {} diagrams ({} skipped)",
            outcome.generated.len(),
            self.len(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }
}
