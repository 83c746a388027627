#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
// #![deny(clippy::all)]
// #![warn(clippy::pedantic)]
#![warn(clippy::all)]
pub mod algebra;
pub mod cli;
pub mod diagram;
pub mod expression;
pub mod fermion_line;
pub mod model;
pub mod process;
#[cfg(test)]
mod tests;

use std::{fs::File, path::Path};

use color_eyre::{Report, Section};
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use smartstring::{LazyCompact, SmartString};

pub use fermion_line::FermionVertexSelection;

fn _default_trace_symbol() -> SmartString<LazyCompact> {
    "Tr".into()
}
fn _default_open_line_symbol() -> SmartString<LazyCompact> {
    "OpenLine".into()
}
const fn _default_true() -> bool {
    true
}
const fn _default_n_cores() -> usize {
    1
}

/// Everything that shapes the emitted expressions besides the model itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationSettings {
    /// Function wrapped around the product of a closed fermion line.
    #[serde(default = "_default_trace_symbol")]
    pub trace_symbol: SmartString<LazyCompact>,
    /// Function carrying the line index and external legs of an open line.
    #[serde(default = "_default_open_line_symbol")]
    pub open_line_symbol: SmartString<LazyCompact>,
    #[serde(default = "_default_true")]
    pub include_prefactor: bool,
    #[serde(default)]
    pub fermion_vertices: FermionVertexSelection,
    #[serde(default = "_default_n_cores")]
    pub n_cores: usize,
    #[serde(default)]
    pub show_progress: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            trace_symbol: _default_trace_symbol(),
            open_line_symbol: _default_open_line_symbol(),
            include_prefactor: true,
            fermion_vertices: FermionVertexSelection::default(),
            n_cores: _default_n_cores(),
            show_progress: false,
        }
    }
}

impl GenerationSettings {
    pub fn from_file(file_path: impl AsRef<Path>) -> Result<GenerationSettings, Report> {
        let file_path = file_path.as_ref();
        let f = File::open(file_path)
            .wrap_err_with(|| format!("Could not open settings file {}", file_path.display()))
            .suggestion("Does the path exist?")?;
        serde_yaml::from_reader(f)
            .wrap_err("Could not parse settings file")
            .suggestion("Is it a correct yaml file")
    }

    pub fn from_yaml_str(yaml_str: &str) -> Result<GenerationSettings, serde_yaml::Error> {
        serde_yaml::from_str(yaml_str)
    }
}
