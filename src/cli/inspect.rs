use clap::Args;
use color_eyre::Result;
use colored::Colorize;
use itertools::Itertools;

use super::state::State;

#[derive(Debug, Args)]
pub struct InspectModel {
    /// Also print the model back as yaml
    #[arg(long)]
    yaml: bool,
}

impl InspectModel {
    pub fn run(&self, state: &State) -> Result<()> {
        let model = &state.model;
        println!("Model {}", model.name.bold());

        println!("{}", "Parameters:".blue());
        for p in model.parameters() {
            println!(
                "  {:<8} {:<10} {}",
                p.symbol,
                p.name,
                if p.is_real() { "" } else { "complex" }
            );
        }

        println!("{}", "Particles:".blue());
        for p in model.particles() {
            println!(
                "  {:<8} mass={:<6} spin={} anti={}{}",
                p.name,
                p.mass.symbol,
                p.spin,
                p.anti_particle_name(),
                if p.is_fermion() { " (fermion)" } else { "" }
            );
        }

        println!("{}", "Interactions:".blue());
        for i in model.interactions() {
            println!(
                "  {:<12} [{}] {:?}",
                i.name,
                i.particle_names().iter().join(", "),
                i.rule
            );
        }

        println!("{}", "Propagators:".blue());
        for p in model.propagators() {
            println!(
                "  {:<12} {} -> {} {:?}",
                p.name,
                p.from_particle().name,
                p.to_particle().name,
                p.rule
            );
        }

        if self.yaml {
            println!("{}", model.to_yaml()?);
        }
        Ok(())
    }
}
