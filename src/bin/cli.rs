use clap::Parser;
use color_eyre::Report;
use feynexpr::cli::Cli;

fn main() -> Result<(), Report> {
    color_eyre::install()?;
    Cli::parse().run()
}
