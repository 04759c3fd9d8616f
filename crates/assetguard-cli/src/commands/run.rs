//! `assetguard run`: one assessment of one configuration.

use std::path::PathBuf;

use assetguard_core::{Assessment, PipelineError};

pub struct RunCommandConfig<'a> {
    pub config_path: &'a str,
    pub draw: bool,
    pub max_retries: Option<usize>,
    pub seed: Option<u64>,
    pub output: Option<&'a str>,
    pub keep_staging: bool,
    pub json: bool,
}

/// Run the run command.
pub fn run(cmd: RunCommandConfig<'_>) {
    let mut config = super::load_config(cmd.config_path);
    if let Some(n) = cmd.max_retries {
        config.pipeline.max_retries = n;
    }
    if let Some(seed) = cmd.seed {
        config.simulation.seed = Some(seed);
    }
    if let Some(output) = cmd.output {
        config.output = PathBuf::from(output);
    }

    let (assessment, record) = match super::assess(&config, cmd.draw, cmd.keep_staging) {
        Ok(result) => result,
        Err(PipelineError::RetriesExhausted { retries }) => {
            eprintln!(
                "Error: sensor reliability stayed indeterminate after {retries} retries; \
                 the simulated asset was never at risk"
            );
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if cmd.json {
        match serde_json::to_string_pretty(&assessment) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing assessment: {e}");
                std::process::exit(1);
            }
        }
        return;
    }
    print_assessment(&assessment);
    if let Some(dir) = record {
        println!("  Record:         {}", dir.display());
    }
}

fn print_assessment(a: &Assessment) {
    println!("Assessment ({})", a.outcome);
    if let Some(topology) = a.topology {
        println!("  Model:          {topology}");
    }
    println!("  Safety:         {}", a.safety);
    println!("  Sustainability: {}", a.sustainability);
    println!("  Retries:        {}", a.retries);
    if let Some(rates) = a.rates {
        println!(
            "  Asset rates:    activation={:.6} deactivation={:.6}",
            rates.activation_rate, rates.deactivation_rate
        );
    }
    for (sensor, p) in &a.reliability.detection {
        let flag = if a.reliability.faulty.contains(sensor) {
            " (faulty)"
        } else {
            ""
        };
        println!("  P(detect | {sensor}): {p:.4}{flag}");
    }
}
