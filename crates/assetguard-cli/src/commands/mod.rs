pub mod check;
pub mod models;
pub mod run;
pub mod sweep;

use std::path::{Path, PathBuf};

use assetguard_core::{
    Assessment, Config, GreatSpnBackend, MaximumLikelihoodEngine, Orchestrator, PipelineError,
    RunRecorder, SolverEngine, SweepMode, TransportSimulator,
};

/// Load and validate a configuration, exiting on failure.
pub fn load_config(path: &str) -> Config {
    match Config::load(Path::new(path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Map the `--mode` value onto the enum. clap restricts it to `mc` and `oat`.
pub fn parse_mode(s: &str) -> SweepMode {
    if s == "oat" {
        SweepMode::OneAtATime
    } else {
        SweepMode::MonteCarlo
    }
}

/// Run one assessment against the real solver. Returns the record directory
/// when `draw` is set.
pub fn assess(
    config: &Config,
    draw: bool,
    keep_staging: bool,
) -> Result<(Assessment, Option<PathBuf>), PipelineError> {
    log::debug!("assessing configuration {}", config.fingerprint());
    let simulator = TransportSimulator::from_config(config)?;
    let solver = SolverEngine::new(GreatSpnBackend::new(&config.solver.bin_dir))
        .keep_staging(keep_staging);
    let mut orchestrator =
        Orchestrator::new(config, Box::new(simulator), MaximumLikelihoodEngine, solver);
    if draw {
        orchestrator = orchestrator.with_recorder(RunRecorder::new(&config.output));
    }
    let assessment = orchestrator.run()?;
    Ok((assessment, orchestrator.last_record().cloned()))
}
