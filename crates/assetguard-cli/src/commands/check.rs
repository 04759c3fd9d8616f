//! `assetguard check`: validate a configuration without running it.

use assetguard_core::{Config, SweepTarget, Topology};

/// Run the check command.
pub fn run(config_path: &str) {
    let config = super::load_config(config_path);

    let topology = match Topology::select(config.sensors.len(), config.scheduler.kind) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!("Configuration OK: {config_path}");
    println!("  Fingerprint:  {}", config.fingerprint());
    println!("  Steps:        {}", config.simulation.steps);
    match config.simulation.seed {
        Some(seed) => println!("  Seed:         {seed}"),
        None => println!("  Seed:         (os entropy)"),
    }
    println!("  Sensors:      {}", config.sensor_names().join(", "));
    println!("  Scheduling:   {}", config.scheduler.kind);
    println!("  Model:        {topology}");
    println!("  Max retries:  {}", config.pipeline.max_retries);

    let missing = missing_model_files(&config, topology);
    for path in &missing {
        eprintln!("  Missing:      {path}");
    }

    for variable in &config.sweep {
        // validated by Config::load
        if let Ok(target) = SweepTarget::parse(&variable.target) {
            println!(
                "  Sweep:        {target:?} in [{}, {}]",
                variable.min, variable.max
            );
        }
    }

    if !missing.is_empty() {
        std::process::exit(1);
    }
}

/// Model definition files the solver will need but the repository lacks.
fn missing_model_files(config: &Config, topology: Topology) -> Vec<String> {
    ["def", "net"]
        .iter()
        .map(|ext| {
            config
                .solver
                .model_repository
                .join(format!("{}.{ext}", topology.model_name()))
        })
        .filter(|path| !path.is_file())
        .map(|path| path.display().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config_with_repository(repo: &Path) -> Config {
        let json = format!(
            r#"{{
                "simulation": {{ "steps": 50 }},
                "process": {{ "kind": "walk", "mu": 0.0, "sigma": 1.0, "level": 10.0, "drift": 0.0 }},
                "asset": {{ "position": {{ "x": 4.0, "y": 0.0 }}, "threshold": 7.0 }},
                "sensors": [
                    {{ "name": "S1", "position": {{ "x": 3.0, "y": 3.0 }}, "threshold": 6.0, "sigma": 0.5 }}
                ],
                "scheduler": {{ "on_rate": 0.001, "off_rate": 0.1 }},
                "solver": {{ "bin_dir": "/opt/greatspn/bin", "model_repository": {repo:?} }}
            }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_missing_model_files_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_with_repository(tmp.path());
        let missing = missing_model_files(&config, Topology::OneSensor);
        assert_eq!(missing.len(), 2);
        assert!(missing[0].ends_with("one_sensor.def"));
    }

    #[test]
    fn test_present_model_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("one_sensor.def"), "").unwrap();
        std::fs::write(tmp.path().join("one_sensor.net"), "").unwrap();
        let config = config_with_repository(tmp.path());
        assert!(missing_model_files(&config, Topology::OneSensor).is_empty());
    }
}
