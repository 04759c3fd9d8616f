//! `assetguard sweep`: sensitivity analysis over configuration variables.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use assetguard_core::sweep::{plan, run_sweep, write_results};
use assetguard_core::SweepMode;
use rand::SeedableRng;
use rand::rngs::StdRng;
use statrs::statistics::Statistics;

/// Run the sweep command.
pub fn run(config_path: &str, mode: &str, samples: usize, out: &str, seed: Option<u64>) {
    let base = super::load_config(config_path);
    if base.sweep.is_empty() {
        eprintln!("Error: configuration has no \"sweep\" variables");
        std::process::exit(1);
    }
    let mode = super::parse_mode(mode);

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let points = match plan(&base, &base.sweep, mode, samples, &mut rng) {
        Ok(points) => points,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let s = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        s.store(true, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not install Ctrl+C handler: {e}");
    }

    println!("Sensitivity sweep");
    println!(
        "  Mode:       {}",
        match mode {
            SweepMode::MonteCarlo => "monte-carlo",
            SweepMode::OneAtATime => "one-at-a-time",
        }
    );
    println!("  Configs:    {}", points.len());
    for v in &base.sweep {
        println!("  Variable:   {} in [{}, {}]", v.target, v.min, v.max);
    }
    println!("  Output:     {out}");
    println!();

    let summary = run_sweep(points, &stop, |config| {
        super::assess(config, false, false).map(|(assessment, _)| assessment)
    });

    if let Err(e) = write_results(Path::new(out), &base.sweep, &summary.rows) {
        eprintln!("Error writing {out}: {e}");
        std::process::exit(1);
    }

    if summary.interrupted {
        println!("Interrupted.");
    }
    println!(
        "{} measured, {} unmeasurable, {} failed",
        summary.rows.len(),
        summary.unmeasurable,
        summary.failed
    );
    print_stats("Safety", summary.rows.iter().map(|r| r.safety));
    print_stats("Sustainability", summary.rows.iter().map(|r| r.sustainability));
}

fn print_stats(label: &str, values: impl Iterator<Item = f64>) {
    let finite: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if let Some((mean, std_dev)) = mean_and_std(&finite) {
        println!("  {label:<15} mean={mean:.6} sd={std_dev:.6} n={}", finite.len());
    }
}

/// Mean and sample standard deviation; `None` for an empty slice.
fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().mean();
    let std_dev = if values.len() > 1 {
        values.iter().std_dev()
    } else {
        0.0
    };
    Some((mean, std_dev))
}
