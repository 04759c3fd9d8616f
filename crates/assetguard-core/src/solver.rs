//! Steady-state solution of a parameterized GSPN.
//!
//! The external solver is a set of procedures invoked as
//! `<bin_dir>/<procedure> <model> [args...]`. They must run in the exact order
//! of [`STEADY_STATE_SEQUENCE`]; each step consumes files left by the previous
//! ones in the staging directory.
//!
//! Metrics are read back from three artifacts:
//!
//! - `<model>.sta`: `Thru_<Transition> ... <float>` lines, summed for safety.
//! - `<model>.grg`: header `sub place group trans`, then `<id> <name>` rows
//!   mapping place names to 1-based node ids.
//! - `<model>.tpd`: per place, native-endian `f64` min, max, then
//!   `max - min + 1` marking probabilities.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use thiserror::Error;

use crate::params::EngineInstance;

/// Solver and artifact failures. All are fatal for the configuration.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("missing artifact {}", path.display())]
    MissingArtifact { path: PathBuf },
    #[error("node '{node}' not found in {}", artifact.display())]
    MissingNode { node: String, artifact: PathBuf },
    #[error("malformed artifact {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("solver procedure {procedure} failed: {reason}")]
    Procedure { procedure: String, reason: String },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SolverError + '_ {
    move |source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            SolverError::MissingArtifact {
                path: path.to_path_buf(),
            }
        } else {
            SolverError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Executes one solver procedure against a staged model.
pub trait SolverBackend {
    /// Run `procedure` on `model` (staged path without extension).
    fn run(&self, procedure: &str, model: &Path, args: &[String]) -> Result<(), SolverError>;
}

/// Runs the GreatSPN command-line procedures as blocking subprocesses.
#[derive(Debug, Clone)]
pub struct GreatSpnBackend {
    bin_dir: PathBuf,
}

impl GreatSpnBackend {
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
        }
    }
}

impl SolverBackend for GreatSpnBackend {
    fn run(&self, procedure: &str, model: &Path, args: &[String]) -> Result<(), SolverError> {
        let program = std::path::absolute(self.bin_dir.join(procedure)).map_err(|e| {
            SolverError::Procedure {
                procedure: procedure.to_string(),
                reason: format!("cannot resolve {}: {e}", self.bin_dir.display()),
            }
        })?;
        log::debug!(
            "executing {} {} {}",
            program.display(),
            model.display(),
            args.join(" ")
        );
        // Procedures run inside the staging directory, so the model is passed
        // by file name; relative outputs such as `-append <m>.sta` land there.
        let mut command = Command::new(&program);
        match (model.parent(), model.file_name()) {
            (Some(dir), Some(file)) if !dir.as_os_str().is_empty() => {
                command.current_dir(dir).arg(file);
            }
            _ => {
                command.arg(model);
            }
        }
        command.args(args);
        let output = command.output().map_err(|e| SolverError::Procedure {
            procedure: procedure.to_string(),
            reason: format!("failed to spawn {}: {e}", program.display()),
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SolverError::Procedure {
                procedure: procedure.to_string(),
                reason: format!("{} ({})", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Artifact readers
// ---------------------------------------------------------------------------

/// Place name → node id map from a `.grg` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMap {
    pub place_count: usize,
    pub nodes: BTreeMap<String, usize>,
}

impl NodeMap {
    pub fn parse(path: &Path, text: &str) -> Result<Self, SolverError> {
        let malformed = |reason: &str| SolverError::Malformed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header: Vec<usize> = lines
            .next()
            .ok_or_else(|| malformed("empty file"))?
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| malformed("header is not numeric"))?;
        let place_count = *header
            .get(1)
            .ok_or_else(|| malformed("header has no place count"))?;

        let mut nodes = BTreeMap::new();
        for line in lines {
            let mut fields = line.split_whitespace();
            let (Some(id), Some(name)) = (fields.next(), fields.next()) else {
                continue;
            };
            if let Ok(id) = id.parse::<usize>() {
                nodes.insert(name.to_string(), id);
            }
        }
        Ok(Self { place_count, nodes })
    }

    pub fn load(path: &Path) -> Result<Self, SolverError> {
        let text = std::fs::read_to_string(path).map_err(io_error(path))?;
        Self::parse(path, &text)
    }

    pub fn node_id(&self, name: &str) -> Option<usize> {
        self.nodes.get(name).copied()
    }
}

/// Reads average markings of places out of solver artifacts.
pub trait MarkingReader {
    /// Average marking of node `node_id` for the model at `model` (no extension).
    fn average_marking(&self, model: &Path, node_id: usize) -> Result<f64, SolverError>;
}

/// Reader for the binary token-probability-distribution (`.tpd`) file.
#[derive(Debug, Clone, Copy, Default)]
pub struct TpdReader;

fn read_f64(bytes: &[u8], offset: &mut usize) -> Option<f64> {
    let end = offset.checked_add(8)?;
    let chunk: [u8; 8] = bytes.get(*offset..end)?.try_into().ok()?;
    *offset = end;
    Some(f64::from_ne_bytes(chunk))
}

/// Expected value of the marking distribution for `node_id` (1-based).
///
/// The distribution of each place is indexed from zero regardless of its
/// stored minimum.
pub fn tpd_average(
    path: &Path,
    bytes: &[u8],
    place_count: usize,
    node_id: usize,
) -> Result<f64, SolverError> {
    if node_id == 0 || node_id > place_count {
        return Err(SolverError::MissingNode {
            node: node_id.to_string(),
            artifact: path.to_path_buf(),
        });
    }
    let truncated = || SolverError::Malformed {
        path: path.to_path_buf(),
        reason: "distribution truncated".to_string(),
    };
    let mut offset = 0;
    for n in 1..=place_count {
        let min = read_f64(bytes, &mut offset).ok_or_else(truncated)?;
        let max = read_f64(bytes, &mut offset).ok_or_else(truncated)?;
        let span = max - min;
        if !span.is_finite() || span < 0.0 {
            return Err(SolverError::Malformed {
                path: path.to_path_buf(),
                reason: format!("place {n} has bounds [{min}, {max}]"),
            });
        }
        let mut average = 0.0;
        for jj in 0..=(span as usize) {
            let p = read_f64(bytes, &mut offset).ok_or_else(truncated)?;
            average += p * jj as f64;
        }
        if n == node_id {
            return Ok(average);
        }
    }
    Err(truncated())
}

impl MarkingReader for TpdReader {
    fn average_marking(&self, model: &Path, node_id: usize) -> Result<f64, SolverError> {
        let grg = model.with_extension("grg");
        let map = NodeMap::load(&grg)?;
        let tpd = model.with_extension("tpd");
        let bytes = std::fs::read(&tpd).map_err(io_error(&tpd))?;
        tpd_average(&tpd, &bytes, map.place_count, node_id)
    }
}

/// Throughput of `transition` from the text of a `.sta` file.
pub fn throughput(path: &Path, sta: &str, transition: &str) -> Result<f64, SolverError> {
    let key = format!("Thru_{transition}");
    let line = sta
        .lines()
        .find(|l| l.split_whitespace().next() == Some(key.as_str()))
        .ok_or_else(|| SolverError::MissingNode {
            node: transition.to_string(),
            artifact: path.to_path_buf(),
        })?;
    line.split_whitespace()
        .rev()
        .find_map(|t| t.parse::<f64>().ok())
        .ok_or_else(|| SolverError::Malformed {
            path: path.to_path_buf(),
            reason: format!("no value on line '{line}'"),
        })
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// One step of the steady-state solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Run a procedure; `with_params` passes the instance's `-rpar` arguments.
    Procedure {
        name: &'static str,
        with_params: bool,
        extra: &'static [&'static str],
    },
    /// Empty `<model>.<ext>`.
    Truncate(&'static str),
    /// Copy `<model>.<from>` to `<model>.<to>`.
    Copy(&'static str, &'static str),
}

/// Fixed order of the steady-state solution. Arguments that depend on the
/// model name (`-dot-F`, `-append`) are appended by the engine.
pub const STEADY_STATE_SEQUENCE: [Step; 7] = [
    Step::Procedure {
        name: "WNRG",
        with_params: true,
        extra: &["-m", "-gui-stat"],
    },
    Step::Truncate("gst"),
    Step::Procedure {
        name: "swn_stndrd",
        with_params: false,
        extra: &[],
    },
    Step::Procedure {
        name: "swn_ggsc",
        with_params: false,
        extra: &["-e1.0E-7", "-i10000"],
    },
    Step::Copy("epd", "mpd"),
    Step::Procedure {
        name: "swn_gst_prep",
        with_params: true,
        extra: &[],
    },
    Step::Procedure {
        name: "swn_gst_stndrd",
        with_params: false,
        extra: &[],
    },
];

/// Metrics of one solved instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Solution {
    pub safety: f64,
    pub sustainability: f64,
}

/// Stages, solves, and reads back one engine instance at a time.
pub struct SolverEngine<B: SolverBackend, M: MarkingReader = TpdReader> {
    backend: B,
    reader: M,
    keep_staging: bool,
}

impl<B: SolverBackend> SolverEngine<B> {
    pub fn new(backend: B) -> Self {
        Self::with_reader(backend, TpdReader)
    }
}

impl<B: SolverBackend, M: MarkingReader> SolverEngine<B, M> {
    pub fn with_reader(backend: B, reader: M) -> Self {
        Self {
            backend,
            reader,
            keep_staging: false,
        }
    }

    /// Leave staging directories on disk once a solve finishes, whether it
    /// succeeded or not.
    pub fn keep_staging(mut self, keep: bool) -> Self {
        self.keep_staging = keep;
        self
    }

    /// Stage, run the full sequence, and extract both metrics.
    ///
    /// The staging directory is removed afterwards, on success and on failure,
    /// unless [`keep_staging`](Self::keep_staging) is set.
    pub fn solve(&self, instance: &EngineInstance) -> Result<Solution, SolverError> {
        let result = self.solve_staged(instance);
        if !self.keep_staging {
            self.discard_staging(instance);
        }
        let solution = result?;
        log::info!(
            "{}: safety={:.6} sustainability={:.6}",
            instance.model_name(),
            solution.safety,
            solution.sustainability
        );
        Ok(solution)
    }

    fn solve_staged(&self, instance: &EngineInstance) -> Result<Solution, SolverError> {
        self.stage(instance)?;
        self.run_sequence(instance)?;
        Ok(Solution {
            safety: self.safety(instance)?,
            sustainability: self.sustainability(instance)?,
        })
    }

    fn discard_staging(&self, instance: &EngineInstance) {
        let dir = &instance.staging_dir;
        if !dir.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(dir) {
            log::warn!("could not remove staging dir {}: {e}", dir.display());
        }
    }

    /// Create an empty staging directory holding the model definition files.
    pub fn stage(&self, instance: &EngineInstance) -> Result<(), SolverError> {
        let dir = &instance.staging_dir;
        if dir.exists() {
            std::fs::remove_dir_all(dir).map_err(io_error(dir))?;
        }
        std::fs::create_dir_all(dir).map_err(io_error(dir))?;
        for ext in ["def", "net"] {
            let file = format!("{}.{ext}", instance.model_name());
            let source = instance.repository.join(&file);
            if !source.is_file() {
                return Err(SolverError::MissingArtifact { path: source });
            }
            std::fs::copy(&source, dir.join(&file)).map_err(io_error(&source))?;
        }
        log::debug!("staged {} in {}", instance.model_name(), dir.display());
        Ok(())
    }

    /// Execute [`STEADY_STATE_SEQUENCE`] in order.
    pub fn run_sequence(&self, instance: &EngineInstance) -> Result<(), SolverError> {
        let model = instance.staged_model();
        let name = instance.model_name();
        let params = instance.parameter_args();
        for step in STEADY_STATE_SEQUENCE {
            match step {
                Step::Procedure {
                    name: procedure,
                    with_params,
                    extra,
                } => {
                    let mut args = if with_params { params.clone() } else { Vec::new() };
                    args.extend(extra.iter().map(|s| s.to_string()));
                    match procedure {
                        "WNRG" => args.extend([
                            "-dot-F".to_string(),
                            format!("{name}-RG-0"),
                            "-max-dot-markings".to_string(),
                            "80".to_string(),
                        ]),
                        "swn_gst_stndrd" => {
                            args.extend(["-append".to_string(), format!("{name}.sta")])
                        }
                        _ => {}
                    }
                    self.backend.run(procedure, &model, &args)?;
                }
                Step::Truncate(ext) => {
                    let path = model.with_extension(ext);
                    std::fs::write(&path, b"").map_err(io_error(&path))?;
                }
                Step::Copy(from, to) => {
                    let source = model.with_extension(from);
                    if !source.is_file() {
                        return Err(SolverError::MissingArtifact { path: source });
                    }
                    std::fs::copy(&source, model.with_extension(to))
                        .map_err(io_error(&source))?;
                }
            }
        }
        Ok(())
    }

    /// Reciprocal of the summed throughput of the safety transitions.
    pub fn safety(&self, instance: &EngineInstance) -> Result<f64, SolverError> {
        let path = instance.staged_model().with_extension("sta");
        let sta = std::fs::read_to_string(&path).map_err(io_error(&path))?;
        let mut total = 0.0;
        for transition in &instance.measures.safety {
            total += throughput(&path, &sta, transition)?;
        }
        Ok(1.0 / total)
    }

    /// Minimum over sustainability places of the reciprocal average marking.
    pub fn sustainability(&self, instance: &EngineInstance) -> Result<f64, SolverError> {
        let model = instance.staged_model();
        let grg = model.with_extension("grg");
        let map = NodeMap::load(&grg)?;
        let mut best = f64::INFINITY;
        for place in &instance.measures.sustainability {
            let id = map.node_id(place).ok_or_else(|| SolverError::MissingNode {
                node: place.clone(),
                artifact: grg.clone(),
            })?;
            let average = self.reader.average_marking(&model, id)?;
            best = best.min(1.0 / average);
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::topology::{Topology, TwoSensorPolicy};

    fn tpd_bytes(places: &[(f64, f64, &[f64])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (min, max, probs) in places {
            out.extend(min.to_ne_bytes());
            out.extend(max.to_ne_bytes());
            for p in *probs {
                out.extend(p.to_ne_bytes());
            }
        }
        out
    }

    /// Backend that records calls and writes the artifacts a real solver would.
    #[derive(Default)]
    struct FakeBackend {
        calls: RefCell<Vec<(String, Vec<String>)>>,
    }

    impl SolverBackend for FakeBackend {
        fn run(&self, procedure: &str, model: &Path, args: &[String]) -> Result<(), SolverError> {
            self.calls
                .borrow_mut()
                .push((procedure.to_string(), args.to_vec()));
            let write = |ext: &str, data: &[u8]| std::fs::write(model.with_extension(ext), data).unwrap();
            match procedure {
                "WNRG" => {
                    write("grg", b"0 3 0 4\n1 Idle_1\n2 Idle_2\n3 Busy\n");
                    write("gst", b"stale");
                }
                "swn_ggsc" => write("epd", b"epd"),
                "swn_gst_stndrd" => {
                    write(
                        "sta",
                        b"Thru_EventMissed = 0.25\nThru_HandoverMissed = 0.25\nThru_Other = 9\n",
                    );
                    // Idle_1 average 0.5, Idle_2 average 0.25
                    write(
                        "tpd",
                        &tpd_bytes(&[
                            (0.0, 1.0, &[0.5, 0.5]),
                            (0.0, 1.0, &[0.75, 0.25]),
                            (0.0, 0.0, &[1.0]),
                        ]),
                    );
                }
                _ => {}
            }
            Ok(())
        }
    }

    fn instance(repo: &Path, staging: &Path, topology: Topology) -> EngineInstance {
        EngineInstance {
            topology,
            parameters: BTreeMap::from([("InRate".to_string(), 0.5)]),
            repository: repo.to_path_buf(),
            staging_dir: staging.to_path_buf(),
            measures: topology.measures(),
        }
    }

    fn repo_with(model: &str) -> tempfile::TempDir {
        let repo = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join(format!("{model}.def")), "def").unwrap();
        std::fs::write(repo.path().join(format!("{model}.net")), "net").unwrap();
        repo
    }

    // -----------------------------------------------------------------------
    // Artifact parsing
    // -----------------------------------------------------------------------

    #[test]
    fn test_node_map_parse() {
        let map = NodeMap::parse(Path::new("m.grg"), "0 2 0 1\n1 Idle\n2 Busy\n").unwrap();
        assert_eq!(map.place_count, 2);
        assert_eq!(map.node_id("Busy"), Some(2));
        assert_eq!(map.node_id("Nope"), None);
    }

    #[test]
    fn test_node_map_rejects_bad_header() {
        assert!(matches!(
            NodeMap::parse(Path::new("m.grg"), "x y\n"),
            Err(SolverError::Malformed { .. })
        ));
        assert!(matches!(
            NodeMap::parse(Path::new("m.grg"), ""),
            Err(SolverError::Malformed { .. })
        ));
    }

    #[test]
    fn test_tpd_average_indexes_from_zero() {
        let bytes = tpd_bytes(&[(0.0, 2.0, &[0.2, 0.3, 0.5]), (3.0, 4.0, &[0.5, 0.5])]);
        let p = Path::new("m.tpd");
        assert!((tpd_average(p, &bytes, 2, 1).unwrap() - 1.3).abs() < 1e-12);
        // min is 3 but the distribution is still weighted 0, 1
        assert_eq!(tpd_average(p, &bytes, 2, 2).unwrap(), 0.5);
    }

    #[test]
    fn test_tpd_missing_node_and_truncation() {
        let bytes = tpd_bytes(&[(0.0, 1.0, &[0.5, 0.5])]);
        let p = Path::new("m.tpd");
        assert!(matches!(
            tpd_average(p, &bytes, 1, 2),
            Err(SolverError::MissingNode { .. })
        ));
        assert!(matches!(
            tpd_average(p, &bytes[..20], 1, 1),
            Err(SolverError::Malformed { .. })
        ));
    }

    #[test]
    fn test_throughput_reads_last_float() {
        let sta = "Thru_A 1 2 0.125\nThru_AB = 5\n";
        let p = Path::new("m.sta");
        assert_eq!(throughput(p, sta, "A").unwrap(), 0.125);
        assert_eq!(throughput(p, sta, "AB").unwrap(), 5.0);
        assert!(matches!(
            throughput(p, sta, "C"),
            Err(SolverError::MissingNode { node, .. }) if node == "C"
        ));
    }

    // -----------------------------------------------------------------------
    // Engine
    // -----------------------------------------------------------------------

    #[test]
    fn test_solve_runs_fixed_sequence() {
        let topology = Topology::TwoSensor(TwoSensorPolicy::Interleaved);
        let repo = repo_with(topology.model_name());
        let out = tempfile::tempdir().unwrap();
        let staging = out.path().join("two_interleaved_analysis-x");
        let inst = instance(repo.path(), &staging, topology);

        let engine = SolverEngine::new(FakeBackend::default()).keep_staging(true);
        let solution = engine.solve(&inst).unwrap();

        // 1 / (0.25 + 0.25)
        assert_eq!(solution.safety, 2.0);
        // min(1 / 0.5, 1 / 0.25)
        assert_eq!(solution.sustainability, 2.0);

        let calls = engine.backend.calls.borrow();
        let order: Vec<&str> = calls.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            order,
            ["WNRG", "swn_stndrd", "swn_ggsc", "swn_gst_prep", "swn_gst_stndrd"]
        );
        assert_eq!(
            calls[0].1,
            [
                "-rpar",
                "InRate",
                "0.5",
                "-m",
                "-gui-stat",
                "-dot-F",
                "two_interleaved-RG-0",
                "-max-dot-markings",
                "80"
            ]
        );
        assert_eq!(calls[2].1, ["-e1.0E-7", "-i10000"]);
        assert_eq!(calls[3].1, ["-rpar", "InRate", "0.5"]);
        assert_eq!(calls[4].1, ["-append", "two_interleaved.sta"]);

        assert_eq!(std::fs::read(staging.join("two_interleaved.gst")).unwrap(), b"");
        assert_eq!(std::fs::read(staging.join("two_interleaved.mpd")).unwrap(), b"epd");
    }

    #[test]
    fn test_staging_is_removed_after_solve() {
        let topology = Topology::TwoSensor(TwoSensorPolicy::Default);
        let repo = repo_with(topology.model_name());
        let out = tempfile::tempdir().unwrap();
        let staging = out.path().join("stage");
        let inst = instance(repo.path(), &staging, topology);
        SolverEngine::new(FakeBackend::default()).solve(&inst).unwrap();
        assert!(!staging.exists());
    }

    #[test]
    fn test_stage_clears_stale_files() {
        let topology = Topology::OneSensor;
        let repo = repo_with(topology.model_name());
        let out = tempfile::tempdir().unwrap();
        let staging = out.path().join("stage");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("one_sensor.sta"), "old").unwrap();

        let engine = SolverEngine::new(FakeBackend::default());
        engine.stage(&instance(repo.path(), &staging, topology)).unwrap();
        assert!(!staging.join("one_sensor.sta").exists());
        assert!(staging.join("one_sensor.def").is_file());
        assert!(staging.join("one_sensor.net").is_file());
    }

    #[test]
    fn test_missing_model_file_is_fatal() {
        let repo = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let inst = instance(repo.path(), &out.path().join("s"), Topology::ThreeSensor);
        let err = SolverEngine::new(FakeBackend::default())
            .solve(&inst)
            .unwrap_err();
        assert!(matches!(err, SolverError::MissingArtifact { .. }));
    }

    #[test]
    fn test_missing_sustainability_place_is_fatal() {
        // three-sensor model asks for Idle_3, which the fake node map lacks
        let topology = Topology::ThreeSensor;
        let repo = repo_with(topology.model_name());
        let out = tempfile::tempdir().unwrap();
        let inst = instance(repo.path(), &out.path().join("s"), topology);
        let err = SolverEngine::new(FakeBackend::default())
            .solve(&inst)
            .unwrap_err();
        assert!(matches!(err, SolverError::MissingNode { node, .. } if node == "Idle_3"));
    }

    #[test]
    fn test_failing_procedure_aborts_sequence() {
        struct Failing;
        impl SolverBackend for Failing {
            fn run(&self, procedure: &str, _: &Path, _: &[String]) -> Result<(), SolverError> {
                Err(SolverError::Procedure {
                    procedure: procedure.to_string(),
                    reason: "exit status: 1".to_string(),
                })
            }
        }
        let topology = Topology::OneSensor;
        let repo = repo_with(topology.model_name());
        let out = tempfile::tempdir().unwrap();
        let inst = instance(repo.path(), &out.path().join("s"), topology);
        let err = SolverEngine::new(Failing).solve(&inst).unwrap_err();
        assert!(matches!(err, SolverError::Procedure { procedure, .. } if procedure == "WNRG"));
        assert!(!inst.staging_dir.exists());

        let err = SolverEngine::new(Failing)
            .keep_staging(true)
            .solve(&inst)
            .unwrap_err();
        assert!(matches!(err, SolverError::Procedure { .. }));
        assert!(inst.staging_dir.join("one_sensor.def").is_file());
    }

    #[test]
    fn test_missing_node_removes_staging() {
        let topology = Topology::ThreeSensor;
        let repo = repo_with(topology.model_name());
        let out = tempfile::tempdir().unwrap();
        let inst = instance(repo.path(), &out.path().join("s"), topology);
        assert!(SolverEngine::new(FakeBackend::default()).solve(&inst).is_err());
        assert!(!inst.staging_dir.exists());
    }

    // -----------------------------------------------------------------------
    // Subprocess backend
    // -----------------------------------------------------------------------

    /// Install an executable shell script as a solver procedure.
    #[cfg(unix)]
    fn install_procedure(bin: &Path, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::create_dir_all(bin).unwrap();
        let path = bin.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_subprocess_finds_model_in_relative_staging_dir() {
        // relative to the test's working directory, like the default "output"
        let scratch = tempfile::Builder::new().tempdir_in(".").unwrap();
        assert!(scratch.path().is_relative());
        let bin = scratch.path().join("bin");
        install_procedure(
            &bin,
            "WNRG",
            r#"test -e "$1.def" || exit 3
echo "$@" > "$1.args""#,
        );

        let topology = Topology::OneSensor;
        let repo = repo_with(topology.model_name());
        let staging = scratch.path().join("output").join("one_sensor_analysis-x");
        let inst = instance(repo.path(), &staging, topology);
        let engine = SolverEngine::new(GreatSpnBackend::new(&bin));
        engine.stage(&inst).unwrap();

        let args = vec!["-dot-F".to_string(), "one_sensor-RG-0".to_string()];
        engine
            .backend
            .run("WNRG", &inst.staged_model(), &args)
            .unwrap();
        let written = std::fs::read_to_string(staging.join("one_sensor.args")).unwrap();
        assert_eq!(written.trim(), "one_sensor -dot-F one_sensor-RG-0");
    }

    #[test]
    #[cfg(unix)]
    fn test_subprocess_nonzero_exit_is_procedure_error() {
        let scratch = tempfile::tempdir().unwrap();
        let bin = scratch.path().join("bin");
        install_procedure(&bin, "swn_stndrd", "echo boom >&2; exit 4");
        let model = scratch.path().join("m");
        let err = GreatSpnBackend::new(&bin)
            .run("swn_stndrd", &model, &[])
            .unwrap_err();
        assert!(matches!(
            err,
            SolverError::Procedure { procedure, reason }
                if procedure == "swn_stndrd" && reason.contains("boom")
        ));
    }

    #[test]
    fn test_missing_binary_is_procedure_error() {
        let backend = GreatSpnBackend::new("/nonexistent/greatspn/bin");
        let err = backend
            .run("WNRG", Path::new("/tmp/model"), &[])
            .unwrap_err();
        assert!(matches!(err, SolverError::Procedure { .. }));
    }

    #[test]
    #[ignore = "requires a GreatSPN installation in GREATSPN_BIN"]
    fn test_real_solver_one_sensor() {
        let Ok(bin) = std::env::var("GREATSPN_BIN") else {
            return;
        };
        let Ok(repo) = std::env::var("ASSETGUARD_MODELS") else {
            return;
        };
        let out = tempfile::tempdir().unwrap();
        let topology = Topology::OneSensor;
        let mut inst = instance(Path::new(&repo), &out.path().join("s"), topology);
        inst.parameters = BTreeMap::from([
            ("DetectionProb".to_string(), 0.59),
            ("EventEndRate".to_string(), 0.97),
            ("EventStartRate".to_string(), 0.03),
            ("InRate".to_string(), 0.0001),
            ("OffRate".to_string(), 0.1),
        ]);
        let solution = SolverEngine::new(GreatSpnBackend::new(bin))
            .solve(&inst)
            .unwrap();
        assert!(solution.safety > 0.0);
        assert!(solution.sustainability > 0.0);
    }
}
