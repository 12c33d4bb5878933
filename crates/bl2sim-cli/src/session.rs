//! Command sessions: batch macros and the interactive prompt.
//!
//! Both feed [`Command`]s into one [`Session`], which owns the run manager
//! and the replay engine. Malformed or unknown commands and rejected module
//! options are logged and skipped. Failures while building the geometry or
//! running events end a batch macro; at the interactive prompt they are
//! reported and the prompt carries on.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use bl2sim_core::command::{parse_command, Command};
use bl2sim_core::run::{RunManager, RunResult};
use bl2sim_detectors::build_module;
use bl2sim_geometry::VolumeStore;

use crate::config::JobConfig;
use crate::replay::ReplayEngine;

const MAX_MACRO_DEPTH: usize = 16;

/// Whether the session should keep reading commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Build the run manager for a job: world, modules in declaration order,
/// then each module's options.
pub fn build_manager(job: &JobConfig) -> Result<RunManager> {
    let volumes = VolumeStore::new(job.world.half_length_mm, &job.world.material)
        .context("Invalid world volume")?;
    let mut manager = RunManager::new(volumes)
        .with_output(job.output.clone())
        .with_correlator(job.correlator.clone())
        .with_threads(job.run.threads);

    for module in &job.modules {
        let built = build_module(&module.name, module.mother.as_deref())?;
        manager
            .register(built)
            .with_context(|| format!("Cannot register module '{}'", module.name))?;
    }
    for module in &job.modules {
        for (option, value) in &module.options {
            if let Err(e) = manager.configure(&module.name, option, value) {
                log::warn!("{}", e);
            }
        }
    }
    Ok(manager)
}

pub struct Session {
    manager: RunManager,
    engine: ReplayEngine,
    runs: Vec<RunResult>,
    depth: usize,
}

impl Session {
    pub fn new(manager: RunManager, engine: ReplayEngine) -> Self {
        Self {
            manager,
            engine,
            runs: Vec::new(),
            depth: 0,
        }
    }

    pub fn manager(&self) -> &RunManager {
        &self.manager
    }

    /// Completed runs, oldest first.
    pub fn runs(&self) -> &[RunResult] {
        &self.runs
    }

    pub fn execute(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::SetFileName(name) => self.manager.set_file_name(&name),
            Command::NumberOfThreads(threads) => self.manager.set_threads(threads),
            Command::Initialize => {
                self.manager.initialize()?;
                log::debug!("{}", self.manager.volumes().summary());
            }
            Command::BeamOn(events) => {
                let result = self.manager.beam_on(events, &self.engine)?;
                print_run(&result);
                self.runs.push(result);
            }
            Command::Configure { module, option, value } => {
                match self.manager.configure(&module, &option, &value) {
                    Ok(()) => log::info!("{}: {} = {}", module, option, value),
                    Err(e) => log::warn!("{}", e),
                }
            }
            Command::Execute(path) => self.run_macro(&path)?,
            Command::Exit => return Ok(Flow::Exit),
            Command::Ignored(line) => log::debug!("ignored: {}", line),
            Command::Unknown(line) => log::warn!("unknown command: {}", line),
        }
        Ok(Flow::Continue)
    }

    /// Parse and execute one line.
    pub fn execute_line(&mut self, line: &str) -> Result<Flow> {
        match parse_command(line) {
            Ok(Some(command)) => self.execute(command),
            Ok(None) => Ok(Flow::Continue),
            Err(e) => {
                log::warn!("{}", e);
                Ok(Flow::Continue)
            }
        }
    }

    /// Execute a macro file. `exit` stops the current file only.
    pub fn run_macro(&mut self, path: &Path) -> Result<()> {
        if self.depth >= MAX_MACRO_DEPTH {
            bail!("Macro nesting deeper than {} at '{}'", MAX_MACRO_DEPTH, path.display());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read macro '{}'", path.display()))?;
        log::info!("executing macro '{}'", path.display());

        self.depth += 1;
        let mut result = Ok(());
        for (index, line) in content.lines().enumerate() {
            match self.execute_line(line) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(e) => {
                    result = Err(e.context(format!("{}:{}", path.display(), index + 1)));
                    break;
                }
            }
        }
        self.depth -= 1;
        result
    }

    /// Read commands from `input` until `exit` or end of input. A failed
    /// command is reported on `prompt` and does not end the session.
    pub fn interactive(&mut self, mut input: impl BufRead, mut prompt: impl Write) -> Result<()> {
        let mut line = String::new();
        loop {
            write!(prompt, "bl2sim> ")?;
            prompt.flush()?;
            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(prompt)?;
                return Ok(());
            }
            match self.execute_line(&line) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => return Ok(()),
                Err(e) => {
                    log::error!("{:#}", e);
                    writeln!(prompt, "error: {:#}", e)?;
                }
            }
        }
    }
}

fn print_run(result: &RunResult) {
    println!(
        "Run {}: {} events on {} worker(s)",
        result.run_id, result.events, result.workers
    );
    for (name, rows) in result.row_counts() {
        println!("  {:<12} {} rows", name, rows);
    }
    for file in &result.files {
        println!("  wrote {}", file.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const EVENTS: &str = concat!(
        r#"{"hits": {"BGOCrystal/Edep": {"0": 1.0, "3": 0.5}}, "trajectories": [{"particle": "gamma", "initial_kinetic_energy": 0.511, "points": [[1.0, 2.0, 3.0]]}]}"#,
        "\n",
        r#"{"hits": {"BGOCrystal/Edep": {"5": 2.0}}}"#,
        "\n",
        r#"{}"#,
        "\n",
    );

    struct Fixture {
        dir: tempfile::TempDir,
        session: Session,
    }

    fn fixture(job_extra: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("events.jsonl"), EVENTS).unwrap();
        let job = format!(
            r#"
            [run]
            events = "events.jsonl"

            [[module]]
            name = "BeamLine"

            [[module]]
            name = "TargetChamberO17"

            [[module]]
            name = "TargetHolder"
            options = {{ target = "graphite" }}

            [[module]]
            name = "BGODetector"

            [output]
            directory = "{}"
            {}
            "#,
            dir.path().join("out").display(),
            job_extra
        );
        let job_path = dir.path().join("job.toml");
        std::fs::write(&job_path, job).unwrap();

        let job = crate::config::load_config(&job_path).unwrap();
        let manager = build_manager(&job).unwrap();
        let engine = ReplayEngine::open(&job.run.events).unwrap();
        Fixture {
            dir,
            session: Session::new(manager, engine),
        }
    }

    #[test]
    fn test_job_options_applied_before_construction() {
        let mut f = fixture("");
        f.session.execute(Command::Initialize).unwrap();
        let volumes = f.session.manager().volumes();
        assert!(volumes.logical_by_name("TargetHolder_Graphite").is_some());
    }

    #[test]
    fn test_macro_runs_and_writes_output() {
        let mut f = fixture("");
        let macro_path = f.dir.path().join("run.mac");
        std::fs::write(
            &macro_path,
            "# O17 run\n/control/verbose 2\n/run/setFileName o17\n/run/numberOfThreads 2\n/run/initialize\n/run/beamOn 3\n",
        )
        .unwrap();
        f.session.run_macro(&macro_path).unwrap();

        let runs = f.session.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].workers, 2);
        let bgo = runs[0].book.ntuple_by_name("EdepBGO").unwrap();
        assert_eq!(bgo.column("BGOsum").unwrap(), vec![1.5, 2.0, 0.0]);
        assert_eq!(bgo.column("Z").unwrap(), vec![3.0, 0.0, 0.0]);
        assert!(f.dir.path().join("out/o17_nt_EdepBGO.csv").exists());
    }

    #[test]
    fn test_unknown_and_malformed_commands_are_skipped() {
        let mut f = fixture("");
        for line in ["/gun/energy 400 keV", "/run/beamOn lots", "/geometry/TargetHolder/colour red"] {
            assert_eq!(f.session.execute_line(line).unwrap(), Flow::Continue);
        }
        assert!(f.session.runs().is_empty());
    }

    #[test]
    fn test_too_many_events_is_an_error() {
        let mut f = fixture("");
        let err = f.session.execute(Command::BeamOn(4)).unwrap_err();
        assert!(err.to_string().contains("only has 3"));
    }

    #[test]
    fn test_nested_macro_and_exit() {
        let mut f = fixture("file_name = \"nested\"");
        let inner = f.dir.path().join("inner.mac");
        std::fs::write(&inner, "/run/beamOn 1\nexit\n/run/beamOn 2\n").unwrap();
        let outer = f.dir.path().join("outer.mac");
        std::fs::write(
            &outer,
            format!("/control/execute {}\n/run/beamOn 2\n", inner.display()),
        )
        .unwrap();
        f.session.run_macro(&outer).unwrap();

        let events: Vec<u64> = f.session.runs().iter().map(|r| r.events).collect();
        assert_eq!(events, vec![1, 2]);
    }

    #[test]
    fn test_self_including_macro_is_rejected() {
        let mut f = fixture("");
        let path = f.dir.path().join("loop.mac");
        std::fs::write(&path, format!("/control/execute {}\n", path.display())).unwrap();
        let err = f.session.run_macro(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("nesting"));
    }

    #[test]
    fn test_interactive_until_exit() {
        let mut f = fixture("");
        let input = Cursor::new("/run/beamOn 2\n\nexit\n/run/beamOn 1\n");
        let mut prompt = Vec::new();
        f.session.interactive(input, &mut prompt).unwrap();

        assert_eq!(f.session.runs().len(), 1);
        assert!(String::from_utf8(prompt).unwrap().starts_with("bl2sim> "));
    }

    #[test]
    fn test_interactive_reports_failures_and_continues() {
        let mut f = fixture("");
        let input = Cursor::new("/run/beamOn 10\n/control/execute missing.mac\n/run/beamOn 2\nexit\n");
        let mut prompt = Vec::new();
        f.session.interactive(input, &mut prompt).unwrap();

        let events: Vec<u64> = f.session.runs().iter().map(|r| r.events).collect();
        assert_eq!(events, vec![2]);
        let shown = String::from_utf8(prompt).unwrap();
        assert!(shown.contains("only has 3"));
        assert!(shown.contains("missing.mac"));
    }

    #[test]
    fn test_options_frozen_after_first_run() {
        let mut f = fixture("");
        f.session.execute(Command::BeamOn(1)).unwrap();
        f.session
            .execute_line("/geometry/TargetHolder/target source")
            .unwrap();
        f.session.execute(Command::BeamOn(1)).unwrap();
        assert!(f
            .session
            .manager()
            .volumes()
            .logical_by_name("TargetHolder_Source")
            .is_none());
    }
}
