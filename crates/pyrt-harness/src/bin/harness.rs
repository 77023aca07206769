//! CLI entrypoint for the pyrt conformance harness.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pyrt_harness::fixtures::fixture_paths;
use pyrt_harness::report::FixtureDigest;
use pyrt_harness::structured_log::{LogEmitter, LogEntry, LogLevel, now_utc};
use pyrt_harness::{ConformanceReport, FixtureSet, TestRunner, VerificationSummary};
use pyrt_membrane::config::{self, TrackingLevel};
use pyrt_membrane::lifecycle;

#[derive(Debug, Parser)]
#[command(name = "pyrt-harness")]
#[command(about = "Fixture-driven conformance harness for the pyrt runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Verify the runtime against fixture files.
    Verify {
        /// Fixture JSON file, or a directory of them.
        #[arg(long)]
        fixture: PathBuf,
        /// Output report path (markdown).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Structured JSONL log path; also enables membrane lifecycle tracing.
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Run the fixture set compiled into the harness.
    Selftest {
        /// Structured JSONL log path; also enables membrane lifecycle tracing.
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

struct Loaded {
    set: FixtureSet,
    digest: FixtureDigest,
}

fn load_dir(path: &Path) -> Result<Vec<Loaded>, Box<dyn std::error::Error>> {
    let mut loaded = Vec::new();
    for path in fixture_paths(path)? {
        let content = std::fs::read_to_string(&path)?;
        let set = FixtureSet::from_json(&content)?;
        let digest = FixtureDigest::of(&set.family, &path.display().to_string(), &content);
        loaded.push(Loaded { set, digest });
    }
    Ok(loaded)
}

fn load_builtin() -> Result<Vec<Loaded>, Box<dyn std::error::Error>> {
    let set = FixtureSet::builtin()?;
    let digest = FixtureDigest::of(&set.family, "<builtin>", FixtureSet::builtin_source());
    Ok(vec![Loaded { set, digest }])
}

fn run(
    campaign: &str,
    loaded: &[Loaded],
    log: Option<&Path>,
) -> Result<ConformanceReport, Box<dyn std::error::Error>> {
    let mut emitter = match log {
        Some(path) => {
            config::set_tracking_level(TrackingLevel::Trace);
            Some(LogEmitter::to_file(path, campaign)?)
        }
        None => None,
    };
    if let Some(emitter) = emitter.as_mut() {
        emitter.emit(LogLevel::Info, "run_start")?;
    }

    let runner = TestRunner::new(campaign);
    let mut results = Vec::new();
    for item in loaded {
        for case in &item.set.cases {
            let result = runner.run_case(&item.set.family, case);
            if let Some(emitter) = emitter.as_mut() {
                for record in lifecycle::drain() {
                    emitter.emit_entry(LogEntry::from_lifecycle(&record))?;
                }
                let trace_id = emitter.next_trace_id();
                emitter.emit_entry(LogEntry::from_result(trace_id, &result))?;
            }
            results.push(result);
        }
    }

    let summary = VerificationSummary::from_results(results);
    if let Some(mut emitter) = emitter {
        let entry = LogEntry::new("", LogLevel::Info, "run_end").with_details(serde_json::json!({
            "total": summary.total,
            "passed": summary.passed,
            "failed": summary.failed,
        }));
        emitter.emit_entry(entry)?;
        emitter.flush()?;
    }

    Ok(ConformanceReport {
        title: format!("pyrt conformance: {campaign}"),
        timestamp: now_utc(),
        fixtures: loaded.iter().map(|l| l.digest.clone()).collect(),
        summary,
    })
}

fn finish(
    report: &ConformanceReport,
    output: Option<&Path>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if let Some(path) = output {
        std::fs::write(path, report.to_markdown())?;
        eprintln!("Report written to {}", path.display());
    }
    for failure in report.summary.results.iter().filter(|r| !r.passed) {
        eprintln!(
            "FAIL {} ({}): expected {:?}, got {:?}",
            failure.case_name, failure.function, failure.expected, failure.actual
        );
    }
    eprintln!(
        "{} cases, {} passed, {} failed",
        report.summary.total, report.summary.passed, report.summary.failed
    );
    Ok(if report.summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Verify {
            fixture,
            report,
            log,
        } => {
            eprintln!("Verifying against fixtures in {}", fixture.display());
            let loaded = load_dir(&fixture)?;
            let result = run("fixture-verify", &loaded, log.as_deref())?;
            finish(&result, report.as_deref())
        }
        Command::Selftest { log } => {
            let loaded = load_builtin()?;
            let result = run("selftest", &loaded, log.as_deref())?;
            finish(&result, None)
        }
    }
}
