use super::{base_dir, published_ports};
use crate::domain::EngineClient;
use crate::infra::{DEFAULT_ENV_FILE, EnvFile};
use crate::services::{ProjectEnv, TestCaseEnv};
use anyhow::{Context, Result, anyhow};
use clap::Args;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct UpOptions {
    /// Environment file (TOML, or YAML by extension)
    #[arg(short, long, env = "TESTENV_FILE", default_value = DEFAULT_ENV_FILE)]
    pub file: PathBuf,

    /// Number of test case environments to provision next to the project
    #[arg(long, default_value_t = 1)]
    pub test_cases: usize,

    /// Tear everything down right after provisioning instead of waiting for Enter
    #[arg(long)]
    pub no_wait: bool,
}

pub fn run(options: UpOptions, engine: Arc<dyn EngineClient>) -> Result<()> {
    let file = EnvFile::load(&options.file)?;
    let plan = file.plan(base_dir(&options.file))?;
    let project = plan.into_project(engine)?;

    let result = provision(&project, &options);

    info!("Closing project environment");
    let closed = project.close().context("closing project environment");

    result.and(closed)
}

fn provision(project: &ProjectEnv, options: &UpOptions) -> Result<()> {
    project.run().context("running project environment")?;
    print_section("project", project);

    let test_cases: Vec<TestCaseEnv<'_>> = (0..options.test_cases)
        .map(|_| project.new_test_case())
        .collect();

    let mut result = run_test_cases(&test_cases);

    if result.is_ok() {
        for (i, test_case) in test_cases.iter().enumerate() {
            println!("\n🧪 test case #{i}");
            for line in published_ports(&test_case.containers()) {
                println!("  {line}");
            }
        }

        if !options.no_wait {
            result = wait_for_enter();
        }
    }

    for (i, test_case) in test_cases.iter().enumerate() {
        if let Err(e) = test_case.close() {
            // left tracked, the project close retries it
            warn!("Failed to close test case #{i}: {e}");
        }
    }

    result
}

/// Run every test case on its own thread; the first failure wins
fn run_test_cases(test_cases: &[TestCaseEnv<'_>]) -> Result<()> {
    thread::scope(|s| {
        let handles: Vec<_> = test_cases
            .iter()
            .map(|test_case| s.spawn(move || test_case.run()))
            .collect();

        let mut result = Ok(());
        for (i, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.join() {
                Ok(outcome) => outcome.with_context(|| format!("running test case #{i}")),
                Err(_) => Err(anyhow!("test case #{i} panicked while running")),
            };
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    })
}

fn print_section(label: &str, project: &ProjectEnv) {
    println!("\n📦 {label}");
    for line in published_ports(&project.containers()) {
        println!("  {line}");
    }
}

fn wait_for_enter() -> Result<()> {
    println!("\nEnvironment is up. Press Enter to tear it down.");
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading from stdin")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockEngine;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join(DEFAULT_ENV_FILE);
        fs::write(&path, content).unwrap();
        path
    }

    fn options(file: PathBuf, test_cases: usize) -> UpOptions {
        UpOptions {
            file,
            test_cases,
            no_wait: true,
        }
    }

    const ENV: &str = r#"
[networks.n1]

[containers.c1]
image = "alpine:latest"
exposed_ports = ["9999"]
networks = [{ project = "n1" }]

[test_case.networks.private]

[test_case.containers.worker]
image = "alpine:latest"
networks = [{ test_case = "private" }, { project = "n1" }]
"#;

    #[test]
    fn up_provisions_and_tears_down_everything() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(MockEngine::new());

        run(options(write_file(&dir, ENV), 3), engine.clone()).unwrap();

        // one project container plus one per test case
        assert_eq!(engine.created_containers().len(), 4);
        assert_eq!(engine.created_networks().len(), 4);
        assert_eq!(engine.live_containers(), 0);
        assert_eq!(engine.live_networks(), 0);
    }

    #[test]
    fn failed_project_run_still_cleans_up() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(MockEngine::new());
        engine.set_fail_on("start_container");

        let err = run(options(write_file(&dir, ENV), 1), engine.clone()).unwrap_err();

        assert!(format!("{err:#}").contains("running project environment"));
        assert_eq!(engine.live_containers(), 0);
        assert_eq!(engine.live_networks(), 0);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(MockEngine::new());
        let err = run(options(dir.path().join("absent.toml"), 1), engine).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
