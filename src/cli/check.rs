use super::base_dir;
use crate::infra::{DEFAULT_ENV_FILE, EnvFile};
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CheckOptions {
    /// Environment file (TOML, or YAML by extension)
    #[arg(short, long, env = "TESTENV_FILE", default_value = DEFAULT_ENV_FILE)]
    pub file: PathBuf,
}

/// Parse and validate the file without touching the engine
pub fn run(options: CheckOptions) -> Result<()> {
    let file = EnvFile::load(&options.file)?;
    file.plan(base_dir(&options.file))?;

    for line in summary(&file) {
        println!("{line}");
    }
    println!("✅ {} is valid", options.file.display());
    Ok(())
}

fn summary(file: &EnvFile) -> Vec<String> {
    let names = |keys: Vec<&String>| {
        if keys.is_empty() {
            "-".to_string()
        } else {
            keys.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ")
        }
    };

    vec![
        format!("project networks:     {}", names(file.networks.keys().collect())),
        format!("project containers:   {}", names(file.containers.keys().collect())),
        format!("test case networks:   {}", names(file.test_case.networks.keys().collect())),
        format!("test case containers: {}", names(file.test_case.containers.keys().collect())),
        format!("variables:            {}", names(file.variables.keys().collect())),
        format!("free ports:           {}", names(file.free_ports.iter().collect())),
    ]
}
