//! Workspace automation tasks.
//!
//! Run with: `cargo xtask <command>`

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

const CRATE_PREFIX: &str = "xalo-";
const OPENAPI_OUT: &str = "crates/xalo-api/openapi.json";

#[derive(Parser)]
#[command(name = "xtask", about = "Xalo workspace automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all CI checks locally
    Ci,
    /// Validate workspace conventions
    Lint,
    /// Generate coverage report
    Coverage,
    /// Regenerate the OpenAPI document
    Openapi,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci => run_ci(),
        Commands::Lint => run_lint(),
        Commands::Coverage => run_coverage(),
        Commands::Openapi => run_openapi(),
    }
}

fn run_ci() -> Result<()> {
    println!("Running CI checks...\n");

    run_lint()?;
    run_cmd("cargo", &["fmt", "--check"])?;
    run_cmd("cargo", &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])?;
    run_cmd("cargo", &["test", "--workspace"])?;
    run_cmd("cargo", &["doc", "--workspace", "--no-deps"])?;

    println!("\nAll CI checks passed!");
    Ok(())
}

fn run_lint() -> Result<()> {
    println!("Validating workspace conventions...\n");

    for entry in std::fs::read_dir("crates").context("read crates/")? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(CRATE_PREFIX) {
            anyhow::bail!("Crate '{name}' does not follow {CRATE_PREFIX}* naming");
        }
        check_manifest(&entry.path().join("Cargo.toml"), &name)?;
    }

    println!("All conventions validated!");
    Ok(())
}

/// Every member inherits workspace lints and the shared package metadata.
fn check_manifest(path: &Path, name: &str) -> Result<()> {
    let manifest = std::fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    for required in ["[lints]\nworkspace = true", "version.workspace = true"] {
        if !manifest.contains(required) {
            anyhow::bail!("Crate '{name}' manifest is missing `{}`", required.replace('\n', " "));
        }
    }
    Ok(())
}

fn run_coverage() -> Result<()> {
    run_cmd("cargo", &["llvm-cov", "--workspace", "--html"])?;
    println!("\nCoverage report: target/llvm-cov/html/index.html");
    Ok(())
}

fn run_openapi() -> Result<()> {
    println!("$ cargo run -q -p xalo-api --bin gen_openapi > {OPENAPI_OUT}");
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "xalo-api", "--bin", "gen_openapi"])
        .output()
        .context("Failed to run gen_openapi")?;
    if !output.status.success() {
        anyhow::bail!(
            "gen_openapi failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    std::fs::write(OPENAPI_OUT, &output.stdout).with_context(|| format!("write {OPENAPI_OUT}"))?;
    println!("Wrote {OPENAPI_OUT}");
    Ok(())
}

fn run_cmd(cmd: &str, args: &[&str]) -> Result<()> {
    println!("$ {} {}", cmd, args.join(" "));
    let status = Command::new(cmd)
        .args(args)
        .status()
        .with_context(|| format!("Failed to run: {} {}", cmd, args.join(" ")))?;

    if !status.success() {
        anyhow::bail!("Command failed: {} {}", cmd, args.join(" "));
    }
    Ok(())
}
