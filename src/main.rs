use anyhow::{bail, Context};
use autocredit::{
    config::Config,
    deploy::{CommandRunner, DeploymentPipeline},
    discovery::{self, DiscoveredDependencies},
    logging, CreditOrchestrator, CreditReport, CreditResult,
};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (JSON or TOML) merged over the defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the repositories and packages used by a source tree
    Deps {
        /// Source tree to scan
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },
    /// Credit every dependency of a source tree, or the given identifiers
    Credit {
        /// Source tree to scan when no identifiers are given
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
        /// Repository to credit (owner/name), repeatable
        #[arg(long = "repo")]
        repos: Vec<String>,
        /// Package to credit, repeatable
        #[arg(long = "package")]
        packages: Vec<String>,
    },
    /// Run the deployment pipeline
    Deploy {
        /// Name of the artifact being deployed
        #[arg(short, long)]
        artifact: String,
        /// Directory the pipeline commands run in
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let config = Config::resolve(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Deps { path } => {
            let found = discover(&path, &config)?;
            print_dependencies(&found);
        }
        Command::Credit { path, repos, packages } => {
            let (repos, packages) = if repos.is_empty() && packages.is_empty() {
                let found = discover(&path, &config)?;
                (found.repositories.into_iter().collect(), found.packages.into_iter().collect())
            } else {
                (repos, packages)
            };
            run_credit(&config, repos, packages).await?;
        }
        Command::Deploy { artifact, dir } => run_deploy(&config, &artifact, dir).await?,
    }

    Ok(())
}

fn discover(path: &Path, config: &Config) -> anyhow::Result<DiscoveredDependencies> {
    discovery::discover(path, config.crediting.skip_standard_library)
        .with_context(|| format!("failed to scan {}", path.display()))
}

fn print_dependencies(found: &DiscoveredDependencies) {
    println!("{}", "Repositories:".bright_yellow().bold());
    for repo in &found.repositories {
        println!("  {}", repo);
    }
    println!("{}", "Packages:".bright_yellow().bold());
    for package in &found.packages {
        println!("  {}", package);
    }
}

async fn run_credit(config: &Config, repos: Vec<String>, packages: Vec<String>) -> anyhow::Result<()> {
    let orchestrator = CreditOrchestrator::new(config)?;

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight steps");
            cancel.cancel();
        }
    });

    let report = orchestrator.auto_credit(repos, packages).await;
    print_report(&report);

    let duplicates = orchestrator.ledger().duplicates().await;
    if !duplicates.is_empty() {
        println!("\n{}", "Duplicate library usage:".bright_yellow().bold());
        for (name, count) in duplicates {
            println!("  {} x{}", name, count);
        }
    }
    Ok(())
}

fn print_report(report: &CreditReport) {
    println!("\n{}", "Credit summary".bright_green().bold());
    for outcome in &report.outcomes {
        let status = match &outcome.result {
            CreditResult::Credited => "credited".green(),
            CreditResult::NotFound => "not found".yellow(),
            CreditResult::Failed(reason) => format!("failed: {}", reason).red(),
        };
        println!("  [{}] {} {}", outcome.kind, outcome.identifier.bright_white(), status);
    }
    println!(
        "{} credited, {} not credited",
        report.credited().count().to_string().green(),
        report.failed().count().to_string().red()
    );
}

async fn run_deploy(config: &Config, artifact: &str, dir: PathBuf) -> anyhow::Result<()> {
    let runner = CommandRunner::new(config.deployment.clone(), artifact, dir);
    let pipeline = DeploymentPipeline::new(runner);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = pipeline
        .run_with(|stage| spinner.set_message(format!("Deploying {}: {}", artifact, stage)))
        .await;

    match result {
        Ok(stages) => {
            spinner.finish_with_message(format!("Deployed {} ({} stages)", artifact, stages.len()));
            Ok(())
        }
        Err(e) => {
            spinner.abandon_with_message(format!("Deployment of {} failed", artifact));
            bail!(e)
        }
    }
}
