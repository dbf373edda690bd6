use crate::config::DeploymentConfig;
use crate::error::{CreditError, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command as TokioCommand;
use tracing::{info, warn};

/// A pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Check the configuration
    Validate,
    /// Build the artifact
    Build,
    /// Run the test suite
    Test,
    /// Package the built artifact
    Package,
    /// Upload the package
    Upload,
    /// Tag the release
    Tag,
}

impl Stage {
    /// Every stage in execution order
    pub const ALL: [Stage; 6] = [
        Stage::Validate,
        Stage::Build,
        Stage::Test,
        Stage::Package,
        Stage::Upload,
        Stage::Tag,
    ];

    /// Lowercase stage name
    pub fn name(self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Build => "build",
            Stage::Test => "test",
            Stage::Package => "package",
            Stage::Upload => "upload",
            Stage::Tag => "tag",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Executes one stage
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Runs `stage`, returning an error to halt the pipeline
    async fn run(&self, stage: Stage) -> Result<()>;
}

/// Runs the configured shell commands
pub struct CommandRunner {
    config: DeploymentConfig,
    artifact: String,
    working_dir: PathBuf,
}

impl CommandRunner {
    /// Creates a runner for `artifact`, executing commands in `working_dir`
    pub fn new(config: DeploymentConfig, artifact: &str, working_dir: PathBuf) -> Self {
        Self {
            config,
            artifact: artifact.to_string(),
            working_dir,
        }
    }

    /// Tag created by the tag stage
    pub fn tag_name(&self) -> String {
        format!("{}{}", self.config.tag_prefix, self.artifact)
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("artifact", self.artifact.as_str()),
            ("deployment.build_command", self.config.build_command.as_str()),
            ("deployment.test_command", self.config.test_command.as_str()),
            ("deployment.upload_repository", self.config.upload_repository.as_str()),
            ("deployment.upload_command", self.config.upload_command.as_str()),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(pipeline_error(Stage::Validate, format!("{} must not be empty", name)));
            }
        }
        if !self.working_dir.is_dir() {
            return Err(pipeline_error(
                Stage::Validate,
                format!("{} is not a directory", self.working_dir.display()),
            ));
        }
        Ok(())
    }

    async fn shell(&self, stage: Stage, command: &str) -> Result<()> {
        if command.trim().is_empty() {
            info!(stage = %stage, "no command configured, skipping");
            return Ok(());
        }
        info!(stage = %stage, command, "running");

        let output = TokioCommand::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .env("AUTOCREDIT_ARTIFACT", &self.artifact)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| pipeline_error(stage, format!("failed to spawn `{}`: {}", command, e)))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        Err(pipeline_error(
            stage,
            format!("`{}` exited with {}: {}", command, output.status, tail.join("\n")),
        ))
    }
}

#[async_trait]
impl StageRunner for CommandRunner {
    async fn run(&self, stage: Stage) -> Result<()> {
        match stage {
            Stage::Validate => self.validate(),
            Stage::Build => self.shell(stage, &self.config.build_command).await,
            Stage::Test => self.shell(stage, &self.config.test_command).await,
            Stage::Package => self.shell(stage, &self.config.package_command).await,
            Stage::Upload => {
                let command = self
                    .config
                    .upload_command
                    .replace("{repository}", &self.config.upload_repository);
                self.shell(stage, &command).await
            }
            Stage::Tag => {
                if !self.config.auto_tag {
                    info!("auto tagging disabled");
                    return Ok(());
                }
                let command = format!("git tag {}", self.tag_name());
                self.shell(stage, &command).await
            }
        }
    }
}

fn pipeline_error(stage: Stage, message: String) -> CreditError {
    CreditError::Pipeline {
        stage: stage.name().to_string(),
        message,
    }
}

/// Runs validate → build → test → package → upload → tag in order
///
/// The first failing stage stops the run; nothing is rolled back.
pub struct DeploymentPipeline<R: StageRunner> {
    runner: R,
}

impl<R: StageRunner> DeploymentPipeline<R> {
    /// Creates a pipeline around `runner`
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Runs the pipeline, returning the stages that completed
    pub async fn run(&self) -> Result<Vec<Stage>> {
        self.run_with(|_| {}).await
    }

    /// Runs the pipeline, calling `on_stage` before each stage starts
    pub async fn run_with<F>(&self, mut on_stage: F) -> Result<Vec<Stage>>
    where
        F: FnMut(Stage) + Send,
    {
        let mut completed = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            on_stage(stage);
            if let Err(e) = self.runner.run(stage).await {
                warn!(stage = %stage, error = %e, "deployment halted");
                return Err(e);
            }
            completed.push(stage);
        }
        info!("deployment finished");
        Ok(completed)
    }
}
