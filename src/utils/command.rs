// dbbackup/src/utils/command.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::find_executable;

/// An external tool call: program name, argument list, extra environment.
/// Never goes through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl ToolInvocation {
    pub fn new(program: &str) -> Self {
        ToolInvocation {
            program: program.to_string(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Program and arguments for logs. Environment values are left out.
    pub fn describe(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs dump and restore tools with one end of the pipe attached to a file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the tool with its stdout written into `output`.
    async fn run_with_stdout_to(&self, invocation: &ToolInvocation, output: File) -> Result<CommandOutcome>;

    /// Runs the tool with its stdin read from `input`.
    async fn run_with_stdin_from(&self, invocation: &ToolInvocation, input: File) -> Result<CommandOutcome>;
}

/// Spawns real child processes, killing them once `timeout` elapses.
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, invocation: &ToolInvocation, stdin: Stdio, stdout: Stdio) -> Result<CommandOutcome> {
        let program = find_executable(&invocation.program)?;
        debug!(command = %invocation.describe(), "spawning external tool");

        let child = Command::new(&program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to execute {}", program.display()))?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "{} did not finish within {}s and was killed",
                    invocation.program,
                    self.timeout.as_secs()
                )
            })?
            .with_context(|| format!("Failed to wait for {}", invocation.program))?;

        Ok(CommandOutcome {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run_with_stdout_to(&self, invocation: &ToolInvocation, output: File) -> Result<CommandOutcome> {
        self.run(invocation, Stdio::null(), Stdio::from(output)).await
    }

    async fn run_with_stdin_from(&self, invocation: &ToolInvocation, input: File) -> Result<CommandOutcome> {
        self.run(invocation, Stdio::from(input), Stdio::null()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn describe_omits_environment() {
        let invocation = ToolInvocation::new("pg_dump")
            .arg("-h")
            .arg("db")
            .env("PGPASSWORD", "hunter2");
        assert_eq!(invocation.describe(), "pg_dump -h db");
        assert!(!invocation.describe().contains("hunter2"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdout_is_redirected_into_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.sql");
        let runner = ProcessRunner::new(Duration::from_secs(10));

        let outcome = runner
            .run_with_stdout_to(&ToolInvocation::new("echo").arg("select 1;"), File::create(&path)?)
            .await?;

        assert!(outcome.success());
        assert_eq!(std::fs::read_to_string(&path)?, "select 1;\n");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdin_is_fed_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("in.sql");
        File::create(&path)?.write_all(b"payload")?;
        let runner = ProcessRunner::new(Duration::from_secs(10));

        let outcome = runner
            .run_with_stdin_from(&ToolInvocation::new("cat"), File::open(&path)?)
            .await?;

        assert!(outcome.success());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_reported() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = ProcessRunner::new(Duration::from_secs(10));

        let outcome = runner
            .run_with_stdout_to(&ToolInvocation::new("false"), File::create(dir.path().join("x"))?)
            .await?;

        assert!(!outcome.success());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_is_killed_after_timeout() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = ProcessRunner::new(Duration::from_millis(200));

        let result = runner
            .run_with_stdout_to(&ToolInvocation::new("sleep").arg("5"), File::create(dir.path().join("x"))?)
            .await;

        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn missing_program_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = ProcessRunner::new(Duration::from_secs(1));
        let result = runner
            .run_with_stdout_to(
                &ToolInvocation::new("definitely-not-a-real-dump-tool"),
                File::create(dir.path().join("x"))?,
            )
            .await;
        assert!(result.is_err());
        Ok(())
    }
}
