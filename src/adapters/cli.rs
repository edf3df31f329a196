//! Runs the review CLI as a child process.
//!
//! The prompt is passed via `--prompt` first; tools that reject the flag
//! get the same text piped through stdin instead. Each attempt, stdin
//! write included, runs under the configured timeout, and a timeout
//! always aborts without falling back.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::adapters::tool::ReviewTool;
use crate::config::Config;
use crate::core::error::{Error, Result};
use crate::core::prompt;

#[derive(Debug)]
pub struct CliReviewTool {
    program: String,
    base_args: Vec<String>,
    timeout: Duration,
    api_key: Option<(String, String)>,
}

impl CliReviewTool {
    /// Splits the configured command shell-style, so values like
    /// `"gemini --model gemini-2.5-pro"` work without an actual shell.
    pub fn from_config(config: &Config, api_key: Option<(String, String)>) -> Result<Self> {
        let argv = shell_words::split(&config.command).map_err(|err| {
            Error::Config(format!(
                "invalid review command {:?}: {}",
                config.command, err
            ))
        })?;

        let mut parts = argv.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("review command is empty".to_string()))?;

        Ok(Self {
            program,
            base_args: parts.collect(),
            timeout: Duration::from_secs(config.timeout_secs),
            api_key,
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args);
        if let Some((name, value)) = &self.api_key {
            cmd.env(name, value);
        }
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run_with_arg(&self, full_prompt: &str) -> Result<ToolOutput> {
        let mut cmd = self.command();
        cmd.arg("--prompt").arg(full_prompt).stdin(Stdio::null());

        let child = cmd.spawn().map_err(|err| self.spawn_error(err))?;
        self.wait(child.wait_with_output()).await
    }

    async fn run_with_stdin(&self, full_prompt: &str) -> Result<ToolOutput> {
        let mut cmd = self.command();
        cmd.stdin(Stdio::piped());

        let mut child = cmd.spawn().map_err(|err| self.spawn_error(err))?;
        let stdin = child.stdin.take();

        // Feed the prompt while collecting output, all inside the timeout.
        // A prompt larger than the pipe buffer would otherwise block the
        // write for as long as the child refuses to drain it.
        self.wait(async move {
            let feed = async {
                if let Some(mut stdin) = stdin {
                    // The child may exit without reading the prompt; its
                    // exit status carries the outcome, not this write.
                    let _ = stdin.write_all(full_prompt.as_bytes()).await;
                    // Dropping stdin closes the pipe so the child sees EOF.
                }
            };
            let (_, output) = tokio::join!(feed, child.wait_with_output());
            output
        })
        .await
    }

    /// Bounds the whole attempt by the configured timeout.
    async fn wait<F>(&self, running: F) -> Result<ToolOutput>
    where
        F: Future<Output = std::io::Result<std::process::Output>>,
    {
        let output = tokio::time::timeout(self.timeout, running)
            .await
            .map_err(|_| {
                Error::ToolInvocation(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|err| {
                Error::ToolInvocation(format!("failed to run {}: {}", self.program, err))
            })?;

        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    fn spawn_error(&self, err: std::io::Error) -> Error {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::ToolInvocation(format!(
                "{} not found on PATH; is the review CLI installed?",
                self.program
            ))
        } else {
            Error::ToolInvocation(format!("failed to spawn {}: {}", self.program, err))
        }
    }
}

struct ToolOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

#[async_trait]
impl ReviewTool for CliReviewTool {
    async fn review(&self, prompt_text: &str, diff: &str) -> Result<String> {
        let full = prompt::full_prompt(prompt_text, diff);

        debug!("Running {} with --prompt", self.program);
        let first = self.run_with_arg(&full).await?;
        if first.success {
            return non_empty(first.stdout);
        }

        warn!(
            "{} rejected --prompt ({}); retrying via stdin",
            self.program,
            diagnostic(&first.stderr)
        );
        let second = self.run_with_stdin(&full).await?;
        if second.success {
            return non_empty(second.stdout);
        }

        let detail = if second.stderr.is_empty() {
            first.stderr
        } else {
            second.stderr
        };
        Err(Error::ToolInvocation(format!(
            "{} failed: {}",
            self.program,
            diagnostic(&detail)
        )))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

fn non_empty(stdout: String) -> Result<String> {
    if stdout.is_empty() {
        Err(Error::EmptyResult)
    } else {
        Ok(stdout)
    }
}

fn diagnostic(stderr: &str) -> &str {
    if stderr.is_empty() {
        "no error output"
    } else {
        stderr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(command: &str, timeout_secs: u64) -> CliReviewTool {
        let config = Config {
            command: command.to_string(),
            timeout_secs,
            ..Config::default()
        };
        CliReviewTool::from_config(&config, None).unwrap()
    }

    #[test]
    fn splits_command_into_program_and_args() {
        let t = tool("gemini --model gemini-2.5-pro", 120);
        assert_eq!(t.program, "gemini");
        assert_eq!(t.base_args, vec!["--model", "gemini-2.5-pro"]);
    }

    #[test]
    fn empty_command_is_rejected() {
        let config = Config {
            command: "   ".to_string(),
            ..Config::default()
        };
        let err = CliReviewTool::from_config(&config, None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        let config = Config {
            command: "gemini --model 'oops".to_string(),
            ..Config::default()
        };
        let err = CliReviewTool::from_config(&config, None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        #[tokio::test]
        async fn captures_stdout_on_success() {
            let review = tool("echo", 10)
                .review("Review this.", "+ let x = 1;")
                .await
                .unwrap();

            assert!(review.contains("Review this."));
            assert!(review.contains("+ let x = 1;"));
        }

        #[tokio::test]
        async fn missing_binary_is_a_tool_error() {
            let err = tool("glreview-no-such-binary", 10)
                .review("p", "d")
                .await
                .unwrap_err();

            assert!(matches!(err, Error::ToolInvocation(_)));
            assert!(err.to_string().contains("not found"));
        }

        #[tokio::test]
        async fn nonzero_exit_on_both_attempts_is_a_tool_error() {
            let err = tool("false", 10).review("p", "d").await.unwrap_err();
            assert!(matches!(err, Error::ToolInvocation(_)));
        }

        #[tokio::test]
        async fn blank_output_is_an_empty_result() {
            let err = tool("true", 10).review("p", "d").await.unwrap_err();
            assert!(matches!(err, Error::EmptyResult));
        }

        #[tokio::test]
        async fn falls_back_to_stdin_when_the_flag_is_rejected() {
            // cat exits non-zero on --prompt, then echoes stdin back.
            let review = tool("cat", 10)
                .review("Instructions here.", "+ diff line")
                .await
                .unwrap();

            assert!(review.contains("Instructions here."));
            assert!(review.contains("+ diff line"));
        }

        #[tokio::test]
        async fn times_out_without_falling_back() {
            let err = tool("sh -c 'sleep 5'", 1).review("p", "d").await.unwrap_err();

            assert!(matches!(err, Error::ToolInvocation(_)));
            assert!(err.to_string().contains("timed out"));
        }

        #[tokio::test]
        async fn times_out_while_feeding_stdin() {
            // Exits 1 in arg mode, then sleeps without reading stdin; a
            // prompt larger than the pipe buffer keeps the write pending.
            let t = tool(
                r#"sh -c 'case "$0" in --prompt) exit 1;; esac; sleep 30'"#,
                1,
            );
            let big_diff = "+ let x = 1;\n".repeat(8_000);

            let started = std::time::Instant::now();
            let err = t.review("p", &big_diff).await.unwrap_err();

            assert!(matches!(err, Error::ToolInvocation(_)));
            assert!(err.to_string().contains("timed out"));
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn api_key_is_injected_into_the_child_environment() {
            let config = Config {
                command: r#"sh -c 'printf "%s" "$GLREVIEW_TEST_KEY"'"#.to_string(),
                timeout_secs: 10,
                ..Config::default()
            };
            let t = CliReviewTool::from_config(
                &config,
                Some(("GLREVIEW_TEST_KEY".to_string(), "sekrit".to_string())),
            )
            .unwrap();

            let review = t.review("p", "d").await.unwrap();
            assert_eq!(review, "sekrit");
        }
    }
}
