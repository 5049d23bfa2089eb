use super::{GenerateError, TextGenerator};
use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Exit status a generator command uses to ask for a retry (`EX_TEMPFAIL`).
pub const EXIT_TEMPFAIL: i32 = 75;

/// Text generator backed by an external command. The prompt goes to the
/// command's stdin and its stdout is the reply; model, temperature and token
/// limit are passed as `RHYTHM_MODEL`, `RHYTHM_TEMPERATURE` and
/// `RHYTHM_MAX_TOKENS`.
pub struct CommandGenerator {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait(?Send)]
impl TextGenerator for CommandGenerator {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, GenerateError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("RHYTHM_MODEL", model)
            .env("RHYTHM_TEMPERATURE", temperature.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(max_tokens) = max_tokens {
            command.env("RHYTHM_MAX_TOKENS", max_tokens.to_string());
        }

        let mut child = command.spawn().map_err(|e| {
            GenerateError::Transient(format!("spawn {}: {e}", self.program.display()))
        })?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GenerateError::Fatal("generator stdin not captured".into()))?;
        stdin
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| GenerateError::Transient(format!("write prompt: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| GenerateError::Transient(format!("generator i/o: {e}")))?;
        debug!(
            "generator exited with {} ({} bytes)",
            output.status,
            output.stdout.len()
        );

        if output.status.success() {
            return String::from_utf8(output.stdout)
                .map_err(|e| GenerateError::Fatal(format!("reply is not utf-8: {e}")));
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(EXIT_TEMPFAIL) | None => Err(GenerateError::Transient(stderr)),
            Some(code) => Err(GenerateError::Fatal(format!("exit {code}: {stderr}"))),
        }
    }
}
