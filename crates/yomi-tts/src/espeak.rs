use crate::engine::{check_input_size, Engine};
use crate::error::EngineError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use yomi_types::{AudioFormat, SpeechRequest, SpeechResponse};

/// Timeout for one espeak-ng process.
const ESPEAK_TIMEOUT: Duration = Duration::from_secs(30);

const BASE_WPM: f64 = 175.0;
const MIN_WPM: f64 = 80.0;
const MAX_WPM: f64 = 450.0;

/// Local synthesis through the `espeak-ng` command line tool.
///
/// `espeak-ng --stdout` writes a mono RIFF WAVE file, which is returned
/// unchanged. The text is written to the child's stdin and never appears in
/// argv, so message content cannot be parsed as an option.
#[derive(Debug, Clone)]
pub struct EspeakEngine {
    binary: PathBuf,
}

impl EspeakEngine {
    pub const NAME: &'static str = "espeak";

    pub fn new(binary: impl AsRef<Path>) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
        }
    }

    fn args(request: &SpeechRequest) -> Vec<String> {
        let mut args = vec!["--stdout".to_string(), "--stdin".to_string()];

        let voice = if request.voice_name.is_empty() {
            request.language_code.to_lowercase()
        } else {
            request.voice_name.clone()
        };
        if !voice.is_empty() {
            args.push("-v".to_string());
            args.push(voice);
        }

        if request.speaking_rate > 0.0 {
            let wpm = (BASE_WPM * request.speaking_rate).clamp(MIN_WPM, MAX_WPM);
            args.push("-s".to_string());
            args.push(format!("{}", wpm.round() as u32));
        }

        args
    }
}

#[async_trait]
impl Engine for EspeakEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn generate_speech(
        &self,
        request: &SpeechRequest,
    ) -> Result<SpeechResponse, EngineError> {
        check_input_size(&request.text)?;

        let mut command = Command::new(&self.binary);
        command
            .args(Self::args(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| EngineError::Spawn {
            binary: self.binary.display().to_string(),
            source: e,
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Process("failed to open espeak-ng stdin".to_string()))?;
        let text = request.text.clone();
        // Written on its own task so a full stdout pipe cannot deadlock us.
        // Dropping stdin at the end closes it and ends the input.
        let write_task = tokio::spawn(async move { stdin.write_all(text.as_bytes()).await });

        let output = tokio::time::timeout(ESPEAK_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| EngineError::Timeout(ESPEAK_TIMEOUT))?
            .map_err(|e| EngineError::Process(format!("failed to wait for espeak-ng: {e}")))?;

        let written = write_task.await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Process(format!(
                "espeak-ng exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        match written {
            Ok(Ok(())) => {}
            // The child may exit without draining its input; its exit status
            // and output are what count.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => {
                return Err(EngineError::Process(format!(
                    "failed to write to espeak-ng stdin: {e}"
                )))
            }
            Err(e) => {
                return Err(EngineError::Process(format!(
                    "espeak-ng stdin task failed: {e}"
                )))
            }
        }
        if output.stdout.is_empty() {
            return Err(EngineError::InvalidResponse(
                "espeak-ng produced no audio".to_string(),
            ));
        }

        Ok(SpeechResponse {
            format: AudioFormat::Wav,
            channels: 1,
            audio: output.stdout,
        })
    }
}
