// External process ownership
//
// Thin wrapper around a spawned child: hands out its pipe ends exactly
// once, offers a bounded wait, and guarantees the process does not
// outlive the pipeline run (killed on drop if still running).

use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus};
use std::time::{Duration, Instant};

use super::PipelineError;

/// Pipeline stage names, used in errors and log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageName {
    Decoder,
    Filter,
    Encoder,
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StageName::Decoder => "decoder",
            StageName::Filter => "filter",
            StageName::Encoder => "encoder",
        })
    }
}

/// A spawned external process whose streams are handed to exactly one
/// stage thread each
#[derive(Debug)]
pub struct ExternalProcess {
    name: StageName,
    child: Child,
}

impl ExternalProcess {
    /// Spawn the command; failure to start is a typed pipeline error
    pub fn spawn(name: StageName, cmd: &mut Command) -> Result<Self, PipelineError> {
        let child = cmd
            .spawn()
            .map_err(|source| PipelineError::Spawn { stage: name, source })?;
        log::debug!("{} process spawned (pid {})", name, child.id());
        Ok(Self { name, child })
    }

    /// The writable input stream; callable once
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// The readable output stream; callable once
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// The readable diagnostic stream; callable once
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the process to exit, bounded by `timeout`.
    /// Returns Ok(None) when the deadline passes with the process alive.
    pub fn wait_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Forcibly terminate the process; a no-op when already exited
    pub fn kill(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            log::warn!("killing {} process (pid {})", self.name, self.child.id());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

impl Drop for ExternalProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Forward a diagnostic stream to the log on a dedicated thread, so
/// progress text never stalls a stage's read/write loop. FFmpeg emits
/// progress separated by carriage returns, so both '\r' and '\n' end a
/// line.
pub(crate) fn log_diagnostics<R>(name: StageName, stream: R) -> std::thread::JoinHandle<()>
where
    R: std::io::Read + Send + 'static,
{
    std::thread::Builder::new()
        .name(format!("{name}-diag"))
        .spawn(move || {
            let mut stream = stream;
            let mut pending = String::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                while let Some(pos) = pending.find(['\r', '\n']) {
                    let line: String = pending.drain(..=pos).collect();
                    let line = line.trim();
                    if !line.is_empty() {
                        log::debug!("[{name}] {line}");
                    }
                }
            }
            let line = pending.trim();
            if !line.is_empty() {
                log::debug!("[{name}] {line}");
            }
        })
        .expect("failed to spawn diagnostics thread")
}
