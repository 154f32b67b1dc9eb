// Encode stage
//
// Pulls filtered frames off its queue and writes them to the encoder
// process. The end marker closes the encoder's input exactly once, then
// the process gets a bounded grace period to flush container trailers
// and exit.

use std::io::Write;
use std::process::Command;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;

use super::process::{log_diagnostics, ExternalProcess, StageName};
use super::queue::FrameMessage;
use super::PipelineError;

pub struct EncodeStage {
    process: ExternalProcess,
    queue: Receiver<FrameMessage>,
    exit_timeout: Duration,
}

impl EncodeStage {
    pub fn spawn(
        cmd: &mut Command,
        queue: Receiver<FrameMessage>,
        exit_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let process = ExternalProcess::spawn(StageName::Encoder, cmd)?;
        Ok(Self {
            process,
            queue,
            exit_timeout,
        })
    }

    /// Start the writer thread. Its result is the number of chunks
    /// written, available once the encoder has exited.
    pub fn start(self) -> JoinHandle<Result<u64, PipelineError>> {
        std::thread::Builder::new()
            .name("encode-write".into())
            .spawn(move || self.run())
            .expect("failed to spawn encoder thread")
    }

    fn run(mut self) -> Result<u64, PipelineError> {
        let mut stdin = self
            .process
            .take_stdin()
            .ok_or(PipelineError::MissingStream {
                stage: StageName::Encoder,
                stream: "stdin",
            })?;
        if let Some(stderr) = self.process.take_stderr() {
            log_diagnostics(StageName::Encoder, stderr);
        }

        let mut written: u64 = 0;
        loop {
            match self.queue.recv() {
                Ok(FrameMessage::Frame(frame)) => {
                    stdin.write_all(&frame).map_err(|e| {
                        if e.kind() == std::io::ErrorKind::BrokenPipe {
                            PipelineError::BrokenPipe {
                                stage: StageName::Encoder,
                            }
                        } else {
                            PipelineError::Io {
                                stage: StageName::Encoder,
                                source: e,
                            }
                        }
                    })?;
                    written += 1;
                }
                Ok(FrameMessage::End) => break,
                Err(_) => {
                    return Err(PipelineError::Disconnected {
                        stage: StageName::Encoder,
                    })
                }
            }
        }
        log::debug!("encoder received {written} chunks, closing its input");
        drop(stdin);

        match self.process.wait_timeout(self.exit_timeout) {
            Ok(Some(status)) if status.success() => Ok(written),
            Ok(Some(status)) => Err(PipelineError::Failed {
                stage: StageName::Encoder,
                status,
            }),
            Ok(None) => {
                self.process.kill();
                Err(PipelineError::DrainTimeout {
                    stage: StageName::Encoder,
                    timeout: self.exit_timeout,
                })
            }
            Err(source) => Err(PipelineError::Io {
                stage: StageName::Encoder,
                source,
            }),
        }
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::pipeline::queue::frame_queue;
    use std::io::Read;
    use std::process::Stdio;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    #[test]
    fn writes_frames_and_exits_after_end_marker() {
        let mut cmd = sh("cat");
        let (tx, rx) = frame_queue();
        let mut stage = EncodeStage::spawn(&mut cmd, rx, Duration::from_secs(5)).unwrap();
        let mut stdout = stage.process.take_stdout().unwrap();
        let handle = stage.start();

        tx.send(FrameMessage::Frame(vec![7u8; 24])).unwrap();
        tx.send(FrameMessage::Frame(vec![9u8; 24])).unwrap();
        tx.send(FrameMessage::End).unwrap();

        let mut all = Vec::new();
        stdout.read_to_end(&mut all).unwrap();
        assert_eq!(all.len(), 48);
        assert_eq!(handle.join().unwrap().unwrap(), 2);
    }

    #[test]
    fn failing_encoder_is_reported() {
        let mut cmd = sh("cat > /dev/null; exit 3");
        let (tx, rx) = frame_queue();
        let stage = EncodeStage::spawn(&mut cmd, rx, Duration::from_secs(5)).unwrap();
        let handle = stage.start();
        tx.send(FrameMessage::End).unwrap();
        assert!(matches!(
            handle.join().unwrap().unwrap_err(),
            PipelineError::Failed {
                stage: StageName::Encoder,
                ..
            }
        ));
    }

    #[test]
    fn lingering_encoder_is_killed_after_the_grace_period() {
        let mut cmd = sh("cat > /dev/null; sleep 30");
        let (tx, rx) = frame_queue();
        let stage = EncodeStage::spawn(&mut cmd, rx, Duration::from_millis(300)).unwrap();
        let handle = stage.start();
        tx.send(FrameMessage::End).unwrap();
        assert!(matches!(
            handle.join().unwrap().unwrap_err(),
            PipelineError::DrainTimeout {
                stage: StageName::Encoder,
                ..
            }
        ));
    }

    #[test]
    fn dropped_sender_is_a_disconnect() {
        let mut cmd = sh("cat");
        let (tx, rx) = frame_queue();
        let stage = EncodeStage::spawn(&mut cmd, rx, Duration::from_secs(5)).unwrap();
        let handle = stage.start();
        drop(tx);
        assert!(matches!(
            handle.join().unwrap().unwrap_err(),
            PipelineError::Disconnected {
                stage: StageName::Encoder
            }
        ));
    }
}
