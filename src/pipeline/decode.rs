// Decode stage
//
// Owns the decoder process and its read thread. The decoder emits exactly
// `frame_count` contiguous frames of `frame_size` bytes on its output
// stream with no inter-frame delimiters; the only way to detect frame
// boundaries is to count bytes. A short read means the process died early
// and is reported with the number of complete frames actually produced,
// never padded over.

use std::io::Read;
use std::process::Command;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;

use super::process::{log_diagnostics, ExternalProcess, StageName};
use super::queue::FrameMessage;
use super::PipelineError;

/// Grace period for the decoder to exit after its last frame was read
const DECODER_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DecodeStage {
    process: ExternalProcess,
    frame_size: usize,
    frame_count: u64,
    queue: Sender<FrameMessage>,
}

impl DecodeStage {
    pub fn spawn(
        cmd: &mut Command,
        frame_size: usize,
        frame_count: u64,
        queue: Sender<FrameMessage>,
    ) -> Result<Self, PipelineError> {
        let process = ExternalProcess::spawn(StageName::Decoder, cmd)?;
        Ok(Self {
            process,
            frame_size,
            frame_count,
            queue,
        })
    }

    /// Start the read loop on its own thread. The thread's result is the
    /// number of frames pushed to the queue.
    pub fn start(self) -> JoinHandle<Result<u64, PipelineError>> {
        std::thread::Builder::new()
            .name("decode-read".into())
            .spawn(move || self.run())
            .expect("failed to spawn decode thread")
    }

    fn run(mut self) -> Result<u64, PipelineError> {
        let mut stdout = self
            .process
            .take_stdout()
            .ok_or(PipelineError::MissingStream {
                stage: StageName::Decoder,
                stream: "stdout",
            })?;
        if let Some(stderr) = self.process.take_stderr() {
            log_diagnostics(StageName::Decoder, stderr);
        }

        for no in 0..self.frame_count {
            let mut frame = vec![0u8; self.frame_size];
            match stdout.read_exact(&mut frame) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(PipelineError::TruncatedStream {
                        stage: StageName::Decoder,
                        produced: no,
                        expected: self.frame_count,
                    });
                }
                Err(source) => {
                    return Err(PipelineError::Io {
                        stage: StageName::Decoder,
                        source,
                    });
                }
            }
            // blocks when 22 frames are in flight; that is the backpressure
            self.queue
                .send(FrameMessage::Frame(frame))
                .map_err(|_| PipelineError::Disconnected {
                    stage: StageName::Decoder,
                })?;
        }

        self.queue
            .send(FrameMessage::End)
            .map_err(|_| PipelineError::Disconnected {
                stage: StageName::Decoder,
            })?;
        log::debug!("decoder pushed {} frames", self.frame_count);

        // Drop kills the process if it lingers past the grace period
        let _ = self.process.wait_timeout(DECODER_EXIT_TIMEOUT);
        Ok(self.frame_count)
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::pipeline::queue::frame_queue;
    use std::process::Stdio;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    #[test]
    fn pushes_exact_frames_then_end() {
        let (tx, rx) = frame_queue();
        // 5 frames of 8 bytes
        let stage = DecodeStage::spawn(&mut sh("head -c 40 /dev/zero"), 8, 5, tx).unwrap();
        let handle = stage.start();
        let mut frames = 0;
        loop {
            match rx.recv().unwrap() {
                FrameMessage::Frame(data) => {
                    assert_eq!(data.len(), 8);
                    frames += 1;
                }
                FrameMessage::End => break,
            }
        }
        assert_eq!(frames, 5);
        assert_eq!(handle.join().unwrap().unwrap(), 5);
    }

    #[test]
    fn short_stream_is_a_truncation_error() {
        let (tx, rx) = frame_queue();
        // only 3.5 of the expected 5 frames
        let stage = DecodeStage::spawn(&mut sh("head -c 28 /dev/zero"), 8, 5, tx).unwrap();
        let handle = stage.start();
        let err = handle.join().unwrap().unwrap_err();
        match err {
            PipelineError::TruncatedStream {
                stage,
                produced,
                expected,
            } => {
                assert_eq!(stage, StageName::Decoder);
                assert_eq!(produced, 3);
                assert_eq!(expected, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
        // the complete frames were still forwarded
        assert_eq!(rx.iter().count(), 3);
    }
}
