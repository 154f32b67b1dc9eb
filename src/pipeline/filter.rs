// Filter stage
//
// Owns the vspipe process. Two concurrent duties touch its pipes: the
// feed thread writes frames from the decode queue to stdin and closes it
// on the end marker; the orchestrator drains frame-sized reads from
// stdout. The filter buffers several frames internally, so after stdin
// closes its stdout is read to EOF to collect whatever is still in
// flight, so end of stream is detected rather than guessed at.

use std::io::{Read, Write};
use std::process::{ChildStdout, Command};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use super::process::{log_diagnostics, ExternalProcess, StageName};
use super::queue::FrameMessage;
use super::PipelineError;

/// Shared stage state, readable from the orchestrator
#[derive(Debug, Default)]
struct FilterState {
    ready: bool,
    ended: bool,
    frames_fed: u64,
}

pub struct FilterStage {
    process: ExternalProcess,
    stdout: Option<ChildStdout>,
    state: Arc<Mutex<FilterState>>,
    ready_rx: Receiver<()>,
    ready_tx: Option<Sender<()>>,
}

impl FilterStage {
    /// Spawn the filter process. Spawned before the other stages because
    /// it takes the longest to become usable.
    pub fn spawn(cmd: &mut Command) -> Result<Self, PipelineError> {
        let mut process = ExternalProcess::spawn(StageName::Filter, cmd)?;
        let stdout = process.take_stdout();
        if let Some(stderr) = process.take_stderr() {
            log_diagnostics(StageName::Filter, stderr);
        }
        let (ready_tx, ready_rx) = bounded(1);
        Ok(Self {
            process,
            stdout,
            state: Arc::new(Mutex::new(FilterState::default())),
            ready_rx,
            ready_tx: Some(ready_tx),
        })
    }

    /// Start the feed thread: frames from the queue go to the process
    /// input stream; the end marker closes it, exactly once. The thread's
    /// result is the number of frames fed.
    pub fn start_feed(
        &mut self,
        queue: Receiver<FrameMessage>,
    ) -> Result<JoinHandle<Result<u64, PipelineError>>, PipelineError> {
        let stdin = self
            .process
            .take_stdin()
            .ok_or(PipelineError::MissingStream {
                stage: StageName::Filter,
                stream: "stdin",
            })?;
        let ready = self.ready_tx.take().ok_or(PipelineError::MissingStream {
            stage: StageName::Filter,
            stream: "stdin",
        })?;
        let state = Arc::clone(&self.state);

        let handle = std::thread::Builder::new()
            .name("filter-feed".into())
            .spawn(move || {
                let mut stdin = stdin;
                // streams are attached; signal readiness once
                state.lock().ready = true;
                let _ = ready.send(());

                let mut fed: u64 = 0;
                loop {
                    match queue.recv() {
                        Ok(FrameMessage::Frame(frame)) => {
                            stdin.write_all(&frame).map_err(|e| {
                                if e.kind() == std::io::ErrorKind::BrokenPipe {
                                    PipelineError::BrokenPipe {
                                        stage: StageName::Filter,
                                    }
                                } else {
                                    PipelineError::Io {
                                        stage: StageName::Filter,
                                        source: e,
                                    }
                                }
                            })?;
                            fed += 1;
                        }
                        Ok(FrameMessage::End) => break,
                        Err(_) => {
                            return Err(PipelineError::Disconnected {
                                stage: StageName::Filter,
                            })
                        }
                    }
                }
                state.lock().frames_fed = fed;
                log::debug!("filter fed {fed} frames, closing its input");
                drop(stdin);
                Ok(fed)
            })
            .expect("failed to spawn filter feed thread");
        Ok(handle)
    }

    /// Block until the feed thread reports the process streams usable
    pub fn wait_ready(&self, timeout: Duration) -> Result<(), PipelineError> {
        self.ready_rx
            .recv_timeout(timeout)
            .map_err(|_| PipelineError::Disconnected {
                stage: StageName::Filter,
            })
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    pub fn has_ended(&self) -> bool {
        self.state.lock().ended
    }

    /// The process output stream, for the orchestrator's drain loop
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Collect every byte still buffered in the process after its input
    /// closed, then wait for it to exit. Bounded by `timeout`: a filter
    /// that neither closes its output nor exits is killed and reported.
    pub fn finish(
        &mut self,
        mut stdout: ChildStdout,
        timeout: Duration,
    ) -> Result<Vec<u8>, PipelineError> {
        // read to EOF on a helper thread so the wait stays bounded even
        // if the process never closes its output
        let (tx, rx) = bounded(1);
        let reader = std::thread::Builder::new()
            .name("filter-drain".into())
            .spawn(move || {
                let mut remaining = Vec::new();
                let res = stdout.read_to_end(&mut remaining);
                let _ = tx.send(res.map(|_| remaining));
            })
            .expect("failed to spawn filter drain thread");

        let remaining = match rx.recv_timeout(timeout) {
            Ok(Ok(remaining)) => remaining,
            Ok(Err(source)) => {
                let _ = reader.join();
                return Err(PipelineError::Io {
                    stage: StageName::Filter,
                    source,
                });
            }
            Err(_) => {
                self.process.kill();
                let _ = reader.join();
                return Err(PipelineError::DrainTimeout {
                    stage: StageName::Filter,
                    timeout,
                });
            }
        };
        let _ = reader.join();

        match self.process.wait_timeout(timeout) {
            Ok(Some(status)) => {
                if !status.success() {
                    return Err(PipelineError::Failed {
                        stage: StageName::Filter,
                        status,
                    });
                }
            }
            Ok(None) => {
                self.process.kill();
                return Err(PipelineError::DrainTimeout {
                    stage: StageName::Filter,
                    timeout,
                });
            }
            Err(source) => {
                return Err(PipelineError::Io {
                    stage: StageName::Filter,
                    source,
                });
            }
        }

        self.state.lock().ended = true;
        log::debug!("filter ended, {} trailing bytes", remaining.len());
        Ok(remaining)
    }

    /// Forcibly terminate the filter process
    pub fn kill(&mut self) {
        self.process.kill();
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
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    #[test]
    fn feed_closes_input_on_end_marker() {
        // cat exits only when its stdin closes; reaching EOF on stdout
        // therefore proves the feed side closed the pipe
        let mut stage = FilterStage::spawn(&mut sh("cat")).unwrap();
        let (tx, rx) = frame_queue();
        let feed = stage.start_feed(rx).unwrap();
        stage.wait_ready(Duration::from_secs(5)).unwrap();
        assert!(stage.is_ready());

        tx.send(FrameMessage::Frame(vec![1u8; 16])).unwrap();
        tx.send(FrameMessage::Frame(vec![2u8; 16])).unwrap();
        tx.send(FrameMessage::End).unwrap();

        let mut stdout = stage.take_stdout().unwrap();
        let mut all = Vec::new();
        stdout.read_to_end(&mut all).unwrap();
        assert_eq!(all.len(), 32);
        assert_eq!(feed.join().unwrap().unwrap(), 2);

        assert!(!stage.has_ended());
        let trailing = stage.finish(stdout, Duration::from_secs(5)).unwrap();
        assert!(trailing.is_empty());
        assert!(stage.has_ended());
    }

    #[test]
    fn trailing_bytes_are_collected_after_input_closes() {
        // a filter that holds everything back until EOF on its input
        let mut stage = FilterStage::spawn(&mut sh("cat > /dev/null; printf abc")).unwrap();
        let (tx, rx) = frame_queue();
        let feed = stage.start_feed(rx).unwrap();
        tx.send(FrameMessage::Frame(vec![0u8; 8])).unwrap();
        tx.send(FrameMessage::End).unwrap();
        feed.join().unwrap().unwrap();

        let stdout = stage.take_stdout().unwrap();
        let trailing = stage.finish(stdout, Duration::from_secs(5)).unwrap();
        assert_eq!(trailing, b"abc");
    }

    #[test]
    fn stuck_filter_is_a_drain_timeout() {
        let mut stage = FilterStage::spawn(&mut sh("cat; sleep 30")).unwrap();
        let (tx, rx) = frame_queue();
        let feed = stage.start_feed(rx).unwrap();
        tx.send(FrameMessage::End).unwrap();
        feed.join().unwrap().unwrap();

        let stdout = stage.take_stdout().unwrap();
        let err = stage
            .finish(stdout, Duration::from_millis(300))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DrainTimeout {
                stage: StageName::Filter,
                ..
            }
        ));
    }

    #[test]
    fn dead_filter_breaks_the_feed() {
        let mut stage = FilterStage::spawn(&mut sh("exit 1")).unwrap();
        let (tx, rx) = frame_queue();
        let feed = stage.start_feed(rx).unwrap();
        // keep writing until the broken pipe surfaces
        let res = loop {
            if tx
                .send_timeout(FrameMessage::Frame(vec![0u8; 65536]), Duration::from_secs(5))
                .is_err()
            {
                break feed.join().unwrap();
            }
            if feed.is_finished() {
                break feed.join().unwrap();
            }
        };
        assert!(matches!(
            res.unwrap_err(),
            PipelineError::BrokenPipe {
                stage: StageName::Filter
            }
        ));
    }
}
