//! Three-stage frame pipeline.
//!
//! Decoder, filter and encoder run as external processes connected by
//! two bounded in-memory queues:
//!
//! ```text
//! decoder stdout -> [queue] -> filter stdin ... filter stdout -> [queue] -> encoder stdin
//! ```
//!
//! Each hop runs on its own thread so a slow stage only ever stalls its
//! neighbours through a full queue or a full pipe, never through timers.
//! The orchestrator sits between the filter's output and the encoder's
//! queue, chopping the byte stream back into frames and keeping the byte
//! accounting that detects short or misaligned output.

mod decode;
mod encode;
mod filter;
mod process;
mod queue;

pub use process::StageName;
pub use queue::{frame_queue, FrameMessage, QUEUE_CAPACITY};

use std::io::Read;
use std::process::Command;
use std::thread::JoinHandle;
use std::time::Duration;

use decode::DecodeStage;
use encode::EncodeStage;
use filter::FilterStage;

/// How long to wait for the filter process to come up before the run is
/// abandoned. Script compilation and model loading happen in this window.
const READY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to spawn {stage} process: {source}")]
    Spawn {
        stage: StageName,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} produced {produced} of {expected} expected frames")]
    TruncatedStream {
        stage: StageName,
        produced: u64,
        expected: u64,
    },
    #[error("{stage} closed its input pipe early")]
    BrokenPipe { stage: StageName },
    #[error("{stage} did not finish within {timeout:?}")]
    DrainTimeout { stage: StageName, timeout: Duration },
    #[error(
        "filter emitted {forwarded} bytes where geometry implies {expected} \
         ({frame_size} bytes per frame)"
    )]
    GeometryMismatch {
        forwarded: u64,
        expected: u64,
        frame_size: usize,
    },
    #[error("{stage} exited with {status}")]
    Failed {
        stage: StageName,
        status: std::process::ExitStatus,
    },
    #[error("{stage} {stream} stream unavailable")]
    MissingStream {
        stage: StageName,
        stream: &'static str,
    },
    #[error("{stage} queue disconnected")]
    Disconnected { stage: StageName },
    #[error("{stage} stage thread panicked")]
    Panicked { stage: StageName },
    #[error("{stage} i/o error: {source}")]
    Io {
        stage: StageName,
        #[source]
        source: std::io::Error,
    },
}

/// Per-run knobs. Frame geometry is fixed for the whole run; the
/// timeouts bound only the shutdown phases, never steady-state flow.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Bytes per frame on both pipes
    pub frame_size: usize,
    /// Frames the decoder is expected to produce
    pub frame_count: u64,
    /// Grace period for the filter to flush and exit after its input closes
    pub filter_exit_timeout: Duration,
    /// Grace period for the encoder to write trailers and exit
    pub encoder_exit_timeout: Duration,
}

impl PipelineSettings {
    pub fn new(frame_size: usize, frame_count: u64) -> Self {
        Self {
            frame_size,
            frame_count,
            filter_exit_timeout: Duration::from_secs(60),
            encoder_exit_timeout: Duration::from_secs(30),
        }
    }

    fn expected_bytes(&self) -> u64 {
        self.frame_count * self.frame_size as u64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineReport {
    pub frames_decoded: u64,
    pub frames_encoded: u64,
    /// Bytes forwarded from the filter to the encoder
    pub forwarded_bytes: u64,
    /// Bytes collected after the filter's input closed
    pub trailing_bytes: usize,
}

pub struct Pipeline {
    settings: PipelineSettings,
    decoder: Command,
    filter: Command,
    encoder: Command,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        decoder: Command,
        filter: Command,
        encoder: Command,
    ) -> Self {
        Self {
            settings,
            decoder,
            filter,
            encoder,
        }
    }

    /// Run the pipeline to completion. Every stage thread is joined
    /// before this returns, and every process has exited or been killed.
    pub fn run(mut self) -> Result<PipelineReport, PipelineError> {
        // the filter needs the longest to come up, start it first
        let mut filter = FilterStage::spawn(&mut self.filter)?;

        let (decoded_tx, decoded_rx) = frame_queue();
        let (filtered_tx, filtered_rx) = frame_queue();

        let decode = DecodeStage::spawn(
            &mut self.decoder,
            self.settings.frame_size,
            self.settings.frame_count,
            decoded_tx,
        )?;
        let encode = EncodeStage::spawn(
            &mut self.encoder,
            filtered_rx,
            self.settings.encoder_exit_timeout,
        )?;

        let decode_handle = decode.start();
        let encode_handle = encode.start();
        let feed_handle = filter.start_feed(decoded_rx)?;

        let pump = self.pump(&mut filter, filtered_tx);
        if pump.is_err() {
            // unblock whoever is still waiting on the filter's pipes
            filter.kill();
        }

        // join everything before deciding the outcome; a failed stage has
        // already unblocked its neighbours by dropping its channel ends
        let decoded = join_stage(decode_handle, StageName::Decoder);
        let fed = join_stage(feed_handle, StageName::Filter);
        let encoded = join_stage(encode_handle, StageName::Encoder);

        let (frames_decoded, frames_encoded, (forwarded_bytes, trailing_bytes)) =
            match (decoded, fed, encoded, pump) {
                (Ok(d), Ok(_), Ok(e), Ok(p)) => (d, e, p),
                (d, f, e, p) => {
                    // a disconnect is a symptom of a neighbour's failure,
                    // report it only when nothing better is known
                    let mut errors: Vec<PipelineError> = [d.err(), f.err(), e.err(), p.err()]
                        .into_iter()
                        .flatten()
                        .collect();
                    let root = errors
                        .iter()
                        .position(|e| !matches!(e, PipelineError::Disconnected { .. }))
                        .unwrap_or(0);
                    return Err(errors.swap_remove(root));
                }
            };

        let expected = self.settings.expected_bytes();
        if forwarded_bytes < expected {
            return Err(PipelineError::TruncatedStream {
                stage: StageName::Filter,
                produced: forwarded_bytes / self.settings.frame_size as u64,
                expected: self.settings.frame_count,
            });
        }
        if forwarded_bytes > expected {
            return Err(PipelineError::GeometryMismatch {
                forwarded: forwarded_bytes,
                expected,
                frame_size: self.settings.frame_size,
            });
        }

        Ok(PipelineReport {
            frames_decoded,
            frames_encoded,
            forwarded_bytes,
            trailing_bytes,
        })
    }

    /// Forward the filter's output to the encoder queue in frame-sized
    /// chunks, then collect whatever the filter still holds once its
    /// input has closed.
    fn pump(
        &mut self,
        filter: &mut FilterStage,
        filtered_tx: crossbeam_channel::Sender<FrameMessage>,
    ) -> Result<(u64, usize), PipelineError> {
        filter.wait_ready(READY_TIMEOUT)?;

        let mut stdout = filter.take_stdout().ok_or(PipelineError::MissingStream {
            stage: StageName::Filter,
            stream: "stdout",
        })?;

        let frame_size = self.settings.frame_size;
        let expected = self.settings.expected_bytes();
        let mut forwarded: u64 = 0;
        while forwarded < expected {
            let mut frame = vec![0u8; frame_size];
            let n = read_full(&mut stdout, &mut frame).map_err(|source| PipelineError::Io {
                stage: StageName::Filter,
                source,
            })?;
            if n == 0 {
                // premature EOF; the byte accounting below reports it
                break;
            }
            frame.truncate(n);
            forwarded += n as u64;
            filtered_tx
                .send(FrameMessage::Frame(frame))
                .map_err(|_| PipelineError::Disconnected {
                    stage: StageName::Encoder,
                })?;
            if n < frame_size {
                break;
            }
        }

        let trailing = filter.finish(stdout, self.settings.filter_exit_timeout)?;
        let trailing_len = trailing.len();
        if trailing_len > 0 {
            forwarded += trailing_len as u64;
            filtered_tx
                .send(FrameMessage::Frame(trailing))
                .map_err(|_| PipelineError::Disconnected {
                    stage: StageName::Encoder,
                })?;
        }
        filtered_tx
            .send(FrameMessage::End)
            .map_err(|_| PipelineError::Disconnected {
                stage: StageName::Encoder,
            })?;

        Ok((forwarded, trailing_len))
    }
}

fn join_stage(
    handle: JoinHandle<Result<u64, PipelineError>>,
    stage: StageName,
) -> Result<u64, PipelineError> {
    handle
        .join()
        .map_err(|_| PipelineError::Panicked { stage })?
}

/// Read until `buf` is full or the stream ends. Pipes hand out whatever
/// the writer flushed, so a frame usually arrives in several reads.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_full_assembles_partial_reads() {
        // a reader that trickles one byte at a time
        struct Trickle(Vec<u8>);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0.remove(0);
                Ok(1)
            }
        }

        let mut buf = [0u8; 4];
        let n = read_full(&mut Trickle(vec![1, 2, 3, 4, 5]), &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, [1, 2, 3, 4]);

        let n = read_full(&mut Trickle(vec![9]), &mut buf).unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], 9);
    }

    #[test]
    fn expected_bytes_scales_with_geometry() {
        let settings = PipelineSettings::new(3_110_400, 100);
        assert_eq!(settings.expected_bytes(), 311_040_000);
    }
}
