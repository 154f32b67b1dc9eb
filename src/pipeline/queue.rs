// Bounded frame queues
//
// The two queues between the stages are the only structures shared across
// threads and the sole backpressure mechanism: a producer blocks as soon
// as 22 frames are in flight, bounding memory to 22 * frame_size per
// queue. Frames are strictly FIFO; the `End` marker is pushed exactly
// once, after the last real frame.

use crossbeam_channel::{bounded, Receiver, Sender};

/// Maximum number of in-flight frames per queue
pub const QUEUE_CAPACITY: usize = 22;

/// One item travelling between stages
#[derive(Debug)]
pub enum FrameMessage {
    /// A frame buffer; full frame size except for a final short flush chunk
    Frame(Vec<u8>),
    /// End of stream; no further frames will arrive
    End,
}

/// A bounded frame queue of the standard pipeline capacity
pub fn frame_queue() -> (Sender<FrameMessage>, Receiver<FrameMessage>) {
    bounded(QUEUE_CAPACITY)
}
