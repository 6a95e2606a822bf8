//! For tracking generation progress

/// A trait that is used to report progress to some consumer.
///
/// Progress is advisory. Nothing the reporter does can stop or slow down the run,
/// so implementations should return quickly and must not block.
pub trait ProgressReporter: Send {
    /// Called after each frame has been synthesized and handed to the encoder,
    /// in display order. `completed` counts from 1 to `total`.
    fn increase(&mut self, completed: usize, total: usize);

    /// Final file size
    fn written_bytes(&mut self, _file_size_in_bytes: u64) {}

    /// The run has failed with this message
    #[cold]
    fn error(&mut self, _message: String) {}

    /// The file is in place
    fn done(&mut self, _msg: &str) {}
}

/// No-op progress reporter
pub struct NoProgress {}

impl ProgressReporter for NoProgress {
    fn increase(&mut self, _completed: usize, _total: usize) {}
}
