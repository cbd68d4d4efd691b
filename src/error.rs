// Frame engine errors
//
// Everything in here is fatal. Out-of-date / suboptimal / zero-extent surfaces
// are not errors: they travel as AcquireOutcome, PresentOutcome and
// RecreateOutcome values and are absorbed inside the scheduler.

use thiserror::Error;

/// Broad class of a fatal failure, used for the exit diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Object creation failed (environment or driver problem).
    Setup,
    /// The engine asked for something that can never succeed.
    Logic,
    /// The device stopped answering.
    DeviceLost,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("failed to create {what}: {reason}")]
    Creation { what: &'static str, reason: String },

    #[error("frames in flight must be at least 1 (got {0})")]
    InvalidFrameCount(usize),

    #[error("command buffer recording rejected: {0}")]
    Recording(String),

    #[error("frame slot {slot} out of range ({count} frames in flight)")]
    InvalidSlot { slot: usize, count: usize },

    #[error("swapchain image {index} out of range ({count} images)")]
    InvalidImage { index: u32, count: usize },

    #[error("no swapchain generation is live")]
    NoSwapchain,

    #[error("copy of {size} bytes exceeds buffer of {capacity} bytes")]
    CopyOutOfRange { size: u64, capacity: u64 },

    #[error("buffer memory is not host visible")]
    NotHostVisible,

    #[error("queue submission rejected: {0}")]
    Submission(String),

    #[error("presentation failed: {0}")]
    Presentation(String),

    #[error("fence wait timed out after {0} ns")]
    Timeout(u64),

    #[error("device lost: {0}")]
    DeviceLost(String),
}

impl FrameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameError::Creation { .. } | FrameError::InvalidFrameCount(_) => ErrorKind::Setup,
            FrameError::Recording(_)
            | FrameError::InvalidSlot { .. }
            | FrameError::InvalidImage { .. }
            | FrameError::NoSwapchain
            | FrameError::CopyOutOfRange { .. }
            | FrameError::NotHostVisible
            | FrameError::Submission(_) => ErrorKind::Logic,
            FrameError::Presentation(_) | FrameError::Timeout(_) | FrameError::DeviceLost(_) => {
                ErrorKind::DeviceLost
            }
        }
    }

    pub(crate) fn creation(what: &'static str, reason: impl ToString) -> Self {
        FrameError::Creation {
            what,
            reason: reason.to_string(),
        }
    }
}

pub type FrameResult<T> = std::result::Result<T, FrameError>;
