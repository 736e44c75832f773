// THEORY:
// `MaskError` covers everything the filter and the channel can report to a
// producer. It is `Clone` so a response can carry it across the channel.
// `ImageIoError` is only used by the file helpers.

use thiserror::Error;

use crate::filter_channel::ChannelState;
use crate::message::RequestId;

/// Errors reported by the green filter and the filter channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaskError {
    /// The buffer length does not match `4 * width * height`.
    #[error("raster buffer holds {actual} bytes but {width}x{height} RGBA needs {expected}")]
    ShapeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// One of the dimensions is zero.
    #[error("raster dimensions must be positive, got {width}x{height}")]
    EmptyRaster { width: u32, height: u32 },

    /// The byte length of the raster does not fit in memory.
    #[error("raster of {width}x{height} pixels is too large to address")]
    TooLarge { width: u32, height: u32 },

    /// Requests are only accepted while the channel is active.
    #[error("filter channel is {0}, requests are only accepted while active")]
    ChannelInactive(ChannelState),

    /// The request was superseded by a re-installation or a shutdown.
    #[error("request {0} was cancelled before the active worker generation completed it")]
    Cancelled(RequestId),

    /// The filter panicked on its worker thread.
    #[error("filter worker failed while processing request {0}")]
    WorkerFailed(RequestId),

    /// The worker pool is gone.
    #[error("filter channel has shut down")]
    ChannelClosed,

    /// The producer already has a request outstanding under this id.
    #[error("request {0} is already outstanding for this producer")]
    DuplicateRequest(RequestId),

    /// The id was never sent, or its response was already handed out.
    #[error("request {0} has no outstanding response")]
    UnknownRequest(RequestId),

    /// No response arrived within the configured timeout.
    #[error("no response to request {0} within the configured timeout")]
    TimedOut(RequestId),
}

/// Errors from decoding or encoding raster files.
#[derive(Debug, Error)]
pub enum ImageIoError {
    #[error("image codec")]
    Image(#[from] image::ImageError),

    #[error("invalid raster")]
    Raster(#[from] MaskError),
}
