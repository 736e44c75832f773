// THEORY:
// The typed message protocol between producers and the filter channel.
//
// Inbound messages carry an internal `type` tag. `IMAGE_DATA` is the only type
// the channel acts on; any other tag decodes to `Unknown` and is ignored. Every
// request carries a correlation id chosen by the producer, and the matching
// `FilterResponse` echoes it back.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core_modules::raster::Raster;
use crate::errors::MaskError;

/// Correlation identifier pairing a request with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one producer attached to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProducerId(pub u64);

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "producer-{}", self.0)
    }
}

/// A message sent from a producer to the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "IMAGE_DATA", rename_all = "camelCase")]
    ImageData {
        request_id: RequestId,
        image_data: Raster,
    },
    /// Any message type the channel does not handle.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    pub fn image_data(request_id: RequestId, image_data: Raster) -> Self {
        InboundMessage::ImageData {
            request_id,
            image_data,
        }
    }
}

/// The channel's answer to one `IMAGE_DATA` request.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResponse {
    pub request_id: RequestId,
    pub outcome: Result<Raster, MaskError>,
}

impl FilterResponse {
    pub fn into_raster(self) -> Result<Raster, MaskError> {
        self.outcome
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}
