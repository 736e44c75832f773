// THEORY:
// This file is the entry point for the `grow_mask` library crate. It exposes
// two strictly decoupled halves:
//
// - the green filter (`core_modules::green_filter`), a pure function that turns
//   an RGBA raster into a growth mask by rewriting its alpha channel, and
// - the filter channel (`filter_channel`), a background worker service that
//   accepts rasters from many producers and routes every mask back to the
//   producer that asked for it.
//
// The filter never sees the channel and the channel never looks inside a
// raster. Everything a producer needs (rasters, messages, configuration and
// errors) is re-exported here.

pub mod config;
pub mod core_modules;
pub mod errors;
pub mod filter_channel;
pub mod message;

pub use config::{ChannelConfig, FilterConfig};
pub use core_modules::green_filter::{GreenFilter, MaskSummary, filter};
pub use core_modules::neighborhood::neighborhood::Neighborhood;
pub use core_modules::pixel::pixel::Pixel;
pub use core_modules::raster::Raster;
pub use core_modules::utils::image_helper::image_helper;
pub use errors::{ImageIoError, MaskError};
pub use filter_channel::{ChannelState, FilterChannel, Producer};
pub use message::{FilterResponse, InboundMessage, ProducerId, RequestId};
