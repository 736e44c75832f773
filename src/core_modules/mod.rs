pub mod green_filter;
pub mod neighborhood;
pub mod pixel;
pub mod raster;
pub mod utils;
