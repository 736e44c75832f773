// THEORY:
// The `Pixel` module is the smallest unit of the mask engine. It is a "dumb"
// data container for one RGBA pixel plus the single heuristic the engine cares
// about: is this pixel green?
//
// Key principles:
// 1.  **Single-pixel scope**: the green rule reads only this pixel's own red,
//     green and blue channels. Anything involving neighbors (dilation) lives
//     in `neighborhood` and `green_filter`.
// 2.  **Alpha is output, never input**: classification ignores alpha entirely,
//     so a raster can be re-filtered and produce the same mask.
// 3.  **Byte layout**: a pixel is exactly `CHANNELS` interleaved bytes in the
//     order R, G, B, A, matching the raster buffer.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = Byte;

    /// Number of interleaved bytes per pixel.
    pub const CHANNELS: usize = 4;
    /// Offset of the alpha byte within a pixel.
    pub const ALPHA_OFFSET: usize = 3;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (opacity) channel value (0-255).
        pub alpha: Channel,
    }

    impl Pixel {
        pub const fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Pixel {
                red,
                green,
                blue,
                alpha,
            }
        }

        /// Opaque pixel from its color channels.
        pub const fn rgb(red: Channel, green: Channel, blue: Channel) -> Self {
            Self::new(red, green, blue, 255)
        }

        /// Green dominates both other channels and clears `floor`.
        ///
        /// Ties are not green: `G == R` or `G == B` fails the rule.
        pub fn is_green(&self, floor: Channel) -> bool {
            self.green > floor && self.green > self.red && self.green > self.blue
        }

        /// Same color with a different alpha.
        pub fn with_alpha(self, alpha: Channel) -> Self {
            Pixel { alpha, ..self }
        }
    }

    impl From<[Byte; CHANNELS]> for Pixel {
        fn from(bytes: [Byte; CHANNELS]) -> Self {
            Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3])
        }
    }

    impl From<Pixel> for [Byte; CHANNELS] {
        fn from(pixel: Pixel) -> Self {
            [pixel.red, pixel.green, pixel.blue, pixel.alpha]
        }
    }

    impl From<image::Rgba<u8>> for Pixel {
        fn from(rgba: image::Rgba<u8>) -> Self {
            Pixel::from(rgba.0)
        }
    }
}
