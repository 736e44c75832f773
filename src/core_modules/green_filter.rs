// THEORY:
// The `GreenFilter` turns an RGBA raster into a growth mask by rewriting its
// alpha channel. It is the algorithmic core of the engine and knows nothing
// about how rasters arrive or where they go next.
//
// Algorithm:
// 1.  **Classification**: every pixel is tested with the green rule from
//     `Pixel::is_green`, always against the raster's original color channels.
//     Alpha is never read, so filtering is idempotent.
// 2.  **Dilation**: each green pixel marks its `Neighborhood` in a boolean
//     opaque map, one row slice at a time. Marking happens in a separate map so
//     later classifications are never influenced by earlier writes, and so an
//     opaque mark can never be overwritten by a background default.
// 3.  **Write-back**: one pass over the buffer writes `opaque_alpha` where the
//     map is set and `background_alpha` everywhere else. Each alpha byte is
//     written exactly once; red, green and blue are untouched.
//
// The filter is stateless and `Copy`. Any number of threads can run it at the
// same time over different rasters.

use tracing::debug;

use crate::config::FilterConfig;
use crate::core_modules::neighborhood::neighborhood::Neighborhood;
use crate::core_modules::pixel::pixel::{ALPHA_OFFSET, CHANNELS, Pixel};
use crate::core_modules::raster::Raster;
use crate::errors::MaskError;

/// Counts gathered while building a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaskSummary {
    /// Pixels that passed the green rule.
    pub green_pixels: usize,
    /// Pixels that ended up opaque, detections and their neighborhoods together.
    pub opaque_pixels: usize,
}

/// Classifies green pixels and dilates them into an alpha mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreenFilter {
    config: FilterConfig,
}

impl GreenFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn classify(&self, pixel: &Pixel) -> bool {
        pixel.is_green(self.config.green_floor)
    }

    /// Which pixels the mask makes opaque, in row-major order.
    pub fn opaque_map(&self, raster: &Raster) -> Result<Vec<bool>, MaskError> {
        raster.validate()?;
        Ok(self.mark_opaque(raster).0)
    }

    /// Rewrites the alpha channel of `raster` and hands it back.
    pub fn apply(&self, raster: Raster) -> Result<Raster, MaskError> {
        self.apply_with_summary(raster).map(|(raster, _)| raster)
    }

    /// Like `apply`, also reporting how much of the raster was highlighted.
    pub fn apply_with_summary(
        &self,
        mut raster: Raster,
    ) -> Result<(Raster, MaskSummary), MaskError> {
        raster.validate()?;

        let (opaque, green_pixels) = self.mark_opaque(&raster);
        let mut summary = MaskSummary {
            green_pixels,
            opaque_pixels: 0,
        };

        for (bytes, is_opaque) in raster.bytes_mut().chunks_exact_mut(CHANNELS).zip(opaque) {
            bytes[ALPHA_OFFSET] = if is_opaque {
                summary.opaque_pixels += 1;
                self.config.opaque_alpha
            } else {
                self.config.background_alpha
            };
        }

        debug!(
            width = raster.width(),
            height = raster.height(),
            green = summary.green_pixels,
            opaque = summary.opaque_pixels,
            "mask computed"
        );
        Ok((raster, summary))
    }

    /// Builds the opaque map from the untouched color channels. The raster must
    /// already be validated.
    fn mark_opaque(&self, raster: &Raster) -> (Vec<bool>, usize) {
        let (width, height) = raster.dimensions();
        let row_len = width as usize;
        let mut opaque = vec![false; raster.pixel_count()];
        let mut green_pixels = 0;

        for (index, pixel) in raster.pixels().enumerate() {
            if !self.classify(&pixel) {
                continue;
            }
            green_pixels += 1;

            let x = (index % row_len) as u32;
            let y = (index / row_len) as u32;
            let block = Neighborhood::around(x, y, self.config.dilation_radius, width, height);
            let (start, end) = (block.columns.start as usize, block.columns.end as usize);
            for row in block.rows {
                let row_start = row as usize * row_len;
                opaque[row_start + start..row_start + end].fill(true);
            }
        }

        (opaque, green_pixels)
    }
}

/// Runs the default filter: green floor 10, 9x9 dilation, alpha 255 over 100.
pub fn filter(raster: Raster) -> Result<Raster, MaskError> {
    GreenFilter::default().apply(raster)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Pixel = Pixel::rgb(0, 0, 0);

    fn black(width: u32, height: u32) -> Raster {
        Raster::filled(width, height, BLACK).unwrap()
    }

    /// Independent rendering of the mask rule: anchor at `max(x - 4, 0)`,
    /// nine pixels from there, nothing at or past the edge.
    fn reference_alpha(raster: &Raster) -> Vec<u8> {
        let (width, height) = raster.dimensions();
        let mut greens = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let p = raster.pixel(x, y).unwrap();
                if p.green > 10 && p.green > p.red && p.green > p.blue {
                    greens.push((x, y));
                }
            }
        }
        let mut alpha = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let covered = greens.iter().any(|&(gx, gy)| {
                    let ax = gx.saturating_sub(4);
                    let ay = gy.saturating_sub(4);
                    x >= ax && x < ax + 9 && y >= ay && y < ay + 9
                });
                alpha.push(if covered { 255 } else { 100 });
            }
        }
        alpha
    }

    /// Deterministic scatter of colors with a mix of green and non-green pixels.
    fn speckled(width: u32, height: u32, seed: u32) -> Raster {
        let mut state = seed.max(1);
        let mut raster = black(width, height);
        for y in 0..height {
            for x in 0..width {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let [r, g, b, a] = state.to_le_bytes();
                // Keep greens sparse so the dilation edges are visible.
                let g = if r % 23 == 0 { g } else { g / 8 };
                raster.set_pixel(x, y, Pixel::new(r / 2, g, b / 2, a));
            }
        }
        raster
    }

    #[test]
    fn black_raster_is_all_background() {
        let out = filter(black(7, 5)).unwrap();
        assert!(out.alpha_channel().iter().all(|&a| a == 100));
        assert!(out.pixels().all(|p| (p.red, p.green, p.blue) == (0, 0, 0)));
    }

    #[test]
    fn interior_pixel_dilates_to_nine_by_nine() {
        let mut raster = black(20, 20);
        raster.set_pixel(10, 10, Pixel::rgb(0, 50, 0));
        let out = filter(raster).unwrap();

        for y in 0..20 {
            for x in 0..20 {
                let inside = (6..=14).contains(&x) && (6..=14).contains(&y);
                let expected = if inside { 255 } else { 100 };
                assert_eq!(out.alpha(x, y), Some(expected), "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn corner_pixel_on_small_raster_stays_in_bounds() {
        let mut raster = black(5, 5);
        raster.set_pixel(0, 0, Pixel::rgb(0, 50, 0));
        let (out, summary) = GreenFilter::default().apply_with_summary(raster).unwrap();

        assert_eq!(out.as_bytes().len(), 5 * 5 * 4);
        assert!(out.alpha_channel().iter().all(|&a| a == 255));
        assert_eq!(summary, MaskSummary { green_pixels: 1, opaque_pixels: 25 });
    }

    #[test]
    fn bottom_right_pixel_does_not_wrap_into_next_row() {
        let mut raster = black(12, 12);
        raster.set_pixel(11, 5, Pixel::rgb(0, 90, 0));
        let out = filter(raster).unwrap();

        // Columns 0..7 of rows 1..=9 would be hit by a wrapping write.
        for y in 0..12 {
            for x in 0..12 {
                let inside = (7..12).contains(&x) && (1..10).contains(&y);
                assert_eq!(out.alpha(x, y), Some(if inside { 255 } else { 100 }));
            }
        }
    }

    #[test]
    fn alpha_matches_reference_rule() {
        for (width, height, seed) in [(33, 17, 7), (9, 40, 99), (64, 64, 1234)] {
            let raster = speckled(width, height, seed);
            let expected = reference_alpha(&raster);
            let out = filter(raster).unwrap();
            assert_eq!(out.alpha_channel(), expected, "{width}x{height} seed {seed}");
        }
    }

    #[test]
    fn only_alpha_changes() {
        let raster = speckled(25, 25, 42);
        let before: Vec<_> = raster.pixels().map(|p| (p.red, p.green, p.blue)).collect();
        let out = filter(raster).unwrap();
        let after: Vec<_> = out.pixels().map(|p| (p.red, p.green, p.blue)).collect();
        assert_eq!(before, after);
        assert!(out.alpha_channel().iter().all(|&a| a == 100 || a == 255));
    }

    #[test]
    fn refiltering_is_idempotent() {
        let once = filter(speckled(30, 20, 5)).unwrap();
        let twice = filter(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn shape_mismatch_leaves_buffer_untouched() {
        let raster: Raster =
            serde_json::from_str(r#"{ "width": 2, "height": 2, "data": [0, 200, 0, 7] }"#).unwrap();
        let err = GreenFilter::default().apply(raster).unwrap_err();
        assert_eq!(
            err,
            MaskError::ShapeMismatch {
                width: 2,
                height: 2,
                expected: 16,
                actual: 4,
            }
        );
    }

    #[test]
    fn custom_config_changes_floor_radius_and_alphas() {
        let filter = GreenFilter::new(FilterConfig {
            green_floor: 100,
            dilation_radius: 1,
            opaque_alpha: 200,
            background_alpha: 0,
        });
        let mut raster = black(6, 6);
        raster.set_pixel(3, 3, Pixel::rgb(0, 150, 0));
        raster.set_pixel(0, 5, Pixel::rgb(0, 90, 0));

        let map = filter.opaque_map(&raster).unwrap();
        assert_eq!(map.iter().filter(|&&o| o).count(), 9);

        let out = filter.apply(raster).unwrap();
        assert_eq!(out.alpha(2, 2), Some(200));
        assert_eq!(out.alpha(4, 4), Some(200));
        assert_eq!(out.alpha(5, 5), Some(0));
        assert_eq!(out.alpha(0, 5), Some(0));
    }
}
