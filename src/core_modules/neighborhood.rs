// THEORY:
// A `Neighborhood` is the block of pixels that gets marked opaque around every
// green detection. Dilating detections this way thickens thin stems and leaves
// into solid regions that read well as an overlay.
//
// The block is anchored, not centered: its top-left corner is the detection
// minus `radius` on each axis, clamped to the raster, and it spans
// `2 * radius + 1` pixels from there. Near the left and top edges the anchor
// sticks at zero and the block keeps its full span, so it reaches further to
// the right or bottom than it would in the interior.
//
// The far edge is clipped to the raster. Coordinates at or past the width or
// height are excluded, so no write can wrap into the next row or run off the
// end of the buffer.

pub mod neighborhood {
    use std::ops::Range;

    /// Half-open pixel rectangle, already clipped to the raster.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Neighborhood {
        pub columns: Range<u32>,
        pub rows: Range<u32>,
    }

    impl Neighborhood {
        /// The dilation block for a detection at `(x, y)`.
        pub fn around(x: u32, y: u32, radius: u32, width: u32, height: u32) -> Self {
            let span = radius.saturating_mul(2).saturating_add(1);
            Self {
                columns: clipped_span(x, radius, span, width),
                rows: clipped_span(y, radius, span, height),
            }
        }

        pub fn is_empty(&self) -> bool {
            self.columns.is_empty() || self.rows.is_empty()
        }

        pub fn len(&self) -> usize {
            self.columns.len() * self.rows.len()
        }

        pub fn contains(&self, x: u32, y: u32) -> bool {
            self.columns.contains(&x) && self.rows.contains(&y)
        }

        /// Every `(x, y)` in the block, row by row.
        pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
            self.rows
                .clone()
                .flat_map(move |y| self.columns.clone().map(move |x| (x, y)))
        }
    }

    fn clipped_span(center: u32, radius: u32, span: u32, limit: u32) -> Range<u32> {
        let start = center.saturating_sub(radius).min(limit);
        let end = start.saturating_add(span).min(limit);
        start..end
    }
}
