//! RGB888 tile to RGB565 row-buffer conversion.

use crate::decoder::{Tile, TileRect};
use crate::geometry::Geometry;
use crate::{Error, Result};

/// Packs an RGB888 pixel into RGB565 by truncating the low bits of each
/// channel (no rounding, no dithering).
#[inline(always)]
pub fn rgb888_to_rgb565(r: u8, g: u8, b: u8) -> u16 {
    (u16::from(r & 0xF8) << 8) | (u16::from(g & 0xFC) << 3) | u16::from(b >> 3)
}

#[inline(always)]
pub fn rgb565_to_rgb888(pixel: u16) -> (u8, u8, u8) {
    let r = ((pixel >> 11) & 0x1F) as u8;
    let g = ((pixel >> 5) & 0x3F) as u8;
    let b = (pixel & 0x1F) as u8;

    // replicate the high bits so full-scale channels map back to 255
    ((r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2))
}

/// Visible part of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileClip {
    /// First visible source row of the tile.
    pub first_row: u16,
    /// Number of visible rows.
    pub rows: u16,
    /// Source columns dropped on the left (`oL`).
    pub skip_left: u16,
    /// Source columns dropped on the right (`oR`).
    pub skip_right: u16,
    /// Destination column inside the row buffer.
    pub dst_x: u16,
}

impl TileClip {
    /// Visible pixels per row.
    pub fn line(&self, rect: &TileRect) -> u16 {
        rect.width() - self.skip_left - self.skip_right
    }
}

/// Clips a tile against the visible window; `None` when the tile lies
/// entirely left of, above, right of or below it.
pub fn clip_tile(rect: &TileRect, geometry: &Geometry) -> Option<TileClip> {
    let right = geometry.visible_right();
    let bottom = geometry.visible_bottom();
    if geometry.is_empty()
        || rect.right < geometry.skip_x
        || rect.left >= right
        || rect.bottom < geometry.skip_y
        || rect.top >= bottom
    {
        return None;
    }

    let first_row = rect.top.max(geometry.skip_y);
    let last_row = rect.bottom.min(bottom - 1);
    let skip_left = geometry.skip_x.saturating_sub(rect.left);
    let skip_right = (rect.right + 1).saturating_sub(right);

    Some(TileClip {
        first_row,
        rows: last_row - first_row + 1,
        skip_left,
        skip_right,
        dst_x: rect.left + skip_left - geometry.skip_x,
    })
}

/// Converts the visible part of `tile` into `band`, a row buffer with a
/// stride of `geometry.visible_width` whose row 0 is `clip.first_row`.
///
/// Never allocates. `swap_bytes` stores each pixel big-endian for panels
/// that clock the high byte first.
pub fn convert_tile(
    tile: &Tile<'_>,
    clip: &TileClip,
    geometry: &Geometry,
    band: &mut [u16],
    swap_bytes: bool,
) -> Result<()> {
    let rect = &tile.rect;
    let width = usize::from(rect.width());
    if tile.rgb.len() < width * usize::from(rect.height()) * 3 {
        return Err(Error::Decode(format!(
            "tile {rect:?} carries {} bytes",
            tile.rgb.len()
        )));
    }

    let stride = usize::from(geometry.visible_width);
    let line = usize::from(clip.line(rect));
    let rows = usize::from(clip.rows);
    if band.len() < stride * rows {
        return Err(Error::BandOverflow {
            rows: clip.rows,
            capacity: (band.len() / stride.max(1)) as u16,
        });
    }

    let src_row0 = usize::from(clip.first_row - rect.top);
    let src_col0 = usize::from(clip.skip_left);
    let dst_col0 = usize::from(clip.dst_x);

    for row in 0..rows {
        let src_start = ((src_row0 + row) * width + src_col0) * 3;
        let src = &tile.rgb[src_start..src_start + line * 3];
        let dst_start = row * stride + dst_col0;
        let dst = &mut band[dst_start..dst_start + line];

        for (px, rgb) in dst.iter_mut().zip(src.chunks_exact(3)) {
            let value = rgb888_to_rgb565(rgb[0], rgb[1], rgb[2]);
            *px = if swap_bytes { value.swap_bytes() } else { value };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(rect: TileRect, rgb: [u8; 3]) -> Vec<u8> {
        let n = usize::from(rect.width()) * usize::from(rect.height());
        rgb.iter().copied().cycle().take(n * 3).collect()
    }

    #[test]
    fn packs_by_truncation() {
        assert_eq!(rgb888_to_rgb565(248, 124, 8), 0xFBE1);
        // low bits never round up
        assert_eq!(rgb888_to_rgb565(255, 255, 255), 0xFFFF);
        assert_eq!(rgb888_to_rgb565(7, 3, 7), 0x0000);
        assert_eq!(rgb888_to_rgb565(0xF8, 0, 0), 0xF800);
        assert_eq!(rgb888_to_rgb565(0, 0xFC, 0), 0x07E0);
        assert_eq!(rgb888_to_rgb565(0, 0, 0xF8), 0x001F);
    }

    #[test]
    fn unpack_expands_full_scale() {
        assert_eq!(rgb565_to_rgb888(0xFFFF), (255, 255, 255));
        assert_eq!(rgb565_to_rgb888(0x0000), (0, 0, 0));
        assert_eq!(rgb565_to_rgb888(0xF800), (255, 0, 0));
    }

    #[test]
    fn solid_tile_converts_identically_anywhere() {
        let geometry = Geometry::resolve(400, 300, 320, 240);
        for (left, top) in [(32u16, 16u16), (48, 48), (160, 128), (352, 256)] {
            let rect = TileRect::new(left, top, left + 15, top + 15);
            let rgb = solid(rect, [248, 124, 8]);
            let tile = Tile { rect, rgb: &rgb };
            let clip = clip_tile(&rect, &geometry).expect("visible");
            let mut band = vec![0u16; 320 * 16];
            convert_tile(&tile, &clip, &geometry, &mut band, false).unwrap();

            let line = usize::from(clip.line(&rect));
            for row in 0..usize::from(clip.rows) {
                let start = row * 320 + usize::from(clip.dst_x);
                assert!(band[start..start + line].iter().all(|&px| px == 0xFBE1));
            }
        }
    }

    #[test]
    fn rejects_tiles_outside_visible_window() {
        // visible source window is columns 40..360, rows 30..270
        let geometry = Geometry::resolve(400, 300, 320, 240);
        assert!(clip_tile(&TileRect::new(16, 32, 31, 47), &geometry).is_none());
        assert!(clip_tile(&TileRect::new(360, 32, 375, 47), &geometry).is_none());
        assert!(clip_tile(&TileRect::new(64, 0, 79, 15), &geometry).is_none());
        assert!(clip_tile(&TileRect::new(64, 272, 79, 287), &geometry).is_none());
        assert!(clip_tile(&TileRect::new(32, 16, 47, 31), &geometry).is_some());
    }

    #[test]
    fn clips_overhanging_edges() {
        let geometry = Geometry::resolve(400, 300, 320, 240);

        let left = clip_tile(&TileRect::new(32, 16, 47, 31), &geometry).unwrap();
        assert_eq!(left, TileClip { first_row: 30, rows: 2, skip_left: 8, skip_right: 0, dst_x: 0 });

        let right = clip_tile(&TileRect::new(352, 256, 367, 271), &geometry).unwrap();
        assert_eq!(right, TileClip { first_row: 256, rows: 14, skip_left: 0, skip_right: 8, dst_x: 312 });
        assert_eq!(right.line(&TileRect::new(352, 256, 367, 271)), 8);
    }

    #[test]
    fn skipped_rows_and_columns_come_from_the_right_source_pixels() {
        // 16x16 tile straddling the top-left corner of the visible window
        let geometry = Geometry::resolve(400, 300, 320, 240);
        let rect = TileRect::new(32, 16, 47, 31);
        let rgb: Vec<u8> = (0..16u8)
            .flat_map(|y| (0..16u8).flat_map(move |x| [x * 8, y * 4, 0]))
            .collect();
        let tile = Tile { rect, rgb: &rgb };
        let clip = clip_tile(&rect, &geometry).unwrap();
        let mut band = vec![0u16; 320 * 16];
        convert_tile(&tile, &clip, &geometry, &mut band, false).unwrap();

        // source (40, 30) is tile pixel (8, 14)
        assert_eq!(band[0], rgb888_to_rgb565(64, 56, 0));
        // source (47, 31) is tile pixel (15, 15)
        assert_eq!(band[320 + 7], rgb888_to_rgb565(120, 60, 0));
        // nothing written past the tile's visible span
        assert_eq!(band[8], 0);
    }

    #[test]
    fn swap_bytes_stores_big_endian() {
        let geometry = Geometry::resolve(8, 8, 8, 8);
        let rect = TileRect::new(0, 0, 7, 7);
        let rgb = solid(rect, [248, 124, 8]);
        let clip = clip_tile(&rect, &geometry).unwrap();
        let mut band = vec![0u16; 64];
        convert_tile(&Tile { rect, rgb: &rgb }, &clip, &geometry, &mut band, true).unwrap();
        assert_eq!(band[0], 0xE1FB);
    }

    #[test]
    fn short_tile_is_a_decode_error() {
        let geometry = Geometry::resolve(8, 8, 8, 8);
        let rect = TileRect::new(0, 0, 7, 7);
        let rgb = [0u8; 10];
        let clip = clip_tile(&rect, &geometry).unwrap();
        let mut band = vec![0u16; 64];
        let err = convert_tile(&Tile { rect, rgb: &rgb }, &clip, &geometry, &mut band, false);
        assert!(matches!(err, Err(Error::Decode(_))));
    }
}
