//! Scripted tile decoder and surfaces for pipeline tests.
//!
//! Frame format: `FF D8`, width (u16 BE), height (u16 BE), seed, `FF D9`.
//! Pixel (x, y) of a frame decodes to [`pattern`]`(x, y, seed)`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::decoder::{FrameReader, FrameSize, Tile, TileDecoder, TileRect};
use crate::surface::{MemorySurface, Surface, Window};
use crate::{Error, Result};

const HEADER_LEN: usize = 7;

pub(crate) fn encode_frame(width: u16, height: u16, seed: u8) -> Vec<u8> {
    let mut frame = vec![0xFF, 0xD8];
    frame.extend_from_slice(&width.to_be_bytes());
    frame.extend_from_slice(&height.to_be_bytes());
    frame.push(seed);
    frame.extend_from_slice(&[0xFF, 0xD9]);
    frame
}

pub(crate) fn pattern(x: u16, y: u16, seed: u8) -> [u8; 3] {
    [x as u8, y as u8, ((x >> 8) as u8) ^ ((y >> 8) as u8) ^ seed]
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedDecoder {
    pub tile: u16,
    pub prepared: usize,
    pub decoded: usize,
    /// Fail `decompress` after this many tiles.
    pub fail_after: Option<usize>,
    size: Option<FrameSize>,
    seed: u8,
}

impl ScriptedDecoder {
    pub fn new(tile: u16) -> Self {
        Self {
            tile,
            ..Default::default()
        }
    }
}

impl TileDecoder for ScriptedDecoder {
    fn prepare(&mut self, input: &mut FrameReader<'_>) -> Result<FrameSize> {
        self.prepared += 1;
        self.size = None;
        let mut header = [0u8; HEADER_LEN];
        if input.read(Some(&mut header), HEADER_LEN) != HEADER_LEN || header[..2] != [0xFF, 0xD8] {
            return Err(Error::Header("missing SOI".into()));
        }
        let size = FrameSize {
            width: u16::from_be_bytes([header[2], header[3]]),
            height: u16::from_be_bytes([header[4], header[5]]),
        };
        self.seed = header[6];
        self.size = Some(size);
        Ok(size)
    }

    fn decompress(
        &mut self,
        input: &mut FrameReader<'_>,
        output: &mut dyn FnMut(&Tile<'_>) -> bool,
    ) -> Result<()> {
        let size = self.size.take().ok_or_else(|| Error::Decode("not prepared".into()))?;
        self.decoded += 1;
        // probe the rest of the scan without copying it
        input.read(None, usize::MAX);

        let step = self.tile;
        let mut block = vec![0u8; usize::from(step) * usize::from(step) * 3];
        let mut emitted = 0;
        for top in (0..size.height).step_by(usize::from(step)) {
            for left in (0..size.width).step_by(usize::from(step)) {
                if self.fail_after == Some(emitted) {
                    return Err(Error::Decode("scripted failure".into()));
                }
                let right = (left + step).min(size.width) - 1;
                let bottom = (top + step).min(size.height) - 1;
                let rect = TileRect::new(left, top, right, bottom);
                let mut i = 0;
                for y in top..=bottom {
                    for x in left..=right {
                        block[i..i + 3].copy_from_slice(&pattern(x, y, self.seed));
                        i += 3;
                    }
                }
                if !output(&Tile { rect, rgb: &block[..i] }) {
                    return Err(Error::Interrupted);
                }
                emitted += 1;
            }
        }
        Ok(())
    }
}

/// Surface that cannot leave its thread.
pub(crate) struct SharedSurface(pub Rc<RefCell<MemorySurface>>);

impl Surface for SharedSurface {
    fn size(&self) -> (u16, u16) {
        self.0.borrow().size()
    }

    fn open_window(&mut self, window: Window) -> Result<()> {
        self.0.borrow_mut().open_window(window)
    }

    fn write_pixels(&mut self, pixels: &[u16]) -> Result<()> {
        self.0.borrow_mut().write_pixels(pixels)
    }

    fn close_window(&mut self) -> Result<()> {
        self.0.borrow_mut().close_window()
    }
}
