//! Contract between the player and a block based JPEG decoder.
//!
//! The decoder pulls frame bytes through a [`FrameReader`] and pushes each
//! decoded block (an MCU) as a [`Tile`] of RGB888 pixels, in raster order.

#[cfg(feature = "tjpgd")]
mod tjpgd;

#[cfg(feature = "tjpgd")]
pub use self::tjpgd::{TjpgdDecoder, TJPGD_POOL_SIZE};

use crate::Result;

/// Inclusive bounding box of a tile in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileRect {
    pub left: u16,
    pub top: u16,
    pub right: u16,
    pub bottom: u16,
}

impl TileRect {
    pub fn new(left: u16, top: u16, right: u16, bottom: u16) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> u16 {
        self.right + 1 - self.left
    }

    pub fn height(&self) -> u16 {
        self.bottom + 1 - self.top
    }
}

/// One decoded block: `rect.width() * rect.height()` RGB888 triples, row major.
#[derive(Debug, Clone, Copy)]
pub struct Tile<'a> {
    pub rect: TileRect,
    pub rgb: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u16,
    pub height: u16,
}

/// Byte supplier over one buffered frame.
///
/// Created fresh for every frame, so the read cursor always starts at 0 and
/// `remaining` at the frame length.
#[derive(Debug)]
pub struct FrameReader<'a> {
    data: &'a [u8],
    read_index: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, read_index: 0 }
    }

    /// Supplies up to `len` bytes and returns how many were supplied.
    ///
    /// With `dest == None` the bytes are skipped: cursors advance exactly as
    /// if they had been copied. A destination shorter than `len` limits the
    /// request to its length.
    pub fn read(&mut self, dest: Option<&mut [u8]>, len: usize) -> usize {
        let mut len = len.min(self.remaining());
        match dest {
            Some(dest) => {
                len = len.min(dest.len());
                dest[..len].copy_from_slice(&self.data[self.read_index..self.read_index + len]);
            }
            None => {}
        }
        self.read_index += len;
        len
    }

    /// Zero-copy variant of [`read`](Self::read): borrows the next bytes of
    /// the frame buffer instead of copying them.
    pub fn take(&mut self, len: usize) -> &'a [u8] {
        let len = len.min(self.remaining());
        let bytes = &self.data[self.read_index..self.read_index + len];
        self.read_index += len;
        bytes
    }

    /// Unread bytes, without advancing. For decoders that need random access
    /// over the whole frame.
    pub fn peek(&self) -> &'a [u8] {
        &self.data[self.read_index..]
    }

    pub fn read_index(&self) -> usize {
        self.read_index
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_index
    }
}

/// An external block based JPEG decoder.
///
/// `prepare` parses the frame header and must be called before
/// `decompress` on the same reader. `decompress` hands every tile to
/// `output` in raster order (top to bottom, left to right); when `output`
/// returns `false` decoding stops with [`Error::Interrupted`](crate::Error::Interrupted).
pub trait TileDecoder {
    fn prepare(&mut self, input: &mut FrameReader<'_>) -> Result<FrameSize>;

    fn decompress(
        &mut self,
        input: &mut FrameReader<'_>,
        output: &mut dyn FnMut(&Tile<'_>) -> bool,
    ) -> Result<()>;
}

impl<T: TileDecoder + ?Sized> TileDecoder for &mut T {
    fn prepare(&mut self, input: &mut FrameReader<'_>) -> Result<FrameSize> {
        (**self).prepare(input)
    }

    fn decompress(
        &mut self,
        input: &mut FrameReader<'_>,
        output: &mut dyn FnMut(&Tile<'_>) -> bool,
    ) -> Result<()> {
        (**self).decompress(input, output)
    }
}
