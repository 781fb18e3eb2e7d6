use log::trace;
use tjpgd::{JpegDecoder, MemoryPool};

use super::{FrameReader, FrameSize, Tile, TileDecoder, TileRect};
use crate::{Error, Result};

/// Workspace bytes for Huffman and quantization tables, enough for four
/// tables with the fast lookup enabled.
pub const TJPGD_POOL_SIZE: usize = 16 * 1024;

// largest MCU tjpgd decodes is 4:2:0, 2x2 luma blocks
const MCU_BUFFER_LEN: usize = (2 * 2 + 2) * 64;
const WORK_BUFFER_LEN: usize = 16 * 16 * 3;

/// [`TileDecoder`] backed by tjpgd.
///
/// tjpgd parses from a contiguous slice, so the adapter peeks the whole
/// buffered frame in `prepare` and takes it in `decompress`. Tables live in
/// a caller provided pool that is reset for every frame; MCU and work
/// buffers are sized for the largest sampling layout.
pub struct TjpgdDecoder<'a> {
    jdec: JpegDecoder<'a>,
    pool: MemoryPool<'a>,
    mcu_buffer: [i16; MCU_BUFFER_LEN],
    work_buffer: [u8; WORK_BUFFER_LEN],
    prepared: bool,
}

impl<'a> TjpgdDecoder<'a> {
    /// `pool` should hold [`TJPGD_POOL_SIZE`] bytes.
    pub fn new(pool: &'a mut [u8]) -> Self {
        Self {
            jdec: JpegDecoder::new(),
            pool: MemoryPool::new(pool),
            mcu_buffer: [0; MCU_BUFFER_LEN],
            work_buffer: [0; WORK_BUFFER_LEN],
            prepared: false,
        }
    }
}

impl TileDecoder for TjpgdDecoder<'_> {
    fn prepare(&mut self, input: &mut FrameReader<'_>) -> Result<FrameSize> {
        self.prepared = false;
        // the previous frame's tables point into the pool
        self.jdec = JpegDecoder::new();
        self.pool.reset();
        self.jdec
            .prepare(input.peek(), &mut self.pool)
            .map_err(|err| Error::Header(format!("{err:?}")))?;
        trace!("tjpgd pool used: {}/{}", self.pool.used(), self.pool.capacity());

        // tiles are consumed as RGB888; grayscale scans come out one byte per pixel
        let components = self.jdec.components();
        if components != 3 {
            return Err(Error::Header(format!("unsupported component count {components}")));
        }
        self.prepared = true;
        Ok(FrameSize {
            width: self.jdec.width(),
            height: self.jdec.height(),
        })
    }

    fn decompress(
        &mut self,
        input: &mut FrameReader<'_>,
        output: &mut dyn FnMut(&Tile<'_>) -> bool,
    ) -> Result<()> {
        if !self.prepared {
            return Err(Error::Decode("decompress without a prepared header".into()));
        }
        self.prepared = false;
        let data = input.take(input.remaining());

        self.jdec
            .decompress(
                data,
                0,
                &mut self.mcu_buffer,
                &mut self.work_buffer,
                &mut |_decoder, bitmap, rect| {
                    let rect = TileRect::new(rect.left, rect.top, rect.right, rect.bottom);
                    // tjpgd hands over the whole work buffer, packed at the tile width
                    let len = usize::from(rect.width()) * usize::from(rect.height()) * 3;
                    let tile = Tile {
                        rect,
                        rgb: &bitmap[..len.min(bitmap.len())],
                    };
                    Ok(output(&tile))
                },
            )
            .map_err(|err| match err {
                tjpgd::Error::Interrupted => Error::Interrupted,
                err => Error::Decode(format!("{err:?}")),
            })
    }
}
