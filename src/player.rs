//! Frame assembler: turns an arbitrarily chunked MJPEG byte stream into
//! decoded frames on a [`Surface`].

use std::sync::MutexGuard;

use log::{debug, warn};

use crate::compositor::Compositor;
use crate::config::PlayerConfig;
use crate::decoder::{FrameReader, Tile, TileDecoder};
use crate::geometry::Geometry;
use crate::surface::Surface;
use crate::{Error, Result};

const SOI_MARKER: u8 = 0xD8;
const EOI_MARKER: u8 = 0xD9;

/// Counters kept for the whole session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames_decoded: u64,
    pub frames_failed: u64,
    /// Frames discarded because the frame buffer filled up before an end
    /// marker arrived.
    pub overflows: u64,
    pub bands_flushed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Frame buffer empty.
    Idle,
    /// Bytes of an unterminated frame are pending.
    Buffering,
}

/// Streaming MJPEG player.
///
/// Bytes are appended to a caller provided frame buffer. Whenever the
/// buffer ends with `FF D9` its content is decoded as one frame and drawn
/// before the next byte is looked at, so [`ingest`](Self::ingest) blocks for
/// one decode per frame boundary it crosses.
///
/// The boundary check is purely syntactic. An `FF D9` pair inside the
/// entropy coded data of a frame ends that frame early; the truncated frame
/// fails (or draws partially) and the tail becomes the next, broken, frame.
/// Encoders stuff `FF` bytes in scan data, so this only happens with
/// non-conforming streams.
pub struct MjpegPlayer<'a, D, S> {
    frame_buffer: &'a mut [u8],
    offset: usize,
    width: u16,
    height: u16,
    decoder: D,
    compositor: Compositor<S>,
    stats: StreamStats,
}

fn check_buffer(config: &PlayerConfig, frame_buffer: &[u8]) -> Result<()> {
    config.validate()?;
    if frame_buffer.len() < 2 {
        return Err(Error::Config(format!(
            "frame buffer of {} bytes cannot hold an end marker",
            frame_buffer.len()
        )));
    }
    let (width, height) = config.get_screen_size();
    debug!(
        "player {width}x{height} at ({}, {}), frame buffer {} bytes, band {} rows, pipelined: {}",
        config.x,
        config.y,
        frame_buffer.len(),
        config.band_height,
        config.pipelined
    );
    Ok(())
}

impl<'a, D, S> MjpegPlayer<'a, D, S>
where
    D: TileDecoder,
    S: Surface + Send + 'static,
{
    /// Builds a player that honors [`PlayerConfig::pipelined`]: when set,
    /// surface writes run on a transfer thread started here and joined when
    /// the player is dropped.
    pub fn spawn(config: &PlayerConfig, frame_buffer: &'a mut [u8], decoder: D, surface: S) -> Result<Self> {
        check_buffer(config, frame_buffer)?;
        let compositor = if config.pipelined {
            Compositor::pipelined(
                surface,
                config.width.get(),
                config.band_height,
                (config.x, config.y),
                config.swap_bytes,
            )?
        } else {
            Compositor::new(
                surface,
                config.width.get(),
                config.band_height,
                (config.x, config.y),
                config.swap_bytes,
            )
        };
        Ok(Self::with_compositor(config, frame_buffer, decoder, compositor))
    }
}

impl<'a, D, S> MjpegPlayer<'a, D, S>
where
    D: TileDecoder,
    S: Surface,
{
    /// Builds a sequential player. The surface never leaves the calling
    /// thread; use [`spawn`](Self::spawn) for the pipelined mode.
    pub fn new(config: &PlayerConfig, frame_buffer: &'a mut [u8], decoder: D, surface: S) -> Result<Self> {
        check_buffer(config, frame_buffer)?;
        if config.pipelined {
            return Err(Error::Config("pipelined mode needs MjpegPlayer::spawn".into()));
        }
        let compositor = Compositor::new(
            surface,
            config.width.get(),
            config.band_height,
            (config.x, config.y),
            config.swap_bytes,
        );
        Ok(Self::with_compositor(config, frame_buffer, decoder, compositor))
    }

    fn with_compositor(config: &PlayerConfig, frame_buffer: &'a mut [u8], decoder: D, compositor: Compositor<S>) -> Self {
        let (width, height) = config.get_screen_size();
        Self {
            frame_buffer,
            offset: 0,
            width,
            height,
            decoder,
            compositor,
            stats: StreamStats::default(),
        }
    }

    /// Feeds the next chunk of the stream.
    ///
    /// `None` or an empty chunk ends the stream: a pending partial frame is
    /// decoded once as is and the buffer is reset, and the result of that
    /// attempt is returned.
    ///
    /// A frame that fails to decode is dropped and its error returned right
    /// away; bytes of `data` after its end marker are not consumed. Frame
    /// buffer overflow is not an error: the pending bytes are discarded and
    /// counted in [`StreamStats::overflows`].
    pub fn ingest(&mut self, data: Option<&[u8]>) -> Result<()> {
        let data = match data {
            Some(data) if !data.is_empty() => data,
            _ => return self.finish(),
        };

        for &byte in data {
            if self.offset == self.frame_buffer.len() {
                self.overflow();
            }
            self.frame_buffer[self.offset] = byte;
            self.offset += 1;

            if byte == EOI_MARKER && self.offset >= 2 && self.frame_buffer[self.offset - 2] == 0xFF {
                self.draw_frame()?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.offset == 0 {
            return Ok(());
        }
        debug!("end of stream, flushing {} pending bytes", self.offset);
        self.draw_frame()
    }

    fn overflow(&mut self) {
        self.stats.overflows += 1;
        if self.stats.overflows % 100 == 1 {
            warn!(
                "frame buffer full ({} bytes) without end marker, frame dropped (x{})",
                self.frame_buffer.len(),
                self.stats.overflows
            );
        }
        self.offset = 0;
    }

    /// Decodes the buffered bytes as one frame and resets the buffer.
    fn draw_frame(&mut self) -> Result<()> {
        let len = self.offset;
        self.offset = 0;

        let result = self.decode(len);
        match &result {
            Ok(()) => {
                self.stats.frames_decoded += 1;
                debug!("frame {} ({len} bytes) drawn", self.stats.frames_decoded);
            }
            Err(err) => {
                self.stats.frames_failed += 1;
                if len >= 2 && self.frame_buffer[1] != SOI_MARKER {
                    warn!("frame of {len} bytes without SOI dropped: {err}");
                } else {
                    warn!("frame of {len} bytes dropped: {err}");
                }
            }
        }
        result
    }

    fn decode(&mut self, len: usize) -> Result<()> {
        let mut input = FrameReader::new(&self.frame_buffer[..len]);
        let size = self.decoder.prepare(&mut input)?;
        let geometry = Geometry::resolve(size.width, size.height, self.width, self.height);
        debug!("frame {}x{}: {geometry:?}", size.width, size.height);

        let decoder = &mut self.decoder;
        self.compositor.compose(&geometry, |push| {
            let mut failure = None;
            let decoded = decoder.decompress(&mut input, &mut |tile: &Tile<'_>| match push(tile) {
                Ok(()) => true,
                Err(err) => {
                    failure = Some(err);
                    false
                }
            });
            // the consumer's own error beats the decoder's `Interrupted`
            match failure {
                Some(err) => Err(err),
                None => decoded,
            }
        })
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            bands_flushed: self.compositor.bands_flushed(),
            ..self.stats
        }
    }

    /// Bytes of the frame being assembled.
    pub fn pending(&self) -> usize {
        self.offset
    }

    pub fn state(&self) -> PlayerState {
        if self.offset == 0 {
            PlayerState::Idle
        } else {
            PlayerState::Buffering
        }
    }

    pub fn capacity(&self) -> usize {
        self.frame_buffer.len()
    }

    /// Locks the surface. Between frames nothing else holds the lock.
    pub fn surface(&self) -> MutexGuard<'_, S> {
        self.compositor.surface()
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut D {
        &mut self.decoder
    }

    /// Stops the transfer thread, if any, and returns decoder and surface.
    pub fn into_parts(self) -> Result<(D, S)> {
        let surface = self.compositor.into_surface()?;
        Ok((self.decoder, surface))
    }
}
