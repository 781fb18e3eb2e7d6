//! mjpeg-screen - streaming Motion-JPEG player for RGB565 screens
//!
//! Splits a chunked byte stream into JPEG frames with a fixed-size frame
//! buffer, decodes each frame block by block through a [`TileDecoder`],
//! center-clips it against the screen and writes it band by band into a
//! [`Surface`] as RGB565. Nothing is scaled and nothing is allocated per
//! frame.
//!
//! ```ignore
//! let config = PlayerConfig::new(NonZero::new(320).unwrap(), NonZero::new(240).unwrap());
//! let mut frame_buffer = vec![0u8; config.frame_buffer_size];
//! let mut pool = vec![0u8; TJPGD_POOL_SIZE];
//! let decoder = TjpgdDecoder::new(&mut pool);
//! let mut player = MjpegPlayer::spawn(&config, &mut frame_buffer, decoder, surface)?;
//! while let Some(chunk) = next_chunk() {
//!     if let Err(err) = player.ingest(Some(chunk)) {
//!         warn!("{err}");
//!     }
//! }
//! player.ingest(None)?;
//! ```

mod compositor;
pub mod config;
pub mod decoder;
mod error;
pub mod geometry;
pub mod pixel;
mod player;
pub mod surface;
#[cfg(test)]
mod testing;

pub use config::{parse_player_config, PlayerConfig};
#[cfg(feature = "tjpgd")]
pub use decoder::{TjpgdDecoder, TJPGD_POOL_SIZE};
pub use decoder::{FrameReader, FrameSize, Tile, TileDecoder, TileRect};
pub use error::{Error, Result};
pub use geometry::Geometry;
pub use player::{MjpegPlayer, PlayerState, StreamStats};
pub use surface::{DrawTargetSurface, MemorySurface, Surface, Window};

/// Stream read chunk size.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Default frame buffer capacity.
pub const MAX_JPEG_SIZE: usize = 80_000;
