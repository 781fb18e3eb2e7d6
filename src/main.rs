use std::{fs::File, io::Read, num::NonZero};

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use log::*;
use static_cell::StaticCell;

use mjpeg_screen::config::load_config;
use mjpeg_screen::pixel::rgb565_to_rgb888;
use mjpeg_screen::{MemorySurface, MjpegPlayer, PlayerConfig, Surface, TjpgdDecoder, READ_BUFFER_SIZE, TJPGD_POOL_SIZE};

const DEFAULT_WIDTH: u16 = 320;
const DEFAULT_HEIGHT: u16 = 240;

fn main() -> Result<()> {
    let _ = env_logger::builder().is_test(false).try_init();

    let mut args = std::env::args().skip(1);
    let stream_path = args
        .next()
        .ok_or_else(|| anyhow!("usage: mjpeg-screen <stream.mjpeg> [config.json] [out.png]"))?;
    let config = match args.next() {
        Some(path) => load_config(path)?,
        None => PlayerConfig::new(
            NonZero::new(DEFAULT_WIDTH).ok_or_else(|| anyhow!("zero width"))?,
            NonZero::new(DEFAULT_HEIGHT).ok_or_else(|| anyhow!("zero height"))?,
        ),
    };
    let out_path = args.next().unwrap_or_else(|| "frame.png".to_string());

    let (width, height) = config.get_screen_size();
    let surface = MemorySurface::new(
        width.saturating_add(config.x),
        height.saturating_add(config.y),
    );

    static FRAME_BUFFER: StaticCell<Box<[u8]>> = StaticCell::new();
    let frame_buffer = FRAME_BUFFER.init(vec![0u8; config.frame_buffer_size].into_boxed_slice());
    static DECODER_POOL: StaticCell<Box<[u8]>> = StaticCell::new();
    let pool = DECODER_POOL.init(vec![0u8; TJPGD_POOL_SIZE].into_boxed_slice());

    let mut player = MjpegPlayer::spawn(&config, frame_buffer, TjpgdDecoder::new(pool), surface)
        .map_err(|err| anyhow!("{err}"))?;

    let mut file = File::open(&stream_path).map_err(|err| anyhow!("{stream_path}: {err:?}"))?;
    let mut read_buf = [0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut read_buf)?;
        if n == 0 {
            break;
        }
        if let Err(err) = player.ingest(Some(&read_buf[..n])) {
            error!("ingest: {err}");
        }
    }
    if let Err(err) = player.ingest(None) {
        error!("end of stream: {err}");
    }

    let stats = player.stats();
    info!(
        "decoded:{} failed:{} overflows:{} bands:{}",
        stats.frames_decoded, stats.frames_failed, stats.overflows, stats.bands_flushed
    );

    let (_, surface) = player.into_parts().map_err(|err| anyhow!("{err}"))?;
    let (surface_width, surface_height) = surface.size();
    let image = RgbImage::from_fn(u32::from(surface_width), u32::from(surface_height), |x, y| {
        let pixel = surface.pixel(x as u16, y as u16);
        let pixel = if config.swap_bytes { pixel.swap_bytes() } else { pixel };
        let (r, g, b) = rgb565_to_rgb888(pixel);
        Rgb([r, g, b])
    });
    image.save(&out_path)?;
    info!("last frame saved to {out_path}");
    Ok(())
}
