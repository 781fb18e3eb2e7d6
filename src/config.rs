use std::{fs, num::NonZero, path::Path};

use anyhow::{anyhow, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{Error, MAX_JPEG_SIZE};

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct PlayerConfig {
    /// Surface width in pixels.
    pub width: NonZero<u16>,
    /// Surface height in pixels.
    pub height: NonZero<u16>,
    /// Placement origin on the surface.
    #[serde(default)]
    pub x: u16,
    #[serde(default)]
    pub y: u16,
    /// Frame buffer capacity in bytes.
    #[serde(default = "default_frame_buffer_size")]
    pub frame_buffer_size: usize,
    /// Rows per row buffer; must hold the tallest MCU (16 for 4:2:0).
    #[serde(default = "default_band_height")]
    pub band_height: u16,
    /// Overlap decode and surface transfer on a second thread. Only
    /// honoured by `MjpegPlayer::spawn`.
    #[serde(default)]
    pub pipelined: bool,
    /// Store RGB565 high byte first.
    #[serde(default)]
    pub swap_bytes: bool,
}

fn default_frame_buffer_size() -> usize { MAX_JPEG_SIZE }

fn default_band_height() -> u16 { 16 }

impl PlayerConfig {
    pub fn new(width: NonZero<u16>, height: NonZero<u16>) -> Self {
        Self {
            width,
            height,
            x: 0,
            y: 0,
            frame_buffer_size: default_frame_buffer_size(),
            band_height: default_band_height(),
            pipelined: false,
            swap_bytes: false,
        }
    }

    pub fn get_screen_size(&self) -> (u16, u16) {
        (self.width.get(), self.height.get())
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.frame_buffer_size < 2 {
            return Err(Error::Config(format!(
                "frame buffer of {} bytes cannot hold an end marker",
                self.frame_buffer_size
            )));
        }
        if self.band_height == 0 {
            return Err(Error::Config("band height must be at least one row".into()));
        }
        Ok(())
    }
}

pub fn parse_player_config(data: Vec<u8>) -> Result<PlayerConfig> {
    let data_str = String::from_utf8(data)?;
    info!("Receive Data:{data_str}");
    let config = serde_json::from_str::<PlayerConfig>(&data_str)?;
    config.validate().map_err(|err| anyhow!("{err}"))?;
    Ok(config)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<PlayerConfig> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|err| anyhow!("{}: {err:?}", path.display()))?;
    parse_player_config(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = parse_player_config(br#"{"width":320,"height":240}"#.to_vec()).unwrap();
        assert_eq!(config.get_screen_size(), (320, 240));
        assert_eq!(config.frame_buffer_size, MAX_JPEG_SIZE);
        assert_eq!(config.band_height, 16);
        assert!(!config.pipelined);
        assert!(!config.swap_bytes);
        assert_eq!((config.x, config.y), (0, 0));
        assert_eq!(config, PlayerConfig::new(config.width, config.height));
    }

    #[test]
    fn explicit_fields_win() {
        let json = br#"{"width":240,"height":135,"x":40,"y":53,"frame_buffer_size":4096,"band_height":8,"pipelined":true,"swap_bytes":true}"#;
        let config = parse_player_config(json.to_vec()).unwrap();
        assert_eq!((config.x, config.y), (40, 53));
        assert_eq!(config.frame_buffer_size, 4096);
        assert_eq!(config.band_height, 8);
        assert!(config.pipelined && config.swap_bytes);
    }

    #[test]
    fn rejects_zero_sizes() {
        assert!(parse_player_config(br#"{"width":0,"height":240}"#.to_vec()).is_err());
        assert!(parse_player_config(br#"{"width":1,"height":1,"band_height":0}"#.to_vec()).is_err());

        let mut config = PlayerConfig::new(NonZero::<u16>::MIN, NonZero::<u16>::MIN);
        config.frame_buffer_size = 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn round_trips_through_json() {
        let mut config = PlayerConfig::new(NonZero::<u16>::MIN, NonZero::<u16>::MAX);
        config.pipelined = true;
        let json = serde_json::to_vec(&config).unwrap();
        assert_eq!(parse_player_config(json).unwrap(), config);
    }
}
