//! Output surfaces: anything that accepts "open a window, stream packed
//! RGB565 pixels into it, close the window".

use embedded_graphics::{
    pixelcolor::{raw::RawU16, Rgb565},
    prelude::*,
    primitives::Rectangle,
};
use log::trace;

use crate::{Error, Result};

/// Rectangular window on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Window {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    /// Pixel count.
    pub fn len(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Surface driver.
///
/// The three calls are always issued in order `open_window`,
/// `write_pixels`, `close_window` and are never interleaved between two
/// windows. Drivers must not reorder or coalesce windows.
pub trait Surface {
    fn size(&self) -> (u16, u16);

    fn open_window(&mut self, window: Window) -> Result<()>;

    fn write_pixels(&mut self, pixels: &[u16]) -> Result<()>;

    fn close_window(&mut self) -> Result<()>;
}

/// Opens `window`, streams `pixels` and closes it again. The window is
/// closed even when the pixel write fails.
pub fn write_window<S: Surface + ?Sized>(surface: &mut S, window: Window, pixels: &[u16]) -> Result<()> {
    surface.open_window(window)?;
    let written = surface.write_pixels(pixels);
    let closed = surface.close_window();
    written.and(closed)
}

/// Framebuffer in RAM. Records every window it is asked to open.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    width: u16,
    height: u16,
    pixels: Vec<u16>,
    window: Option<Window>,
    cursor: usize,
    windows: Vec<Window>,
}

impl MemorySurface {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; usize::from(width) * usize::from(height)],
            window: None,
            cursor: 0,
            windows: Vec::new(),
        }
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn pixel(&self, x: u16, y: u16) -> u16 {
        self.pixels[usize::from(y) * usize::from(self.width) + usize::from(x)]
    }

    /// Windows opened so far, oldest first.
    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn clear_windows(&mut self) {
        self.windows.clear();
    }

    pub fn fill(&mut self, color: u16) {
        self.pixels.fill(color);
    }
}

impl Surface for MemorySurface {
    fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn open_window(&mut self, window: Window) -> Result<()> {
        if self.window.is_some() {
            return Err(Error::Surface("window already open".into()));
        }
        if u32::from(window.x) + u32::from(window.width) > u32::from(self.width)
            || u32::from(window.y) + u32::from(window.height) > u32::from(self.height)
        {
            return Err(Error::Surface(format!(
                "{window:?} outside {}x{}",
                self.width, self.height
            )));
        }
        self.window = Some(window);
        self.cursor = 0;
        self.windows.push(window);
        Ok(())
    }

    fn write_pixels(&mut self, pixels: &[u16]) -> Result<()> {
        let window = self
            .window
            .ok_or_else(|| Error::Surface("no open window".into()))?;
        if self.cursor + pixels.len() > window.len() {
            return Err(Error::Surface(format!(
                "{} pixels overrun {window:?}",
                self.cursor + pixels.len()
            )));
        }
        let row_width = usize::from(window.width);
        for (i, &px) in pixels.iter().enumerate() {
            let n = self.cursor + i;
            let x = usize::from(window.x) + n % row_width;
            let y = usize::from(window.y) + n / row_width;
            self.pixels[y * usize::from(self.width) + x] = px;
        }
        self.cursor += pixels.len();
        Ok(())
    }

    fn close_window(&mut self) -> Result<()> {
        let window = self
            .window
            .take()
            .ok_or_else(|| Error::Surface("no open window".into()))?;
        if self.cursor != window.len() {
            return Err(Error::Surface(format!(
                "{window:?} closed after {} pixels",
                self.cursor
            )));
        }
        Ok(())
    }
}

/// Adapts an embedded-graphics [`DrawTarget`] (a mipidsi display, a
/// simulator, ...) to the window protocol.
///
/// A write that fills a whole window goes through `fill_contiguous`,
/// which display drivers implement as a single address-window transfer.
pub struct DrawTargetSurface<D> {
    target: D,
    window: Option<Rectangle>,
    cursor: usize,
}

impl<D> DrawTargetSurface<D>
where
    D: DrawTarget<Color = Rgb565>,
    D::Error: core::fmt::Debug,
{
    pub fn new(target: D) -> Self {
        Self {
            target,
            window: None,
            cursor: 0,
        }
    }

    pub fn target(&self) -> &D {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut D {
        &mut self.target
    }

    pub fn into_inner(self) -> D {
        self.target
    }
}

impl<D> Surface for DrawTargetSurface<D>
where
    D: DrawTarget<Color = Rgb565>,
    D::Error: core::fmt::Debug,
{
    fn size(&self) -> (u16, u16) {
        let size = self.target.bounding_box().size;
        (size.width as u16, size.height as u16)
    }

    fn open_window(&mut self, window: Window) -> Result<()> {
        if self.window.is_some() {
            return Err(Error::Surface("window already open".into()));
        }
        self.window = Some(Rectangle::new(
            Point::new(i32::from(window.x), i32::from(window.y)),
            Size::new(u32::from(window.width), u32::from(window.height)),
        ));
        self.cursor = 0;
        Ok(())
    }

    fn write_pixels(&mut self, pixels: &[u16]) -> Result<()> {
        let area = self
            .window
            .ok_or_else(|| Error::Surface("no open window".into()))?;
        let area_len = (area.size.width * area.size.height) as usize;
        if self.cursor + pixels.len() > area_len {
            return Err(Error::Surface(format!(
                "{} pixels overrun {area:?}",
                self.cursor + pixels.len()
            )));
        }

        let colors = pixels.iter().map(|&raw| Rgb565::from(RawU16::new(raw)));
        let drawn = if self.cursor == 0 && pixels.len() == area_len {
            trace!("fill_contiguous {area:?}");
            self.target.fill_contiguous(&area, colors)
        } else {
            let width = area.size.width as usize;
            let start = self.cursor;
            self.target.draw_iter(colors.enumerate().map(|(i, color)| {
                let n = start + i;
                Pixel(
                    area.top_left + Point::new((n % width) as i32, (n / width) as i32),
                    color,
                )
            }))
        };
        drawn.map_err(|err| Error::Surface(format!("{err:?}")))?;
        self.cursor += pixels.len();
        Ok(())
    }

    fn close_window(&mut self) -> Result<()> {
        self.window
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::Surface("no open window".into()))
    }
}
