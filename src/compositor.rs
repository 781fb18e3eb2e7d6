//! Band compositor: gathers converted tiles of one MCU row into a row
//! buffer and writes the band to the surface as one window.
//!
//! Two row buffers are owned for the whole session. Sequentially they
//! simply alternate. In pipelined mode they circulate between the decoding
//! thread and a long-lived transfer thread through two bounded channels,
//! so the decoder fills one buffer while the other is on its way to the
//! surface and a buffer is never written and read at the same time.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, trace, warn};

use crate::decoder::Tile;
use crate::geometry::Geometry;
use crate::pixel::{clip_tile, convert_tile};
use crate::surface::{write_window, Surface, Window};
use crate::{Error, Result};

const TRANSFER_STACK_SIZE: usize = 16 * 1024;

/// The two fixed-size row buffers and the index of the one being filled.
pub(crate) struct RowBuffers {
    slots: [Box<[u16]>; 2],
    active: usize,
}

impl RowBuffers {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: [
                vec![0u16; capacity].into_boxed_slice(),
                vec![0u16; capacity].into_boxed_slice(),
            ],
            active: 0,
        }
    }

    fn active(&self) -> &[u16] {
        &self.slots[self.active]
    }

    fn active_mut(&mut self) -> &mut [u16] {
        &mut self.slots[self.active]
    }

    fn toggle(&mut self) {
        self.active ^= 1;
    }
}

/// Where a finished band goes.
trait BandOutput {
    /// Row buffer the next tiles are converted into.
    fn buffer(&mut self) -> Result<&mut [u16]>;

    /// Hands the filled buffer over for `window`.
    fn submit(&mut self, window: Window) -> Result<()>;
}

struct Direct<'a, S: ?Sized> {
    buffers: &'a mut RowBuffers,
    surface: &'a mut S,
}

impl<S: Surface + ?Sized> BandOutput for Direct<'_, S> {
    fn buffer(&mut self) -> Result<&mut [u16]> {
        Ok(self.buffers.active_mut())
    }

    fn submit(&mut self, window: Window) -> Result<()> {
        let pixels = &self.buffers.active()[..window.len()];
        write_window(&mut *self.surface, window, pixels)?;
        self.buffers.toggle();
        Ok(())
    }
}

type Filled = (Window, Box<[u16]>);
type Returned = (Box<[u16]>, Result<()>);

/// Decoder side of the transfer thread. Holds whichever of the two row
/// buffers are not currently queued on the transfer thread.
struct TransferWorker {
    current: Option<Box<[u16]>>,
    spare: Option<Box<[u16]>>,
    filled: Option<SyncSender<Filled>>,
    free: Receiver<Returned>,
    handle: Option<JoinHandle<()>>,
}

impl TransferWorker {
    fn spawn<S: Surface + Send + 'static>(surface: Arc<Mutex<S>>, capacity: usize) -> Result<Self> {
        let (filled_tx, filled_rx) = mpsc::sync_channel::<Filled>(2);
        let (free_tx, free_rx) = mpsc::sync_channel::<Returned>(2);
        let handle = thread::Builder::new()
            .name("band_transfer".to_string())
            .stack_size(TRANSFER_STACK_SIZE)
            .spawn(move || transfer(surface, filled_rx, free_tx))
            .map_err(|err| Error::Surface(format!("transfer thread: {err:?}")))?;
        debug!("band transfer thread started");
        Ok(Self {
            current: Some(vec![0u16; capacity].into_boxed_slice()),
            spare: Some(vec![0u16; capacity].into_boxed_slice()),
            filled: Some(filled_tx),
            free: free_rx,
            handle: Some(handle),
        })
    }

    fn current_mut(&mut self) -> Result<&mut [u16]> {
        self.current
            .as_deref_mut()
            .ok_or_else(|| Error::Surface("no row buffer".into()))
    }

    fn home(&self) -> usize {
        usize::from(self.current.is_some()) + usize::from(self.spare.is_some())
    }

    /// Waits until both buffers are back, which means every band of the
    /// frame reached the surface. Returns the first transfer error seen.
    fn finish(&mut self) -> Result<()> {
        let mut result = Ok(());
        while self.home() < 2 {
            let (buffer, transferred) = self
                .free
                .recv()
                .map_err(|_| Error::Surface("transfer thread stopped".into()))?;
            if self.current.is_none() {
                self.current = Some(buffer);
            } else {
                self.spare = Some(buffer);
            }
            if result.is_ok() {
                result = transferred;
            }
        }
        result
    }
}

impl BandOutput for TransferWorker {
    fn buffer(&mut self) -> Result<&mut [u16]> {
        if self.current.is_none() {
            match self.spare.take() {
                Some(buffer) => self.current = Some(buffer),
                // wait for the transfer thread to release the other buffer
                None => {
                    let (buffer, result) = self
                        .free
                        .recv()
                        .map_err(|_| Error::Surface("transfer thread stopped".into()))?;
                    self.current = Some(buffer);
                    result?;
                }
            }
        }
        self.current_mut()
    }

    fn submit(&mut self, window: Window) -> Result<()> {
        let buffer = self.current.take().ok_or_else(|| Error::Surface("no row buffer".into()))?;
        let filled = self.filled.as_ref().ok_or_else(|| Error::Surface("transfer closed".into()))?;
        filled
            .send((window, buffer))
            .map_err(|_| Error::Surface("transfer thread stopped".into()))
    }
}

impl Drop for TransferWorker {
    fn drop(&mut self) {
        drop(self.filled.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("band transfer thread panicked");
            }
        }
    }
}

fn transfer<S: Surface>(surface: Arc<Mutex<S>>, filled: Receiver<Filled>, free: SyncSender<Returned>) {
    for (window, buffer) in filled {
        let result = write_window(&mut *lock(&surface), window, &buffer[..window.len()]);
        if free.send((buffer, result)).is_err() {
            break;
        }
    }
    debug!("band transfer thread stopped");
}

fn lock<S>(surface: &Mutex<S>) -> MutexGuard<'_, S> {
    surface.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-frame band state.
struct BandWriter<'o, O> {
    geometry: Geometry,
    origin: (u16, u16),
    band_height: u16,
    swap_bytes: bool,
    /// (first visible source row, visible rows) of the band being filled.
    band: Option<(u16, u16)>,
    flushed: u64,
    out: &'o mut O,
}

impl<'o, O: BandOutput> BandWriter<'o, O> {
    fn new(geometry: Geometry, origin: (u16, u16), band_height: u16, swap_bytes: bool, out: &'o mut O) -> Self {
        Self {
            geometry,
            origin,
            band_height,
            swap_bytes,
            band: None,
            flushed: 0,
            out,
        }
    }

    fn push(&mut self, tile: &Tile<'_>) -> Result<()> {
        let rect = tile.rect;
        if rect.height() > self.band_height {
            return Err(Error::BandOverflow {
                rows: rect.height(),
                capacity: self.band_height,
            });
        }

        if let Some(clip) = clip_tile(&rect, &self.geometry) {
            let buffer = self.out.buffer()?;
            convert_tile(tile, &clip, &self.geometry, buffer, self.swap_bytes)?;
            self.band.get_or_insert((clip.first_row, clip.rows));
        }

        // the tile touching the right edge closes its MCU row
        if u32::from(rect.right) + 1 >= u32::from(self.geometry.frame_width) {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let Some((first_row, rows)) = self.band.take() else {
            return Ok(());
        };
        let g = &self.geometry;
        let window = Window::new(
            self.origin.0.saturating_add(g.place_x),
            self.origin.1.saturating_add(g.place_y + (first_row - g.skip_y)),
            g.visible_width,
            rows,
        );
        trace!("band {window:?}");
        self.out.submit(window)?;
        self.flushed += 1;
        Ok(())
    }

    /// Feeds every tile `produce` emits, then flushes a trailing band.
    fn run<F>(&mut self, produce: F) -> Result<()>
    where
        F: FnOnce(&mut dyn FnMut(&Tile<'_>) -> Result<()>) -> Result<()>,
    {
        produce(&mut |tile: &Tile<'_>| self.push(tile))?;
        self.flush()
    }
}

enum Output {
    Direct(RowBuffers),
    Pipelined(TransferWorker),
}

/// Output side of the pipeline. Owns the surface for the whole session.
pub(crate) struct Compositor<S> {
    surface: Arc<Mutex<S>>,
    output: Output,
    band_height: u16,
    origin: (u16, u16),
    swap_bytes: bool,
    bands_flushed: u64,
}

impl<S: Surface> Compositor<S> {
    /// Sequential compositor. Row buffers hold `surface_width * band_height`
    /// pixels each.
    pub(crate) fn new(surface: S, surface_width: u16, band_height: u16, origin: (u16, u16), swap_bytes: bool) -> Self {
        Self {
            surface: Arc::new(Mutex::new(surface)),
            output: Output::Direct(RowBuffers::new(usize::from(surface_width) * usize::from(band_height))),
            band_height,
            origin,
            swap_bytes,
            bands_flushed: 0,
        }
    }

    pub(crate) fn bands_flushed(&self) -> u64 {
        self.bands_flushed
    }

    pub(crate) fn surface(&self) -> MutexGuard<'_, S> {
        lock(&self.surface)
    }

    /// Stops the transfer thread, if any, and hands the surface back.
    pub(crate) fn into_surface(self) -> Result<S> {
        drop(self.output);
        Arc::into_inner(self.surface)
            .map(|surface| surface.into_inner().unwrap_or_else(PoisonError::into_inner))
            .ok_or_else(|| Error::Surface("surface still shared".into()))
    }

    /// Runs `produce` for one frame. `produce` receives the tile consumer
    /// and returns once the decoder is done. In pipelined mode this also
    /// waits for the last band to reach the surface.
    pub(crate) fn compose<F>(&mut self, geometry: &Geometry, produce: F) -> Result<()>
    where
        F: FnOnce(&mut dyn FnMut(&Tile<'_>) -> Result<()>) -> Result<()>,
    {
        let (origin, band_height, swap_bytes) = (self.origin, self.band_height, self.swap_bytes);
        let (result, flushed) = match &mut self.output {
            Output::Direct(buffers) => {
                let mut surface = lock(&self.surface);
                let mut out = Direct {
                    buffers,
                    surface: &mut *surface,
                };
                let mut writer = BandWriter::new(*geometry, origin, band_height, swap_bytes, &mut out);
                let result = writer.run(produce);
                (result, writer.flushed)
            }
            Output::Pipelined(worker) => {
                let mut writer = BandWriter::new(*geometry, origin, band_height, swap_bytes, worker);
                let produced = writer.run(produce);
                let flushed = writer.flushed;
                let transferred = worker.finish();
                debug!("pipelined frame: {flushed} bands");
                (produced.and(transferred), flushed)
            }
        };
        self.bands_flushed += flushed;
        result
    }
}

impl<S: Surface + Send + 'static> Compositor<S> {
    /// Compositor whose surface writes run on a dedicated transfer thread,
    /// started here and stopped when the compositor is dropped.
    pub(crate) fn pipelined(
        surface: S,
        surface_width: u16,
        band_height: u16,
        origin: (u16, u16),
        swap_bytes: bool,
    ) -> Result<Self> {
        let surface = Arc::new(Mutex::new(surface));
        let capacity = usize::from(surface_width) * usize::from(band_height);
        let worker = TransferWorker::spawn(Arc::clone(&surface), capacity)?;
        Ok(Self {
            surface,
            output: Output::Pipelined(worker),
            band_height,
            origin,
            swap_bytes,
            bands_flushed: 0,
        })
    }
}
