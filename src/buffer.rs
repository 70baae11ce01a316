//! Pixel storage used by node caches and by the buffers passed between
//! operations.
//!
//! A [`Buffer`] is a window (its extent) onto shared tiled storage. Cloning a
//! buffer or taking a [`Buffer::sub_buffer`] never copies pixels: both handles
//! alias the same storage, which is how a node reads its producer's cache
//! without a copy. Pixels are premultiplied linear RGBA `f32`; reads outside the extent or of
//! tiles that were never written return transparent black.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::rect::Rect;

/// Linear RGBA.
pub type Pixel = [f32; 4];

/// Tile edge used when no tile size is given.
pub const DEFAULT_TILE_SIZE: u32 = 64;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    #[error("The destination holds {got} bytes but {needed} bytes are needed for the requested region.")]
    DestinationTooSmall { needed: usize, got: usize },
    #[error("The source data holds {got} bytes but {needed} bytes are needed for the requested region.")]
    SourceTooSmall { needed: usize, got: usize },
}

/// The pixel layouts a [`Buffer`] can be read into or written from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelFormat {
    /// Four native endian `f32` per pixel
    RgbaFloat,
    /// Three native endian `f32` per pixel, alpha dropped
    RgbFloat,
    /// One native endian `f32` luminance value per pixel
    YFloat,
    /// Four bytes per pixel, clamped to 0..=1 and rounded
    RgbaU8,
    /// Three bytes per pixel, alpha dropped
    RgbU8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::RgbaFloat => 16,
            PixelFormat::RgbFloat => 12,
            PixelFormat::YFloat => 4,
            PixelFormat::RgbaU8 => 4,
            PixelFormat::RgbU8 => 3,
        }
    }
    /// Encode one pixel into `out`, which must be exactly `bytes_per_pixel` long.
    pub fn encode(&self, pixel: &Pixel, out: &mut [u8]) {
        let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        match self {
            PixelFormat::RgbaFloat | PixelFormat::RgbFloat => {
                let channels = if *self == PixelFormat::RgbaFloat { 4 } else { 3 };
                for (c, chunk) in out.chunks_exact_mut(4).take(channels).enumerate() {
                    chunk.copy_from_slice(&pixel[c].to_ne_bytes());
                }
            }
            PixelFormat::YFloat => out.copy_from_slice(&luminance(pixel).to_ne_bytes()),
            PixelFormat::RgbaU8 | PixelFormat::RgbU8 => {
                for (o, v) in out.iter_mut().zip(pixel.iter()) {
                    *o = to_u8(*v);
                }
            }
        }
    }
    /// Decode one pixel. Formats without alpha decode as opaque.
    pub fn decode(&self, bytes: &[u8]) -> Pixel {
        let float = |i: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            f32::from_ne_bytes(b)
        };
        match self {
            PixelFormat::RgbaFloat => [float(0), float(1), float(2), float(3)],
            PixelFormat::RgbFloat => [float(0), float(1), float(2), 1.0],
            PixelFormat::YFloat => {
                let y = float(0);
                [y, y, y, 1.0]
            }
            PixelFormat::RgbaU8 => [
                bytes[0] as f32 / 255.0,
                bytes[1] as f32 / 255.0,
                bytes[2] as f32 / 255.0,
                bytes[3] as f32 / 255.0,
            ],
            PixelFormat::RgbU8 => [
                bytes[0] as f32 / 255.0,
                bytes[1] as f32 / 255.0,
                bytes[2] as f32 / 255.0,
                1.0,
            ],
        }
    }
}

fn luminance(p: &Pixel) -> f32 {
    0.2126 * p[0] + 0.7152 * p[1] + 0.0722 * p[2]
}

struct Storage {
    tile_size: i32,
    tiles: HashMap<(i32, i32), Box<[Pixel]>>,
}

impl Storage {
    fn new(tile_size: u32) -> Self {
        Self {
            tile_size: tile_size.max(1) as i32,
            tiles: HashMap::new(),
        }
    }
    #[inline]
    fn locate(&self, x: i32, y: i32) -> ((i32, i32), usize) {
        let ts = self.tile_size;
        let tile = (x.div_euclid(ts), y.div_euclid(ts));
        let index = (y.rem_euclid(ts) * ts + x.rem_euclid(ts)) as usize;
        (tile, index)
    }
    fn get(&self, x: i32, y: i32) -> Pixel {
        let (tile, index) = self.locate(x, y);
        self.tiles
            .get(&tile)
            .map_or([0.0; 4], |pixels| pixels[index])
    }
    fn set(&mut self, x: i32, y: i32, pixel: Pixel) {
        let (tile, index) = self.locate(x, y);
        let ts = self.tile_size as usize;
        let pixels = self
            .tiles
            .entry(tile)
            .or_insert_with(|| vec![[0.0; 4]; ts * ts].into_boxed_slice());
        pixels[index] = pixel;
    }
}

/// A handle to a rectangular window of shared pixel storage.
#[derive(Clone)]
pub struct Buffer {
    storage: Arc<RwLock<Storage>>,
    extent: Rect,
}

impl Buffer {
    /// A new buffer with its own storage.
    pub fn new(extent: Rect) -> Self {
        Self::with_tile_size(extent, DEFAULT_TILE_SIZE)
    }
    pub fn with_tile_size(extent: Rect, tile_size: u32) -> Self {
        Self {
            storage: Arc::new(RwLock::new(Storage::new(tile_size))),
            extent,
        }
    }
    /// A buffer with an empty extent. Reads return transparent black.
    pub fn empty() -> Self {
        Self::new(Rect::empty())
    }
    /// A buffer holding `pixels` laid out row by row over `extent`.
    pub fn from_pixels(extent: Rect, pixels: &[Pixel]) -> Self {
        let buffer = Self::new(extent);
        buffer.write_rect(&extent, pixels);
        buffer
    }
    pub fn extent(&self) -> Rect {
        self.extent
    }
    /// An aliasing view of `rect` (clipped to this buffer's extent).
    pub fn sub_buffer(&self, rect: &Rect) -> Buffer {
        Buffer {
            storage: Arc::clone(&self.storage),
            extent: self.extent.intersect(rect),
        }
    }
    /// An aliasing view with an arbitrary extent, which may be larger than
    /// this one.
    pub fn with_extent(&self, extent: Rect) -> Buffer {
        Buffer {
            storage: Arc::clone(&self.storage),
            extent,
        }
    }
    /// True if both handles view the same storage.
    pub fn shares_storage(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }
    pub fn tile_size(&self) -> u32 {
        self.read_storage().tile_size as u32
    }

    fn read_storage(&self) -> RwLockReadGuard<'_, Storage> {
        self.storage.read().unwrap_or_else(PoisonError::into_inner)
    }
    fn write_storage(&self) -> RwLockWriteGuard<'_, Storage> {
        self.storage.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_pixel(&self, x: i32, y: i32) -> Pixel {
        if self.extent.contains_point(x, y) {
            self.read_storage().get(x, y)
        } else {
            [0.0; 4]
        }
    }
    /// Writes outside the extent are ignored.
    pub fn set_pixel(&self, x: i32, y: i32, pixel: Pixel) {
        if self.extent.contains_point(x, y) {
            self.write_storage().set(x, y, pixel);
        }
    }

    /// Read `rect` row by row. Pixels outside the extent read as transparent.
    pub fn read_rect(&self, rect: &Rect) -> Vec<Pixel> {
        if rect.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(rect.area() as usize);
        let storage = self.read_storage();
        for y in rect.y..(rect.y2() as i32) {
            for x in rect.x..(rect.x2() as i32) {
                if self.extent.contains_point(x, y) {
                    out.push(storage.get(x, y));
                } else {
                    out.push([0.0; 4]);
                }
            }
        }
        out
    }
    /// Write `pixels` laid out row by row over `rect`, skipping anything
    /// outside the extent.
    pub fn write_rect(&self, rect: &Rect, pixels: &[Pixel]) {
        if rect.is_empty() {
            return;
        }
        let mut storage = self.write_storage();
        let mut source = pixels.iter();
        for y in rect.y..(rect.y2() as i32) {
            for x in rect.x..(rect.x2() as i32) {
                let Some(pixel) = source.next() else {
                    return;
                };
                if self.extent.contains_point(x, y) {
                    storage.set(x, y, *pixel);
                }
            }
        }
    }
    /// Set every pixel of `rect` within the extent.
    pub fn fill(&self, rect: &Rect, pixel: Pixel) {
        let area = self.extent.intersect(rect);
        if area.is_empty() {
            return;
        }
        let mut storage = self.write_storage();
        for y in area.y..(area.y2() as i32) {
            for x in area.x..(area.x2() as i32) {
                storage.set(x, y, pixel);
            }
        }
    }
    /// Reset `rect` to transparent black. Only tiles that were written are
    /// touched, so clearing the infinite plane is cheap.
    pub fn clear(&self, rect: &Rect) {
        let area = self.extent.intersect(rect);
        if area.is_empty() {
            return;
        }
        let mut storage = self.write_storage();
        let ts = storage.tile_size;
        for ((tx, ty), pixels) in storage.tiles.iter_mut() {
            let tile = Rect::new(tx * ts, ty * ts, ts, ts);
            let overlap = tile.intersect(&area);
            if overlap.is_empty() {
                continue;
            }
            for y in overlap.y..(overlap.y2() as i32) {
                for x in overlap.x..(overlap.x2() as i32) {
                    let index = ((y - tile.y) * ts + (x - tile.x)) as usize;
                    pixels[index] = [0.0; 4];
                }
            }
        }
    }
    /// Copy `rect` from `source` into this buffer. Copying a buffer onto a
    /// view of its own storage is a no op.
    pub fn copy_from(&self, source: &Buffer, rect: &Rect) {
        let area = self.extent.intersect(rect);
        if area.is_empty() || self.shares_storage(source) {
            return;
        }
        let pixels = source.read_rect(&area);
        self.write_rect(&area, &pixels);
    }

    /// Read `roi`, given in coordinates scaled by `scale`, into `destination`
    /// in `format`. Scaled reads sample the nearest source pixel centre.
    pub fn get(
        &self,
        roi: &Rect,
        scale: f64,
        format: PixelFormat,
        destination: &mut [u8],
    ) -> Result<(), BufferError> {
        let bpp = format.bytes_per_pixel();
        let needed = byte_len(roi, bpp);
        if destination.len() < needed {
            return Err(BufferError::DestinationTooSmall {
                needed,
                got: destination.len(),
            });
        }
        if roi.is_empty() {
            return Ok(());
        }
        let pixels = if scale == 1.0 {
            self.read_rect(roi)
        } else {
            let storage = self.read_storage();
            let mut pixels = Vec::with_capacity(roi.area() as usize);
            for y in roi.y..(roi.y2() as i32) {
                let sy = ((y as f64 + 0.5) / scale).floor() as i32;
                for x in roi.x..(roi.x2() as i32) {
                    let sx = ((x as f64 + 0.5) / scale).floor() as i32;
                    if self.extent.contains_point(sx, sy) {
                        pixels.push(storage.get(sx, sy));
                    } else {
                        pixels.push([0.0; 4]);
                    }
                }
            }
            pixels
        };
        for (pixel, out) in pixels.iter().zip(destination.chunks_exact_mut(bpp)) {
            format.encode(pixel, out);
        }
        Ok(())
    }

    /// Write `roi` from `source` laid out in `format`.
    pub fn set(&self, roi: &Rect, format: PixelFormat, source: &[u8]) -> Result<(), BufferError> {
        let bpp = format.bytes_per_pixel();
        let needed = byte_len(roi, bpp);
        if source.len() < needed {
            return Err(BufferError::SourceTooSmall {
                needed,
                got: source.len(),
            });
        }
        let pixels: Vec<Pixel> = source
            .chunks_exact(bpp)
            .take(roi.area() as usize)
            .map(|bytes| format.decode(bytes))
            .collect();
        self.write_rect(roi, &pixels);
        Ok(())
    }
}

/// Bytes needed to hold `roi` at `bpp` bytes per pixel, saturating for
/// regions no slice could hold.
fn byte_len(roi: &Rect, bpp: usize) -> usize {
    usize::try_from(roi.area())
        .ok()
        .and_then(|area| area.checked_mul(bpp))
        .unwrap_or(usize::MAX)
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.shares_storage(other) && self.extent == other.extent
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("extent", &self.extent)
            .field("tiles", &self.read_storage().tiles.len())
            .finish()
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_regions_are_rejected_by_size() {
        let buffer = Buffer::new(Rect::new(0, 0, 4, 4));
        let mut bytes = [0u8; 16];
        let plane = Rect::infinite_plane();
        assert!(matches!(
            buffer.get(&plane, 1.0, PixelFormat::RgbaFloat, &mut bytes),
            Err(BufferError::DestinationTooSmall { needed: usize::MAX, got: 16 })
        ));
        assert!(matches!(
            buffer.set(&plane, PixelFormat::RgbaFloat, &bytes),
            Err(BufferError::SourceTooSmall { needed: usize::MAX, got: 16 })
        ));
        assert!(buffer
            .get(&Rect::new(0, 0, 1, 1), 1.0, PixelFormat::RgbaFloat, &mut bytes)
            .is_ok());
    }

    #[test]
    fn sub_buffer_aliases_storage() {
        let buffer = Buffer::new(Rect::new(0, 0, 100, 100));
        let view = buffer.sub_buffer(&Rect::new(10, 10, 5, 5));
        view.fill(&Rect::new(0, 0, 100, 100), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(buffer.get_pixel(12, 12), [1.0, 0.0, 0.0, 1.0]);
        // Writes through the view are clipped to the view's extent
        assert_eq!(buffer.get_pixel(9, 9), [0.0; 4]);
        assert!(view.shares_storage(&buffer));
        assert_eq!(view.extent(), Rect::new(10, 10, 5, 5));
    }

    #[test]
    fn negative_coordinates_and_tile_edges() {
        let buffer = Buffer::with_tile_size(Rect::new(-10, -10, 20, 20), 4);
        buffer.set_pixel(-1, -1, [0.5; 4]);
        buffer.set_pixel(3, 4, [0.25; 4]);
        assert_eq!(buffer.get_pixel(-1, -1), [0.5; 4]);
        assert_eq!(buffer.get_pixel(3, 4), [0.25; 4]);
        assert_eq!(buffer.get_pixel(4, 4), [0.0; 4]);
        assert_eq!(buffer.get_pixel(50, 50), [0.0; 4]);
    }

    #[test]
    fn get_encodes_formats() {
        let buffer = Buffer::new(Rect::new(0, 0, 2, 1));
        buffer.fill(&Rect::new(0, 0, 2, 1), [1.0, 0.0, 1.0, 1.0]);
        let mut bytes = vec![0u8; 8];
        buffer
            .get(&Rect::new(0, 0, 2, 1), 1.0, PixelFormat::RgbaU8, &mut bytes)
            .unwrap();
        assert_eq!(bytes, vec![255, 0, 255, 255, 255, 0, 255, 255]);
        let mut floats = vec![0u8; 16];
        buffer
            .get(&Rect::new(1, 0, 1, 1), 1.0, PixelFormat::RgbaFloat, &mut floats)
            .unwrap();
        assert_eq!(PixelFormat::RgbaFloat.decode(&floats), [1.0, 0.0, 1.0, 1.0]);
        let mut small = vec![0u8; 3];
        assert_eq!(
            buffer.get(&Rect::new(0, 0, 2, 1), 1.0, PixelFormat::RgbaU8, &mut small),
            Err(BufferError::DestinationTooSmall { needed: 8, got: 3 })
        );
    }

    #[test]
    fn scaled_get_samples_pixel_centres() {
        let buffer = Buffer::new(Rect::new(0, 0, 4, 4));
        for x in 0..4 {
            buffer.fill(&Rect::new(x, 0, 1, 4), [x as f32 / 4.0, 0.0, 0.0, 1.0]);
        }
        let mut bytes = vec![0u8; 2 * 4];
        buffer
            .get(&Rect::new(0, 0, 2, 1), 0.5, PixelFormat::RgbaU8, &mut bytes)
            .unwrap();
        // Output pixel 0 samples source x = 1, output pixel 1 samples x = 3
        assert_eq!(bytes[0], 64);
        assert_eq!(bytes[4], 191);
    }

    #[test]
    fn set_round_trips_through_u8() {
        let buffer = Buffer::new(Rect::new(0, 0, 1, 1));
        buffer
            .set(&Rect::new(0, 0, 1, 1), PixelFormat::RgbU8, &[0, 255, 0])
            .unwrap();
        assert_eq!(buffer.get_pixel(0, 0), [0.0, 1.0, 0.0, 1.0]);
    }
}
