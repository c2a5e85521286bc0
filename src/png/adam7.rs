//! Adam7 interlacing.
//!
//! An interlaced image is stored as 7 "reduced" images (passes), each taking
//! every Nth pixel of every Mth row starting from some offset:
//!
//! ```text
//! 1 6 4 6 2 6 4 6
//! 7 7 7 7 7 7 7 7
//! 5 6 5 6 5 6 5 6
//! 7 7 7 7 7 7 7 7
//! 3 6 4 6 3 6 4 6
//! 7 7 7 7 7 7 7 7
//! 5 6 5 6 5 6 5 6
//! 7 7 7 7 7 7 7 7
//! ```
//!
//! Each pass is filtered on its own, as if it were a separate small image.

use super::header::bytes_per_scanline;
use crate::{PngError, PngResult};

const ADAM7_IX: [u32; 7] = [0, 4, 0, 2, 0, 1, 0];
const ADAM7_IY: [u32; 7] = [0, 0, 4, 0, 2, 0, 1];
const ADAM7_DX: [u32; 7] = [8, 8, 4, 4, 2, 2, 1];
const ADAM7_DY: [u32; 7] = [8, 8, 8, 4, 4, 2, 2];

/// Size and buffer positions of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PassGeometry {
  /// pass width in pixels
  pub width: u32,
  /// pass height in pixels
  pub height: u32,
  /// where this pass starts in the decompressed (filtered) data
  pub filtered_start: usize,
  /// where this pass starts in the unfiltered pass data
  pub raw_start: usize,
}
impl PassGeometry {
  /// Empty passes contribute no bytes at all, not even filter bytes.
  #[inline]
  #[must_use]
  pub const fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }
}

/// The geometry of all 7 passes of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Adam7Layout {
  pub passes: [PassGeometry; 7],
  /// total bytes of filtered data, including each row's filter byte
  pub filtered_len: usize,
  /// total bytes of unfiltered pass data
  pub raw_len: usize,
}
impl Adam7Layout {
  /// Computes the pass geometry of a `width` by `height` image.
  pub fn new(width: u32, height: u32, bits_per_pixel: usize) -> PngResult<Self> {
    let mut passes = [PassGeometry::default(); 7];
    let mut filtered_len = 0_usize;
    let mut raw_len = 0_usize;
    for (i, pass) in passes.iter_mut().enumerate() {
      let mut w = (width + ADAM7_DX[i] - ADAM7_IX[i] - 1) / ADAM7_DX[i];
      let mut h = (height + ADAM7_DY[i] - ADAM7_IY[i] - 1) / ADAM7_DY[i];
      if w == 0 || h == 0 {
        w = 0;
        h = 0;
      }
      *pass =
        PassGeometry { width: w, height: h, filtered_start: filtered_len, raw_start: raw_len };
      if h != 0 {
        let stride = bytes_per_scanline(w, bits_per_pixel)?;
        let rows = usize::try_from(h)?;
        let raw = stride.checked_mul(rows).ok_or(PngError::CheckedMath)?;
        raw_len = raw_len.checked_add(raw).ok_or(PngError::CheckedMath)?;
        filtered_len = filtered_len.checked_add(raw + rows).ok_or(PngError::CheckedMath)?;
      }
    }
    Ok(Self { passes, filtered_len, raw_len })
  }
}

#[inline]
fn read_bit_msb(bytes: &[u8], bit_pos: usize) -> u8 {
  (bytes[bit_pos >> 3] >> (7 - (bit_pos & 7))) & 1
}

#[inline]
fn write_bit_msb(bytes: &mut [u8], bit_pos: usize, bit: u8) {
  let mask = 1 << (7 - (bit_pos & 7));
  if bit == 0 {
    bytes[bit_pos >> 3] &= !mask;
  } else {
    bytes[bit_pos >> 3] |= mask;
  }
}

/// Moves unfiltered pass data into its place in the full image.
///
/// * `passes_raw` is the unfiltered rows of each pass, back to back, starting
///   at each pass's `raw_start`.
/// * `out` gets rows of `ceil(width * bits_per_pixel / 8)` bytes.
///
/// Pixels of less than 8 bits are moved bit by bit.
pub fn adam7_scatter(
  out: &mut [u8], passes_raw: &[u8], layout: &Adam7Layout, width: u32, height: u32,
  bits_per_pixel: usize,
) -> PngResult<()> {
  let out_stride = bytes_per_scanline(width, bits_per_pixel)?;
  let out_len = out_stride.checked_mul(usize::try_from(height)?).ok_or(PngError::CheckedMath)?;
  if out.len() < out_len || passes_raw.len() < layout.raw_len {
    return Err(PngError::NotEnoughImageData);
  }
  for (i, pass) in layout.passes.iter().enumerate() {
    if pass.is_empty() {
      continue;
    }
    let in_stride = bytes_per_scanline(pass.width, bits_per_pixel)?;
    for y in 0..pass.height as usize {
      let out_y = ADAM7_IY[i] as usize + y * ADAM7_DY[i] as usize;
      let in_row = pass.raw_start + y * in_stride;
      let out_row = out_y * out_stride;
      if bits_per_pixel >= 8 {
        let bytes = bits_per_pixel / 8;
        for x in 0..pass.width as usize {
          let out_x = ADAM7_IX[i] as usize + x * ADAM7_DX[i] as usize;
          let src = in_row + x * bytes;
          let dst = out_row + out_x * bytes;
          out[dst..dst + bytes].copy_from_slice(&passes_raw[src..src + bytes]);
        }
      } else {
        for x in 0..pass.width as usize {
          let out_x = ADAM7_IX[i] as usize + x * ADAM7_DX[i] as usize;
          let in_bit = in_row * 8 + x * bits_per_pixel;
          let out_bit = out_row * 8 + out_x * bits_per_pixel;
          for b in 0..bits_per_pixel {
            write_bit_msb(out, out_bit + b, read_bit_msb(passes_raw, in_bit + b));
          }
        }
      }
    }
  }
  Ok(())
}

#[test]
fn test_pass_dimensions() {
  let pass_widths = |w: u32| Adam7Layout::new(w, 8, 8).unwrap().passes.map(|p| p.width);
  let pass_heights = |h: u32| Adam7Layout::new(8, h, 8).unwrap().passes.map(|p| p.height);
  let expected_widths: [[u32; 8]; 7] = [
    [1, 1, 1, 1, 1, 1, 1, 1],
    [0, 0, 0, 0, 1, 1, 1, 1],
    [1, 1, 1, 1, 2, 2, 2, 2],
    [0, 0, 1, 1, 1, 1, 2, 2],
    [1, 1, 2, 2, 3, 3, 4, 4],
    [0, 1, 1, 2, 2, 3, 3, 4],
    [1, 2, 3, 4, 5, 6, 7, 8],
  ];
  let expected_heights: [[u32; 8]; 7] = [
    [1, 1, 1, 1, 1, 1, 1, 1],
    [1, 1, 1, 1, 1, 1, 1, 1],
    [0, 0, 0, 0, 1, 1, 1, 1],
    [1, 1, 1, 1, 2, 2, 2, 2],
    [0, 0, 1, 1, 1, 1, 2, 2],
    [1, 1, 2, 2, 3, 3, 4, 4],
    [0, 1, 1, 2, 2, 3, 3, 4],
  ];
  for (pass, ex) in expected_widths.iter().enumerate() {
    for (n, &e) in (1..=8).zip(ex.iter()) {
      assert_eq!(pass_widths(n)[pass], e, "pass {} w:{}", pass + 1, n);
    }
  }
  for (pass, ex) in expected_heights.iter().enumerate() {
    for (n, &e) in (1..=8).zip(ex.iter()) {
      assert_eq!(pass_heights(n)[pass], e, "pass {} h:{}", pass + 1, n);
    }
  }
  let full = Adam7Layout::new(8, 8, 8).unwrap().passes.map(|p| (p.width, p.height));
  assert_eq!(full, [(1, 1), (1, 1), (2, 1), (2, 2), (4, 2), (4, 4), (8, 4)]);
}

#[test]
fn test_pass_pixel_sums() {
  for (w, h) in [(1_u32, 1_u32), (7, 7), (13, 17), (64, 64), (1, 9), (9, 1)] {
    let layout = Adam7Layout::new(w, h, 8).unwrap();
    let sum: u32 = layout.passes.iter().map(|p| p.width * p.height).sum();
    assert_eq!(sum, w * h, "{w}x{h}");
    for p in layout.passes.iter() {
      assert_eq!(p.width == 0, p.height == 0);
    }
  }
}

#[test]
fn test_pass_starts() {
  // a 1x1 image only has the first pass
  let layout = Adam7Layout::new(1, 1, 8).unwrap();
  assert_eq!(layout.filtered_len, 2);
  assert_eq!(layout.raw_len, 1);
  assert!(layout.passes[1..].iter().all(|p| p.is_empty() && p.filtered_start == 2));

  // 8x8 at 1 bit per pixel: every pass row is 1 byte
  let layout = Adam7Layout::new(8, 8, 1).unwrap();
  let rows: usize = layout.passes.iter().map(|p| p.height as usize).sum();
  assert_eq!(layout.raw_len, rows);
  assert_eq!(layout.filtered_len, rows * 2);
  let mut expected_start = 0;
  for p in layout.passes.iter() {
    assert_eq!(p.filtered_start, expected_start);
    expected_start += p.height as usize * 2;
  }
}

#[cfg(test)]
fn interlace_for_test(
  image: &[u8], layout: &Adam7Layout, width: u32, bits_per_pixel: usize,
) -> alloc::vec::Vec<u8> {
  let out_stride = bytes_per_scanline(width, bits_per_pixel).unwrap();
  let mut passes = alloc::vec![0_u8; layout.raw_len];
  for (i, pass) in layout.passes.iter().enumerate() {
    let in_stride = bytes_per_scanline(pass.width, bits_per_pixel).unwrap();
    for y in 0..pass.height as usize {
      for x in 0..pass.width as usize {
        let full_x = ADAM7_IX[i] as usize + x * ADAM7_DX[i] as usize;
        let full_y = ADAM7_IY[i] as usize + y * ADAM7_DY[i] as usize;
        for b in 0..bits_per_pixel {
          let bit = read_bit_msb(image, full_y * out_stride * 8 + full_x * bits_per_pixel + b);
          write_bit_msb(
            &mut passes,
            (pass.raw_start + y * in_stride) * 8 + x * bits_per_pixel + b,
            bit,
          );
        }
      }
    }
  }
  passes
}

#[test]
fn test_scatter_undoes_interlace() {
  let mut seed = 0xDEAD_BEEF_u32;
  let mut next = move || {
    seed ^= seed << 13;
    seed ^= seed >> 17;
    seed ^= seed << 5;
    seed as u8
  };
  for bits_per_pixel in [1_usize, 2, 4, 8, 16, 24, 32, 48, 64] {
    for (w, h) in [(1_u32, 1_u32), (7, 7), (13, 17), (3, 10)] {
      let stride = bytes_per_scanline(w, bits_per_pixel).unwrap();
      let mut image: alloc::vec::Vec<u8> = (0..stride * h as usize).map(|_| next()).collect();
      // the padding bits at the end of each row come out as zero
      let used_bits = w as usize * bits_per_pixel;
      if used_bits % 8 != 0 {
        for row in image.chunks_exact_mut(stride) {
          row[stride - 1] &= 0xFF << (8 - used_bits % 8);
        }
      }
      let layout = Adam7Layout::new(w, h, bits_per_pixel).unwrap();
      let passes = interlace_for_test(&image, &layout, w, bits_per_pixel);
      let mut out = alloc::vec![0_u8; image.len()];
      adam7_scatter(&mut out, &passes, &layout, w, h, bits_per_pixel).unwrap();
      assert_eq!(out, image, "bpp {bits_per_pixel}, {w}x{h}");
    }
  }
}
