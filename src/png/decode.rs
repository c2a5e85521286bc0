use alloc::vec::Vec;

use bitfrob::u8_replicate_bits;
use pixel_formats::r8g8b8a8_Srgb;

use super::{
  adam7::{adam7_scatter, Adam7Layout},
  container::parse_png_container,
  header::PngColorType,
  unfilter::unfilter_image,
};
use crate::{
  checksum::{BuiltinChecksums, ChecksumProvider},
  parser_helpers::u16_be,
  zlib::zlib_decompress,
  PngError, PngResult,
};

/// Limits on how big of an image the decoder will accept.
///
/// These are checked against the header before anything big is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PngLimits {
  pub max_width: u32,
  pub max_height: u32,
  /// Limit on both the decompressed (filtered) data and the final pixel
  /// buffer, in bytes.
  pub max_decompressed_bytes: usize,
}
impl Default for PngLimits {
  #[inline]
  fn default() -> Self {
    Self { max_width: 17_000, max_height: 17_000, max_decompressed_bytes: 1 << 30 }
  }
}

/// Transparency info from a `tRNS` chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transparency {
  /// This exact gray sample value is fully transparent.
  Gray(u16),
  /// This exact RGB sample value is fully transparent.
  Rgb([u16; 3]),
  /// Alpha per palette entry. Entries past the end of this are opaque.
  PaletteAlphas(Vec<u8>),
}

/// The suggested background color from a `bKGD` chunk.
///
/// Values are in the image's own bit depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Background {
  PaletteIndex(u8),
  Gray(u16),
  Rgb([u16; 3]),
}

/// A fully decoded PNG.
///
/// The fields are public, but if you put them together weirdly the methods of
/// this type might panic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecodedPng {
  pub width: u32,
  pub height: u32,
  pub color_type: PngColorType,
  pub bit_depth: u8,
  pub bits_per_pixel: usize,
  /// Pixel data in the image's own format.
  ///
  /// Each row is [`stride`](Self::stride) bytes: samples are packed most
  /// significant bit first, 16-bit samples are big-endian, and with less than
  /// 8 bits per pixel the end of each row is padded out to a whole byte.
  pub pixels: Vec<u8>,
  /// Palette entries as `[r, g, b]`, or empty if there's no palette.
  pub palette: Vec<[u8; 3]>,
  pub transparency: Option<Transparency>,
  pub background: Option<Background>,
}

impl DecodedPng {
  /// Bytes per row of `pixels`.
  #[inline]
  #[must_use]
  pub const fn stride(&self) -> usize {
    let bits = self.width as usize * self.bits_per_pixel;
    bits / 8 + (bits % 8 != 0) as usize
  }

  /// Converts the image to 8-bit sRGB with alpha.
  ///
  /// * Palette indexes are resolved (with `tRNS` alpha if present). An index
  ///   past the end of the palette gives opaque black.
  /// * Gray and RGB color keys from `tRNS` become alpha 0.
  /// * 16-bit samples keep their high byte, and 1, 2, or 4 bit gray is scaled
  ///   up to the full 8-bit range.
  ///
  /// ## Failure
  /// * Allocation failure.
  pub fn to_rgba8(&self) -> PngResult<Vec<r8g8b8a8_Srgb>> {
    let pixel_count = (self.width as usize)
      .checked_mul(self.height as usize)
      .ok_or(PngError::CheckedMath)?;
    let mut out: Vec<r8g8b8a8_Srgb> = Vec::new();
    out.try_reserve_exact(pixel_count)?;
    let stride = self.stride();
    if stride == 0 {
      return Ok(out);
    }
    let channels = self.color_type.channel_count();
    let bd = self.bit_depth;
    let to8 = |v: u16| -> u8 {
      match bd {
        16 => (v >> 8) as u8,
        8 => v as u8,
        _ => u8_replicate_bits(u32::from(bd), v as u8),
      }
    };
    let alphas: &[u8] = match &self.transparency {
      Some(Transparency::PaletteAlphas(alphas)) => alphas,
      _ => &[],
    };
    for row in self.pixels.chunks_exact(stride).take(self.height as usize) {
      for x in 0..self.width as usize {
        let s = |c: usize| sample(row, bd, x * channels + c);
        let p = match self.color_type {
          PngColorType::Y => {
            let v = s(0);
            let a = if self.transparency == Some(Transparency::Gray(v)) { 0 } else { 255 };
            let y = to8(v);
            r8g8b8a8_Srgb { r: y, g: y, b: y, a }
          }
          PngColorType::RGB => {
            let rgb = [s(0), s(1), s(2)];
            let a = if self.transparency == Some(Transparency::Rgb(rgb)) { 0 } else { 255 };
            r8g8b8a8_Srgb { r: to8(rgb[0]), g: to8(rgb[1]), b: to8(rgb[2]), a }
          }
          PngColorType::Index => {
            let i = usize::from(s(0));
            let [r, g, b] = self.palette.get(i).copied().unwrap_or([0, 0, 0]);
            let a = alphas.get(i).copied().unwrap_or(255);
            r8g8b8a8_Srgb { r, g, b, a }
          }
          PngColorType::YA => {
            let y = to8(s(0));
            r8g8b8a8_Srgb { r: y, g: y, b: y, a: to8(s(1)) }
          }
          PngColorType::RGBA => {
            r8g8b8a8_Srgb { r: to8(s(0)), g: to8(s(1)), b: to8(s(2)), a: to8(s(3)) }
          }
        };
        out.push(p);
      }
    }
    Ok(out)
  }
}

/// Gets sample number `index` out of a row.
#[inline]
fn sample(row: &[u8], bit_depth: u8, index: usize) -> u16 {
  match bit_depth {
    16 => u16::from_be_bytes([row[index * 2], row[index * 2 + 1]]),
    8 => u16::from(row[index]),
    _ => {
      let bd = usize::from(bit_depth);
      let bit = index * bd;
      let shift = 8 - bd - (bit % 8);
      u16::from((row[bit / 8] >> shift) & ((1 << bd) - 1))
    }
  }
}

fn try_zeroed_vec(len: usize) -> PngResult<Vec<u8>> {
  let mut v = Vec::new();
  v.try_reserve_exact(len)?;
  // this resize should become a memset
  v.resize(len, 0);
  Ok(v)
}

/// Decodes PNG bytes using the default limits and the built in checksums.
#[inline]
pub fn decode_png(bytes: &[u8]) -> PngResult<DecodedPng> {
  decode_png_with(bytes, PngLimits::default(), &BuiltinChecksums)
}

/// Reads and decodes a PNG file.
#[cfg(feature = "std")]
#[cfg_attr(docs_rs, doc(cfg(feature = "std")))]
pub fn decode_png_file<P: AsRef<std::path::Path>>(path: P) -> PngResult<DecodedPng> {
  let bytes = std::fs::read(path)?;
  decode_png(&bytes)
}

/// Decodes PNG bytes.
///
/// ## Failure
/// * Any problem with the container, see
///   [`parse_png_container`](super::parse_png_container).
/// * The image is bigger than `limits` allow.
/// * The compressed data is corrupt, or gives more or less data than the
///   image header says it should.
/// * Any scanline has an illegal filter type.
/// * Allocation failure.
pub fn decode_png_with<C: ChecksumProvider + ?Sized>(
  bytes: &[u8], limits: PngLimits, checksums: &C,
) -> PngResult<DecodedPng> {
  let container = parse_png_container(bytes, checksums)?;
  let header = container.header;
  if header.width > limits.max_width || header.height > limits.max_height {
    return Err(PngError::DimensionsTooLarge);
  }

  let bits_per_pixel = header.bits_per_pixel();
  let byte_width = header.filter_byte_width();
  let height = usize::try_from(header.height)?;
  let stride = header.bytes_per_scanline(header.width)?;
  let raw_len = stride.checked_mul(height).ok_or(PngError::CheckedMath)?;
  let layout = if header.is_interlaced {
    Some(Adam7Layout::new(header.width, header.height, bits_per_pixel)?)
  } else {
    None
  };
  let filtered_len = match &layout {
    Some(layout) => layout.filtered_len,
    None => (stride + 1).checked_mul(height).ok_or(PngError::CheckedMath)?,
  };
  if filtered_len > limits.max_decompressed_bytes || raw_len > limits.max_decompressed_bytes {
    return Err(PngError::DimensionsTooLarge);
  }

  let mut filtered = try_zeroed_vec(filtered_len)?;
  let written = zlib_decompress(&container.idat, &mut filtered, checksums)?;
  if written < filtered_len {
    return Err(PngError::NotEnoughImageData);
  }

  let mut pixels = try_zeroed_vec(raw_len)?;
  match &layout {
    None => unfilter_image(&mut pixels, &filtered, stride, height, byte_width)?,
    Some(layout) => {
      let mut passes_raw = try_zeroed_vec(layout.raw_len)?;
      for pass in layout.passes.iter().filter(|p| !p.is_empty()) {
        let pass_stride = header.bytes_per_scanline(pass.width)?;
        let rows = pass.height as usize;
        let raw = &mut passes_raw[pass.raw_start..pass.raw_start + pass_stride * rows];
        let src = &filtered[pass.filtered_start..pass.filtered_start + (pass_stride + 1) * rows];
        unfilter_image(raw, src, pass_stride, rows, byte_width)?;
      }
      adam7_scatter(
        &mut pixels,
        &passes_raw,
        layout,
        header.width,
        header.height,
        bits_per_pixel,
      )?;
    }
  }

  let palette: Vec<[u8; 3]> = match container.palette {
    Some(data) => {
      let mut v = Vec::new();
      v.try_reserve_exact(data.len() / 3)?;
      v.extend(data.chunks_exact(3).map(|rgb| [rgb[0], rgb[1], rgb[2]]));
      v
    }
    None => Vec::new(),
  };
  let be16 = |d: &[u8], i: usize| u16_be([d[i * 2], d[i * 2 + 1]]);
  let transparency = match container.transparency {
    None => None,
    Some(d) => Some(match header.color_type {
      PngColorType::Y => Transparency::Gray(be16(d, 0)),
      PngColorType::RGB => Transparency::Rgb([be16(d, 0), be16(d, 1), be16(d, 2)]),
      _ => {
        let mut alphas = Vec::new();
        alphas.try_reserve_exact(d.len())?;
        alphas.extend_from_slice(d);
        Transparency::PaletteAlphas(alphas)
      }
    }),
  };
  let background = container.background.map(|d| match header.color_type {
    PngColorType::Index => Background::PaletteIndex(d[0]),
    PngColorType::Y | PngColorType::YA => Background::Gray(be16(d, 0)),
    PngColorType::RGB | PngColorType::RGBA => {
      Background::Rgb([be16(d, 0), be16(d, 1), be16(d, 2)])
    }
  });

  log::debug!(
    "decoded {}x{} png, {} bytes of pixels",
    header.width,
    header.height,
    pixels.len()
  );
  Ok(DecodedPng {
    width: header.width,
    height: header.height,
    color_type: header.color_type,
    bit_depth: header.bit_depth,
    bits_per_pixel,
    pixels,
    palette,
    transparency,
    background,
  })
}

#[test]
fn test_sample_extraction() {
  let row = [0b1011_0010_u8, 0xFF, 0x12, 0x34];
  assert_eq!(sample(&row, 1, 0), 1);
  assert_eq!(sample(&row, 1, 1), 0);
  assert_eq!(sample(&row, 1, 7), 0);
  assert_eq!(sample(&row, 2, 0), 0b10);
  assert_eq!(sample(&row, 2, 1), 0b11);
  assert_eq!(sample(&row, 2, 3), 0b10);
  assert_eq!(sample(&row, 4, 0), 0b1011);
  assert_eq!(sample(&row, 4, 1), 0b0010);
  assert_eq!(sample(&row, 8, 1), 0xFF);
  assert_eq!(sample(&row, 16, 1), 0x1234);
}

#[test]
fn test_to_rgba8_sub_byte_gray() {
  let png = DecodedPng {
    width: 4,
    height: 1,
    color_type: PngColorType::Y,
    bit_depth: 2,
    bits_per_pixel: 2,
    pixels: alloc::vec![0b00_01_10_11],
    palette: Vec::new(),
    transparency: Some(Transparency::Gray(1)),
    background: None,
  };
  assert_eq!(png.stride(), 1);
  let rgba = png.to_rgba8().unwrap();
  let got: Vec<(u8, u8)> = rgba.iter().map(|p| (p.r, p.a)).collect();
  assert_eq!(got, [(0x00, 255), (0x55, 0), (0xAA, 255), (0xFF, 255)]);
}
