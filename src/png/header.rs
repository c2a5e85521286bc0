use bytemuck::{Pod, Zeroable};

use crate::{
  parser_helpers::{try_pull_pod, u32_be},
  PngError, PngResult,
};

/// The types of color that PNG supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PngColorType {
  /// Greyscale
  Y = 0,
  /// Red, Green, Blue
  RGB = 2,
  /// Index into a palette.
  ///
  /// The palette will have RGB8 data. There may optionally be a transparency
  /// chunk.
  Index = 3,
  /// Greyscale + Alpha
  YA = 4,
  /// Red, Green, Blue, Alpha
  RGBA = 6,
}
impl PngColorType {
  /// The number of channels in this type of color.
  #[inline]
  #[must_use]
  pub const fn channel_count(self) -> usize {
    match self {
      Self::Y => 1,
      Self::RGB => 3,
      Self::Index => 1,
      Self::YA => 2,
      Self::RGBA => 4,
    }
  }

  /// If the bit depth is allowed with this color type.
  #[inline]
  #[must_use]
  pub const fn allows_bit_depth(self, bit_depth: u8) -> bool {
    match self {
      Self::Y => matches!(bit_depth, 1 | 2 | 4 | 8 | 16),
      Self::RGB | Self::YA | Self::RGBA => matches!(bit_depth, 8 | 16),
      Self::Index => matches!(bit_depth, 1 | 2 | 4 | 8),
    }
  }
}
impl TryFrom<u8> for PngColorType {
  type Error = PngError;
  #[inline]
  fn try_from(value: u8) -> Result<Self, Self::Error> {
    Ok(match value {
      0 => PngColorType::Y,
      2 => PngColorType::RGB,
      3 => PngColorType::Index,
      4 => PngColorType::YA,
      6 => PngColorType::RGBA,
      _ => return Err(PngError::IllegalColorTypeBitDepth),
    })
  }
}

/// The `IHDR` chunk data exactly as it's stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct RawIhdr {
  width: [u8; 4],
  height: [u8; 4],
  bit_depth: u8,
  color_type: u8,
  compression_method: u8,
  filter_method: u8,
  interlace_method: u8,
}

/// Image Header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IHDR {
  /// width in pixels
  pub width: u32,
  /// height in pixels
  pub height: u32,
  /// bits per channel (or per index, with indexed color)
  pub bit_depth: u8,
  /// pixel color type
  pub color_type: PngColorType,
  /// if the image data is stored interlaced.
  pub is_interlaced: bool,
}
impl IHDR {
  /// Parses the data of an `IHDR` chunk.
  ///
  /// ## Failure
  /// * The data isn't exactly 13 bytes.
  /// * Width or height is 0 or above `2^31 - 1`.
  /// * The color type and bit depth aren't a legal combination.
  /// * The compression method or filter method aren't 0, or the interlace
  ///   method isn't 0 or 1.
  pub fn parse(data: &[u8]) -> PngResult<Self> {
    if data.len() != core::mem::size_of::<RawIhdr>() {
      return Err(PngError::BadHeaderLength);
    }
    let (raw, _) = try_pull_pod::<RawIhdr>(data)?;
    let width = u32_be(raw.width);
    let height = u32_be(raw.height);
    if width == 0 || height == 0 || width > (1 << 31) - 1 || height > (1 << 31) - 1 {
      return Err(PngError::IllegalDimensions);
    }
    let color_type = PngColorType::try_from(raw.color_type)?;
    if !color_type.allows_bit_depth(raw.bit_depth) {
      return Err(PngError::IllegalColorTypeBitDepth);
    }
    if raw.compression_method != 0 {
      return Err(PngError::UnknownCompressionMethod);
    }
    if raw.filter_method != 0 {
      return Err(PngError::UnknownFilterMethod);
    }
    let is_interlaced = match raw.interlace_method {
      0 => false,
      1 => true,
      _ => return Err(PngError::UnknownInterlaceMethod),
    };
    Ok(Self { width, height, bit_depth: raw.bit_depth, color_type, is_interlaced })
  }

  /// Bits for each pixel (all channels together).
  #[inline]
  #[must_use]
  pub const fn bits_per_pixel(&self) -> usize {
    (self.bit_depth as usize) * self.color_type.channel_count()
  }

  /// The distance between a byte and the byte it's filtered against.
  ///
  /// Pixels of less than 8 bits still filter against the previous whole byte.
  #[inline]
  #[must_use]
  pub const fn filter_byte_width(&self) -> usize {
    let b = self.bits_per_pixel() / 8;
    if b == 0 {
      1
    } else {
      b
    }
  }

  /// Bytes for one row of `width` pixels, without the filter byte.
  ///
  /// Sub-byte pixel formats round up to a whole byte at the end of the row.
  #[inline]
  pub fn bytes_per_scanline(&self, width: u32) -> PngResult<usize> {
    bytes_per_scanline(width, self.bits_per_pixel())
  }
}

/// Bytes for one row of `width` pixels of `bits_per_pixel` each, rounded up.
#[inline]
pub(crate) fn bytes_per_scanline(width: u32, bits_per_pixel: usize) -> PngResult<usize> {
  let bits = usize::try_from(width)?.checked_mul(bits_per_pixel).ok_or(PngError::CheckedMath)?;
  Ok(bits / 8 + usize::from(bits % 8 != 0))
}

#[test]
fn test_ihdr_parse() {
  let data = [0, 0, 0, 3, 0, 0, 0, 2, 8, 6, 0, 0, 1];
  let h = IHDR::parse(&data).unwrap();
  assert_eq!(
    h,
    IHDR { width: 3, height: 2, bit_depth: 8, color_type: PngColorType::RGBA, is_interlaced: true }
  );
  assert_eq!(h.bits_per_pixel(), 32);
  assert_eq!(h.filter_byte_width(), 4);
  assert_eq!(h.bytes_per_scanline(3), Ok(12));

  assert_eq!(IHDR::parse(&data[..12]), Err(PngError::BadHeaderLength));
  let mut bad = data;
  bad[3] = 0;
  assert_eq!(IHDR::parse(&bad), Err(PngError::IllegalDimensions));
  let mut bad = data;
  bad[4] = 0x80;
  assert_eq!(IHDR::parse(&bad), Err(PngError::IllegalDimensions));
  let mut bad = data;
  bad[8] = 4;
  assert_eq!(IHDR::parse(&bad), Err(PngError::IllegalColorTypeBitDepth));
  let mut bad = data;
  bad[9] = 5;
  assert_eq!(IHDR::parse(&bad), Err(PngError::IllegalColorTypeBitDepth));
  let mut bad = data;
  bad[10] = 1;
  assert_eq!(IHDR::parse(&bad), Err(PngError::UnknownCompressionMethod));
  let mut bad = data;
  bad[11] = 1;
  assert_eq!(IHDR::parse(&bad), Err(PngError::UnknownFilterMethod));
  let mut bad = data;
  bad[12] = 2;
  assert_eq!(IHDR::parse(&bad), Err(PngError::UnknownInterlaceMethod));
}

#[test]
fn test_color_type_bit_depth_table() {
  let allowed: [(u8, &[u8]); 5] =
    [(0, &[1, 2, 4, 8, 16]), (2, &[8, 16]), (3, &[1, 2, 4, 8]), (4, &[8, 16]), (6, &[8, 16])];
  for (ct, depths) in allowed {
    let color_type = PngColorType::try_from(ct).unwrap();
    for bd in 0..=32 {
      assert_eq!(color_type.allows_bit_depth(bd), depths.contains(&bd), "ct {ct}, bd {bd}");
    }
  }
  for ct in [1, 5, 7, 255] {
    assert!(PngColorType::try_from(ct).is_err());
  }
}

#[test]
fn test_sub_byte_scanlines() {
  assert_eq!(bytes_per_scanline(1, 1), Ok(1));
  assert_eq!(bytes_per_scanline(8, 1), Ok(1));
  assert_eq!(bytes_per_scanline(9, 1), Ok(2));
  assert_eq!(bytes_per_scanline(3, 2), Ok(1));
  assert_eq!(bytes_per_scanline(5, 4), Ok(3));
  assert_eq!(bytes_per_scanline(5, 48), Ok(30));
  assert_eq!(bytes_per_scanline(0, 8), Ok(0));
}
