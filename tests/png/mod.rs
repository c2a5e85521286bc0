use core::cell::Cell;

use miniz_oxide::deflate::compress_to_vec_zlib;
use pngine::{
  checksum::{crc32, BuiltinChecksums, ChecksumProvider},
  decode_png, decode_png_file, decode_png_with,
  png::{
    parse_png_container, Background, PngChunkType, PngColorType, RawPngChunkIter, Transparency,
    PNG_SIGNATURE,
  },
  DecodedPng, PngError, PngErrorKind, PngLimits, PngResult,
};

/// zlib stream of a filter byte 0 and then 0x42, as a stored block.
const ONE_PIXEL_ZLIB: [u8; 13] =
  [0x78, 0x01, 0x01, 0x02, 0x00, 0xFD, 0xFF, 0x00, 0x42, 0x00, 0x44, 0x00, 0x43];

fn push_chunk(out: &mut Vec<u8>, ty: &[u8; 4], data: &[u8]) {
  out.extend_from_slice(&(data.len() as u32).to_be_bytes());
  out.extend_from_slice(ty);
  out.extend_from_slice(data);
  let crc = crc32(ty.iter().chain(data.iter()).copied());
  out.extend_from_slice(&crc.to_be_bytes());
}

fn png_from_chunks(chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
  let mut out = PNG_SIGNATURE.to_vec();
  for (ty, data) in chunks {
    push_chunk(&mut out, ty, data);
  }
  out
}

fn ihdr(width: u32, height: u32, bit_depth: u8, color_type: u8, interlace: u8) -> Vec<u8> {
  let mut out = Vec::with_capacity(13);
  out.extend_from_slice(&width.to_be_bytes());
  out.extend_from_slice(&height.to_be_bytes());
  out.extend_from_slice(&[bit_depth, color_type, 0, 0, interlace]);
  out
}

fn decode_chunks(chunks: &[(&[u8; 4], &[u8])]) -> PngResult<DecodedPng> {
  decode_png(&png_from_chunks(chunks))
}

fn one_gray_pixel_png() -> Vec<u8> {
  let header = ihdr(1, 1, 8, 0, 0);
  png_from_chunks(&[(b"IHDR", &header), (b"IDAT", &ONE_PIXEL_ZLIB), (b"IEND", &[])])
}

fn stride(width: usize, bits_per_pixel: usize) -> usize {
  (width * bits_per_pixel + 7) / 8
}

fn copy_bits(src: &[u8], src_bit: usize, dst: &mut [u8], dst_bit: usize, count: usize) {
  for i in 0..count {
    let s = src_bit + i;
    let d = dst_bit + i;
    if (src[s / 8] >> (7 - s % 8)) & 1 != 0 {
      dst[d / 8] |= 0x80 >> (d % 8);
    } else {
      dst[d / 8] &= !(0x80 >> (d % 8));
    }
  }
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
  let p = i16::from(a) + i16::from(b) - i16::from(c);
  let pa = (p - i16::from(a)).abs();
  let pb = (p - i16::from(b)).abs();
  let pc = (p - i16::from(c)).abs();
  if pa <= pb && pa <= pc {
    a
  } else if pb <= pc {
    b
  } else {
    c
  }
}

/// Filters each row, cycling through all five filter types.
fn filter_rows(raw: &[u8], row_len: usize, byte_width: usize) -> Vec<u8> {
  let zeroes = vec![0_u8; row_len];
  let mut out = Vec::new();
  for (y, row) in raw.chunks_exact(row_len).enumerate() {
    let prev = if y == 0 { &zeroes[..] } else { &raw[(y - 1) * row_len..y * row_len] };
    let filter = (y % 5) as u8;
    out.push(filter);
    for i in 0..row_len {
      let a = if i >= byte_width { row[i - byte_width] } else { 0 };
      let b = prev[i];
      let c = if i >= byte_width { prev[i - byte_width] } else { 0 };
      let predicted = match filter {
        0 => 0,
        1 => a,
        2 => b,
        3 => ((u16::from(a) + u16::from(b)) / 2) as u8,
        _ => paeth(a, b, c),
      };
      out.push(row[i].wrapping_sub(predicted));
    }
  }
  out
}

const ADAM7_X: [usize; 7] = [0, 4, 0, 2, 0, 1, 0];
const ADAM7_Y: [usize; 7] = [0, 0, 4, 0, 2, 0, 1];
const ADAM7_DX: [usize; 7] = [8, 8, 4, 4, 2, 2, 1];
const ADAM7_DY: [usize; 7] = [8, 8, 8, 4, 4, 2, 2];

/// Splits an image into its 7 passes and filters each pass on its own.
fn interlace_and_filter(
  raw: &[u8], width: usize, height: usize, bits_per_pixel: usize, byte_width: usize,
) -> Vec<u8> {
  let full_stride = stride(width, bits_per_pixel);
  let mut out = Vec::new();
  for p in 0..7 {
    if ADAM7_X[p] >= width || ADAM7_Y[p] >= height {
      continue;
    }
    let pass_w = (width - ADAM7_X[p] + ADAM7_DX[p] - 1) / ADAM7_DX[p];
    let pass_h = (height - ADAM7_Y[p] + ADAM7_DY[p] - 1) / ADAM7_DY[p];
    let pass_stride = stride(pass_w, bits_per_pixel);
    let mut pass = vec![0_u8; pass_stride * pass_h];
    for py in 0..pass_h {
      for px in 0..pass_w {
        let x = ADAM7_X[p] + px * ADAM7_DX[p];
        let y = ADAM7_Y[p] + py * ADAM7_DY[p];
        copy_bits(
          raw,
          y * full_stride * 8 + x * bits_per_pixel,
          &mut pass,
          py * pass_stride * 8 + px * bits_per_pixel,
          bits_per_pixel,
        );
      }
    }
    out.extend(filter_rows(&pass, pass_stride, byte_width));
  }
  out
}

/// Random pixels, with the padding bits at the end of each row cleared.
fn random_image(width: usize, height: usize, bits_per_pixel: usize) -> Vec<u8> {
  let row_len = stride(width, bits_per_pixel);
  let mut raw = super::rand_bytes(row_len * height);
  let used_bits = (width * bits_per_pixel) % 8;
  if used_bits != 0 {
    for row in raw.chunks_exact_mut(row_len) {
      row[row_len - 1] &= 0xFF_u8 << (8 - used_bits);
    }
  }
  raw
}

struct TestImage {
  width: u32,
  height: u32,
  bit_depth: u8,
  color_type: u8,
  channels: usize,
}
impl TestImage {
  fn bits_per_pixel(&self) -> usize {
    usize::from(self.bit_depth) * self.channels
  }

  /// Encodes `raw` as a PNG, spreading the zlib stream over several `IDAT`
  /// chunks.
  fn encode(&self, raw: &[u8], interlace: bool) -> Vec<u8> {
    let bpp = self.bits_per_pixel();
    let byte_width = (bpp / 8).max(1);
    let (w, h) = (self.width as usize, self.height as usize);
    let filtered = if interlace {
      interlace_and_filter(raw, w, h, bpp, byte_width)
    } else {
      filter_rows(raw, stride(w, bpp), byte_width)
    };
    let zlib = compress_to_vec_zlib(&filtered, 6);
    let header = ihdr(self.width, self.height, self.bit_depth, self.color_type, interlace as u8);
    let palette: Vec<u8> =
      (0..(1_usize << self.bit_depth.min(8))).flat_map(|i| [i as u8, 255 - i as u8, 7]).collect();

    let mut out = PNG_SIGNATURE.to_vec();
    push_chunk(&mut out, b"IHDR", &header);
    if self.color_type == 3 {
      push_chunk(&mut out, b"PLTE", &palette);
    }
    let third = zlib.len() / 3;
    push_chunk(&mut out, b"IDAT", &zlib[..third]);
    push_chunk(&mut out, b"IDAT", &zlib[third..2 * third]);
    push_chunk(&mut out, b"IDAT", &zlib[2 * third..]);
    push_chunk(&mut out, b"IEND", &[]);
    out
  }
}

#[test]
fn test_decode_one_gray_pixel() {
  let png = decode_png(&one_gray_pixel_png()).unwrap();
  assert_eq!(png.width, 1);
  assert_eq!(png.height, 1);
  assert_eq!(png.color_type, PngColorType::Y);
  assert_eq!(png.bit_depth, 8);
  assert_eq!(png.pixels, vec![0x42]);
  assert!(png.palette.is_empty());
  assert_eq!(png.transparency, None);
  let rgba = png.to_rgba8().unwrap();
  assert_eq!(rgba.len(), 1);
  assert_eq!((rgba[0].r, rgba[0].g, rgba[0].b, rgba[0].a), (0x42, 0x42, 0x42, 255));
}

#[test]
fn test_decode_all_formats_and_filters() {
  const FORMATS: &[(u8, u8, usize)] = &[
    (0, 1, 1),
    (0, 2, 1),
    (0, 4, 1),
    (0, 8, 1),
    (0, 16, 1),
    (2, 8, 3),
    (2, 16, 3),
    (3, 1, 1),
    (3, 2, 1),
    (3, 4, 1),
    (3, 8, 1),
    (4, 8, 2),
    (4, 16, 2),
    (6, 8, 4),
    (6, 16, 4),
  ];
  for &(color_type, bit_depth, channels) in FORMATS {
    for (width, height) in [(1, 1), (2, 3), (5, 5), (13, 17), (33, 9)] {
      let image = TestImage { width, height, bit_depth, color_type, channels };
      let raw = random_image(width as usize, height as usize, image.bits_per_pixel());
      for interlace in [false, true] {
        let bytes = image.encode(&raw, interlace);
        let png = decode_png(&bytes).unwrap_or_else(|e| {
          panic!("ct {color_type}, bd {bit_depth}, {width}x{height}, interlace {interlace}: {e}")
        });
        assert_eq!(png.width, width);
        assert_eq!(png.height, height);
        assert_eq!(png.bit_depth, bit_depth);
        assert_eq!(png.color_type, PngColorType::try_from(color_type).unwrap());
        assert_eq!(png.bits_per_pixel, image.bits_per_pixel());
        assert_eq!(png.stride(), stride(width as usize, image.bits_per_pixel()));
        assert_eq!(
          png.pixels, raw,
          "ct {color_type}, bd {bit_depth}, {width}x{height}, interlace {interlace}"
        );
        if color_type == 3 {
          assert_eq!(png.palette.len(), 1 << bit_depth);
          assert_eq!(png.palette[1], [1, 254, 7]);
        }
      }
    }
  }
}

#[test]
fn test_interlaced_matches_plain() {
  let image = TestImage { width: 64, height: 47, bit_depth: 8, color_type: 2, channels: 3 };
  let raw = random_image(64, 47, 24);
  let plain = decode_png(&image.encode(&raw, false)).unwrap();
  let interlaced = decode_png(&image.encode(&raw, true)).unwrap();
  assert_eq!(plain, interlaced);
}

#[test]
fn test_palette_with_transparency() {
  let header = ihdr(3, 1, 8, 3, 0);
  let palette = [10, 20, 30, 40, 50, 60];
  let idat = compress_to_vec_zlib(&[0, 0, 1, 5], 6);
  let png = decode_chunks(&[
    (b"IHDR", &header),
    (b"PLTE", &palette),
    (b"tRNS", &[0x80]),
    (b"bKGD", &[1]),
    (b"IDAT", &idat),
    (b"IEND", &[]),
  ])
  .unwrap();
  assert_eq!(png.palette, vec![[10, 20, 30], [40, 50, 60]]);
  assert_eq!(png.transparency, Some(Transparency::PaletteAlphas(vec![0x80])));
  assert_eq!(png.background, Some(Background::PaletteIndex(1)));
  let rgba: Vec<[u8; 4]> = png.to_rgba8().unwrap().iter().map(|p| [p.r, p.g, p.b, p.a]).collect();
  // index 5 is past the end of the palette
  assert_eq!(rgba, vec![[10, 20, 30, 0x80], [40, 50, 60, 255], [0, 0, 0, 255]]);
}

#[test]
fn test_rgb16_color_key() {
  let header = ihdr(2, 1, 16, 2, 0);
  let key = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];
  let mut filtered = vec![0];
  filtered.extend_from_slice(&key);
  filtered.extend_from_slice(&[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBD]);
  let idat = compress_to_vec_zlib(&filtered, 6);
  let png = decode_chunks(&[
    (b"IHDR", &header),
    (b"tRNS", &key),
    (b"bKGD", &[0, 1, 0, 2, 0, 3]),
    (b"IDAT", &idat),
    (b"IEND", &[]),
  ])
  .unwrap();
  assert_eq!(png.transparency, Some(Transparency::Rgb([0x1234, 0x5678, 0x9ABC])));
  assert_eq!(png.background, Some(Background::Rgb([1, 2, 3])));
  let rgba: Vec<[u8; 4]> = png.to_rgba8().unwrap().iter().map(|p| [p.r, p.g, p.b, p.a]).collect();
  assert_eq!(rgba, vec![[0x12, 0x56, 0x9A, 0], [0x12, 0x56, 0x9A, 255]]);
}

#[test]
fn test_gray_background_and_ancillary_chunks() {
  let header = ihdr(1, 1, 8, 0, 0);
  let png = decode_chunks(&[
    (b"IHDR", &header),
    (b"gAMA", &[0, 0, 0xB1, 0x8F]),
    // repeated, and the wrong length, both just get skipped
    (b"gAMA", &[1, 2]),
    (b"sRGB", &[0, 0]),
    (b"tEXt", b"Comment\0hello"),
    (b"abCD", &[1, 2, 3]),
    (b"bKGD", &[0, 7]),
    (b"IDAT", &ONE_PIXEL_ZLIB),
    (b"tIME", &[0x07, 0xEA, 10, 17, 12, 0, 0]),
    (b"IEND", &[]),
  ])
  .unwrap();
  assert_eq!(png.background, Some(Background::Gray(7)));
  assert_eq!(png.pixels, vec![0x42]);
}

#[test]
fn test_container_parts() {
  let bytes = one_gray_pixel_png();
  let container = parse_png_container(&bytes, &BuiltinChecksums).unwrap();
  assert_eq!(container.header.width, 1);
  assert!(!container.header.is_interlaced);
  assert_eq!(container.palette, None);
  assert_eq!(container.idat, ONE_PIXEL_ZLIB.to_vec());
}

#[test]
fn test_checksum_provider_is_used() {
  struct CountingChecksums {
    crc_calls: Cell<usize>,
    adler_calls: Cell<usize>,
  }
  impl ChecksumProvider for CountingChecksums {
    fn crc32(&self, parts: &[&[u8]]) -> u32 {
      self.crc_calls.set(self.crc_calls.get() + 1);
      BuiltinChecksums.crc32(parts)
    }
    fn adler32(&self, bytes: &[u8]) -> u32 {
      self.adler_calls.set(self.adler_calls.get() + 1);
      BuiltinChecksums.adler32(bytes)
    }
  }
  let counter = CountingChecksums { crc_calls: Cell::new(0), adler_calls: Cell::new(0) };
  let png = decode_png_with(&one_gray_pixel_png(), PngLimits::default(), &counter).unwrap();
  assert_eq!(png.pixels, vec![0x42]);
  assert_eq!(counter.crc_calls.get(), 3);
  assert_eq!(counter.adler_calls.get(), 1);
}

#[test]
fn test_checksum_failures() {
  // damaged pixel data, the chunk CRC catches it first
  let mut bytes = one_gray_pixel_png();
  let idat_data_start = 8 + 25 + 8;
  bytes[idat_data_start + 8] ^= 0x01;
  assert_eq!(decode_png(&bytes), Err(PngError::ChunkCrcMismatch));

  // damaged IEND crc
  let mut bytes = one_gray_pixel_png();
  let last = bytes.len() - 1;
  bytes[last] ^= 0xFF;
  assert_eq!(decode_png(&bytes), Err(PngError::ChunkCrcMismatch));

  // damaged adler trailer with a correct chunk CRC
  let mut zlib = ONE_PIXEL_ZLIB;
  zlib[12] = 0x44;
  let header = ihdr(1, 1, 8, 0, 0);
  let err = decode_chunks(&[(b"IHDR", &header), (b"IDAT", &zlib), (b"IEND", &[])]).unwrap_err();
  assert_eq!(err, PngError::Adler32Mismatch);
  assert_eq!(err.kind(), PngErrorKind::ChecksumMismatch);
}

#[test]
fn test_damaged_pixel_with_good_crc() {
  // the chunk CRC is rebuilt over the damage, so only the adler32 catches it
  let mut zlib = ONE_PIXEL_ZLIB;
  zlib[8] ^= 0x01;
  let header = ihdr(1, 1, 8, 0, 0);
  let err = decode_chunks(&[(b"IHDR", &header), (b"IDAT", &zlib), (b"IEND", &[])]).unwrap_err();
  assert_eq!(err, PngError::Adler32Mismatch);
  assert_eq!(err.kind(), PngErrorKind::ChecksumMismatch);
}

#[test]
fn test_container_structure_errors() {
  let gray = ihdr(1, 1, 8, 0, 0);
  let rgb = ihdr(1, 1, 8, 2, 0);
  let idat: &[u8] = &ONE_PIXEL_ZLIB;
  let end: (&[u8; 4], &[u8]) = (b"IEND", &[]);

  assert_eq!(decode_png(&[]), Err(PngError::NoPngSignature));
  assert_eq!(decode_png(b"\x89PNG\r\n\x1a\x0b"), Err(PngError::NoPngSignature));
  assert_eq!(decode_png(&PNG_SIGNATURE), Err(PngError::UnexpectedEndOfInput));

  assert_eq!(
    decode_chunks(&[(b"IDAT", idat), (b"IHDR", &gray), end]),
    Err(PngError::FirstChunkNotHeader)
  );
  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray), (b"IHDR", &gray), (b"IDAT", idat), end]),
    Err(PngError::DuplicateHeader)
  );
  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray), (b"IDAT", idat)]),
    Err(PngError::UnexpectedEndOfInput)
  );
  assert_eq!(decode_chunks(&[(b"IHDR", &gray), end]), Err(PngError::NoImageData));
  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray), (b"IDAT", idat), (b"IEND", &[0])]),
    Err(PngError::BadEndChunk)
  );
  assert_eq!(
    decode_chunks(&[
      (b"IHDR", &gray),
      (b"IDAT", &idat[..6]),
      (b"tEXt", b"a\0b"),
      (b"IDAT", &idat[6..]),
      end
    ]),
    Err(PngError::NonConsecutiveImageData)
  );
  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray), (b"ABCD", &[]), (b"IDAT", idat), end]),
    Err(PngError::UnknownCriticalChunk)
  );

  // truncated in the middle of a chunk
  let bytes = one_gray_pixel_png();
  assert_eq!(decode_png(&bytes[..bytes.len() - 3]), Err(PngError::UnexpectedEndOfInput));

  // declared length above 2^31 - 1
  let mut bytes = PNG_SIGNATURE.to_vec();
  bytes.extend_from_slice(&[0x80, 0, 0, 0]);
  bytes.extend_from_slice(b"IHDR");
  bytes.extend_from_slice(&[0; 32]);
  assert_eq!(decode_png(&bytes), Err(PngError::ChunkLengthOutOfRange));

  // header problems
  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray[..12]), (b"IDAT", idat), end]),
    Err(PngError::BadHeaderLength)
  );
  for (bad, expected) in [
    (ihdr(0, 1, 8, 0, 0), PngError::IllegalDimensions),
    (ihdr(1, 0x8000_0000, 8, 0, 0), PngError::IllegalDimensions),
    (ihdr(1, 1, 3, 0, 0), PngError::IllegalColorTypeBitDepth),
    (ihdr(1, 1, 4, 2, 0), PngError::IllegalColorTypeBitDepth),
    (ihdr(1, 1, 8, 5, 0), PngError::IllegalColorTypeBitDepth),
    (ihdr(1, 1, 8, 0, 2), PngError::UnknownInterlaceMethod),
  ] {
    assert_eq!(decode_chunks(&[(b"IHDR", &bad), (b"IDAT", idat), end]), Err(expected));
  }
  let mut bad = gray.clone();
  bad[10] = 1;
  assert_eq!(
    decode_chunks(&[(b"IHDR", &bad), (b"IDAT", idat), end]),
    Err(PngError::UnknownCompressionMethod)
  );
  bad[10] = 0;
  bad[11] = 1;
  assert_eq!(
    decode_chunks(&[(b"IHDR", &bad), (b"IDAT", idat), end]),
    Err(PngError::UnknownFilterMethod)
  );

  // palette rules
  let palette: &[u8] = &[1, 2, 3];
  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray), (b"PLTE", palette), (b"IDAT", idat), end]),
    Err(PngError::PaletteNotAllowed)
  );
  assert_eq!(
    decode_chunks(&[(b"IHDR", &rgb), (b"PLTE", &[1, 2, 3, 4]), (b"IDAT", idat), end]),
    Err(PngError::BadPaletteLength)
  );
  assert_eq!(
    decode_chunks(&[(b"IHDR", &rgb), (b"PLTE", &[]), (b"IDAT", idat), end]),
    Err(PngError::BadPaletteLength)
  );
  assert_eq!(
    decode_chunks(&[(b"IHDR", &rgb), (b"PLTE", palette), (b"PLTE", palette), (b"IDAT", idat), end]),
    Err(PngError::MisplacedPalette)
  );
  assert_eq!(
    decode_chunks(&[(b"IHDR", &rgb), (b"IDAT", idat), (b"PLTE", palette), end]),
    Err(PngError::MisplacedPalette)
  );
  let indexed = ihdr(1, 1, 8, 3, 0);
  assert_eq!(
    decode_chunks(&[(b"IHDR", &indexed), (b"IDAT", idat), end]),
    Err(PngError::MissingPalette)
  );
  assert_eq!(
    PngError::MissingPalette.kind(),
    PngErrorKind::MalformedContainer
  );
}

#[test]
fn test_transparency_and_background_rules() {
  let idat: &[u8] = &ONE_PIXEL_ZLIB;
  let end: (&[u8; 4], &[u8]) = (b"IEND", &[]);
  let gray = ihdr(1, 1, 8, 0, 0);
  let gray_alpha = ihdr(1, 1, 8, 4, 0);
  let indexed = ihdr(1, 1, 8, 3, 0);
  let palette: &[u8] = &[1, 2, 3, 4, 5, 6];

  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray), (b"tRNS", &[0, 1, 2]), (b"IDAT", idat), end]),
    Err(PngError::BadTransparency)
  );
  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray_alpha), (b"tRNS", &[0, 1]), (b"IDAT", idat), end]),
    Err(PngError::BadTransparency)
  );
  assert_eq!(
    decode_chunks(&[
      (b"IHDR", &gray),
      (b"tRNS", &[0, 1]),
      (b"tRNS", &[0, 1]),
      (b"IDAT", idat),
      end,
    ]),
    Err(PngError::BadTransparency)
  );
  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray), (b"IDAT", idat), (b"tRNS", &[0, 1]), end]),
    Err(PngError::BadTransparency)
  );
  // palette alphas need the palette first, and can't outnumber it
  assert_eq!(
    decode_chunks(&[
      (b"IHDR", &indexed),
      (b"tRNS", &[0]),
      (b"PLTE", palette),
      (b"IDAT", idat),
      end,
    ]),
    Err(PngError::BadTransparency)
  );
  assert_eq!(
    decode_chunks(&[
      (b"IHDR", &indexed),
      (b"PLTE", palette),
      (b"tRNS", &[0, 0, 0]),
      (b"IDAT", idat),
      end
    ]),
    Err(PngError::BadTransparency)
  );

  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray), (b"bKGD", &[0]), (b"IDAT", idat), end]),
    Err(PngError::BadBackground)
  );
  assert_eq!(
    decode_chunks(&[
      (b"IHDR", &indexed),
      (b"bKGD", &[0]),
      (b"PLTE", palette),
      (b"IDAT", idat),
      end,
    ]),
    Err(PngError::BadBackground)
  );
  assert_eq!(
    decode_chunks(&[
      (b"IHDR", &indexed),
      (b"PLTE", palette),
      (b"bKGD", &[2]),
      (b"IDAT", idat),
      end,
    ]),
    Err(PngError::BadBackground)
  );
  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray), (b"IDAT", idat), (b"bKGD", &[0, 0]), end]),
    Err(PngError::BadBackground)
  );
  let png =
    decode_chunks(&[(b"IHDR", &gray_alpha), (b"bKGD", &[1, 0]), (b"IDAT", idat), end]);
  // the pixel data is too short for gray+alpha, but the bKGD is fine
  assert_eq!(png, Err(PngError::NotEnoughImageData));
}

#[test]
fn test_image_data_errors() {
  let end: (&[u8; 4], &[u8]) = (b"IEND", &[]);
  let gray = ihdr(1, 1, 8, 0, 0);
  let gray_2x2 = ihdr(2, 2, 8, 0, 0);

  let idat = compress_to_vec_zlib(&[5, 0x42], 6);
  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray), (b"IDAT", &idat), end]),
    Err(PngError::IllegalFilterType)
  );

  let idat = compress_to_vec_zlib(&[0, 1, 2, 0], 6);
  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray_2x2), (b"IDAT", &idat), end]),
    Err(PngError::NotEnoughImageData)
  );

  let idat = compress_to_vec_zlib(&[0, 0x42, 0x43], 6);
  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray), (b"IDAT", &idat), end]),
    Err(PngError::TooMuchImageData)
  );

  assert_eq!(
    decode_chunks(&[(b"IHDR", &gray), (b"IDAT", &[0x78, 0x9D, 0, 0]), end]),
    Err(PngError::ZlibHeaderCheck)
  );
}

#[test]
fn test_limits() {
  let image = TestImage { width: 20, height: 3, bit_depth: 8, color_type: 0, channels: 1 };
  let bytes = image.encode(&random_image(20, 3, 8), false);
  assert!(decode_png_with(&bytes, PngLimits::default(), &BuiltinChecksums).is_ok());

  let narrow = PngLimits { max_width: 10, ..PngLimits::default() };
  assert_eq!(
    decode_png_with(&bytes, narrow, &BuiltinChecksums),
    Err(PngError::DimensionsTooLarge)
  );
  let short = PngLimits { max_height: 2, ..PngLimits::default() };
  assert_eq!(
    decode_png_with(&bytes, short, &BuiltinChecksums),
    Err(PngError::DimensionsTooLarge)
  );
  // 3 rows of 1 filter byte and 20 pixels
  let tiny = PngLimits { max_decompressed_bytes: 62, ..PngLimits::default() };
  assert_eq!(
    decode_png_with(&bytes, tiny, &BuiltinChecksums),
    Err(PngError::DimensionsTooLarge)
  );
  let exact = PngLimits { max_decompressed_bytes: 63, ..PngLimits::default() };
  assert!(decode_png_with(&bytes, exact, &BuiltinChecksums).is_ok());
  assert_eq!(PngError::DimensionsTooLarge.kind(), PngErrorKind::ResourceLimit);
}

#[test]
fn test_decode_png_file() {
  let path = std::env::temp_dir().join(format!("pngine_test_{}.png", std::process::id()));
  std::fs::write(&path, one_gray_pixel_png()).unwrap();
  let result = decode_png_file(&path);
  std::fs::remove_file(&path).unwrap();
  assert_eq!(result.unwrap().pixels, vec![0x42]);

  let err = decode_png_file(&path).unwrap_err();
  assert_eq!(err, PngError::Io(std::io::ErrorKind::NotFound));
  assert_eq!(err.kind(), PngErrorKind::Io);
}

#[test]
fn test_RawPngChunkIter() {
  let bytes = one_gray_pixel_png();
  let types: Vec<PngChunkType> =
    RawPngChunkIter::new(&bytes).unwrap().map(|chunk| chunk.unwrap().ty).collect();
  assert_eq!(types, vec![PngChunkType::IHDR, PngChunkType::IDAT, PngChunkType::IEND]);
  for chunk in RawPngChunkIter::new(&bytes).unwrap() {
    assert_eq!(chunk.unwrap().check_crc(&BuiltinChecksums), Ok(()));
  }

  // an error comes out once, then the iterator is done
  let mut it = RawPngChunkIter::new(&bytes[..bytes.len() - 2]).unwrap();
  assert!(it.next().unwrap().is_ok());
  assert!(it.next().unwrap().is_ok());
  assert_eq!(it.next().unwrap(), Err(PngError::UnexpectedEndOfInput));
  assert!(it.next().is_none());
}

#[test]
fn test_RawPngChunkIter_no_panics() {
  for _ in 0..1_000 {
    let mut v = PNG_SIGNATURE.to_vec();
    v.extend(super::rand_bytes(256));
    if let Ok(it) = RawPngChunkIter::new(&v) {
      it.for_each(|_| ());
    }
  }
}

#[test]
fn test_decode_png_no_panics() {
  for _ in 0..1_000 {
    let v = super::rand_bytes(256);
    let _ = decode_png(&v);
  }
  // valid images with one random byte changed, the CRC stops most of these
  let image = TestImage { width: 9, height: 7, bit_depth: 4, color_type: 3, channels: 1 };
  let good = image.encode(&random_image(9, 7, 4), true);
  let noise = super::rand_bytes(2_000);
  for pair in noise.chunks_exact(2) {
    let mut bytes = good.clone();
    let i = (usize::from(pair[0]) * 7) % bytes.len();
    bytes[i] ^= pair[1] | 1;
    let _ = decode_png(&bytes);
  }
  // and with the CRC fixed up, so the damage reaches the decompressor
  for pair in noise.chunks_exact(2) {
    let mut filtered = vec![0_u8; 1 + 5];
    filtered.extend(super::rand_bytes(usize::from(pair[0] % 32)));
    let mut zlib = compress_to_vec_zlib(&filtered, 6);
    let i = usize::from(pair[1]) % zlib.len();
    zlib[i] ^= pair[0] | 1;
    let header = ihdr(5, 1, 8, 0, 1);
    let _ = decode_chunks(&[(b"IHDR", &header), (b"IDAT", &zlib), (b"IEND", &[])]);
  }
}
