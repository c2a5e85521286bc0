#![forbid(unsafe_code)]

//! The zlib wrapper ([RFC 1950][rfc1950]) around a DEFLATE stream.
//!
//! [rfc1950]: https://www.rfc-editor.org/rfc/rfc1950
//!
//! ```text
//! +-----+-----+=====================+---+---+---+---+
//! | CMF | FLG | ...deflate data...  |      ADLER32  |
//! +-----+-----+=====================+---+---+---+---+
//! ```

use crate::{
  checksum::ChecksumProvider,
  inflate::inflate,
  parser_helpers::{try_pull_byte_array, u32_be},
  PngError, PngResult,
};

/// The two byte header at the start of a zlib stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZlibHeader {
  /// `CM`, always 8 (deflate) once parsed.
  pub compression_method: u8,
  /// `CINFO + 8`, the base 2 log of the compressor's window size.
  pub window_log2: u8,
  /// `FLEVEL`, how hard the compressor says it tried. Informational only.
  pub level: u8,
}
impl ZlibHeader {
  /// Validates the `CMF` and `FLG` bytes.
  ///
  /// ## Failure
  /// * `CM` isn't 8.
  /// * `CINFO` is above 7 (a window bigger than 32K).
  /// * `FDICT` is set, since PNG never uses a preset dictionary.
  /// * The header check bits don't make `CMF * 256 + FLG` a multiple of 31.
  pub const fn parse([cmf, flg]: [u8; 2]) -> PngResult<Self> {
    let compression_method = cmf & 0b1111;
    let cinfo = cmf >> 4;
    if compression_method != 8 {
      return Err(PngError::ZlibUnknownCompressionMethod);
    }
    if cinfo > 7 {
      return Err(PngError::ZlibWindowTooLarge);
    }
    if (flg & 0b10_0000) != 0 {
      return Err(PngError::ZlibPresetDictionary);
    }
    if ((cmf as u16) * 256 + (flg as u16)) % 31 != 0 {
      return Err(PngError::ZlibHeaderCheck);
    }
    Ok(Self { compression_method, window_log2: cinfo + 8, level: flg >> 6 })
  }
}

/// Decompresses a zlib stream into `dest`, returning how many bytes were
/// written.
///
/// The Adler-32 of the output is checked against the stream's trailer using
/// the `checksums` given.
///
/// ## Failure
/// * The header is invalid (see [`ZlibHeader::parse`]).
/// * The DEFLATE data is invalid (see [`inflate`]).
/// * The 4 byte trailer is missing or doesn't match.
pub fn zlib_decompress<C: ChecksumProvider + ?Sized>(
  source: &[u8], dest: &mut [u8], checksums: &C,
) -> PngResult<usize> {
  let (header_bytes, deflate_data) = try_pull_byte_array::<2>(source)?;
  let header = ZlibHeader::parse(header_bytes)?;
  log::trace!("zlib header: {header:?}");

  let outcome = inflate(deflate_data, dest)?;

  // the trailer starts at the first byte boundary after the final block
  let trailer = deflate_data.get(outcome.bytes_consumed..).unwrap_or(&[]);
  let (declared, _) = try_pull_byte_array::<4>(trailer)?;
  let declared = u32_be(declared);
  let actual = checksums.adler32(&dest[..outcome.bytes_written]);
  if declared != actual {
    log::debug!("adler32 mismatch: declared {declared:08X}, actual {actual:08X}");
    return Err(PngError::Adler32Mismatch);
  }
  Ok(outcome.bytes_written)
}

#[test]
fn test_zlib_header_parse() {
  let h = ZlibHeader::parse([0x78, 0x9C]).unwrap();
  assert_eq!(h, ZlibHeader { compression_method: 8, window_log2: 15, level: 2 });
  assert!(ZlibHeader::parse([0x78, 0x01]).is_ok());
  assert!(ZlibHeader::parse([0x08, 0x1D]).is_ok());

  assert_eq!(ZlibHeader::parse([0x79, 0x9C]), Err(PngError::ZlibUnknownCompressionMethod));
  assert_eq!(ZlibHeader::parse([0x88, 0x98]), Err(PngError::ZlibWindowTooLarge));
  assert_eq!(ZlibHeader::parse([0x78, 0x20]), Err(PngError::ZlibPresetDictionary));
  assert_eq!(ZlibHeader::parse([0x78, 0x9D]), Err(PngError::ZlibHeaderCheck));
}

#[test]
fn test_zlib_decompress_stored() {
  use crate::checksum::BuiltinChecksums;
  let good = [0x78, 0x01, 0x01, 0x02, 0x00, 0xFD, 0xFF, 0x00, 0x42, 0x00, 0x44, 0x00, 0x43];
  let mut dest = [0_u8; 2];
  assert_eq!(zlib_decompress(&good, &mut dest, &BuiltinChecksums), Ok(2));
  assert_eq!(dest, [0x00, 0x42]);

  let mut bad_trailer = good;
  bad_trailer[12] ^= 1;
  assert_eq!(
    zlib_decompress(&bad_trailer, &mut dest, &BuiltinChecksums),
    Err(PngError::Adler32Mismatch)
  );

  let short_trailer = &good[..11];
  assert_eq!(
    zlib_decompress(short_trailer, &mut dest, &BuiltinChecksums),
    Err(PngError::UnexpectedEndOfInput)
  );

  assert_eq!(
    zlib_decompress(&[0x78], &mut dest, &BuiltinChecksums),
    Err(PngError::UnexpectedEndOfInput)
  );
}

#[test]
fn test_zlib_decompress_damaged_payload() {
  use crate::checksum::BuiltinChecksums;
  let mut stream = [0x78, 0x01, 0x01, 0x02, 0x00, 0xFD, 0xFF, 0x00, 0x42, 0x00, 0x44, 0x00, 0x43];
  // the stored block still inflates fine, only the adler32 can notice
  stream[8] ^= 0x01;
  let mut dest = [0_u8; 2];
  let err = zlib_decompress(&stream, &mut dest, &BuiltinChecksums).unwrap_err();
  assert_eq!(err, PngError::Adler32Mismatch);
  assert_eq!(err.kind(), crate::PngErrorKind::ChecksumMismatch);
  assert_eq!(dest, [0x00, 0x43]);
}
