use core::fmt::{Debug, Write};

use crate::{
  checksum::ChecksumProvider,
  parser_helpers::{try_pull_byte_array, try_pull_slice, u32_be},
  PngError, PngResult,
};

/// The 8 bytes that every PNG starts with.
pub const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Chunk lengths must fit in 31 bits.
pub const MAX_CHUNK_LEN: u32 = (1 << 31) - 1;

/// Checks if the PNG's initial 8 bytes are correct.
///
/// * If this is the case, the rest of the bytes are very likely PNG data.
/// * If this is *not* the case, the rest of the bytes are very likely *not* PNG
///   data.
#[inline]
#[must_use]
pub const fn is_png_signature_correct(bytes: &[u8]) -> bool {
  matches!(bytes, [137, 80, 78, 71, 13, 10, 26, 10, ..])
}

/// The four letter tag of a chunk.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PngChunkType(pub [u8; 4]);
#[allow(nonstandard_style)]
impl PngChunkType {
  pub const IHDR: Self = Self(*b"IHDR");
  pub const PLTE: Self = Self(*b"PLTE");
  pub const IDAT: Self = Self(*b"IDAT");
  pub const IEND: Self = Self(*b"IEND");
  pub const tRNS: Self = Self(*b"tRNS");
  pub const bKGD: Self = Self(*b"bKGD");
  pub const cHRM: Self = Self(*b"cHRM");
  pub const gAMA: Self = Self(*b"gAMA");
  pub const iCCP: Self = Self(*b"iCCP");
  pub const sBIT: Self = Self(*b"sBIT");
  pub const sRGB: Self = Self(*b"sRGB");
  pub const pHYs: Self = Self(*b"pHYs");
  pub const tIME: Self = Self(*b"tIME");
  pub const hIST: Self = Self(*b"hIST");
  pub const eXIf: Self = Self(*b"eXIf");

  /// Critical chunks have an uppercase first letter.
  ///
  /// A decoder that doesn't understand a critical chunk can't decode the
  /// image, but unknown ancillary chunks are safe to skip.
  #[inline]
  #[must_use]
  pub const fn is_critical(self) -> bool {
    (self.0[0] & 0x20) == 0
  }
}
impl Debug for PngChunkType {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    for b in self.0 {
      f.write_char(if b.is_ascii_graphic() { b as char } else { '?' })?;
    }
    Ok(())
  }
}

/// An unparsed chunk from a PNG.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawPngChunk<'b> {
  pub ty: PngChunkType,
  pub data: &'b [u8],
  pub declared_crc: u32,
}
impl Debug for RawPngChunk<'_> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("RawPngChunk")
      .field("ty", &self.ty)
      .field("data", &(&self.data[..self.data.len().min(12)], self.data.len()))
      .field("declared_crc", &self.declared_crc)
      .finish()
  }
}
impl RawPngChunk<'_> {
  /// Computes the CRC of the tag and data, and checks it against the CRC that
  /// was stored in the chunk.
  #[inline]
  pub fn check_crc<C: ChecksumProvider + ?Sized>(&self, checksums: &C) -> PngResult<()> {
    let actual = checksums.crc32(&[&self.ty.0, self.data]);
    if actual == self.declared_crc {
      Ok(())
    } else {
      log::debug!(
        "{:?} chunk crc mismatch: declared {:08X}, actual {actual:08X}",
        self.ty,
        self.declared_crc
      );
      Err(PngError::ChunkCrcMismatch)
    }
  }
}

/// An iterator that produces successive raw chunks from PNG bytes.
///
/// * Once all the bytes are used up the iterator returns `None`.
/// * If the bytes end part way through a chunk, or a chunk has a length that's
///   too big, you get a single `Err` and then `None` after that.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct RawPngChunkIter<'b>(&'b [u8]);
impl<'b> RawPngChunkIter<'b> {
  /// Pass the full PNG bytes, this checks and removes the signature.
  #[inline]
  pub const fn new(bytes: &'b [u8]) -> PngResult<Self> {
    match bytes {
      [137, 80, 78, 71, 13, 10, 26, 10, rest @ ..] => Ok(Self(rest)),
      _ => Err(PngError::NoPngSignature),
    }
  }

  fn pull_chunk(&mut self) -> PngResult<RawPngChunk<'b>> {
    let (len, rest) = try_pull_byte_array::<4>(self.0)?;
    let len = u32_be(len);
    if len > MAX_CHUNK_LEN {
      return Err(PngError::ChunkLengthOutOfRange);
    }
    let (ty, rest) = try_pull_byte_array::<4>(rest)?;
    let (data, rest) = try_pull_slice(rest, usize::try_from(len)?)?;
    let (crc, rest) = try_pull_byte_array::<4>(rest)?;
    self.0 = rest;
    Ok(RawPngChunk { ty: PngChunkType(ty), data, declared_crc: u32_be(crc) })
  }
}
impl<'b> Iterator for RawPngChunkIter<'b> {
  type Item = PngResult<RawPngChunk<'b>>;
  #[inline]
  fn next(&mut self) -> Option<Self::Item> {
    if self.0.is_empty() {
      return None;
    }
    let out = self.pull_chunk();
    if out.is_err() {
      self.0 = &[];
    }
    Some(out)
  }
}

#[test]
fn test_chunk_type_criticality() {
  assert!(PngChunkType::IHDR.is_critical());
  assert!(PngChunkType::IDAT.is_critical());
  assert!(!PngChunkType::tRNS.is_critical());
  assert!(!PngChunkType(*b"zzZz").is_critical());
  assert!(PngChunkType(*b"ZZZZ").is_critical());
}

#[test]
fn test_raw_chunk_iter() {
  use crate::checksum::BuiltinChecksums;
  let mut bytes = alloc::vec::Vec::from(PNG_SIGNATURE);
  bytes.extend_from_slice(&[0, 0, 0, 0]);
  bytes.extend_from_slice(b"IEND");
  bytes.extend_from_slice(&[0xAE, 0x42, 0x60, 0x82]);
  let mut it = RawPngChunkIter::new(&bytes).unwrap();
  let iend = it.next().unwrap().unwrap();
  assert_eq!(iend.ty, PngChunkType::IEND);
  assert!(iend.data.is_empty());
  assert_eq!(iend.check_crc(&BuiltinChecksums), Ok(()));
  assert!(it.next().is_none());

  // cut off in the CRC
  let mut it = RawPngChunkIter::new(&bytes[..bytes.len() - 1]).unwrap();
  assert_eq!(it.next(), Some(Err(PngError::UnexpectedEndOfInput)));
  assert!(it.next().is_none());

  // the biggest length byte means the length is too big
  let mut big = alloc::vec::Vec::from(PNG_SIGNATURE);
  big.extend_from_slice(&[0x80, 0, 0, 0]);
  big.extend_from_slice(b"IDAT");
  let mut it = RawPngChunkIter::new(&big).unwrap();
  assert_eq!(it.next(), Some(Err(PngError::ChunkLengthOutOfRange)));

  assert_eq!(RawPngChunkIter::new(b"GIF89a...."), Err(PngError::NoPngSignature));
}
