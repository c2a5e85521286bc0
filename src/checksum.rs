//! The two checksums that PNG data carries.
//!
//! * Every chunk ends with a CRC-32 of the chunk type and chunk data.
//! * The zlib stream formed by the `IDAT` chunks ends with an Adler-32 of the
//!   *decompressed* bytes.
//!
//! The decoder only ever talks to these through [`ChecksumProvider`], so you
//! can substitute a faster (eg: SIMD) implementation if you have one.

/// Something that can compute the checksums a PNG decode needs.
pub trait ChecksumProvider {
  /// CRC-32 (ISO 3309, the one PNG and zlib's `crc32` use) of all the parts
  /// given, as if they were one contiguous slice.
  fn crc32(&self, parts: &[&[u8]]) -> u32;

  /// Adler-32 (RFC 1950) of the bytes given.
  fn adler32(&self, bytes: &[u8]) -> u32;
}

/// The table based checksums built into this crate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BuiltinChecksums;
impl ChecksumProvider for BuiltinChecksums {
  #[inline]
  fn crc32(&self, parts: &[&[u8]]) -> u32 {
    crc32(parts.iter().flat_map(|part| part.iter().copied()))
  }
  #[inline]
  fn adler32(&self, bytes: &[u8]) -> u32 {
    adler32(bytes)
  }
}

const CRC_TABLE: [u32; 256] = make_crc_table();

const fn make_crc_table() -> [u32; 256] {
  let mut out = [0; 256];
  let mut n = 0;
  while n < 256 {
    let mut c = n as u32;
    let mut k = 0;
    while k < 8 {
      if (c & 1) != 0 {
        c = 0xEDB8_8320_u32 ^ (c >> 1);
      } else {
        c >>= 1;
      }
      //
      k += 1;
    }
    out[n] = c;
    //
    n += 1;
  }
  out
}

fn update_crc(mut crc: u32, iter: impl Iterator<Item = u8>) -> u32 {
  for byte in iter {
    let i = (crc ^ u32::from(byte)) as u8 as usize;
    crc = CRC_TABLE[i] ^ (crc >> 8);
  }
  crc
}

/// CRC-32 of a stream of bytes.
#[inline]
#[must_use]
pub fn crc32(iter: impl Iterator<Item = u8>) -> u32 {
  update_crc(u32::MAX, iter) ^ u32::MAX
}

/// The largest prime below 2^16.
const ADLER_MOD: u32 = 65521;

/// How many bytes we can sum before `b` could overflow a `u32`.
const ADLER_NMAX: usize = 5552;

/// Adler-32 of a byte slice.
#[must_use]
pub fn adler32(bytes: &[u8]) -> u32 {
  let mut a: u32 = 1;
  let mut b: u32 = 0;
  for block in bytes.chunks(ADLER_NMAX) {
    for &byte in block {
      a += u32::from(byte);
      b += a;
    }
    a %= ADLER_MOD;
    b %= ADLER_MOD;
  }
  (b << 16) | a
}

#[test]
fn test_crc32_known_values() {
  assert_eq!(crc32([].into_iter()), 0);
  assert_eq!(crc32(b"123456789".iter().copied()), 0xCBF4_3926);
  // every PNG ends with this exact chunk
  assert_eq!(crc32(b"IEND".iter().copied()), 0xAE42_6082);
  let split = BuiltinChecksums.crc32(&[b"IE", b"", b"ND"]);
  assert_eq!(split, 0xAE42_6082);
}

#[test]
fn test_adler32_known_values() {
  assert_eq!(adler32(&[]), 1);
  assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
  assert_eq!(adler32(&[0x00, 0x42]), 0x0044_0043);
  // long enough to need the modulo folding several times
  let big = [0xFF_u8; 20_000];
  let mut a: u64 = 1;
  let mut b: u64 = 0;
  for &x in big.iter() {
    a = (a + x as u64) % 65521;
    b = (b + a) % 65521;
  }
  assert_eq!(adler32(&big), ((b << 16) | a) as u32);
}
