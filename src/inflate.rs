#![forbid(unsafe_code)]

//! DEFLATE decompression ([RFC 1951][rfc1951]).
//!
//! [rfc1951]: https://www.rfc-editor.org/rfc/rfc1951
//!
//! The decompressor writes into a caller-provided slice instead of a growable
//! buffer. PNG always knows the exact decompressed size up front, and data
//! that doesn't fit in that size is an error rather than something to make
//! room for.
//!
//! There's no streaming support: all the compressed bytes must be given at
//! once as a single slice.

use crate::{
  parser_helpers::{try_pull_byte_array, try_pull_slice},
  PngError, PngResult,
};

mod bit_reader;
mod huffman;

use bit_reader::BitReader;
use huffman::HuffmanTree;

/// Base length for length symbols 257 through 285.
const LENGTH_BASE: [u16; 29] = [
  3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115,
  131, 163, 195, 227, 258,
];
/// Extra bits for length symbols 257 through 285.
const LENGTH_EXTRA: [u8; 29] =
  [0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0];
/// Base distance for distance symbols 0 through 29.
const DISTANCE_BASE: [u16; 30] = [
  1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
  2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
/// Extra bits for distance symbols 0 through 29.
const DISTANCE_EXTRA: [u8; 30] = [
  0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
  13,
];
/// The order that a dynamic block header lists the code length code lengths.
const CODE_LENGTH_ORDER: [usize; 19] =
  [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

const NUM_LIT_LEN_SYMBOLS: usize = 288;
const NUM_DISTANCE_SYMBOLS: usize = 32;
const NUM_CODE_LENGTH_SYMBOLS: usize = 19;
const END_OF_BLOCK: u16 = 256;

/// The result of a successful [`inflate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InflateOutcome {
  /// How many bytes were written to the start of the destination.
  pub bytes_written: usize,
  /// The byte offset within the source just past the end of the DEFLATE
  /// stream (rounded up to a whole byte).
  pub bytes_consumed: usize,
}

/// A block of a DEFLATE stream, after its header has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DeflateBlock {
  /// Uncompressed bytes, the reader is at the first of them.
  Stored { len: u16 },
  /// Huffman codes using the fixed trees.
  FixedHuffman,
  /// Huffman codes using trees that were given in the block header.
  DynamicHuffman { lit_len: HuffmanTree, dist: HuffmanTree },
}

/// Decompresses a raw DEFLATE stream into `dest`.
///
/// Decoding stops after the block marked as final. Anything in `source` after
/// that point is ignored (it's reported through
/// [`bytes_consumed`](InflateOutcome::bytes_consumed)).
///
/// ## Failure
/// * The stream is corrupt in any way.
/// * The stream runs out before the final block is complete.
/// * The stream would write more bytes than `dest` can hold.
pub fn inflate(source: &[u8], dest: &mut [u8]) -> PngResult<InflateOutcome> {
  let mut br = BitReader::new(source)?;
  let mut pos = 0_usize;
  // built on the first fixed block, then reused
  let mut fixed_trees: Option<(HuffmanTree, HuffmanTree)> = None;
  loop {
    let (is_final, block) = read_block_header(&mut br)?;
    log::trace!("deflate block at bit {}: final={is_final}, {block:?}", br.bit_position());
    pos = match block {
      DeflateBlock::Stored { len } => inflate_stored(&mut br, dest, pos, usize::from(len))?,
      DeflateBlock::FixedHuffman => {
        let (lit_len, dist) = match fixed_trees.take() {
          Some(trees) => trees,
          None => (HuffmanTree::fixed_lit_len()?, HuffmanTree::fixed_dist()?),
        };
        let end = inflate_huffman(&mut br, dest, pos, &lit_len, &dist)?;
        fixed_trees = Some((lit_len, dist));
        end
      }
      DeflateBlock::DynamicHuffman { lit_len, dist } => {
        inflate_huffman(&mut br, dest, pos, &lit_len, &dist)?
      }
    };
    if is_final {
      break;
    }
  }
  Ok(InflateOutcome { bytes_written: pos, bytes_consumed: br.aligned_byte_position() })
}

/// Reads `BFINAL`, `BTYPE`, and whatever else the block type puts before the
/// block's data.
fn read_block_header(br: &mut BitReader<'_>) -> PngResult<(bool, DeflateBlock)> {
  if br.bits_remaining() < 3 {
    return Err(PngError::UnexpectedEndOfInput);
  }
  br.ensure_bits(3);
  let is_final = br.read_bits(1) != 0;
  let block = match br.read_bits(2) {
    0 => {
      // LEN and NLEN start at the next byte boundary
      let rest = br.remaining_aligned_bytes();
      let (len, rest) = try_pull_byte_array::<2>(rest)?;
      let (nlen, _) = try_pull_byte_array::<2>(rest)?;
      let len = u16::from_le_bytes(len);
      let nlen = u16::from_le_bytes(nlen);
      if len ^ nlen != 0xFFFF {
        return Err(PngError::StoredLengthMismatch);
      }
      br.seek_to_byte(br.aligned_byte_position() + 4);
      DeflateBlock::Stored { len }
    }
    1 => DeflateBlock::FixedHuffman,
    2 => {
      let (lit_len, dist) = read_dynamic_trees(br)?;
      DeflateBlock::DynamicHuffman { lit_len, dist }
    }
    _ => return Err(PngError::ReservedBlockType),
  };
  Ok((is_final, block))
}

fn inflate_stored(
  br: &mut BitReader<'_>, dest: &mut [u8], pos: usize, len: usize,
) -> PngResult<usize> {
  let start = br.aligned_byte_position();
  let (data, _) = try_pull_slice(br.remaining_aligned_bytes(), len)?;
  let end = pos.checked_add(len).ok_or(PngError::CheckedMath)?;
  dest.get_mut(pos..end).ok_or(PngError::TooMuchImageData)?.copy_from_slice(data);
  br.seek_to_byte(start + len);
  Ok(end)
}

/// Reads the code length code, and then uses it to read the literal/length
/// and distance code lengths.
fn read_dynamic_trees(br: &mut BitReader<'_>) -> PngResult<(HuffmanTree, HuffmanTree)> {
  if br.bits_remaining() < 14 {
    return Err(PngError::UnexpectedEndOfInput);
  }
  br.ensure_bits(14);
  let hlit = br.read_bits(5) as usize + 257;
  let hdist = br.read_bits(5) as usize + 1;
  let hclen = br.read_bits(4) as usize + 4;

  let mut cl_lengths = [0_u8; NUM_CODE_LENGTH_SYMBOLS];
  for &symbol in CODE_LENGTH_ORDER.iter().take(hclen) {
    br.ensure_bits(3);
    cl_lengths[symbol] = br.read_bits(3) as u8;
  }
  br.check_overrun()?;
  let cl_tree = HuffmanTree::from_lengths(&cl_lengths, 7)?;

  // literal/length lengths and distance lengths are one continuous sequence,
  // so a repeat can cross from one to the other.
  let total = hlit + hdist;
  let mut lengths = [0_u8; NUM_LIT_LEN_SYMBOLS + NUM_DISTANCE_SYMBOLS];
  let mut acquired = 0_usize;
  while acquired < total {
    br.ensure_bits(25);
    let symbol = cl_tree.decode_symbol(br);
    let (value, repeat_count) = match symbol {
      0..=15 => (symbol as u8, 1),
      16 => {
        if acquired == 0 {
          return Err(PngError::BadDynamicHuffmanTreeData);
        }
        (lengths[acquired - 1], 3 + br.read_bits(2) as usize)
      }
      17 => (0, 3 + br.read_bits(3) as usize),
      18 => (0, 11 + br.read_bits(7) as usize),
      _ => return Err(PngError::BadDynamicHuffmanTreeData),
    };
    br.check_overrun()?;
    let end = acquired + repeat_count;
    if end > total {
      return Err(PngError::BadDynamicHuffmanTreeData);
    }
    lengths[acquired..end].fill(value);
    acquired = end;
  }

  let (lit_len_lengths, dist_lengths) = lengths[..total].split_at(hlit);
  if lit_len_lengths[usize::from(END_OF_BLOCK)] == 0 {
    // the block could never end
    return Err(PngError::BadDynamicHuffmanTreeData);
  }
  let mut ll = [0_u8; NUM_LIT_LEN_SYMBOLS];
  ll[..hlit].copy_from_slice(lit_len_lengths);
  let mut d = [0_u8; NUM_DISTANCE_SYMBOLS];
  d[..hdist].copy_from_slice(dist_lengths);
  Ok((HuffmanTree::from_lengths(&ll, 15)?, HuffmanTree::from_lengths(&d, 15)?))
}

/// Decodes symbols until the end of block symbol, returning the new output
/// position.
fn inflate_huffman(
  br: &mut BitReader<'_>, dest: &mut [u8], mut pos: usize, lit_len: &HuffmanTree,
  dist: &HuffmanTree,
) -> PngResult<usize> {
  loop {
    // longest code is 15 bits, plus up to 5 length extra bits
    br.ensure_bits(32);
    let symbol = lit_len.decode_symbol(br);
    br.check_overrun()?;
    match symbol {
      0..=255 => {
        let slot = dest.get_mut(pos).ok_or(PngError::TooMuchImageData)?;
        *slot = symbol as u8;
        pos += 1;
      }
      END_OF_BLOCK => return Ok(pos),
      257..=285 => {
        let index = usize::from(symbol - 257);
        let length = usize::from(LENGTH_BASE[index])
          + br.read_bits(u32::from(LENGTH_EXTRA[index])) as usize;

        // longest code is 15 bits, plus up to 13 distance extra bits
        br.ensure_bits(32);
        let dist_symbol = dist.decode_symbol(br);
        let d = match dist_symbol {
          0..=29 => usize::from(dist_symbol),
          30 | 31 => return Err(PngError::ReservedDistanceCode),
          _ => return Err(PngError::InvalidHuffmanSymbol),
        };
        let distance =
          usize::from(DISTANCE_BASE[d]) + br.read_bits(u32::from(DISTANCE_EXTRA[d])) as usize;
        br.check_overrun()?;

        if distance > pos {
          return Err(PngError::DistanceTooFarBack);
        }
        let end = pos + length;
        if end > dest.len() {
          return Err(PngError::TooMuchImageData);
        }
        let start = pos - distance;
        if distance < length {
          // the copy reads bytes that it wrote itself, so go one at a time
          for i in pos..end {
            dest[i] = dest[i - distance];
          }
        } else {
          dest.copy_within(start..start + length, pos);
        }
        pos = end;
      }
      // 286, 287, and the invalid symbol marker
      _ => return Err(PngError::InvalidHuffmanSymbol),
    }
  }
}

/// Writes bits the way a DEFLATE encoder would.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
struct TestBitWriter {
  out: alloc::vec::Vec<u8>,
  bit: usize,
}
#[cfg(test)]
impl TestBitWriter {
  /// plain values go in least significant bit first
  fn push_lsb(&mut self, value: u32, count: u32) {
    for i in 0..count {
      if self.bit % 8 == 0 {
        self.out.push(0);
      }
      let b = ((value >> i) & 1) as u8;
      *self.out.last_mut().unwrap() |= b << (self.bit % 8);
      self.bit += 1;
    }
  }
  /// Huffman codes go in most significant bit first
  fn push_code(&mut self, code: u32, len: u32) {
    for i in (0..len).rev() {
      self.push_lsb((code >> i) & 1, 1);
    }
  }
  fn fixed_symbol(&mut self, symbol: u32) {
    match symbol {
      0..=143 => self.push_code(0x30 + symbol, 8),
      144..=255 => self.push_code(0x190 + (symbol - 144), 9),
      256..=279 => self.push_code(symbol - 256, 7),
      _ => self.push_code(0xC0 + (symbol - 280), 8),
    }
  }
  fn fixed_header(&mut self) {
    self.push_lsb(1, 1);
    self.push_lsb(1, 2);
  }
}

#[test]
fn test_inflate_stored() {
  let source = [0x01, 0x03, 0x00, 0xFC, 0xFF, 1, 2, 3, 99];
  let mut dest = [0_u8; 3];
  let outcome = inflate(&source, &mut dest).unwrap();
  assert_eq!(outcome, InflateOutcome { bytes_written: 3, bytes_consumed: 8 });
  assert_eq!(dest, [1, 2, 3]);

  // NLEN isn't the complement
  let source = [0x01, 0x03, 0x00, 0xFC, 0xFE, 1, 2, 3];
  assert_eq!(inflate(&source, &mut dest), Err(PngError::StoredLengthMismatch));
  // data is cut short
  let source = [0x01, 0x03, 0x00, 0xFC, 0xFF, 1, 2];
  assert_eq!(inflate(&source, &mut dest), Err(PngError::UnexpectedEndOfInput));
  // too much data for the destination
  let mut small = [0_u8; 2];
  let source = [0x01, 0x03, 0x00, 0xFC, 0xFF, 1, 2, 3];
  assert_eq!(inflate(&source, &mut small), Err(PngError::TooMuchImageData));
}

#[test]
fn test_inflate_block_header_errors() {
  let mut dest = [0_u8; 8];
  assert_eq!(inflate(&[], &mut dest), Err(PngError::UnexpectedEndOfInput));
  // BFINAL=1, BTYPE=3
  assert_eq!(inflate(&[0x07], &mut dest), Err(PngError::ReservedBlockType));
  // a non-final stored block, then nothing
  let source = [0x00, 0x00, 0x00, 0xFF, 0xFF];
  assert_eq!(inflate(&source, &mut dest), Err(PngError::UnexpectedEndOfInput));
}

#[test]
fn test_inflate_fixed_with_back_references() {
  let mut w = TestBitWriter::default();
  w.fixed_header();
  for &b in b"abc" {
    w.fixed_symbol(u32::from(b));
  }
  // length 6 (symbol 260), distance 3 (code 2)
  w.fixed_symbol(260);
  w.push_code(2, 5);
  // length 5 (symbol 259), distance 1 (code 0), overlapping
  w.fixed_symbol(259);
  w.push_code(0, 5);
  w.fixed_symbol(256);
  let mut dest = [0_u8; 14];
  let outcome = inflate(&w.out, &mut dest).unwrap();
  assert_eq!(outcome.bytes_written, 14);
  assert_eq!(outcome.bytes_consumed, w.out.len());
  assert_eq!(&dest, b"abcabcabcccccc");
}

#[test]
fn test_inflate_several_fixed_blocks() {
  let mut w = TestBitWriter::default();
  // not final, fixed
  w.push_lsb(0, 1);
  w.push_lsb(1, 2);
  for &b in b"ab" {
    w.fixed_symbol(u32::from(b));
  }
  w.fixed_symbol(256);
  w.fixed_header();
  for &b in b"cd" {
    w.fixed_symbol(u32::from(b));
  }
  // length 3, distance 4 (code 3), reaching back into the first block
  w.fixed_symbol(257);
  w.push_code(3, 5);
  w.fixed_symbol(256);
  let mut dest = [0_u8; 7];
  let outcome = inflate(&w.out, &mut dest).unwrap();
  assert_eq!(outcome.bytes_written, 7);
  assert_eq!(&dest, b"abcdabc");
}

#[test]
fn test_inflate_fixed_length_extra_bits() {
  let mut w = TestBitWriter::default();
  w.fixed_header();
  w.fixed_symbol(u32::from(b'z'));
  // symbol 265 is length 11 or 12, with 1 extra bit
  w.fixed_symbol(265);
  w.push_lsb(1, 1);
  w.push_code(0, 5);
  // symbol 285 is length 258 with no extra bits
  w.fixed_symbol(285);
  w.push_code(0, 5);
  w.fixed_symbol(256);
  let mut dest = [0_u8; 1 + 12 + 258];
  let outcome = inflate(&w.out, &mut dest).unwrap();
  assert_eq!(outcome.bytes_written, dest.len());
  assert!(dest.iter().all(|&b| b == b'z'));
}

#[test]
fn test_inflate_fixed_errors() {
  // distance goes before the output start
  let mut w = TestBitWriter::default();
  w.fixed_header();
  w.fixed_symbol(u32::from(b'a'));
  w.fixed_symbol(257);
  w.push_code(1, 5);
  w.fixed_symbol(256);
  let mut dest = [0_u8; 16];
  assert_eq!(inflate(&w.out, &mut dest), Err(PngError::DistanceTooFarBack));

  // distance code 30
  let mut w = TestBitWriter::default();
  w.fixed_header();
  w.fixed_symbol(u32::from(b'a'));
  w.fixed_symbol(257);
  w.push_code(30, 5);
  w.fixed_symbol(256);
  assert_eq!(inflate(&w.out, &mut dest), Err(PngError::ReservedDistanceCode));

  // literal/length symbol 286
  let mut w = TestBitWriter::default();
  w.fixed_header();
  w.fixed_symbol(286);
  assert_eq!(inflate(&w.out, &mut dest), Err(PngError::InvalidHuffmanSymbol));

  // more literals than the destination holds
  let mut w = TestBitWriter::default();
  w.fixed_header();
  for _ in 0..3 {
    w.fixed_symbol(7);
  }
  w.fixed_symbol(256);
  let mut small = [0_u8; 2];
  assert_eq!(inflate(&w.out, &mut small), Err(PngError::TooMuchImageData));

  // the end of block symbol is missing, so zero fill gets decoded
  let mut w = TestBitWriter::default();
  w.fixed_header();
  for &b in b"abc" {
    w.fixed_symbol(u32::from(b));
  }
  assert_eq!(inflate(&w.out, &mut dest), Err(PngError::BitCursorOverrun));
}

#[test]
fn test_inflate_dynamic_header_errors() {
  let mut dest = [0_u8; 16];

  // code length codes: symbol 16 and 17 get 1 bit each, then a 16 comes
  // first with nothing to repeat.
  let mut w = TestBitWriter::default();
  w.push_lsb(1, 1);
  w.push_lsb(2, 2);
  w.push_lsb(0, 5);
  w.push_lsb(0, 5);
  w.push_lsb(0, 4);
  for len in [1, 1, 0, 0] {
    w.push_lsb(len, 3);
  }
  w.push_code(0, 1);
  w.push_lsb(0, 32);
  assert_eq!(inflate(&w.out, &mut dest), Err(PngError::BadDynamicHuffmanTreeData));

  // symbol 18 and 0 get 1 bit each.
  let dynamic_prefix = || {
    let mut w = TestBitWriter::default();
    w.push_lsb(1, 1);
    w.push_lsb(2, 2);
    w.push_lsb(0, 5);
    w.push_lsb(0, 5);
    w.push_lsb(0, 4);
    for len in [0, 0, 1, 1] {
      w.push_lsb(len, 3);
    }
    w
  };

  // repeats run past the 258 lengths declared
  let mut w = dynamic_prefix();
  w.push_code(1, 1);
  w.push_lsb(127, 7);
  w.push_code(1, 1);
  w.push_lsb(127, 7);
  w.push_lsb(0, 32);
  assert_eq!(inflate(&w.out, &mut dest), Err(PngError::BadDynamicHuffmanTreeData));

  // exactly 258 zero lengths, so the end of block symbol has no code
  let mut w = dynamic_prefix();
  w.push_code(1, 1);
  w.push_lsb(127, 7);
  w.push_code(1, 1);
  w.push_lsb(108, 7);
  w.push_code(0, 1);
  w.push_lsb(0, 32);
  assert_eq!(inflate(&w.out, &mut dest), Err(PngError::BadDynamicHuffmanTreeData));

  // the header itself is cut short
  let mut w = TestBitWriter::default();
  w.push_lsb(1, 1);
  w.push_lsb(2, 2);
  w.push_lsb(0, 5);
  assert_eq!(inflate(&w.out, &mut dest), Err(PngError::UnexpectedEndOfInput));
}
