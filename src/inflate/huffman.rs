use alloc::vec::Vec;

use super::bit_reader::BitReader;
use crate::{PngError, PngResult};

/// How many bits the primary lookup table indexes with.
///
/// Codes of this many bits or less decode with a single table lookup, longer
/// codes take a second lookup in a sub-table.
pub(crate) const FIRST_BITS: u32 = 9;

/// Decoded from table slots that no code reaches.
///
/// This only shows up in trees with 0 or 1 codes, which deflate allows, and
/// callers must treat it as corrupt data.
pub(crate) const INVALID_SYMBOL: u16 = u16::MAX;

/// Marks a slot that hasn't been filled in yet during table construction.
const UNFILLED: u8 = 16;

const HEAD_SIZE: usize = 1 << FIRST_BITS;

/// One slot of the lookup table.
///
/// * In the primary table, a `len` of `FIRST_BITS` or less means `value` is
///   the symbol and `len` is the code's full length.
/// * In the primary table, a `len` above `FIRST_BITS` means `value` is the
///   offset of a sub-table within the same table, and `len` is the longest
///   code sharing this prefix (so the sub-table has `2^(len - FIRST_BITS)`
///   slots).
/// * In a sub-table, `len` is the code's full length and `value` is the symbol.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct TableEntry {
  pub(crate) len: u8,
  pub(crate) value: u16,
}
impl core::fmt::Debug for TableEntry {
  fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
    write!(f, "TE {{ len: {}, value: {} }}", self.len, self.value)
  }
}

/// A canonical Huffman code with a fast decoding table.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct HuffmanTree {
  /// bit length per symbol, 0 for unused symbols
  lengths: Vec<u8>,
  /// canonical code per symbol, most significant bit first
  #[cfg(test)]
  codes: Vec<u16>,
  /// primary table followed by all the sub-tables
  table: Vec<TableEntry>,
}
impl core::fmt::Debug for HuffmanTree {
  fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
    f.debug_struct("HuffmanTree")
      .field("symbols", &self.lengths.len())
      .field("present", &self.lengths.iter().filter(|&&l| l != 0).count())
      .field("table_len", &self.table.len())
      .finish()
  }
}

impl HuffmanTree {
  /// Builds the tree from a bit length per symbol.
  ///
  /// ## Failure
  /// * Any length is over `max_bit_count` (or over 15).
  /// * The lengths are over-subscribed (more codes than bit patterns).
  /// * The lengths are under-subscribed (some bit patterns have no code), with
  ///   the exception of trees that have only 0 or 1 codes in use.
  pub fn from_lengths(lengths: &[u8], max_bit_count: u8) -> PngResult<Self> {
    let codes = fill_in_the_codes(lengths, max_bit_count)?;
    let table = make_table(lengths, &codes)?;
    let mut owned_lengths = Vec::new();
    owned_lengths.try_reserve_exact(lengths.len())?;
    owned_lengths.extend_from_slice(lengths);
    Ok(Self {
      lengths: owned_lengths,
      #[cfg(test)]
      codes,
      table,
    })
  }

  /// The literal/length tree used by fixed Huffman blocks.
  pub fn fixed_lit_len() -> PngResult<Self> {
    let mut lengths = [0_u8; 288];
    lengths[0..=143].fill(8);
    lengths[144..=255].fill(9);
    lengths[256..=279].fill(7);
    lengths[280..=287].fill(8);
    Self::from_lengths(&lengths, 15)
  }

  /// The distance tree used by fixed Huffman blocks.
  ///
  /// There's 32 codes even though distance symbols 30 and 31 never appear in
  /// valid data.
  pub fn fixed_dist() -> PngResult<Self> {
    Self::from_lengths(&[5_u8; 32], 15)
  }

  #[cfg(test)]
  #[inline]
  #[must_use]
  pub fn lengths(&self) -> &[u8] {
    &self.lengths
  }

  #[cfg(test)]
  #[inline]
  #[must_use]
  pub fn codes(&self) -> &[u16] {
    &self.codes
  }

  /// Decodes one symbol.
  ///
  /// The reader must already have at least 15 bits ensured. Returns
  /// [`INVALID_SYMBOL`] if the bits don't match any code.
  #[inline]
  pub fn decode_symbol(&self, br: &mut BitReader<'_>) -> u16 {
    let code = br.peek_bits(FIRST_BITS) as usize;
    let entry = self.table[code];
    let l = u32::from(entry.len);
    if l <= FIRST_BITS {
      br.advance_bits(l);
      return entry.value;
    }
    br.advance_bits(FIRST_BITS);
    let index = usize::from(entry.value) + br.peek_bits(l - FIRST_BITS) as usize;
    match self.table.get(index) {
      Some(sub) => {
        br.advance_bits(u32::from(sub.len) - FIRST_BITS);
        sub.value
      }
      None => INVALID_SYMBOL,
    }
  }
}

/// Reverses the lowest `count` bits of `bits`.
#[inline]
#[must_use]
const fn reverse_bits(bits: u32, count: u32) -> u32 {
  debug_assert!(count > 0 && count <= 16);
  bits.reverse_bits() >> (32 - count)
}

/// Given a bit length per symbol, computes the canonical code per symbol.
///
/// * Lengths must be `max_bit_count` or less.
/// * A length of 0 means the symbol doesn't participate in code generation at
///   all (its code is left as 0).
pub(crate) fn fill_in_the_codes(lengths: &[u8], max_bit_count: u8) -> PngResult<Vec<u16>> {
  // 1) Count the number of codes for each code length.
  let mut bl_count = [0_u32; 16];
  for &len in lengths {
    if len > max_bit_count || len > 15 {
      return Err(PngError::BadHuffmanCodeLengths);
    }
    bl_count[usize::from(len)] += 1;
  }

  // 2) Find the numerical value of the smallest code for each code length.
  let mut next_code = [0_u32; 16];
  let mut code = 0_u32;
  bl_count[0] = 0;
  for bits in 1..16 {
    code = (code + bl_count[bits - 1]) << 1;
    next_code[bits] = code;
  }

  // 3) Assign numerical values to all codes, using consecutive values for all
  //    codes of the same length with the base values determined at step 2.
  //    A code that doesn't fit in its length means the set is over-subscribed.
  let mut codes = Vec::new();
  codes.try_reserve_exact(lengths.len())?;
  for &len in lengths {
    let len = usize::from(len);
    if len == 0 {
      codes.push(0);
      continue;
    }
    let c = next_code[len];
    if (c >> len) != 0 {
      return Err(PngError::BadHuffmanCodeLengths);
    }
    codes.push(c as u16);
    next_code[len] += 1;
  }
  Ok(codes)
}

/// Builds the two level lookup table.
///
/// Deflate sends Huffman codes most significant bit first, but the bit reader
/// gives us bits least significant first, so each code is reversed before it
/// becomes a table index.
fn make_table(lengths: &[u8], codes: &[u16]) -> PngResult<Vec<TableEntry>> {
  const MASK: u32 = (1 << FIRST_BITS) - 1;

  // longest code for each primary prefix, for codes that need a sub-table
  let mut max_lengths = [0_u8; HEAD_SIZE];
  for (&len, &code) in lengths.iter().zip(codes) {
    let l = u32::from(len);
    if l <= FIRST_BITS {
      continue;
    }
    // the first FIRST_BITS bits sent are the top bits of the code
    let index = reverse_bits(u32::from(code) >> (l - FIRST_BITS), FIRST_BITS) as usize;
    max_lengths[index] = max_lengths[index].max(len);
  }

  let mut size = HEAD_SIZE;
  for &l in max_lengths.iter() {
    let l = u32::from(l);
    if l > FIRST_BITS {
      size += 1 << (l - FIRST_BITS);
    }
  }
  let mut table = Vec::new();
  table.try_reserve_exact(size)?;
  table.resize(size, TableEntry { len: UNFILLED, value: 0 });

  // primary slots that point at sub-tables
  let mut ptr = HEAD_SIZE;
  for (i, &l) in max_lengths.iter().enumerate() {
    let l32 = u32::from(l);
    if l32 <= FIRST_BITS {
      continue;
    }
    table[i] = TableEntry { len: l, value: ptr as u16 };
    ptr += 1 << (l32 - FIRST_BITS);
  }

  let mut num_present = 0_usize;
  for (symbol, (&len, &code)) in lengths.iter().zip(codes).enumerate() {
    let l = u32::from(len);
    if l == 0 {
      continue;
    }
    num_present += 1;
    let symbol = symbol as u16;
    let reverse = reverse_bits(u32::from(code), l);
    if l <= FIRST_BITS {
      // short code: every index whose low `l` bits are this code
      for j in 0..(1_u32 << (FIRST_BITS - l)) {
        let index = (reverse | (j << l)) as usize;
        if table[index].len != UNFILLED {
          // a short code collides with a long code's prefix
          return Err(PngError::BadHuffmanCodeLengths);
        }
        table[index] = TableEntry { len, value: symbol };
      }
    } else {
      let index = (reverse & MASK) as usize;
      let max_len = u32::from(table[index].len);
      if max_len < l || max_len == u32::from(UNFILLED) {
        return Err(PngError::BadHuffmanCodeLengths);
      }
      let start = usize::from(table[index].value);
      let sub_bits = l - FIRST_BITS;
      let reverse2 = reverse >> FIRST_BITS;
      for j in 0..(1_u32 << (max_len - l)) {
        let index2 = start + (reverse2 | (j << sub_bits)) as usize;
        table[index2] = TableEntry { len, value: symbol };
      }
    }
  }

  if num_present < 2 {
    // With exactly 1 code deflate still spends 1 bit on it, and with 0 codes
    // the tree just never gets used. Either way some slots are unreachable
    // by valid data, so they decode as an invalid symbol. The lengths keep
    // `advance_bits` sensible in both the primary and sub-tables.
    for (i, entry) in table.iter_mut().enumerate() {
      if entry.len == UNFILLED {
        entry.len = if i < HEAD_SIZE { 1 } else { FIRST_BITS as u8 + 1 };
        entry.value = INVALID_SYMBOL;
      }
    }
  } else if table.iter().any(|entry| entry.len == UNFILLED) {
    // a complete code covers every bit pattern, so this is under-subscribed
    return Err(PngError::BadHuffmanCodeLengths);
  }

  Ok(table)
}

#[cfg(test)]
fn pack_codes(codes: &[(u16, u8)]) -> Vec<u8> {
  // Huffman codes go in most significant bit first
  let mut out = Vec::new();
  let mut bit = 0_usize;
  for &(code, len) in codes {
    for i in (0..len).rev() {
      if bit % 8 == 0 {
        out.push(0);
      }
      let b = ((code >> i) & 1) as u8;
      *out.last_mut().unwrap() |= b << (bit % 8);
      bit += 1;
    }
  }
  // padding so the reader never has to zero fill mid symbol
  out.extend_from_slice(&[0; 4]);
  out
}

#[test]
fn test_fill_in_the_codes() {
  // the small example from RFC 1951, section 3.2.2
  let codes = fill_in_the_codes(&[2, 1, 3, 3], 15).unwrap();
  assert_eq!(codes, [0b10, 0b0, 0b110, 0b111]);

  // the bigger example from the same section
  let codes = fill_in_the_codes(&[3, 3, 3, 3, 3, 2, 4, 4], 15).unwrap();
  assert_eq!(codes, [0b010, 0b011, 0b100, 0b101, 0b110, 0b00, 0b1110, 0b1111]);

  /* Table from the "compressed with fixed huffman codes"

      Lit Value     Bits    Codes
      ---------     ----    ----
      0 - 143       8       00110000 through
                            10111111
      144 - 255     9       110010000 through
                            111111111
      256 - 279     7       0000000 through
                            0010111
      280 - 287     8       11000000 through
                            11000111
  */
  let fixed = HuffmanTree::fixed_lit_len().unwrap();
  let v = fixed.codes();
  assert_eq!(v[0], 0b00110000);
  assert_eq!(v[143], 0b10111111);
  //
  assert_eq!(v[144], 0b110010000);
  assert_eq!(v[255], 0b111111111);
  //
  assert_eq!(v[256], 0b0000000);
  assert_eq!(v[279], 0b0010111);
  //
  assert_eq!(v[280], 0b11000000);
  assert_eq!(v[287], 0b11000111);
}

#[test]
fn test_reject_bad_code_lengths() {
  // over-subscribed
  assert!(HuffmanTree::from_lengths(&[1, 1, 1], 15).is_err());
  assert!(HuffmanTree::from_lengths(&[2, 1, 1], 15).is_err());
  assert!(HuffmanTree::from_lengths(&[1, 2, 2, 2], 15).is_err());
  let mut long = [0_u8; 300];
  long[..257].fill(8);
  assert!(HuffmanTree::from_lengths(&long[..257], 15).is_err());
  // under-subscribed
  assert!(HuffmanTree::from_lengths(&[1, 2], 15).is_err());
  assert!(HuffmanTree::from_lengths(&[2, 2, 2], 15).is_err());
  assert!(HuffmanTree::from_lengths(&[3, 3, 3, 3, 3, 3, 3], 15).is_err());
  assert!(HuffmanTree::from_lengths(&[1, 11, 11], 15).is_err());
  // too long for the alphabet
  assert!(HuffmanTree::from_lengths(&[1, 8], 7).is_err());
  assert!(HuffmanTree::from_lengths(&[1, 16], 15).is_err());
  // the 0 and 1 symbol exceptions
  assert!(HuffmanTree::from_lengths(&[0, 0, 0], 15).is_ok());
  assert!(HuffmanTree::from_lengths(&[0, 1, 0], 15).is_ok());
  assert!(HuffmanTree::from_lengths(&[0, 12, 0], 15).is_ok());
  // complete trees are fine
  assert!(HuffmanTree::from_lengths(&[1, 1], 15).is_ok());
  assert!(HuffmanTree::from_lengths(&[2, 1, 3, 3], 15).is_ok());
}

#[test]
fn test_decode_fixed_symbols() {
  let tree = HuffmanTree::fixed_lit_len().unwrap();
  let symbols = [0_u16, 143, 144, 255, 256, 279, 280, 287, 65, 200];
  let coded: Vec<(u16, u8)> = symbols
    .iter()
    .map(|&s| (tree.codes()[s as usize], tree.lengths()[s as usize]))
    .collect();
  let data = pack_codes(&coded);
  let mut br = BitReader::new(&data).unwrap();
  for &s in symbols.iter() {
    br.ensure_bits(17);
    assert_eq!(tree.decode_symbol(&mut br), s);
  }
  let expected_bits: usize = coded.iter().map(|&(_, l)| l as usize).sum();
  assert_eq!(br.bit_position(), expected_bits);
}

#[test]
fn test_decode_long_codes_use_sub_tables() {
  // lengths 1, 2, ..., 15, 15 form a complete code
  let mut lengths: Vec<u8> = (1..=15).collect();
  lengths.push(15);
  let tree = HuffmanTree::from_lengths(&lengths, 15).unwrap();
  assert!(tree.table.len() > HEAD_SIZE);
  let order = [15_u16, 0, 9, 10, 14, 3, 8, 12, 1];
  let coded: Vec<(u16, u8)> =
    order.iter().map(|&s| (tree.codes()[s as usize], tree.lengths()[s as usize])).collect();
  let data = pack_codes(&coded);
  let mut br = BitReader::new(&data).unwrap();
  for &s in order.iter() {
    br.ensure_bits(17);
    assert_eq!(tree.decode_symbol(&mut br), s);
  }
}

#[test]
fn test_decode_sparse_trees_give_invalid_symbol() {
  // a single code: 1 bit of `0` decodes, `1` doesn't
  let tree = HuffmanTree::from_lengths(&[0, 0, 1], 15).unwrap();
  let data = [0b0000_0010_u8, 0, 0, 0];
  let mut br = BitReader::new(&data).unwrap();
  br.ensure_bits(17);
  assert_eq!(tree.decode_symbol(&mut br), 2);
  assert_eq!(tree.decode_symbol(&mut br), INVALID_SYMBOL);
  assert_eq!(br.bit_position(), 2);

  let empty = HuffmanTree::from_lengths(&[0; 30], 15).unwrap();
  let mut br = BitReader::new(&data).unwrap();
  br.ensure_bits(17);
  assert_eq!(empty.decode_symbol(&mut br), INVALID_SYMBOL);
}
