use crate::{PngError, PngResult};

/// Reads bits, least significant bit first, out of a byte slice.
///
/// The reader keeps a 32-bit lookahead word. You call
/// [`ensure_bits`](Self::ensure_bits) to refill the lookahead from the current
/// bit position, then [`peek_bits`](Self::peek_bits),
/// [`read_bits`](Self::read_bits), and [`advance_bits`](Self::advance_bits)
/// as many times as fits within the bits ensured.
///
/// Refilling past the end of the data fills in zero bits, so a reader that
/// runs off the end doesn't panic, it just reads zeroes. Callers must check
/// [`is_overrun`](Self::is_overrun) after any step that might have done that.
#[derive(Clone)]
pub(crate) struct BitReader<'b> {
  data: &'b [u8],
  /// size of `data` in bits
  bit_size: usize,
  /// the bit position of the next unconsumed bit
  bp: usize,
  /// lookahead, the lowest bit is the bit at `bp`
  buffer: u32,
}

impl core::fmt::Debug for BitReader<'_> {
  fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
    let byte = self.bp / 8;
    f.debug_struct("BitReader")
      .field("bp", &self.bp)
      .field("bit_size", &self.bit_size)
      .field("current_byte", &self.data.get(byte))
      .field("buffer", &format_args!("{:032b}", self.buffer))
      .finish()
  }
}

impl<'b> BitReader<'b> {
  /// Makes a reader over the data.
  ///
  /// ## Failure
  /// * If the size in bits (plus a little margin for the lookahead) doesn't
  ///   fit in a `usize`.
  pub fn new(data: &'b [u8]) -> PngResult<Self> {
    let bit_size = data.len().checked_mul(8).ok_or(PngError::CheckedMath)?;
    bit_size.checked_add(64).ok_or(PngError::CheckedMath)?;
    Ok(Self { data, bit_size, bp: 0, buffer: 0 })
  }

  /// The position of the next bit to read.
  #[inline]
  #[must_use]
  pub const fn bit_position(&self) -> usize {
    self.bp
  }

  /// How many bits of real data are left.
  #[inline]
  #[must_use]
  pub const fn bits_remaining(&self) -> usize {
    self.bit_size.saturating_sub(self.bp)
  }

  /// If the cursor has moved past the end of the data.
  ///
  /// This can only happen by consuming zero fill bits, so once this is true
  /// every value read since the data ran out was junk.
  #[inline]
  #[must_use]
  pub const fn is_overrun(&self) -> bool {
    self.bp > self.bit_size
  }

  /// Errors if the cursor has moved past the end of the data.
  #[inline]
  pub fn check_overrun(&self) -> PngResult<()> {
    if self.is_overrun() {
      Err(PngError::BitCursorOverrun)
    } else {
      Ok(())
    }
  }

  /// Makes at least `n` bits (up to 32) available in the lookahead.
  ///
  /// In practice the decoder calls this with 9, 17, 25, or 32.
  #[inline]
  pub fn ensure_bits(&mut self, n: u32) {
    debug_assert!(n <= 32);
    let start = self.bp >> 3;
    let shift = (self.bp & 7) as u32;
    // bits needed beyond the partial first byte, rounded up to whole bytes
    let byte_count = ((shift + n + 7) / 8) as usize;
    let mut word = 0_u64;
    for (i, byte) in self.data.iter().skip(start).take(byte_count).enumerate() {
      word |= u64::from(*byte) << (8 * i);
    }
    self.buffer = (word >> shift) as u32;
  }

  /// Gets the next `n` bits without advancing.
  ///
  /// The bits must have been made available with `ensure_bits`.
  #[inline]
  #[must_use]
  pub const fn peek_bits(&self, n: u32) -> u32 {
    debug_assert!(n <= 32);
    if n >= 32 {
      self.buffer
    } else {
      self.buffer & ((1_u32 << n) - 1)
    }
  }

  /// Moves the cursor forward `n` bits.
  ///
  /// The bits must have been made available with `ensure_bits`.
  #[inline]
  pub fn advance_bits(&mut self, n: u32) {
    debug_assert!(n <= 32);
    self.buffer = self.buffer.checked_shr(n).unwrap_or(0);
    self.bp += n as usize;
  }

  /// Peeks and then advances.
  #[inline]
  pub fn read_bits(&mut self, n: u32) -> u32 {
    let bits = self.peek_bits(n);
    self.advance_bits(n);
    bits
  }

  /// Skips to the next byte boundary and splits off the data from that point
  /// on.
  ///
  /// This is how stored blocks and the zlib trailer get at whole bytes.
  #[inline]
  #[must_use]
  pub fn remaining_aligned_bytes(&self) -> &'b [u8] {
    let byte_pos = (self.bp + 7) >> 3;
    self.data.get(byte_pos..).unwrap_or(&[])
  }

  /// The byte offset of the next byte boundary at or after the cursor.
  #[inline]
  #[must_use]
  pub const fn aligned_byte_position(&self) -> usize {
    (self.bp + 7) >> 3
  }

  /// Moves the cursor to the start of byte `byte_pos`.
  #[inline]
  pub fn seek_to_byte(&mut self, byte_pos: usize) {
    self.bp = byte_pos << 3;
    self.buffer = 0;
  }
}

#[test]
fn test_bit_reader_lsb_first() {
  let data = [0b1010_1100_u8, 0b0000_0001, 0xFF];
  let mut br = BitReader::new(&data).unwrap();
  br.ensure_bits(9);
  assert_eq!(br.read_bits(1), 0);
  assert_eq!(br.read_bits(2), 0b10);
  assert_eq!(br.read_bits(5), 0b10101);
  assert_eq!(br.read_bits(1), 1);
  assert_eq!(br.bit_position(), 9);
  br.ensure_bits(17);
  assert_eq!(br.peek_bits(7), 0);
  br.advance_bits(7);
  br.ensure_bits(9);
  assert_eq!(br.read_bits(8), 0xFF);
  assert!(!br.is_overrun());
  assert_eq!(br.bits_remaining(), 0);
}

#[test]
fn test_bit_reader_unaligned_32() {
  let data = [0xFF_u8, 0x00, 0xFF, 0x00, 0xAB];
  let mut br = BitReader::new(&data).unwrap();
  br.ensure_bits(9);
  br.advance_bits(4);
  br.ensure_bits(32);
  // the top 4 bits of the word come out of the fifth byte
  assert_eq!(br.peek_bits(32), 0xB00F_F00F);
}

#[test]
fn test_bit_reader_zero_fill_and_overrun() {
  let data = [0xFF_u8];
  let mut br = BitReader::new(&data).unwrap();
  br.ensure_bits(25);
  assert_eq!(br.read_bits(12), 0x0FF);
  assert!(br.is_overrun());
  assert_eq!(br.check_overrun(), Err(PngError::BitCursorOverrun));
}

#[test]
fn test_bit_reader_alignment() {
  let data = [0x01_u8, 0x02, 0x03];
  let mut br = BitReader::new(&data).unwrap();
  br.ensure_bits(9);
  br.advance_bits(3);
  assert_eq!(br.aligned_byte_position(), 1);
  assert_eq!(br.remaining_aligned_bytes(), &[0x02, 0x03]);
  br.seek_to_byte(2);
  br.ensure_bits(9);
  assert_eq!(br.read_bits(8), 0x03);
}
