use core::{fmt, num::TryFromIntError};

/// Shorthand for results from this crate.
pub type PngResult<T> = Result<T, PngError>;

/// The broad category that a [`PngError`] falls into.
///
/// Every error is fatal for the decode attempt that produced it, but the
/// category can still be useful when deciding what to tell a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PngErrorKind {
  /// The container structure itself is wrong: bad signature, bad chunk
  /// lengths, or chunks in an illegal order or count.
  MalformedContainer,
  /// A chunk CRC or the zlib Adler-32 trailer didn't match the data.
  ChecksumMismatch,
  /// The data is well formed but asks for something we don't support.
  UnsupportedFeature,
  /// The zlib/deflate stream (or the filtered scanlines inside it) is broken.
  CorruptCompressedStream,
  /// The input ended before all the expected data was available.
  IncompleteInput,
  /// A configured limit was exceeded, a size computation overflowed, or the
  /// allocator refused us.
  ResourceLimit,
  /// Reading the file from disk failed.
  #[cfg(feature = "std")]
  Io,
}

/// An error from the `pngine` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PngError {
  /// The first 8 bytes aren't the PNG signature.
  NoPngSignature,
  /// A chunk declared a length above `2^31 - 1`.
  ChunkLengthOutOfRange,
  /// The first chunk wasn't `IHDR`.
  FirstChunkNotHeader,
  /// An `IHDR` appeared after the first chunk.
  DuplicateHeader,
  /// The `IHDR` chunk wasn't exactly 13 bytes.
  BadHeaderLength,
  /// The declared width and/or height of this image is 0 or above `2^31 - 1`.
  IllegalDimensions,
  /// A second `PLTE` chunk, or a `PLTE` after the image data.
  MisplacedPalette,
  /// The `PLTE` length isn't a multiple of 3, or has 0 or more than 256 entries.
  BadPaletteLength,
  /// Grayscale images must not have a palette.
  PaletteNotAllowed,
  /// Indexed color images must have a palette before the image data.
  MissingPalette,
  /// A `tRNS` chunk that's repeated, out of order, or the wrong size.
  BadTransparency,
  /// A `bKGD` chunk that's repeated, out of order, or the wrong size.
  BadBackground,
  /// `IDAT` chunks must all be one after the other.
  NonConsecutiveImageData,
  /// There were no `IDAT` chunks at all.
  NoImageData,
  /// `IEND` must have no data.
  BadEndChunk,

  /// A chunk's declared CRC doesn't match the CRC of its type and data.
  ChunkCrcMismatch,
  /// The zlib Adler-32 trailer doesn't match the decompressed bytes.
  Adler32Mismatch,

  /// The color type and bit depth combination isn't allowed by PNG.
  IllegalColorTypeBitDepth,
  /// Compression method other than 0.
  UnknownCompressionMethod,
  /// Filter method other than 0.
  UnknownFilterMethod,
  /// Interlace method other than 0 or 1.
  UnknownInterlaceMethod,
  /// A critical chunk type that we don't know how to handle.
  UnknownCriticalChunk,
  /// The zlib header's compression method isn't deflate (8).
  ZlibUnknownCompressionMethod,
  /// The zlib header's window size is above 32K.
  ZlibWindowTooLarge,
  /// The zlib stream wants a preset dictionary, which PNG forbids.
  ZlibPresetDictionary,

  /// The zlib header check bits are wrong.
  ZlibHeaderCheck,
  /// Block type 3 is reserved.
  ReservedBlockType,
  /// A stored block's `NLEN` isn't the ones complement of `LEN`.
  StoredLengthMismatch,
  /// The code lengths given can't form a proper Huffman tree.
  BadHuffmanCodeLengths,
  /// The dynamic block header is inconsistent (bad repeat codes, or the end
  /// of block symbol has no code).
  BadDynamicHuffmanTreeData,
  /// The bit pattern decoded to a symbol that isn't allowed here.
  InvalidHuffmanSymbol,
  /// Distance codes 30 and 31 never appear in valid data.
  ReservedDistanceCode,
  /// A back reference pointed before the start of the output.
  DistanceTooFarBack,
  /// Decoding walked the bit cursor past the end of the compressed data.
  BitCursorOverrun,
  /// The decompressed data is bigger than the image needs.
  TooMuchImageData,
  /// A scanline started with a filter type above 4.
  IllegalFilterType,

  /// The compressed data ended in the middle of something.
  UnexpectedEndOfInput,
  /// The decompressed data is smaller than the image needs.
  NotEnoughImageData,

  /// The image is larger than the configured limits.
  DimensionsTooLarge,
  /// A size calculation overflowed.
  CheckedMath,
  /// The allocator couldn't give us enough space.
  Alloc,

  /// Reading the PNG file failed.
  #[cfg(feature = "std")]
  Io(std::io::ErrorKind),
}

impl PngError {
  /// The broad category of this error.
  #[must_use]
  pub const fn kind(self) -> PngErrorKind {
    use PngError::*;
    match self {
      NoPngSignature | ChunkLengthOutOfRange | FirstChunkNotHeader | DuplicateHeader
      | BadHeaderLength | IllegalDimensions | MisplacedPalette | BadPaletteLength
      | PaletteNotAllowed | MissingPalette | BadTransparency | BadBackground
      | NonConsecutiveImageData | NoImageData | BadEndChunk => PngErrorKind::MalformedContainer,
      ChunkCrcMismatch | Adler32Mismatch => PngErrorKind::ChecksumMismatch,
      IllegalColorTypeBitDepth | UnknownCompressionMethod | UnknownFilterMethod
      | UnknownInterlaceMethod | UnknownCriticalChunk | ZlibUnknownCompressionMethod
      | ZlibWindowTooLarge | ZlibPresetDictionary => PngErrorKind::UnsupportedFeature,
      ZlibHeaderCheck | ReservedBlockType | StoredLengthMismatch | BadHuffmanCodeLengths
      | BadDynamicHuffmanTreeData | InvalidHuffmanSymbol | ReservedDistanceCode
      | DistanceTooFarBack | BitCursorOverrun | TooMuchImageData | IllegalFilterType => {
        PngErrorKind::CorruptCompressedStream
      }
      UnexpectedEndOfInput | NotEnoughImageData => PngErrorKind::IncompleteInput,
      DimensionsTooLarge | CheckedMath | Alloc => PngErrorKind::ResourceLimit,
      #[cfg(feature = "std")]
      Io(_) => PngErrorKind::Io,
    }
  }
}

impl fmt::Display for PngError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      #[cfg(feature = "std")]
      PngError::Io(kind) => write!(f, "png file could not be read: {kind}"),
      other => write!(f, "png decode failed ({:?}): {:?}", other.kind(), other),
    }
  }
}

#[cfg(feature = "std")]
impl std::error::Error for PngError {}

impl From<alloc::collections::TryReserveError> for PngError {
  #[inline]
  fn from(_: alloc::collections::TryReserveError) -> Self {
    Self::Alloc
  }
}
impl From<TryFromIntError> for PngError {
  #[inline]
  fn from(_: TryFromIntError) -> Self {
    Self::CheckedMath
  }
}
#[cfg(feature = "std")]
impl From<std::io::Error> for PngError {
  #[inline]
  fn from(e: std::io::Error) -> Self {
    Self::Io(e.kind())
  }
}

#[test]
fn test_error_kinds() {
  assert_eq!(PngError::NoPngSignature.kind(), PngErrorKind::MalformedContainer);
  assert_eq!(PngError::ChunkCrcMismatch.kind(), PngErrorKind::ChecksumMismatch);
  assert_eq!(PngError::Adler32Mismatch.kind(), PngErrorKind::ChecksumMismatch);
  assert_eq!(PngError::ZlibPresetDictionary.kind(), PngErrorKind::UnsupportedFeature);
  assert_eq!(PngError::DistanceTooFarBack.kind(), PngErrorKind::CorruptCompressedStream);
  assert_eq!(PngError::NotEnoughImageData.kind(), PngErrorKind::IncompleteInput);
  assert_eq!(PngError::CheckedMath.kind(), PngErrorKind::ResourceLimit);
}
