#![forbid(unsafe_code)]

//! Module for working with PNG data.
//!
//! * [Portable Network Graphics Specification (Second Edition)][png-spec]
//!
//! [png-spec]: https://www.w3.org/TR/2003/REC-PNG-20031110/
//!
//! ## Automatic Decoding
//!
//! Just call [`decode_png`] and you get a [`DecodedPng`] with the pixels in
//! the image's own format, or call [`DecodedPng::to_rgba8`] on that to get
//! 8-bit RGBA pixels no matter what the format was.
//!
//! ## Step By Step
//!
//! The pieces of the decoder are also available separately:
//!
//! 1) [`parse_png_container`] walks the chunks, checks all the CRCs and
//!    ordering rules, and gathers the [`IHDR`], palette, transparency,
//!    background, and all the `IDAT` data.
//! 2) [`zlib_decompress`](crate::zlib_decompress) turns the `IDAT` data into
//!    filtered scanlines. The exact output size is known from the header, and
//!    for interlaced images it's the total of all 7 passes (see
//!    [`Adam7Layout`]).
//! 3) [`unfilter_scanline`] reverses the filter on each line, using the line
//!    above it. Each interlace pass starts over with no line above.
//! 4) [`adam7_scatter`] moves the pixels of each pass to their place in the
//!    full image, if the image is interlaced.
//!
//! ## Strictness
//!
//! This decoder rejects anything wrong with the critical chunks or with the
//! image data, including both checksum systems (CRC-32 on every chunk, and
//! Adler-32 on the zlib stream). Broken ancillary chunks that don't affect the
//! pixels only get a log message.

mod adam7;
mod chunk;
mod container;
mod decode;
mod header;
mod unfilter;

pub use adam7::{adam7_scatter, Adam7Layout, PassGeometry};
pub use chunk::{
  is_png_signature_correct, PngChunkType, RawPngChunk, RawPngChunkIter, MAX_CHUNK_LEN,
  PNG_SIGNATURE,
};
pub use container::{parse_png_container, PngContainer};
#[cfg(feature = "std")]
pub use decode::decode_png_file;
pub use decode::{decode_png, decode_png_with, Background, DecodedPng, PngLimits, Transparency};
pub use header::{PngColorType, IHDR};
pub use unfilter::unfilter_scanline;
