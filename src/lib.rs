#![no_std]
#![cfg_attr(docs_rs, feature(doc_cfg))]

//! A PNG decoder with its own zlib inflater.
//!
//! * [`png`] has the container parsing, unfiltering, and de-interlacing, and
//!   the [`decode_png`] entry point that does all of it at once.
//! * [`inflate`] and [`zlib_decompress`] are the decompressor, which you can
//!   also use on its own.
//! * [`checksum`] has the CRC-32 and Adler-32 used along the way.
//!
//! The crate is `no_std`, but it does need `alloc`. The `std` feature (on by
//! default) adds [`decode_png_file`] and the `std::error::Error` impl.
//!
//! ```no_run
//! let bytes: &[u8] = unimplemented!("data from somewhere");
//! let png = pngine::decode_png(bytes)?;
//! let rgba = png.to_rgba8()?;
//! assert_eq!(rgba.len(), (png.width * png.height) as usize);
//! # Ok::<(), pngine::PngError>(())
//! ```
//!
//! Log messages go through the [`log`](https://docs.rs/log) facade.

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

#[cfg(target_pointer_width = "16")]
compile_error!("this crate assumes 32-bit or bigger pointers!");

pub mod checksum;

mod error;
pub use error::*;

mod parser_helpers;

pub mod inflate;
pub use inflate::{inflate, InflateOutcome};

mod zlib;
pub use zlib::{zlib_decompress, ZlibHeader};

pub mod png;
#[cfg(feature = "std")]
pub use png::decode_png_file;
pub use png::{decode_png, decode_png_with, DecodedPng, PngLimits};
