use alloc::vec::Vec;

use super::{
  chunk::{PngChunkType, RawPngChunk, RawPngChunkIter},
  header::{PngColorType, IHDR},
};
use crate::{checksum::ChecksumProvider, PngError, PngResult};

/// Ancillary chunks that may appear at most once, with their fixed data
/// length if they have one.
const ONCE_ONLY_ANCILLARY: [(PngChunkType, Option<usize>); 9] = [
  (PngChunkType::cHRM, Some(32)),
  (PngChunkType::gAMA, Some(4)),
  (PngChunkType::iCCP, None),
  (PngChunkType::sBIT, None),
  (PngChunkType::sRGB, Some(1)),
  (PngChunkType::pHYs, Some(9)),
  (PngChunkType::tIME, Some(7)),
  (PngChunkType::hIST, None),
  (PngChunkType::eXIf, None),
];

/// What to do with an ancillary chunk that may only appear once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnceOnly {
  /// Not one of the once-only chunk types.
  NotTracked,
  /// The first well formed copy.
  Accepted,
  /// A well formed copy was already seen.
  Repeated,
  /// The data isn't the fixed length this type always has. This doesn't
  /// count as seeing the chunk.
  BadLength { expected: usize },
}

fn check_once_only(
  seen: &mut [bool; ONCE_ONLY_ANCILLARY.len()], ty: PngChunkType, len: usize,
) -> OnceOnly {
  let Some(i) = ONCE_ONLY_ANCILLARY.iter().position(|(t, _)| *t == ty) else {
    return OnceOnly::NotTracked;
  };
  if let Some(expected) = ONCE_ONLY_ANCILLARY[i].1 {
    if len != expected {
      return OnceOnly::BadLength { expected };
    }
  }
  if seen[i] {
    return OnceOnly::Repeated;
  }
  seen[i] = true;
  OnceOnly::Accepted
}

/// Everything the decoder needs out of the PNG chunks.
///
/// The slices borrow from the PNG bytes, the image data is gathered into one
/// buffer since the zlib stream is split across however many `IDAT` chunks
/// the encoder felt like using.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngContainer<'b> {
  pub header: IHDR,
  /// `PLTE` data, 3 bytes per entry
  pub palette: Option<&'b [u8]>,
  /// `tRNS` data
  pub transparency: Option<&'b [u8]>,
  /// `bKGD` data
  pub background: Option<&'b [u8]>,
  /// all the `IDAT` data, concatenated
  pub idat: Vec<u8>,
}

/// Walks all the chunks of a PNG, verifying the CRCs and the chunk ordering
/// rules.
///
/// ## Failure
/// * The signature is wrong.
/// * Any chunk CRC is wrong.
/// * Any critical chunk is malformed, repeated, or out of order.
/// * The bytes end before the `IEND` chunk.
///
/// Malformed or repeated ancillary chunks that don't affect the pixels are
/// logged and skipped.
pub fn parse_png_container<'b, C: ChecksumProvider + ?Sized>(
  bytes: &'b [u8], checksums: &C,
) -> PngResult<PngContainer<'b>> {
  let mut chunks = RawPngChunkIter::new(bytes)?;
  let mut next_chunk = || -> PngResult<RawPngChunk<'b>> {
    let chunk = chunks.next().ok_or(PngError::UnexpectedEndOfInput)??;
    chunk.check_crc(checksums)?;
    log::trace!("chunk {:?}, {} bytes", chunk.ty, chunk.data.len());
    Ok(chunk)
  };

  let first = next_chunk()?;
  if first.ty != PngChunkType::IHDR {
    return Err(PngError::FirstChunkNotHeader);
  }
  let header = IHDR::parse(first.data)?;
  log::debug!("png header: {header:?}");

  let mut out = PngContainer {
    header,
    palette: None,
    transparency: None,
    background: None,
    idat: Vec::new(),
  };
  let mut seen_idat = false;
  let mut idat_ended = false;
  let mut seen_once_only = [false; ONCE_ONLY_ANCILLARY.len()];

  loop {
    let chunk = next_chunk()?;
    if seen_idat && chunk.ty != PngChunkType::IDAT {
      idat_ended = true;
    }
    match chunk.ty {
      PngChunkType::IHDR => return Err(PngError::DuplicateHeader),
      PngChunkType::IDAT => {
        if idat_ended {
          return Err(PngError::NonConsecutiveImageData);
        }
        seen_idat = true;
        out.idat.try_reserve(chunk.data.len())?;
        out.idat.extend_from_slice(chunk.data);
      }
      PngChunkType::PLTE => {
        if out.palette.is_some() || seen_idat {
          return Err(PngError::MisplacedPalette);
        }
        if matches!(header.color_type, PngColorType::Y | PngColorType::YA) {
          return Err(PngError::PaletteNotAllowed);
        }
        let len = chunk.data.len();
        if len == 0 || len % 3 != 0 || len / 3 > 256 {
          return Err(PngError::BadPaletteLength);
        }
        out.palette = Some(chunk.data);
      }
      PngChunkType::tRNS => {
        if out.transparency.is_some() || seen_idat {
          return Err(PngError::BadTransparency);
        }
        let len = chunk.data.len();
        let ok = match header.color_type {
          PngColorType::Y => len == 2,
          PngColorType::RGB => len == 6,
          PngColorType::Index => match out.palette {
            Some(palette) => len <= palette.len() / 3,
            None => false,
          },
          PngColorType::YA | PngColorType::RGBA => false,
        };
        if !ok {
          return Err(PngError::BadTransparency);
        }
        out.transparency = Some(chunk.data);
      }
      PngChunkType::bKGD => {
        if out.background.is_some() || seen_idat {
          return Err(PngError::BadBackground);
        }
        let data = chunk.data;
        let ok = match header.color_type {
          PngColorType::Index => match (out.palette, data) {
            (Some(palette), [index]) => usize::from(*index) < palette.len() / 3,
            _ => false,
          },
          PngColorType::Y | PngColorType::YA => data.len() == 2,
          PngColorType::RGB | PngColorType::RGBA => data.len() == 6,
        };
        if !ok {
          return Err(PngError::BadBackground);
        }
        out.background = Some(data);
      }
      PngChunkType::IEND => {
        if !chunk.data.is_empty() {
          return Err(PngError::BadEndChunk);
        }
        break;
      }
      ty if ty.is_critical() => {
        log::debug!("unknown critical chunk {ty:?}");
        return Err(PngError::UnknownCriticalChunk);
      }
      ty => {
        match check_once_only(&mut seen_once_only, ty, chunk.data.len()) {
          OnceOnly::Accepted | OnceOnly::NotTracked => (),
          OnceOnly::Repeated => log::warn!("skipping repeated {ty:?} chunk"),
          OnceOnly::BadLength { expected } => log::warn!(
            "skipping {ty:?} chunk with length {}, expected {expected}",
            chunk.data.len()
          ),
        }
      }
    }
  }

  if !seen_idat {
    return Err(PngError::NoImageData);
  }
  if header.color_type == PngColorType::Index && out.palette.is_none() {
    return Err(PngError::MissingPalette);
  }
  Ok(out)
}

#[test]
fn test_check_once_only() {
  let mut seen = [false; ONCE_ONLY_ANCILLARY.len()];
  assert_eq!(check_once_only(&mut seen, PngChunkType(*b"tEXt"), 5), OnceOnly::NotTracked);
  // a bad length first doesn't use up the one allowed copy
  assert_eq!(
    check_once_only(&mut seen, PngChunkType::gAMA, 2),
    OnceOnly::BadLength { expected: 4 }
  );
  assert_eq!(check_once_only(&mut seen, PngChunkType::gAMA, 4), OnceOnly::Accepted);
  assert_eq!(check_once_only(&mut seen, PngChunkType::gAMA, 4), OnceOnly::Repeated);
  assert_eq!(
    check_once_only(&mut seen, PngChunkType::gAMA, 3),
    OnceOnly::BadLength { expected: 4 }
  );
  // no fixed length
  assert_eq!(check_once_only(&mut seen, PngChunkType::iCCP, 100), OnceOnly::Accepted);
  assert_eq!(check_once_only(&mut seen, PngChunkType::iCCP, 7), OnceOnly::Repeated);
}
