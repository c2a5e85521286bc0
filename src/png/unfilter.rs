use crate::{PngError, PngResult};

/// The Paeth predictor: whichever of `a`, `b`, or `c` is closest to
/// `a + b - c`.
#[inline]
#[must_use]
pub(crate) const fn paeth_predict(a: u8, b: u8, c: u8) -> u8 {
  let a_ = a as i32;
  let b_ = b as i32;
  let c_ = c as i32;
  let p: i32 = a_ + b_ - c_;
  let pa = (p - a_).abs();
  let pb = (p - b_).abs();
  let pc = (p - c_).abs();
  // The order of these tests must not change, ties go to `a` then `b`.
  if pa <= pb && pa <= pc {
    a
  } else if pb <= pc {
    b
  } else {
    c
  }
}

/// Reverses the filter on one scanline.
///
/// * `recon` gets the reconstructed bytes, it must be the same length as
///   `scanline`.
/// * `scanline` is the filtered bytes, without the filter type byte.
/// * `prev` is the *reconstructed* previous scanline, or `None` on the first
///   line of an image (or of an interlace pass), which acts like a line of
///   zeroes.
/// * `byte_width` is the distance back to the corresponding byte of the
///   previous pixel (see [`IHDR::filter_byte_width`](super::IHDR::filter_byte_width)).
///
/// ## Failure
/// * `filter_type` is above 4.
///
/// ## Panics
/// * If `recon`, `scanline`, and `prev` aren't all the same length.
pub fn unfilter_scanline(
  recon: &mut [u8], scanline: &[u8], prev: Option<&[u8]>, byte_width: usize, filter_type: u8,
) -> PngResult<()> {
  assert_eq!(recon.len(), scanline.len());
  if let Some(prev) = prev {
    assert_eq!(prev.len(), scanline.len());
  }
  let len = scanline.len();
  let bw = byte_width.min(len);
  match (filter_type, prev) {
    // None, and Up on the first line
    (0, _) | (2, None) => recon.copy_from_slice(scanline),
    // Sub
    (1, _) => {
      recon[..bw].copy_from_slice(&scanline[..bw]);
      for i in bw..len {
        recon[i] = scanline[i].wrapping_add(recon[i - bw]);
      }
    }
    // Up
    (2, Some(prev)) => {
      for ((r, s), b) in recon.iter_mut().zip(scanline).zip(prev) {
        *r = s.wrapping_add(*b);
      }
    }
    // Average, the `b` is always 0 on the first line
    (3, None) => {
      recon[..bw].copy_from_slice(&scanline[..bw]);
      for i in bw..len {
        recon[i] = scanline[i].wrapping_add(recon[i - bw] / 2);
      }
    }
    (3, Some(prev)) => {
      for i in 0..bw {
        recon[i] = scanline[i].wrapping_add(prev[i] / 2);
      }
      for i in bw..len {
        let avg = (u16::from(recon[i - bw]) + u16::from(prev[i])) / 2;
        recon[i] = scanline[i].wrapping_add(avg as u8);
      }
    }
    // Paeth, the `b` and `c` are always 0 on the first line, which makes the
    // predictor always pick `a`
    (4, None) => {
      recon[..bw].copy_from_slice(&scanline[..bw]);
      for i in bw..len {
        recon[i] = scanline[i].wrapping_add(recon[i - bw]);
      }
    }
    (4, Some(prev)) => {
      for i in 0..bw {
        recon[i] = scanline[i].wrapping_add(prev[i]);
      }
      for i in bw..len {
        recon[i] = scanline[i].wrapping_add(paeth_predict(recon[i - bw], prev[i], prev[i - bw]));
      }
    }
    _ => return Err(PngError::IllegalFilterType),
  }
  Ok(())
}

/// Unfilters `rows` lines of filtered data into `out`.
///
/// Each filtered line is a filter type byte followed by `stride` bytes, and
/// each output line is exactly `stride` bytes.
pub(crate) fn unfilter_image(
  out: &mut [u8], filtered: &[u8], stride: usize, rows: usize, byte_width: usize,
) -> PngResult<()> {
  let filtered_stride = stride + 1;
  if out.len() < stride * rows || filtered.len() < filtered_stride * rows {
    return Err(PngError::NotEnoughImageData);
  }
  for (y, line) in filtered.chunks_exact(filtered_stride).take(rows).enumerate() {
    let (done, current) = out.split_at_mut(y * stride);
    let prev = if y == 0 { None } else { Some(&done[(y - 1) * stride..]) };
    unfilter_scanline(&mut current[..stride], &line[1..], prev, byte_width, line[0])?;
  }
  Ok(())
}

/// Applies a filter to a scanline, the inverse of [`unfilter_scanline`].
#[cfg(test)]
pub(crate) fn filter_scanline(
  out: &mut [u8], raw: &[u8], prev: Option<&[u8]>, byte_width: usize, filter_type: u8,
) {
  for i in 0..raw.len() {
    let a = if i >= byte_width { raw[i - byte_width] } else { 0 };
    let b = prev.map(|p| p[i]).unwrap_or(0);
    let c = if i >= byte_width { prev.map(|p| p[i - byte_width]).unwrap_or(0) } else { 0 };
    let predicted = match filter_type {
      0 => 0,
      1 => a,
      2 => b,
      3 => ((u16::from(a) + u16::from(b)) / 2) as u8,
      4 => paeth_predict(a, b, c),
      _ => unreachable!(),
    };
    out[i] = raw[i].wrapping_sub(predicted);
  }
}

#[test]
fn test_paeth_predict() {
  // ties prefer `a`, then `b`
  assert_eq!(paeth_predict(0, 0, 0), 0);
  assert_eq!(paeth_predict(10, 10, 10), 10);
  assert_eq!(paeth_predict(10, 20, 10), 20);
  assert_eq!(paeth_predict(20, 10, 10), 20);
  assert_eq!(paeth_predict(10, 20, 20), 10);
  assert_eq!(paeth_predict(1, 2, 255), 1);
  assert_eq!(paeth_predict(100, 50, 60), 100);
  assert_eq!(paeth_predict(50, 60, 55), 55);
  // large values never wrap
  assert_eq!(paeth_predict(255, 255, 0), 255);
}

#[test]
fn test_unfilter_known_values() {
  let prev = [10_u8, 20, 30, 40];
  let scan = [1_u8, 2, 3, 4];
  let mut recon = [0_u8; 4];

  unfilter_scanline(&mut recon, &scan, Some(&prev), 1, 0).unwrap();
  assert_eq!(recon, [1, 2, 3, 4]);
  unfilter_scanline(&mut recon, &scan, Some(&prev), 1, 1).unwrap();
  assert_eq!(recon, [1, 3, 6, 10]);
  unfilter_scanline(&mut recon, &scan, Some(&prev), 2, 1).unwrap();
  assert_eq!(recon, [1, 2, 4, 6]);
  unfilter_scanline(&mut recon, &scan, Some(&prev), 1, 2).unwrap();
  assert_eq!(recon, [11, 22, 33, 44]);
  unfilter_scanline(&mut recon, &scan, None, 1, 2).unwrap();
  assert_eq!(recon, [1, 2, 3, 4]);
  // 1+5, 2+(6+20)/2, 3+(15+30)/2, 4+(25+40)/2
  unfilter_scanline(&mut recon, &scan, Some(&prev), 1, 3).unwrap();
  assert_eq!(recon, [6, 15, 25, 36]);
  assert_eq!(unfilter_scanline(&mut recon, &scan, None, 1, 5), Err(PngError::IllegalFilterType));
}

#[test]
fn test_unfilter_inverts_filter() {
  let mut seed = 0x1234_5678_u32;
  let mut next = move || {
    seed ^= seed << 13;
    seed ^= seed >> 17;
    seed ^= seed << 5;
    seed as u8
  };
  for byte_width in [1_usize, 2, 3, 4, 6, 8] {
    let len = byte_width * 7;
    let prev: alloc::vec::Vec<u8> = (0..len).map(|_| next()).collect();
    let raw: alloc::vec::Vec<u8> = (0..len).map(|_| next()).collect();
    for filter_type in 0..=4 {
      for p in [None, Some(prev.as_slice())] {
        let mut filtered = alloc::vec![0_u8; len];
        filter_scanline(&mut filtered, &raw, p, byte_width, filter_type);
        let mut recon = alloc::vec![0_u8; len];
        unfilter_scanline(&mut recon, &filtered, p, byte_width, filter_type).unwrap();
        assert_eq!(recon, raw, "bw {byte_width}, ft {filter_type}, prev {}", p.is_some());
      }
    }
  }
}

#[test]
fn test_unfilter_image_rows() {
  // 2 rows of 3 bytes: the second row is "Up" from the first
  let filtered = [1_u8, 5, 1, 1, 2, 1, 1, 1];
  let mut out = [0_u8; 6];
  unfilter_image(&mut out, &filtered, 3, 2, 1).unwrap();
  assert_eq!(out, [5, 6, 7, 6, 7, 8]);
  assert_eq!(unfilter_image(&mut out, &filtered[..7], 3, 2, 1), Err(PngError::NotEnoughImageData));
}
