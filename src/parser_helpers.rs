#![forbid(unsafe_code)]

//! Just has shorthands for various byte parsing things you'd want to do.

use bytemuck::{checked::pod_read_unaligned, Pod};
use core::mem::size_of;

use crate::{PngError, PngResult};

#[inline]
pub(crate) fn try_pull_byte_array<const N: usize>(bytes: &[u8]) -> PngResult<([u8; N], &[u8])> {
  if bytes.len() >= N {
    let (head, tail) = bytes.split_at(N);
    let mut a = [0_u8; N];
    a.copy_from_slice(head);
    Ok((a, tail))
  } else {
    Err(PngError::UnexpectedEndOfInput)
  }
}

#[inline]
pub(crate) fn try_pull_pod<T: Pod>(bytes: &[u8]) -> PngResult<(T, &[u8])> {
  let position = size_of::<T>();
  if bytes.len() >= position {
    let (head, tail) = bytes.split_at(position);
    let a: T = pod_read_unaligned(head);
    Ok((a, tail))
  } else {
    Err(PngError::UnexpectedEndOfInput)
  }
}

#[inline]
pub(crate) fn try_pull_slice(bytes: &[u8], len: usize) -> PngResult<(&[u8], &[u8])> {
  if bytes.len() >= len {
    Ok(bytes.split_at(len))
  } else {
    Err(PngError::UnexpectedEndOfInput)
  }
}

#[inline]
#[must_use]
pub(crate) fn u16_be(bytes: [u8; 2]) -> u16 {
  u16::from_be_bytes(bytes)
}

#[inline]
#[must_use]
pub(crate) fn u32_be(bytes: [u8; 4]) -> u32 {
  u32::from_be_bytes(bytes)
}

#[test]
fn test_pull_helpers() {
  let bytes = [1_u8, 2, 3, 4, 5];
  let (a, rest) = try_pull_byte_array::<4>(&bytes).unwrap();
  assert_eq!(u32_be(a), 0x0102_0304);
  assert_eq!(rest, &[5]);
  assert_eq!(try_pull_byte_array::<2>(rest), Err(PngError::UnexpectedEndOfInput));
  let (x, rest) = try_pull_pod::<[u8; 2]>(&bytes).unwrap();
  assert_eq!(u16_be(x), 0x0102);
  let (s, rest) = try_pull_slice(rest, 3).unwrap();
  assert_eq!(s, &[3, 4, 5]);
  assert!(rest.is_empty());
  assert!(try_pull_slice(rest, 1).is_err());
}
