//! # Little-Endian Byte Codecs
//!
//! Bounds-checked integer and scaled-float conversions between MSP payload
//! bytes and native values. Message schemas go through these helpers rather
//! than indexing payloads directly.

use bytes::BufMut;
use std::ops::Mul;

use crate::error::{MspError, Result};

/// Fixed-width integer with a little-endian wire representation
pub trait LeInt: Copy + Sized {
    /// Width on the wire, in bytes
    const SIZE: usize;

    /// Builds the value from exactly `SIZE` bytes
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Appends the `SIZE` little-endian bytes of the value
    fn put_le<B: BufMut>(self, out: &mut B);

    /// Lossy conversion used by the float decoders
    fn to_f64(self) -> f64;
}

macro_rules! impl_le_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl LeInt for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }

                fn put_le<B: BufMut>(self, out: &mut B) {
                    out.put_slice(&self.to_le_bytes());
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_le_int!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Floating-point target of [`decode_float`]
pub trait LeFloat: Copy + Mul<Output = Self> {
    fn from_int<I: LeInt>(value: I) -> Self;
}

impl LeFloat for f32 {
    fn from_int<I: LeInt>(value: I) -> Self {
        value.to_f64() as f32
    }
}

impl LeFloat for f64 {
    fn from_int<I: LeInt>(value: I) -> Self {
        value.to_f64()
    }
}

/// Decode a little-endian integer starting at `offset`
///
/// # Errors
///
/// Returns [`MspError::ShortBuffer`] if fewer than `size_of::<T>()` bytes
/// remain after `offset`.
///
/// # Examples
///
/// ```
/// use msp_fci::msp::codec::decode_int;
///
/// let value: i16 = decode_int(&[0x00, 0x18, 0xFC], 1).unwrap();
/// assert_eq!(value, -1000);
/// ```
pub fn decode_int<T: LeInt>(buf: &[u8], offset: usize) -> Result<T> {
    let remaining = buf.len().saturating_sub(offset);
    if remaining < T::SIZE {
        return Err(MspError::ShortBuffer {
            needed: T::SIZE,
            offset,
            len: buf.len(),
        });
    }

    Ok(T::from_le_slice(&buf[offset..offset + T::SIZE]))
}

/// Decode an integer of type `I` at `offset`, cast it to `F` and apply `scale`
///
/// # Errors
///
/// Same as [`decode_int`].
pub fn decode_float<I: LeInt, F: LeFloat>(buf: &[u8], offset: usize, scale: F) -> Result<F> {
    let raw: I = decode_int(buf, offset)?;
    Ok(F::from_int(raw) * scale)
}

/// Append `value` to `out` in little-endian order
pub fn encode_int<T: LeInt, B: BufMut>(value: T, out: &mut B) {
    value.put_le(out);
}
