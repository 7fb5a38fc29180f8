// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

// Both `DecoderBuffer` and `DecoderBufferMut` expose the same reader
// surface; the only difference is the mutability of the backing slice.
// The shared methods are stamped out here so the two stay in sync.
macro_rules! impl_buffer {
    ($name:ident, $result:ident, $value:ident, $value_call:ident, $parameterized:ident, $parameterized_call:ident, $split:ident) => {
        impl<'a> $name<'a> {
            /// Splits off a slice of `count` bytes, returning the slice and
            /// the remaining buffer
            #[inline]
            pub fn decode_slice(self, count: usize) -> $result<'a, $name<'a>> {
                self.ensure_len(count)?;

                let (slice, remaining) = self.bytes.$split(count);

                Ok((Self::new(slice), Self::new(remaining)))
            }

            /// Decodes a value of type `T`, splitting it from the current
            /// buffer.
            ///
            /// Readers are non-destructive on failure: an `Err` leaves the
            /// caller holding the buffer it started with.
            #[inline]
            pub fn decode<T: $value<'a>>(self) -> $result<'a, T> {
                T::$value_call(self)
            }

            /// Decodes a slice prefixed by a length of type `Len`
            #[inline]
            pub fn decode_slice_with_len_prefix<Len: $value<'a> + core::convert::TryInto<usize>>(
                self,
            ) -> $result<'a, Self> {
                let (len, buffer) = self.decode::<Len>()?;
                let len = len
                    .try_into()
                    .map_err(|_| DecoderError::LengthCapacityExceeded)?;
                buffer.decode_slice(len)
            }

            /// Decodes a value of type `T` prefixed by a length of type `Len`.
            /// The value must consume the entire prefixed slice.
            #[inline]
            pub fn decode_with_len_prefix<
                Len: $value<'a> + core::convert::TryInto<usize>,
                T: $value<'a>,
            >(
                self,
            ) -> $result<'a, T> {
                let (slice, buffer) = self.decode_slice_with_len_prefix::<Len>()?;
                let (value, slice) = slice.decode::<T>()?;
                slice.ensure_empty()?;
                Ok((value, buffer))
            }

            /// Decodes a value of type `T` whose decoding depends on `parameter`
            #[inline]
            pub fn decode_parameterized<T: $parameterized<'a>>(
                self,
                parameter: T::Parameter,
            ) -> $result<'a, T> {
                T::$parameterized_call(parameter, self)
            }

            /// Discards `count` bytes
            #[inline]
            pub fn skip(self, count: usize) -> Result<$name<'a>, DecoderError> {
                self.decode_slice(count).map(|(_, buffer)| buffer)
            }

            /// Discards a number of bytes encoded as a length prefix of type `Len`
            #[inline]
            pub fn skip_with_len_prefix<Len: $value<'a> + core::convert::TryInto<usize>>(
                self,
            ) -> Result<$name<'a>, DecoderError> {
                self.decode_slice_with_len_prefix::<Len>()
                    .map(|(_, buffer)| buffer)
            }

            /// Returns a read-only view of the current buffer without
            /// consuming it
            #[inline]
            #[must_use]
            pub fn peek(&'a self) -> crate::DecoderBuffer<'a> {
                crate::DecoderBuffer::new(self.bytes)
            }

            /// Returns the byte at `index` without consuming anything
            #[inline]
            pub fn peek_byte(&self, index: usize) -> Result<u8, DecoderError> {
                self.bytes
                    .get(index)
                    .cloned()
                    .ok_or(DecoderError::UnexpectedEof(index))
            }

            /// Returns a read-only view of the trailing `count` bytes without
            /// consuming anything
            #[inline]
            pub fn peek_suffix(&self, count: usize) -> Result<crate::DecoderBuffer, DecoderError> {
                self.ensure_len(count)?;
                let offset = self.bytes.len() - count;
                Ok(crate::DecoderBuffer::new(&self.bytes[offset..]))
            }

            /// Returns an error if the buffer is not empty
            #[inline]
            pub fn ensure_empty(&self) -> Result<(), DecoderError> {
                if self.is_empty() {
                    Ok(())
                } else {
                    Err(DecoderError::UnexpectedBytes(self.len()))
                }
            }

            /// Returns an error if the buffer holds fewer than `len` bytes
            #[inline]
            pub fn ensure_len(&self, len: usize) -> Result<(), DecoderError> {
                if self.len() < len {
                    Err(DecoderError::UnexpectedEof(len))
                } else {
                    Ok(())
                }
            }

            #[inline]
            pub fn len(&self) -> usize {
                self.bytes.len()
            }

            #[inline]
            pub fn is_empty(&self) -> bool {
                self.bytes.is_empty()
            }

            /// Borrows the buffer's slice. This removes the panic protection
            /// the buffer provides.
            #[inline]
            pub fn as_less_safe_slice(&'a self) -> &'a [u8] {
                self.bytes
            }
        }

        impl<'a> PartialEq<[u8]> for $name<'a> {
            #[inline]
            fn eq(&self, rhs: &[u8]) -> bool {
                let bytes: &[u8] = self.bytes.as_ref();
                bytes.eq(rhs)
            }
        }
    };
}

pub mod buffer;
pub mod buffer_mut;
#[macro_use]
pub mod value;

pub use buffer::*;
pub use buffer_mut::*;
pub use value::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderError {
    UnexpectedEof(usize),
    UnexpectedBytes(usize),
    LengthCapacityExceeded,
    InvariantViolation(&'static str),
}

use core::fmt;

impl fmt::Display for DecoderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnexpectedEof(len) => write!(f, "unexpected eof: {len}"),
            Self::UnexpectedBytes(len) => write!(f, "unexpected bytes: {len}"),
            Self::LengthCapacityExceeded => write!(
                f,
                "length could not be represented in platform's usize type"
            ),
            Self::InvariantViolation(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<DecoderError> for &'static str {
    fn from(error: DecoderError) -> Self {
        match error {
            DecoderError::UnexpectedEof(_) => "unexpected eof",
            DecoderError::UnexpectedBytes(_) => "unexpected bytes",
            DecoderError::LengthCapacityExceeded => {
                "length could not be represented in platform's usize type"
            }
            DecoderError::InvariantViolation(msg) => msg,
        }
    }
}

#[macro_export]
macro_rules! decoder_invariant {
    ($expr:expr, $invariant:expr) => {
        if !($expr) {
            return ::core::result::Result::Err(
                $crate::decoder::DecoderError::InvariantViolation($invariant).into(),
            );
        }
    };
}
