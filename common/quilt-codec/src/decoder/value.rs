// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::decoder::{
    buffer::{DecoderBuffer, DecoderBufferResult},
    buffer_mut::{DecoderBufferMut, DecoderBufferMutResult},
};
use byteorder::{ByteOrder, NetworkEndian};
use core::mem::size_of;

pub trait DecoderValue<'a>: Sized {
    fn decode(bytes: DecoderBuffer<'a>) -> DecoderBufferResult<'a, Self>;
}

pub trait DecoderValueMut<'a>: Sized {
    fn decode_mut(bytes: DecoderBufferMut<'a>) -> DecoderBufferMutResult<'a, Self>;
}

#[macro_export]
macro_rules! decoder_value {
    (impl<$lt:lifetime $(, $generic:ident)*> $ty:ty {
        fn decode($buffer:ident: Buffer) -> Result<$ret:ty> $impl:block
    }) => {
        impl<$lt $(, $generic: $crate::DecoderValue<$lt>)*> $crate::DecoderValue<$lt> for $ty {
            #[inline]
            fn decode($buffer: $crate::DecoderBuffer<$lt>) -> $crate::DecoderBufferResult<$lt, $ret> $impl
        }

        impl<$lt $(, $generic: $crate::DecoderValueMut<$lt>)*> $crate::DecoderValueMut<$lt> for $ty {
            #[inline]
            fn decode_mut($buffer: $crate::DecoderBufferMut<$lt>) -> $crate::DecoderBufferMutResult<$lt, $ret> $impl
        }
    };
}

macro_rules! decoder_value_byte {
    ($ty:ident) => {
        decoder_value!(
            impl<'a> $ty {
                fn decode(buffer: Buffer) -> Result<Self> {
                    let (value, buffer) = buffer.decode_slice(size_of::<Self>())?;
                    let value = value.as_less_safe_slice()[0] as $ty;
                    Ok((value, buffer))
                }
            }
        );
    };
}

decoder_value_byte!(u8);
decoder_value_byte!(i8);

macro_rules! decoder_value_network_endian {
    ($call:ident, $ty:ty) => {
        decoder_value!(
            impl<'a> $ty {
                fn decode(buffer: Buffer) -> Result<Self> {
                    let (value, buffer) = buffer.decode_slice(size_of::<Self>())?;
                    let value = NetworkEndian::$call(value.as_less_safe_slice());
                    Ok((value, buffer))
                }
            }
        );
    };
}

decoder_value_network_endian!(read_u16, u16);
decoder_value_network_endian!(read_u32, u32);
decoder_value_network_endian!(read_u64, u64);

decoder_value!(
    impl<'a> DecoderBuffer<'a> {
        fn decode(buffer: Buffer) -> Result<Self> {
            let len = buffer.len();
            let (slice, buffer) = buffer.decode_slice(len)?;
            #[allow(clippy::useless_conversion)]
            let slice = slice.into();
            Ok((slice, buffer))
        }
    }
);

impl<'a> DecoderValueMut<'a> for DecoderBufferMut<'a> {
    #[inline]
    fn decode_mut(buffer: DecoderBufferMut<'a>) -> DecoderBufferMutResult<'a, Self> {
        let len = buffer.len();
        buffer.decode_slice(len)
    }
}

impl<'a> DecoderValue<'a> for &'a [u8] {
    #[inline]
    fn decode(buffer: DecoderBuffer<'a>) -> DecoderBufferResult<'a, Self> {
        let len = buffer.len();
        let (slice, buffer) = buffer.decode_slice(len)?;
        Ok((slice.into_less_safe_slice(), buffer))
    }
}

impl<'a> DecoderValueMut<'a> for &'a [u8] {
    #[inline]
    fn decode_mut(buffer: DecoderBufferMut<'a>) -> DecoderBufferMutResult<'a, Self> {
        let len = buffer.len();
        let (slice, buffer) = buffer.decode_slice(len)?;
        Ok((&*slice.into_less_safe_slice(), buffer))
    }
}

/// A value whose decoding implementation is altered by a provided parameter
pub trait DecoderParameterizedValue<'a>: Sized {
    type Parameter;

    fn decode_parameterized(
        parameter: Self::Parameter,
        bytes: DecoderBuffer<'a>,
    ) -> DecoderBufferResult<'a, Self>;
}

/// A mutable value whose decoding implementation is altered by a provided
/// parameter
pub trait DecoderParameterizedValueMut<'a>: Sized {
    type Parameter;

    fn decode_parameterized_mut(
        parameter: Self::Parameter,
        bytes: DecoderBufferMut<'a>,
    ) -> DecoderBufferMutResult<'a, Self>;
}

#[macro_export]
macro_rules! decoder_parameterized_value {
    (impl<$lt:lifetime $(, $generic:ident)*> $ty:ty {
        fn decode($tag:ident: $tag_ty:ty, $buffer:ident: Buffer) -> Result<$ret:ty> $impl:block
    }) => {
        impl<$lt $(, $generic: $crate::DecoderValue<$lt>)*> $crate::DecoderParameterizedValue<$lt> for $ty {
            type Parameter = $tag_ty;

            #[inline]
            fn decode_parameterized($tag: Self::Parameter, $buffer: $crate::DecoderBuffer<$lt>) -> $crate::DecoderBufferResult<$lt, $ret> $impl
        }

        impl<$lt $(, $generic: $crate::DecoderValueMut<$lt>)*> $crate::DecoderParameterizedValueMut<$lt> for $ty {
            type Parameter = $tag_ty;

            #[inline]
            fn decode_parameterized_mut($tag: Self::Parameter, $buffer: $crate::DecoderBufferMut<$lt>) -> $crate::DecoderBufferMutResult<$lt, $ret> $impl
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_decoding_test() {
        let data = [0, 1, 2, 3, 4, 5, 6];
        let buffer = DecoderBuffer::new(&data);

        let (value, buffer) = buffer.decode::<u8>().unwrap();
        assert_eq!(value, 0);

        let (value, buffer) = buffer.decode::<u16>().unwrap();
        assert_eq!(value, 258);

        let (value, buffer) = buffer.decode::<u32>().unwrap();
        assert_eq!(value, 50_595_078);

        assert!(buffer.is_empty());
        assert!(buffer.decode::<u8>().is_err());
    }

    #[test]
    fn len_prefix_test() {
        let data = [5, 0, 1, 2, 3, 4];
        let buffer = DecoderBuffer::new(&data);
        let (slice, buffer) = buffer.decode_slice_with_len_prefix::<u8>().unwrap();
        assert_eq!(slice, [0u8, 1, 2, 3, 4][..]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn non_destructive_failure_test() {
        let data = [1, 2];
        let buffer = DecoderBuffer::new(&data);

        // a failed read does not consume anything
        assert!(buffer.peek().decode::<u32>().is_err());
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.peek_byte(0).unwrap(), 1);
    }

    #[test]
    fn peek_suffix_test() {
        let data = [1, 2, 3, 4];
        let buffer = DecoderBuffer::new(&data);
        let suffix = buffer.peek_suffix(2).unwrap();
        assert_eq!(suffix, [3u8, 4][..]);
        assert!(buffer.peek_suffix(5).is_err());
        // the buffer is unchanged
        assert_eq!(buffer.len(), 4);
    }
}
