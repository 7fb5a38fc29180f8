// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    encoder::{Encoder, EncoderLenEstimator},
    DecoderBuffer, DecoderBufferMut,
};
use byteorder::{ByteOrder, NetworkEndian};
use core::{convert::TryFrom, mem::size_of};

pub trait EncoderValue: Sized {
    /// Encodes the value into the encoder
    fn encode<E: Encoder>(&self, encoder: &mut E);

    /// Returns the encoding size with no buffer constraints
    #[inline]
    fn encoding_size(&self) -> usize {
        self.encoding_size_for_encoder(&EncoderLenEstimator::new(usize::MAX))
    }

    /// Returns the encoding size for the given encoder's capacity
    #[inline]
    fn encoding_size_for_encoder<E: Encoder>(&self, encoder: &E) -> usize {
        let mut estimator = EncoderLenEstimator::new(encoder.remaining_capacity());
        self.encode(&mut estimator);
        estimator.len()
    }

    /// Encodes the value into the encoder with a prefix of `Len`
    #[inline]
    fn encode_with_len_prefix<Len: TryFrom<usize> + EncoderValue, E: Encoder>(
        &self,
        encoder: &mut E,
    ) where
        Len::Error: core::fmt::Debug,
    {
        let len = self.encoding_size_for_encoder(encoder);
        let len: Len = Len::try_from(len).expect("invalid conversion");
        len.encode(encoder);
        self.encode(encoder);
    }

    #[cfg(feature = "alloc")]
    fn encode_to_vec(&self) -> alloc::vec::Vec<u8> {
        let len = self.encoding_size();
        let mut buffer = alloc::vec![0u8; len];
        self.encode(&mut crate::EncoderBuffer::new(&mut buffer));
        buffer
    }
}

macro_rules! encoder_value_byte {
    ($ty:ident) => {
        impl EncoderValue for $ty {
            #[inline]
            fn encode<E: Encoder>(&self, encoder: &mut E) {
                encoder.write_sized(size_of::<Self>(), |buf| {
                    buf[0] = *self as u8;
                })
            }

            #[inline]
            fn encoding_size(&self) -> usize {
                size_of::<Self>()
            }

            #[inline]
            fn encoding_size_for_encoder<E: Encoder>(&self, _encoder: &E) -> usize {
                size_of::<Self>()
            }
        }
    };
}

encoder_value_byte!(u8);
encoder_value_byte!(i8);

macro_rules! encoder_value_network_endian {
    ($call:ident, $ty:ty) => {
        impl EncoderValue for $ty {
            #[inline]
            fn encode<E: Encoder>(&self, encoder: &mut E) {
                encoder.write_sized(size_of::<Self>(), |buf| {
                    NetworkEndian::$call(buf, *self);
                })
            }

            #[inline]
            fn encoding_size(&self) -> usize {
                size_of::<Self>()
            }

            #[inline]
            fn encoding_size_for_encoder<E: Encoder>(&self, _encoder: &E) -> usize {
                size_of::<Self>()
            }
        }
    };
}

encoder_value_network_endian!(write_u16, u16);
encoder_value_network_endian!(write_u32, u32);
encoder_value_network_endian!(write_u64, u64);

macro_rules! encoder_value_slice {
    ($ty:ty, |$self:ident| $value:expr) => {
        impl EncoderValue for $ty {
            #[inline]
            fn encode<E: Encoder>(&$self, encoder: &mut E) {
                encoder.write_slice($value)
            }

            #[inline]
            fn encoding_size(&self) -> usize {
                self.len()
            }

            #[inline]
            fn encoding_size_for_encoder<E: Encoder>(&self, _encoder: &E) -> usize {
                self.len()
            }
        }
    };
}

encoder_value_slice!(&[u8], |self| self);
encoder_value_slice!(&mut [u8], |self| self);
encoder_value_slice!(DecoderBuffer<'_>, |self| self.as_less_safe_slice());
encoder_value_slice!(DecoderBufferMut<'_>, |self| self.as_less_safe_slice());

#[cfg(feature = "bytes")]
encoder_value_slice!(bytes::Bytes, |self| self.as_ref());

impl EncoderValue for () {
    #[inline]
    fn encode<E: Encoder>(&self, _encoder: &mut E) {}

    #[inline]
    fn encoding_size(&self) -> usize {
        0
    }

    #[inline]
    fn encoding_size_for_encoder<E: Encoder>(&self, _encoder: &E) -> usize {
        0
    }
}

impl<T: EncoderValue> EncoderValue for Option<T> {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        if let Some(value) = self.as_ref() {
            value.encode(encoder)
        }
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        self.as_ref().map_or(0, |value| value.encoding_size())
    }

    #[inline]
    fn encoding_size_for_encoder<E: Encoder>(&self, encoder: &E) -> usize {
        self.as_ref()
            .map_or(0, |value| value.encoding_size_for_encoder(encoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EncoderBuffer;

    #[test]
    fn round_trip_test() {
        let mut data = [0u8; 16];
        let mut encoder = EncoderBuffer::new(&mut data);

        encoder.encode(&0x01u8);
        encoder.encode(&0x0203u16);
        encoder.encode(&0x0405_0607u32);
        let payload: &[u8] = &[0xaa, 0xbb];
        encoder.encode_with_len_prefix::<u8, _>(&payload);

        let written = encoder.len();
        let buffer = DecoderBuffer::new(&data[..written]);
        let (a, buffer) = buffer.decode::<u8>().unwrap();
        let (b, buffer) = buffer.decode::<u16>().unwrap();
        let (c, buffer) = buffer.decode::<u32>().unwrap();
        let (d, buffer) = buffer.decode_slice_with_len_prefix::<u8>().unwrap();

        assert_eq!(a, 0x01);
        assert_eq!(b, 0x0203);
        assert_eq!(c, 0x0405_0607);
        assert_eq!(d, [0xaau8, 0xbb][..]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn encoding_size_test() {
        assert_eq!(1u8.encoding_size(), 1);
        assert_eq!(1u16.encoding_size(), 2);
        assert_eq!(1u32.encoding_size(), 4);
        assert_eq!(1u64.encoding_size(), 8);
        assert_eq!([1u8, 2, 3][..].as_ref().encoding_size(), 3);
        assert_eq!(Some(1u16).encoding_size(), 2);
        assert_eq!(Option::<u16>::None.encoding_size(), 0);
    }
}
