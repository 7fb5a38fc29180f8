// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::fmt;
use quilt_codec::{decoder_value, Encoder, EncoderValue};
use subtle::ConstantTimeEq;

//= https://www.rfc-editor.org/rfc/rfc9000#section-10.3.1
//# To entities other than its generator, a stateless reset token is an
//# opaque and randomly generated value.

pub const LEN: usize = 16;

/// A 16 byte stateless reset token.
///
/// Tokens are compared in constant time so an off-path observer cannot
/// learn a stored token by timing failed comparisons.
#[derive(Clone, Copy, Eq, Hash)]
pub struct Token([u8; LEN]);

impl Token {
    pub const ZEROED: Self = Self([0; LEN]);

    #[inline]
    pub fn into_inner(self) -> [u8; LEN] {
        self.0
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; LEN]> for Token {
    #[inline]
    fn from(bytes: [u8; LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Token {
    type Error = core::array::TryFromSliceError;

    #[inline]
    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(slice.try_into()?))
    }
}

impl PartialEq for Token {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl AsRef<[u8]> for Token {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

decoder_value!(
    impl<'a> Token {
        fn decode(buffer: Buffer) -> Result<Self> {
            let (slice, buffer) = buffer.decode_slice(LEN)?;
            let mut bytes = [0; LEN];
            bytes.copy_from_slice(slice.as_less_safe_slice());
            Ok((Self(bytes), buffer))
        }
    }
);

impl EncoderValue for Token {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.write_slice(&self.0);
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        LEN
    }

    #[inline]
    fn encoding_size_for_encoder<E: Encoder>(&self, _encoder: &E) -> usize {
        LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_test() {
        let a = Token::from([1; LEN]);
        let b = Token::from([1; LEN]);
        let c = Token::from([2; LEN]);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
