// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::Tag, varint::VarInt};
use quilt_codec::{decoder_parameterized_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9221#section-4
//# DATAGRAM frames are used to transmit application data in an
//# unreliable manner.  The Type field in the DATAGRAM frame takes the
//# form 0b0011000X (or the values 0x30 and 0x31).

pub(crate) const DATAGRAM_TAG: Tag = 0x30;

//= https://www.rfc-editor.org/rfc/rfc9221#section-4
//# The least significant bit of the Type field in the DATAGRAM frame is
//# the LEN bit (0x01), which indicates whether there is a Length field
//# present

const LEN_BIT: Tag = 0x01;

//= https://www.rfc-editor.org/rfc/rfc9221#section-4
//# DATAGRAM Frame {
//#   Type (i) = 0x30..0x31,
//#   [Length (i)],
//#   Datagram Data (..),
//# }

#[derive(Debug, PartialEq, Eq)]
pub struct Datagram<Data> {
    /// If true, the frame has no Length field and extends to the end of
    /// the packet
    pub is_last_frame: bool,

    /// The bytes of the application message
    pub data: Data,
}

pub type DatagramRef<'a> = Datagram<&'a [u8]>;

impl<Data> Datagram<Data> {
    #[inline]
    pub fn tag(&self) -> Tag {
        if self.is_last_frame {
            DATAGRAM_TAG
        } else {
            DATAGRAM_TAG | LEN_BIT
        }
    }

    /// Converts the datagram data from one type to another
    #[inline]
    pub fn map_data<F: FnOnce(Data) -> Out, Out>(self, map: F) -> Datagram<Out> {
        Datagram {
            is_last_frame: self.is_last_frame,
            data: map(self.data),
        }
    }
}

decoder_parameterized_value!(
    impl<'a, Data> Datagram<Data> {
        fn decode(tag: Tag, buffer: Buffer) -> Result<Self> {
            let is_last_frame = tag & LEN_BIT != LEN_BIT;

            let (data, buffer) = if is_last_frame {
                let len = buffer.len();
                let (data, buffer) = buffer.decode_slice(len)?;
                let (data, remaining) = data.decode()?;
                remaining.ensure_empty()?;
                (data, buffer)
            } else {
                buffer.decode_with_len_prefix::<VarInt, Data>()?
            };

            let frame = Datagram {
                is_last_frame,
                data,
            };

            Ok((frame, buffer))
        }
    }
);

impl<Data: EncoderValue> EncoderValue for Datagram<Data> {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());

        if self.is_last_frame {
            buffer.encode(&self.data);
        } else {
            buffer.encode_with_len_prefix::<VarInt, _>(&self.data);
        }
    }
}
