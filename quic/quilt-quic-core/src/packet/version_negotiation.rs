// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connection::ConnectionId,
    packet::{long::decode_connection_id, Tag, Version, FIXED_BIT, LONG_HEADER_TAG},
};
use quilt_codec::{decoder_invariant, DecoderBuffer, DecoderError, Encoder};

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.1
//# Version Negotiation Packet {
//#   Header Form (1) = 1,
//#   Unused (7),
//#   Version (32) = 0,
//#   Destination Connection ID Length (8),
//#   Destination Connection ID (0..2040),
//#   Source Connection ID Length (8),
//#   Source Connection ID (0..2040),
//#   Supported Version (32) ...,
//# }

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.1
//# The Version field of a Version Negotiation packet MUST be set to
//# 0x00000000.

pub const VERSION_NEGOTIATION_VERSION: Version = 0x0000_0000;

/// The label carried by a version probe. No endpoint supports it, so any
/// conforming peer answers with a version negotiation packet.
pub const PROBE_VERSION: Version = 0xcaba_dada;

/// Version probes are padded so they cannot be mistaken for an attempt to
/// amplify traffic toward a spoofed address.
pub const MIN_PROBE_LEN: usize = 1200;

/// A parsed version negotiation packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionNegotiation {
    pub destination_connection_id: ConnectionId,
    pub source_connection_id: ConnectionId,
    versions: VersionList,
}

type VersionList = [Version; MAX_VERSIONS];
const MAX_VERSIONS: usize = 16;

impl VersionNegotiation {
    /// Parses a version negotiation packet; `buffer` must span the whole
    /// datagram. Only the first `MAX_VERSIONS` labels are retained.
    pub fn decode(buffer: DecoderBuffer) -> Result<(Self, usize), DecoderError> {
        let (tag, buffer) = buffer.decode::<Tag>()?;
        decoder_invariant!(
            tag & LONG_HEADER_TAG == LONG_HEADER_TAG,
            "not a long header"
        );

        let (version, buffer) = buffer.decode::<Version>()?;
        decoder_invariant!(version == VERSION_NEGOTIATION_VERSION, "unexpected version");

        let (destination_connection_id, buffer) = decode_connection_id(buffer)?;
        let (source_connection_id, mut buffer) = decode_connection_id(buffer)?;

        decoder_invariant!(!buffer.is_empty(), "empty supported version list");

        let mut versions = [0; MAX_VERSIONS];
        let mut count = 0;
        while !buffer.is_empty() {
            let (version, remaining) = buffer.decode::<Version>()?;
            if count < MAX_VERSIONS {
                versions[count] = version;
            }
            count += 1;
            buffer = remaining;
        }

        Ok((
            Self {
                destination_connection_id,
                source_connection_id,
                versions,
            },
            count.min(MAX_VERSIONS),
        ))
    }

    /// Returns the advertised versions
    pub fn supported_versions(&self) -> impl Iterator<Item = Version> + '_ {
        self.versions
            .iter()
            .copied()
            .filter(|version| *version != 0)
    }
}

/// Writes a version negotiation packet listing `supported_versions`
pub fn encode<E: Encoder>(
    encoder: &mut E,
    destination_connection_id: &ConnectionId,
    source_connection_id: &ConnectionId,
    supported_versions: &[Version],
) {
    encoder.encode(&(LONG_HEADER_TAG | FIXED_BIT));
    encoder.encode(&VERSION_NEGOTIATION_VERSION);
    encoder.encode(&(destination_connection_id.len() as u8));
    encoder.encode(destination_connection_id);
    encoder.encode(&(source_connection_id.len() as u8));
    encoder.encode(source_connection_id);

    for version in supported_versions {
        encoder.encode(version);
    }
}

/// Writes a datagram designed to elicit a version negotiation packet from
/// any conforming endpoint.
///
/// The first bytes are `0xC0 0xCA 0xBA 0xDA 0xDA`: a long header carrying
/// an intentionally unknown version label.
pub fn write_version_probe<E: Encoder>(
    encoder: &mut E,
    destination_connection_id: &ConnectionId,
    source_connection_id: &ConnectionId,
) {
    encoder.encode(&(LONG_HEADER_TAG | FIXED_BIT));
    encoder.encode(&PROBE_VERSION);
    encoder.encode(&(destination_connection_id.len() as u8));
    encoder.encode(destination_connection_id);
    encoder.encode(&(source_connection_id.len() as u8));
    encoder.encode(source_connection_id);

    let greeting: &[u8] = b"quilt version probe; please respond with version negotiation";
    encoder.write_slice(greeting);

    let padding = MIN_PROBE_LEN.saturating_sub(encoder.len());
    encoder.write_repeated(padding, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{QUIC_VERSION_1, QUIC_VERSION_2};
    use quilt_codec::EncoderBuffer;

    fn cid(bytes: &[u8]) -> ConnectionId {
        ConnectionId::try_from_slice(bytes).unwrap()
    }

    #[test]
    fn round_trip_test() {
        let mut buffer = [0u8; 64];
        let mut encoder = EncoderBuffer::new(&mut buffer);
        encode(
            &mut encoder,
            &cid(&[1, 2]),
            &cid(&[3, 4]),
            &[QUIC_VERSION_1, QUIC_VERSION_2],
        );
        let written = encoder.len();

        let decoder = DecoderBuffer::new(&buffer[..written]);
        let (packet, count) = VersionNegotiation::decode(decoder).unwrap();

        assert_eq!(count, 2);
        assert_eq!(packet.destination_connection_id, cid(&[1, 2]));
        assert_eq!(packet.source_connection_id, cid(&[3, 4]));
        assert_eq!(
            packet.supported_versions().collect::<Vec<_>>(),
            vec![QUIC_VERSION_1, QUIC_VERSION_2]
        );
    }

    #[test]
    fn version_probe_test() {
        let mut buffer = [0u8; 2048];
        let mut encoder = EncoderBuffer::new(&mut buffer);
        write_version_probe(&mut encoder, &cid(&[1]), &cid(&[2]));
        let written = encoder.len();

        assert!(written >= MIN_PROBE_LEN);
        assert_eq!(&buffer[..5], &[0xc0, 0xca, 0xba, 0xda, 0xda]);
    }
}
