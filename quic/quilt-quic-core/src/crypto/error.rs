// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::fmt;

/// A packet protection failure.
///
/// The reason is a stable contract used by the framer to pick the
/// connection-level error kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Error {
    pub reason: &'static str,
}

impl Error {
    /// AEAD verification failed with a present key
    pub const DECRYPT_ERROR: Self = Self {
        reason: "decrypt error",
    };

    /// Header protection could not be removed
    pub const HEADER_PROTECTION_FAILURE: Self = Self {
        reason: "header protection failure",
    };

    /// The caller passed inconsistent buffer bounds
    pub const INTERNAL_ERROR: Self = Self {
        reason: "internal error",
    };
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.reason)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
