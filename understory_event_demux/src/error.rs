// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use thiserror::Error;

/// Errors returned when subscribing to an [`EventDemux`](crate::EventDemux).
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DemuxError {
    /// The discriminant already routes a different payload type.
    #[error("discriminant {code} carries `{expected}`, not `{found}`")]
    PayloadMismatch {
        /// Discriminant of the established route.
        code: u8,
        /// Payload type of the established route.
        expected: &'static str,
        /// Payload type the subscriber asked for.
        found: &'static str,
    },
}
