// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Demux configuration.

/// Configuration for an [`EventDemux`](crate::EventDemux).
///
/// ```
/// use understory_event_demux::DemuxConfig;
///
/// // Fold "sent by another client" codes onto the plain ones.
/// let config = DemuxConfig::new().discriminant_mask(0x7F);
/// assert_eq!(config.apply(0x82), 0x02);
/// assert_eq!(DemuxConfig::default().apply(0x82), 0x82);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DemuxConfig {
    /// Mask applied to [`RawEvent::discriminant`](crate::RawEvent::discriminant)
    /// by [`EventDemux::emit`](crate::EventDemux::emit). Defaults to `0xFF`.
    pub mask: u8,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self { mask: 0xFF }
    }
}

impl DemuxConfig {
    /// Create the default configuration (no masking).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the discriminant mask.
    pub fn discriminant_mask(mut self, mask: u8) -> Self {
        self.mask = mask;
        self
    }

    /// Apply the mask to a raw discriminant.
    pub fn apply(&self, code: u8) -> u8 {
        code & self.mask
    }
}
