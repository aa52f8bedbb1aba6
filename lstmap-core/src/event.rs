//! Decoded list-mode events.

use crate::DetectorId;

/// Upper bound on simultaneously active trigger lines in one event word.
pub const MAX_ACTIVE_TRIGGERS: usize = 16;

/// One detector reading inside an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelHit {
    pub detector: DetectorId,
    pub channel: u16,
}

/// A positioned event: scan pixel plus the detector channels it carried.
///
/// Hits are stored inline so decoding never allocates per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub x: u16,
    pub y: u16,
    hits: [ChannelHit; MAX_ACTIVE_TRIGGERS],
    len: u8,
}

impl Event {
    /// Creates an event at `(x, y)` with no channel readings.
    #[inline]
    #[must_use]
    pub fn new(x: u16, y: u16) -> Self {
        Self {
            x,
            y,
            hits: [ChannelHit::default(); MAX_ACTIVE_TRIGGERS],
            len: 0,
        }
    }

    /// Records a channel reading.
    ///
    /// Readings past [`MAX_ACTIVE_TRIGGERS`] are ignored; one event word
    /// cannot carry more.
    #[inline]
    pub fn push(&mut self, detector: DetectorId, channel: u16) {
        if let Some(slot) = self.hits.get_mut(self.len as usize) {
            *slot = ChannelHit { detector, channel };
            self.len += 1;
        }
    }

    /// Channel readings in stream order.
    #[inline]
    #[must_use]
    pub fn hits(&self) -> &[ChannelHit] {
        &self.hits[..self.len as usize]
    }

    /// Channel recorded for `detector`, if any.
    #[must_use]
    pub fn channel(&self, detector: DetectorId) -> Option<u16> {
        self.hits()
            .iter()
            .find(|hit| hit.detector == detector)
            .map(|hit| hit.channel)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
