//! List-mode event word decoder.
//!
//! The binary section is a sequence of little-endian 32-bit words. An event
//! word carries `0x8000` in its high half and a trigger bitmask in its low
//! half; it is followed by one signed 16-bit value per active trigger, in
//! ascending bit order, preceded by 2 padding bytes when the number of
//! active triggers is odd.
//!
//! Values are checked per field: out-of-range coordinates, unknown triggers
//! and out-of-range channels are dropped individually, and an event only
//! reaches the histograms once both scan coordinates were captured.

use lstmap_core::{DetectorTable, Event, MapGeometry};
use serde::Serialize;
use std::io::{self, Read};

/// Undocumented instrument marker; the 4 bytes after it are skipped.
pub const MARKER_WORD: u32 = 0xFFFF_FFFF;

/// High half of an event word.
pub const EVENT_TAG: u32 = 0x8000;

/// Byte source for the decoder.
///
/// Every method returns `None`/`false` once the source cannot supply the
/// requested bytes, which ends the event stream.
pub trait WordSource {
    /// Reads a little-endian unsigned 32-bit word.
    fn next_u32(&mut self) -> Option<u32>;

    /// Reads a little-endian signed 16-bit value.
    fn next_i16(&mut self) -> Option<i16>;

    /// Skips `bytes` bytes.
    fn skip(&mut self, bytes: usize) -> bool;
}

/// Word source over an in-memory (or memory-mapped) binary section.
#[derive(Debug, Clone)]
pub struct SliceWords<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> SliceWords<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Number of bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.position.checked_add(N)?;
        let bytes = self.data.get(self.position..end)?;
        self.position = end;
        bytes.try_into().ok()
    }
}

impl WordSource for SliceWords<'_> {
    #[inline]
    fn next_u32(&mut self) -> Option<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    #[inline]
    fn next_i16(&mut self) -> Option<i16> {
        self.take::<2>().map(i16::from_le_bytes)
    }

    #[inline]
    fn skip(&mut self, bytes: usize) -> bool {
        match self.position.checked_add(bytes) {
            Some(end) if end <= self.data.len() => {
                self.position = end;
                true
            }
            _ => {
                self.position = self.data.len();
                false
            }
        }
    }
}

/// Word source reading incrementally from any [`Read`] implementation.
///
/// I/O failures end the stream like a short read; the error is kept so the
/// caller can report it.
pub struct ReaderWords<R> {
    reader: R,
    consumed: u64,
    error: Option<io::Error>,
}

impl<R: Read> ReaderWords<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            consumed: 0,
            error: None,
        }
    }

    /// Number of bytes consumed so far.
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Takes the I/O error that ended the stream, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let mut buffer = [0u8; N];
        match self.reader.read_exact(&mut buffer) {
            Ok(()) => {
                self.consumed += N as u64;
                Some(buffer)
            }
            Err(err) => {
                if err.kind() != io::ErrorKind::UnexpectedEof {
                    self.error = Some(err);
                }
                None
            }
        }
    }
}

impl<R: Read> WordSource for ReaderWords<R> {
    fn next_u32(&mut self) -> Option<u32> {
        self.read_array::<4>().map(u32::from_le_bytes)
    }

    fn next_i16(&mut self) -> Option<i16> {
        self.read_array::<2>().map(i16::from_le_bytes)
    }

    fn skip(&mut self, bytes: usize) -> bool {
        let wanted = bytes as u64;
        match io::copy(&mut (&mut self.reader).take(wanted), &mut io::sink()) {
            Ok(skipped) => {
                self.consumed += skipped;
                skipped == wanted
            }
            Err(err) => {
                self.error = Some(err);
                false
            }
        }
    }
}

/// Counters describing what the decoder saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    /// 32-bit words read, including markers and event words.
    pub words: u64,
    /// `0xFFFFFFFF` marker words skipped.
    pub markers: u64,
    /// Words that were neither markers nor event words.
    pub ignored_words: u64,
    /// Event words (`0x8000` tag).
    pub event_words: u64,
    /// Events that captured both scan coordinates.
    pub positioned: u64,
    /// Events dropped for lack of a scan position.
    pub unpositioned: u64,
    /// Individual values dropped by bound checks or unknown triggers.
    pub dropped_fields: u64,
    /// Whether the stream ended in the middle of an event payload.
    pub truncated: bool,
}

enum Payload {
    Positioned(Event),
    Unpositioned,
    Truncated,
}

/// Lazy, forward-only decoder yielding positioned events in stream order.
pub struct EventDecoder<'t, S> {
    source: S,
    table: &'t DetectorTable,
    max_x: i32,
    max_y: i32,
    stats: DecodeStats,
    finished: bool,
}

impl<'t, S: WordSource> EventDecoder<'t, S> {
    #[allow(clippy::cast_possible_wrap)]
    pub fn new(source: S, table: &'t DetectorTable, geometry: &MapGeometry) -> Self {
        Self {
            source,
            table,
            max_x: geometry.max_x().min(i32::MAX as u32) as i32,
            max_y: geometry.max_y().min(i32::MAX as u32) as i32,
            stats: DecodeStats::default(),
            finished: false,
        }
    }

    #[must_use]
    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Consumes the decoder, returning the word source and final counters.
    pub fn into_parts(self) -> (S, DecodeStats) {
        (self.source, self.stats)
    }

    fn decode_payload(&mut self, triggers: u16) -> Payload {
        if triggers.count_ones() % 2 == 1 && !self.source.skip(2) {
            return Payload::Truncated;
        }

        let mut event = Event::new(0, 0);
        let mut x = None;
        let mut y = None;
        let mut remaining = triggers;

        while remaining != 0 {
            let mask = 1u16 << remaining.trailing_zeros();
            remaining &= remaining - 1;

            let Some(value) = self.source.next_i16() else {
                return Payload::Truncated;
            };
            let wide = i32::from(value);

            if mask == self.table.x_mask() && 0 < wide && wide < self.max_x {
                x = u16::try_from(value).ok();
            } else if mask == self.table.y_mask() && 0 < wide && wide < self.max_y {
                y = u16::try_from(value).ok();
            } else if let Some(id) = self.table.resolve(mask) {
                match u16::try_from(value) {
                    Ok(channel) if u32::from(channel) < self.table.detector(id).max_channels => {
                        event.push(id, channel);
                    }
                    _ => self.stats.dropped_fields += 1,
                }
            } else {
                self.stats.dropped_fields += 1;
            }
        }

        match (x, y) {
            (Some(x), Some(y)) => {
                event.x = x;
                event.y = y;
                Payload::Positioned(event)
            }
            _ => Payload::Unpositioned,
        }
    }
}

impl<'t, 'a> EventDecoder<'t, SliceWords<'a>> {
    /// Decoder over an in-memory binary section.
    #[must_use]
    pub fn from_slice(data: &'a [u8], table: &'t DetectorTable, geometry: &MapGeometry) -> Self {
        Self::new(SliceWords::new(data), table, geometry)
    }
}

impl<S: WordSource> Iterator for EventDecoder<'_, S> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        while !self.finished {
            let Some(word) = self.source.next_u32() else {
                self.finished = true;
                break;
            };
            self.stats.words += 1;

            if word == MARKER_WORD {
                self.stats.markers += 1;
                if !self.source.skip(4) {
                    self.finished = true;
                }
                continue;
            }

            if word >> 16 != EVENT_TAG {
                self.stats.ignored_words += 1;
                continue;
            }
            self.stats.event_words += 1;

            #[allow(clippy::cast_possible_truncation)]
            let triggers = (word & 0xFFFF) as u16;
            match self.decode_payload(triggers) {
                Payload::Positioned(event) => {
                    self.stats.positioned += 1;
                    return Some(event);
                }
                Payload::Unpositioned => self.stats.unpositioned += 1,
                Payload::Truncated => {
                    self.stats.truncated = true;
                    self.finished = true;
                }
            }
        }
        None
    }
}

impl<S: WordSource> std::iter::FusedIterator for EventDecoder<'_, S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use lstmap_core::{DetectorConfig, DetectorId};
    use std::io::Cursor;

    const X: u16 = 256;
    const Y: u16 = 512;

    fn table() -> DetectorTable {
        DetectorTable::new(
            X,
            Y,
            vec![
                DetectorConfig::new("HE1", 1, 2048),
                DetectorConfig::new("GAMMA", 32, 4096),
                DetectorConfig::new("RBS", 64, 512),
            ],
            vec![],
        )
        .unwrap()
    }

    fn geometry() -> MapGeometry {
        // 10 x 8 pixel grid
        MapGeometry::new(100, 80, 10, 10, 0).unwrap()
    }

    /// Encodes one event word with its payload.
    fn event_word(values: &[(u16, i16)]) -> Vec<u8> {
        let mut sorted = values.to_vec();
        sorted.sort_by_key(|&(mask, _)| mask);
        let triggers = sorted.iter().fold(0u16, |acc, &(mask, _)| acc | mask);

        let mut bytes = (0x8000_0000u32 | u32::from(triggers)).to_le_bytes().to_vec();
        if sorted.len() % 2 == 1 {
            bytes.extend_from_slice(&[0xEE, 0xEE]);
        }
        for (_, value) in sorted {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    fn decode(data: &[u8]) -> (Vec<Event>, DecodeStats) {
        let table = table();
        let mut decoder = EventDecoder::from_slice(data, &table, &geometry());
        let events: Vec<Event> = decoder.by_ref().collect();
        (events, *decoder.stats())
    }

    #[test]
    fn test_positioned_event() {
        let data = event_word(&[(X, 3), (Y, 4), (1, 100), (64, 7)]);
        let (events, stats) = decode(&data);

        assert_eq!(events.len(), 1);
        assert_eq!((events[0].x, events[0].y), (3, 4));
        assert_eq!(events[0].channel(DetectorId(0)), Some(100));
        assert_eq!(events[0].channel(DetectorId(2)), Some(7));
        assert_eq!(stats.positioned, 1);
        assert_eq!(stats.words, 1);
    }

    #[test]
    fn test_odd_trigger_count_consumes_padding() {
        // X, Y and HE1: three values, so two padding bytes come first.
        let mut data = event_word(&[(X, 1), (Y, 2), (1, 9)]);
        assert_eq!(data.len(), 4 + 2 + 6);
        data.extend(event_word(&[(X, 5), (Y, 6)]));

        let (events, stats) = decode(&data);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].channel(DetectorId(0)), Some(9));
        assert_eq!((events[1].x, events[1].y), (5, 6));
        assert_eq!(stats.event_words, 2);
    }

    #[test]
    fn test_coordinate_bounds_are_strict() {
        let mut data = Vec::new();
        data.extend(event_word(&[(X, 0), (Y, 1), (1, 1)]));
        data.extend(event_word(&[(X, 10), (Y, 1), (1, 1)])); // max_x == 10
        data.extend(event_word(&[(X, 1), (Y, 8), (1, 1)])); // max_y == 8
        data.extend(event_word(&[(X, -1), (Y, 1), (1, 1)]));
        data.extend(event_word(&[(X, 9), (Y, 7), (1, 1)]));

        let (events, stats) = decode(&data);
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].x, events[0].y), (9, 7));
        assert_eq!(stats.unpositioned, 4);
    }

    #[test]
    fn test_channel_bounds_drop_single_field() {
        let data = event_word(&[(X, 1), (Y, 1), (1, 2048), (32, 4095), (64, -3)]);
        let (events, stats) = decode(&data);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].len(), 1);
        assert_eq!(events[0].channel(DetectorId(1)), Some(4095));
        assert_eq!(stats.dropped_fields, 2);
    }

    #[test]
    fn test_unknown_trigger_is_dropped() {
        let data = event_word(&[(X, 1), (Y, 1), (4, 10), (1, 0)]);
        let (events, stats) = decode(&data);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].hits().len(), 1);
        assert_eq!(events[0].channel(DetectorId(0)), Some(0));
        assert_eq!(stats.dropped_fields, 1);
    }

    #[test]
    fn test_missing_y_drops_event() {
        let data = event_word(&[(X, 1), (1, 5)]);
        let (events, stats) = decode(&data);

        assert!(events.is_empty());
        assert_eq!(stats.unpositioned, 1);
    }

    #[test]
    fn test_marker_skips_four_bytes() {
        let mut data = MARKER_WORD.to_le_bytes().to_vec();
        // Would decode as an event word if it were not skipped.
        data.extend(&0x8000_0000u32.to_le_bytes());
        data.extend(event_word(&[(X, 2), (Y, 3)]));

        let (events, stats) = decode(&data);
        assert_eq!(events.len(), 1);
        assert_eq!(stats.markers, 1);
        assert_eq!(stats.event_words, 1);
        assert_eq!(stats.words, 2);
    }

    #[test]
    fn test_non_event_words_are_ignored() {
        let mut data = Vec::new();
        data.extend(&0x4000_1234u32.to_le_bytes()); // timer
        data.extend(&0x0000_0101u32.to_le_bytes());
        data.extend(event_word(&[(X, 2), (Y, 3)]));

        let (events, stats) = decode(&data);
        assert_eq!(events.len(), 1);
        assert_eq!(stats.ignored_words, 2);
    }

    #[test]
    fn test_truncated_tail_ends_stream() {
        let mut data = event_word(&[(X, 2), (Y, 3)]);
        let mut partial = event_word(&[(X, 4), (Y, 5), (1, 6), (32, 7)]);
        partial.truncate(partial.len() - 1);
        data.extend(partial);

        let (events, stats) = decode(&data);
        assert_eq!(events.len(), 1);
        assert!(stats.truncated);

        // A dangling partial word is a clean end, not a truncated event.
        let mut data = event_word(&[(X, 2), (Y, 3)]);
        data.extend_from_slice(&[0x00, 0x80]);
        let (events, stats) = decode(&data);
        assert_eq!(events.len(), 1);
        assert!(!stats.truncated);
    }

    #[test]
    fn test_reader_source_matches_slice_source() {
        let mut data = Vec::new();
        data.extend(event_word(&[(X, 1), (Y, 1), (1, 10)]));
        data.extend(MARKER_WORD.to_le_bytes());
        data.extend([0u8; 4]);
        data.extend(event_word(&[(X, 2), (Y, 7), (32, 11), (64, 12)]));
        data.extend(event_word(&[(X, 2), (1, 13)]));

        let table = table();
        let from_slice: Vec<Event> = EventDecoder::from_slice(&data, &table, &geometry()).collect();
        let mut reader =
            EventDecoder::new(ReaderWords::new(Cursor::new(&data)), &table, &geometry());
        let from_reader: Vec<Event> = reader.by_ref().collect();

        assert_eq!(from_slice, from_reader);
        let (mut source, stats) = reader.into_parts();
        assert_eq!(source.consumed(), data.len() as u64);
        assert!(source.take_error().is_none());
        assert_eq!(stats.positioned, 2);
    }

    #[test]
    fn test_slice_skip_past_end() {
        let data = [1u8, 2, 3];
        let mut source = SliceWords::new(&data);
        assert!(!source.skip(4));
        assert_eq!(source.position(), 3);
        assert_eq!(source.next_i16(), None);
    }
}
