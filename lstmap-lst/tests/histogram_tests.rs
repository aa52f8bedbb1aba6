#![allow(
    clippy::cast_possible_truncation,
    clippy::uninlined_format_args,
    clippy::unreadable_literal
)]
use lstmap_core::{aggregate, Histogram, HistogramSet};
use lstmap_lst::{read_header, EventDecoder, LstConfig, ReaderWords};
use std::io::{BufReader, Cursor, Read};
use std::sync::Arc;

const X: u16 = 256;
const Y: u16 = 512;
const HE1: u16 = 1;
const HE2: u16 = 2;
const HE3: u16 = 4;
const RBS: u16 = 64;

// Helper to encode one event word plus payload (ascending trigger order)
fn make_event(values: &[(u16, i16)]) -> Vec<u8> {
    let mut sorted = values.to_vec();
    sorted.sort_by_key(|&(mask, _)| mask);
    let triggers = sorted.iter().fold(0u16, |acc, &(mask, _)| acc | mask);

    let mut bytes = (0x8000_0000u32 | u32::from(triggers))
        .to_le_bytes()
        .to_vec();
    if sorted.len() % 2 == 1 {
        bytes.extend_from_slice(&[0, 0]);
    }
    for (_, value) in sorted {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn make_file(map_size: &str, events: &[Vec<u8>]) -> Vec<u8> {
    let mut data = format!(
        "[MPA4A] 3.2\r\nrange=4096\r\nMap size (w,h,pw,ph,pen): {map_size}\r\n\
         Exp.Info: proton,3000,Al50,Cr20,none,none,Be\r\n[LISTDATA]\r\n"
    )
    .into_bytes();
    for event in events {
        data.extend_from_slice(event);
    }
    data
}

struct Decoded {
    histograms: Vec<Histogram>,
    counts: Vec<(String, u64)>,
    positioned: u64,
}

fn decode_file(config: &LstConfig, data: &[u8]) -> Decoded {
    let table = Arc::new(config.to_table().unwrap());
    let mut reader = BufReader::new(Cursor::new(data));
    let header = read_header(&mut reader).unwrap();

    let mut set = HistogramSet::new(Arc::clone(&table), header.geometry);
    let mut decoder = EventDecoder::new(ReaderWords::new(&mut reader), &table, &header.geometry);
    for event in decoder.by_ref() {
        set.apply(&event);
    }
    let positioned = decoder.stats().positioned;
    let counts = set.event_counts();

    Decoded {
        histograms: set.finish(),
        counts,
        positioned,
    }
}

fn histogram<'a>(decoded: &'a Decoded, name: &str) -> Option<&'a Histogram> {
    decoded.histograms.iter().find(|h| h.name == name)
}

#[test]
fn test_map_size_gives_grid() {
    let data = make_file("4,4,2,2,0", &[]);
    let header = read_header(&mut Cursor::new(data)).unwrap();
    assert_eq!(header.geometry.max_x(), 2);
    assert_eq!(header.geometry.max_y(), 2);
}

#[test]
fn test_event_lands_at_coordinates_and_channel() {
    let config = LstConfig::aglae_defaults();
    let data = make_file("40,40,2,2,0", &[make_event(&[(X, 1), (Y, 3), (HE1, 5)])]);

    let decoded = decode_file(&config, &data);
    let he1 = histogram(&decoded, "HE1").unwrap();

    assert_eq!(he1.counts.dim(), (20, 20, 2048));
    assert_eq!(he1.counts[[1, 3, 5]], 1);
    assert_eq!(he1.total(), 1);
    // Only HE1 saw data
    assert_eq!(decoded.histograms.len(), 1);
}

#[test]
fn test_event_without_y_is_not_counted() {
    let config = LstConfig::aglae_defaults();
    let data = make_file("40,40,2,2,0", &[make_event(&[(X, 1), (HE1, 5)])]);

    let decoded = decode_file(&config, &data);
    assert!(histogram(&decoded, "HE1").is_none());
    assert_eq!(decoded.positioned, 0);
}

#[test]
fn test_histogram_sums_match_hits() {
    let config = LstConfig::aglae_defaults();
    let mut events = Vec::new();
    let mut expected_he1 = 0u64;
    let mut expected_rbs = 0u64;

    for i in 0..200i16 {
        let x = 1 + i % 9;
        let y = 1 + (i * 7) % 9;
        let mut values = vec![(X, x), (Y, y), (HE1, (i * 13) % 2048)];
        expected_he1 += 1;
        if i % 3 == 0 {
            // RBS has 512 channels, so part of these are out of range
            values.push((RBS, i * 5));
            if i * 5 < 512 {
                expected_rbs += 1;
            }
        }
        events.push(make_event(&values));
        // Unpositioned noise between events
        events.push(make_event(&[(Y, 2), (HE1, 1)]));
        events.push(0x4000_0000u32.to_le_bytes().to_vec());
    }

    let data = make_file("100,100,10,10,0", &events);
    let decoded = decode_file(&config, &data);

    assert_eq!(histogram(&decoded, "HE1").unwrap().total(), expected_he1);
    assert_eq!(histogram(&decoded, "RBS").unwrap().total(), expected_rbs);
    assert_eq!(decoded.positioned, 200);

    let counts: std::collections::HashMap<_, _> = decoded.counts.into_iter().collect();
    assert_eq!(counts["HE1"], expected_he1);
    assert_eq!(counts["RBS"], expected_rbs);
    assert_eq!(counts["GAMMA"], 0);
}

#[test]
fn test_decoding_is_deterministic() {
    let config = LstConfig::aglae_defaults();
    let events: Vec<Vec<u8>> = (0..64i16)
        .map(|i| make_event(&[(X, 1 + i % 3), (Y, 1 + i % 2), (HE2, i), (HE3, 63 - i)]))
        .collect();
    let data = make_file("8,6,2,2,0", &events);

    let first = decode_file(&config, &data);
    let second = decode_file(&config, &data);
    assert_eq!(first.histograms, second.histograms);
    assert_eq!(first.counts, second.counts);
}

#[test]
fn test_computed_detector_sums_components() {
    let config = LstConfig::aglae_defaults();
    let events = vec![
        make_event(&[(X, 1), (Y, 1), (HE1, 10)]),
        make_event(&[(X, 1), (Y, 1), (HE2, 10)]),
        make_event(&[(X, 2), (Y, 1), (HE3, 7), (HE1, 7)]),
    ];
    let data = make_file("6,4,2,2,0", &events);
    let decoded = decode_file(&config, &data);

    let table = config.to_table().unwrap();
    let header = read_header(&mut Cursor::new(&data)).unwrap();
    let computed = aggregate(&table, &header.geometry, &decoded.histograms);

    let names: Vec<&str> = computed
        .iter()
        .map(|c| c.histogram.name.as_str())
        .collect();
    // HE4 never fired, HE12 = HE3 + HE4 still has HE3
    assert_eq!(names, vec!["HE10", "HE11", "HE12", "HE13"]);

    let he10 = &computed[0];
    assert_eq!(he10.sources, vec!["HE1", "HE2", "HE3"]);
    assert_eq!(he10.histogram.counts[[1, 1, 10]], 2);
    assert_eq!(he10.histogram.counts[[2, 1, 7]], 2);

    let he11 = &computed[1];
    assert_eq!(he11.sources, vec!["HE1", "HE2"]);
    assert_eq!(he11.histogram.counts[[2, 1, 7]], 1);

    let he12 = &computed[2];
    assert_eq!(he12.sources, vec!["HE3"]);
    assert_eq!(he12.histogram.total(), 1);

    for c in &computed {
        let expected: u64 = c
            .sources
            .iter()
            .map(|s| histogram(&decoded, s).unwrap().total())
            .sum();
        assert_eq!(c.histogram.total(), expected, "{}", c.histogram.name);
    }
}

#[test]
fn test_reader_left_on_first_word() {
    let data = make_file("4,4,2,2,0", &[make_event(&[(X, 1), (Y, 1)])]);
    let mut reader = BufReader::new(Cursor::new(data));
    read_header(&mut reader).unwrap();

    let mut word = [0u8; 4];
    reader.read_exact(&mut word).unwrap();
    assert_eq!(u32::from_le_bytes(word), 0x8000_0000 | 256 | 512);
}
