//! Integration tests for the regular decoder.
//!
//! Run with: cargo test --test decoder_tests

mod common;

use common::*;
use evcodec_core::{
    CdEvent, DecodeError, Decoder, EncodedPacket, EventCounts, EventPacket, Fault, TriggerEvent,
};
use ndarray::ArrayView1;

/// Drives `decode_until` over `packet` the way a frame-based consumer does.
fn decode_in_frames(
    decoder: &mut Decoder,
    packet: &EventPacket,
    frame_time: &mut i64,
    interval: i64,
    cd: &mut Vec<CdEvent>,
    triggers: &mut Vec<TriggerEvent>,
) -> usize {
    let mut calls = 0;
    loop {
        let result = decoder.decode_until(packet, *frame_time).unwrap();
        calls += 1;
        cd.extend(decoder.get_cd_events());
        triggers.extend(decoder.get_ext_trig_events());
        if !result.reached_limit {
            return calls;
        }
        while *frame_time <= result.next_time {
            *frame_time += interval;
        }
    }
}

#[test]
fn test_two_events_opposite_polarity() {
    let time_base = 1_700_000_000_000;
    let packet = mono_packet(time_base, &[(10, 20, 1, 0), (11, 21, 0, 50)]);

    let mut decoder = Decoder::new();
    decoder.decode(&packet).unwrap();
    let events = decoder.get_cd_events();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].t, time_base);
    assert_eq!(events[1].t, time_base + 50);
    assert_eq!(decoder.get_num_cd_on(), 1);
    assert_eq!(decoder.get_num_cd_off(), 1);
}

#[test]
fn test_two_events_evt3() {
    let time_base = 5_000;
    let stream = Evt3Builder::new()
        .time_low(0)
        .y(3)
        .x(7, 1)
        .time_low(50)
        .x(8, 0);

    let mut decoder = Decoder::new();
    decoder
        .decode_bytes("evt3", WIDTH, HEIGHT, time_base, &stream.bytes())
        .unwrap();
    let events = decoder.get_cd_events();

    assert_eq!(
        events,
        vec![
            CdEvent::new(7, 3, 1, time_base),
            CdEvent::new(8, 3, 0, time_base + 50)
        ]
    );
    assert_eq!(decoder.get_num_cd_on(), 1);
    assert_eq!(decoder.get_num_cd_off(), 1);
}

#[test]
fn test_evt3_mixed_packet() {
    let packet = evt3_packet(1_000);
    let mut decoder = Decoder::new();
    decoder.decode(&packet).unwrap();

    let cd = decoder.get_cd_events();
    let triggers = decoder.get_ext_trig_events();
    assert_eq!(cd.len(), 8);
    assert_eq!(
        triggers,
        vec![TriggerEvent::new(0, 1, 1_010), TriggerEvent::new(1, 1, 1_035)]
    );
    assert_eq!(
        decoder.counts(),
        EventCounts {
            cd_on: 6,
            cd_off: 2,
            trigger_rising: 1,
            trigger_falling: 1,
        }
    );
    assert_eq!(time_sum(&cd, &triggers), 4_231 + 45 + 10 * 1_000);
    assert!(cd.windows(2).all(|w| w[0].t <= w[1].t));
}

#[test]
fn test_counters_match_drained_events() {
    let mut decoder = Decoder::new();
    let mut drained = 0u64;
    for i in 0..5 {
        decoder.decode(&evt3_packet(i * 10_000)).unwrap();
        drained += decoder.get_cd_events().len() as u64;
    }
    assert_eq!(decoder.get_num_cd_on() + decoder.get_num_cd_off(), drained);
}

#[test]
fn test_decode_paths_agree() {
    let packets: Vec<EventPacket> = (0..3).map(|i| evt3_packet(i * 100_000)).collect();

    let mut by_msg = Decoder::new();
    let mut by_bytes = Decoder::new();
    let mut by_array = Decoder::new();
    let mut sums = [0i64; 3];

    for packet in &packets {
        by_msg.decode(packet).unwrap();
        by_bytes
            .decode_bytes(
                packet.encoding(),
                packet.width(),
                packet.height(),
                packet.time_base(),
                packet.events(),
            )
            .unwrap();
        by_array
            .decode_array(
                packet.encoding(),
                packet.width(),
                packet.height(),
                packet.time_base(),
                ArrayView1::from(packet.events()),
            )
            .unwrap();

        for (sum, decoder) in sums.iter_mut().zip([&mut by_msg, &mut by_bytes, &mut by_array]) {
            let cd = decoder.get_cd_events();
            let triggers = decoder.get_ext_trig_events();
            *sum += time_sum(&cd, &triggers);
        }
    }

    assert_eq!(by_msg.counts(), by_bytes.counts());
    assert_eq!(by_msg.counts(), by_array.counts());
    assert_eq!(sums[0], sums[1]);
    assert_eq!(sums[0], sums[2]);
}

#[test]
fn test_decode_until_matches_full_decode() {
    let packets: Vec<EventPacket> = (0..4).map(|i| evt3_packet(i * 5_000)).collect();

    let mut full = Decoder::new();
    let mut full_cd = Vec::new();
    let mut full_triggers = Vec::new();
    for packet in &packets {
        full.decode(packet).unwrap();
        full_cd.extend(full.get_cd_events());
        full_triggers.extend(full.get_ext_trig_events());
    }

    let mut framed = Decoder::new();
    let mut cd = Vec::new();
    let mut triggers = Vec::new();
    let mut frame_time = 1_000;
    let mut calls = 0;
    for packet in &packets {
        calls += decode_in_frames(
            &mut framed,
            packet,
            &mut frame_time,
            1_000,
            &mut cd,
            &mut triggers,
        );
    }

    assert!(calls > packets.len(), "frames should split packets");
    assert_eq!(framed.counts(), full.counts());
    assert_eq!(cd, full_cd);
    assert_eq!(triggers, full_triggers);
}

#[test]
fn test_decode_until_stops_before_limit() {
    let packet = mono_packet(0, &[(0, 0, 1, 0), (1, 0, 1, 10), (2, 0, 1, 20), (3, 0, 1, 30)]);
    let mut decoder = Decoder::new();

    let result = decoder.decode_until(&packet, 15).unwrap();
    assert!(result.reached_limit);
    assert_eq!(result.next_time, 20);
    let first: Vec<i64> = decoder.get_cd_events().iter().map(|e| e.t).collect();
    assert_eq!(first, vec![0, 10]);

    // The limit is exclusive: an event exactly at the limit stays pending.
    let result = decoder.decode_until(&packet, 30).unwrap();
    assert_eq!((result.reached_limit, result.next_time), (true, 30));
    assert_eq!(decoder.get_cd_events().len(), 1);

    let result = decoder.decode_until(&packet, 1_000).unwrap();
    assert_eq!((result.reached_limit, result.next_time), (false, 30));
    assert_eq!(decoder.get_cd_events().len(), 1);
}

#[test]
fn test_plain_decode_resumes_after_decode_until() {
    let packet = mono_packet(0, &[(0, 0, 1, 0), (1, 0, 1, 10), (2, 0, 1, 20)]);
    let mut decoder = Decoder::new();

    assert!(decoder.decode_until(&packet, 5).unwrap().reached_limit);
    decoder.decode(&packet).unwrap();

    let xs: Vec<u16> = decoder.get_cd_events().iter().map(|e| e.x).collect();
    assert_eq!(xs, vec![0, 1, 2]);
}

#[test]
fn test_find_first_sensor_time_is_a_peek() {
    let packet = evt3_packet(2_000);
    let mut decoder = Decoder::new();

    assert_eq!(decoder.find_first_sensor_time(&packet), Ok(Some(2_010)));
    assert_eq!(decoder.find_first_sensor_time(&packet), Ok(Some(2_010)));
    assert_eq!(decoder.counts(), EventCounts::default());

    decoder.decode(&packet).unwrap();
    let cd = decoder.get_cd_events();
    assert_eq!(cd[0].t, 2_010);
    assert_eq!(cd.len(), 8);
}

#[test]
fn test_find_first_sensor_time_mid_packet() {
    let packet = mono_packet(0, &[(0, 0, 1, 0), (1, 0, 1, 10), (2, 0, 1, 20)]);
    let mut decoder = Decoder::new();
    decoder.decode_until(&packet, 15).unwrap();

    assert_eq!(decoder.find_first_sensor_time(&packet), Ok(Some(20)));
}

#[test]
fn test_find_first_sensor_time_empty_packet() {
    let decoder = Decoder::new();
    // Only time words, no events
    let stream = Evt3Builder::new().time_low(5).time_high(2).y(4);
    let packet = EventPacket::new("evt3", WIDTH, HEIGHT, 0, stream.bytes());
    assert_eq!(decoder.find_first_sensor_time(&packet), Ok(None));

    let empty = mono_packet(0, &[]);
    assert_eq!(decoder.find_first_sensor_time(&empty), Ok(None));
}

#[test]
fn test_find_first_sensor_time_unknown_encoding() {
    let decoder = Decoder::new();
    let packet = EventPacket::new("nope", WIDTH, HEIGHT, 0, vec![0; 4]);
    assert_eq!(
        decoder.find_first_sensor_time(&packet),
        Err(DecodeError::UnsupportedEncoding("nope".into()))
    );
}

#[test]
fn test_truncated_payload_resumes() {
    let time_base = 9_000;
    let whole = mono_bytes(&[(1, 1, 1, 0), (2, 2, 0, 50), (3, 3, 1, 75)]);

    let mut reference = Decoder::new();
    reference
        .decode_bytes("mono", WIDTH, HEIGHT, time_base, &whole)
        .unwrap();
    let expected = reference.get_cd_events();

    let mut decoder = Decoder::new();
    decoder
        .decode_bytes("mono", WIDTH, HEIGHT, time_base, &whole[..13])
        .unwrap();
    // nothing from the incomplete second unit
    assert_eq!(decoder.get_cd_events(), expected[..1].to_vec());

    decoder
        .decode_bytes("mono", WIDTH, HEIGHT, time_base, &whole[13..])
        .unwrap();
    assert_eq!(decoder.get_cd_events(), expected[1..].to_vec());
}

#[test]
fn test_truncated_evt3_word() {
    let bytes = Evt3Builder::new().time_low(3).y(9).x(4, 1).bytes();
    let (head, tail) = bytes.split_at(bytes.len() - 1);

    let mut decoder = Decoder::new();
    decoder.decode_bytes("evt3", WIDTH, HEIGHT, 0, head).unwrap();
    assert!(decoder.get_cd_events().is_empty());

    decoder.decode_bytes("evt3", WIDTH, HEIGHT, 0, tail).unwrap();
    assert_eq!(decoder.get_cd_events(), vec![CdEvent::new(4, 9, 1, 3)]);
}

#[test]
fn test_evt3_state_carries_across_packets() {
    let stream = Evt3Builder::new().time_low(3).y(9).x(4, 1).time_low(8).x(5, 0);
    let bytes = stream.bytes();
    // split between the two ADDR_X words: second packet starts with TIME_LOW
    let (first, second) = bytes.split_at(8);

    let mut decoder = Decoder::new();
    decoder.decode_bytes("evt3", WIDTH, HEIGHT, 0, first).unwrap();
    decoder.decode_bytes("evt3", WIDTH, HEIGHT, 0, second).unwrap();

    assert_eq!(
        decoder.get_cd_events(),
        vec![CdEvent::new(4, 9, 1, 3), CdEvent::new(5, 9, 0, 8)]
    );
}

#[test]
fn test_corrupt_stream_keeps_partial_results() {
    let bytes = mono_bytes(&[(1, 1, 1, 0), (WIDTH, 1, 1, 5), (2, 2, 1, 10)]);
    let mut decoder = Decoder::new();

    let err = decoder
        .decode_bytes("mono", WIDTH, HEIGHT, 0, &bytes)
        .unwrap_err();
    assert_eq!(
        err,
        DecodeError::CorruptStream {
            offset: 8,
            fault: Fault::XOutOfRange { x: WIDTH, width: WIDTH },
        }
    );
    assert_eq!(decoder.get_cd_events(), vec![CdEvent::new(1, 1, 1, 0)]);

    // the decoder is usable afterwards
    decoder.decode(&mono_packet(0, &[(3, 3, 0, 1)])).unwrap();
    assert_eq!(decoder.get_cd_events().len(), 1);
    assert_eq!(decoder.get_num_cd_on() + decoder.get_num_cd_off(), 2);
}

#[test]
fn test_unsupported_encoding() {
    let mut decoder = Decoder::new();
    let err = decoder.decode_bytes("libcaer_cmp", WIDTH, HEIGHT, 0, &[0; 16]);
    assert_eq!(err, Err(DecodeError::UnsupportedEncoding("libcaer_cmp".into())));
    assert_eq!(decoder.counts(), EventCounts::default());
}

#[test]
fn test_counters_survive_drains_and_encoding_switches() {
    let mut decoder = Decoder::new();
    decoder.decode(&evt3_packet(0)).unwrap();
    let _ = decoder.get_cd_events();
    let _ = decoder.get_cd_events();
    decoder
        .decode(&trigger_packet(0, &[(true, 0, 1), (false, 0, 2), (true, 0, 3)]))
        .unwrap();

    assert_eq!(decoder.get_num_cd_on(), 6);
    assert_eq!(decoder.get_num_cd_off(), 2);
    assert_eq!(decoder.get_num_trigger_rising(), 3);
    assert_eq!(decoder.get_num_trigger_falling(), 2);
}

#[test]
fn test_event_packets_per_call() {
    let mut decoder = Decoder::new();
    decoder.decode(&mono_packet(0, &[(1, 1, 1, 0), (2, 2, 1, 1)])).unwrap();
    decoder.decode(&mono_packet(100, &[])).unwrap();
    decoder.decode(&mono_packet(200, &[(3, 3, 0, 0)])).unwrap();

    let packets = decoder.get_cd_event_packets();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].len(), 2);
    assert_eq!(packets[1], vec![CdEvent::new(3, 3, 0, 200)]);
    assert!(decoder.get_cd_event_packets().is_empty());
    assert!(decoder.get_ext_trig_event_packets().is_empty());
}

#[test]
fn test_resumed_packet_uses_new_geometry() {
    let mut decoder = Decoder::new();
    let large = mono_packet(0, &[(600, 400, 1, 0), (601, 400, 1, 100)]);
    let result = decoder.decode_until(&large, 50).unwrap();
    assert!(result.reached_limit);

    // same stream position, but the header now describes an 8x8 sensor
    let small = EventPacket::new("mono", 8, 8, 0, mono_bytes(&[(1, 1, 1, 0), (600, 400, 1, 1)]));
    assert_eq!(
        decoder.decode(&small),
        Err(DecodeError::CorruptStream {
            offset: 8,
            fault: Fault::XOutOfRange { x: 600, width: 8 },
        })
    );
    assert_eq!(decoder.get_cd_events(), vec![CdEvent::new(600, 400, 1, 0)]);
}

#[test]
fn test_time_base_overflow_is_corrupt_stream() {
    let mut decoder = Decoder::new();
    let packet = mono_packet(i64::MAX - 10, &[(1, 1, 1, 100)]);
    let err = decoder.decode(&packet).unwrap_err();
    assert_eq!(
        err,
        DecodeError::CorruptStream {
            offset: 0,
            fault: Fault::TimeOverflow {
                time_base: i64::MAX - 10,
                offset: 100
            },
        }
    );
    assert!(decoder.get_cd_events().is_empty());
    assert_eq!(decoder.counts(), EventCounts::default());

    // the largest representable time still decodes
    decoder.decode(&mono_packet(i64::MAX - 10, &[(1, 1, 1, 10)])).unwrap();
    assert_eq!(decoder.get_cd_events()[0].t, i64::MAX);
}
