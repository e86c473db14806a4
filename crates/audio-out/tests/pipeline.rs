//! Streaming pipeline behaviour against the simulated SoC.
//!
//! USB packets are written to the endpoint buffer and announced through
//! the intake callback; interrupts are dispatched the way the firmware's
//! vector table would; the I2S transmitter is clocked one 1 ms transfer at
//! a time.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]

mod common;

use audio_out::{
    AudioError, AudioOut, AudioOutConfig, AudioShared, Multiplier, SampleFormat, StreamState,
};
use common::{s24_packet, s24_wire, Rig};
use platform::config::{AUDIO_OUT_BUF_SIZE, USB_MAX_BUF_SIZE};
use platform::sim::SimSoc;
use platform::{DmaController, DmaError, FaultKind};

const FRAMES_1MS: usize = 48;

fn ramp(k: usize) -> impl Fn(usize) -> (i32, i32) {
    move |n| {
        let v = ((k * 100 + n) as i32) << 8;
        (v, -v)
    }
}

// ── Intake and processing ───────────────────────────────────────────────────

#[test]
fn packets_are_byte_swapped_into_the_ring() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    rig.deliver(&s24_packet(FRAMES_1MS, |_| (0x12_3456, -2)));
    assert_eq!(rig.audio.pending(), 0, "nothing is published before the bs interrupt");

    rig.dispatch();
    assert_eq!(rig.audio.pending(), 288);
    let block = rig.audio.service(&mut rig.soc).unwrap();
    assert_eq!((block.offset, block.len, block.samples), (0, 288, 96));
    assert_eq!(rig.ring(0, 6), [0x12, 0x34, 0x56, 0xFF, 0xFF, 0xFE]);
    assert_eq!(rig.audio.pending(), 0);
    assert!(rig.audio.service(&mut rig.soc).is_none());
}

#[test]
fn deadline_scenario_at_double_gain() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    rig.audio.set_multiplier(Multiplier::DOUBLE);
    let frames = usize::from(USB_MAX_BUF_SIZE) / 6;
    let packet = s24_packet(frames, |_| (0x10_0000, 0x50_0000));

    for n in 0..4u16 {
        rig.deliver(&packet);
        rig.dispatch();
        let block = rig.audio.service(&mut rig.soc).unwrap();
        assert_eq!(block.len, USB_MAX_BUF_SIZE);
        assert_eq!(block.offset, n * USB_MAX_BUF_SIZE);
        // The next packet's completion has not fired yet and nothing is late.
        assert!(rig.audio.faults().is_clear());
    }
    assert!(rig.audio.output_active(), "half the ring is processed, output armed");

    rig.deliver(&packet);
    rig.dispatch();
    assert_eq!(rig.audio.faults().get(FaultKind::DeadlineMissed), 0);

    // 2.0 doubles the left channel and saturates the right one.
    assert_eq!(rig.ring(0, 6), [0x20, 0x00, 0x00, 0x7F, 0xFF, 0xFF]);
}

#[test]
fn late_processing_counts_a_missed_deadline() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    let packet = s24_packet(FRAMES_1MS, |_| (1, 1));
    rig.deliver(&packet);
    rig.dispatch();
    rig.deliver(&packet);
    rig.dispatch();
    assert_eq!(rig.audio.faults().get(FaultKind::DeadlineMissed), 1);

    // Both packets are still processed, in one pass.
    let block = rig.audio.service(&mut rig.soc).unwrap();
    assert_eq!(block.len, 576);
}

#[test]
fn packet_during_reorder_is_dropped() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    let packet = s24_packet(FRAMES_1MS, |_| (7, 7));
    rig.deliver(&packet);
    rig.deliver(&packet);
    assert_eq!(rig.audio.faults().get(FaultKind::Overrun), 1);
    rig.dispatch();
    assert_eq!(rig.audio.pending(), 288);
}

#[test]
fn full_ring_drops_packet() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    let packet = s24_packet(FRAMES_1MS, |_| (7, 7));
    for _ in 0..8 {
        rig.deliver(&packet);
        rig.dispatch();
    }
    assert_eq!(rig.audio.occupancy(), u32::from(AUDIO_OUT_BUF_SIZE));
    rig.deliver(&packet);
    rig.dispatch();
    assert_eq!(rig.audio.faults().get(FaultKind::Overrun), 1);
    assert_eq!(rig.audio.faults().get(FaultKind::DeadlineMissed), 7);
    assert_eq!(rig.audio.pending(), u32::from(AUDIO_OUT_BUF_SIZE));
}

#[test]
fn partial_frame_packet_is_malformed() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    rig.deliver(&[0u8; 100]);
    assert_eq!(rig.audio.faults().get(FaultKind::MalformedFrame), 1);
    assert_eq!(rig.soc.pending_irqs(), 0);
}

#[test]
fn packet_outside_endpoint_buffer_is_malformed() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    rig.isr.on_samples_received(&mut rig.soc, 200, 288);
    assert_eq!(rig.audio.faults().get(FaultKind::MalformedFrame), 1);
    assert_eq!(rig.audio.pending(), 0);
}

// ── Output ──────────────────────────────────────────────────────────────────

#[test]
fn steady_stream_plays_processed_audio_in_order() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    let mut wire = Vec::new();
    let mut played = Vec::new();
    for k in 0..20 {
        wire.extend(s24_wire(FRAMES_1MS, ramp(k)));
        let (_, out) = rig.frame(&s24_packet(FRAMES_1MS, ramp(k)));
        played.extend(out);
    }
    // Output starts in the fourth frame, once half the ring is processed.
    assert_eq!(played.len(), 17 * 288);
    assert_eq!(played, wire[..played.len()]);
    assert!(rig.audio.faults().is_clear());
    assert_eq!(rig.audio.occupancy(), 3 * 288);
}

#[test]
fn packet_straddling_ring_end_is_split() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    let frames = usize::from(USB_MAX_BUF_SIZE) / 6;
    let mut wire = Vec::new();
    let mut played = Vec::new();
    for k in 0..8 {
        wire.extend(s24_wire(frames, ramp(k)));
        let (_, out) = rig.frame(&s24_packet(frames, ramp(k)));
        played.extend(out);
    }
    // The eighth packet lands at 2058: 246 bytes to the end, 48 at the start.
    let last = s24_wire(frames, ramp(7));
    assert_eq!(rig.ring(2058, 246), last[..246]);
    assert_eq!(rig.ring(0, 48), last[246..]);
    assert_eq!(played, wire[..played.len()]);
    assert!(rig.audio.faults().is_clear());
}

#[test]
fn underrun_stops_output_until_refilled() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    let packet = s24_packet(FRAMES_1MS, |_| (3, 3));
    for _ in 0..4 {
        rig.frame(&packet);
    }
    assert!(rig.audio.output_active());

    // The host stops sending; three more transfers drain what was processed.
    for _ in 0..3 {
        rig.play(288);
    }
    assert_eq!(rig.audio.faults().get(FaultKind::Underrun), 1);
    assert!(!rig.audio.output_active());
    assert!(!rig.soc.ch_status(rig.isr.i2s_channel()).active);

    for _ in 0..3 {
        rig.deliver(&packet);
        rig.dispatch();
        rig.audio.service(&mut rig.soc);
        assert!(!rig.audio.output_active());
    }
    rig.deliver(&packet);
    rig.dispatch();
    rig.audio.service(&mut rig.soc);
    assert!(rig.audio.output_active(), "restarted at half full");
    assert_eq!(rig.play(288).len(), 288);
    assert_eq!(rig.audio.faults().get(FaultKind::Underrun), 1);
}

// ── Feedback ────────────────────────────────────────────────────────────────

#[test]
fn feedback_reflects_occupancy_once_per_service() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    let packet = s24_packet(FRAMES_1MS, |_| (0, 0));
    for _ in 0..6 {
        rig.frame(&packet);
    }
    assert_eq!(rig.audio.take_feedback(), None);

    let fb = rig.isr.on_feedback_endpoint_serviced();
    assert_eq!(fb.occupancy, 3 * 288);
    // 288 bytes below the half-full target: a quarter sample per frame faster.
    assert_eq!(fb.rate, (48 << 14) + (1 << 12));
    assert_eq!(rig.audio.take_feedback(), Some(fb));
    assert_eq!(rig.audio.take_feedback(), None);
    assert_eq!(rig.audio.feedback(), fb);
}

// ── Lifecycle and configuration ─────────────────────────────────────────────

#[test]
fn deconfigured_pipeline_ignores_packets_until_restarted() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    let packet = s24_packet(FRAMES_1MS, |_| (5, 5));
    rig.frame(&packet);

    rig.audio.on_usb_deconfigured(&mut rig.soc);
    assert_eq!(rig.audio.state(), StreamState::Idle);
    rig.deliver(&packet);
    assert_eq!(rig.soc.pending_irqs(), 0);
    assert!(rig.audio.service(&mut rig.soc).is_none());

    rig.audio.start(&mut rig.soc);
    rig.deliver(&packet);
    rig.dispatch();
    let block = rig.audio.service(&mut rig.soc).unwrap();
    assert_eq!(block.offset, 0);
    assert!(rig.audio.faults().is_clear());
}

#[test]
fn sixteen_bit_stream_swaps_in_pairs() {
    let shared = AudioShared::new();
    let mut rig = Rig::with_format(&shared, SampleFormat::S16);
    rig.audio.set_multiplier(Multiplier::from_raw(1 << 13));
    let mut packet = Vec::new();
    for _ in 0..FRAMES_1MS {
        packet.extend_from_slice(&0x1234i16.to_le_bytes());
        packet.extend_from_slice(&(-0x1234i16).to_le_bytes());
    }
    rig.deliver(&packet);
    rig.dispatch();
    let block = rig.audio.service(&mut rig.soc).unwrap();
    assert_eq!(block.samples, 96);
    let half = 0x091Ai16;
    let mut expected = half.to_be_bytes().to_vec();
    expected.extend_from_slice(&(-half).to_be_bytes());
    assert_eq!(rig.ring(0, 4), expected);
}

#[test]
fn format_change_requires_idle() {
    let shared = AudioShared::new();
    let mut rig = Rig::new(&shared);
    assert_eq!(rig.audio.set_format(SampleFormat::S16), Err(AudioError::Busy));
    rig.audio.on_usb_deconfigured(&mut rig.soc);
    rig.audio.set_format(SampleFormat::S16).unwrap();
    assert_eq!(rig.audio.format(), SampleFormat::S16);
}

#[test]
fn ring_not_tiled_by_descriptors_is_rejected() {
    let shared = AudioShared::new();
    let mut soc = SimSoc::new();
    let mut config = AudioOutConfig::from_design(&soc.design());
    config.i2s_n_td = 4;
    assert_eq!(
        AudioOut::create(&mut soc, &shared, config).err(),
        Some(AudioError::InvalidConfig)
    );
}

#[test]
fn exhausted_descriptor_pool_fails_creation() {
    let shared = AudioShared::new();
    let mut soc = SimSoc::new();
    while soc.td_allocate().is_some() {}
    let config = AudioOutConfig::from_design(&soc.design());
    assert_eq!(
        AudioOut::create(&mut soc, &shared, config).err(),
        Some(AudioError::Dma(DmaError::ResourceExhausted))
    );
}
