//! Audio pipeline wired to the simulated SoC.

#![allow(dead_code)]

use audio_out::{AudioBlock, AudioIsr, AudioOut, AudioOutConfig, AudioShared, SampleFormat};
use platform::config::AUDIO_OUT_TRANSFER_SIZE;
use platform::sim::{Irq, SimSoc};
use platform::Memory;

pub struct Rig<'a> {
    pub soc: SimSoc,
    pub audio: AudioOut<'a>,
    pub isr: AudioIsr<'a>,
}

impl<'a> Rig<'a> {
    pub fn new(shared: &'a AudioShared) -> Self {
        Self::with_format(shared, SampleFormat::S24)
    }

    pub fn with_format(shared: &'a AudioShared, format: SampleFormat) -> Self {
        let mut soc = SimSoc::new();
        soc.set_swap_width(usize::from(format.sample_bytes()));
        let mut config = AudioOutConfig::from_design(&soc.design());
        config.format = format;
        let (mut audio, isr) = AudioOut::create(&mut soc, shared, config).unwrap();
        audio.start(&mut soc);
        Self { soc, audio, isr }
    }

    /// Run every pending interrupt handler.
    pub fn dispatch(&mut self) {
        while let Some(irq) = self.soc.take_irq() {
            match irq {
                Irq::Dma(ch) if ch == self.isr.bs_channel() => self.isr.bs_done(),
                Irq::Dma(ch) if ch == self.isr.i2s_channel() => self.isr.i2s_done(&mut self.soc),
                _ => {}
            }
        }
    }

    /// USB stack writes `packet` to the endpoint buffer and calls back.
    pub fn deliver(&mut self, packet: &[u8]) {
        let usb = self.soc.design().usb_buf;
        self.soc.write(usb.base(), packet);
        self.isr.on_samples_received(&mut self.soc, 0, packet.len() as u16);
    }

    /// Shift `n` bytes out of I2S and service its interrupts.
    pub fn play(&mut self, n: usize) -> Vec<u8> {
        self.soc.clock_i2s(n);
        self.dispatch();
        self.soc.take_i2s_output()
    }

    /// One 1 ms USB frame: packet, interrupts, main loop, one transfer out.
    pub fn frame(&mut self, packet: &[u8]) -> (Option<AudioBlock>, Vec<u8>) {
        self.deliver(packet);
        self.dispatch();
        let block = self.audio.service(&mut self.soc);
        let out = self.play(usize::from(AUDIO_OUT_TRANSFER_SIZE));
        (block, out)
    }

    /// Bytes of the audio ring.
    pub fn ring(&self, offset: u16, len: usize) -> Vec<u8> {
        let ring = self.soc.design().audio_buf;
        let mut out = vec![0u8; len];
        self.soc.read(ring.addr(offset), &mut out);
        out
    }
}

/// Little-endian stereo 24-bit packet, as USB delivers it.
pub fn s24_packet(frames: usize, sample: impl Fn(usize) -> (i32, i32)) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames * 6);
    for n in 0..frames {
        let (l, r) = sample(n);
        out.extend_from_slice(&l.to_le_bytes()[..3]);
        out.extend_from_slice(&r.to_le_bytes()[..3]);
    }
    out
}

/// Big-endian stereo 24-bit bytes, as the I2S transmitter shifts them.
pub fn s24_wire(frames: usize, sample: impl Fn(usize) -> (i32, i32)) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames * 6);
    for n in 0..frames {
        let (l, r) = sample(n);
        out.extend_from_slice(&l.to_be_bytes()[1..]);
        out.extend_from_slice(&r.to_be_bytes()[1..]);
    }
    out
}
