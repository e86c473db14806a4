//! Booted firmware wired to the simulated SoC and a scripted host.

#![allow(dead_code)]

use std::collections::VecDeque;

use firmware::{
    boot, AltSetting, BootConfig, Firmware, Interrupt, Interrupts, KnobSample, KnobSampler, Shared,
    StepReport, UsbAudio,
};
use platform::config::IDLE_FLUSH_TICKS;
use platform::sim::{Irq, SimSoc};
use platform::Memory;

/// Knob scans handed out one per main-loop pass.
#[derive(Default)]
pub struct Knobs {
    pub scans: VecDeque<KnobSample>,
}

impl KnobSampler for Knobs {
    fn take(&mut self) -> Option<KnobSample> {
        self.scans.pop_front()
    }
}

/// USB device state as the host left it.
pub struct Usb {
    pub configured: bool,
    pub alt: AltSetting,
}

impl Default for Usb {
    fn default() -> Self {
        Self {
            configured: true,
            alt: AltSetting::Pcm24,
        }
    }
}

impl UsbAudio for Usb {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn alt_setting(&self) -> AltSetting {
        self.alt
    }
}

pub struct Bench<'a> {
    pub soc: SimSoc,
    pub fw: Firmware<'a>,
    pub irqs: Interrupts<'a>,
    pub knobs: Knobs,
    pub usb: Usb,
}

impl<'a> Bench<'a> {
    pub fn new(shared: &'a Shared) -> Self {
        let mut soc = SimSoc::new();
        let config = BootConfig::from_design(&soc.design());
        let (fw, irqs) = boot(&mut soc, shared, config).unwrap();
        Self {
            soc,
            fw,
            irqs,
            knobs: Knobs::default(),
            usb: Usb::default(),
        }
    }

    /// Run every pending interrupt handler.
    pub fn dispatch(&mut self) {
        while let Some(irq) = self.soc.take_irq() {
            let irq = match irq {
                Irq::Dma(ch) => Interrupt::Dma(ch),
                Irq::Spy => Interrupt::Spy,
            };
            self.irqs.dispatch(&mut self.soc, irq);
        }
    }

    /// One main-loop pass with interrupts serviced on either side.
    pub fn step(&mut self) -> StepReport {
        self.dispatch();
        let report = self.fw.step(&mut self.soc, &mut self.knobs, &self.usb);
        self.dispatch();
        report
    }

    /// Host writes `bytes` to the UART.
    pub fn host_send(&mut self, bytes: &[u8]) {
        self.soc.uart_receive(bytes);
        self.dispatch();
    }

    /// The receive line goes quiet long enough to flush.
    pub fn idle(&mut self) {
        self.soc.uart_idle(IDLE_FLUSH_TICKS);
        self.dispatch();
    }

    /// Clock the UART until the transmitter is idle, returning the wire bytes.
    pub fn drain_wire(&mut self) -> Vec<u8> {
        for _ in 0..100_000 {
            let shifted = self.soc.clock_uart_tx(64);
            self.dispatch();
            if shifted == 0 && self.fw.comm().tx_idle() {
                return self.soc.take_wire_output();
            }
        }
        panic!("transmitter never went idle");
    }

    /// Frames the host has received, delimiters stripped.
    pub fn frames(&mut self) -> Vec<Vec<u8>> {
        let wire = self.drain_wire();
        let mut frames: Vec<Vec<u8>> = wire.split(|&b| b == b'\n').map(<[u8]>::to_vec).collect();
        assert_eq!(frames.pop(), Some(Vec::new()), "wire ends mid-frame: {wire:?}");
        frames
    }

    /// Text frames the host has received.
    pub fn lines(&mut self) -> Vec<String> {
        self.frames().into_iter().map(|f| String::from_utf8(f).unwrap()).collect()
    }

    /// Send one command line, run the main loop once, return the replies.
    pub fn command(&mut self, line: &str) -> Vec<String> {
        self.host_send(format!("{line}\n").as_bytes());
        self.step();
        self.lines()
    }

    /// USB stack writes `packet` to the endpoint buffer and calls back.
    pub fn deliver(&mut self, packet: &[u8]) {
        let usb = self.soc.design().usb_buf;
        self.soc.write(usb.base(), packet);
        self.irqs.on_usb_packet(&mut self.soc, 0, packet.len() as u16);
        self.dispatch();
    }

    /// Shift `n` bytes out of I2S.
    pub fn play(&mut self, n: usize) -> Vec<u8> {
        self.soc.clock_i2s(n);
        self.dispatch();
        self.soc.take_i2s_output()
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
