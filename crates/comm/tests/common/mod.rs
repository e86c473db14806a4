//! Serial channel wired to the simulated SoC.

#![allow(dead_code)]

use comm::{rx_spy_start, Comm, CommConfig, CommIsr, CommShared};
use platform::sim::{Irq, SimSoc};

pub struct Rig<'a> {
    pub soc: SimSoc,
    pub comm: Comm<'a>,
    pub isr: CommIsr<'a>,
}

impl<'a> Rig<'a> {
    pub fn new(shared: &'a CommShared) -> Self {
        Self::with_config(shared, |_| {})
    }

    pub fn with_config(shared: &'a CommShared, tweak: impl FnOnce(&mut CommConfig)) -> Self {
        let mut soc = SimSoc::new();
        let mut config = CommConfig::from_design(&soc.design());
        tweak(&mut config);
        let (mut comm, isr) = Comm::create(&mut soc, shared, config).unwrap();
        rx_spy_start(&mut soc, config.delimiter, config.rx_transfer_size);
        comm.start(&mut soc);
        Self { soc, comm, isr }
    }

    /// Run every pending interrupt handler.
    pub fn dispatch(&mut self) {
        while let Some(irq) = self.soc.take_irq() {
            match irq {
                Irq::Dma(ch) if ch == self.isr.tx_channel() => self.isr.tx_isr(&mut self.soc),
                Irq::Dma(ch) if ch == self.isr.rx_channel() => self.isr.rx_isr(&mut self.soc),
                Irq::Spy => self.isr.rx_isr(&mut self.soc),
                Irq::Dma(_) => {}
            }
        }
    }

    /// Clock the UART until everything queued has left, returning the wire bytes.
    pub fn drain_wire(&mut self) -> Vec<u8> {
        for _ in 0..100_000 {
            let shifted = self.soc.clock_uart_tx(64);
            self.dispatch();
            if shifted == 0 && self.comm.tx_idle() {
                return self.soc.take_wire_output();
            }
        }
        panic!("transmitter never went idle");
    }

    /// Host sends `bytes`, interrupts serviced every `chunk` bytes.
    pub fn receive_in(&mut self, bytes: &[u8], chunk: usize) {
        for piece in bytes.chunks(chunk) {
            self.soc.uart_receive(piece);
            self.dispatch();
        }
    }

    pub fn receive(&mut self, bytes: &[u8]) {
        self.receive_in(bytes, 128);
    }

    pub fn idle(&mut self) {
        self.soc.uart_idle(platform::config::IDLE_FLUSH_TICKS);
        self.dispatch();
    }

    /// Main loop: take everything consumable, then re-arm the spy.
    pub fn read_all(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = self.comm.rx_service(&self.soc, &mut buf);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        self.comm.rx_resume(&mut self.soc);
        out
    }
}
