//! Simulated 8-channel, 10-bit analog input.
//!
//! A conversion is requested by channel number; a background conversion
//! thread (standing in for the ADC-complete interrupt) finishes it a
//! short while later through a [`CompletionSlot`]. Readers block until
//! the value arrives or the request times out.

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use log::{info, warn};

use crate::resource::CompletionSlot;

pub const ADC_CHANNELS: u32 = 8;
pub const ADC_MAX: u16 = 1023;

const CONVERSION_TIME: Duration = Duration::from_micros(200);

/// How the simulated inputs move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcSignal {
    /// Each channel holds whatever was last set with
    /// [`SimulatedAdc::set_level`].
    Fixed,
    /// Each channel sweeps a triangle wave, phase-shifted per channel.
    Sweep,
}

pub struct SimulatedAdc {
    slot: Arc<CompletionSlot<u16>>,
    requests: mpsc::Sender<(u32, u8)>,
    levels: Arc<[AtomicU16; ADC_CHANNELS as usize]>,
    timeout: Duration,
}

impl SimulatedAdc {
    /// Start the conversion thread. It exits once the ADC is dropped.
    pub fn spawn(signal: AdcSignal, timeout: Duration) -> std::io::Result<Self> {
        let slot = Arc::new(CompletionSlot::new());
        let levels: Arc<[AtomicU16; ADC_CHANNELS as usize]> =
            Arc::new(core::array::from_fn(|_| AtomicU16::new(0)));
        let (requests, pending) = mpsc::channel::<(u32, u8)>();

        let done = slot.clone();
        let held = levels.clone();
        thread::Builder::new()
            .name("adc-sim".into())
            .spawn(move || {
                let start = Instant::now();
                for (ticket, channel) in pending {
                    thread::sleep(CONVERSION_TIME);
                    let value = match signal {
                        AdcSignal::Fixed => held[channel as usize].load(Ordering::Relaxed),
                        AdcSignal::Sweep => sweep(start.elapsed(), channel),
                    };
                    done.complete(ticket, value);
                }
            })?;

        info!("ADC: simulated, {} channels, {:?}", ADC_CHANNELS, signal);
        Ok(Self {
            slot,
            requests,
            levels,
            timeout,
        })
    }

    /// Level returned by a `Fixed` channel.
    pub fn set_level(&self, channel: u32, value: u16) {
        if let Some(level) = self.levels.get(channel as usize) {
            level.store(value.min(ADC_MAX), Ordering::Relaxed);
        }
    }

    /// Convert one channel. `None` for a bad channel or a timeout.
    pub fn read(&self, channel: u32) -> Option<u16> {
        if channel >= ADC_CHANNELS {
            return None;
        }
        self.slot.request_blocking(
            |ticket| {
                if self.requests.send((ticket, channel as u8)).is_err() {
                    warn!("ADC: conversion thread gone");
                }
            },
            self.timeout,
        )
    }
}

fn sweep(elapsed: Duration, channel: u8) -> u16 {
    let phase = (elapsed.as_millis() / 16 + u128::from(channel) * 128) % 2048;
    let phase = phase as u16;
    if phase <= ADC_MAX { phase } else { 2047 - phase }
}
