//! Simulated board: peripherals wired into an address tree.
//!
//! ```text
//!   /analogin/{0..7}/value        read → 10-bit sample (autosend source)
//!   /analogin/{0..7}/autosend     0/1
//!   /led/state                    read/write 0/1
//!   /system/autosend-interval     1..=5000 ms
//!   /system/name                  read → board name
//!   /system/version               read → crate version
//! ```

use std::sync::Arc;

use log::{info, warn};

use crate::app::ports::SharedStore;
use crate::autosend::{AutosendState, Autosender};
use crate::config::ProtocolConfig;
use crate::drivers::adc::{ADC_CHANNELS, SimulatedAdc};
use crate::drivers::led::Led;
use crate::error::Result;
use crate::osc::engine::Dispatcher;
use crate::osc::types::Argument;
use crate::tree::{AddressTree, NodeId, TreeBuilder, getter, handler};

pub const DEFAULT_BOARD_NAME: &str = "oscdev-sim";

/// A fully assembled device: frozen tree plus the two protocol actors.
pub struct Board {
    pub tree: Arc<AddressTree>,
    pub dispatcher: Dispatcher,
    pub autosender: Autosender,
    pub led: Led,
    pub adc: Arc<SimulatedAdc>,
    /// The `/analogin/N/value` leaf.
    pub analog_value: NodeId,
}

impl Board {
    pub fn assemble(
        config: &ProtocolConfig,
        store: SharedStore,
        name: &str,
        adc: SimulatedAdc,
    ) -> Result<Self> {
        let adc = Arc::new(adc);
        let led = Led::new();
        let autosend = AutosendState::new(store, config.autosend_interval_ms);
        let mut b = TreeBuilder::new();

        let read_adc = adc.clone();
        let sample_adc = adc.clone();
        let analog_value = b.register(
            &["analogin", "value"],
            Some(ADC_CHANNELS),
            handler(move |index, args| {
                let channel = u32::try_from(index?).ok()?;
                if !args.is_empty() {
                    warn!("OSC: /analogin/{}/value is read-only", channel);
                    return None;
                }
                read_adc.read(channel).map(|v| Argument::Int32(i32::from(v)))
            }),
            Some(getter(move |channel| {
                sample_adc.read(channel).map(|v| Argument::Int32(i32::from(v)))
            })),
        )?;
        autosend.attach(&mut b, analog_value)?;

        let state_led = led.clone();
        b.register(
            &["led", "state"],
            None,
            handler(move |_, args| match args.first() {
                None => Some(Argument::Int32(i32::from(state_led.is_on()))),
                Some(arg) => {
                    match arg.as_i32() {
                        Some(v) => state_led.set(v != 0),
                        None => warn!("OSC: /led/state expects a number, got {}", arg),
                    }
                    None
                }
            }),
            None,
        )?;

        autosend.attach_interval_control(&mut b, &["system", "autosend-interval"])?;

        let board_name = name.to_owned();
        b.register(
            &["system", "name"],
            None,
            handler(move |_, _| Some(Argument::from(board_name.as_str()))),
            None,
        )?;
        b.register(
            &["system", "version"],
            None,
            handler(|_, _| Some(Argument::from(env!("CARGO_PKG_VERSION")))),
            None,
        )?;

        let tree = Arc::new(b.build());
        info!("OSC: board '{}' assembled", name);
        Ok(Self {
            dispatcher: Dispatcher::new(tree.clone(), config),
            autosender: Autosender::new(tree.clone(), autosend),
            tree,
            led,
            adc,
            analog_value,
        })
    }
}
