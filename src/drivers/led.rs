//! On/off LED.
//!
//! On the simulated board this only tracks state; clones share it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::info;

#[derive(Debug, Clone, Default)]
pub struct Led {
    on: Arc<AtomicBool>,
}

impl Led {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, on: bool) {
        if self.on.swap(on, Ordering::Relaxed) != on {
            info!("LED: {}", if on { "on" } else { "off" });
        }
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Relaxed)
    }
}
