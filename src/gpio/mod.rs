/*
 * This file is part of WaterPi.
 *
 * Copyright (C) 2025 WaterPi contributors
 *
 * WaterPi is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * WaterPi is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with WaterPi. If not, see <https://www.gnu.org/licenses/>.
 */

//! GPIO driver interface
//!
//! The actuation core only ever talks to pins through [`GpioDriver`]. The
//! wiring is active-low throughout: driving a pin low lets current flow
//! through that leg, driving it high cuts it.
//!
//! # Signal safety
//!
//! [`GpioDriver::configure_pin_output`] and [`GpioDriver::write_pin`] are
//! called from the fatal-signal handler. Implementations must not allocate,
//! lock, or block beyond the pin access itself in those two methods.

pub mod sysfs;

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

pub use sysfs::SysfsGpio;

/// BCM GPIO number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinId(pub u32);

impl PinId {
    pub fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

/// Electrical level of an output pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinLevel {
    High,
    Low,
}

impl PinLevel {
    /// Leg disabled (active-low: high)
    pub const OFF: PinLevel = PinLevel::High;
    /// Leg energized (active-low: low)
    pub const ON: PinLevel = PinLevel::Low;

    pub fn is_on(self) -> bool {
        self == Self::ON
    }

    pub fn is_off(self) -> bool {
        self == Self::OFF
    }
}

impl fmt::Display for PinLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinLevel::High => f.write_str("high"),
            PinLevel::Low => f.write_str("low"),
        }
    }
}

/// Raw pin access used by the actuation core
#[cfg_attr(test, mockall::automock)]
pub trait GpioDriver: Send + Sync {
    /// Read the level a pin is currently driven to.
    fn read_pin(&self, pin: PinId) -> io::Result<PinLevel>;

    /// Switch a pin to output, starting at `initial` without an intermediate glitch.
    fn configure_pin_output(&self, pin: PinId, initial: PinLevel) -> io::Result<()>;

    /// Drive an output pin.
    fn write_pin(&self, pin: PinId, level: PinLevel) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiring_is_active_low() {
        assert_eq!(PinLevel::OFF, PinLevel::High);
        assert_eq!(PinLevel::ON, PinLevel::Low);
        assert!(PinLevel::Low.is_on());
        assert!(PinLevel::High.is_off());
    }

    #[test]
    fn pin_id_display() {
        assert_eq!(PinId(17).to_string(), "GPIO17");
        assert_eq!(PinId(27).number(), 27);
    }

    #[test]
    fn pin_id_deserializes_from_bare_number() {
        let pin: PinId = serde_json::from_str("23").unwrap();
        assert_eq!(pin, PinId(23));
    }
}
