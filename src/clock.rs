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

//! Time source for sequencing delays and watchdog polling

use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock plus a blocking sleep.
///
/// Production code uses [`SystemClock`]; tests substitute a virtual clock so
/// settle delays and deadlines can be checked without waiting on them.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
