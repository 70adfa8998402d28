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

//! Styled terminal output
//!
//! User-facing lines carry a cyan `[WaterPi]` prefix; diagnostics go through
//! `tracing` instead. None of this is used from the signal handler.

use std::fmt::Display;

use crossterm::style::{Color, StyledContent, Stylize};

use crate::gpio::PinLevel;

fn prefix() -> StyledContent<&'static str> {
    "[WaterPi] ".cyan().bold()
}

/// Normal status line
pub fn print_l(msg: impl Display) {
    println!("{}{}", prefix(), msg);
}

/// Error line
pub fn eprint(msg: impl Display) {
    eprintln!("{}", msg.to_string().red().bold());
}

/// Low-importance line
pub fn dprint(msg: impl Display) {
    println!("{}", msg.to_string().dim());
}

/// Highlighted line in a chosen color
pub fn notice(msg: impl Display, color: Color) {
    println!("{}", msg.to_string().with(color).bold());
}

/// The fallback banner. Deliberately distinct from every other line.
pub fn alarm(msg: impl Display) {
    eprintln!("{}", msg.to_string().red().bold().underlined());
}

pub fn level_label(level: PinLevel) -> StyledContent<&'static str> {
    if level.is_on() {
        "On".green().bold()
    } else {
        "Off".red().bold().dim()
    }
}
