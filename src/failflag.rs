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

//! Operator fail-flag
//!
//! The external watchdog drops this file when it has had to cut power. Until
//! an operator confirms the hardware was restored and removes it, every
//! state-changing command is refused before any pin is touched.

use std::path::{Path, PathBuf};

use tracing::warn;
use wp_error::{Result, WaterPiError};

#[derive(Debug, Clone)]
pub struct FailFlag {
    path: PathBuf,
}

impl FailFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_set(&self) -> bool {
        self.path.exists()
    }

    pub fn check(&self) -> Result<()> {
        if self.is_set() {
            warn!("Fail flag present at {}", self.path.display());
            return Err(WaterPiError::FailFlagPresent(self.path.clone()));
        }
        Ok(())
    }
}
