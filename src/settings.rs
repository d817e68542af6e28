// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine configuration, loaded through the `config` crate.

use serde::Deserialize;
use std::time::Duration;

/// Tunables for the settlement engine. Every field has a default.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bounded wait for a customer's writer lock, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Domains expiring within this many days are due for renewal.
    #[serde(default = "default_renewal_horizon_days")]
    pub renewal_horizon_days: i64,
    /// Projects whose AMC falls due within this many days are listed as due.
    #[serde(default = "default_amc_horizon_days")]
    pub amc_horizon_days: i64,
    /// Reject renewals whose new validity date is not after today.
    #[serde(default = "default_require_future_validity")]
    pub require_future_validity: bool,
    /// Page size for ledger listings when the caller does not choose one.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

fn default_lock_timeout_ms() -> u64 {
    250
}

fn default_renewal_horizon_days() -> i64 {
    30
}

fn default_amc_horizon_days() -> i64 {
    30
}

fn default_require_future_validity() -> bool {
    true
}

fn default_page_size() -> usize {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            renewal_horizon_days: default_renewal_horizon_days(),
            amc_horizon_days: default_amc_horizon_days(),
            require_future_validity: default_require_future_validity(),
            default_page_size: default_page_size(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `config/ledger.toml` (optional) and
    /// `AGENCY_LEDGER__*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is malformed or a value has the wrong type.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config/ledger")
    }

    /// Like [`EngineConfig::load`] with an explicit file stem.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is malformed or a value has the wrong type.
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("AGENCY_LEDGER").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
