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

//! Layered configuration.
//!
//! Loaded with increasing priority:
//! 1. Compiled-in defaults (gateway sandbox, local bind address)
//! 2. TOML configuration file (if provided)
//! 3. Environment variable overrides (prefix `RENTAL_`, nested with `__`)
//! 4. `RENTAL_GATEWAY_SECRET` for the gateway hash secret
//!
//! The hash secret must come from the environment, never from a file.

use crate::catalog::CatalogConfig;
use crate::engine::EngineConfig;
use crate::gateway::GatewayConfig;
use anyhow::{Context, Result, bail};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable carrying the gateway hash secret.
pub const SECRET_ENV: &str = "RENTAL_GATEWAY_SECRET";

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_client_ip() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Reported to the gateway when the request carries no forwarded address.
    #[serde(default = "default_client_ip")]
    pub default_client_ip: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Structured JSON output instead of pretty text.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from defaults, an optional file and the environment.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, a value has the wrong type, or
    /// validation rejects the result.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        Self::load_with_secret(config_path, std::env::var(SECRET_ENV).ok())
    }

    fn load_with_secret(config_path: Option<PathBuf>, secret: Option<String>) -> Result<Self> {
        let mut builder = Config::builder()
            // ── Layer 1: compiled-in defaults ───────────────────────
            .set_default(
                "gateway.payment_url",
                "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html",
            )?
            .set_default("gateway.merchant_code", "")?
            .set_default("gateway.hash_secret", "")?
            .set_default("gateway.return_url", "http://127.0.0.1:3000/payments/callback")?
            .set_default("gateway.version", "2.1.0")?
            .set_default("gateway.command", "pay")?
            .set_default("gateway.currency", "VND")?
            .set_default("gateway.locale", "vn")?
            .set_default("gateway.order_type", "other")?
            .set_default("gateway.utc_offset_hours", 7)?
            .set_default("gateway.amount_scale", 100)?
            .set_default("gateway.expire_minutes", 15)?
            .set_default("server.bind_addr", default_bind_addr())?
            .set_default("server.default_client_ip", default_client_ip())?;

        // ── Layer 2: optional TOML file ─────────────────────────────
        if let Some(path) = &config_path {
            let path_str = path
                .to_str()
                .context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::with_name(path_str).required(true));
        }

        // ── Layer 3: env var overrides (RENTAL_ prefix) ────────────
        builder = builder.add_source(
            Environment::with_prefix("RENTAL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        // ── Layer 4: dedicated secret env var ──────────────────────
        if let Some(secret) = secret {
            config.gateway.hash_secret = secret;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.gateway.merchant_code.trim().is_empty() {
            bail!("gateway merchant code is required");
        }
        if self.gateway.hash_secret.is_empty() {
            bail!("gateway hash secret is required (set {SECRET_ENV})");
        }
        if self.gateway.amount_scale == 0 {
            bail!("gateway amount scale must be positive");
        }
        if self.engine.lock_retries == 0 {
            bail!("engine lock retries must be at least 1");
        }
        Ok(())
    }
}
