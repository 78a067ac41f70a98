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

use anyhow::{Context, Result};
use clap::Parser;
use rental_engine_rs::config::AppConfig;
use rental_engine_rs::http::{AppState, router};
use rental_engine_rs::{PaymentGateway, RentalEngine, catalog, logging};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Rental Engine - Order lifecycle and payment reconciliation service
///
/// Serves booking, staff actions, renter payments and gateway callbacks over
/// HTTP. Secrets are read from the environment (`RENTAL_GATEWAY_SECRET`).
#[derive(Parser, Debug)]
#[command(name = "rental-engine")]
#[command(about = "Rental order and payment reconciliation service", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the listen address from configuration
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match AppConfig::load(args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if let Err(e) = logging::init_tracing(config.logging.json) {
        eprintln!("Error initializing logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run(config, args.bind).await {
        error!(error = %format!("{e:#}"), "rental engine stopped");
        process::exit(1);
    }
}

async fn run(config: AppConfig, bind: Option<String>) -> Result<()> {
    let store = Arc::new(config.engine.store());
    catalog::seed(&store, &config.catalog)?;

    let engine = RentalEngine::new(
        store,
        PaymentGateway::new(config.gateway.clone()),
        &config.engine,
    );
    let state = AppState {
        engine: Arc::new(engine),
        default_client_ip: config.server.default_client_ip.clone(),
    };

    let addr = bind.unwrap_or(config.server.bind_addr);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "rental engine listening");

    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}
