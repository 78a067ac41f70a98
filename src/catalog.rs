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

//! CSV seeding for the fleet and fee-type catalogs.
//!
//! Catalog data is owned by the admin side; the engine only needs a
//! snapshot at startup. Malformed rows are skipped and logged so one bad line
//! does not keep the service from starting.
//!
//! # CSV Format
//!
//! ```csv
//! id,name,rate
//! 1,Late return,0.01
//! 2,Cleaning,0.05
//! ```
//!
//! Vehicles use `id,station_id,price_per_hour,deposit,available`, stations
//! `id,name` and renters `id,name,email`.

use crate::fee::FeeType;
use crate::fleet::{Renter, Station, Vehicle};
use crate::store::Store;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Optional seed files.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogConfig {
    pub fee_types: Option<PathBuf>,
    pub vehicles: Option<PathBuf>,
    pub stations: Option<PathBuf>,
    pub renters: Option<PathBuf>,
}

/// Rows loaded per catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedCounts {
    pub fee_types: usize,
    pub vehicles: usize,
    pub stations: usize,
    pub renters: usize,
}

/// Parses records, skipping rows that fail to deserialize.
///
/// # Errors
///
/// Returns a CSV error only if the header cannot be read.
pub fn read_records<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);
    rdr.headers()?;

    let mut records = Vec::new();
    for (line, result) in rdr.deserialize::<T>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => warn!(row = line + 1, error = %e, "skipping malformed catalog row"),
        }
    }
    Ok(records)
}

pub fn load_fee_types<R: Read>(store: &Store, reader: R) -> Result<usize, csv::Error> {
    let rows: Vec<FeeType> = read_records(reader)?;
    let count = rows.len();
    rows.into_iter().for_each(|f| store.upsert_fee_type(f));
    Ok(count)
}

pub fn load_vehicles<R: Read>(store: &Store, reader: R) -> Result<usize, csv::Error> {
    let rows: Vec<Vehicle> = read_records(reader)?;
    let count = rows.len();
    rows.into_iter().for_each(|v| store.upsert_vehicle(v));
    Ok(count)
}

pub fn load_stations<R: Read>(store: &Store, reader: R) -> Result<usize, csv::Error> {
    let rows: Vec<Station> = read_records(reader)?;
    let count = rows.len();
    rows.into_iter().for_each(|s| store.upsert_station(s));
    Ok(count)
}

pub fn load_renters<R: Read>(store: &Store, reader: R) -> Result<usize, csv::Error> {
    let rows: Vec<Renter> = read_records(reader)?;
    let count = rows.len();
    rows.into_iter().for_each(|r| store.upsert_renter(r));
    Ok(count)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open catalog file '{}'", path.display()))?;
    Ok(BufReader::new(file))
}

/// Loads every configured seed file into `store`.
pub fn seed(store: &Store, config: &CatalogConfig) -> Result<SeedCounts> {
    let mut counts = SeedCounts::default();
    if let Some(path) = &config.stations {
        counts.stations = load_stations(store, open(path)?)
            .with_context(|| format!("failed to read stations from '{}'", path.display()))?;
    }
    if let Some(path) = &config.vehicles {
        counts.vehicles = load_vehicles(store, open(path)?)
            .with_context(|| format!("failed to read vehicles from '{}'", path.display()))?;
    }
    if let Some(path) = &config.renters {
        counts.renters = load_renters(store, open(path)?)
            .with_context(|| format!("failed to read renters from '{}'", path.display()))?;
    }
    if let Some(path) = &config.fee_types {
        counts.fee_types = load_fee_types(store, open(path)?)
            .with_context(|| format!("failed to read fee types from '{}'", path.display()))?;
    }
    info!(
        stations = counts.stations,
        vehicles = counts.vehicles,
        renters = counts.renters,
        fee_types = counts.fee_types,
        "catalog seeded"
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{FeeTypeId, StationId, VehicleId};
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    #[test]
    fn parse_fee_types() {
        let csv = "id,name,rate\n1,Late return,0.01\n2, Cleaning , 0.05\n";
        let store = Store::new();
        assert_eq!(load_fee_types(&store, Cursor::new(csv)).unwrap(), 2);
        let cleaning = store.fee_type(FeeTypeId(2)).unwrap();
        assert_eq!(cleaning.name, "Cleaning");
        assert_eq!(cleaning.rate.value(), dec!(0.05));
    }

    #[test]
    fn negative_rate_row_is_skipped() {
        let csv = "id,name,rate\n1,Bogus,-0.5\n2,Damage,0.1\n";
        let store = Store::new();
        assert_eq!(load_fee_types(&store, Cursor::new(csv)).unwrap(), 1);
        assert!(store.fee_type(FeeTypeId(1)).is_none());
    }

    #[test]
    fn parse_vehicles_and_skip_malformed() {
        let csv = "id,station_id,price_per_hour,deposit,available\n\
                   1,10,100000,300000,true\n\
                   oops,10,1,1,true\n\
                   2,11,80000,200000,false\n";
        let store = Store::new();
        assert_eq!(load_vehicles(&store, Cursor::new(csv)).unwrap(), 2);
        let v = store.vehicle(VehicleId(2)).unwrap();
        assert_eq!(v.station_id, StationId(11));
        assert!(!v.available);
    }

    #[test]
    fn seed_reports_missing_file() {
        let store = Store::new();
        let config = CatalogConfig {
            vehicles: Some(PathBuf::from("/nonexistent/vehicles.csv")),
            ..CatalogConfig::default()
        };
        let err = seed(&store, &config).unwrap_err();
        assert!(err.to_string().contains("vehicles.csv"));
    }
}
