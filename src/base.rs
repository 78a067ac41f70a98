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

//! Core identifier types for orders, vehicles, payments and their collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Unique identifier for a rental order.
    OrderId
);
numeric_id!(
    /// Unique identifier for a vehicle.
    VehicleId
);
numeric_id!(
    /// Unique identifier for a renter (issued by the account service).
    RenterId
);
numeric_id!(
    /// Unique identifier for a pickup/return station.
    StationId
);
numeric_id!(
    /// Unique identifier for a payment row.
    PaymentId
);
numeric_id!(
    /// Unique identifier for a fee-type catalog entry.
    FeeTypeId
);
numeric_id!(
    /// Unique identifier for a persisted extra fee.
    ExtraFeeId
);

/// Gateway transaction reference.
///
/// The idempotency key that links an outbound payment or refund request to
/// the callback the gateway eventually delivers. Must be unique across all
/// payment rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TxnRef(String);

impl TxnRef {
    /// Generates a fresh random reference (32 lowercase hex characters).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TxnRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TxnRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TxnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
