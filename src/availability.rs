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

//! Booking admission checks.
//!
//! [`check_bookable`] is read-only. Its answer can be stale by the time an
//! order is inserted, so [`Store::insert_order`](crate::store::Store::insert_order)
//! re-checks the vehicle under its own lock.

use crate::base::VehicleId;
use crate::error::{Entity, RentalError};
use crate::store::Store;
use chrono::{DateTime, Utc};

/// Validates a booking request, in order: vehicle exists, vehicle is
/// available, window does not start in the past, window is non-empty.
///
/// # Errors
///
/// - [`RentalError::NotFound`] - Unknown vehicle.
/// - [`RentalError::Unavailable`] - Vehicle availability flag is off.
/// - [`RentalError::InvalidWindow`] - `start < now` or `start >= end`.
pub fn check_bookable(
    store: &Store,
    vehicle_id: VehicleId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), RentalError> {
    let vehicle = store
        .vehicle(vehicle_id)
        .ok_or(RentalError::NotFound(Entity::Vehicle))?;
    if !vehicle.available {
        return Err(RentalError::Unavailable);
    }
    if start < now {
        return Err(RentalError::InvalidWindow);
    }
    if start >= end {
        return Err(RentalError::InvalidWindow);
    }
    Ok(())
}
