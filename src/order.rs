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

//! Rental order state machine.
//!
//! Orders follow a single forward path with one rejection exit:
//!
//! ```text
//!  BOOKED ──approve──► APPROVED ──pickup──► IN_USE ──return──► RETURN_REQUESTED ──complete──► COMPLETED
//!    │                    │
//!    └──────reject────────┴──────────────► CANCELED
//! ```
//!
//! Every legal edge lives in [`transition`]; callers never compare status
//! values to decide what is allowed.

use crate::base::{OrderId, RenterId, StationId, VehicleId};
use crate::error::RentalError;
use crate::payment::PaymentStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Booked,
    Approved,
    InUse,
    ReturnRequested,
    Completed,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Booked,
        OrderStatus::Approved,
        OrderStatus::InUse,
        OrderStatus::ReturnRequested,
        OrderStatus::Completed,
        OrderStatus::Canceled,
    ];

    /// `COMPLETED` and `CANCELED` accept no further actions.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Canceled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Booked => "BOOKED",
            OrderStatus::Approved => "APPROVED",
            OrderStatus::InUse => "IN_USE",
            OrderStatus::ReturnRequested => "RETURN_REQUESTED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Canceled => "CANCELED",
        };
        f.write_str(name)
    }
}

/// Staff or renter action applied to an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Approve,
    Reject,
    Pickup,
    RequestReturn,
    Complete,
}

impl OrderAction {
    pub const ALL: [OrderAction; 5] = [
        OrderAction::Approve,
        OrderAction::Reject,
        OrderAction::Pickup,
        OrderAction::RequestReturn,
        OrderAction::Complete,
    ];
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderAction::Approve => "approve",
            OrderAction::Reject => "reject",
            OrderAction::Pickup => "pick up",
            OrderAction::RequestReturn => "return",
            OrderAction::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// What a transition does to the vehicle's availability flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleEffect {
    Unchanged,
    /// Flag set to `false`.
    Hold,
    /// Flag set to `true` and the vehicle freed for new bookings.
    Release,
}

/// A legal edge of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub vehicle: VehicleEffect,
}

/// Resolves `action` applied in status `from`.
///
/// # Errors
///
/// [`RentalError::InvalidTransition`] for every pair not in the table.
pub fn transition(from: OrderStatus, action: OrderAction) -> Result<Transition, RentalError> {
    use OrderAction as A;
    use OrderStatus as S;

    let (to, vehicle) = match (from, action) {
        (S::Booked, A::Approve) => (S::Approved, VehicleEffect::Unchanged),
        (S::Booked | S::Approved, A::Reject) => (S::Canceled, VehicleEffect::Release),
        (S::Approved, A::Pickup) => (S::InUse, VehicleEffect::Hold),
        (S::InUse, A::RequestReturn) => (S::ReturnRequested, VehicleEffect::Unchanged),
        (S::ReturnRequested, A::Complete) => (S::Completed, VehicleEffect::Release),
        _ => return Err(RentalError::InvalidTransition { from, action }),
    };

    Ok(Transition { from, to, vehicle })
}

/// One renter's reservation of one vehicle for a time window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RentalOrder {
    pub id: OrderId,
    pub renter_id: RenterId,
    pub vehicle_id: VehicleId,
    pub pickup_station: Option<StationId>,
    pub return_station: Option<StationId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Rental value: booked hours times the vehicle's hourly price.
    pub total_amount: Decimal,
    pub deposit_amount: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl RentalOrder {
    /// Value that percentage fees are applied to.
    pub fn rental_value(&self) -> Decimal {
        self.total_amount
    }

    /// Whether the order still holds its vehicle.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Resolves `action` against the current status without mutating.
    pub fn plan(&self, action: OrderAction) -> Result<Transition, RentalError> {
        transition(self.status, action)
    }
}
