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

//! Error types for booking, order transitions and payment reconciliation.

use crate::order::{OrderAction, OrderStatus};
use std::fmt;
use thiserror::Error;

/// Kind of record a [`RentalError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Order,
    Vehicle,
    Payment,
    Renter,
    Station,
    FeeType,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Order => "order",
            Entity::Vehicle => "vehicle",
            Entity::Payment => "payment",
            Entity::Renter => "renter",
            Entity::Station => "station",
            Entity::FeeType => "fee type",
        };
        f.write_str(name)
    }
}

/// Rental engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RentalError {
    /// Referenced order, vehicle, payment or catalog entry does not exist
    #[error("{0} not found")]
    NotFound(Entity),

    /// Booking window starts in the past or does not end after it starts
    #[error("invalid booking window")]
    InvalidWindow,

    /// Vehicle is not available for booking
    #[error("vehicle is not available")]
    Unavailable,

    /// Action is not legal from the order's current status
    #[error("cannot {action} an order that is {from}")]
    InvalidTransition {
        from: OrderStatus,
        action: OrderAction,
    },

    /// Gateway callback hash does not match the recomputed one
    #[error("invalid gateway signature")]
    InvalidSignature,

    /// Callback references no known payment
    #[error("unknown transaction reference")]
    UnknownTransaction,

    /// Callback amount differs from the recorded payment amount
    #[error("callback amount does not match payment")]
    AmountMismatch,

    /// Lost a race on an order mutation after bounded retries
    #[error("concurrent modification, retry later")]
    ConcurrencyConflict,

    /// Order rental payment already settled
    #[error("order is already paid")]
    AlreadyPaid,

    /// Order is completed or canceled
    #[error("order is {0}")]
    OrderClosed(OrderStatus),

    /// A return settlement payment is already awaiting reconciliation
    #[error("settlement already pending for this order")]
    SettlementPending,

    /// The gateway declined the settlement payment; it must be reissued
    #[error("settlement payment was declined")]
    SettlementDeclined,

    /// Amount is negative, zero where not allowed, or not representable by the gateway
    #[error("invalid amount")]
    InvalidAmount,

    /// Transaction reference already recorded
    #[error("duplicate transaction reference")]
    DuplicateTransaction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        assert_eq!(RentalError::NotFound(Entity::Vehicle).to_string(), "vehicle not found");
        assert_eq!(RentalError::NotFound(Entity::FeeType).to_string(), "fee type not found");
        assert_eq!(RentalError::InvalidWindow.to_string(), "invalid booking window");
        assert_eq!(RentalError::Unavailable.to_string(), "vehicle is not available");
        assert_eq!(
            RentalError::InvalidTransition {
                from: OrderStatus::Booked,
                action: OrderAction::Complete,
            }
            .to_string(),
            "cannot complete an order that is BOOKED"
        );
        assert_eq!(RentalError::InvalidSignature.to_string(), "invalid gateway signature");
        assert_eq!(
            RentalError::UnknownTransaction.to_string(),
            "unknown transaction reference"
        );
        assert_eq!(
            RentalError::ConcurrencyConflict.to_string(),
            "concurrent modification, retry later"
        );
        assert_eq!(
            RentalError::SettlementDeclined.to_string(),
            "settlement payment was declined"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = RentalError::Unavailable;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
