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

//! # Rental Engine
//!
//! This library provides the order lifecycle and payment reconciliation
//! engine for station-based vehicle rental: booking, staff-driven order
//! transitions, signed gateway payments, and fee/deposit settlement at return.
//!
//! ## Core Components
//!
//! - [`RentalEngine`]: Entry point for booking, transitions, payments and callbacks
//! - [`OrderStatus`] / [`transition`]: The order state machine
//! - [`PaymentGateway`]: Signed redirect URLs and callback verification
//! - [`fee::calculate_settlement`]: Late/extra fees and deposit settlement
//! - [`Store`]: In-memory data-access handle with per-order locking
//! - [`RentalError`]: Error types for rejected requests
//!
//! ## Example
//!
//! ```
//! use rental_engine_rs::{OrderAction, OrderStatus, transition};
//!
//! let step = transition(OrderStatus::Booked, OrderAction::Approve).unwrap();
//! assert_eq!(step.to, OrderStatus::Approved);
//! assert!(transition(OrderStatus::Booked, OrderAction::Complete).is_err());
//! ```
//!
//! ## Thread Safety
//!
//! Orders are locked individually, so actions on different orders run in
//! parallel while actions and callbacks on the same order serialize.

pub mod availability;
mod base;
pub mod catalog;
pub mod config;
mod engine;
pub mod error;
pub mod fee;
pub mod fleet;
pub mod gateway;
pub mod http;
pub mod logging;
mod order;
mod payment;
pub mod payment_ledger;
mod settlement;
pub mod store;

pub use base::{
    ExtraFeeId, FeeTypeId, OrderId, PaymentId, RenterId, StationId, TxnRef, VehicleId,
};
pub use engine::{BookingRequest, EngineConfig, RentalEngine, billable_hours};
pub use error::{Entity, RentalError};
pub use gateway::{GatewayConfig, PaymentGateway, PaymentRedirect, Reconciliation};
pub use order::{OrderAction, OrderStatus, RentalOrder, Transition, VehicleEffect, transition};
pub use payment::{Payment, PaymentKind, PaymentStatus};
pub use settlement::ReturnOutcome;
pub use store::Store;
