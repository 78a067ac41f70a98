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

//! Rental order engine.
//!
//! The [`RentalEngine`] is the entry point for every renter, staff and
//! gateway request. It composes the availability guard, the order state
//! machine, the payment gateway adapter and the settlement coordinator over a
//! shared [`Store`].
//!
//! # Request handling
//!
//! - **Booking**: validated by [`check_bookable`], then inserted with an
//!   atomic vehicle claim.
//! - **Staff/renter actions**: approve, reject, pickup and return requests
//!   run as one locked read-modify-write of the order.
//! - **Payments**: the renter pays rental total plus deposit through a signed
//!   redirect.
//! - **Callbacks**: verified, matched by transaction reference and applied at
//!   most once.
//!
//! # Thread Safety
//!
//! Transitions on the same order serialize on the order's lock; callbacks for
//! an order take the same lock, so a payment flip and its order effect are
//! applied together.

use crate::availability::check_bookable;
use crate::base::{FeeTypeId, OrderId, RenterId, StationId, VehicleId};
use crate::error::{Entity, RentalError};
use crate::fee::ExtraFee;
use crate::gateway::{PaymentGateway, PaymentRedirect, Reconciliation};
use crate::order::{OrderAction, RentalOrder};
use crate::payment::{Payment, PaymentKind, PaymentStatus};
use crate::store::{NewOrder, Store};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn default_lock_timeout_ms() -> u64 {
    250
}

fn default_lock_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Fee type whose rate is charged per whole hour of late return.
    #[serde(default)]
    pub late_fee_type: Option<FeeTypeId>,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            late_fee_type: None,
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_retries: default_lock_retries(),
        }
    }
}

impl EngineConfig {
    /// Builds an empty store using this lock policy.
    pub fn store(&self) -> Store {
        Store::with_lock_policy(
            std::time::Duration::from_millis(self.lock_timeout_ms),
            self.lock_retries,
        )
    }
}

/// Renter booking request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BookingRequest {
    pub renter_id: RenterId,
    pub vehicle_id: VehicleId,
    #[serde(default)]
    pub pickup_station: Option<StationId>,
    #[serde(default)]
    pub return_station: Option<StationId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Billable hours for a window: started hours count, minimum one.
pub fn billable_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let seconds = (end - start).num_seconds().max(0);
    ((seconds + 3599) / 3600).max(1)
}

pub struct RentalEngine {
    store: Arc<Store>,
    gateway: PaymentGateway,
    pub(crate) late_fee_type: Option<FeeTypeId>,
}

impl RentalEngine {
    pub fn new(store: Arc<Store>, gateway: PaymentGateway, config: &EngineConfig) -> Self {
        Self {
            store,
            gateway,
            late_fee_type: config.late_fee_type,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn gateway(&self) -> &PaymentGateway {
        &self.gateway
    }

    /// Books a vehicle, creating a `BOOKED` order.
    ///
    /// # Errors
    ///
    /// - [`RentalError::NotFound`] - Unknown renter, vehicle or station.
    /// - [`RentalError::Unavailable`] - Vehicle flagged off or held by another order.
    /// - [`RentalError::InvalidWindow`] - Window in the past or empty.
    pub fn book(
        &self,
        request: BookingRequest,
        now: DateTime<Utc>,
    ) -> Result<RentalOrder, RentalError> {
        if self.store.renter(request.renter_id).is_none() {
            return Err(RentalError::NotFound(Entity::Renter));
        }
        check_bookable(
            &self.store,
            request.vehicle_id,
            request.start_time,
            request.end_time,
            now,
        )?;

        let vehicle = self
            .store
            .vehicle(request.vehicle_id)
            .ok_or(RentalError::NotFound(Entity::Vehicle))?;
        for station in [request.pickup_station, request.return_station]
            .into_iter()
            .flatten()
        {
            if self.store.station(station).is_none() {
                return Err(RentalError::NotFound(Entity::Station));
            }
        }

        let hours = billable_hours(request.start_time, request.end_time);
        let order = self.store.insert_order(NewOrder {
            renter_id: request.renter_id,
            vehicle_id: request.vehicle_id,
            pickup_station: Some(request.pickup_station.unwrap_or(vehicle.station_id)),
            return_station: request.return_station,
            start_time: request.start_time,
            end_time: request.end_time,
            total_amount: vehicle.price_per_hour * Decimal::from(hours),
            deposit_amount: vehicle.deposit,
            created_at: now,
        })?;

        info!(
            order_id = %order.id,
            vehicle_id = %order.vehicle_id,
            renter_id = %order.renter_id,
            total = %order.total_amount,
            "order booked"
        );
        Ok(order)
    }

    pub fn approve(&self, order_id: OrderId) -> Result<RentalOrder, RentalError> {
        self.apply(order_id, OrderAction::Approve)
    }

    pub fn reject(&self, order_id: OrderId) -> Result<RentalOrder, RentalError> {
        self.apply(order_id, OrderAction::Reject)
    }

    pub fn pickup(&self, order_id: OrderId) -> Result<RentalOrder, RentalError> {
        self.apply(order_id, OrderAction::Pickup)
    }

    pub fn request_return(&self, order_id: OrderId) -> Result<RentalOrder, RentalError> {
        self.apply(order_id, OrderAction::RequestReturn)
    }

    /// Completion is reserved to the settlement path.
    fn apply(&self, order_id: OrderId, action: OrderAction) -> Result<RentalOrder, RentalError> {
        debug_assert_ne!(action, OrderAction::Complete);
        self.store.with_order(order_id, |order| {
            let transition = self.store.apply_transition(order, action)?;
            info!(
                order_id = %order_id,
                from = %transition.from,
                to = %transition.to,
                "order transitioned"
            );
            Ok(order.clone())
        })
    }

    pub fn order(&self, order_id: OrderId) -> Result<RentalOrder, RentalError> {
        self.store
            .order(order_id)
            .ok_or(RentalError::NotFound(Entity::Order))
    }

    pub fn orders_for_renter(&self, renter_id: RenterId) -> Vec<RentalOrder> {
        self.store.orders_for_renter(renter_id)
    }

    pub fn payments_for_order(&self, order_id: OrderId) -> Vec<Payment> {
        self.store.payments().for_order(order_id)
    }

    pub fn extra_fees_for_order(&self, order_id: OrderId) -> Vec<ExtraFee> {
        self.store.extra_fees(order_id)
    }

    /// `UNPAID` payments issued more than `max_age` ago.
    pub fn stale_payments(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<Payment> {
        self.store.payments().unpaid_before(now - max_age)
    }

    /// Issues a redirect for the renter to pay rental total plus deposit.
    ///
    /// Each call creates a new attempt with its own reference; earlier
    /// unpaid attempts stay as they are.
    ///
    /// # Errors
    ///
    /// - [`RentalError::NotFound`] - Unknown order.
    /// - [`RentalError::OrderClosed`] - Order completed or canceled.
    /// - [`RentalError::AlreadyPaid`] - Order payment already reconciled.
    pub fn initiate_order_payment(
        &self,
        order_id: OrderId,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentRedirect, RentalError> {
        self.store.with_order(order_id, |order| {
            if order.status.is_terminal() {
                return Err(RentalError::OrderClosed(order.status));
            }
            if order.payment_status == PaymentStatus::Paid {
                return Err(RentalError::AlreadyPaid);
            }
            self.gateway.initiate(
                self.store.payments(),
                order_id,
                order.total_amount + order.deposit_amount,
                PaymentKind::Pay,
                &format!("Payment for rental order {order_id}"),
                client_ip,
                now,
            )
        })
    }

    /// Verifies and reconciles a gateway callback.
    ///
    /// A successful response code flips the payment to `PAID` and applies its
    /// order effect exactly once: `PAY` marks the order paid, `REFUND` and
    /// `BONUS_FEE` complete the pending return. Any other code marks the
    /// attempt `FAILED`. Redelivery of an already applied callback returns
    /// the same reconciliation without side effects.
    ///
    /// # Errors
    ///
    /// - [`RentalError::InvalidSignature`] - Hash mismatch; nothing changes.
    /// - [`RentalError::UnknownTransaction`] - No payment for the reference.
    /// - [`RentalError::AmountMismatch`] - Amount differs from the payment row.
    pub fn handle_callback(
        &self,
        query: &HashMap<String, String>,
    ) -> Result<Reconciliation, RentalError> {
        let callback = self.gateway.verify_callback(query)?;
        let payment = self
            .store
            .payments()
            .find_by_ref(&callback.txn_ref)
            .ok_or_else(|| {
                warn!(txn_ref = %callback.txn_ref, "callback for unknown transaction");
                RentalError::UnknownTransaction
            })?;
        if callback.amount != payment.amount {
            warn!(
                txn_ref = %callback.txn_ref,
                expected = %payment.amount,
                received = %callback.amount,
                "callback amount mismatch"
            );
            return Err(RentalError::AmountMismatch);
        }

        self.store.with_order(payment.order_id, |order| {
            let mut reconciliation = Reconciliation {
                order_id: payment.order_id,
                txn_ref: payment.txn_ref.clone(),
                kind: payment.kind,
                amount: payment.amount,
                response_code: callback.response_code.clone(),
                paid: false,
            };

            if !callback.succeeded() {
                if self.store.payments().mark_failed(payment.id)? {
                    info!(
                        txn_ref = %payment.txn_ref,
                        response_code = %callback.response_code,
                        "gateway reported unsuccessful payment"
                    );
                }
                reconciliation.paid = self
                    .store
                    .payments()
                    .get(payment.id)
                    .is_some_and(|p| p.is_paid());
                return Ok(reconciliation);
            }

            if self.store.payments().mark_paid(payment.id)? {
                info!(
                    order_id = %order.id,
                    txn_ref = %payment.txn_ref,
                    kind = %payment.kind,
                    amount = %payment.amount,
                    "payment reconciled"
                );
                match payment.kind {
                    PaymentKind::Pay => order.payment_status = PaymentStatus::Paid,
                    PaymentKind::Refund | PaymentKind::BonusFee => {
                        self.finish_return(order, &payment);
                    }
                }
            } else if self
                .store
                .payments()
                .get(payment.id)
                .is_some_and(|p| p.is_failed())
            {
                warn!(
                    txn_ref = %payment.txn_ref,
                    "success reported for a declined payment, ignoring"
                );
                return Ok(reconciliation);
            } else {
                debug!(txn_ref = %payment.txn_ref, "duplicate callback ignored");
            }

            reconciliation.paid = true;
            Ok(reconciliation)
        })
    }
}
