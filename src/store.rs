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

//! In-memory data-access handle.
//!
//! Holds the fleet catalog, orders, fees and the payment ledger. Orders live
//! behind individual [`Mutex`]es so transitions on one order serialize while
//! different orders proceed in parallel.
//!
//! # Lock ordering
//!
//! Order mutex, then `active_by_vehicle`, then `vehicles`. Booking never takes
//! an order mutex, so it starts at `active_by_vehicle`. Map references are
//! never held while waiting on an order mutex.

use crate::base::{ExtraFeeId, FeeTypeId, OrderId, RenterId, StationId, VehicleId};
use crate::error::{Entity, RentalError};
use crate::fee::{ExtraFee, FeeCharge, FeeType};
use crate::fleet::{Renter, Station, Vehicle};
use crate::order::{OrderAction, OrderStatus, RentalOrder, Transition, VehicleEffect};
use crate::payment::PaymentStatus;
use crate::payment_ledger::PaymentLedger;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// How long to wait on a contended order before retrying.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(250);

/// Lock attempts before giving up with [`RentalError::ConcurrencyConflict`].
pub const DEFAULT_LOCK_RETRIES: u32 = 3;

/// Fields of an order about to be booked.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub renter_id: RenterId,
    pub vehicle_id: VehicleId,
    pub pickup_station: Option<StationId>,
    pub return_station: Option<StationId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_amount: Decimal,
    pub deposit_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Store {
    vehicles: DashMap<VehicleId, Vehicle>,
    stations: DashMap<StationId, Station>,
    renters: DashMap<RenterId, Renter>,
    fee_types: DashMap<FeeTypeId, FeeType>,
    orders: DashMap<OrderId, Arc<Mutex<RentalOrder>>>,
    /// The single non-terminal order holding each vehicle.
    active_by_vehicle: DashMap<VehicleId, OrderId>,
    extra_fees: DashMap<OrderId, Vec<ExtraFee>>,
    payments: PaymentLedger,
    next_order_id: AtomicU64,
    next_fee_id: AtomicU64,
    lock_timeout: Duration,
    lock_retries: u32,
}

impl Store {
    pub fn new() -> Self {
        Self::with_lock_policy(DEFAULT_LOCK_TIMEOUT, DEFAULT_LOCK_RETRIES)
    }

    pub fn with_lock_policy(lock_timeout: Duration, lock_retries: u32) -> Self {
        Self {
            vehicles: DashMap::new(),
            stations: DashMap::new(),
            renters: DashMap::new(),
            fee_types: DashMap::new(),
            orders: DashMap::new(),
            active_by_vehicle: DashMap::new(),
            extra_fees: DashMap::new(),
            payments: PaymentLedger::new(),
            next_order_id: AtomicU64::new(1),
            next_fee_id: AtomicU64::new(1),
            lock_timeout,
            lock_retries: lock_retries.max(1),
        }
    }

    // === Catalog ===

    pub fn upsert_vehicle(&self, vehicle: Vehicle) {
        self.vehicles.insert(vehicle.id, vehicle);
    }

    pub fn upsert_station(&self, station: Station) {
        self.stations.insert(station.id, station);
    }

    pub fn upsert_renter(&self, renter: Renter) {
        self.renters.insert(renter.id, renter);
    }

    pub fn upsert_fee_type(&self, fee_type: FeeType) {
        self.fee_types.insert(fee_type.id, fee_type);
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<Vehicle> {
        self.vehicles.get(&id).map(|v| v.clone())
    }

    pub fn station(&self, id: StationId) -> Option<Station> {
        self.stations.get(&id).map(|s| s.clone())
    }

    pub fn renter(&self, id: RenterId) -> Option<Renter> {
        self.renters.get(&id).map(|r| r.clone())
    }

    pub fn fee_type(&self, id: FeeTypeId) -> Option<FeeType> {
        self.fee_types.get(&id).map(|f| f.clone())
    }

    /// Resolves every id or fails on the first unknown one.
    pub fn fee_types(&self, ids: &[FeeTypeId]) -> Result<Vec<FeeType>, RentalError> {
        ids.iter()
            .map(|id| self.fee_type(*id).ok_or(RentalError::NotFound(Entity::FeeType)))
            .collect()
    }

    // === Orders ===

    /// Inserts a `BOOKED` order and claims its vehicle.
    ///
    /// The claim is the data-layer uniqueness constraint: a vehicle already
    /// held by a non-terminal order, or whose flag is off, rejects the insert
    /// with no state change.
    ///
    /// # Errors
    ///
    /// - [`RentalError::Unavailable`] - Vehicle is held or flagged unavailable.
    /// - [`RentalError::NotFound`] - Unknown vehicle.
    pub fn insert_order(&self, new: NewOrder) -> Result<RentalOrder, RentalError> {
        match self.active_by_vehicle.entry(new.vehicle_id) {
            Entry::Occupied(_) => Err(RentalError::Unavailable),
            Entry::Vacant(slot) => {
                let mut vehicle = self
                    .vehicles
                    .get_mut(&new.vehicle_id)
                    .ok_or(RentalError::NotFound(Entity::Vehicle))?;
                if !vehicle.available {
                    return Err(RentalError::Unavailable);
                }

                let id = OrderId(self.next_order_id.fetch_add(1, Ordering::Relaxed));
                let order = RentalOrder {
                    id,
                    renter_id: new.renter_id,
                    vehicle_id: new.vehicle_id,
                    pickup_station: new.pickup_station,
                    return_station: new.return_station,
                    start_time: new.start_time,
                    end_time: new.end_time,
                    total_amount: new.total_amount,
                    deposit_amount: new.deposit_amount,
                    status: OrderStatus::Booked,
                    payment_status: PaymentStatus::Unpaid,
                    created_at: new.created_at,
                };

                vehicle.available = false;
                self.orders.insert(id, Arc::new(Mutex::new(order.clone())));
                slot.insert(id);
                Ok(order)
            }
        }
    }

    /// Snapshot of an order.
    pub fn order(&self, id: OrderId) -> Option<RentalOrder> {
        let cell = self.orders.get(&id).map(|c| Arc::clone(c.value()))?;
        let order = cell.lock().clone();
        Some(order)
    }

    pub fn orders_for_renter(&self, renter_id: RenterId) -> Vec<RentalOrder> {
        let cells: Vec<_> = self.orders.iter().map(|c| Arc::clone(c.value())).collect();
        let mut orders: Vec<RentalOrder> = cells
            .iter()
            .map(|c| c.lock().clone())
            .filter(|o| o.renter_id == renter_id)
            .collect();
        orders.sort_by_key(|o| o.id);
        orders
    }

    /// Non-terminal order currently holding `vehicle_id`.
    pub fn active_order_for_vehicle(&self, vehicle_id: VehicleId) -> Option<OrderId> {
        self.active_by_vehicle.get(&vehicle_id).map(|id| *id)
    }

    /// Runs `f` with exclusive access to the order.
    ///
    /// Waits up to the configured timeout per attempt and retries a bounded
    /// number of times. `f` must validate before mutating: an error return
    /// leaves whatever it already changed in place.
    ///
    /// # Errors
    ///
    /// - [`RentalError::NotFound`] - Unknown order.
    /// - [`RentalError::ConcurrencyConflict`] - Lock not acquired in time.
    /// - Any error returned by `f`.
    pub fn with_order<T>(
        &self,
        id: OrderId,
        f: impl FnOnce(&mut RentalOrder) -> Result<T, RentalError>,
    ) -> Result<T, RentalError> {
        let cell = self
            .orders
            .get(&id)
            .map(|c| Arc::clone(c.value()))
            .ok_or(RentalError::NotFound(Entity::Order))?;

        for attempt in 1..=self.lock_retries {
            if let Some(mut order) = cell.try_lock_for(self.lock_timeout) {
                return f(&mut order);
            }
            warn!(order_id = %id, attempt, "order lock contended");
        }
        Err(RentalError::ConcurrencyConflict)
    }

    /// Applies `action` to a locked order together with its vehicle effect.
    ///
    /// Call only from inside [`Store::with_order`]. Nothing is mutated when
    /// the action is illegal.
    pub fn apply_transition(
        &self,
        order: &mut RentalOrder,
        action: OrderAction,
    ) -> Result<Transition, RentalError> {
        let transition = order.plan(action)?;
        if transition.vehicle != VehicleEffect::Unchanged
            && !self.vehicles.contains_key(&order.vehicle_id)
        {
            return Err(RentalError::NotFound(Entity::Vehicle));
        }

        match transition.vehicle {
            VehicleEffect::Unchanged => {}
            VehicleEffect::Hold => {
                if let Some(mut vehicle) = self.vehicles.get_mut(&order.vehicle_id) {
                    vehicle.available = false;
                }
            }
            VehicleEffect::Release => {
                self.active_by_vehicle
                    .remove_if(&order.vehicle_id, |_, holder| *holder == order.id);
                if let Some(mut vehicle) = self.vehicles.get_mut(&order.vehicle_id) {
                    vehicle.available = true;
                    if transition.to == OrderStatus::Completed {
                        if let Some(station) = order.return_station {
                            vehicle.station_id = station;
                        }
                    }
                }
            }
        }

        order.status = transition.to;
        Ok(transition)
    }

    // === Fees ===

    /// Persists computed charges as immutable extra-fee rows.
    pub fn add_extra_fees(
        &self,
        order_id: OrderId,
        charges: &[FeeCharge],
        now: DateTime<Utc>,
    ) -> Vec<ExtraFee> {
        let fees: Vec<ExtraFee> = charges
            .iter()
            .map(|charge| ExtraFee {
                id: ExtraFeeId(self.next_fee_id.fetch_add(1, Ordering::Relaxed)),
                order_id,
                fee_type_id: charge.fee_type_id,
                amount: charge.amount,
                description: charge.description.clone(),
                created_at: now,
            })
            .collect();
        self.extra_fees
            .entry(order_id)
            .or_default()
            .extend(fees.iter().cloned());
        fees
    }

    pub fn extra_fees(&self, order_id: OrderId) -> Vec<ExtraFee> {
        self.extra_fees
            .get(&order_id)
            .map(|fees| fees.clone())
            .unwrap_or_default()
    }

    pub fn payments(&self) -> &PaymentLedger {
        &self.payments
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
