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

//! Thread-safe payment ledger with transaction-reference deduplication.
//!
//! Every outbound gateway request gets one row keyed by its [`TxnRef`]. The
//! ledger guarantees reference uniqueness and that a row leaves `UNPAID` at
//! most once, which is what makes callback handling idempotent.

use crate::base::{OrderId, PaymentId, TxnRef};
use crate::error::{Entity, RentalError};
use crate::payment::{Payment, PaymentKind, PaymentStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};

/// Payment method recorded for gateway-issued rows.
pub const GATEWAY_METHOD: &str = "VNPAY";

/// Payment rows indexed by id, transaction reference and owning order.
#[derive(Debug)]
pub struct PaymentLedger {
    payments: DashMap<PaymentId, Payment>,

    /// Reference index for O(1) duplicate detection and callback lookup.
    by_ref: DashMap<TxnRef, PaymentId>,

    by_order: DashMap<OrderId, Vec<PaymentId>>,

    next_id: AtomicU64,
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self {
            payments: DashMap::new(),
            by_ref: DashMap::new(),
            by_order: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Records a new `UNPAID` payment.
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::DuplicateTransaction`] if a payment with the
    /// same reference already exists.
    pub fn record(
        &self,
        order_id: OrderId,
        amount: Decimal,
        kind: PaymentKind,
        txn_ref: TxnRef,
        now: DateTime<Utc>,
    ) -> Result<Payment, RentalError> {
        // Entry API makes check-and-insert atomic on the reference
        match self.by_ref.entry(txn_ref.clone()) {
            Entry::Occupied(_) => Err(RentalError::DuplicateTransaction),
            Entry::Vacant(entry) => {
                let id = PaymentId(self.next_id.fetch_add(1, Ordering::Relaxed));
                let payment = Payment {
                    id,
                    order_id,
                    amount,
                    method: GATEWAY_METHOD.to_string(),
                    kind,
                    status: PaymentStatus::Unpaid,
                    txn_ref,
                    created_at: now,
                };
                self.payments.insert(id, payment.clone());
                self.by_order.entry(order_id).or_default().push(id);
                entry.insert(id);
                Ok(payment)
            }
        }
    }

    pub fn get(&self, id: PaymentId) -> Option<Payment> {
        self.payments.get(&id).map(|p| p.clone())
    }

    pub fn find_by_ref(&self, txn_ref: &TxnRef) -> Option<Payment> {
        let id = *self.by_ref.get(txn_ref)?;
        self.get(id)
    }

    /// Flips an `UNPAID` payment to `PAID`.
    ///
    /// Returns `true` if this call performed the flip and `false` if the row
    /// was already settled either way.
    pub fn mark_paid(&self, id: PaymentId) -> Result<bool, RentalError> {
        self.settle(id, PaymentStatus::Paid)
    }

    /// Flips an `UNPAID` payment to `FAILED` after a gateway decline.
    pub fn mark_failed(&self, id: PaymentId) -> Result<bool, RentalError> {
        self.settle(id, PaymentStatus::Failed)
    }

    fn settle(&self, id: PaymentId, status: PaymentStatus) -> Result<bool, RentalError> {
        let mut payment = self
            .payments
            .get_mut(&id)
            .ok_or(RentalError::NotFound(Entity::Payment))?;
        if payment.status != PaymentStatus::Unpaid {
            return Ok(false);
        }
        payment.status = status;
        Ok(true)
    }

    /// Payments of one order in creation order.
    pub fn for_order(&self, order_id: OrderId) -> Vec<Payment> {
        let ids = match self.by_order.get(&order_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// `UNPAID` rows created strictly before `cutoff`.
    pub fn unpaid_before(&self, cutoff: DateTime<Utc>) -> Vec<Payment> {
        let mut stale: Vec<Payment> = self
            .payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Unpaid && p.created_at < cutoff)
            .map(|p| p.clone())
            .collect();
        stale.sort_by_key(|p| p.id);
        stale
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }
}

impl Default for PaymentLedger {
    fn default() -> Self {
        Self::new()
    }
}
