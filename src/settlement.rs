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

//! Return settlement.
//!
//! The only path that closes out an order:
//!
//! 1. The order must be `RETURN_REQUESTED` with no settlement payment issued.
//! 2. Late and selected fees are computed and persisted as extra fees.
//! 3. A positive settlement issues a `REFUND` redirect and a negative one a
//!    `BONUS_FEE` redirect; the order stays `RETURN_REQUESTED` until that
//!    payment's callback reconciles.
//! 4. A zero settlement completes the order immediately.
//!
//! A settlement payment the gateway declines is marked `FAILED`. The fees
//! stay recorded and [`RentalEngine::reissue_settlement`] issues a fresh
//! payment for the same balance.

use crate::base::{FeeTypeId, OrderId};
use crate::engine::RentalEngine;
use crate::error::{Entity, RentalError};
use crate::fee::{ExtraFee, Settlement, SettlementDirection, calculate_settlement};
use crate::gateway::PaymentRedirect;
use crate::order::{OrderAction, OrderStatus, RentalOrder};
use crate::payment::{Payment, PaymentKind, PaymentStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

/// Result of [`RentalEngine::complete_return`].
#[derive(Debug, Clone, Serialize)]
pub struct ReturnOutcome {
    pub order: RentalOrder,
    pub settlement: Settlement,
    pub direction: SettlementDirection,
    pub fees: Vec<ExtraFee>,
    /// Refund or charge awaiting its callback; `None` when settled even.
    pub payment: Option<PaymentRedirect>,
}

impl RentalEngine {
    /// Settles a returned vehicle.
    ///
    /// # Errors
    ///
    /// - [`RentalError::NotFound`] - Unknown order or fee type, or a late
    ///   return with no late-fee type configured.
    /// - [`RentalError::InvalidTransition`] - Order is not `RETURN_REQUESTED`.
    /// - [`RentalError::SettlementPending`] - Settlement already issued.
    /// - [`RentalError::SettlementDeclined`] - Settlement was declined; use
    ///   [`RentalEngine::reissue_settlement`].
    /// - [`RentalError::InvalidAmount`] - Settlement not payable in gateway units.
    pub fn complete_return(
        &self,
        order_id: OrderId,
        fee_type_ids: &[FeeTypeId],
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, RentalError> {
        let store = self.store();
        let selected = store.fee_types(fee_type_ids)?;
        let late_fee_type = self.late_fee_type.and_then(|id| store.fee_type(id));

        store.with_order(order_id, |order| {
            order.plan(OrderAction::Complete)?;
            let issued = self.settlement_payments(order_id)?;
            if !issued.is_empty() {
                return Err(RentalError::SettlementDeclined);
            }

            let settlement = calculate_settlement(order, late_fee_type.as_ref(), &selected, now)?;
            let direction = settlement.direction();

            // Issue the payment before persisting fees so a rejected amount
            // leaves nothing behind.
            let payment = self.issue_settlement(order, direction, client_ip, now)?;

            let fees = store.add_extra_fees(order_id, &settlement.charges, now);
            if payment.is_none() {
                store.apply_transition(order, OrderAction::Complete)?;
            }

            info!(
                order_id = %order_id,
                hours_late = settlement.hours_late,
                total_fee = %settlement.total_fee(),
                settlement = %settlement.amount,
                status = %order.status,
                "return settled"
            );

            Ok(ReturnOutcome {
                order: order.clone(),
                settlement,
                direction,
                fees,
                payment,
            })
        })
    }

    /// Issues a fresh settlement payment after the gateway declined the
    /// previous one.
    ///
    /// The balance is taken from the fees already recorded for the order, so
    /// nothing is charged twice.
    ///
    /// # Errors
    ///
    /// - [`RentalError::NotFound`] - Unknown order, or no settlement issued yet.
    /// - [`RentalError::InvalidTransition`] - Order is not `RETURN_REQUESTED`.
    /// - [`RentalError::SettlementPending`] - A settlement payment is still
    ///   awaiting its callback or already succeeded.
    pub fn reissue_settlement(
        &self,
        order_id: OrderId,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentRedirect, RentalError> {
        let store = self.store();
        store.with_order(order_id, |order| {
            order.plan(OrderAction::Complete)?;
            if self.settlement_payments(order_id)?.is_empty() {
                return Err(RentalError::NotFound(Entity::Payment));
            }

            let fees: Decimal = store.extra_fees(order_id).iter().map(|f| f.amount).sum();
            let balance = order.deposit_amount - fees;
            let direction = if balance > Decimal::ZERO {
                SettlementDirection::Refund(balance)
            } else if balance < Decimal::ZERO {
                SettlementDirection::Charge(-balance)
            } else {
                SettlementDirection::Even
            };

            let redirect = self
                .issue_settlement(order, direction, client_ip, now)?
                .ok_or(RentalError::InvalidAmount)?;
            info!(
                order_id = %order_id,
                txn_ref = %redirect.payment.txn_ref,
                amount = %redirect.payment.amount,
                "settlement reissued"
            );
            Ok(redirect)
        })
    }

    /// Settlement payments of an order, all of which the gateway declined.
    ///
    /// Returns [`RentalError::SettlementPending`] if any is awaiting its
    /// callback or already paid.
    fn settlement_payments(&self, order_id: OrderId) -> Result<Vec<Payment>, RentalError> {
        let settlements: Vec<Payment> = self
            .store()
            .payments()
            .for_order(order_id)
            .into_iter()
            .filter(|p| p.kind.is_settlement())
            .collect();
        if settlements
            .iter()
            .any(|p| p.status != PaymentStatus::Failed)
        {
            return Err(RentalError::SettlementPending);
        }
        Ok(settlements)
    }

    fn issue_settlement(
        &self,
        order: &RentalOrder,
        direction: SettlementDirection,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentRedirect>, RentalError> {
        let renter = self
            .store()
            .renter(order.renter_id)
            .map(|r| r.name)
            .unwrap_or_else(|| order.renter_id.to_string());
        let (amount, kind, order_info) = match direction {
            SettlementDirection::Refund(amount) => (
                amount,
                PaymentKind::Refund,
                format!("Deposit refund for rental order {} to {renter}", order.id),
            ),
            SettlementDirection::Charge(amount) => (
                amount,
                PaymentKind::BonusFee,
                format!("Additional fees for rental order {} from {renter}", order.id),
            ),
            SettlementDirection::Even => return Ok(None),
        };
        self.gateway()
            .initiate(
                self.store().payments(),
                order.id,
                amount,
                kind,
                &order_info,
                client_ip,
                now,
            )
            .map(Some)
    }

    /// Completes a return once its refund or charge has been reconciled.
    ///
    /// Runs under the order lock right after the payment flip. The money has
    /// already moved, so an order in an unexpected status is logged rather
    /// than failing the callback.
    pub(crate) fn finish_return(&self, order: &mut RentalOrder, payment: &Payment) {
        if order.status != OrderStatus::ReturnRequested {
            warn!(
                order_id = %order.id,
                status = %order.status,
                txn_ref = %payment.txn_ref,
                "settlement reconciled for order not awaiting return"
            );
            return;
        }
        match self.store().apply_transition(order, OrderAction::Complete) {
            Ok(_) => info!(order_id = %order.id, kind = %payment.kind, "order completed"),
            Err(e) => warn!(order_id = %order.id, error = %e, "order completion failed"),
        }
    }
}
