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

//! Payment records.
//!
//! A payment row is created when a signed redirect URL is issued and leaves
//! `UNPAID` at most once: to `PAID` when the gateway reports success, or to
//! `FAILED` when it reports a decline. Both are final for that reference.

use crate::base::{OrderId, PaymentId, TxnRef};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Purpose of a payment row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    /// Renter pays rental total plus deposit.
    Pay,
    /// Deposit remainder returned to the renter at return.
    Refund,
    /// Renter covers fees exceeding the deposit at return.
    BonusFee,
}

impl PaymentKind {
    /// Kinds created by the return settlement.
    pub fn is_settlement(self) -> bool {
        matches!(self, PaymentKind::Refund | PaymentKind::BonusFee)
    }
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentKind::Pay => "PAY",
            PaymentKind::Refund => "REFUND",
            PaymentKind::BonusFee => "BONUS_FEE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub method: String,
    pub kind: PaymentKind,
    pub status: PaymentStatus,
    pub txn_ref: TxnRef,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }

    pub fn is_failed(&self) -> bool {
        self.status == PaymentStatus::Failed
    }
}
