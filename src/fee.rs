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

//! Return-time fee and settlement arithmetic.
//!
//! Fee types carry a [`FeeRate`], a fraction of the order's rental value, and
//! never a fixed currency amount. The calculator is pure: it returns the fee
//! charges to persist and the signed settlement, leaving payments and order
//! status untouched.
//!
//! # Example
//!
//! ```
//! use rental_engine_rs::fee::FeeRate;
//! use rust_decimal_macros::dec;
//!
//! let rate = FeeRate::new(dec!(0.05)).unwrap();
//! assert_eq!(rate.apply(dec!(1000000)), dec!(50000));
//! ```

use crate::base::{ExtraFeeId, FeeTypeId, OrderId};
use crate::error::{Entity, RentalError};
use crate::order::RentalOrder;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places kept on computed fee amounts.
pub const MONEY_DP: u32 = 2;

/// Fraction of rental value, e.g. `0.05` for five percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct FeeRate(Decimal);

impl FeeRate {
    /// # Errors
    ///
    /// [`RentalError::InvalidAmount`] for negative rates.
    pub fn new(rate: Decimal) -> Result<Self, RentalError> {
        if rate < Decimal::ZERO {
            return Err(RentalError::InvalidAmount);
        }
        Ok(Self(rate))
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    /// Monetary amount this rate represents for `rental_value`.
    pub fn apply(self, rental_value: Decimal) -> Decimal {
        self.apply_times(rental_value, 1)
    }

    /// Amount for `times` units of this rate, rounded once.
    pub fn apply_times(self, rental_value: Decimal, times: i64) -> Decimal {
        (self.0 * rental_value * Decimal::from(times)).round_dp(MONEY_DP)
    }
}

impl TryFrom<Decimal> for FeeRate {
    type Error = RentalError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        FeeRate::new(value)
    }
}

impl From<FeeRate> for Decimal {
    fn from(rate: FeeRate) -> Self {
        rate.0
    }
}

/// Catalog entry maintained by administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeType {
    pub id: FeeTypeId,
    pub name: String,
    pub rate: FeeRate,
}

/// Persisted fee charged against an order. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraFee {
    pub id: ExtraFeeId,
    pub order_id: OrderId,
    pub fee_type_id: FeeTypeId,
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A computed fee not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeCharge {
    pub fee_type_id: FeeTypeId,
    pub amount: Decimal,
    pub description: String,
}

/// Net money movement at return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "direction", content = "amount", rename_all = "snake_case")]
pub enum SettlementDirection {
    /// Deposit remainder owed to the renter.
    Refund(Decimal),
    /// Fees exceed the deposit; renter owes the difference.
    Charge(Decimal),
    Even,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub hours_late: i64,
    pub late_fee: Decimal,
    pub extra_fees: Decimal,
    pub deposit: Decimal,
    /// `deposit - (late_fee + extra_fees)`; negative when the renter owes.
    pub amount: Decimal,
    /// Late fee (when positive) followed by one charge per selected fee type.
    pub charges: Vec<FeeCharge>,
}

impl Settlement {
    pub fn total_fee(&self) -> Decimal {
        self.late_fee + self.extra_fees
    }

    pub fn direction(&self) -> SettlementDirection {
        if self.amount > Decimal::ZERO {
            SettlementDirection::Refund(self.amount)
        } else if self.amount < Decimal::ZERO {
            SettlementDirection::Charge(-self.amount)
        } else {
            SettlementDirection::Even
        }
    }
}

/// Whole hours elapsed past `end_time`; zero when returned on time.
pub fn hours_late(end_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if now <= end_time {
        return 0;
    }
    (now - end_time).num_hours()
}

/// Computes fees and settlement for returning `order` at `now`.
///
/// `late_fee_type` supplies the per-hour late rate and is only required when
/// the order is at least one whole hour late.
///
/// # Errors
///
/// [`RentalError::NotFound`] when the order is late and no late-fee type is
/// configured.
pub fn calculate_settlement(
    order: &RentalOrder,
    late_fee_type: Option<&FeeType>,
    selected: &[FeeType],
    now: DateTime<Utc>,
) -> Result<Settlement, RentalError> {
    let rental_value = order.rental_value();
    let hours_late = hours_late(order.end_time, now);
    let mut charges = Vec::with_capacity(selected.len() + 1);

    let late_fee = if hours_late > 0 {
        let late_type = late_fee_type.ok_or(RentalError::NotFound(Entity::FeeType))?;
        let amount = late_type.rate.apply_times(rental_value, hours_late);
        charges.push(FeeCharge {
            fee_type_id: late_type.id,
            amount,
            description: format!("{} ({} h late)", late_type.name, hours_late),
        });
        amount
    } else {
        Decimal::ZERO
    };

    let mut extra_fees = Decimal::ZERO;
    for fee_type in selected {
        let amount = fee_type.rate.apply(rental_value);
        extra_fees += amount;
        charges.push(FeeCharge {
            fee_type_id: fee_type.id,
            amount,
            description: fee_type.name.clone(),
        });
    }

    let deposit = order.deposit_amount;
    Ok(Settlement {
        hours_late,
        late_fee,
        extra_fees,
        deposit,
        amount: deposit - (late_fee + extra_fees),
        charges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{RenterId, VehicleId};
    use crate::order::OrderStatus;
    use crate::payment::PaymentStatus;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn order(total: Decimal, deposit: Decimal, end: DateTime<Utc>) -> RentalOrder {
        RentalOrder {
            id: OrderId(1),
            renter_id: RenterId(1),
            vehicle_id: VehicleId(1),
            pickup_station: None,
            return_station: None,
            start_time: end - Duration::hours(10),
            end_time: end,
            total_amount: total,
            deposit_amount: deposit,
            status: OrderStatus::ReturnRequested,
            payment_status: PaymentStatus::Paid,
            created_at: end - Duration::hours(20),
        }
    }

    fn fee_type(id: u64, name: &str, rate: Decimal) -> FeeType {
        FeeType {
            id: FeeTypeId(id),
            name: name.to_string(),
            rate: FeeRate::new(rate).unwrap(),
        }
    }

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn late_return_with_extra_fee_refunds_remainder() {
        let order = order(dec!(1000000), dec!(300000), end());
        let late = fee_type(1, "Late return", dec!(0.01));
        let damage = fee_type(2, "Damage", dec!(0.05));

        let now = end() + Duration::hours(3);
        let settlement = calculate_settlement(&order, Some(&late), &[damage], now).unwrap();

        assert_eq!(settlement.hours_late, 3);
        assert_eq!(settlement.late_fee, dec!(30000));
        assert_eq!(settlement.extra_fees, dec!(50000));
        assert_eq!(settlement.total_fee(), dec!(80000));
        assert_eq!(settlement.amount, dec!(220000));
        assert_eq!(settlement.direction(), SettlementDirection::Refund(dec!(220000)));
        assert_eq!(settlement.charges.len(), 2);
        assert_eq!(settlement.charges[0].fee_type_id, FeeTypeId(1));
    }

    #[test]
    fn fees_above_deposit_become_a_charge() {
        let order = order(dec!(1000000), dec!(300000), end());
        let heavy = fee_type(3, "Major damage", dec!(0.35));

        let settlement = calculate_settlement(&order, None, &[heavy], end()).unwrap();

        assert_eq!(settlement.total_fee(), dec!(350000));
        assert_eq!(settlement.amount, dec!(-50000));
        assert_eq!(settlement.direction(), SettlementDirection::Charge(dec!(50000)));
    }

    #[test]
    fn on_time_return_has_no_late_fee_and_needs_no_late_type() {
        let order = order(dec!(500000), dec!(100000), end());
        let settlement = calculate_settlement(&order, None, &[], end()).unwrap();
        assert_eq!(settlement.late_fee, Decimal::ZERO);
        assert!(settlement.charges.is_empty());
        assert_eq!(settlement.amount, dec!(100000));
    }

    #[test]
    fn partial_hour_late_is_not_charged() {
        let order = order(dec!(500000), dec!(100000), end());
        let now = end() + Duration::minutes(59);
        assert_eq!(hours_late(order.end_time, now), 0);
        let settlement = calculate_settlement(&order, None, &[], now).unwrap();
        assert_eq!(settlement.late_fee, Decimal::ZERO);
    }

    #[test]
    fn late_without_configured_late_type_fails() {
        let order = order(dec!(500000), dec!(100000), end());
        let result = calculate_settlement(&order, None, &[], end() + Duration::hours(2));
        assert_eq!(result, Err(RentalError::NotFound(Entity::FeeType)));
    }

    #[test]
    fn exact_deposit_consumption_is_even() {
        let order = order(dec!(1000000), dec!(100000), end());
        let cleaning = fee_type(4, "Cleaning", dec!(0.1));
        let settlement = calculate_settlement(&order, None, &[cleaning], end()).unwrap();
        assert_eq!(settlement.direction(), SettlementDirection::Even);
    }

    #[test]
    fn negative_rate_is_rejected() {
        assert_eq!(FeeRate::new(dec!(-0.01)), Err(RentalError::InvalidAmount));
    }

    #[test]
    fn rate_amounts_round_to_money_precision() {
        let rate = FeeRate::new(dec!(0.033)).unwrap();
        assert_eq!(rate.apply(dec!(1000001)), dec!(33000.03));
    }

    #[test]
    fn late_fee_rounds_after_multiplying_hours() {
        let order = order(dec!(1000001), dec!(300000), end());
        let late = fee_type(1, "Late return", dec!(0.033));

        let now = end() + Duration::hours(3);
        let settlement = calculate_settlement(&order, Some(&late), &[], now).unwrap();

        assert_eq!(settlement.late_fee, dec!(99000.10));
        assert_eq!(settlement.charges[0].amount, dec!(99000.10));
    }
}
