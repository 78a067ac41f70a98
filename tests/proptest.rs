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

//! Property-based tests for the rental engine.
//!
//! These tests verify invariants that should hold for any inputs: signature
//! integrity, the settlement identity, closure of the order state machine
//! and exclusive vehicle holds.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rental_engine_rs::fee::{FeeRate, FeeType, SettlementDirection, calculate_settlement};
use rental_engine_rs::fleet::{Renter, Station, Vehicle};
use rental_engine_rs::{
    BookingRequest, EngineConfig, FeeTypeId, GatewayConfig, OrderAction, OrderId, OrderStatus,
    PaymentGateway, PaymentStatus, RentalEngine, RentalOrder, RenterId, StationId, Store,
    VehicleId, transition,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Fixtures
// =============================================================================

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 8, 0, 0).unwrap()
}

fn gateway_config(secret: &str) -> GatewayConfig {
    GatewayConfig {
        payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
        merchant_code: "DEMO0001".to_string(),
        hash_secret: secret.to_string(),
        return_url: "http://127.0.0.1:3000/payments/callback".to_string(),
        version: "2.1.0".to_string(),
        command: "pay".to_string(),
        currency: "VND".to_string(),
        locale: "vn".to_string(),
        order_type: "other".to_string(),
        utc_offset_hours: 7,
        amount_scale: 100,
        expire_minutes: 15,
    }
}

fn order(total: Decimal, deposit: Decimal) -> RentalOrder {
    RentalOrder {
        id: OrderId(1),
        renter_id: RenterId(1),
        vehicle_id: VehicleId(1),
        pickup_station: None,
        return_station: None,
        start_time: t0(),
        end_time: t0() + Duration::hours(4),
        total_amount: total,
        deposit_amount: deposit,
        status: OrderStatus::ReturnRequested,
        payment_status: PaymentStatus::Paid,
        created_at: t0(),
    }
}

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Whole-currency amounts, as rentals are priced in VND.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=50_000_000i64).prop_map(Decimal::from)
}

/// Rates from 0 to 1 in steps of 0.0001.
fn arb_rate() -> impl Strategy<Value = FeeRate> {
    (0i64..=10_000i64).prop_map(|r| FeeRate::new(Decimal::new(r, 4)).unwrap())
}

fn arb_params() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("vnp_[A-Za-z]{1,12}", "[ -~]{1,24}", 1..12)
}

fn arb_status() -> impl Strategy<Value = OrderStatus> {
    prop::sample::select(OrderStatus::ALL.to_vec())
}

fn arb_action() -> impl Strategy<Value = OrderAction> {
    prop::sample::select(OrderAction::ALL.to_vec())
}

// =============================================================================
// Signature Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Anything signed with the merchant secret verifies.
    #[test]
    fn signed_params_verify(params in arb_params()) {
        let gateway = PaymentGateway::new(gateway_config("SECRETKEY"));
        let hash = gateway.sign(&params);
        prop_assert_eq!(hash.len(), 128);
        prop_assert!(gateway.verify(&params, &hash));
    }

    /// Changing any value invalidates the signature.
    #[test]
    fn altered_value_fails_verification(
        params in arb_params(),
        pick in any::<prop::sample::Index>(),
        suffix in "[a-z0-9]{1,4}",
    ) {
        let gateway = PaymentGateway::new(gateway_config("SECRETKEY"));
        let hash = gateway.sign(&params);

        let mut altered = params.clone();
        let key = pick.get(&params.keys().cloned().collect::<Vec<_>>()).clone();
        altered.entry(key).and_modify(|v| v.push_str(&suffix));

        prop_assert!(!gateway.verify(&altered, &hash));
    }

    /// Substituting a single character in place invalidates the signature.
    #[test]
    fn single_character_substitution_fails_verification(
        params in arb_params(),
        pick in any::<prop::sample::Index>(),
        position in any::<prop::sample::Index>(),
        replacement in proptest::char::range(' ', '~'),
    ) {
        let gateway = PaymentGateway::new(gateway_config("SECRETKEY"));
        let hash = gateway.sign(&params);

        let key = pick.get(&params.keys().cloned().collect::<Vec<_>>()).clone();
        let mut chars: Vec<char> = params[&key].chars().collect();
        let at = position.index(chars.len());
        prop_assume!(chars[at] != replacement);
        chars[at] = replacement;

        let mut altered = params.clone();
        altered.insert(key, chars.into_iter().collect());

        prop_assert!(!gateway.verify(&altered, &hash));
    }

    /// A different secret never produces an accepted signature.
    #[test]
    fn foreign_secret_fails_verification(
        params in arb_params(),
        secret in "[A-Z0-9]{8,32}",
    ) {
        prop_assume!(secret != "SECRETKEY");
        let merchant = PaymentGateway::new(gateway_config("SECRETKEY"));
        let forger = PaymentGateway::new(gateway_config(&secret));

        prop_assert!(!merchant.verify(&params, &forger.sign(&params)));
    }
}

// =============================================================================
// Settlement Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// settlement = deposit - (late fee + extra fees), and the direction
    /// agrees with its sign.
    #[test]
    fn settlement_identity(
        total in arb_amount(),
        deposit in arb_amount(),
        late_rate in arb_rate(),
        rates in prop::collection::vec(arb_rate(), 0..5),
        minutes_after_end in -600i64..6000,
    ) {
        let order = order(total, deposit);
        let late = FeeType { id: FeeTypeId(1), name: "Late return".to_string(), rate: late_rate };
        let selected: Vec<FeeType> = rates
            .into_iter()
            .enumerate()
            .map(|(i, rate)| FeeType {
                id: FeeTypeId(i as u64 + 2),
                name: format!("Fee {i}"),
                rate,
            })
            .collect();
        let now = order.end_time + Duration::minutes(minutes_after_end);

        let s = calculate_settlement(&order, Some(&late), &selected, now).unwrap();

        prop_assert_eq!(s.amount, s.deposit - (s.late_fee + s.extra_fees));
        prop_assert_eq!(s.total_fee(), s.charges.iter().map(|c| c.amount).sum::<Decimal>());
        prop_assert!(s.late_fee >= Decimal::ZERO);
        prop_assert!(s.extra_fees >= Decimal::ZERO);
        prop_assert_eq!(s.hours_late, (minutes_after_end / 60).max(0));
        if s.hours_late == 0 {
            prop_assert!(s.late_fee.is_zero());
        }

        match s.direction() {
            SettlementDirection::Refund(amount) => {
                prop_assert!(amount > Decimal::ZERO && amount == s.amount)
            }
            SettlementDirection::Charge(amount) => {
                prop_assert!(amount > Decimal::ZERO && amount == -s.amount)
            }
            SettlementDirection::Even => prop_assert!(s.amount.is_zero()),
        }
    }
}

// =============================================================================
// State Machine Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Terminal statuses accept no action and every accepted action moves
    /// the order forward or cancels it.
    #[test]
    fn transitions_are_closed(status in arb_status(), action in arb_action()) {
        if let Ok(step) = transition(status, action) {
            prop_assert!(!status.is_terminal());
            prop_assert_eq!(step.from, status);
            prop_assert_ne!(step.to, status);
        }
        if status.is_terminal() {
            prop_assert!(transition(status, action).is_err());
        }
    }

    /// Walking any action sequence from BOOKED only visits reachable
    /// statuses and never leaves a terminal one.
    #[test]
    fn action_sequences_never_leave_terminal_states(
        actions in prop::collection::vec(arb_action(), 0..20),
    ) {
        let mut status = OrderStatus::Booked;
        for action in actions {
            let before = status;
            if let Ok(step) = transition(status, action) {
                status = step.to;
            }
            if before.is_terminal() {
                prop_assert_eq!(status, before);
            }
        }
    }
}

// =============================================================================
// Vehicle Hold Tests
// =============================================================================

fn fleet_engine() -> RentalEngine {
    let store = Arc::new(Store::new());
    store.upsert_station(Station { id: StationId(1), name: "District 1".to_string() });
    for id in 1..=3 {
        store.upsert_renter(Renter {
            id: RenterId(id),
            name: format!("Renter {id}"),
            email: format!("renter{id}@example.com"),
        });
    }
    store.upsert_vehicle(Vehicle {
        id: VehicleId(1),
        station_id: StationId(1),
        price_per_hour: Decimal::from(50_000),
        deposit: Decimal::from(100_000),
        available: true,
    });
    RentalEngine::new(
        store,
        PaymentGateway::new(gateway_config("SECRETKEY")),
        &EngineConfig::default(),
    )
}

fn pick(booked: &[OrderId], i: usize) -> Option<OrderId> {
    booked.get(i % booked.len().max(1)).copied()
}

#[derive(Debug, Clone)]
enum Op {
    Book(u64),
    Approve(usize),
    Reject(usize),
    Pickup(usize),
    Return(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..=3).prop_map(Op::Book),
        (0usize..8).prop_map(Op::Approve),
        (0usize..8).prop_map(Op::Reject),
        (0usize..8).prop_map(Op::Pickup),
        (0usize..8).prop_map(Op::Return),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// A vehicle is held by at most one active order, and it is flagged
    /// available exactly when no active order holds it.
    #[test]
    fn vehicle_held_by_at_most_one_active_order(ops in prop::collection::vec(arb_op(), 1..30)) {
        let engine = fleet_engine();
        let mut booked: Vec<OrderId> = Vec::new();

        for op in ops {
            let _ = match op {
                Op::Book(renter) => engine
                    .book(
                        BookingRequest {
                            renter_id: RenterId(renter),
                            vehicle_id: VehicleId(1),
                            pickup_station: None,
                            return_station: None,
                            start_time: t0() + Duration::hours(1),
                            end_time: t0() + Duration::hours(3),
                        },
                        t0(),
                    )
                    .map(|o| booked.push(o.id)),
                Op::Approve(i) => {
                    pick(&booked, i).map_or(Ok(()), |id| engine.approve(id).map(drop))
                }
                Op::Reject(i) => pick(&booked, i).map_or(Ok(()), |id| engine.reject(id).map(drop)),
                Op::Pickup(i) => pick(&booked, i).map_or(Ok(()), |id| engine.pickup(id).map(drop)),
                Op::Return(i) => {
                    pick(&booked, i).map_or(Ok(()), |id| engine.request_return(id).map(drop))
                }
            };

            let active = (1..=3)
                .flat_map(|r| engine.orders_for_renter(RenterId(r)))
                .filter(|o| o.is_active())
                .count();
            let vehicle = engine.store().vehicle(VehicleId(1)).unwrap();

            prop_assert!(active <= 1);
            prop_assert_eq!(vehicle.available, active == 0);
            prop_assert_eq!(
                engine.store().active_order_for_vehicle(VehicleId(1)).is_some(),
                active == 1
            );
        }
    }
}
