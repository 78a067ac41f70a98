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

//! Redirect-based payment gateway adapter (VNPAY protocol, version 2.1.0).
//!
//! # Outbound
//!
//! Every request gets a fresh [`TxnRef`]. The namespaced parameters are
//! sorted by key, form-url-encoded, joined with `&` and signed with
//! HMAC-SHA512 over the shared secret. The hex digest is appended as
//! `vnp_SecureHash` and an `UNPAID` payment row is recorded before the URL is
//! handed back.
//!
//! # Inbound
//!
//! Callbacks are re-canonicalized the same way, excluding the hash fields,
//! and compared in constant time. A verified callback is turned into
//! [`CallbackParams`]; matching it to a payment row and applying the effect is
//! the engine's job.
//!
//! The secret and computed hashes are never logged or put in errors.

use crate::base::{OrderId, TxnRef};
use crate::error::RentalError;
use crate::payment::{Payment, PaymentKind};
use crate::payment_ledger::PaymentLedger;
use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use ring::hmac;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};
use url::form_urlencoded;

/// Namespace shared by every gateway parameter.
pub const PARAM_PREFIX: &str = "vnp_";
pub const SECURE_HASH: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";
pub const TXN_REF: &str = "vnp_TxnRef";
pub const AMOUNT: &str = "vnp_Amount";
pub const RESPONSE_CODE: &str = "vnp_ResponseCode";
pub const TRANSACTION_NO: &str = "vnp_TransactionNo";

/// Gateway response code for a successful transaction.
pub const RESPONSE_SUCCESS: &str = "00";

/// Gateway timestamp layout (`yyyyMMddHHmmss`).
const DATE_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Gateway checkout endpoint the renter is redirected to.
    pub payment_url: String,
    /// Merchant (terminal) code issued by the gateway.
    pub merchant_code: String,
    /// Shared secret for request and callback hashes.
    #[serde(skip_serializing)]
    pub hash_secret: String,
    /// Where the gateway sends the renter (and the callback) afterwards.
    pub return_url: String,
    pub version: String,
    pub command: String,
    pub currency: String,
    pub locale: String,
    pub order_type: String,
    /// Offset of the gateway's local time from UTC.
    pub utc_offset_hours: i32,
    /// Minor units per currency unit in `vnp_Amount`.
    pub amount_scale: u32,
    /// Validity of an issued redirect.
    pub expire_minutes: i64,
}

/// A signed redirect plus the payment row it created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRedirect {
    pub payment: Payment,
    pub url: String,
}

/// Verified fields of an inbound callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub txn_ref: TxnRef,
    pub amount: Decimal,
    pub response_code: String,
    pub transaction_no: Option<String>,
}

impl CallbackParams {
    pub fn succeeded(&self) -> bool {
        self.response_code == RESPONSE_SUCCESS
    }
}

/// Outcome of matching a verified callback to its payment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub order_id: OrderId,
    pub txn_ref: TxnRef,
    pub kind: PaymentKind,
    pub amount: Decimal,
    pub response_code: String,
    /// Whether the payment row is `PAID`.
    pub paid: bool,
}

/// Sorts, encodes and joins parameters into the signed payload.
///
/// Empty values are skipped on both sides of the protocol.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

pub struct PaymentGateway {
    config: GatewayConfig,
    key: hmac::Key,
}

impl PaymentGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let key = hmac::Key::new(hmac::HMAC_SHA512, config.hash_secret.as_bytes());
        Self { config, key }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Lowercase hex HMAC-SHA512 of the canonical form of `params`.
    pub fn sign(&self, params: &BTreeMap<String, String>) -> String {
        let tag = hmac::sign(&self.key, canonical_query(params).as_bytes());
        hex::encode(tag.as_ref())
    }

    /// Constant-time check of `supplied` against the signature of `params`.
    pub fn verify(&self, params: &BTreeMap<String, String>, supplied: &str) -> bool {
        let Ok(tag) = hex::decode(supplied.trim()) else {
            return false;
        };
        hmac::verify(&self.key, canonical_query(params).as_bytes(), &tag).is_ok()
    }

    /// Converts an amount to the gateway's integral minor units.
    fn minor_units(&self, amount: Decimal) -> Result<i64, RentalError> {
        let minor = amount * Decimal::from(self.config.amount_scale);
        if amount <= Decimal::ZERO || !minor.fract().is_zero() {
            return Err(RentalError::InvalidAmount);
        }
        minor.to_i64().ok_or(RentalError::InvalidAmount)
    }

    fn local_time(&self, at: DateTime<Utc>) -> String {
        let offset = FixedOffset::east_opt(self.config.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix());
        at.with_timezone(&offset).format(DATE_FORMAT).to_string()
    }

    /// Unsigned request parameters for one payment attempt.
    pub fn request_params(
        &self,
        txn_ref: &TxnRef,
        amount: Decimal,
        description: &str,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, String>, RentalError> {
        let cfg = &self.config;
        let minor = self.minor_units(amount)?;
        let expires = now + Duration::minutes(cfg.expire_minutes);

        let params = [
            ("vnp_Version", cfg.version.clone()),
            ("vnp_Command", cfg.command.clone()),
            ("vnp_TmnCode", cfg.merchant_code.clone()),
            (AMOUNT, minor.to_string()),
            ("vnp_CreateDate", self.local_time(now)),
            ("vnp_ExpireDate", self.local_time(expires)),
            ("vnp_CurrCode", cfg.currency.clone()),
            ("vnp_IpAddr", client_ip.to_string()),
            ("vnp_Locale", cfg.locale.clone()),
            ("vnp_OrderInfo", description.to_string()),
            ("vnp_OrderType", cfg.order_type.clone()),
            ("vnp_ReturnUrl", cfg.return_url.clone()),
            (TXN_REF, txn_ref.to_string()),
        ];
        Ok(params
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect())
    }

    /// Full redirect URL with the signature appended.
    pub fn redirect_url(&self, params: &BTreeMap<String, String>) -> String {
        format!(
            "{}?{}&{}={}",
            self.config.payment_url,
            canonical_query(params),
            SECURE_HASH,
            self.sign(params)
        )
    }

    /// Signs a new payment attempt and records its `UNPAID` row.
    ///
    /// # Errors
    ///
    /// - [`RentalError::InvalidAmount`] - Amount not positive or not
    ///   representable in minor units.
    /// - [`RentalError::DuplicateTransaction`] - Reference collision.
    #[allow(clippy::too_many_arguments)]
    pub fn initiate(
        &self,
        ledger: &PaymentLedger,
        order_id: OrderId,
        amount: Decimal,
        kind: PaymentKind,
        description: &str,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentRedirect, RentalError> {
        let txn_ref = TxnRef::generate();
        let params = self.request_params(&txn_ref, amount, description, client_ip, now)?;
        let url = self.redirect_url(&params);
        let payment = ledger.record(order_id, amount, kind, txn_ref, now)?;

        info!(
            order_id = %order_id,
            payment_id = %payment.id,
            txn_ref = %payment.txn_ref,
            kind = %kind,
            amount = %amount,
            "payment redirect issued"
        );
        Ok(PaymentRedirect { payment, url })
    }

    /// Verifies a callback's signature and extracts its fields.
    ///
    /// # Errors
    ///
    /// - [`RentalError::InvalidSignature`] - Missing or mismatching hash.
    /// - [`RentalError::UnknownTransaction`] - No transaction reference.
    /// - [`RentalError::InvalidAmount`] - Missing or malformed amount.
    pub fn verify_callback(
        &self,
        query: &HashMap<String, String>,
    ) -> Result<CallbackParams, RentalError> {
        let signed: BTreeMap<String, String> = query
            .iter()
            .filter(|(key, _)| key.starts_with(PARAM_PREFIX))
            .filter(|(key, _)| key.as_str() != SECURE_HASH && key.as_str() != SECURE_HASH_TYPE)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let supplied = query.get(SECURE_HASH).map(String::as_str).unwrap_or_default();
        if !self.verify(&signed, supplied) {
            warn!(
                txn_ref = signed.get(TXN_REF).map(String::as_str).unwrap_or("-"),
                "gateway callback failed signature check"
            );
            return Err(RentalError::InvalidSignature);
        }

        let txn_ref = signed
            .get(TXN_REF)
            .filter(|r| !r.is_empty())
            .map(|r| TxnRef::from(r.as_str()))
            .ok_or(RentalError::UnknownTransaction)?;
        let minor: i64 = signed
            .get(AMOUNT)
            .and_then(|a| a.parse().ok())
            .ok_or(RentalError::InvalidAmount)?;
        let amount = Decimal::from(minor) / Decimal::from(self.config.amount_scale);

        Ok(CallbackParams {
            txn_ref,
            amount,
            response_code: signed.get(RESPONSE_CODE).cloned().unwrap_or_default(),
            transaction_no: signed.get(TRANSACTION_NO).cloned(),
        })
    }
}
