//! Currency metadata and minor-unit conversion.
//!
//! Rounding is round-half-up and happens only at conversion boundaries,
//! never inside an already-stored minor-unit amount.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::{CurrencyCode, Money};

/// Errors from currency construction and conversion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CurrencyError {
    /// Exchange rate must be strictly positive.
    #[error("invalid exchange rate {rate} for currency {code}")]
    InvalidRate { code: CurrencyCode, rate: Decimal },

    /// Display precision outside the supported range.
    #[error("unsupported precision {precision} for currency {code}")]
    InvalidPrecision { code: CurrencyCode, precision: u32 },

    /// The amount's currency does not match the currency doing the math.
    #[error("currency mismatch: amount is {actual}, expected {expected}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        actual: CurrencyCode,
    },

    /// Negative input where a non-negative amount is required.
    #[error("invalid amount {amount}: must not be negative")]
    InvalidAmount { amount: Decimal },

    /// Scaled amount does not fit in 64-bit minor units.
    #[error("amount out of range at precision {precision}")]
    AmountOutOfRange { precision: u32 },
}

/// A currency known to the system.
///
/// Exchange rates are expressed relative to the single default currency,
/// whose own rate is always 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    code: CurrencyCode,
    name: String,
    symbol: String,
    precision: u32,
    exchange_rate: Decimal,
    is_enabled: bool,
    is_default: bool,
}

impl Currency {
    /// Creates a new enabled, non-default currency.
    pub fn new(
        code: impl Into<CurrencyCode>,
        name: impl Into<String>,
        symbol: impl Into<String>,
        precision: u32,
        exchange_rate: Decimal,
    ) -> Result<Self, CurrencyError> {
        let code = code.into();
        if exchange_rate <= Decimal::ZERO {
            return Err(CurrencyError::InvalidRate {
                code,
                rate: exchange_rate,
            });
        }
        // Minor-unit scaling is 10^precision; anything beyond real-world
        // currency precision is a configuration mistake.
        if precision > 9 {
            return Err(CurrencyError::InvalidPrecision { code, precision });
        }
        Ok(Self {
            code,
            name: name.into(),
            symbol: symbol.into(),
            precision,
            exchange_rate,
            is_enabled: true,
            is_default: false,
        })
    }

    /// Returns the currency code.
    pub fn code(&self) -> &CurrencyCode {
        &self.code
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the display symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Returns the number of decimal places in the display representation.
    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Returns the exchange rate relative to the default currency.
    pub fn exchange_rate(&self) -> Decimal {
        self.exchange_rate
    }

    /// Returns true if the currency can be used for new checkouts.
    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    /// Returns true if this is the default currency.
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Enables or disables the currency.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
    }

    /// Updates the exchange rate.
    pub fn set_exchange_rate(&mut self, rate: Decimal) -> Result<(), CurrencyError> {
        if rate <= Decimal::ZERO {
            return Err(CurrencyError::InvalidRate {
                code: self.code.clone(),
                rate,
            });
        }
        self.exchange_rate = rate;
        Ok(())
    }

    /// Marks this currency as the default and pins its rate to 1.
    ///
    /// The store is responsible for clearing the previous default in the
    /// same update.
    pub fn set_default(&mut self, default: bool) {
        self.is_default = default;
        if default {
            self.exchange_rate = Decimal::ONE;
        }
    }

    /// Converts a decimal amount to minor units, rounding half-up.
    pub fn to_minor_units(&self, amount: Decimal) -> Result<i64, CurrencyError> {
        if amount < Decimal::ZERO {
            return Err(CurrencyError::InvalidAmount { amount });
        }
        let scale = Decimal::from(10_i64.pow(self.precision));
        (amount * scale)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(CurrencyError::AmountOutOfRange {
                precision: self.precision,
            })
    }

    /// Converts minor units back to a decimal amount.
    pub fn from_minor_units(&self, minor_units: i64) -> Decimal {
        Decimal::new(minor_units, self.precision)
    }

    /// Formats a minor-unit amount for display, e.g. `$12.34`.
    pub fn format(&self, minor_units: i64) -> String {
        format!("{}{}", self.symbol, self.from_minor_units(minor_units))
    }
}

/// Converts an amount between two currencies through the default currency.
///
/// `amount' = round_half_up(amount / from_rate * to_rate)`, re-scaled to the
/// target currency's precision at the conversion boundary.
pub fn convert(money: &Money, from: &Currency, to: &Currency) -> Result<Money, CurrencyError> {
    if money.currency() != from.code() {
        return Err(CurrencyError::CurrencyMismatch {
            expected: from.code().clone(),
            actual: money.currency().clone(),
        });
    }
    if from.exchange_rate() <= Decimal::ZERO {
        return Err(CurrencyError::InvalidRate {
            code: from.code().clone(),
            rate: from.exchange_rate(),
        });
    }
    if to.exchange_rate() <= Decimal::ZERO {
        return Err(CurrencyError::InvalidRate {
            code: to.code().clone(),
            rate: to.exchange_rate(),
        });
    }

    if from.code() == to.code() {
        return Ok(money.clone());
    }

    let value = from.from_minor_units(money.minor_units());
    let in_default = value / from.exchange_rate();
    let target = in_default * to.exchange_rate();
    let minor = to.to_minor_units(target)?;
    Ok(Money::new(minor, to.code().clone()))
}
