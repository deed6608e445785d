//! Currency management and conversion.

use domain::{Currency, CurrencyCode, Money, convert};
use store::CurrencyStore;

use crate::error::{Error, Result};

/// Service for currency metadata and cross-currency conversion.
pub struct CurrencyService<S> {
    currencies: S,
}

impl<S> CurrencyService<S>
where
    S: CurrencyStore,
{
    /// Creates a new currency service.
    pub fn new(currencies: S) -> Self {
        Self { currencies }
    }

    /// Lists all configured currencies.
    pub async fn list(&self) -> Result<Vec<Currency>> {
        Ok(self.currencies.list().await?)
    }

    /// Loads a currency by code.
    pub async fn get(&self, code: &CurrencyCode) -> Result<Currency> {
        self.currencies
            .get(code)
            .await?
            .ok_or_else(|| Error::CurrencyNotFound(code.clone()))
    }

    /// Returns the default currency.
    pub async fn get_default(&self) -> Result<Currency> {
        self.currencies
            .get_default()
            .await?
            .ok_or(Error::NoDefaultCurrency)
    }

    /// Inserts or updates a currency definition.
    #[tracing::instrument(skip(self, currency), fields(code = %currency.code()))]
    pub async fn upsert(&self, currency: &Currency) -> Result<()> {
        Ok(self.currencies.upsert(currency).await?)
    }

    /// Makes a currency the default.
    ///
    /// The previous default is cleared and the new default's exchange rate
    /// pinned to 1 in a single store update.
    #[tracing::instrument(skip(self))]
    pub async fn set_default(&self, code: &CurrencyCode) -> Result<()> {
        self.currencies.set_default(code).await?;
        tracing::info!(code = %code, "default currency changed");
        Ok(())
    }

    /// Deletes a currency; the default currency is protected.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, code: &CurrencyCode) -> Result<()> {
        Ok(self.currencies.delete(code).await?)
    }

    /// Converts an amount between two configured, enabled currencies.
    #[tracing::instrument(skip(self, amount))]
    pub async fn convert(&self, amount: &Money, to: &CurrencyCode) -> Result<Money> {
        let from = self.get(amount.currency()).await?;
        let target = self.get(to).await?;
        if !from.is_enabled() {
            return Err(Error::CurrencyDisabled(from.code().clone()));
        }
        if !target.is_enabled() {
            return Err(Error::CurrencyDisabled(target.code().clone()));
        }
        Ok(convert(amount, &from, &target)?)
    }
}
