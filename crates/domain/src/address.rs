//! Postal addresses and customer contact details.

use serde::{Deserialize, Serialize};

/// A shipping or billing address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Street address, first line.
    pub line1: String,
    /// Street address, second line.
    pub line2: Option<String>,
    /// City or locality.
    pub city: String,
    /// State, province, or region.
    pub region: String,
    /// Postal or ZIP code.
    pub postal_code: String,
    /// ISO country code.
    pub country: String,
}

impl Address {
    /// Returns true if the fields required for fulfilment are present.
    pub fn is_complete(&self) -> bool {
        !self.line1.trim().is_empty()
            && !self.city.trim().is_empty()
            && !self.postal_code.trim().is_empty()
            && !self.country.trim().is_empty()
    }
}

/// Contact details for the person placing an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    /// Full name.
    pub full_name: String,
    /// Email address, used for order confirmations.
    pub email: String,
    /// Phone number.
    pub phone: String,
}

impl CustomerDetails {
    /// Returns true if name and email are present.
    pub fn is_complete(&self) -> bool {
        !self.full_name.trim().is_empty() && !self.email.trim().is_empty()
    }
}
