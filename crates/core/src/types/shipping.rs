//! Structured shipping address captured at checkout.

use serde::{Deserialize, Serialize};

/// Maximum length of any single address field.
const MAX_FIELD_LENGTH: usize = 200;

/// Errors from [`ShippingAddress::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShippingAddressError {
    #[error("shipping address field '{0}' is required")]
    Missing(&'static str),
    #[error("shipping address field '{0}' is too long")]
    TooLong(&'static str),
}

/// Where an order ships to.
///
/// Stored on the order as JSON, so it is a snapshot: later edits to a
/// customer's profile never touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl ShippingAddress {
    /// Trim every field and check that all are present and bounded.
    ///
    /// # Errors
    ///
    /// Returns the first missing or oversized field.
    pub fn validate(self) -> Result<Self, ShippingAddressError> {
        let address = Self {
            name: self.name.trim().to_owned(),
            address: self.address.trim().to_owned(),
            city: self.city.trim().to_owned(),
            postal_code: self.postal_code.trim().to_owned(),
            country: self.country.trim().to_owned(),
        };

        for (field, value) in address.fields() {
            if value.is_empty() {
                return Err(ShippingAddressError::Missing(field));
            }
            if value.chars().count() > MAX_FIELD_LENGTH {
                return Err(ShippingAddressError::TooLong(field));
            }
        }

        Ok(address)
    }

    fn fields(&self) -> [(&'static str, &str); 5] {
        [
            ("name", &self.name),
            ("address", &self.address),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: " Taro Yamada ".to_string(),
            address: "1-1-1 Chiyoda".to_string(),
            city: "Tokyo".to_string(),
            postal_code: "100-0001".to_string(),
            country: "Japan".to_string(),
        }
    }

    #[test]
    fn test_validate_trims() {
        let validated = address().validate().unwrap();
        assert_eq!(validated.name, "Taro Yamada");
    }

    #[test]
    fn test_validate_requires_every_field() {
        let mut missing_country = address();
        missing_country.country = "  ".to_string();
        assert_eq!(
            missing_country.validate(),
            Err(ShippingAddressError::Missing("country"))
        );

        let mut missing_postal = address();
        missing_postal.postal_code = String::new();
        assert_eq!(
            missing_postal.validate(),
            Err(ShippingAddressError::Missing("postal_code"))
        );
    }

    #[test]
    fn test_validate_bounds_length() {
        let mut long = address();
        long.city = "x".repeat(MAX_FIELD_LENGTH + 1);
        assert_eq!(long.validate(), Err(ShippingAddressError::TooLong("city")));
    }
}
