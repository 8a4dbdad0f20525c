use serde::{Deserialize, Serialize};

/// Shipping address captured onto an order at checkout.
///
/// This is a copy, not a reference: editing the customer's saved address
/// later never changes where a historical order was shipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub country: String,
    pub region: String,
    pub district: String,
    pub street: String,
    #[serde(default)]
    pub landmark: Option<String>,
}

impl ShippingAddress {
    /// Returns the name of the first required field that is blank.
    pub fn first_missing_field(&self) -> Option<&'static str> {
        [
            ("country", &self.country),
            ("region", &self.region),
            ("district", &self.district),
            ("street", &self.street),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    Card,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
            PaymentMethod::Card => "card",
            PaymentMethod::Wallet => "wallet",
        }
    }

    /// Parses the stored column value.
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "cash_on_delivery" => Some(PaymentMethod::CashOnDelivery),
            "card" => Some(PaymentMethod::Card),
            "wallet" => Some(PaymentMethod::Wallet),
            _ => None,
        }
    }

    /// Returns true if a payment reference must accompany this method.
    pub fn requires_reference(&self) -> bool {
        !matches!(self, PaymentMethod::CashOnDelivery)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            country: "Nepal".to_string(),
            region: "Bagmati".to_string(),
            district: "Kathmandu".to_string(),
            street: "New Road".to_string(),
            landmark: None,
        }
    }

    #[test]
    fn complete_address_has_no_missing_field() {
        assert_eq!(address().first_missing_field(), None);
    }

    #[test]
    fn blank_field_is_reported() {
        let mut addr = address();
        addr.district = "   ".to_string();
        assert_eq!(addr.first_missing_field(), Some("district"));
    }

    #[test]
    fn payment_method_db_round_trip() {
        for method in [
            PaymentMethod::CashOnDelivery,
            PaymentMethod::Card,
            PaymentMethod::Wallet,
        ] {
            assert_eq!(PaymentMethod::from_db(method.as_str()), Some(method));
        }
        assert_eq!(PaymentMethod::from_db("cheque"), None);
    }

    #[test]
    fn payment_method_serializes_snake_case() {
        let json = serde_json::to_string(&PaymentMethod::CashOnDelivery).unwrap();
        assert_eq!(json, "\"cash_on_delivery\"");
    }
}
