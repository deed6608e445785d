use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// Wraps a UUID to provide type safety and prevent mixing up
        /// identifiers of different entities.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a checkout (pre-purchase basket).
    CheckoutId
}

uuid_id! {
    /// Unique identifier for an order.
    OrderId
}

uuid_id! {
    /// Unique identifier for a payment transaction in the ledger.
    TransactionId
}

uuid_id! {
    /// Unique identifier for a discount definition.
    DiscountId
}

uuid_id! {
    /// Unique identifier for a registered user.
    UserId
}

string_id! {
    /// Anonymous session token identifying a guest shopper.
    SessionId
}

string_id! {
    /// Product identifier owned by the catalog service.
    ProductId
}

string_id! {
    /// Product variant identifier owned by the catalog service.
    VariantId
}

string_id! {
    /// Category identifier owned by the catalog service.
    CategoryId
}

string_id! {
    /// Shipping method identifier owned by the shipping-rate service.
    ShippingMethodId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_are_unique() {
        assert_ne!(CheckoutId::new(), CheckoutId::new());
        assert_ne!(OrderId::new(), OrderId::new());
        assert_ne!(TransactionId::new(), TransactionId::new());
    }

    #[test]
    fn uuid_id_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = OrderId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
        assert_eq!(OrderId::from(uuid), id);
        assert_eq!(Uuid::from(id), uuid);
    }

    #[test]
    fn string_id_conversions() {
        let id = ProductId::new("PROD-001");
        assert_eq!(id.as_str(), "PROD-001");

        let id2: ProductId = "PROD-002".into();
        assert_eq!(id2.as_str(), "PROD-002");
        assert_eq!(id2.to_string(), "PROD-002");
    }

    #[test]
    fn serialization_is_transparent() {
        let id = SessionId::new("sess-abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"sess-abc\"");

        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        let order_id = OrderId::new();
        let json = serde_json::to_string(&order_id).unwrap();
        let back: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order_id);
    }
}
