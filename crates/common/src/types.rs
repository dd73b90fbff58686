use serde::{Deserialize, Serialize};

/// Declares a numeric identifier newtype.
///
/// Identifiers of the foreign aggregates are assigned by their owning
/// services; product identifiers are assigned by the local database.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from its raw value.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier of a product owned by this service.
    ProductId
);

define_id!(
    /// Identifier of a customer owned by the customers service.
    CustomerId
);

define_id!(
    /// Identifier of an order owned by the orders service.
    OrderId
);
