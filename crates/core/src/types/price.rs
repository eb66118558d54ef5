//! Type-safe unit price using decimal arithmetic.
//!
//! The store sells in a single currency, so a [`Price`] is just a validated
//! [`Decimal`] amount. Order totals are plain `Decimal` sums of
//! [`Price::line_total`].

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below the minimum sellable price.
    #[error("price must be at least {min}")]
    TooLow {
        /// Minimum allowed price.
        min: Decimal,
    },
    /// The amount has sub-cent precision.
    #[error("price must have at most {max} decimal places")]
    TooPrecise {
        /// Maximum allowed number of decimal places.
        max: u32,
    },
}

/// A product unit price.
///
/// ## Constraints
///
/// - At least `0.01`
/// - At most two decimal places
///
/// ## Examples
///
/// ```
/// use rust_decimal::Decimal;
/// use stitchery_core::Price;
///
/// let price = Price::new(Decimal::new(1299, 2)).unwrap();
/// assert_eq!(price.line_total(3), Decimal::new(3897, 2));
///
/// assert!(Price::new(Decimal::ZERO).is_err());
/// assert!(Price::new(Decimal::new(1001, 3)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Smallest sellable price (one cent).
    pub const MIN: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

    /// Maximum number of decimal places.
    pub const MAX_SCALE: u32 = 2;

    /// Create a validated price.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is below `0.01` or has more than two
    /// decimal places.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount < Self::MIN {
            return Err(PriceError::TooLow { min: Self::MIN });
        }

        let normalized = amount.normalize();
        if normalized.scale() > Self::MAX_SCALE {
            return Err(PriceError::TooPrecise {
                max: Self::MAX_SCALE,
            });
        }

        Ok(Self(amount))
    }

    /// Get the amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units.
    #[must_use]
    pub fn line_total(&self, quantity: u32) -> Decimal {
        self.0 * Decimal::from(quantity)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Price {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Price {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Price {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
