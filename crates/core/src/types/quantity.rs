//! Line-item quantity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// Quantities must be at least one.
    #[error("quantity must be at least 1")]
    Zero,
    /// The value does not fit the stock column.
    #[error("quantity must be at most {max}")]
    TooLarge {
        /// Largest accepted quantity.
        max: u32,
    },
}

/// A positive number of units on a cart or order line.
///
/// Quantities are bounded by `i32::MAX` so that they can always be compared
/// with (and subtracted from) the `INTEGER` stock column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Largest accepted quantity.
    #[allow(clippy::cast_sign_loss)]
    pub const MAX: u32 = i32::MAX as u32;

    /// One unit.
    pub const ONE: Self = Self(1);

    /// Create a validated quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is zero or larger than [`Quantity::MAX`].
    pub const fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 {
            return Err(QuantityError::Zero);
        }
        if value > Self::MAX {
            return Err(QuantityError::TooLarge { max: Self::MAX });
        }
        Ok(Self(value))
    }

    /// Get the number of units.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Get the number of units as a signed stock delta.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn as_i32(self) -> i32 {
        // Bounded by MAX, so this never wraps
        self.0 as i32
    }

    /// Add two quantities, failing if the sum exceeds [`Quantity::MAX`].
    ///
    /// # Errors
    ///
    /// Returns `QuantityError::TooLarge` on overflow.
    pub fn checked_add(self, other: Self) -> Result<Self, QuantityError> {
        self.0
            .checked_add(other.0)
            .ok_or(QuantityError::TooLarge { max: Self::MAX })
            .and_then(Self::new)
    }

    /// Whether `stock` units are enough to cover this quantity.
    #[must_use]
    pub fn fits_within(self, stock: i32) -> bool {
        i64::from(self.0) <= i64::from(stock)
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 1 {
            return Err(QuantityError::Zero);
        }
        let value = u32::try_from(value).map_err(|_| QuantityError::TooLarge { max: Self::MAX })?;
        Self::new(value)
    }
}

impl TryFrom<i32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(value))
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Quantity {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i32 as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Quantity {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <i32 as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::try_from(raw)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Quantity {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i32 as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_i32(), buf)
    }
}
