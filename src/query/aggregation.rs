use serde::de::DeserializeOwned;

use crate::metamodel::Property;

/// Reduces the values of one property across the matching entities.
pub trait Aggregation {
    type Value: DeserializeOwned;

    fn property(&self) -> &Property<Self::Value>;

    /// `values` holds only the entities where the property is present.
    fn aggregate(&self, values: Vec<Self::Value>) -> Option<Self::Value>;
}

#[derive(Debug, Clone)]
pub struct Max<T> {
    property: Property<T>,
}

impl<T> Aggregation for Max<T>
where
    T: PartialOrd + DeserializeOwned,
{
    type Value = T;

    fn property(&self) -> &Property<T> {
        &self.property
    }

    fn aggregate(&self, values: Vec<T>) -> Option<T> {
        values
            .into_iter()
            .reduce(|max, value| if value > max { value } else { max })
    }
}

#[derive(Debug, Clone)]
pub struct Min<T> {
    property: Property<T>,
}

impl<T> Aggregation for Min<T>
where
    T: PartialOrd + DeserializeOwned,
{
    type Value = T;

    fn property(&self) -> &Property<T> {
        &self.property
    }

    fn aggregate(&self, values: Vec<T>) -> Option<T> {
        values
            .into_iter()
            .reduce(|min, value| if value < min { value } else { min })
    }
}

/// Sum of the property. Always yields a value; zero when nothing matches.
///
/// Uses [`std::iter::Sum`], so integer overflow panics in debug builds and
/// wraps in release builds. Use [`checked_sum`] for integer properties whose
/// total may not fit.
#[derive(Debug, Clone)]
pub struct Sum<T> {
    property: Property<T>,
}

impl<T> Aggregation for Sum<T>
where
    T: std::iter::Sum + DeserializeOwned,
{
    type Value = T;

    fn property(&self) -> &Property<T> {
        &self.property
    }

    fn aggregate(&self, values: Vec<T>) -> Option<T> {
        Some(values.into_iter().sum())
    }
}

/// Integer types [`CheckedSum`] can total without overflowing silently.
pub trait CheckedAdd: Sized {
    fn zero() -> Self;
    fn checked_add(self, other: Self) -> Option<Self>;
}

macro_rules! impl_checked_add {
    ($($t:ty),*) => {
        $(impl CheckedAdd for $t {
            fn zero() -> Self {
                0
            }

            fn checked_add(self, other: Self) -> Option<Self> {
                <$t>::checked_add(self, other)
            }
        })*
    };
}

impl_checked_add!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

/// Integer sum that yields `None` instead of overflowing.
#[derive(Debug, Clone)]
pub struct CheckedSum<T> {
    property: Property<T>,
}

impl<T> Aggregation for CheckedSum<T>
where
    T: CheckedAdd + DeserializeOwned,
{
    type Value = T;

    fn property(&self) -> &Property<T> {
        &self.property
    }

    fn aggregate(&self, values: Vec<T>) -> Option<T> {
        values
            .into_iter()
            .try_fold(T::zero(), |total, value| total.checked_add(value))
    }
}

pub fn max<T>(property: &Property<T>) -> Max<T> {
    Max {
        property: property.clone(),
    }
}

pub fn min<T>(property: &Property<T>) -> Min<T> {
    Min {
        property: property.clone(),
    }
}

pub fn sum<T>(property: &Property<T>) -> Sum<T> {
    Sum {
        property: property.clone(),
    }
}

pub fn checked_sum<T>(property: &Property<T>) -> CheckedSum<T> {
    CheckedSum {
        property: property.clone(),
    }
}
