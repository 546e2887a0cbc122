use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{AcidError, Result};
use crate::metamodel::Property;

/// Predicate over entity documents. Filters given to one command are combined
/// with logical and.
pub trait Filter: fmt::Display + Send + Sync {
    fn matches(&self, body: &Value) -> bool;
}

/// Property comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    EqualTo,
    NotEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
}

impl Operator {
    /// Whether `left <op> right` holds, given `left.partial_cmp(right)`.
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Operator::EqualTo => ordering == Ordering::Equal,
            Operator::NotEqualTo => ordering != Ordering::Equal,
            Operator::GreaterThan => ordering == Ordering::Greater,
            Operator::GreaterThanOrEqualTo => ordering != Ordering::Less,
            Operator::LessThan => ordering == Ordering::Less,
            Operator::LessThanOrEqualTo => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::EqualTo => "==",
            Operator::NotEqualTo => "!=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqualTo => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqualTo => "<=",
        })
    }
}

/// `property <operator> value`. Documents missing the property, or whose
/// value is not comparable, never match.
#[derive(Debug, Clone)]
pub struct ComparableFilter<T> {
    property: Property<T>,
    operator: Operator,
    value: T,
}

impl<T> ComparableFilter<T> {
    pub fn new(property: Property<T>, operator: Operator, value: T) -> Self {
        Self {
            property,
            operator,
            value,
        }
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Filter for ComparableFilter<T>
where
    T: PartialOrd + Serialize + DeserializeOwned + Send + Sync,
{
    fn matches(&self, body: &Value) -> bool {
        match self.property.get(body) {
            Ok(Some(left)) => left
                .partial_cmp(&self.value)
                .is_some_and(|ordering| self.operator.holds(ordering)),
            _ => false,
        }
    }
}

impl<T: Serialize> fmt::Display for ComparableFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.property, self.operator, literal(&self.value))
    }
}

/// `property` equals any of a non-empty list of values.
#[derive(Debug, Clone)]
pub struct InFilter<T> {
    property: Property<T>,
    values: Vec<T>,
}

impl<T> InFilter<T> {
    pub fn new(property: Property<T>, values: Vec<T>) -> Result<Self> {
        if values.is_empty() {
            return Err(AcidError::InvalidArgument(format!(
                "'values' of the in-filter on [{property}] must not be empty"
            )));
        }
        Ok(Self { property, values })
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }
}

impl<T> Filter for InFilter<T>
where
    T: PartialOrd + Serialize + DeserializeOwned + Send + Sync,
{
    fn matches(&self, body: &Value) -> bool {
        match self.property.get(body) {
            Ok(Some(left)) => self
                .values
                .iter()
                .any(|value| left.partial_cmp(value) == Some(Ordering::Equal)),
            _ => false,
        }
    }
}

impl<T: Serialize> fmt::Display for InFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alternatives: Vec<String> = self
            .values
            .iter()
            .map(|value| format!("{} {} {}", self.property, Operator::EqualTo, literal(value)))
            .collect();
        write!(f, "({})", alternatives.join(" || "))
    }
}

fn literal<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "?".to_string())
}

impl<T> Property<T> {
    pub fn equal_to(&self, value: T) -> ComparableFilter<T> {
        ComparableFilter::new(self.clone(), Operator::EqualTo, value)
    }

    pub fn not_equal_to(&self, value: T) -> ComparableFilter<T> {
        ComparableFilter::new(self.clone(), Operator::NotEqualTo, value)
    }

    pub fn greater_than(&self, value: T) -> ComparableFilter<T> {
        ComparableFilter::new(self.clone(), Operator::GreaterThan, value)
    }

    pub fn greater_than_or_equal_to(&self, value: T) -> ComparableFilter<T> {
        ComparableFilter::new(self.clone(), Operator::GreaterThanOrEqualTo, value)
    }

    pub fn less_than(&self, value: T) -> ComparableFilter<T> {
        ComparableFilter::new(self.clone(), Operator::LessThan, value)
    }

    pub fn less_than_or_equal_to(&self, value: T) -> ComparableFilter<T> {
        ComparableFilter::new(self.clone(), Operator::LessThanOrEqualTo, value)
    }

    pub fn in_values(&self, values: Vec<T>) -> Result<InFilter<T>> {
        InFilter::new(self.clone(), values)
    }
}
