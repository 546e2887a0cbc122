use std::cmp::Ordering;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::metamodel::Property;

/// Sorting direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        })
    }
}

/// Comparator over entity documents.
pub trait Sort: fmt::Display + Send + Sync {
    fn compare(&self, a: &Value, b: &Value) -> Ordering;
}

/// Sort by one property. Documents missing the property sort first in
/// ascending order.
#[derive(Debug, Clone)]
pub struct Order<T> {
    property: Property<T>,
    direction: Direction,
}

impl<T> Order<T> {
    pub fn new(property: Property<T>, direction: Direction) -> Self {
        Self {
            property,
            direction,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl<T> Sort for Order<T>
where
    T: PartialOrd + DeserializeOwned + Send + Sync,
{
    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let left = self.property.get(a).ok().flatten();
        let right = self.property.get(b).ok().flatten();
        let ordering = match (left, right) {
            (Some(left), Some(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

impl<T> fmt::Display for Order<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.property, self.direction)
    }
}

impl<T> Property<T> {
    pub fn asc(&self) -> Order<T> {
        Order::new(self.clone(), Direction::Asc)
    }

    pub fn desc(&self) -> Order<T> {
        Order::new(self.clone(), Direction::Desc)
    }
}

/// Sorts documents by `orders` applied lexicographically. Stable, so equal
/// documents keep their scan order.
pub(crate) fn sort_documents<D>(documents: &mut [D], orders: &[Box<dyn Sort>], body: impl Fn(&D) -> &Value) {
    if orders.is_empty() {
        return;
    }
    documents.sort_by(|a, b| {
        orders
            .iter()
            .map(|order| order.compare(body(a), body(b)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}
