//! In-memory queries and bulk writes over entity documents.
//!
//! Filters, orders and aggregations are built from [`Property`](crate::metamodel::Property)
//! accessors and evaluated against committed documents; commands are started
//! from a [`Session`](crate::session::Session).

pub mod aggregation;
pub mod command;
pub mod filter;
pub mod order;

pub use aggregation::{Aggregation, CheckedAdd, CheckedSum, Max, Min, Sum, checked_sum, max, min, sum};
pub use command::{Command, Delete, GetList, GetScalar, Update};
pub use filter::{ComparableFilter, Filter, InFilter, Operator};
pub use order::{Direction, Order, Sort};
