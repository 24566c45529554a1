//! Cleaning and aggregation of a period's ratings.
//!
//! Raw store rows pass through [`clean::clean`], which drops incomplete and
//! duplicate rows, and then [`aggregate::aggregate`], which produces one mean
//! rating per product.

pub mod aggregate;
pub mod clean;
pub mod types;
pub mod utility;

pub use aggregate::aggregate;
pub use clean::{CleanReport, clean};
pub use types::{AggregateRow, Rating, RawRating};
