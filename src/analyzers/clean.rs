use std::collections::HashSet;

use tracing::debug;

use crate::analyzers::types::{Rating, RawRating};

/// Output of [`clean`] together with how many rows each pass removed.
#[derive(Debug, Default)]
pub struct CleanReport {
    pub records: Vec<Rating>,
    pub dropped_null: usize,
    pub dropped_duplicate: usize,
}

/// Drops rows with a missing field, then exact duplicates.
///
/// A text field counts as missing when it is null or blank, and a rating when
/// it is null or NaN. Of a set of identical rows the first one is kept.
pub fn clean(rows: Vec<RawRating>) -> CleanReport {
    let total = rows.len();
    let mut records: Vec<Rating> = rows.into_iter().filter_map(complete).collect();
    let dropped_null = total - records.len();

    let first_seen: Vec<bool> = {
        let mut seen = HashSet::with_capacity(records.len());
        records.iter().map(|r| seen.insert(r.identity())).collect()
    };
    let mut first_seen = first_seen.into_iter();
    records.retain(|_| first_seen.next().unwrap_or(false));
    let dropped_duplicate = total - dropped_null - records.len();

    debug!(
        kept = records.len(),
        dropped_null, dropped_duplicate, "Cleaned ratings"
    );

    CleanReport {
        records,
        dropped_null,
        dropped_duplicate,
    }
}

fn complete(row: RawRating) -> Option<Rating> {
    let user_id = row.user_id.filter(|s| !s.trim().is_empty())?;
    let product_id = row.product_id.filter(|s| !s.trim().is_empty())?;
    let rating = row.rating.filter(|r| !r.is_nan())?;
    let timestamp = row.timestamp?;

    Some(Rating {
        user_id,
        product_id,
        rating,
        timestamp,
    })
}
