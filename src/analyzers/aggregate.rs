use std::collections::BTreeMap;

use tracing::debug;

use crate::analyzers::types::{AggregateRow, Rating};
use crate::analyzers::utility::mean;

/// Groups cleaned ratings by exact product id and averages each group.
///
/// Rows come out ordered by product id. Products without records get no row.
pub fn aggregate(records: &[Rating]) -> Vec<AggregateRow> {
    let mut series: BTreeMap<&str, Vec<f64>> = BTreeMap::new();

    for record in records {
        series
            .entry(record.product_id.as_str())
            .or_default()
            .push(record.rating);
    }

    let rows: Vec<AggregateRow> = series
        .into_iter()
        .filter_map(|(product_id, ratings)| {
            mean(&ratings).map(|avg_rating| AggregateRow {
                product_id: product_id.to_string(),
                avg_rating,
            })
        })
        .collect();

    debug!(
        input = records.len(),
        products = rows.len(),
        "Aggregated ratings"
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rating(user: &str, product: &str, value: f64) -> Rating {
        Rating {
            user_id: user.to_string(),
            product_id: product.to_string(),
            rating: value,
            timestamp: NaiveDate::from_ymd_opt(2013, 6, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate(&[]).is_empty());
    }

    #[test]
    fn test_aggregate_means_per_product() {
        let records = vec![
            rating("u1", "p1", 5.0),
            rating("u2", "p1", 3.0),
            rating("u3", "p2", 1.0),
            rating("u4", "p2", 2.0),
            rating("u5", "p2", 2.0),
        ];

        let rows = aggregate(&records);
        assert_eq!(
            rows,
            vec![
                AggregateRow {
                    product_id: "p1".into(),
                    avg_rating: 4.0
                },
                AggregateRow {
                    product_id: "p2".into(),
                    avg_rating: 5.0 / 3.0
                },
            ]
        );
    }

    #[test]
    fn test_aggregate_key_is_case_sensitive() {
        let records = vec![rating("u1", "B00X", 5.0), rating("u2", "b00x", 1.0)];
        let rows = aggregate(&records);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.avg_rating == 5.0 || r.avg_rating == 1.0));
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let mut records = vec![
            rating("u1", "p2", 4.0),
            rating("u2", "p1", 2.0),
            rating("u3", "p2", 1.0),
        ];
        let forward = aggregate(&records);
        records.reverse();
        assert_eq!(forward, aggregate(&records));
    }
}
