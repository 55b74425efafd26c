//! Daily aggregation of normalized samples.
//!
//! Samples are bucketed by the date component of their (UTC) timestamp. Days
//! without samples produce no row.

use super::observation::NormalizedObservation;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One day's summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub price_mean: f64,
    pub price_median: f64,
    pub volume_sum: f64,
}

/// Daily aggregates for one item, ascending by date with unique dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemSeries {
    days: Vec<DailyAggregate>,
}

impl ItemSeries {
    pub fn days(&self) -> &[DailyAggregate] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.days.first().map(|d| d.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.days.last().map(|d| d.date)
    }
}

/// Median of a non-empty slice; sorts in place.
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Sum in ascending order so the result does not depend on input order.
fn ordered_sum(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    values.iter().sum()
}

/// Group samples by calendar day and compute mean, median and volume sum.
pub fn aggregate(observations: &[NormalizedObservation]) -> ItemSeries {
    let mut by_day: BTreeMap<NaiveDate, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for obs in observations {
        let (prices, volumes) = by_day.entry(obs.timestamp.date()).or_default();
        prices.push(obs.price);
        volumes.push(obs.volume);
    }

    let days = by_day
        .into_iter()
        .map(|(date, (mut prices, mut volumes))| {
            let price_median = median(&mut prices);
            let price_mean = prices.iter().sum::<f64>() / prices.len() as f64;
            DailyAggregate {
                date,
                price_mean,
                price_median,
                volume_sum: ordered_sum(&mut volumes),
            }
        })
        .collect();

    ItemSeries { days }
}
