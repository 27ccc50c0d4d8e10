//! Dashboard projections over a record snapshot.
//!
//! Every function here is pure: callers re-run them on each filter change or
//! store snapshot. Grids are always complete (every district, every
//! category, every trend month) with zeros where there is no data.

use std::collections::HashMap;

use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;

use crate::models::{CategoryTotals, PerformanceMetric, PerformanceRecord};
use crate::registry::{Category, District, Registry};

pub const TREND_MONTHS: u32 = 6;

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Earliest to latest record date.
    pub fn spanning(records: &[PerformanceRecord]) -> Option<Self> {
        let start = records.iter().map(|record| record.date).min()?;
        let end = records.iter().map(|record| record.date).max()?;
        Some(Self { start, end })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Filters {
    pub district_id: Option<i32>,
    pub category: Option<Category>,
    pub range: Option<DateRange>,
}

impl Filters {
    fn matches_district(&self, record: &PerformanceRecord) -> bool {
        self.district_id.map_or(true, |id| record.district_id == id)
    }

    fn matches_category(&self, record: &PerformanceRecord) -> bool {
        self.category.map_or(true, |category| record.category == category)
    }

    /// The explicit range, or the span of the records when none was chosen.
    pub fn effective_range(&self, records: &[PerformanceRecord]) -> Option<DateRange> {
        self.range.or_else(|| DateRange::spanning(records))
    }

    fn selects(&self, record: &PerformanceRecord, range: Option<DateRange>) -> bool {
        self.matches_district(record)
            && self.matches_category(record)
            && range.is_some_and(|range| range.contains(record.date))
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// The whole calendar month before the month containing `date`.
pub fn previous_month(date: NaiveDate) -> Option<DateRange> {
    let this_month = month_start(date);
    let start = this_month.checked_sub_months(Months::new(1))?;
    let end = this_month.pred_opt()?;
    Some(DateRange { start, end })
}

/// Period-over-period change in percent. A zero baseline reports 100 when
/// anything happened and 0 otherwise.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else if current > 0.0 {
        100.0
    } else {
        0.0
    }
}

pub fn kpi_metrics(records: &[PerformanceRecord], filters: &Filters) -> Vec<PerformanceMetric> {
    let range = filters.effective_range(records);
    let previous = range.and_then(|range| previous_month(range.start));

    let mut current_totals = CategoryTotals::default();
    let mut previous_totals = CategoryTotals::default();
    for record in records {
        if filters.selects(record, range) {
            current_totals.add(record.category, record.value);
        }
        if filters.matches_district(record) && previous.is_some_and(|p| p.contains(record.date)) {
            previous_totals.add(record.category, record.value);
        }
    }

    Category::ALL
        .into_iter()
        .map(|category| {
            let value = current_totals.get(category);
            PerformanceMetric {
                category,
                label: category.label().to_string(),
                value,
                change: percent_change(value, previous_totals.get(category)),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictTotals {
    pub district: District,
    pub totals: CategoryTotals,
}

pub fn comparison_matrix(
    records: &[PerformanceRecord],
    filters: &Filters,
    registry: &Registry,
) -> Vec<DistrictTotals> {
    let range = filters.effective_range(records);
    let mut by_district: HashMap<i32, CategoryTotals> = HashMap::new();

    for record in records.iter().filter(|record| filters.selects(record, range)) {
        by_district
            .entry(record.district_id)
            .or_default()
            .add(record.category, record.value);
    }

    registry
        .districts()
        .iter()
        .map(|district| DistrictTotals {
            district: district.clone(),
            totals: by_district.get(&district.id).copied().unwrap_or_default(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendBucket {
    pub month: NaiveDate,
    pub label: String,
    pub totals: CategoryTotals,
}

/// Six month buckets ending with the month of `today`, oldest first. Only the
/// district filter applies.
pub fn trend_series(
    records: &[PerformanceRecord],
    filters: &Filters,
    today: NaiveDate,
) -> Vec<TrendBucket> {
    let current = month_start(today);
    let mut buckets: Vec<TrendBucket> = (0..TREND_MONTHS)
        .rev()
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .map(|month| TrendBucket {
            month,
            label: month.format("%b %Y").to_string(),
            totals: CategoryTotals::default(),
        })
        .collect();

    let Some(window_start) = buckets.first().map(|bucket| bucket.month) else {
        return buckets;
    };

    for record in records {
        if record.date < window_start || !filters.matches_district(record) {
            continue;
        }
        let month = month_start(record.date);
        if let Some(bucket) = buckets.iter_mut().find(|bucket| bucket.month == month) {
            bucket.totals.add(record.category, record.value);
        }
    }

    buckets
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub district: District,
    pub score: f64,
    pub totals: CategoryTotals,
}

/// Ranks every district by its all-time total. Filters never apply; equal
/// scores keep registry order.
pub fn leaderboard(records: &[PerformanceRecord], registry: &Registry) -> Vec<LeaderboardEntry> {
    let mut by_district: HashMap<i32, CategoryTotals> = HashMap::new();
    for record in records {
        if registry.by_id(record.district_id).is_some() {
            by_district
                .entry(record.district_id)
                .or_default()
                .add(record.category, record.value);
        }
    }

    let mut entries: Vec<LeaderboardEntry> = registry
        .districts()
        .iter()
        .map(|district| {
            let totals = by_district.get(&district.id).copied().unwrap_or_default();
            LeaderboardEntry {
                rank: 0,
                district: district.clone(),
                score: totals.total(),
                totals,
            }
        })
        .collect();

    // sort_by is stable
    entries.sort_by(|a, b| b.score.total_cmp(&a.score));
    for (position, entry) in entries.iter_mut().enumerate() {
        entry.rank = position + 1;
    }
    entries
}

/// All four projections for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub filters: Filters,
    pub range: Option<DateRange>,
    pub kpis: Vec<PerformanceMetric>,
    pub comparison: Vec<DistrictTotals>,
    pub trend: Vec<TrendBucket>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl DashboardView {
    pub fn compute(
        records: &[PerformanceRecord],
        filters: &Filters,
        registry: &Registry,
        today: NaiveDate,
    ) -> Self {
        Self {
            filters: *filters,
            range: filters.effective_range(records),
            kpis: kpi_metrics(records, filters),
            comparison: comparison_matrix(records, filters, registry),
            trend: trend_series(records, filters, today),
            leaderboard: leaderboard(records, registry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn record(district_id: i32, category: Category, value: f64, date: NaiveDate) -> PerformanceRecord {
        PerformanceRecord {
            id: Uuid::new_v4(),
            district_id,
            category,
            value,
            date,
        }
    }

    fn metric(metrics: &[PerformanceMetric], category: Category) -> &PerformanceMetric {
        metrics
            .iter()
            .find(|metric| metric.category == category)
            .expect("every category has a metric")
    }

    fn march() -> Filters {
        Filters {
            range: Some(DateRange::new(date(2024, 3, 1), date(2024, 3, 31))),
            ..Filters::default()
        }
    }

    #[test]
    fn change_without_baseline_is_one_hundred() {
        let records = vec![record(1, Category::Nbw, 10.0, date(2024, 3, 10))];
        let metrics = kpi_metrics(&records, &march());

        assert_eq!(metrics.len(), 8);
        let nbw = metric(&metrics, Category::Nbw);
        assert_eq!(nbw.value, 10.0);
        assert_eq!(nbw.change, 100.0);
        assert_eq!(nbw.label, "NBW Execution");
        assert_eq!(metric(&metrics, Category::Firearms).change, 0.0);
    }

    #[test]
    fn change_against_previous_month() {
        let records = vec![
            record(1, Category::Nbw, 30.0, date(2024, 3, 2)),
            record(2, Category::Nbw, 20.0, date(2024, 3, 20)),
            record(1, Category::Nbw, 25.0, date(2024, 2, 29)),
            record(1, Category::Nbw, 99.0, date(2024, 1, 31)),
        ];
        let metrics = kpi_metrics(&records, &march());
        let nbw = metric(&metrics, Category::Nbw);
        assert_eq!(nbw.value, 50.0);
        assert_eq!(nbw.change, 100.0);

        assert_eq!(percent_change(50.0, 25.0), 100.0);
        assert_eq!(percent_change(10.0, 40.0), -75.0);
        assert_eq!(percent_change(0.0, 0.0), 0.0);
    }

    #[test]
    fn previous_month_follows_district_filter() {
        let records = vec![
            record(1, Category::Narcotics, 10.0, date(2024, 3, 5)),
            record(1, Category::Narcotics, 5.0, date(2024, 2, 5)),
            record(2, Category::Narcotics, 50.0, date(2024, 2, 5)),
        ];
        let filters = Filters {
            district_id: Some(1),
            ..march()
        };
        let metrics = kpi_metrics(&records, &filters);
        assert_eq!(metric(&metrics, Category::Narcotics).change, 100.0);
    }

    #[test]
    fn previous_month_is_the_calendar_month_before_start() {
        assert_eq!(
            previous_month(date(2024, 3, 15)),
            Some(DateRange::new(date(2024, 2, 1), date(2024, 2, 29)))
        );
        assert_eq!(
            previous_month(date(2024, 1, 1)),
            Some(DateRange::new(date(2023, 12, 1), date(2023, 12, 31)))
        );
    }

    #[test]
    fn missing_range_defaults_to_record_span() {
        let records = vec![
            record(1, Category::Firearms, 1.0, date(2023, 11, 4)),
            record(3, Category::Firearms, 2.0, date(2024, 2, 9)),
        ];
        let filters = Filters::default();
        assert_eq!(
            filters.effective_range(&records),
            Some(DateRange::new(date(2023, 11, 4), date(2024, 2, 9)))
        );
        assert_eq!(metric(&kpi_metrics(&records, &filters), Category::Firearms).value, 3.0);
        assert!(kpi_metrics(&[], &filters).iter().all(|m| m.value == 0.0 && m.change == 0.0));
    }

    #[test]
    fn category_filter_zeroes_other_categories() {
        let records = vec![
            record(1, Category::Nbw, 4.0, date(2024, 3, 2)),
            record(1, Category::Firearms, 6.0, date(2024, 3, 2)),
        ];
        let filters = Filters {
            category: Some(Category::Firearms),
            ..march()
        };
        let metrics = kpi_metrics(&records, &filters);
        assert_eq!(metric(&metrics, Category::Nbw).value, 0.0);
        assert_eq!(metric(&metrics, Category::Firearms).value, 6.0);
    }

    #[test]
    fn comparison_matrix_lists_every_district() {
        let registry = Registry::default();
        let records = vec![
            record(2, Category::Conviction, 7.0, date(2024, 3, 3)),
            record(2, Category::Conviction, 1.0, date(2024, 3, 9)),
            record(5, Category::SandMining, 2.0, date(2024, 3, 9)),
            record(5, Category::SandMining, 40.0, date(2024, 4, 1)),
            record(99, Category::Nbw, 5.0, date(2024, 3, 9)),
        ];

        for filters in [march(), Filters { district_id: Some(4), ..march() }, Filters::default()] {
            let matrix = comparison_matrix(&records, &filters, &registry);
            let ids: Vec<i32> = matrix.iter().map(|row| row.district.id).collect();
            assert_eq!(ids, [1, 2, 3, 4, 5, 6]);
        }

        let matrix = comparison_matrix(&records, &march(), &registry);
        assert_eq!(matrix[1].totals.get(Category::Conviction), 8.0);
        assert_eq!(matrix[4].totals.get(Category::SandMining), 2.0);
        assert_eq!(matrix[0].totals.total(), 0.0);

        let only_puri = comparison_matrix(&records, &Filters { district_id: Some(4), ..march() }, &registry);
        assert!(only_puri.iter().all(|row| row.totals.total() == 0.0));
    }

    #[test]
    fn trend_has_six_months_anchored_to_today() {
        let today = date(2024, 8, 14);
        let records = vec![
            record(1, Category::Nbw, 3.0, date(2024, 8, 1)),
            record(1, Category::Nbw, 4.0, date(2024, 3, 31)),
            record(2, Category::Narcotics, 5.0, date(2024, 3, 1)),
            record(1, Category::Nbw, 100.0, date(2024, 2, 29)),
            record(1, Category::Nbw, 100.0, date(2024, 9, 1)),
        ];
        let narrow = Filters {
            range: Some(DateRange::new(date(2024, 8, 1), date(2024, 8, 2))),
            ..Filters::default()
        };

        for filters in [Filters::default(), narrow] {
            let trend = trend_series(&records, &filters, today);
            let months: Vec<&str> = trend.iter().map(|bucket| bucket.label.as_str()).collect();
            assert_eq!(
                months,
                ["Mar 2024", "Apr 2024", "May 2024", "Jun 2024", "Jul 2024", "Aug 2024"]
            );
            assert_eq!(trend[0].totals.get(Category::Nbw), 4.0);
            assert_eq!(trend[0].totals.get(Category::Narcotics), 5.0);
            assert_eq!(trend[1].totals.total(), 0.0);
            assert_eq!(trend[5].totals.get(Category::Nbw), 3.0);
        }

        let district_one = Filters {
            district_id: Some(1),
            ..Filters::default()
        };
        let trend = trend_series(&records, &district_one, today);
        assert_eq!(trend[0].totals.get(Category::Narcotics), 0.0);
    }

    #[test]
    fn trend_crosses_year_boundary() {
        let trend = trend_series(&[], &Filters::default(), date(2024, 2, 29));
        assert_eq!(trend.len(), 6);
        assert_eq!(trend[0].month, date(2023, 9, 1));
        assert_eq!(trend[5].month, date(2024, 2, 1));
    }

    #[test]
    fn leaderboard_is_stable_and_ignores_filters() {
        let registry = Registry::default();
        let records = vec![
            record(3, Category::Nbw, 5.0, date(2020, 1, 1)),
            record(5, Category::Firearms, 2.0, date(2024, 3, 1)),
            record(5, Category::Narcotics, 3.0, date(2024, 3, 1)),
            record(6, Category::Conviction, 9.0, date(2024, 3, 1)),
            record(42, Category::Conviction, 90.0, date(2024, 3, 1)),
        ];

        let first = leaderboard(&records, &registry);
        let order: Vec<i32> = first.iter().map(|entry| entry.district.id).collect();
        assert_eq!(order, [6, 3, 5, 1, 2, 4]);
        let ranks: Vec<usize> = first.iter().map(|entry| entry.rank).collect();
        assert_eq!(ranks, [1, 2, 3, 4, 5, 6]);
        assert_eq!(first[2].totals.get(Category::Narcotics), 3.0);
        assert_eq!(first[2].score, 5.0);

        for _ in 0..5 {
            assert_eq!(leaderboard(&records, &registry), first);
        }
    }

    #[test]
    fn dashboard_bundles_all_projections() {
        let registry = Registry::default();
        let records = vec![record(1, Category::Nbw, 10.0, date(2024, 3, 10))];
        let view = DashboardView::compute(&records, &march(), &registry, date(2024, 3, 31));

        assert_eq!(view.kpis.len(), 8);
        assert_eq!(view.comparison.len(), 6);
        assert_eq!(view.trend.len(), 6);
        assert_eq!(view.leaderboard[0].district.id, 1);
        assert_eq!(view.range, march().range);
    }
}
