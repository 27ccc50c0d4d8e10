use std::io::Write;

use chrono::{Datelike, Months, NaiveDate, Utc};
use performance_dashboard::aggregate::TREND_MONTHS;
use performance_dashboard::{
    Category, DashboardView, Filters, Importer, MemoryStore, RawInputRow, RecordQuery,
    RecordStore, Registry,
};

fn this_month(day: u32) -> NaiveDate {
    let today = Utc::now().date_naive();
    today.with_day(day.min(today.day())).unwrap_or(today)
}

fn last_month(day: u32) -> NaiveDate {
    this_month(1)
        .checked_sub_months(Months::new(1))
        .and_then(|month| month.with_day(day))
        .expect("valid date")
}

#[tokio::test]
async fn csv_import_feeds_live_dashboard() {
    let store = MemoryStore::new();
    let registry = Registry::default();
    let mut subscription = store.subscribe(RecordQuery::all()).await.expect("subscribe");
    assert!(subscription.current().is_empty());

    let mut file = tempfile::Builder::new()
        .suffix(".csv")
        .tempfile()
        .expect("temp csv");
    writeln!(file, "District,Category,Value,Date").expect("write");
    writeln!(file, " ganjam ,NBW,30,{}", this_month(1)).expect("write");
    writeln!(file, "Ganjam,NBW,15,{}", last_month(10)).expect("write");
    writeln!(file, "Puri,Narcotics,\"1,200\",{}", this_month(1)).expect("write");
    writeln!(file, "Atlantis,NBW,3,{}", this_month(1)).expect("write");
    writeln!(file, "Puri,Traffic,3,{}", this_month(1)).expect("write");
    writeln!(file, "Cuttack,Firearms,abc,{}", this_month(1)).expect("write");
    file.flush().expect("flush");

    let outcome = Importer::new(&store, &registry)
        .import_sheet(file.path())
        .await
        .expect("import");
    assert_eq!(outcome.added, 3);
    assert_eq!(outcome.rejected.len(), 3);
    assert_eq!(store.commits(), 1);

    let records = subscription.next().await.expect("snapshot after import");
    assert_eq!(records.len(), 3);

    let filters = Filters {
        range: Some(performance_dashboard::DateRange::new(this_month(1), this_month(31))),
        ..Filters::default()
    };
    let view = DashboardView::compute(&records, &filters, &registry, Utc::now().date_naive());

    let nbw = view
        .kpis
        .iter()
        .find(|metric| metric.category == Category::Nbw)
        .expect("nbw metric");
    assert_eq!(nbw.value, 30.0);
    assert_eq!(nbw.change, 100.0);

    assert_eq!(view.comparison.len(), registry.districts().len());
    assert_eq!(view.trend.len(), TREND_MONTHS as usize);
    assert_eq!(view.trend[5].totals.get(Category::Narcotics), 1200.0);
    assert_eq!(view.trend[4].totals.get(Category::Nbw), 15.0);

    let leader = &view.leaderboard[0];
    assert_eq!(leader.district.name, "Puri");
    assert_eq!(leader.score, 1200.0);
    assert_eq!(view.leaderboard[1].district.name, "Ganjam");
    assert_eq!(view.leaderboard[1].score, 45.0);
}

#[tokio::test]
async fn manual_and_batch_writes_share_one_feed() {
    let store = MemoryStore::new();
    let registry = Registry::default();
    let importer = Importer::new(&store, &registry);
    let mut cuttack = store
        .subscribe(RecordQuery::district(2))
        .await
        .expect("subscribe");

    let form = RawInputRow::new()
        .with("districtId", 2)
        .with("category", "Missing Person")
        .with("value", 5.0)
        .with("date", this_month(1));
    importer.submit(&form).await.expect("submit");
    let after_submit = cuttack.next().await.expect("snapshot");
    assert_eq!(after_submit.len(), 1);

    let rows: Vec<RawInputRow> = (0..4)
        .map(|n| {
            RawInputRow::new()
                .with("District", if n % 2 == 0 { "Cuttack" } else { "Puri" })
                .with("Category", "Conviction")
                .with("Value", f64::from(n))
                .with("Date", 45000.0 + f64::from(n))
        })
        .collect();
    let outcome = importer.import_rows(&rows).await.expect("import");
    assert_eq!(outcome.added, 4);

    let after_batch = cuttack.next().await.expect("snapshot");
    assert_eq!(after_batch.len(), 3);
    assert!(after_batch.iter().all(|record| record.district_id == 2));
    assert_eq!(store.records().len(), 5);
}
