//! C6: per-fragment pipelines (compute → normalize → compact → cache).
//! Each builder owns its own cache keys and TTL and is independently
//! awaitable by the orchestrator's fan-out (spec.md §4.6).

pub mod analyst_signals;
pub mod earnings_call;
pub mod filing_summary;
pub mod institutional;
pub mod macro_context;
pub mod momentum;
pub mod news;
pub mod price_meta;

fn prior_trading_day(date: chrono::NaiveDate) -> chrono::NaiveDate {
    use chrono::Weekday;
    let mut d = date - chrono::Duration::days(1);
    while matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
        d -= chrono::Duration::days(1);
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn prior_trading_day_skips_weekend() {
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(prior_trading_day(monday), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }
}
