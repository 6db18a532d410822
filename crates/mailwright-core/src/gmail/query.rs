use chrono::{Days, NaiveDate};

pub const DEFAULT_QUERY: &str = "is:inbox";

/// Appends an `after:YYYY/MM/DD` restriction `days_back` days before `today`.
pub fn with_days_back(query: &str, days_back: Option<u32>, today: NaiveDate) -> String {
    let query = query.trim();
    let Some(days) = days_back else {
        return query.to_string();
    };
    let cutoff = today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN);
    let clause = format!("after:{}", cutoff.format("%Y/%m/%d"));
    if query.is_empty() {
        clause
    } else {
        format!("{query} {clause}")
    }
}
