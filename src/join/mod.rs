mod anomaly;
mod joiner;

pub use anomaly::{flag_anomalies, Anomaly, PlausibilityBounds};
pub use joiner::{join_baseline, normalize_table, JoinReport, MissingRow, PRICE_COLUMN, YEAR_COLUMN};
