pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::BeanpodError;
pub use types::{is_missing_vector, Bean, BeanKind, KeywordMap, MediaNoise, NewsNugget};

/// Epoch seconds for `days` days before now. Time-window filters and the
/// age-out sweep are all expressed against this.
pub fn epoch_days_ago(days: i64) -> i64 {
    chrono::Utc::now().timestamp() - days * 86_400
}

/// Epoch seconds now.
pub fn epoch_now() -> i64 {
    chrono::Utc::now().timestamp()
}
