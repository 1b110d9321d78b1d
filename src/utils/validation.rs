use chrono::{DateTime, Utc};
use validator::Validate;

pub fn validate<T: Validate>(val: &T) -> Result<(), validator::ValidationErrors> {
    val.validate()
}

pub fn valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

pub fn valid_longitude(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon)
}

/// Half-open interval check used by the availability ledger; a window must
/// have positive length.
pub fn valid_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    start < end
}
