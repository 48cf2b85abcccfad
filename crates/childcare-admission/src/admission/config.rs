use chrono::{Local, NaiveDate};

use super::guard::LotterySeason;
use super::lottery::RandomSource;

/// Runtime dials for the admission service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionConfig {
    pub random: RandomSource,
    pub season: Option<LotterySeason>,
    /// Pins "today" for age calculation and season checks.
    pub as_of: Option<NaiveDate>,
}

impl AdmissionConfig {
    pub fn today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Local::now().date_naive())
    }
}
