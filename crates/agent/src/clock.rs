use chrono::{Local, NaiveDate};

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Pins "today" to a fixed date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
