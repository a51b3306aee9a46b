use std::fmt;

use chrono::{
  NaiveTime,
  Timelike
};

pub const MINUTE_STEP: u32 = 5;

#[must_use]
pub fn next_hour(hour: u32) -> u32 {
  (hour % 24 + 1) % 24
}

#[must_use]
pub fn prev_hour(hour: u32) -> u32 {
  (hour % 24 + 24 - 1) % 24
}

#[must_use]
pub fn next_minute(minute: u32) -> u32 {
  (minute % 60 + MINUTE_STEP) % 60
}

#[must_use]
pub fn prev_minute(minute: u32) -> u32 {
  (minute % 60 + 60 - MINUTE_STEP) % 60
}

/// Hour and minute of the picker's
/// time tab. Seconds are not tracked.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub struct TimeOfDay {
  pub hour:   u32,
  pub minute: u32
}

impl TimeOfDay {
  #[must_use]
  pub fn new(
    hour: u32,
    minute: u32
  ) -> Self {
    Self {
      hour:   hour % 24,
      minute: minute % 60
    }
  }

  #[must_use]
  pub fn from_time(
    time: NaiveTime
  ) -> Self {
    Self::new(
      time.hour(),
      time.minute()
    )
  }

  pub fn hour_up(&mut self) {
    self.hour = next_hour(self.hour);
  }

  pub fn hour_down(&mut self) {
    self.hour = prev_hour(self.hour);
  }

  pub fn minute_up(&mut self) {
    self.minute =
      next_minute(self.minute);
  }

  pub fn minute_down(&mut self) {
    self.minute =
      prev_minute(self.minute);
  }

  #[must_use]
  pub fn to_naive_time(
    self
  ) -> NaiveTime {
    NaiveTime::from_hms_opt(
      self.hour % 24,
      self.minute % 60,
      0
    )
    .unwrap_or(NaiveTime::MIN)
  }

  /// `9:05 AM`, `12:00 PM`.
  #[must_use]
  pub fn format_12h(&self) -> String {
    let display_hour =
      match self.hour % 12 {
        | 0 => 12,
        | h => h
      };
    let meridiem = if self.hour >= 12 {
      "PM"
    } else {
      "AM"
    };
    format!(
      "{display_hour}:{:02} {meridiem}",
      self.minute
    )
  }
}

impl fmt::Display for TimeOfDay {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "{:02}:{:02}",
      self.hour, self.minute
    )
  }
}
