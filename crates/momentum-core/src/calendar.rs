//! Month pages for the date picker.
//!
//! Months are zero-based here (`0` is
//! January) to line up with
//! `chrono::Datelike::month0`.

use chrono::{
  Datelike,
  NaiveDate
};

pub const WEEKDAY_LABELS: [&str; 7] =
  ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"];

const MONTH_NAMES: [&str; 12] = [
  "January",
  "February",
  "March",
  "April",
  "May",
  "June",
  "July",
  "August",
  "September",
  "October",
  "November",
  "December"
];

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum CalendarCell {
  Empty,
  Day(u32)
}

impl CalendarCell {
  #[must_use]
  pub fn day(self) -> Option<u32> {
    match self {
      | Self::Day(day) => Some(day),
      | Self::Empty => None
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarPage {
  pub year:   i32,
  pub month0: u32,
  pub cells:  Vec<CalendarCell>
}

impl CalendarPage {
  #[must_use]
  pub fn new(
    year: i32,
    month0: u32
  ) -> Self {
    Self {
      year,
      month0,
      cells: build_month_grid(
        year, month0
      )
    }
  }

  pub fn weeks(
    &self
  ) -> impl Iterator<Item = &[CalendarCell]>
  {
    self.cells.chunks(7)
  }

  #[must_use]
  pub fn contains_day(
    &self,
    day: u32
  ) -> bool {
    self
      .cells
      .contains(&CalendarCell::Day(day))
  }

  #[must_use]
  pub fn day_count(&self) -> usize {
    self
      .cells
      .iter()
      .filter(|cell| {
        cell.day().is_some()
      })
      .count()
  }
}

/// Builds one calendar page: leading
/// blanks up to the weekday of the 1st,
/// the days, then trailing blanks to
/// fill the last week.
///
/// Returns an empty page when
/// `(year, month0)` is not a
/// representable month.
#[must_use]
pub fn build_month_grid(
  year: i32,
  month0: u32
) -> Vec<CalendarCell> {
  let (Some(days), Some(lead)) = (
    days_in_month(year, month0),
    first_weekday(year, month0)
  ) else {
    tracing::warn!(
      year,
      month0,
      "month outside calendar range; \
       empty page"
    );
    return Vec::new();
  };

  let mut cells = Vec::with_capacity(42);
  cells.extend(
    std::iter::repeat_n(
      CalendarCell::Empty,
      lead as usize
    )
  );
  cells.extend(
    (1..=days).map(CalendarCell::Day)
  );
  while cells.len() % 7 != 0 {
    cells.push(CalendarCell::Empty);
  }
  cells
}

/// Day count of the month, taken as the
/// day before the 1st of the following
/// month.
#[must_use]
pub fn days_in_month(
  year: i32,
  month0: u32
) -> Option<u32> {
  if month0 > 11 {
    return None;
  }
  let (next_year, next_month0) =
    if month0 == 11 {
      (year.checked_add(1)?, 0)
    } else {
      (year, month0 + 1)
    };
  let next_first =
    NaiveDate::from_ymd_opt(
      next_year,
      next_month0 + 1,
      1
    )?;
  next_first
    .pred_opt()
    .map(|last| last.day())
}

/// Weekday of the 1st, 0 = Sunday.
#[must_use]
pub fn first_weekday(
  year: i32,
  month0: u32
) -> Option<u32> {
  NaiveDate::from_ymd_opt(
    year,
    month0.checked_add(1)?,
    1
  )
  .map(|first| {
    first
      .weekday()
      .num_days_from_sunday()
  })
}

#[must_use]
pub fn month_name(
  month0: u32
) -> &'static str {
  MONTH_NAMES
    .get(month0 as usize)
    .copied()
    .unwrap_or("?")
}

#[cfg(test)]
mod tests {
  use chrono::{
    Datelike,
    NaiveDate
  };

  use super::{
    CalendarCell,
    CalendarPage,
    build_month_grid,
    days_in_month,
    first_weekday
  };

  #[test]
  fn day_counts_follow_leap_years() {
    assert_eq!(
      CalendarPage::new(2024, 1)
        .day_count(),
      29
    );
    assert_eq!(
      CalendarPage::new(2023, 1)
        .day_count(),
      28
    );
    assert_eq!(
      CalendarPage::new(2025, 3)
        .day_count(),
      30
    );
    assert_eq!(
      days_in_month(2025, 11),
      Some(31)
    );
  }

  #[test]
  fn every_page_is_whole_weeks() {
    for year in [1999, 2000, 2024, 2025]
    {
      for month0 in 0..12 {
        let cells =
          build_month_grid(year, month0);
        assert_eq!(
          cells.len() % 7,
          0,
          "{year}-{month0}"
        );
        assert!(cells.len() >= 28);
        assert!(cells.len() <= 42);
      }
    }
  }

  #[test]
  fn first_day_lands_on_its_weekday() {
    for month0 in 0..12 {
      let cells =
        build_month_grid(2025, month0);
      let idx = cells
        .iter()
        .position(|cell| {
          *cell == CalendarCell::Day(1)
        })
        .expect("day 1 present");
      let real = NaiveDate::from_ymd_opt(
        2025,
        month0 + 1,
        1
      )
      .expect("valid date")
      .weekday()
      .num_days_from_sunday();
      assert_eq!(idx as u32, real);
    }
  }

  #[test]
  fn june_2025_layout() {
    // June 1st 2025 is a Sunday.
    assert_eq!(
      first_weekday(2025, 5),
      Some(0)
    );
    let page = CalendarPage::new(2025, 5);
    let weeks: Vec<_> =
      page.weeks().collect();
    assert_eq!(weeks.len(), 5);
    assert_eq!(
      weeks[0][0],
      CalendarCell::Day(1)
    );
    assert_eq!(
      weeks[4][1],
      CalendarCell::Day(30)
    );
    assert_eq!(
      weeks[4][2],
      CalendarCell::Empty
    );
  }

  #[test]
  fn out_of_range_month_gives_empty_page()
  {
    assert!(
      build_month_grid(2025, 12)
        .is_empty()
    );
    assert!(
      !CalendarPage::new(2025, 12)
        .contains_day(1)
    );
  }
}
