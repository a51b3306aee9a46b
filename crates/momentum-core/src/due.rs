//! Due-date labels for task rows and
//! the task detail view.

use std::fmt;

use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::datetime::{
  local_date,
  parse_backend_timestamp
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DateClassification {
  Overdue,
  Today,
  Tomorrow,
  Future,
  None
}

impl fmt::Display for DateClassification {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    let text = match self {
      | Self::Overdue => "overdue",
      | Self::Today => "today",
      | Self::Tomorrow => "tomorrow",
      | Self::Future => "future",
      | Self::None => "none"
    };
    f.write_str(text)
  }
}

#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]
pub struct DueLabel {
  pub classification: DateClassification,
  pub label:          Option<String>
}

impl DueLabel {
  #[must_use]
  pub fn none() -> Self {
    Self {
      classification:
        DateClassification::None,
      label:          None
    }
  }

  #[must_use]
  pub fn is_overdue(&self) -> bool {
    self.classification
      == DateClassification::Overdue
  }

  /// Due today or tomorrow.
  #[must_use]
  pub fn is_soon(&self) -> bool {
    matches!(
      self.classification,
      DateClassification::Today
        | DateClassification::Tomorrow
    )
  }
}

/// Signed count of calendar days from
/// today to the due date, both read as
/// local dates in `tz`.
#[must_use]
pub fn days_until(
  due: DateTime<Utc>,
  now: DateTime<Utc>,
  tz: &Tz
) -> i64 {
  local_date(due, tz)
    .signed_duration_since(local_date(
      now, tz
    ))
    .num_days()
}

#[must_use]
pub fn classify_days(
  diff_days: i64
) -> DateClassification {
  match diff_days {
    | d if d < 0 => {
      DateClassification::Overdue
    }
    | 0 => DateClassification::Today,
    | 1 => DateClassification::Tomorrow,
    | _ => DateClassification::Future
  }
}

#[must_use]
pub fn label_due(
  due: Option<DateTime<Utc>>,
  now: DateTime<Utc>,
  completed: bool,
  tz: &Tz
) -> DueLabel {
  let Some(due) = due else {
    return DueLabel::none();
  };
  if completed {
    return DueLabel::none();
  }

  let diff = days_until(due, now, tz);
  let classification =
    classify_days(diff);
  let label = match classification {
    | DateClassification::Overdue => {
      format!(
        "{}d overdue",
        diff.unsigned_abs()
      )
    }
    | DateClassification::Today => {
      "Today".to_string()
    }
    | DateClassification::Tomorrow => {
      "Tomorrow".to_string()
    }
    | DateClassification::Future
    | DateClassification::None => {
      short_date(due, tz)
    }
  };

  DueLabel {
    classification,
    label: Some(label)
  }
}

/// Same as [`label_due`] for the
/// backend's raw `due_date` text.
pub fn classify_due_str(
  raw: Option<&str>,
  now: DateTime<Utc>,
  completed: bool,
  tz: &Tz
) -> anyhow::Result<DueLabel> {
  let due = raw
    .map(parse_backend_timestamp)
    .transpose()?;
  Ok(label_due(due, now, completed, tz))
}

/// `Jun 20`. The year is left off even
/// when the date is in another year.
#[must_use]
pub fn short_date(
  dt: DateTime<Utc>,
  tz: &Tz
) -> String {
  dt.with_timezone(tz)
    .format("%b %-d")
    .to_string()
}

/// `Mar 5, 2025  •  9:00 AM`
#[must_use]
pub fn format_due_full(
  dt: DateTime<Utc>,
  tz: &Tz
) -> String {
  dt.with_timezone(tz)
    .format("%b %-d, %Y  •  %-I:%M %p")
    .to_string()
}
