use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Offset,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::config::Config;

const TIMEZONE_CONFIG_FILE: &str =
  "momentum-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "MOMENTUM_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "MOMENTUM_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Picks the zone that "local time"
/// means for this run: env var, rc key,
/// time file in the data directory,
/// then UTC.
#[tracing::instrument(skip(cfg))]
pub fn resolve_timezone(
  cfg: &Config,
  data_dir: &Path
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(raw) = cfg.get("timezone")
    && let Some(tz) =
      parse_timezone(&raw, "rc:timezone")
  {
    return tz;
  }

  let path =
    timezone_config_path(data_dir);
  if let Some(tz) =
    load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
}

fn timezone_config_path(
  data_dir: &Path
) -> PathBuf {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return PathBuf::from(trimmed);
    }
  }
  data_dir.join(TIMEZONE_CONFIG_FILE)
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Resolves a wall-clock time in `tz`
/// to an instant. Repeated times take
/// the earlier instant; times skipped by
/// a DST jump are read with the offset
/// in force before the jump, which moves
/// them forward by the gap.
pub fn local_to_utc(
  tz: &Tz,
  local: NaiveDateTime
) -> DateTime<Utc> {
  match tz.from_local_datetime(&local) {
    | LocalResult::Single(dt) => {
      dt.with_timezone(&Utc)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::debug!(
        first = %first,
        second = %second,
        "ambiguous local time; using earliest"
      );
      first
        .min(second)
        .with_timezone(&Utc)
    }
    | LocalResult::None => {
      let offset = tz
        .from_local_datetime(
          &(local - Duration::days(1))
        )
        .earliest()
        .map(|before| {
          before.offset().fix()
        });
      let shift = offset
        .map(|fix| {
          i64::from(
            fix.local_minus_utc()
          )
        })
        .unwrap_or(0);
      tracing::debug!(
        local = %local,
        shift,
        "local time falls in a DST gap"
      );
      Utc.from_utc_datetime(
        &(local - Duration::seconds(shift))
      )
    }
  }
}

#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  dt.with_timezone(tz).date_naive()
}

fn local_midnight(
  date: NaiveDate,
  tz: &Tz
) -> DateTime<Utc> {
  local_to_utc(
    tz,
    date.and_time(NaiveTime::MIN)
  )
}

/// Tomorrow at `hour:00` local time, the
/// due date a new task starts with.
#[must_use]
pub fn default_due(
  now: DateTime<Utc>,
  tz: &Tz,
  hour: u32
) -> DateTime<Utc> {
  let today = local_date(now, tz);
  let tomorrow =
    today.succ_opt().unwrap_or(today);
  let time =
    NaiveTime::from_hms_opt(hour % 24, 0, 0)
      .unwrap_or(NaiveTime::MIN);
  local_to_utc(tz, tomorrow.and_time(time))
}

/// Reads the timestamp strings the task
/// backend stores (`due_date`,
/// `completed_at`).
pub fn parse_backend_timestamp(
  raw: &str
) -> anyhow::Result<DateTime<Utc>> {
  let token = raw.trim();
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }
  DateTime::parse_from_str(
    token,
    "%Y-%m-%d %H:%M:%S%.f%#z"
  )
  .map(|dt| dt.with_timezone(&Utc))
  .with_context(|| {
    format!(
      "invalid backend timestamp: {raw}"
    )
  })
}

#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = local_date(now, tz);

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return Ok(local_midnight(
        today, tz
      ));
    }
    | "tomorrow" => {
      let date =
        today.succ_opt().ok_or_else(
          || anyhow!("date overflow")
        )?;
      return Ok(local_midnight(
        date, tz
      ));
    }
    | "yesterday" => {
      let date =
        today.pred_opt().ok_or_else(
          || anyhow!("date underflow")
        )?;
      return Ok(local_midnight(
        date, tz
      ));
    }
    | _ => {}
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$")
    .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let num: i64 = caps["num"]
      .parse()
      .context(
        "invalid relative number"
      )?;
    let duration = match &caps["unit"] {
      | "d" => Duration::try_days(num),
      | "h" => Duration::try_hours(num),
      | _ => Duration::try_minutes(num)
    };
    let shifted = duration.and_then(|d| {
      if &caps["sign"] == "-" {
        now.checked_sub_signed(d)
      } else {
        now.checked_add_signed(d)
      }
    });
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative offset out of range: \
         {token}"
      )
    });
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(local_midnight(date, tz));
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(local_to_utc(tz, ndt));
    }
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/tomorrow/yesterday, \
     +Nd/+Nh/+Nm, RFC3339, YYYY-MM-DD, \
     YYYY-MM-DDTHH:MM, YYYY-MM-DD HH:MM"
  })
}
