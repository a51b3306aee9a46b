use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

pub const DEFAULT_DUE_HOUR: u32 = 9;

/// Settings from the momentumrc file
/// plus command line overrides.
#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "data.location".to_string(),
      "~/.momentum".to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    map.insert(
      "due.default_hour".to_string(),
      DEFAULT_DUE_HOUR.to_string()
    );
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc =
      resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading momentumrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no momentumrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// Hour of day new tasks are due,
  /// falling back to 9 when the value is
  /// missing or not an hour.
  pub fn default_due_hour(&self) -> u32 {
    match self
      .map
      .get("due.default_hour")
      .map(|raw| raw.trim().parse::<u32>())
    {
      | Some(Ok(hour)) if hour < 24 => {
        hour
      }
      | Some(_) => {
        warn!(
          "due.default_hour is not an \
           hour of day; using default"
        );
        DEFAULT_DUE_HOUR
      }
      | None => DEFAULT_DUE_HOUR
    }
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path == path
          || self
            .loaded_files
            .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include already loaded; skipping");
        } else if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("MOMENTUMRC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping momentumrc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".momentumrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".momentum"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::Config;

  #[test]
  fn loads_keys_and_includes() {
    let dir = tempdir().expect("tempdir");
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "timezone = Europe/Berlin\n"
    )
    .expect("write include");
    let main = dir.path().join("main.rc");
    fs::write(
      &main,
      "# momentum settings\ncolor = off  \
       # no ansi\ninclude extra.rc\n\
       include missing.rc\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(main.as_path()))
      .expect("load config");
    assert_eq!(
      cfg.get("color").as_deref(),
      Some("off")
    );
    assert_eq!(
      cfg.get("timezone").as_deref(),
      Some("Europe/Berlin")
    );
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.get("data.location").as_deref(),
      Some("~/.momentum")
    );
  }

  #[test]
  fn rejects_lines_without_equals() {
    let dir = tempdir().expect("tempdir");
    let rc = dir.path().join("bad.rc");
    fs::write(&rc, "color on\n")
      .expect("write rc");
    assert!(Config::load(Some(rc.as_path())).is_err());
  }

  #[test]
  fn overrides_and_due_hour() {
    let mut cfg = Config::default();
    assert_eq!(cfg.default_due_hour(), 9);
    cfg.apply_overrides([(
      "rc.due.default_hour".to_string(),
      "17".to_string()
    )]);
    assert_eq!(cfg.default_due_hour(), 17);
    cfg.apply_overrides([(
      "due.default_hour".to_string(),
      "25".to_string()
    )]);
    assert_eq!(cfg.default_due_hour(), 9);
  }
}
