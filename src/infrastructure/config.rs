use crate::domain::recurrence::RecurringEditPolicy;
use crate::infrastructure::error::InteractionError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const INTERACTION_JSON: &str = "interaction.json";
const SUPPORTED_SCHEMA: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InteractionConfig {
    pub schema: u8,
    /// IANA name of the zone the view renders in.
    pub timezone: String,
    pub default_event_duration_minutes: u32,
    #[serde(default)]
    pub recurring_edit_policy: RecurringEditPolicy,
    #[serde(default = "default_guarded_routes")]
    pub guarded_routes: Vec<String>,
    #[serde(default = "default_lookahead_limit")]
    pub occurrence_lookahead_limit: usize,
    #[serde(default = "default_unload_message")]
    pub unload_message: String,
}

fn default_guarded_routes() -> Vec<String> {
    vec!["settings".to_string()]
}

fn default_lookahead_limit() -> usize {
    2
}

fn default_unload_message() -> String {
    crate::application::blocking_guard::DEFAULT_UNLOAD_MESSAGE.to_string()
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            schema: 1,
            timezone: "UTC".to_string(),
            default_event_duration_minutes: 30,
            recurring_edit_policy: RecurringEditPolicy::default(),
            guarded_routes: default_guarded_routes(),
            occurrence_lookahead_limit: default_lookahead_limit(),
            unload_message: default_unload_message(),
        }
    }
}

impl InteractionConfig {
    pub fn timezone(&self) -> Result<Tz, InteractionError> {
        self.timezone.trim().parse::<Tz>().map_err(|error| {
            InteractionError::InvalidConfig(format!("timezone `{}`: {error}", self.timezone))
        })
    }

    pub fn validate(&self) -> Result<(), InteractionError> {
        self.timezone()?;
        if self.default_event_duration_minutes == 0 {
            return Err(InteractionError::InvalidConfig(
                "defaultEventDurationMinutes must be positive".to_string(),
            ));
        }
        if self.occurrence_lookahead_limit == 0 {
            return Err(InteractionError::InvalidConfig(
                "occurrenceLookaheadLimit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InteractionError> {
    let path = config_dir.join(INTERACTION_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&InteractionConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InteractionError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| {
            InteractionError::InvalidConfig(format!("missing schema in {}", path.display()))
        })?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InteractionError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_config(config_dir: &Path) -> Result<InteractionConfig, InteractionError> {
    let value = read_config(&config_dir.join(INTERACTION_JSON))?;
    let config: InteractionConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "calendar-interactions-config-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            Self { path }
        }

        fn write(&self, raw: &str) {
            fs::write(self.path.join(INTERACTION_JSON), raw).expect("write config");
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn default_config_is_written_once_and_loads() {
        let dir = TempConfigDir::new();
        ensure_default_config(&dir.path).expect("write default");
        let loaded = load_config(&dir.path).expect("load default");
        assert_eq!(loaded, InteractionConfig::default());
        assert_eq!(loaded.timezone().expect("tz"), chrono_tz::UTC);

        dir.write(r#"{"schema":1,"timezone":"Europe/Zurich","defaultEventDurationMinutes":45}"#);
        ensure_default_config(&dir.path).expect("keep existing");
        let custom = load_config(&dir.path).expect("load custom");
        assert_eq!(custom.default_event_duration_minutes, 45);
        assert_eq!(custom.recurring_edit_policy, RecurringEditPolicy::Confirm);
        assert_eq!(custom.guarded_routes, vec!["settings".to_string()]);
        assert_eq!(custom.occurrence_lookahead_limit, 2);
    }

    #[test]
    fn direct_edit_policy_is_parsed() {
        let dir = TempConfigDir::new();
        dir.write(
            r#"{"schema":1,"timezone":"UTC","defaultEventDurationMinutes":30,"recurringEditPolicy":"direct"}"#,
        );
        let loaded = load_config(&dir.path).expect("load");
        assert_eq!(loaded.recurring_edit_policy, RecurringEditPolicy::Direct);
    }

    #[test]
    fn missing_or_unsupported_schema_is_rejected() {
        let dir = TempConfigDir::new();
        dir.write(r#"{"timezone":"UTC","defaultEventDurationMinutes":30}"#);
        assert!(matches!(
            load_config(&dir.path),
            Err(InteractionError::InvalidConfig(message)) if message.contains("missing schema")
        ));

        dir.write(r#"{"schema":2,"timezone":"UTC","defaultEventDurationMinutes":30}"#);
        assert!(matches!(
            load_config(&dir.path),
            Err(InteractionError::InvalidConfig(message)) if message.contains("unsupported schema 2")
        ));
    }

    #[test]
    fn unknown_timezone_is_invalid() {
        let dir = TempConfigDir::new();
        dir.write(r#"{"schema":1,"timezone":"Mars/Olympus","defaultEventDurationMinutes":30}"#);
        assert!(matches!(
            load_config(&dir.path),
            Err(InteractionError::InvalidConfig(_))
        ));
    }
}
