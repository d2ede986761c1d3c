use crate::error::{GuardError, Result};
use protocol::PlayerId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A client mod recognised by the plugin channels it registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModSignature {
    pub name: String,
    /// Lower-case substrings matched against channel names.
    pub keywords: Vec<String>,
}

impl ModSignature {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

/// Runtime settings of the engine.
///
/// Every field has a default, so a partial JSON document is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Length of the alert coalescing window.
    pub alert_window_ms: u64,
    pub alert_prefix: String,
    /// Pickup clicks on the same button closer than this are flagged.
    pub rapid_click_threshold_ms: u64,
    /// Sprinting with food below this level is flagged.
    pub hunger_sprint_threshold: i32,
    pub auto_totem_click_ms: u64,
    pub auto_totem_use_window_ms: u64,
    pub replenish_min_intervals: usize,
    pub replenish_min_std_dev_ms: f64,
    pub mod_signatures: Vec<ModSignature>,
    /// Check names that are never instantiated.
    pub disabled_checks: Vec<String>,
    /// Player names that are never checked.
    pub exempt_names: Vec<String>,
    /// Players receiving alerts as soon as they log in.
    pub alerts_for: Vec<PlayerId>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            alert_window_ms: 1000,
            alert_prefix: "[Guard]".to_string(),
            rapid_click_threshold_ms: 5,
            hunger_sprint_threshold: 6,
            auto_totem_click_ms: 75,
            auto_totem_use_window_ms: 1500,
            replenish_min_intervals: 3,
            replenish_min_std_dev_ms: 10.0,
            mod_signatures: vec![
                ModSignature::new("autototem", &["autototem"]),
                ModSignature::new("tweakeroo", &["servux:tweaks"]),
            ],
            disabled_checks: Vec::new(),
            exempt_names: Vec::new(),
            alerts_for: Vec::new(),
        }
    }
}

impl GuardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.alert_window_ms == 0 {
            return Err(GuardError::Config("alert_window_ms must be positive".into()));
        }
        if self.replenish_min_intervals < 2 {
            return Err(GuardError::Config(
                "replenish_min_intervals must be at least 2".into(),
            ));
        }
        if !self.replenish_min_std_dev_ms.is_finite() || self.replenish_min_std_dev_ms < 0.0 {
            return Err(GuardError::Config(
                "replenish_min_std_dev_ms must be a non-negative number".into(),
            ));
        }
        for signature in &self.mod_signatures {
            if signature.name.trim().is_empty() {
                return Err(GuardError::Config("mod signature without a name".into()));
            }
            if signature.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(GuardError::Config(format!(
                    "mod signature `{}` has no keywords",
                    signature.name
                )));
            }
        }
        Ok(())
    }

    pub fn alert_window(&self) -> Duration {
        Duration::from_millis(self.alert_window_ms)
    }

    pub fn is_disabled(&self, check: &str) -> bool {
        self.disabled_checks
            .iter()
            .any(|name| name.eq_ignore_ascii_case(check))
    }

    pub fn is_exempt_name(&self, name: &str) -> bool {
        self.exempt_names
            .iter()
            .any(|exempt| exempt.eq_ignore_ascii_case(name))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: GuardConfig = serde_json::from_str(json)
            .map_err(|e| GuardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
