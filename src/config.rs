use serde::{Deserialize, Serialize};

/// The settings of a TrafCOD controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// The maximum number of evaluation passes per tick.
    pub max_loop_count: usize,
    /// The time between ticks in 0.1 s.
    pub evaluation_interval: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_loop_count: 10,
            evaluation_interval: 1,
        }
    }
}

impl ControllerConfig {
    /// Reads the settings from JSON; missing fields take their default value.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = ControllerConfig::from_json("{}").unwrap();
        assert_eq!(config, ControllerConfig::default());
        let config = ControllerConfig::from_json(r#"{"max_loop_count": 4}"#).unwrap();
        assert_eq!(config.max_loop_count, 4);
        assert_eq!(config.evaluation_interval, 1);
    }
}
