use std::path::Path;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use tokio::fs::read_to_string;

use crate::cnc::state::CoordinateMode;

/// Settings of the framed serial link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub device_address: u8,
    /// Sequence byte every frame must carry. It is compared as-is and never advanced.
    pub expected_sequence: u8,
    /// Opcode that routes a frame's payload to the G-code interpreter.
    pub gcode_opcode: u8,
    /// Appended to every response line.
    pub line_ending: String,
}
impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            device_address: 1,
            expected_sequence: 0,
            gcode_opcode: 0x50,
            line_ending: "\n\r".into(),
        }
    }
}

/// Travel envelope in millimetres; both axes start at 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workspace {
    pub max_x: f64,
    pub max_y: f64,
}
impl Default for Workspace {
    fn default() -> Self {
        Workspace {
            max_x: 330.0,
            max_y: 228.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub workspace: Workspace,
    /// Millimetres travelled per motor step.
    pub step_resolution: f64,
    pub initial_mode: CoordinateMode,
    pub initial_feed_rate: f64,
}
impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            workspace: Workspace::default(),
            step_resolution: 0.01,
            initial_mode: CoordinateMode::Absolute,
            initial_feed_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub link: LinkConfig,
    pub motion: MotionConfig,
}

impl ControllerConfig {
    pub fn from_json(text: &str) -> anyhow::Result<ControllerConfig> {
        let config: ControllerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
    /// Loads the configuration at `path`, or the defaults if no path is given.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<ControllerConfig> {
        match path {
            None => Ok(ControllerConfig::default()),
            Some(path) => {
                let text = read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read configuration {:?}", path))?;
                ControllerConfig::from_json(&text)
                    .with_context(|| format!("Invalid configuration {:?}", path))
            }
        }
    }
    pub fn validate(&self) -> anyhow::Result<()> {
        let motion = &self.motion;
        if !(motion.step_resolution.is_finite() && motion.step_resolution > 0.0) {
            return Err(anyhow!("step_resolution must be positive, got {}", motion.step_resolution));
        }
        let workspace = motion.workspace;
        let positive = |extent: f64| extent.is_finite() && extent > 0.0;
        if !(positive(workspace.max_x) && positive(workspace.max_y)) {
            return Err(anyhow!("workspace extents must be positive, got {:?}", workspace));
        }
        if !(motion.initial_feed_rate.is_finite() && motion.initial_feed_rate >= 0.0) {
            return Err(anyhow!(
                "initial_feed_rate must be non-negative, got {}",
                motion.initial_feed_rate
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = ControllerConfig::from_json("{}").unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.link.device_address, 1);
        assert_eq!(config.link.gcode_opcode, 0x50);
        assert_eq!(config.motion.workspace.max_x, 330.0);
        assert_eq!(config.motion.workspace.max_y, 228.0);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ControllerConfig::from_json(
            r#"{ "link": { "device_address": 7 }, "motion": { "initial_mode": "relative" } }"#,
        )
        .unwrap();
        assert_eq!(config.link.device_address, 7);
        assert_eq!(config.link.expected_sequence, 0);
        assert_eq!(config.motion.initial_mode, CoordinateMode::Relative);
        assert_eq!(config.motion.step_resolution, 0.01);
    }

    #[test]
    fn rejects_non_positive_step_resolution() {
        let zero_step = r#"{ "motion": { "step_resolution": 0.0 } }"#;
        assert!(ControllerConfig::from_json(zero_step).is_err());
        let negative_extent = r#"{ "motion": { "workspace": { "max_x": -1.0 } } }"#;
        assert!(ControllerConfig::from_json(negative_extent).is_err());
    }

    #[tokio::test]
    async fn load_without_path_is_default() {
        let config = ControllerConfig::load(None).await.unwrap();
        assert_eq!(config, ControllerConfig::default());
    }
}
