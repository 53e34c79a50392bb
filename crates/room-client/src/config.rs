//! Room client configuration.
//!
//! Loaded from `RC_*` environment variables, or built directly with
//! [`ClientConfig::new`] by applications that already know the room and the
//! local participant.

use crate::errors::ClientError;
use crate::media::VideoConstraints;
use crate::roster::LocalProfile;
use common::config::{ObservabilityConfig, DEFAULT_LOG_LEVEL};
use common::types::RoomId;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Default minimum capture width in pixels.
pub const DEFAULT_VIDEO_MIN_WIDTH: u32 = 640;

/// Default ideal capture width in pixels.
pub const DEFAULT_VIDEO_IDEAL_WIDTH: u32 = 1920;

/// Default minimum capture height in pixels.
pub const DEFAULT_VIDEO_MIN_HEIGHT: u32 = 400;

/// Default ideal capture height in pixels.
pub const DEFAULT_VIDEO_IDEAL_HEIGHT: u32 = 1080;

/// Default viewport width before the UI reports a real one.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// Room client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Room to create and join.
    pub room_id: RoomId,

    /// Local participant identity sent with `join`.
    pub profile: LocalProfile,

    /// Ask the server for TCP-only ICE candidates (default: false).
    pub force_tcp: bool,

    /// Camera capture constraints.
    pub video: VideoConstraints,

    /// Pin the local card on mobile once more than 4 cards are shown
    /// (default: true).
    pub auto_pin_mobile: bool,

    /// Initial viewport width in CSS pixels (default: 1280).
    pub viewport_width: u32,

    pub observability: ObservabilityConfig,
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        ClientError::Config(err.to_string())
    }
}

impl ClientConfig {
    /// Configuration with defaults for everything but the room and profile.
    #[must_use]
    pub fn new(room_id: RoomId, profile: LocalProfile) -> Self {
        Self {
            room_id,
            profile,
            force_tcp: false,
            video: VideoConstraints {
                min_width: DEFAULT_VIDEO_MIN_WIDTH,
                ideal_width: DEFAULT_VIDEO_IDEAL_WIDTH,
                min_height: DEFAULT_VIDEO_MIN_HEIGHT,
                ideal_height: DEFAULT_VIDEO_IDEAL_HEIGHT,
            },
            auto_pin_mobile: true,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            observability: ObservabilityConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a map of variables.
    ///
    /// # Errors
    ///
    /// `MissingEnvVar` when `RC_ROOM_ID` or `RC_DISPLAY_NAME` is absent or
    /// empty; `InvalidValue` for unparsable numbers and flags, or capture
    /// minimums above their ideal values.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let room_id = required(vars, "RC_ROOM_ID")?;
        let name = required(vars, "RC_DISPLAY_NAME")?;

        let avatar = vars
            .get("RC_AVATAR_URL")
            .filter(|s| !s.is_empty())
            .cloned();
        let is_trainer = flag(vars, "RC_IS_TRAINER", false)?;

        let video = VideoConstraints {
            min_width: number(vars, "RC_VIDEO_MIN_WIDTH", DEFAULT_VIDEO_MIN_WIDTH)?,
            ideal_width: number(vars, "RC_VIDEO_IDEAL_WIDTH", DEFAULT_VIDEO_IDEAL_WIDTH)?,
            min_height: number(vars, "RC_VIDEO_MIN_HEIGHT", DEFAULT_VIDEO_MIN_HEIGHT)?,
            ideal_height: number(vars, "RC_VIDEO_IDEAL_HEIGHT", DEFAULT_VIDEO_IDEAL_HEIGHT)?,
        };
        if video.min_width > video.ideal_width {
            return Err(ConfigError::InvalidValue(format!(
                "RC_VIDEO_MIN_WIDTH ({}) exceeds RC_VIDEO_IDEAL_WIDTH ({})",
                video.min_width, video.ideal_width
            )));
        }
        if video.min_height > video.ideal_height {
            return Err(ConfigError::InvalidValue(format!(
                "RC_VIDEO_MIN_HEIGHT ({}) exceeds RC_VIDEO_IDEAL_HEIGHT ({})",
                video.min_height, video.ideal_height
            )));
        }

        let viewport_width = number(vars, "RC_VIEWPORT_WIDTH", DEFAULT_VIEWPORT_WIDTH)?;
        if viewport_width == 0 {
            return Err(ConfigError::InvalidValue(
                "RC_VIEWPORT_WIDTH must be greater than 0".to_string(),
            ));
        }

        let log_level = vars
            .get("RC_LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            room_id: RoomId::new(room_id),
            profile: LocalProfile {
                name,
                avatar,
                is_trainer,
            },
            force_tcp: flag(vars, "RC_FORCE_TCP", false)?,
            video,
            auto_pin_mobile: flag(vars, "RC_AUTO_PIN_MOBILE", true)?,
            viewport_width,
            observability: ObservabilityConfig {
                log_level,
                json_logs: flag(vars, "RC_JSON_LOGS", false)?,
            },
        })
    }
}

fn required(vars: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    vars.get(key)
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn number<T: FromStr>(vars: &HashMap<String, String>, key: &str, default: T) -> Result<T, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(format!("{key} must be a non-negative integer, got '{raw}'"))
        }),
    }
}

fn flag(vars: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match vars.get(key).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(format!(
                "{key} must be a boolean, got '{v}'"
            ))),
        },
    }
}
