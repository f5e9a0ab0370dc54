use ini::Ini;
use log::{info, warn};
use std::str::FromStr;
use std::sync::{LazyLock, Mutex, MutexGuard};

const CONFIG_PATH: &str = "melodybattle.ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub log_level: LogLevel,
    // [Battle]
    /// Measures a battle lasts before the end grace timer is armed.
    pub battle_measures: u32,
    /// Delay between the final beat center and ExitBattle, in beats.
    pub end_grace_beats: f32,
    /// Fall speed at the easiest tier, in pixels per second.
    pub velocity_min: f32,
    /// Fall speed at the hardest tier, in pixels per second.
    pub velocity_max: f32,
    pub target_line_y: f32,
    pub destroy_y: f32,
    // [Board]
    pub switch_unit_on_end_beat: bool,
    pub beat_window_seconds: f32,
    // [Display]
    pub display_width: u32,
    pub display_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            battle_measures: 1,
            end_grace_beats: 0.5,
            velocity_min: 240.0,
            velocity_max: 400.0,
            target_line_y: 120.0,
            destroy_y: -60.0,
            switch_unit_on_end_beat: true,
            beat_window_seconds: 0.1,
            display_width: 1600,
            display_height: 900,
        }
    }
}

impl Config {
    /// Reads every known key, keeping defaults for missing or malformed ones.
    pub fn from_ini(conf: &Ini) -> Self {
        let default = Self::default();
        let get = |section: &str, key: &str| conf.get_from(Some(section), key).map(str::trim);

        let log_level = get("Options", "LogLevel")
            .and_then(|v| LogLevel::from_str(v).ok())
            .unwrap_or(default.log_level);

        let battle_measures = get("Battle", "BattleMeasures")
            .and_then(|v| v.parse::<u32>().ok())
            .map_or(default.battle_measures, |v| v.clamp(1, 16));
        let end_grace_beats = get("Battle", "EndGraceBeats")
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|v| v.is_finite())
            .map_or(default.end_grace_beats, |v| v.clamp(0.0, 4.0));
        let mut velocity_min = get("Battle", "VelocityMin")
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(default.velocity_min);
        let mut velocity_max = get("Battle", "VelocityMax")
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(default.velocity_max);
        if velocity_max < velocity_min {
            warn!("VelocityMax ({velocity_max}) is below VelocityMin ({velocity_min}); swapping.");
            std::mem::swap(&mut velocity_min, &mut velocity_max);
        }
        let target_line_y = get("Battle", "TargetLineY")
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(default.target_line_y);
        let destroy_y = get("Battle", "DestroyY")
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|v| v.is_finite() && *v < target_line_y)
            .unwrap_or_else(|| default.destroy_y.min(target_line_y - 1.0));

        let switch_unit_on_end_beat = get("Board", "SwitchUnitOnEndBeat")
            .and_then(|v| v.parse::<u8>().ok())
            .map_or(default.switch_unit_on_end_beat, |v| v != 0);
        let beat_window_seconds = get("Board", "BeatWindowSeconds")
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|v| v.is_finite())
            .map_or(default.beat_window_seconds, |v| v.clamp(0.01, 0.5));

        let display_width = get("Display", "Width")
            .and_then(|v| v.parse::<u32>().ok())
            .map_or(default.display_width, |v| v.clamp(320, 7680));
        let display_height = get("Display", "Height")
            .and_then(|v| v.parse::<u32>().ok())
            .map_or(default.display_height, |v| v.clamp(240, 4320));

        Self {
            log_level,
            battle_measures,
            end_grace_beats,
            velocity_min,
            velocity_max,
            target_line_y,
            destroy_y,
            switch_unit_on_end_beat,
            beat_window_seconds,
            display_width,
            display_height,
        }
    }

    pub fn to_ini(&self) -> Ini {
        let mut conf = Ini::new();
        conf.with_section(Some("Options"))
            .set("LogLevel", self.log_level.as_str());
        conf.with_section(Some("Battle"))
            .set("BattleMeasures", self.battle_measures.to_string())
            .set("DestroyY", self.destroy_y.to_string())
            .set("EndGraceBeats", self.end_grace_beats.to_string())
            .set("TargetLineY", self.target_line_y.to_string())
            .set("VelocityMax", self.velocity_max.to_string())
            .set("VelocityMin", self.velocity_min.to_string());
        conf.with_section(Some("Board"))
            .set("BeatWindowSeconds", self.beat_window_seconds.to_string())
            .set(
                "SwitchUnitOnEndBeat",
                if self.switch_unit_on_end_beat { "1" } else { "0" },
            );
        conf.with_section(Some("Display"))
            .set("Height", self.display_height.to_string())
            .set("Width", self.display_width.to_string());
        conf
    }
}

static CONFIG: LazyLock<Mutex<Config>> = LazyLock::new(|| Mutex::new(Config::default()));

// --- File I/O ---

fn create_default_config_file() -> Result<(), std::io::Error> {
    info!("'{CONFIG_PATH}' not found, creating with default values.");
    Config::default().to_ini().write_to_file(CONFIG_PATH)
}

#[inline(always)]
fn lock() -> MutexGuard<'static, Config> {
    CONFIG.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub fn load() {
    if !std::path::Path::new(CONFIG_PATH).exists()
        && let Err(e) = create_default_config_file()
    {
        warn!("Failed to create default config file: {e}");
    }

    match Ini::load_from_file(CONFIG_PATH) {
        Ok(conf) => {
            let cfg = Config::from_ini(&conf);
            *lock() = cfg;
            info!("Configuration loaded from '{CONFIG_PATH}'.");
        }
        Err(e) => {
            warn!("Failed to load '{CONFIG_PATH}': {e}. Using default values.");
            *lock() = Config::default();
        }
    }
}

pub fn get() -> Config {
    *lock()
}
