use std::str::FromStr;
use std::sync::Mutex;

use ini::Ini;
use log::{info, warn};

use crate::engine::cost::{ALL_CATEGORIES, CostCategory, WeightTable};

const CONFIG_PATH: &str = "padparity.ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> log::LevelFilter {
        match self {
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
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub log_level: LogLevel,
    pub weights: WeightTable,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: LogLevel::Warn,
            weights: WeightTable::default(),
        }
    }
}

static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

fn parse_ini(ini: &Ini) -> Config {
    let mut config = Config::default();

    if let Some(level) = ini.get_from(Some("Log"), "Level") {
        match LogLevel::from_str(level) {
            Ok(parsed) => config.log_level = parsed,
            Err(()) => warn!("unknown log level '{level}' in {CONFIG_PATH}; keeping default"),
        }
    }

    if let Some(section) = ini.section(Some("Weights")) {
        for (key, value) in section.iter() {
            let Some(category) = CostCategory::from_key(key) else {
                warn!("unknown cost category '{key}' in {CONFIG_PATH}; ignoring");
                continue;
            };
            match value.trim().parse::<f32>() {
                Ok(weight) if weight.is_finite() && weight >= 0.0 => {
                    config.weights.set(category, weight);
                }
                _ => warn!(
                    "invalid weight '{value}' for {} in {CONFIG_PATH}; keeping default",
                    category.as_str()
                ),
            }
        }
    }

    config
}

pub fn load() {
    match Ini::load_from_file(CONFIG_PATH) {
        Ok(ini) => {
            let config = parse_ini(&ini);
            *CONFIG.lock().unwrap() = config;
            info!("loaded {CONFIG_PATH}");
        }
        Err(err) => {
            info!("no {CONFIG_PATH} ({err}); writing defaults");
            *CONFIG.lock().unwrap() = Config::default();
            save();
        }
    }
}

pub fn save() {
    let config = get();
    let mut ini = Ini::new();
    ini.with_section(Some("Log"))
        .set("Level", config.log_level.as_str());
    let mut weights = ini.with_section(Some("Weights"));
    for category in ALL_CATEGORIES {
        weights.set(category.as_str(), format!("{}", config.weights.get(category)));
    }
    if let Err(err) = ini.write_to_file(CONFIG_PATH) {
        warn!("failed to write {CONFIG_PATH}: {err}");
    }
}

pub fn get() -> Config {
    *CONFIG.lock().unwrap()
}
