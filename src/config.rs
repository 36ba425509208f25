use std::path::{Path, PathBuf};

const DEFAULT_PORT: u16 = 5000;

/// Process configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub static_dir: PathBuf,
    /// `LOG_PRED=1`: log a summary of every derived feature row.
    pub log_predictions: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base = lookup("BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let model_path = lookup("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join("models").join("model.json"));
        let static_dir = lookup("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| resolve_static_dir(&base));

        Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            model_path,
            static_dir,
            log_predictions: lookup("LOG_PRED").as_deref() == Some("1"),
        }
    }
}

/// Prefer the frontend build output, then a top-level `dist`.
pub fn resolve_static_dir(base: &Path) -> PathBuf {
    let candidates = [
        base.join("frontend").join("hotel_booking_ui").join("dist"),
        base.join("dist"),
    ];
    for c in &candidates {
        if c.exists() {
            return c.clone();
        }
    }
    // Routes report the folder as missing
    base.join("dist")
}

pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
