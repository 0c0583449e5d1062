//! Application settings (`~/.config/romstash/settings.toml`).
//!
//! Reads go through `toml::Value` lookups with defaults; writes are
//! surgical updates so fields this binary does not know about survive a
//! save.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use romstash_remote::Host;

/// Canonical path to the settings file.
pub fn settings_path() -> PathBuf {
    let config = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config.join("romstash").join("settings.toml")
}

fn default_cache_dir() -> PathBuf {
    let cache = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
    cache.join("romstash")
}

/// Resolved settings with defaults applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: Host,
    pub timeout: Option<Duration>,
    pub cache_dir: PathBuf,
    pub rom_root: Option<PathBuf>,
    pub save_root: Option<PathBuf>,
}

impl Settings {
    pub fn database_path(&self) -> PathBuf {
        self.cache_dir.join("cache.db")
    }

    pub fn artwork_root(&self) -> PathBuf {
        self.cache_dir.join("artwork")
    }
}

fn get_str(doc: &toml::Value, table: &str, key: &str) -> Option<String> {
    Some(doc.get(table)?.get(key)?.as_str()?.to_string())
}

/// Load settings, applying defaults for anything unset. A missing or
/// malformed file yields pure defaults.
pub fn load() -> Settings {
    let doc: toml::Value = std::fs::read_to_string(settings_path())
        .ok()
        .and_then(|contents| contents.parse().ok())
        .unwrap_or_else(|| toml::Value::Table(Default::default()));

    let host = Host {
        url: get_str(&doc, "host", "url").unwrap_or_default(),
        username: get_str(&doc, "host", "username").unwrap_or_default(),
        password: get_str(&doc, "host", "password").unwrap_or_default(),
    };
    let timeout = doc
        .get("host")
        .and_then(|t| t.get("timeout_secs"))
        .and_then(|v| v.as_integer())
        .map(|secs| Duration::from_secs(secs.max(1) as u64));
    let cache_dir = get_str(&doc, "cache", "dir")
        .map(PathBuf::from)
        .unwrap_or_else(default_cache_dir);
    let rom_root = get_str(&doc, "sync", "rom_root").map(PathBuf::from);
    let save_root = get_str(&doc, "sync", "save_root").map(PathBuf::from);

    Settings {
        host,
        timeout,
        cache_dir,
        rom_root,
        save_root,
    }
}

/// Update one `table.key` string value in place, preserving everything
/// else in the file. The write is atomic (tmp file + rename).
pub fn save_value(table: &str, key: &str, value: &str) -> io::Result<()> {
    let settings = settings_path();
    let mut doc: toml::Value = if let Ok(contents) = std::fs::read_to_string(&settings) {
        contents
            .parse()
            .unwrap_or_else(|_| toml::Value::Table(Default::default()))
    } else {
        toml::Value::Table(Default::default())
    };

    let root = doc
        .as_table_mut()
        .ok_or_else(|| io::Error::other("settings.toml root is not a table"))?;
    let section = root
        .entry(table.to_string())
        .or_insert_with(|| toml::Value::Table(Default::default()));
    let section = section
        .as_table_mut()
        .ok_or_else(|| io::Error::other(format!("[{table}] is not a table")))?;
    section.insert(key.to_string(), toml::Value::String(value.to_string()));

    if let Some(parent) = settings.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let serialized = toml::to_string_pretty(&doc).map_err(io::Error::other)?;
    let tmp = settings.with_extension("toml.tmp");
    std::fs::write(&tmp, &serialized)?;
    std::fs::rename(&tmp, &settings)?;
    Ok(())
}

/// Load the full settings file as a pretty-printed string for display.
pub fn show() -> Option<String> {
    let contents = std::fs::read_to_string(settings_path()).ok()?;
    let doc: toml::Value = contents.parse().ok()?;
    toml::to_string_pretty(&doc).ok()
}
