//! Local filesystem scanning: ROM directories and their paired saves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::plan::{LocalRom, LocalSave};

/// Where one platform keeps its ROMs and saves on disk.
#[derive(Debug, Clone)]
pub struct PlatformDirs {
    pub fs_slug: String,
    pub rom_dir: PathBuf,
    pub save_dir: PathBuf,
}

fn stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

fn mtime(path: &Path) -> Result<DateTime<Utc>, SyncError> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Save files in a directory, keyed by extension-stripped base name. A
/// missing directory is an empty map, not an error.
fn save_file_map(save_dir: &Path) -> Result<HashMap<String, LocalSave>, SyncError> {
    let mut saves = HashMap::new();
    if !save_dir.is_dir() {
        return Ok(saves);
    }
    for entry in std::fs::read_dir(save_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let mtime = mtime(&path)?;
        saves.insert(stem(&name).to_string(), LocalSave { path, mtime });
    }
    Ok(saves)
}

/// Scan one platform's ROM directory, pairing each visible file with a
/// save of the same base name. Results are sorted by filename.
pub fn scan_platform(dirs: &PlatformDirs) -> Result<Vec<LocalRom>, SyncError> {
    let mut saves = save_file_map(&dirs.save_dir)?;
    let mut roms = Vec::new();

    if !dirs.rom_dir.is_dir() {
        return Ok(roms);
    }
    for entry in std::fs::read_dir(&dirs.rom_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !entry.file_type()?.is_file() {
            continue;
        }
        let save = saves.remove(stem(&name));
        roms.push(LocalRom {
            fs_slug: dirs.fs_slug.clone(),
            file_name: name,
            path: entry.path(),
            save_dir: dirs.save_dir.clone(),
            rom_id: None,
            save,
            remote_saves: Vec::new(),
        });
    }

    roms.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    log::debug!("Scanned {}: {} ROMs", dirs.fs_slug, roms.len());
    Ok(roms)
}

/// Scan every platform concurrently. A platform whose scan fails is
/// logged and omitted.
pub async fn scan_all(platforms: Vec<PlatformDirs>) -> Vec<(String, Vec<LocalRom>)> {
    let handles: Vec<_> = platforms
        .into_iter()
        .map(|dirs| {
            tokio::task::spawn_blocking(move || {
                let slug = dirs.fs_slug.clone();
                (slug, scan_platform(&dirs))
            })
        })
        .collect();

    let mut scanned = Vec::new();
    for handle in handles {
        match handle.await {
            Ok((slug, Ok(roms))) => {
                if !roms.is_empty() {
                    scanned.push((slug, roms));
                }
            }
            Ok((slug, Err(e))) => log::warn!("Scan failed for {slug}: {e}"),
            Err(e) => log::warn!("Scan task panicked: {e}"),
        }
    }
    scanned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"data").unwrap();
    }

    #[test]
    fn scan_pairs_saves_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let rom_dir = dir.path().join("roms");
        let save_dir = dir.path().join("saves");
        std::fs::create_dir_all(&rom_dir).unwrap();
        std::fs::create_dir_all(&save_dir).unwrap();

        touch(&rom_dir.join("Zelda.gb"));
        touch(&rom_dir.join("Metroid.gb"));
        touch(&rom_dir.join(".hidden.gb"));
        touch(&save_dir.join("Zelda.srm"));
        touch(&save_dir.join("Unrelated.srm"));

        let roms = scan_platform(&PlatformDirs {
            fs_slug: "gb".into(),
            rom_dir,
            save_dir,
        })
        .unwrap();

        assert_eq!(roms.len(), 2);
        assert_eq!(roms[0].file_name, "Metroid.gb");
        assert!(roms[0].save.is_none());
        assert_eq!(roms[1].file_name, "Zelda.gb");
        let save = roms[1].save.as_ref().unwrap();
        assert!(save.path.ends_with("Zelda.srm"));
    }

    #[test]
    fn missing_directories_scan_empty() {
        let dir = tempfile::tempdir().unwrap();
        let roms = scan_platform(&PlatformDirs {
            fs_slug: "gb".into(),
            rom_dir: dir.path().join("nope"),
            save_dir: dir.path().join("also-nope"),
        })
        .unwrap();
        assert!(roms.is_empty());
    }

    #[tokio::test]
    async fn scan_all_drops_empty_platforms() {
        let dir = tempfile::tempdir().unwrap();
        let rom_dir = dir.path().join("roms");
        std::fs::create_dir_all(&rom_dir).unwrap();
        touch(&rom_dir.join("Game.gb"));

        let scanned = scan_all(vec![
            PlatformDirs {
                fs_slug: "gb".into(),
                rom_dir,
                save_dir: dir.path().join("saves"),
            },
            PlatformDirs {
                fs_slug: "snes".into(),
                rom_dir: dir.path().join("missing"),
                save_dir: dir.path().join("missing-saves"),
            },
        ])
        .await;

        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].0, "gb");
    }
}
