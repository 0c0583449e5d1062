//! Executing sync decisions: uploads, downloads, and the bookkeeping
//! around them.

use std::path::PathBuf;

use chrono::Utc;

use romstash_remote::CatalogApi;
use romstash_store::Store;

use crate::error::SyncError;
use crate::plan::{LocalRom, SyncAction, remote_time};
use crate::timestamp::stamped_file_name;

/// The result of syncing one ROM's save.
#[derive(Debug)]
pub struct SyncOutcome {
    pub file_name: String,
    pub action: SyncAction,
    pub result: Result<(), SyncError>,
}

/// Resolve each ROM's catalog identity through the filename index and
/// fetch its remote saves. ROMs without a catalog match keep an empty
/// remote list and decide to Skip or Upload-less accordingly.
pub async fn attach_remote_saves<C: CatalogApi>(
    api: &C,
    store: &Store,
    roms: &mut [LocalRom],
) -> Result<(), SyncError> {
    for rom in roms.iter_mut() {
        let Some((rom_id, _name)) = store.game_id_by_filename(&rom.fs_slug, &rom.file_name)?
        else {
            log::debug!("No catalog match for {}", rom.file_name);
            continue;
        };
        rom.rom_id = Some(rom_id);
        rom.remote_saves = api.saves(rom_id).await?;
    }
    Ok(())
}

fn extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext,
        _ => "",
    }
}

async fn upload<C: CatalogApi>(api: &C, rom: &LocalRom) -> Result<(), SyncError> {
    let rom_id = rom
        .rom_id
        .ok_or_else(|| SyncError::UnresolvedRom(rom.file_name.clone()))?;
    let Some(save) = &rom.save else {
        return Ok(());
    };

    let bytes = std::fs::read(&save.path)?;
    let ext = save
        .path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    let name = stamped_file_name(rom.base_name(), ext, Utc::now());
    api.upload_save(rom_id, &name, bytes).await?;
    log::info!("Uploaded {} ({} bytes)", name, std::fs::metadata(&save.path)?.len());
    Ok(())
}

async fn download<C: CatalogApi>(api: &C, rom: &LocalRom) -> Result<(), SyncError> {
    let Some(remote) = rom.matching_remote().cloned() else {
        return Ok(());
    };
    let bytes = api.download_save(&remote).await?;

    let target: PathBuf = rom
        .save_dir
        .join(format!("{}.{}", rom.base_name(), extension(&remote.file_name)));
    std::fs::create_dir_all(&rom.save_dir)?;
    std::fs::write(&target, &bytes)?;

    // Pin the file's mtime to the remote save's time so the next scan
    // compares equal instead of re-uploading what we just fetched.
    let file = std::fs::File::options().write(true).open(&target)?;
    file.set_modified(remote_time(&remote).into())?;

    log::info!("Downloaded {} ({} bytes)", target.display(), bytes.len());
    Ok(())
}

/// Apply the sync decision for one ROM. With `dry_run` the decision is
/// reported but nothing is transferred.
pub async fn sync_rom<C: CatalogApi>(api: &C, rom: &LocalRom, dry_run: bool) -> SyncOutcome {
    let action = rom.decide();
    let result = if dry_run {
        Ok(())
    } else {
        match action {
            SyncAction::Upload => upload(api, rom).await,
            SyncAction::Download => download(api, rom).await,
            SyncAction::Skip => Ok(()),
        }
    };
    SyncOutcome {
        file_name: rom.file_name.clone(),
        action,
        result,
    }
}

/// Apply decisions for a whole scan, one ROM at a time. Failures are
/// captured per outcome, never aborting the rest.
pub async fn sync_all<C: CatalogApi>(
    api: &C,
    roms: &[LocalRom],
    dry_run: bool,
) -> Vec<SyncOutcome> {
    let mut outcomes = Vec::with_capacity(roms.len());
    for rom in roms {
        outcomes.push(sync_rom(api, rom, dry_run).await);
    }
    outcomes
}
