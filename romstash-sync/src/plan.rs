//! The per-ROM sync decision.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use romstash_remote::RemoteSave;

use crate::timestamp::{parse_save_timestamp, strip_save_suffix};

/// What to do with one ROM's save pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Upload,
    Download,
    Skip,
}

/// A save file found next to a local ROM.
#[derive(Debug, Clone)]
pub struct LocalSave {
    pub path: PathBuf,
    pub mtime: DateTime<Utc>,
}

/// One local ROM file with its save pairing and the remote saves fetched
/// for it.
#[derive(Debug, Clone)]
pub struct LocalRom {
    pub fs_slug: String,
    pub file_name: String,
    pub path: PathBuf,
    /// Directory downloaded saves are written to.
    pub save_dir: PathBuf,
    /// Catalog identity, resolved through the filename index.
    pub rom_id: Option<i64>,
    pub save: Option<LocalSave>,
    pub remote_saves: Vec<RemoteSave>,
}

/// A remote save's base name for matching: extension-stripped, then
/// timestamp-suffix-stripped.
fn remote_base(save: &RemoteSave) -> &str {
    let no_ext = if save.file_name_no_ext.is_empty() {
        match save.file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &save.file_name,
        }
    } else {
        &save.file_name_no_ext
    };
    strip_save_suffix(no_ext)
}

/// A remote save's authoritative time: the filename suffix when it
/// parses, the record's update time otherwise.
pub(crate) fn remote_time(save: &RemoteSave) -> DateTime<Utc> {
    let no_ext = if save.file_name_no_ext.is_empty() {
        match save.file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &save.file_name,
        }
    } else {
        &save.file_name_no_ext
    };
    parse_save_timestamp(no_ext).unwrap_or(save.updated_at)
}

impl LocalRom {
    /// The ROM's filename with its extension stripped.
    pub fn base_name(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.file_name,
        }
    }

    /// The matching remote save to compare against: same base name, most
    /// recently updated among duplicates.
    pub fn matching_remote(&self) -> Option<&RemoteSave> {
        let base = self.base_name();
        self.remote_saves
            .iter()
            .filter(|s| remote_base(s) == base)
            .max_by_key(|s| s.updated_at)
    }

    /// Decide the sync action for this ROM's save pairing.
    ///
    /// Both sides are truncated to whole seconds so sub-second jitter
    /// never causes a spurious transfer.
    pub fn decide(&self) -> SyncAction {
        let remote = self.matching_remote();
        match (&self.save, remote) {
            (None, None) => SyncAction::Skip,
            (Some(_), None) => SyncAction::Upload,
            (None, Some(_)) => SyncAction::Download,
            (Some(local), Some(remote)) => {
                let local_secs = local.mtime.timestamp();
                let remote_secs = remote_time(remote).timestamp();
                match local_secs.cmp(&remote_secs) {
                    std::cmp::Ordering::Less => SyncAction::Download,
                    std::cmp::Ordering::Greater => SyncAction::Upload,
                    std::cmp::Ordering::Equal => SyncAction::Skip,
                }
            }
        }
    }
}
