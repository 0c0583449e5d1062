//! Save-file reconciliation between local directories and the remote
//! catalog: scan, decide, apply.

pub mod apply;
pub mod error;
pub mod plan;
pub mod scan;
pub mod timestamp;

pub use apply::{SyncOutcome, attach_remote_saves, sync_all, sync_rom};
pub use error::SyncError;
pub use plan::{LocalRom, LocalSave, SyncAction};
pub use scan::{PlatformDirs, scan_all, scan_platform};
pub use timestamp::{parse_save_timestamp, stamped_file_name, strip_save_suffix};
