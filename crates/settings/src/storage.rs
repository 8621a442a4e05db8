//! Small filesystem helpers shared by the settings and project stores.

use std::fs;
use std::io;
use std::path::Path;

/// Writes `data` through a temporary sibling file followed by rename, so
/// readers see either the old document or the new one.
/// 以臨時檔案搭配 rename 實現原子寫入。
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, data)?;
    fs::rename(&staging, path)
}
