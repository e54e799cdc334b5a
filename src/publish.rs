use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

const TEMP_PREFIX: &str = ".megaconfigmap-";

/// True if `name` is a plain file name that stays inside the directory it
/// is joined to.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

/// Writes `data` to `dir/file_name` so that readers observe either no file or
/// the complete contents, never a partial write.
///
/// The bytes go to a temporary file in `dir` that is flushed to disk and then
/// renamed over the target. An existing file is replaced.
pub async fn publish_atomically(
    dir: &Path,
    file_name: &str,
    data: Vec<u8>,
) -> io::Result<PathBuf> {
    if !is_plain_file_name(file_name) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{file_name:?} is not a plain file name"),
        ));
    }
    let dir = dir.to_path_buf();
    let target = dir.join(file_name);
    tokio::task::spawn_blocking(move || write_and_rename(&dir, &target, &data).map(|_| target))
        .await
        .map_err(io::Error::other)?
}

fn write_and_rename(dir: &Path, target: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;

    // Temporary files are created owner-only. The published file is read by
    // other containers of the pod.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }

    let temp_path = file.path().to_path_buf();
    file.persist(target).map_err(|e| e.error)?;
    debug!(from = %temp_path.display(), to = %target.display(), "renamed published file");

    // Make the rename itself durable.
    #[cfg(unix)]
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}
