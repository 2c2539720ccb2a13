//! Shared temp-file-then-rename write helper used by every persistent
//! store in this crate so a reader never observes a half-written file.

use std::path::Path;

use runforge_types::RunforgeError;

pub fn atomic_write(path: &Path, contents: &str) -> Result<(), RunforgeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, contents)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

pub fn read_json_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "discarding corrupt state file");
            T::default()
        }),
        Err(_) => T::default(),
    }
}
