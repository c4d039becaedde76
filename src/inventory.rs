use anyhow::{Context, Result};
use std::{collections::BTreeSet, path::Path};
use walkdir::WalkDir;

/// Filenames directly inside `dir` that end with `extension`. Symlinks count
/// by name unless they resolve to a directory.
pub fn local_mods(dir: &Path, extension: &str) -> Result<BTreeSet<String>> {
    let mut mods = BTreeSet::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("read mods dir {}", dir.display()))?;
        if entry.file_type().is_dir() || entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if has_extension(&name, extension) {
            mods.insert(name.to_string());
        }
    }
    Ok(mods)
}

pub fn has_extension(name: &str, extension: &str) -> bool {
    name.ends_with(extension)
}

/// Sorted names present remotely but not locally.
pub fn missing_mods(local: &BTreeSet<String>, remote: &BTreeSet<String>) -> Vec<String> {
    remote.difference(local).cloned().collect()
}
