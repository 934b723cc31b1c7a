// fastslam_sim/src/simulation/config/catalog.rs

use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::SimError;

/// Resolves the `--scenario` argument to a list of scenario files.
///
/// A file is returned as-is. A directory is walked recursively and every
/// `.toml` file under it is returned in path order.
pub fn discover_scenarios(root: &Path) -> Result<Vec<PathBuf>, SimError> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        return Err(SimError::ScenarioNotFound(root.to_path_buf()));
    }

    info!("Searching for scenarios in: {}", root.display());
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|e| {
            !e.file_type().is_dir() && e.path().extension().map_or(false, |ext| ext == "toml")
        })
        .map(|e| e.into_path())
        .collect();
    found.sort();

    if found.is_empty() {
        return Err(SimError::NoScenarios(root.to_path_buf()));
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn walks_directories_for_toml_files() {
        Jail::expect_with(|jail| {
            let root = jail.directory().join("scenarios");
            std::fs::create_dir_all(root.join("nested")).map_err(|e| e.to_string())?;
            for name in ["b.toml", "a.toml", "notes.txt", "nested/c.toml"] {
                std::fs::write(root.join(name), "").map_err(|e| e.to_string())?;
            }

            let found = discover_scenarios(&root).map_err(|e| e.to_string())?;
            let names: Vec<String> = found
                .iter()
                .map(|p| p.strip_prefix(&root).unwrap().to_string_lossy().replace('\\', "/"))
                .collect();
            assert_eq!(names, vec!["a.toml", "b.toml", "nested/c.toml"]);

            let single = discover_scenarios(&root.join("a.toml")).map_err(|e| e.to_string())?;
            assert_eq!(single.len(), 1);

            std::fs::create_dir_all(root.join("empty")).map_err(|e| e.to_string())?;
            assert!(matches!(
                discover_scenarios(&root.join("empty")),
                Err(SimError::NoScenarios(_))
            ));
            Ok(())
        });
    }
}
