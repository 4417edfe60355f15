use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "csv", "json", "yaml", "yml", "toml", "html",
];

pub fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Text files under `dir`, skipping hidden directories, in a stable order.
pub fn walk_directory(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_text_file(path))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_filter() {
        assert!(is_text_file(Path::new("notes/today.md")));
        assert!(is_text_file(Path::new("README.TXT")));
        assert!(!is_text_file(Path::new("photo.jpg")));
        assert!(!is_text_file(Path::new("Makefile")));
    }

    #[test]
    fn test_walk_skips_hidden_dirs() {
        let root = std::env::temp_dir().join(format!("lila-walker-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::create_dir_all(root.join("notes")).unwrap();
        std::fs::write(root.join(".git/config.txt"), "hidden").unwrap();
        std::fs::write(root.join("notes/b.md"), "b").unwrap();
        std::fs::write(root.join("a.txt"), "a").unwrap();
        std::fs::write(root.join("image.png"), "nope").unwrap();

        let files = walk_directory(&root);
        assert_eq!(files, vec![root.join("a.txt"), root.join("notes/b.md")]);

        std::fs::remove_dir_all(&root).unwrap();
    }
}
