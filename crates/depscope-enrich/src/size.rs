//! On-disk footprint of installed packages

use anyhow::{Context, Result};
use depscope_core::InstallSize;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::Path;

/// Categories in match priority order. A file lands in the first category
/// with a matching pattern, or in `other`.
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "test",
        &[
            "**/{test,tests,__tests__,__test__,spec,specs,__mocks__}/**",
            "**/*.{test,spec}.*",
        ],
    ),
    ("types", &["**/*.d.ts", "**/*.d.mts", "**/*.d.cts", "**/*.d.ts.map"]),
    ("css", &["**/*.{css,scss,sass,less,styl}"]),
    ("json", &["**/*.{json,json5,jsonc}"]),
    ("yaml", &["**/*.{yml,yaml}"]),
    ("html", &["**/*.{html,htm}"]),
    ("js", &["**/*.{js,mjs,cjs,jsx}", "**/*.{js,mjs,cjs}.map"]),
    ("ts", &["**/*.{ts,mts,cts,tsx}"]),
    ("component", &["**/*.{vue,svelte,astro}"]),
    (
        "image",
        &["**/*.{png,jpg,jpeg,gif,svg,webp,avif,ico,bmp}"],
    ),
    (
        "doc",
        &[
            "**/*.{md,markdown,mdx,txt,rst}",
            "**/{readme,license,licence,changelog,history,authors,notice}*",
        ],
    ),
];

pub const OTHER: &str = "other";

/// Compiled filename patterns for every category.
pub struct FileCategories {
    sets: Vec<(&'static str, GlobSet)>,
}

impl FileCategories {
    pub fn new() -> Result<Self> {
        let mut sets = Vec::with_capacity(CATEGORIES.len());
        for (category, patterns) in CATEGORIES {
            let mut builder = GlobSetBuilder::new();
            for pattern in *patterns {
                let glob = GlobBuilder::new(pattern)
                    .case_insensitive(true)
                    .literal_separator(true)
                    .build()
                    .with_context(|| format!("Invalid pattern {pattern}"))?;
                builder.add(glob);
            }
            sets.push((*category, builder.build()?));
        }
        Ok(Self { sets })
    }

    /// Category of a path relative to the package root.
    pub fn classify(&self, relative: &Path) -> &'static str {
        self.sets
            .iter()
            .find(|(_, set)| set.is_match(relative))
            .map(|(category, _)| *category)
            .unwrap_or(OTHER)
    }

    /// Walk a package directory and total its files per category. Nested
    /// `node_modules` and dot directories are skipped; dotfiles are counted.
    pub fn scan(&self, dir: &Path) -> Result<InstallSize> {
        let walker = WalkBuilder::new(dir)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(|entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                if entry.depth() == 0 || !is_dir {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                name != "node_modules" && !name.starts_with('.')
            })
            .build();

        let mut size = InstallSize::default();
        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let bytes = entry
                .metadata()
                .with_context(|| format!("Failed to stat {}", entry.path().display()))?
                .len();
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());

            let bucket = size
                .categories
                .entry(self.classify(relative).to_string())
                .or_default();
            bucket.bytes += bytes;
            bucket.files += 1;
            size.bytes += bytes;
            size.files += 1;
        }
        Ok(size)
    }
}

/// Scan one installed package with the default categories.
pub fn scan_install_size(dir: &Path) -> Result<InstallSize> {
    FileCategories::new()?.scan(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use depscope_core::SizeBucket;

    fn write(root: &Path, rel: &str, bytes: usize) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, vec![b'x'; bytes]).unwrap();
    }

    #[test]
    fn test_classify_priority() {
        let categories = FileCategories::new().unwrap();
        let cases = [
            ("dist/index.js", "js"),
            ("dist/index.d.ts", "types"),
            ("src/index.ts", "ts"),
            ("__tests__/index.test.ts", "test"),
            ("src/util.spec.js", "test"),
            ("package.json", "json"),
            ("README.md", "doc"),
            ("LICENSE", "doc"),
            ("style.css", "css"),
            ("logo.SVG", "image"),
            ("Button.vue", "component"),
            ("bin/cli", "other"),
            ("dist/index.js.map", "js"),
        ];
        for (path, expected) in cases {
            assert_eq!(categories.classify(Path::new(path)), expected, "{path}");
        }
    }

    #[test]
    fn test_scan_totals_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "package.json", 100);
        write(root, "index.js", 400);
        write(root, "index.d.ts", 50);
        write(root, "docs/README.md", 30);
        write(root, ".npmignore", 5);
        write(root, "node_modules/dep/index.js", 9999);
        write(root, ".cache/blob", 9999);

        let size = scan_install_size(root).unwrap();
        assert_eq!(size.files, 5);
        assert_eq!(size.bytes, 585);
        assert_eq!(size.categories["js"], SizeBucket { bytes: 400, files: 1 });
        assert_eq!(size.categories["types"].bytes, 50);
        assert_eq!(size.categories["other"].bytes, 5);
        let summed: u64 = size.categories.values().map(|b| b.bytes).sum();
        assert_eq!(summed, size.bytes);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_install_size(&dir.path().join("nope")).is_err());
    }
}
