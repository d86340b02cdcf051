use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::media::{self, normalize_key, split_ext};

/// Lookup from normalized media name to the JSON sidecar that describes it.
///
/// Sidecars are named `<base>.<ext>.json`, or with Takeout's newer suffixes
/// `<base>.<ext>.<something>.json`. The key is the lowercased `<base>.<ext>`.
#[derive(Debug, Default, Clone)]
pub struct RecordIndex {
    by_key: BTreeMap<String, String>,
    /// key base (key without extension) -> first key in sorted order
    by_base: HashMap<String, String>,
    unrecognized: Vec<String>,
}

impl RecordIndex {
    /// Index every regular file in `json_dir`. Names are processed in sorted
    /// order, so when two sidecars share a key the lexicographically last one
    /// wins. Names that are not UTF-8 are reported as unrecognized. A folder
    /// that cannot be listed gives an empty index.
    pub fn build(json_dir: &Path) -> Self {
        match media::list_folder(json_dir) {
            Ok(listing) => {
                let mut index = Self::from_names(listing.names);
                index.unrecognized.extend(listing.non_utf8);
                index
            }
            Err(e) => {
                log::error!("Error accessing JSON folder {}: {}", json_dir.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_names<I>(names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut index = Self::default();
        for name in names {
            match record_key(&name) {
                Some(key) => {
                    if let Some(previous) = index.by_key.insert(key.clone(), name.clone()) {
                        log::debug!("JSON key '{}': {} replaces {}", key, name, previous);
                    }
                }
                None => {
                    log::warn!(
                        "Unrecognized JSON file naming pattern: {}. Could not determine key.",
                        name
                    );
                    index.unrecognized.push(name);
                }
            }
        }

        for key in index.by_key.keys() {
            let (base, _) = split_ext(key);
            index
                .by_base
                .entry(base.to_string())
                .or_insert_with(|| key.clone());
        }
        index
    }

    /// Exact lookup by normalized media name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    /// First key (in sorted order) whose own base equals `base`, with the
    /// record it maps to.
    pub fn find_by_base(&self, base: &str) -> Option<(&str, &str)> {
        let key = self.by_base.get(base)?;
        let record = self.by_key.get(key)?;
        Some((key.as_str(), record.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// File names that did not look like `<base>.<ext>.json`, or were not
    /// UTF-8.
    pub fn unrecognized(&self) -> &[String] {
        &self.unrecognized
    }
}

/// `IMG_0001.JPG.json` -> `img_0001.jpg`. Exactly three dot-separated parts
/// (the last one may itself contain dots) and a `.json` suffix.
fn record_key(name: &str) -> Option<String> {
    let mut parts = name.splitn(3, '.');
    let (base, ext, rest) = (parts.next()?, parts.next()?, parts.next()?);
    let rest = rest.to_lowercase();
    if rest != "json" && !rest.ends_with(".json") {
        return None;
    }
    Some(normalize_key(&format!("{}.{}", base, ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_record_key() {
        assert_eq!(record_key("IMG_0001.JPG.json").as_deref(), Some("img_0001.jpg"));
        assert_eq!(record_key("IMG_0001.JPG.JSON").as_deref(), Some("img_0001.jpg"));
        assert_eq!(
            record_key("PXL_1.mp4.supplemental-metadata.json").as_deref(),
            Some("pxl_1.mp4")
        );
        assert_eq!(record_key("metadata.json"), None);
        assert_eq!(record_key("IMG_0001.JPG.txt"), None);
        assert_eq!(record_key("noext"), None);
    }

    #[test]
    fn test_unrecognized_names_give_empty_index() {
        let input = names(&["metadata.json", "print-subscriptions.json", "readme.txt", "x.jpg.xml"]);
        let index = RecordIndex::from_names(input.clone());
        assert!(index.is_empty());
        assert_eq!(index.unrecognized(), input.as_slice());
    }

    #[test]
    fn test_collision_last_sorted_wins() {
        let mut input = names(&["img_1.JPG.json", "IMG_1.jpg.json"]);
        input.sort();
        let index = RecordIndex::from_names(input);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("img_1.jpg"), Some("img_1.JPG.json"));
    }

    #[test]
    fn test_find_by_base_is_first_sorted_key() {
        let index = RecordIndex::from_names(names(&["clip.MOV.json", "clip.heic.json", "other.mp4.json"]));
        assert_eq!(index.find_by_base("clip"), Some(("clip.heic", "clip.heic.json")));
        assert_eq!(index.find_by_base("other"), Some(("other.mp4", "other.mp4.json")));
        assert_eq!(index.find_by_base("nope"), None);
    }

    #[test]
    fn test_build_from_folder() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("IMG_0001.JPG.json"), b"{}").unwrap();
        fs::write(dir.path().join("metadata.json"), b"{}").unwrap();
        fs::create_dir(dir.path().join("nested.jpg.json")).unwrap();

        let index = RecordIndex::build(dir.path());
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("img_0001.jpg"), Some("IMG_0001.JPG.json"));
        assert_eq!(index.unrecognized(), &["metadata.json".to_string()]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_build_reports_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("IMG_0001.JPG.json"), b"{}").unwrap();
        fs::write(dir.path().join(OsStr::from_bytes(b"caf\xe9.jpg.json")), b"{}").unwrap();

        let index = RecordIndex::build(dir.path());
        assert_eq!(index.len(), 1);
        assert_eq!(index.unrecognized(), &["caf\u{fffd}.jpg.json".to_string()]);
    }

    #[test]
    fn test_build_missing_folder_is_empty() {
        let dir = tempdir().unwrap();
        let index = RecordIndex::build(&dir.path().join("missing"));
        assert!(index.is_empty());
        assert!(index.unrecognized().is_empty());
    }
}
