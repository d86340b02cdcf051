use std::fs;
use std::io;
use std::path::Path;

use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// File name as listed in the media folder
    pub filename: String,
    /// Lowercased, NFC-normalized filename (index lookup key)
    pub lower: String,
    /// `lower` without its extension
    pub base: String,
    /// Lowercased extension including the dot, or empty
    pub ext: String,
}

impl MediaItem {
    pub fn new(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let lower = normalize_key(&filename);
        let (base, ext) = split_ext(&lower);
        let (base, ext) = (base.to_string(), ext.to_string());
        Self {
            filename,
            lower,
            base,
            ext,
        }
    }
}

/// Lowercase + NFC, so names typed on different platforms compare equal.
pub fn normalize_key(name: &str) -> String {
    name.nfc().collect::<String>().to_lowercase()
}

/// Split at the last dot. Leading dots do not start an extension, so
/// `.hidden` has none and `a.b.mp4` splits into `a.b` and `.mp4`.
pub fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if name[..pos].chars().any(|c| c != '.') => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

/// Regular files directly inside one folder.
#[derive(Debug, Default)]
pub struct FolderListing {
    /// UTF-8 file names, sorted
    pub names: Vec<String>,
    /// Names that are not valid UTF-8, lossily converted for reporting only
    pub non_utf8: Vec<String>,
}

/// List the regular files directly inside `dir`.
pub fn list_folder(dir: &Path) -> io::Result<FolderListing> {
    let mut listing = FolderListing::default();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => listing.names.push(name),
            Err(raw) => {
                log::warn!("Non UTF-8 file name {:?} cannot be processed", raw);
                listing.non_utf8.push(raw.to_string_lossy().into_owned());
            }
        }
    }
    listing.names.sort();
    listing.non_utf8.sort();
    Ok(listing)
}
