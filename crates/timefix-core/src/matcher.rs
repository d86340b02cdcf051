use std::fmt;

use crate::media::MediaItem;
use crate::record_index::RecordIndex;

/// Which sidecar belongs to a media file, and how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordMatch {
    Direct { record: String },
    /// Video whose sidecar was written for a differently-suffixed name,
    /// e.g. `clip.mp4` described by `clip.MOV.json`.
    Fallback { key: String, record: String },
}

impl RecordMatch {
    pub fn record(&self) -> &str {
        match self {
            RecordMatch::Direct { record } | RecordMatch::Fallback { record, .. } => record,
        }
    }
}

impl fmt::Display for RecordMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordMatch::Direct { .. } => write!(f, "direct"),
            RecordMatch::Fallback { key, .. } => {
                write!(f, "fallback (video using JSON key: {})", key)
            }
        }
    }
}

/// Media extension for which a base-name match is allowed.
const FALLBACK_EXT: &str = ".mp4";

/// Exact lookup first; base-name fallback for `.mp4` only.
pub fn resolve(media: &MediaItem, index: &RecordIndex) -> Option<RecordMatch> {
    if let Some(record) = index.get(&media.lower) {
        return Some(RecordMatch::Direct {
            record: record.to_string(),
        });
    }

    if media.ext != FALLBACK_EXT {
        return None;
    }

    let (key, record) = index.find_by_base(&media.base)?;
    log::info!(
        "{}: no exact JSON match, using {} (key {})",
        media.filename,
        record,
        key
    );
    Some(RecordMatch::Fallback {
        key: key.to_string(),
        record: record.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(list: &[&str]) -> RecordIndex {
        RecordIndex::from_names(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_direct_match_is_case_insensitive() {
        let idx = index(&["IMG_0001.JPG.json"]);
        let m = resolve(&MediaItem::new("img_0001.jpg"), &idx).unwrap();
        assert_eq!(m, RecordMatch::Direct { record: "IMG_0001.JPG.json".into() });
        assert_eq!(m.to_string(), "direct");
    }

    #[test]
    fn test_mp4_fallback() {
        let idx = index(&["clip.MOV.json"]);
        let m = resolve(&MediaItem::new("clip.mp4"), &idx).unwrap();
        assert_eq!(
            m,
            RecordMatch::Fallback { key: "clip.mov".into(), record: "clip.MOV.json".into() }
        );
        assert_eq!(m.record(), "clip.MOV.json");
        assert!(m.to_string().starts_with("fallback"));
    }

    #[test]
    fn test_fallback_only_for_mp4() {
        let idx = index(&["clip.MOV.json", "photo.heic.json"]);
        assert!(resolve(&MediaItem::new("clip.mov4"), &idx).is_none());
        assert!(resolve(&MediaItem::new("photo.jpg"), &idx).is_none());
        assert!(resolve(&MediaItem::new("clip.MP4"), &idx).is_some());
    }

    #[test]
    fn test_fallback_never_overrides_exact() {
        let idx = index(&["clip.heic.json", "clip.mp4.json"]);
        let m = resolve(&MediaItem::new("clip.mp4"), &idx).unwrap();
        assert_eq!(m, RecordMatch::Direct { record: "clip.mp4.json".into() });
    }

    #[test]
    fn test_no_match() {
        let idx = index(&["a.jpg.json"]);
        assert!(resolve(&MediaItem::new("b.mp4"), &idx).is_none());
    }
}
