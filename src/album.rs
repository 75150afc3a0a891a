//! Photo album helpers: month index, tag handling and data-URL embedding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Timelike;
use serde_json::{Map, Value, json};

use crate::ordering::parse_timestamp;
use crate::record::Photo;

/// `YYYY-MM` of a photo, when its timestamp parses.
pub fn month_of(photo: &Photo) -> Option<String> {
    parse_timestamp(&photo.taken_at).map(|ts| ts.format("%Y-%m").to_string())
}

/// Distinct months with photos, newest first.
pub fn months(photos: &[Photo]) -> Vec<String> {
    let mut months: Vec<String> = photos.iter().filter_map(month_of).collect();
    months.sort_unstable_by(|a, b| b.cmp(a));
    months.dedup();
    months
}

pub fn photos_in_month<'a>(photos: &'a [Photo], month: &str) -> Vec<&'a Photo> {
    photos
        .iter()
        .filter(|p| month_of(p).as_deref() == Some(month))
        .collect()
}

pub fn photos_with_tag<'a>(photos: &'a [Photo], tag: &str) -> Vec<&'a Photo> {
    photos
        .iter()
        .filter(|p| p.tags.iter().any(|t| t == tag))
        .collect()
}

/// Embed image bytes as a `data:` URL.
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Image MIME type from a file extension. Unknown extensions are sent as
/// opaque bytes.
pub fn guess_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Split a comma-separated tag list, dropping blanks and duplicates.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split([',', '，']).map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Default tags for a new photo: a "new" marker plus the time of day it
/// was taken.
pub fn auto_tags(taken_at: &str) -> Vec<String> {
    let mut tags = vec!["新照片".to_string()];
    if let Some(ts) = parse_timestamp(taken_at) {
        let part = match ts.hour() {
            6..=11 => "早晨",
            12..=17 => "下午",
            _ => "晚上",
        };
        tags.push(part.to_string());
    }
    tags
}

/// Editable photo details. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoPatch {
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
}

impl PhotoPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn into_map(self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(description) = self.description {
            map.insert("description".into(), json!(description));
        }
        if let Some(tags) = self.tags {
            map.insert("tags".into(), json!(tags));
        }
        if let Some(weight) = self.weight {
            map.insert("weight".into(), json!(weight));
        }
        if let Some(height) = self.height {
            map.insert("height".into(), json!(height));
        }
        map
    }
}

/// Tag list with `tag` appended, unless already present.
pub fn with_tag(photo: &Photo, tag: &str) -> Vec<String> {
    let mut tags = photo.tags.clone();
    let tag = tag.trim();
    if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
        tags.push(tag.to_string());
    }
    tags
}

pub fn without_tag(photo: &Photo, tag: &str) -> Vec<String> {
    photo.tags.iter().filter(|t| *t != tag).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(taken_at: &str, tags: &[&str]) -> Photo {
        Photo {
            image: "https://cdn.example/p.jpg".into(),
            taken_at: taken_at.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_months_distinct_newest_first() {
        let photos = [
            photo("2024-03-02T10:00", &[]),
            photo("2024-05-01T10:00", &[]),
            photo("2024-03-20T10:00", &[]),
            photo("not a date", &[]),
        ];
        assert_eq!(months(&photos), vec!["2024-05", "2024-03"]);
        assert_eq!(photos_in_month(&photos, "2024-03").len(), 2);
        assert!(photos_in_month(&photos, "2024-04").is_empty());
    }

    #[test]
    fn test_photos_with_tag() {
        let photos = [photo("2024-03-02", &["beach", "sunny"]), photo("2024-03-03", &["home"])];
        let found = photos_with_tag(&photos, "beach");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].taken_at, "2024-03-02");
    }

    #[test]
    fn test_data_url() {
        assert_eq!(data_url("image/png", b"hi"), "data:image/png;base64,aGk=");
        assert_eq!(guess_mime("IMG_001.JPG"), "image/jpeg");
        assert_eq!(guess_mime("README"), "application/octet-stream");
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("beach, sunny,,beach，海边 "), vec!["beach", "sunny", "海边"]);
        assert!(parse_tags(" , ").is_empty());
    }

    #[test]
    fn test_auto_tags_by_time_of_day() {
        assert_eq!(auto_tags("2024-03-02T08:00"), vec!["新照片", "早晨"]);
        assert_eq!(auto_tags("2024-03-02T15:00"), vec!["新照片", "下午"]);
        assert_eq!(auto_tags("2024-03-02T22:00"), vec!["新照片", "晚上"]);
        assert_eq!(auto_tags(""), vec!["新照片"]);
    }

    #[test]
    fn test_patch_only_carries_set_fields() {
        let patch = PhotoPatch {
            description: Some("first walk".into()),
            weight: Some(4.2),
            ..Default::default()
        };
        let map = patch.into_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["weight"], 4.2);
        assert!(PhotoPatch::default().is_empty());
    }

    #[test]
    fn test_tag_edits() {
        let p = photo("2024-03-02", &["beach"]);
        assert_eq!(with_tag(&p, "beach"), vec!["beach"]);
        assert_eq!(with_tag(&p, " park "), vec!["beach", "park"]);
        assert!(without_tag(&p, "beach").is_empty());
    }
}
