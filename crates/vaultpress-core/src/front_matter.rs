//! Output front matter and the final document text.

use std::path::PathBuf;

use serde_yaml::{Mapping, Value};

use crate::config::ConversionConfig;
use crate::notes::Note;

/// Used for `date`/`lastmod` when the note carries no dates.
pub const DEFAULT_DATE: &str = "2024-01-01";

/// A note ready to be written into the Hugo content tree.
#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    pub output_path: PathBuf,
    pub body: String,
    pub front_matter: Mapping,
    /// Site-relative URL (the output path without extension).
    pub url: String,
}

impl ConvertedDocument {
    /// `---`, the YAML front matter, `---`, a blank line, then the body.
    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        let yaml = serde_yaml::to_string(&self.front_matter)?;
        Ok(format!("---\n{yaml}---\n\n{}", self.body))
    }
}

/// Builds the output front matter: the note's own fields (when preserved) followed
/// by the Hugo and PaperMod fields, which overwrite same-named originals in place.
pub fn build_front_matter(note: &Note, config: &ConversionConfig) -> Mapping {
    let mut fm = if config.preserve_front_matter {
        note.metadata.clone()
    } else {
        Mapping::new()
    };

    let date = note.created_date.as_deref().unwrap_or(DEFAULT_DATE);
    let lastmod = note
        .modified_date
        .as_deref()
        .or(note.created_date.as_deref())
        .unwrap_or(DEFAULT_DATE);

    fm.insert("title".into(), note.title.clone().into());
    fm.insert("date".into(), date.into());
    fm.insert("lastmod".into(), lastmod.into());
    if note.tags.is_empty() {
        fm.remove("tags");
    } else {
        let tags: Vec<Value> = note.tags.iter().map(|t| Value::from(t.as_str())).collect();
        fm.insert("tags".into(), Value::Sequence(tags));
    }
    fm.insert("showToc".into(), config.create_toc.into());
    fm.insert("TocOpen".into(), false.into());
    fm.insert("hideSummary".into(), false.into());
    fm.insert("showWordCount".into(), true.into());
    fm.insert("showReadingTime".into(), true.into());
    fm
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::notes::parse_note_str;

    fn get(fm: &Mapping, key: &str) -> Value {
        fm.get(key).cloned().unwrap_or(Value::Null)
    }

    #[test]
    fn no_metadata_gets_stem_title_and_default_dates() {
        let note = parse_note_str(Path::new("daily log.md"), "just text");
        let fm = build_front_matter(&note, &ConversionConfig::default());
        assert_eq!(get(&fm, "title"), Value::from("daily log"));
        assert_eq!(get(&fm, "date"), Value::from(DEFAULT_DATE));
        assert_eq!(get(&fm, "lastmod"), Value::from(DEFAULT_DATE));
        assert!(fm.get("tags").is_none());
        assert_eq!(get(&fm, "showToc"), Value::from(true));
        assert_eq!(get(&fm, "TocOpen"), Value::from(false));
        assert_eq!(get(&fm, "showReadingTime"), Value::from(true));
    }

    #[test]
    fn lastmod_falls_back_to_created() {
        let note = parse_note_str(Path::new("n.md"), "---\ncreated: 2023-05-06\n---\n");
        let fm = build_front_matter(&note, &ConversionConfig::default());
        assert_eq!(get(&fm, "date"), Value::from("2023-05-06"));
        assert_eq!(get(&fm, "lastmod"), Value::from("2023-05-06"));
    }

    #[test]
    fn original_fields_preserved_first() {
        let note = parse_note_str(Path::new("n.md"), "---\nauthor: me\ntitle: T\n---\n#x");
        let fm = build_front_matter(&note, &ConversionConfig::default());
        let keys: Vec<_> = fm.keys().filter_map(|k| k.as_str()).collect();
        assert_eq!(&keys[..3], &["author", "title", "date"]);
        assert_eq!(get(&fm, "tags"), Value::Sequence(vec![Value::from("x")]));
    }

    #[test]
    fn original_fields_dropped_when_not_preserved() {
        let note = parse_note_str(Path::new("n.md"), "---\nauthor: me\n---\n");
        let mut config = ConversionConfig::default();
        config.preserve_front_matter = false;
        config.create_toc = false;
        let fm = build_front_matter(&note, &config);
        assert!(fm.get("author").is_none());
        assert_eq!(get(&fm, "showToc"), Value::from(false));
    }

    #[test]
    fn render_wraps_yaml_in_fences() {
        let mut front_matter = Mapping::new();
        front_matter.insert("title".into(), "Test Note".into());
        let doc = ConvertedDocument {
            output_path: PathBuf::from("content/test.md"),
            body: "Body".to_string(),
            front_matter,
            url: "test".to_string(),
        };
        assert_eq!(doc.render().unwrap(), "---\ntitle: Test Note\n---\n\nBody");
    }
}
