//! Metadata documents embedded in the archive
//!
//! Generation is pluggable through [`MetadataGenerator`]. The bundled
//! [`ComicInfoGenerator`] writes ComicInfo.xml documents understood by common
//! comic readers and a `series.json` summary.

use crate::error::Result;
use crate::types::ChapterInfo;
use crate::utils::value_to_string;
use serde_json::{Value, json};

/// Produces the metadata documents for chapters, volumes and the series
pub trait MetadataGenerator: Send + Sync {
    /// ComicInfo.xml placed inside a chapter container
    fn chapter_comic_info(&self, info: &ChapterInfo) -> Result<Vec<u8>>;

    /// ComicInfo.xml placed in a volume directory
    fn volume_comic_info(
        &self,
        volume: i64,
        series_title: &str,
        chapter_count: usize,
        series_meta: &Value,
    ) -> Result<Vec<u8>>;

    /// ComicInfo.xml placed in the series directory
    fn series_comic_info(&self, series_title: &str, series_meta: &Value) -> Result<Vec<u8>>;

    /// `series.json` placed in the series directory
    fn series_json(&self, series_title: &str, series_meta: &Value) -> Result<String>;
}

/// Minimal ComicInfo / series.json generator
#[derive(Debug, Default, Clone, Copy)]
pub struct ComicInfoGenerator;

impl MetadataGenerator for ComicInfoGenerator {
    fn chapter_comic_info(&self, info: &ChapterInfo) -> Result<Vec<u8>> {
        let mut doc = ComicInfoDoc::new();
        doc.field("Series", &info.series_title);
        doc.field("Number", &info.number.to_string());
        doc.field("Volume", &info.volume.to_string());
        doc.field("Title", &info.name);
        doc.field("Translator", &info.teams.join(", "));
        doc.field("PageCount", &info.pages_count.to_string());
        Ok(doc.finish())
    }

    fn volume_comic_info(
        &self,
        volume: i64,
        series_title: &str,
        chapter_count: usize,
        series_meta: &Value,
    ) -> Result<Vec<u8>> {
        let mut doc = ComicInfoDoc::new();
        doc.field("Series", series_title);
        doc.field("Volume", &volume.to_string());
        doc.field("Count", &chapter_count.to_string());
        series_fields(&mut doc, series_meta);
        Ok(doc.finish())
    }

    fn series_comic_info(&self, series_title: &str, series_meta: &Value) -> Result<Vec<u8>> {
        let mut doc = ComicInfoDoc::new();
        doc.field("Series", series_title);
        series_fields(&mut doc, series_meta);
        Ok(doc.finish())
    }

    fn series_json(&self, series_title: &str, series_meta: &Value) -> Result<String> {
        let doc = json!({
            "metadata": {
                "type": "comicSeries",
                "name": series_title,
                "alternate_name": text(series_meta, "eng_name"),
                "description_text": text(series_meta, "summary"),
                "year": year(series_meta),
                "authors": names(series_meta, "authors"),
                "genres": names(series_meta, "genres"),
                "publisher": names(series_meta, "publisher").first(),
            }
        });
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}

fn series_fields(doc: &mut ComicInfoDoc, meta: &Value) {
    doc.field("Summary", &text(meta, "summary"));
    doc.field("Writer", &names(meta, "authors").join(", "));
    doc.field("Penciller", &names(meta, "artists").join(", "));
    doc.field("Publisher", &names(meta, "publisher").join(", "));
    doc.field("Genre", &names(meta, "genres").join(", "));
    doc.field("Tags", &names(meta, "tags").join(", "));
    if let Some(year) = year(meta) {
        doc.field("Year", &year.to_string());
    }
}

/// String field of the metadata (empty when absent)
fn text(meta: &Value, key: &str) -> String {
    meta.get(key).map(value_to_string).unwrap_or_default()
}

/// `name` of every object in a list field; a single object counts as a list of one
fn names(meta: &Value, key: &str) -> Vec<String> {
    let items = match meta.get(key) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item @ Value::Object(_)) => vec![item],
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| item.get("name").or_else(|| item.get("rus_name")))
        .map(value_to_string)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Leading four-digit year of `releaseDate`
fn year(meta: &Value) -> Option<u32> {
    let date = text(meta, "releaseDate");
    date.get(..4)?.parse().ok()
}

struct ComicInfoDoc {
    body: String,
}

impl ComicInfoDoc {
    fn new() -> Self {
        Self {
            body: String::from(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<ComicInfo xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\">\n",
            ),
        }
    }

    /// Append `<name>value</name>`; empty values are omitted
    fn field(&mut self, name: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        self.body
            .push_str(&format!("  <{name}>{}</{name}>\n", escape_xml(value)));
    }

    fn finish(mut self) -> Vec<u8> {
        self.body.push_str("</ComicInfo>\n");
        self.body.into_bytes()
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ChapterInfo {
        ChapterInfo {
            number: 54,
            volume: 6,
            name: "Rain & <Sun>".into(),
            pages_count: 20,
            series_title: "Kaoru Hana".into(),
            teams: vec!["Team A".into(), "Team B".into()],
            chapter_id: "4411".into(),
        }
    }

    #[test]
    fn test_chapter_comic_info() {
        let xml = String::from_utf8(ComicInfoGenerator.chapter_comic_info(&info()).unwrap()).unwrap();

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<Series>Kaoru Hana</Series>"));
        assert!(xml.contains("<Number>54</Number>"));
        assert!(xml.contains("<Volume>6</Volume>"));
        assert!(xml.contains("<Title>Rain &amp; &lt;Sun&gt;</Title>"));
        assert!(xml.contains("<Translator>Team A, Team B</Translator>"));
        assert!(xml.contains("<PageCount>20</PageCount>"));
        assert!(xml.trim_end().ends_with("</ComicInfo>"));
    }

    #[test]
    fn test_empty_fields_omitted() {
        let mut chapter = info();
        chapter.name.clear();
        chapter.teams.clear();
        let xml = String::from_utf8(ComicInfoGenerator.chapter_comic_info(&chapter).unwrap()).unwrap();
        assert!(!xml.contains("<Title>"));
        assert!(!xml.contains("<Translator>"));
    }

    #[test]
    fn test_series_documents_use_metadata() {
        let meta = json!({
            "summary": "A story",
            "releaseDate": "2021-05-01",
            "authors": [{"name": "Saka Mikami"}],
            "genres": [{"name": "Romance"}, {"name": "Drama"}],
            "publisher": {"name": "Kodansha"}
        });

        let xml = String::from_utf8(ComicInfoGenerator.series_comic_info("Title", &meta).unwrap()).unwrap();
        assert!(xml.contains("<Summary>A story</Summary>"));
        assert!(xml.contains("<Writer>Saka Mikami</Writer>"));
        assert!(xml.contains("<Genre>Romance, Drama</Genre>"));
        assert!(xml.contains("<Publisher>Kodansha</Publisher>"));
        assert!(xml.contains("<Year>2021</Year>"));

        let volume = String::from_utf8(
            ComicInfoGenerator
                .volume_comic_info(3, "Title", 7, &meta)
                .unwrap(),
        )
        .unwrap();
        assert!(volume.contains("<Volume>3</Volume>"));
        assert!(volume.contains("<Count>7</Count>"));

        let series: Value =
            serde_json::from_str(&ComicInfoGenerator.series_json("Title", &meta).unwrap()).unwrap();
        assert_eq!(series["metadata"]["name"], "Title");
        assert_eq!(series["metadata"]["year"], 2021);
        assert_eq!(series["metadata"]["publisher"], "Kodansha");
        assert_eq!(series["metadata"]["genres"], json!(["Romance", "Drama"]));
    }

    #[test]
    fn test_series_documents_tolerate_empty_metadata() {
        let meta = json!({});
        assert!(ComicInfoGenerator.series_comic_info("T", &meta).is_ok());
        let series: Value =
            serde_json::from_str(&ComicInfoGenerator.series_json("T", &meta).unwrap()).unwrap();
        assert_eq!(series["metadata"]["year"], Value::Null);
    }
}
