use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

const TITLE_COLUMNS: [&str; 3] = ["title", "título", "titulo"];
const URL_COLUMNS: [&str; 2] = ["link", "url"];

/// One `(title, url)` row from the input feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperEntry {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Default)]
pub struct CsvLoad {
    pub entries: Vec<PaperEntry>,
    pub skipped: usize,
}

pub fn load_entries(path: &Path) -> Result<CsvLoad> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open CSV {}", path.display()))?;
    let load = read_entries(file).with_context(|| format!("Invalid CSV {}", path.display()))?;
    info!(
        path = %path.display(),
        rows = load.entries.len(),
        skipped = load.skipped,
        "Loaded paper list"
    );
    Ok(load)
}

/// Header names are BOM-stripped and trimmed; title and URL columns are
/// matched case-insensitively. Rows with an empty or `nan` cell are skipped.
pub fn read_entries(reader: impl Read) -> Result<CsvLoad> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(normalize_header)
        .collect();

    let Some(title_idx) = column(&headers, &TITLE_COLUMNS) else {
        bail!("no title column in header {:?}", headers);
    };
    let Some(url_idx) = column(&headers, &URL_COLUMNS) else {
        bail!("no link/url column in header {:?}", headers);
    };

    let mut load = CsvLoad::default();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let title = cell(record.get(title_idx));
        let url = cell(record.get(url_idx));
        match (title, url) {
            (Some(title), Some(url)) => load.entries.push(PaperEntry { title, url }),
            _ => {
                debug!(line = line + 2, "Skipping row without title or URL");
                load.skipped += 1;
            }
        }
    }
    Ok(load)
}

fn normalize_header(h: &str) -> String {
    h.trim_start_matches('\u{feff}').trim().to_string()
}

fn column(headers: &[String], names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.to_lowercase() == *n))
}

fn cell(value: Option<&str>) -> Option<String> {
    let v = value?.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(v.to_string())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn bom_and_flexible_headers() {
        let data = "\u{feff} Title ,Link\n\
                    Mice in Space,https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1/\n\
                    ,https://example.org/no-title\n\
                    No link,nan\n\
                    \"Roots, and shoots\",https://example.org/roots\n";
        let load = read_entries(data.as_bytes()).unwrap();
        assert_eq!(load.entries.len(), 2);
        assert_eq!(load.skipped, 2);
        assert_eq!(load.entries[0].title, "Mice in Space");
        assert_eq!(load.entries[1].title, "Roots, and shoots");
        assert_eq!(load.entries[1].url, "https://example.org/roots");
    }

    #[test]
    fn alternative_column_names() {
        let load = read_entries("Título;x\n".as_bytes());
        assert!(load.is_err());

        let load = read_entries("id,TITULO,URL\n1,Plant growth,https://x.org/1\n".as_bytes()).unwrap();
        assert_eq!(
            load.entries,
            vec![PaperEntry {
                title: "Plant growth".into(),
                url: "https://x.org/1".into()
            }]
        );
    }

    #[test]
    fn missing_url_column_is_an_error() {
        let err = read_entries("Title,Authors\nA,B\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("link/url"));
    }

    #[test]
    fn loads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "title,url").unwrap();
        writeln!(f, "Bone loss,https://example.org/bone").unwrap();
        let load = load_entries(f.path()).unwrap();
        assert_eq!(load.entries.len(), 1);
    }
}
