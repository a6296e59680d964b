use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::extract::PaperRecord;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS papers (
            id                  INTEGER PRIMARY KEY,
            title               TEXT NOT NULL,
            abstract            TEXT,
            year                INTEGER,
            journal             TEXT,
            doi                 TEXT UNIQUE,
            pdf_url             TEXT,
            full_text           TEXT,
            methods_section     TEXT,
            results_section     TEXT,
            conclusions_section TEXT,
            is_stub             INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at          TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_papers_title_year ON papers(title, year);
        CREATE INDEX IF NOT EXISTS idx_papers_pdf_url ON papers(pdf_url);

        CREATE TABLE IF NOT EXISTS authors (
            id         INTEGER PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name  TEXT NOT NULL,
            UNIQUE(first_name, last_name)
        );

        CREATE TABLE IF NOT EXISTS paper_authors (
            paper_id  INTEGER NOT NULL REFERENCES papers(id),
            author_id INTEGER NOT NULL REFERENCES authors(id),
            position  INTEGER NOT NULL,
            UNIQUE(paper_id, author_id)
        );
        CREATE INDEX IF NOT EXISTS idx_paper_authors_author ON paper_authors(author_id);

        CREATE TABLE IF NOT EXISTS keywords (
            id   INTEGER PRIMARY KEY,
            word TEXT UNIQUE NOT NULL
        );

        CREATE TABLE IF NOT EXISTS paper_keywords (
            paper_id   INTEGER NOT NULL REFERENCES papers(id),
            keyword_id INTEGER NOT NULL REFERENCES keywords(id),
            relevance  REAL NOT NULL DEFAULT 1.0,
            UNIQUE(paper_id, keyword_id)
        );
        CREATE INDEX IF NOT EXISTS idx_paper_keywords_keyword ON paper_keywords(keyword_id);

        -- Figure and table captions
        CREATE TABLE IF NOT EXISTS paper_resources (
            id       INTEGER PRIMARY KEY,
            paper_id INTEGER NOT NULL REFERENCES papers(id),
            kind     TEXT NOT NULL CHECK(kind IN ('figure','table')),
            position INTEGER NOT NULL,
            caption  TEXT NOT NULL,
            UNIQUE(paper_id, kind, position)
        );

        CREATE TABLE IF NOT EXISTS summaries (
            paper_id            INTEGER PRIMARY KEY REFERENCES papers(id),
            summary_abstract    TEXT,
            summary_results     TEXT,
            summary_conclusions TEXT,
            key_findings        TEXT,
            updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS themes (
            id          INTEGER PRIMARY KEY,
            name        TEXT UNIQUE NOT NULL,
            description TEXT,
            color       TEXT
        );

        CREATE TABLE IF NOT EXISTS paper_themes (
            paper_id   INTEGER NOT NULL REFERENCES papers(id),
            theme_id   INTEGER NOT NULL REFERENCES themes(id),
            confidence REAL NOT NULL,
            UNIQUE(paper_id, theme_id)
        );

        CREATE TABLE IF NOT EXISTS effects (
            id             INTEGER PRIMARY KEY,
            paper_id       INTEGER NOT NULL REFERENCES papers(id),
            effect_type    TEXT NOT NULL CHECK(effect_type IN ('positive','negative','neutral')),
            description    TEXT NOT NULL,
            confidence     REAL NOT NULL,
            section_source TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_effects_paper ON effects(paper_id);

        CREATE TABLE IF NOT EXISTS comparisons (
            id                INTEGER PRIMARY KEY,
            topic             TEXT NOT NULL,
            papers_supporting INTEGER NOT NULL,
            papers_against    INTEGER NOT NULL,
            papers_neutral    INTEGER NOT NULL,
            consensus_level   TEXT NOT NULL CHECK(consensus_level IN ('positive','negative','mixed')),
            summary           TEXT NOT NULL,
            paper_ids         TEXT NOT NULL,
            created_at        TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS citations (
            cited_id  INTEGER NOT NULL REFERENCES papers(id),
            citing_id INTEGER NOT NULL REFERENCES papers(id),
            UNIQUE(cited_id, citing_id)
        );

        CREATE TABLE IF NOT EXISTS paper_relations (
            paper_a         INTEGER NOT NULL REFERENCES papers(id),
            paper_b         INTEGER NOT NULL REFERENCES papers(id),
            shared_keywords INTEGER NOT NULL,
            strength        REAL NOT NULL,
            UNIQUE(paper_a, paper_b)
        );
        ",
    )?;
    Ok(())
}

// ── Papers ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted {
    pub id: i64,
    pub inserted: bool,
}

/// Insert or find a paper keyed by DOI, else by title + year. An existing
/// row keeps its data except abstract and full text, which are refreshed
/// when the new record carries them. A real record for a URL that was
/// stored as a stub replaces that stub row.
pub fn upsert_paper(conn: &Connection, p: &PaperRecord) -> Result<Upserted> {
    let stub_row = if p.stub {
        None
    } else {
        find_stub_by_url(conn, &p.pdf_url)?
    };

    match (find_paper(conn, p.doi.as_deref(), &p.title, p.year)?, stub_row) {
        (Some(id), Some(stub)) if id == stub => replace_stub(conn, id, p),
        (Some(id), _) => {
            conn.execute(
                "UPDATE papers SET
                    abstract  = COALESCE(?2, abstract),
                    full_text = COALESCE(?3, full_text),
                    updated_at = datetime('now')
                 WHERE id = ?1",
                params![id, p.abstract_text, p.full_text],
            )?;
            Ok(Upserted {
                id,
                inserted: false,
            })
        }
        (None, Some(stub)) => replace_stub(conn, stub, p),
        (None, None) => {
            conn.execute(
                "INSERT INTO papers
                 (title, abstract, year, journal, doi, pdf_url, full_text,
                  methods_section, results_section, conclusions_section, is_stub)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    p.title,
                    p.abstract_text,
                    p.year,
                    p.journal,
                    p.doi,
                    (!p.pdf_url.is_empty()).then_some(&p.pdf_url),
                    p.full_text,
                    p.methods_section,
                    p.results_section,
                    p.conclusions_section,
                    p.stub,
                ],
            )?;
            Ok(Upserted {
                id: conn.last_insert_rowid(),
                inserted: true,
            })
        }
    }
}

/// Overwrite every column of a stub row, keeping its id.
fn replace_stub(conn: &Connection, id: i64, p: &PaperRecord) -> Result<Upserted> {
    conn.execute(
        "UPDATE papers SET
            title = ?2, abstract = ?3, year = ?4, journal = ?5, doi = ?6,
            full_text = ?7, methods_section = ?8, results_section = ?9,
            conclusions_section = ?10, is_stub = 0, updated_at = datetime('now')
         WHERE id = ?1",
        params![
            id,
            p.title,
            p.abstract_text,
            p.year,
            p.journal,
            p.doi,
            p.full_text,
            p.methods_section,
            p.results_section,
            p.conclusions_section,
        ],
    )?;
    Ok(Upserted {
        id,
        inserted: false,
    })
}

fn find_stub_by_url(conn: &Connection, url: &str) -> Result<Option<i64>> {
    if url.is_empty() {
        return Ok(None);
    }
    Ok(conn
        .query_row(
            "SELECT id FROM papers WHERE pdf_url = ?1 AND is_stub = 1 ORDER BY id LIMIT 1",
            [url],
            |r| r.get(0),
        )
        .optional()?)
}

fn find_paper(
    conn: &Connection,
    doi: Option<&str>,
    title: &str,
    year: Option<i32>,
) -> Result<Option<i64>> {
    let id = match doi {
        Some(doi) => conn
            .query_row("SELECT id FROM papers WHERE doi = ?1", [doi], |r| r.get(0))
            .optional()?,
        None => conn
            .query_row(
                "SELECT id FROM papers WHERE title = ?1 AND year IS ?2 ORDER BY id LIMIT 1",
                params![title, year],
                |r| r.get(0),
            )
            .optional()?,
    };
    Ok(id)
}

/// Paper row plus its authors and captions, in one transaction.
pub fn save_paper(conn: &Connection, p: &PaperRecord) -> Result<Upserted> {
    let tx = conn.unchecked_transaction()?;
    let up = upsert_paper(&tx, p)?;
    {
        let mut a_stmt = tx.prepare(
            "INSERT INTO authors (first_name, last_name) VALUES (?1, ?2)
             ON CONFLICT(first_name, last_name) DO UPDATE SET first_name = excluded.first_name
             RETURNING id",
        )?;
        let mut pa_stmt = tx.prepare(
            "INSERT OR IGNORE INTO paper_authors (paper_id, author_id, position)
             VALUES (?1, ?2, ?3)",
        )?;
        for (pos, name) in p.authors.iter().enumerate() {
            let (first, last) = split_name(name);
            let author_id: i64 = a_stmt.query_row(params![first, last], |r| r.get(0))?;
            pa_stmt.execute(params![up.id, author_id, pos as i64])?;
        }

        let mut r_stmt = tx.prepare(
            "INSERT OR REPLACE INTO paper_resources (paper_id, kind, position, caption)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (pos, caption) in p.figures.iter().enumerate() {
            r_stmt.execute(params![up.id, "figure", pos as i64, caption])?;
        }
        for (pos, caption) in p.tables.iter().enumerate() {
            r_stmt.execute(params![up.id, "table", pos as i64, caption])?;
        }
    }
    tx.commit()?;
    Ok(up)
}

/// "Anna-Lisa Paul" → ("Anna-Lisa", "Paul").
fn split_name(name: &str) -> (&str, &str) {
    match name.trim().split_once(' ') {
        Some((first, last)) => (first, last.trim()),
        None => (name.trim(), ""),
    }
}

/// True when `url` has already produced a real (non-stub) record.
pub fn paper_extracted_from(conn: &Connection, url: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM papers WHERE pdf_url = ?1 AND is_stub = 0 LIMIT 1",
            [url],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

#[derive(Debug, Clone)]
pub struct PaperRow {
    pub id: i64,
    pub title: String,
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    pub pdf_url: Option<String>,
    pub methods_section: Option<String>,
    pub results_section: Option<String>,
    pub conclusions_section: Option<String>,
}

const PAPER_COLUMNS: &str = "p.id, p.title, p.abstract, p.year, p.journal, p.doi, p.pdf_url,
     p.methods_section, p.results_section, p.conclusions_section";

fn paper_row(row: &rusqlite::Row) -> rusqlite::Result<PaperRow> {
    Ok(PaperRow {
        id: row.get(0)?,
        title: row.get(1)?,
        abstract_text: row.get(2)?,
        year: row.get(3)?,
        journal: row.get(4)?,
        doi: row.get(5)?,
        pdf_url: row.get(6)?,
        methods_section: row.get(7)?,
        results_section: row.get(8)?,
        conclusions_section: row.get(9)?,
    })
}

fn limit_clause(limit: Option<usize>) -> String {
    match limit {
        Some(n) => format!(" LIMIT {}", n),
        None => String::new(),
    }
}

pub fn fetch_paper(conn: &Connection, id: i64) -> Result<Option<PaperRow>> {
    let sql = format!("SELECT {} FROM papers p WHERE p.id = ?1", PAPER_COLUMNS);
    Ok(conn.query_row(&sql, [id], paper_row).optional()?)
}

/// Papers with an abstract or section text and no summary yet.
pub fn fetch_unsummarized(conn: &Connection, limit: Option<usize>) -> Result<Vec<PaperRow>> {
    let sql = format!(
        "SELECT {}
         FROM papers p
         LEFT JOIN summaries s ON s.paper_id = p.id
         WHERE s.paper_id IS NULL
           AND (p.abstract IS NOT NULL OR p.results_section IS NOT NULL
                OR p.conclusions_section IS NOT NULL)
         ORDER BY p.id{}",
        PAPER_COLUMNS,
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], paper_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Papers whose DOI or URL carries a PMC id.
pub fn fetch_pmc_papers(conn: &Connection, limit: Option<usize>) -> Result<Vec<PaperRow>> {
    let sql = format!(
        "SELECT {}
         FROM papers p
         WHERE UPPER(COALESCE(p.doi, '')) LIKE '%PMC%'
            OR LOWER(COALESCE(p.pdf_url, '')) LIKE '%pmc%'
         ORDER BY p.id{}",
        PAPER_COLUMNS,
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], paper_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Summaries & keywords ──

pub struct SummaryRow {
    pub paper_id: i64,
    pub summary_abstract: Option<String>,
    pub summary_results: Option<String>,
    pub summary_conclusions: Option<String>,
    pub key_findings: Vec<String>,
}

pub struct KeywordRow {
    pub word: String,
    pub relevance: f64,
}

pub fn save_summary(conn: &Connection, s: &SummaryRow, keywords: &[KeywordRow]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO summaries
         (paper_id, summary_abstract, summary_results, summary_conclusions, key_findings)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(paper_id) DO UPDATE SET
            summary_abstract    = excluded.summary_abstract,
            summary_results     = excluded.summary_results,
            summary_conclusions = excluded.summary_conclusions,
            key_findings        = excluded.key_findings,
            updated_at          = datetime('now')",
        params![
            s.paper_id,
            s.summary_abstract,
            s.summary_results,
            s.summary_conclusions,
            serde_json::to_string(&s.key_findings)?,
        ],
    )?;
    {
        let mut k_stmt = tx.prepare(
            "INSERT INTO keywords (word) VALUES (?1)
             ON CONFLICT(word) DO UPDATE SET word = excluded.word
             RETURNING id",
        )?;
        let mut pk_stmt = tx.prepare(
            "INSERT INTO paper_keywords (paper_id, keyword_id, relevance) VALUES (?1, ?2, ?3)
             ON CONFLICT(paper_id, keyword_id) DO UPDATE SET relevance = excluded.relevance",
        )?;
        for k in keywords {
            let keyword_id: i64 = k_stmt.query_row([&k.word], |r| r.get(0))?;
            pk_stmt.execute(params![s.paper_id, keyword_id, k.relevance])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// (paper id, summary text) for summarized papers with no effect rows.
pub fn fetch_summaries_without_effects(conn: &Connection) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(
        "SELECT s.paper_id,
                TRIM(COALESCE(s.summary_results, '') || ' ' ||
                     COALESCE(s.summary_conclusions, '') || ' ' ||
                     COALESCE(s.summary_abstract, ''))
         FROM summaries s
         WHERE NOT EXISTS (SELECT 1 FROM effects e WHERE e.paper_id = s.paper_id)
         ORDER BY s.paper_id",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Keyword lists per paper, ordered by paper id.
pub fn fetch_paper_keywords(conn: &Connection) -> Result<Vec<(i64, Vec<String>)>> {
    let mut stmt = conn.prepare(
        "SELECT pk.paper_id, k.word
         FROM paper_keywords pk
         JOIN keywords k ON k.id = pk.keyword_id
         ORDER BY pk.paper_id, k.word",
    )?;
    let pairs = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut grouped: Vec<(i64, Vec<String>)> = Vec::new();
    for (paper_id, word) in pairs {
        match grouped.last_mut() {
            Some((id, words)) if *id == paper_id => words.push(word),
            _ => grouped.push((paper_id, vec![word])),
        }
    }
    Ok(grouped)
}

// ── Effects ──

pub struct EffectRow {
    pub paper_id: i64,
    pub effect_type: String,
    pub description: String,
    pub confidence: f64,
    pub section_source: String,
}

pub fn save_effects(conn: &Connection, rows: &[EffectRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO effects (paper_id, effect_type, description, confidence, section_source)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for r in rows {
            count += stmt.execute(params![
                r.paper_id, r.effect_type, r.description, r.confidence, r.section_source,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Themes ──

/// Insert missing themes and return ids in the order given.
pub fn ensure_themes(conn: &Connection, themes: &[(&str, &str, &str)]) -> Result<Vec<i64>> {
    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(themes.len());
    {
        let mut stmt = tx.prepare(
            "INSERT INTO themes (name, description, color) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET description = excluded.description
             RETURNING id",
        )?;
        for (name, description, color) in themes {
            ids.push(stmt.query_row(params![name, description, color], |r| r.get(0))?);
        }
    }
    tx.commit()?;
    Ok(ids)
}

/// (paper id, title, summary abstract) for summarized papers with no theme.
pub fn fetch_unthemed(conn: &Connection) -> Result<Vec<(i64, String, Option<String>)>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.title, s.summary_abstract
         FROM papers p
         JOIN summaries s ON s.paper_id = p.id
         WHERE NOT EXISTS (SELECT 1 FROM paper_themes pt WHERE pt.paper_id = p.id)
         ORDER BY p.id",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn save_paper_themes(conn: &Connection, rows: &[(i64, i64, f64)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO paper_themes (paper_id, theme_id, confidence) VALUES (?1, ?2, ?3)
             ON CONFLICT(paper_id, theme_id) DO UPDATE SET confidence = excluded.confidence",
        )?;
        for (paper_id, theme_id, confidence) in rows {
            count += stmt.execute(params![paper_id, theme_id, confidence])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub struct ThemeEffectRow {
    pub theme: String,
    pub paper_id: i64,
    pub effect_type: String,
}

/// Every (theme, paper, effect) triple with confidence above 0.5 on both links.
pub fn fetch_theme_effects(conn: &Connection) -> Result<Vec<ThemeEffectRow>> {
    let mut stmt = conn.prepare(
        "SELECT t.name, p.id, e.effect_type
         FROM papers p
         JOIN paper_themes pt ON pt.paper_id = p.id
         JOIN themes t ON t.id = pt.theme_id
         JOIN effects e ON e.paper_id = p.id
         WHERE pt.confidence > 0.5 AND e.confidence > 0.5
         ORDER BY t.name, p.id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ThemeEffectRow {
                theme: row.get(0)?,
                paper_id: row.get(1)?,
                effect_type: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Comparisons ──

pub struct ComparisonRow {
    pub topic: String,
    pub papers_supporting: usize,
    pub papers_against: usize,
    pub papers_neutral: usize,
    pub consensus_level: String,
    pub summary: String,
    pub paper_ids: Vec<i64>,
}

/// Comparisons are regenerated wholesale on each run.
pub fn replace_comparisons(conn: &Connection, rows: &[ComparisonRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM comparisons", [])?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO comparisons
             (topic, papers_supporting, papers_against, papers_neutral,
              consensus_level, summary, paper_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for r in rows {
            count += stmt.execute(params![
                r.topic,
                r.papers_supporting as i64,
                r.papers_against as i64,
                r.papers_neutral as i64,
                r.consensus_level,
                r.summary,
                serde_json::to_string(&r.paper_ids)?,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Citations ──

pub fn save_citation(conn: &Connection, cited_id: i64, citing_id: i64) -> Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO citations (cited_id, citing_id) VALUES (?1, ?2)",
        params![cited_id, citing_id],
    )?;
    Ok(n > 0)
}

// ── Relations ──

#[derive(Debug, Clone, PartialEq)]
pub struct RelationRow {
    pub paper_a: i64,
    pub paper_b: i64,
    pub shared_keywords: usize,
    pub strength: f64,
}

pub fn replace_relations(conn: &Connection, rows: &[RelationRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM paper_relations", [])?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO paper_relations (paper_a, paper_b, shared_keywords, strength)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for r in rows {
            count += stmt.execute(params![r.paper_a, r.paper_b, r.shared_keywords as i64, r.strength])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_relations(conn: &Connection) -> Result<Vec<RelationRow>> {
    let mut stmt = conn.prepare(
        "SELECT paper_a, paper_b, shared_keywords, strength
         FROM paper_relations
         ORDER BY strength DESC, paper_a, paper_b",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RelationRow {
                paper_a: row.get(0)?,
                paper_b: row.get(1)?,
                shared_keywords: row.get::<_, i64>(2)? as usize,
                strength: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub papers: usize,
    pub stubs: usize,
    pub authors: usize,
    pub keywords: usize,
    pub summaries: usize,
    pub themes: usize,
    pub effects: usize,
    pub comparisons: usize,
    pub citations: usize,
    pub relations: usize,
    pub by_year: Vec<(i32, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |table: &str| -> Result<usize> {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
    };
    let stubs: usize = conn.query_row(
        "SELECT COUNT(*) FROM papers WHERE is_stub = 1",
        [],
        |r| r.get(0),
    )?;
    let mut stmt = conn.prepare(
        "SELECT year, COUNT(*) FROM papers WHERE year IS NOT NULL GROUP BY year ORDER BY year DESC",
    )?;
    let by_year = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stats {
        papers: count("papers")?,
        stubs,
        authors: count("authors")?,
        keywords: count("keywords")?,
        summaries: count("summaries")?,
        themes: count("themes")?,
        effects: count("effects")?,
        comparisons: count("comparisons")?,
        citations: count("citations")?,
        relations: count("paper_relations")?,
        by_year,
    })
}

// ── Tests ──

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn record(title: &str, doi: Option<&str>, year: Option<i32>) -> PaperRecord {
        PaperRecord {
            title: title.into(),
            doi: doi.map(String::from),
            year,
            pdf_url: format!("https://example.org/{}", title.replace(' ', "-")),
            ..Default::default()
        }
    }

    #[test]
    fn upsert_by_doi_is_idempotent() {
        let conn = memory_db();
        let mut p = record("Bone loss", Some("10.1/bone"), Some(2014));
        let first = upsert_paper(&conn, &p).unwrap();
        assert!(first.inserted);

        p.abstract_text = Some("Now with abstract".into());
        let second = upsert_paper(&conn, &p).unwrap();
        assert_eq!(second, Upserted { id: first.id, inserted: false });

        let row = fetch_paper(&conn, first.id).unwrap().unwrap();
        assert_eq!(row.abstract_text.as_deref(), Some("Now with abstract"));
        assert_eq!(get_stats(&conn).unwrap().papers, 1);
    }

    #[test]
    fn upsert_without_doi_uses_title_and_year() {
        let conn = memory_db();
        let a = upsert_paper(&conn, &record("Plant roots", None, Some(2010))).unwrap();
        let b = upsert_paper(&conn, &record("Plant roots", None, Some(2010))).unwrap();
        let c = upsert_paper(&conn, &record("Plant roots", None, None)).unwrap();
        let d = upsert_paper(&conn, &record("Plant roots", None, None)).unwrap();
        assert_eq!(a.id, b.id);
        assert!(!b.inserted);
        assert_ne!(a.id, c.id);
        assert_eq!(c.id, d.id);
    }

    #[test]
    fn real_record_replaces_stub_for_same_url() {
        let conn = memory_db();
        let url = "https://example.org/bone";
        let stub = PaperRecord {
            title: "Bone (from csv)".into(),
            pdf_url: url.into(),
            stub: true,
            ..Default::default()
        };
        let first = upsert_paper(&conn, &stub).unwrap();
        assert!(!paper_extracted_from(&conn, url).unwrap());
        assert_eq!(get_stats(&conn).unwrap().stubs, 1);

        let real = PaperRecord {
            title: "Bone loss in spaceflight".into(),
            doi: Some("10.1/bone".into()),
            methods_section: Some("Mice flew.".into()),
            pdf_url: url.into(),
            ..Default::default()
        };
        let second = upsert_paper(&conn, &real).unwrap();
        assert_eq!(second, Upserted { id: first.id, inserted: false });

        let row = fetch_paper(&conn, first.id).unwrap().unwrap();
        assert_eq!(row.title, "Bone loss in spaceflight");
        assert_eq!(row.doi.as_deref(), Some("10.1/bone"));
        assert_eq!(row.methods_section.as_deref(), Some("Mice flew."));
        assert!(paper_extracted_from(&conn, url).unwrap());
        let stats = get_stats(&conn).unwrap();
        assert_eq!((stats.papers, stats.stubs), (1, 0));
    }

    #[test]
    fn refresh_keeps_existing_abstract_when_new_is_missing() {
        let conn = memory_db();
        let mut p = record("Immune", Some("10.1/imm"), None);
        p.abstract_text = Some("kept".into());
        let id = upsert_paper(&conn, &p).unwrap().id;
        p.abstract_text = None;
        upsert_paper(&conn, &p).unwrap();
        let row = fetch_paper(&conn, id).unwrap().unwrap();
        assert_eq!(row.abstract_text.as_deref(), Some("kept"));
    }

    #[test]
    fn save_paper_links_authors_and_captions() {
        let conn = memory_db();
        let mut p = record("Microbes", Some("10.1/mic"), Some(2019));
        p.authors = vec!["Anna-Lisa Paul".into(), "Ferl".into()];
        p.figures = vec!["Figure 1. Growth".into()];
        p.tables = vec!["Table 1. Strains".into()];
        let up = save_paper(&conn, &p).unwrap();
        save_paper(&conn, &p).unwrap();

        let authors: Vec<(String, String, i64)> = conn
            .prepare(
                "SELECT a.first_name, a.last_name, pa.position
                 FROM paper_authors pa JOIN authors a ON a.id = pa.author_id
                 WHERE pa.paper_id = ?1 ORDER BY pa.position",
            )
            .unwrap()
            .query_map([up.id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            authors,
            vec![
                ("Anna-Lisa".to_string(), "Paul".to_string(), 0),
                ("Ferl".to_string(), String::new(), 1)
            ]
        );
        let resources: usize = conn
            .query_row("SELECT COUNT(*) FROM paper_resources", [], |r| r.get(0))
            .unwrap();
        assert_eq!(resources, 2);
        assert!(paper_extracted_from(&conn, &p.pdf_url).unwrap());
        assert!(!paper_extracted_from(&conn, "https://example.org/other").unwrap());
    }

    #[test]
    fn summaries_keywords_and_grouping() {
        let conn = memory_db();
        let a = upsert_paper(&conn, &record("A", Some("10.1/a"), None)).unwrap().id;
        let b = upsert_paper(&conn, &record("B", Some("10.1/b"), None)).unwrap().id;
        for (id, words) in [(a, vec!["bone", "microgravity"]), (b, vec!["microgravity"])] {
            let kws: Vec<KeywordRow> = words
                .into_iter()
                .map(|w| KeywordRow {
                    word: w.into(),
                    relevance: 1.0,
                })
                .collect();
            let s = SummaryRow {
                paper_id: id,
                summary_abstract: Some("abs".into()),
                summary_results: None,
                summary_conclusions: None,
                key_findings: vec![],
            };
            save_summary(&conn, &s, &kws).unwrap();
        }
        let grouped = fetch_paper_keywords(&conn).unwrap();
        assert_eq!(
            grouped,
            vec![
                (a, vec!["bone".to_string(), "microgravity".to_string()]),
                (b, vec!["microgravity".to_string()])
            ]
        );
        assert_eq!(get_stats(&conn).unwrap().keywords, 2);
        assert_eq!(fetch_summaries_without_effects(&conn).unwrap().len(), 2);
        assert_eq!(fetch_unthemed(&conn).unwrap().len(), 2);
    }

    #[test]
    fn pmc_candidates() {
        let conn = memory_db();
        upsert_paper(&conn, &record("x", Some("PMC:PMC12"), None)).unwrap();
        let mut other = record("y", Some("10.1/y"), None);
        other.pdf_url = "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC5/".into();
        upsert_paper(&conn, &other).unwrap();
        upsert_paper(&conn, &record("z", Some("10.1/z"), None)).unwrap();
        assert_eq!(fetch_pmc_papers(&conn, None).unwrap().len(), 2);
        assert_eq!(fetch_pmc_papers(&conn, Some(1)).unwrap().len(), 1);
    }
}
