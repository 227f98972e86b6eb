use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;

use crate::analysis::AnalyticsRow;
use crate::parser::extract::candidate::CandidateRecord;
use crate::parser::outline::{Section, SharedPagePolicy};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id            INTEGER PRIMARY KEY,
            outline       TEXT NOT NULL,
            pages_dir     TEXT NOT NULL,
            total_pages   INTEGER NOT NULL,
            shared_pages  TEXT NOT NULL CHECK(shared_pages IN ('empty','extend')),
            started_at    TEXT NOT NULL,
            finished_at   TEXT
        );

        CREATE TABLE IF NOT EXISTS sections (
            id            INTEGER PRIMARY KEY,
            run_id        INTEGER NOT NULL REFERENCES runs(id),
            position      INTEGER NOT NULL,
            title         TEXT NOT NULL,
            xpath         TEXT NOT NULL,
            page          INTEGER,
            start_page    INTEGER,
            end_page      INTEGER,
            content_len   INTEGER NOT NULL,
            UNIQUE(run_id, position)
        );
        CREATE INDEX IF NOT EXISTS idx_sections_run ON sections(run_id);

        CREATE TABLE IF NOT EXISTS candidates (
            id               INTEGER PRIMARY KEY,
            run_id           INTEGER NOT NULL REFERENCES runs(id),
            name             TEXT NOT NULL,
            dob              TEXT NOT NULL,
            gender           TEXT NOT NULL,
            category         TEXT NOT NULL,
            total_score      INTEGER NOT NULL,
            rank             TEXT NOT NULL,
            roll_no          TEXT NOT NULL,
            score            INTEGER NOT NULL,
            subject_score    INTEGER NOT NULL,
            experience_score INTEGER NOT NULL,
            xpath            TEXT NOT NULL,
            valid            BOOLEAN NOT NULL,
            quota_subject    TEXT,
            quota_medium     TEXT,
            quota_category   TEXT,
            quota_gender     TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_candidates_run ON candidates(run_id);
        CREATE INDEX IF NOT EXISTS idx_candidates_valid ON candidates(valid);
        CREATE INDEX IF NOT EXISTS idx_candidates_roll ON candidates(roll_no);

        CREATE TABLE IF NOT EXISTS analytics (
            id                 INTEGER PRIMARY KEY,
            run_id             INTEGER NOT NULL REFERENCES runs(id),
            gender             TEXT NOT NULL,
            category           TEXT NOT NULL CHECK(category IN ('GENERAL','OTHERS')),
            quota_subject      TEXT,
            total_count        INTEGER NOT NULL,
            with_experience    INTEGER NOT NULL,
            without_experience INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_analytics_run ON analytics(run_id);
        ",
    )?;
    Ok(())
}

// ── Runs ──

pub fn start_run(
    conn: &Connection,
    outline: &Path,
    pages_dir: &Path,
    total_pages: usize,
    policy: SharedPagePolicy,
) -> Result<i64> {
    let policy = match policy {
        SharedPagePolicy::Empty => "empty",
        SharedPagePolicy::Extend => "extend",
    };
    conn.execute(
        "INSERT INTO runs (outline, pages_dir, total_pages, shared_pages, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            outline.display().to_string(),
            pages_dir.display().to_string(),
            total_pages,
            policy,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_run(conn: &Connection, run_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE runs SET finished_at = ?1 WHERE id = ?2",
        rusqlite::params![Utc::now().to_rfc3339(), run_id],
    )?;
    Ok(())
}

// ── Extraction output ──

pub fn save_sections(conn: &Connection, run_id: i64, sections: &[Section]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO sections
             (run_id, position, title, xpath, page, start_page, end_page, content_len)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for s in sections {
            count += stmt.execute(rusqlite::params![
                run_id,
                s.order,
                s.title,
                s.xpath(),
                s.page,
                s.range.as_ref().map(|r| r.start),
                s.range.as_ref().map(|r| r.end),
                s.content.len(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn save_candidates(conn: &Connection, run_id: i64, records: &[CandidateRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO candidates
             (run_id, name, dob, gender, category, total_score, rank, roll_no, score,
              subject_score, experience_score, xpath, valid,
              quota_subject, quota_medium, quota_category, quota_gender)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
        )?;
        for r in records {
            count += stmt.execute(rusqlite::params![
                run_id, r.name, r.dob, r.gender, r.category, sql_int(r.total_score), r.rank,
                r.roll_no, sql_int(r.score), sql_int(r.subject_score), sql_int(r.experience_score),
                r.xpath, r.valid, r.quota_subject, r.quota_medium, r.quota_category, r.quota_gender,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn save_analytics(conn: &Connection, run_id: i64, rows: &[AnalyticsRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO analytics
             (run_id, gender, category, quota_subject, total_count, with_experience, without_experience)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![
                run_id,
                r.gender,
                r.category,
                r.quota_subject,
                sql_int(r.total_count),
                sql_int(r.with_experience),
                sql_int(r.without_experience),
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// SQLite integers are i64; larger scores are stored clamped.
fn sql_int(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

// ── Audit ──

pub struct InvalidRow {
    pub run_id: i64,
    pub name: String,
    pub roll_no: String,
    pub xpath: String,
    pub total_score: i64,
    pub score: i64,
    pub subject_score: i64,
    pub experience_score: i64,
}

impl InvalidRow {
    /// How far the components are from the printed total.
    pub fn drift(&self) -> i128 {
        i128::from(self.score) + i128::from(self.subject_score) + i128::from(self.experience_score)
            - i128::from(self.total_score)
    }
}

/// Records whose components do not add up, newest run first.
pub fn fetch_invalid(conn: &Connection, limit: Option<usize>) -> Result<Vec<InvalidRow>> {
    let sql = format!(
        "SELECT run_id, name, roll_no, xpath, total_score, score, subject_score, experience_score
         FROM candidates
         WHERE valid = 0
         ORDER BY run_id DESC, id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(InvalidRow {
                run_id: row.get(0)?,
                name: row.get(1)?,
                roll_no: row.get(2)?,
                xpath: row.get(3)?,
                total_score: row.get(4)?,
                score: row.get(5)?,
                subject_score: row.get(6)?,
                experience_score: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub runs: usize,
    pub sections: usize,
    pub empty_sections: usize,
    pub candidates: usize,
    pub invalid: usize,
    pub buckets: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let runs: usize = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    let sections: usize = conn.query_row("SELECT COUNT(*) FROM sections", [], |r| r.get(0))?;
    let empty_sections: usize = conn.query_row(
        "SELECT COUNT(*) FROM sections WHERE content_len = 0",
        [],
        |r| r.get(0),
    )?;
    let candidates: usize = conn.query_row("SELECT COUNT(*) FROM candidates", [], |r| r.get(0))?;
    let invalid: usize =
        conn.query_row("SELECT COUNT(*) FROM candidates WHERE valid = 0", [], |r| r.get(0))?;
    let buckets: usize = conn.query_row("SELECT COUNT(*) FROM analytics", [], |r| r.get(0))?;
    Ok(Stats {
        runs,
        sections,
        empty_sections,
        candidates,
        invalid,
        buckets,
    })
}
