use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::record::AgencyRecord;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS agencies (
            site         TEXT PRIMARY KEY,
            inn          TEXT,
            ogrn         TEXT,
            name         TEXT,
            full_name    TEXT,
            region       TEXT,
            address      TEXT,
            contacts     TEXT,
            email        TEXT,
            revenue_year TEXT,
            revenue      TEXT,
            segment_tag  TEXT,
            source       TEXT,
            doc_url      TEXT,
            doc_type     TEXT CHECK(doc_type IN ('', 'homepage', 'pdf')),
            updated_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_agencies_inn ON agencies(inn);
        CREATE INDEX IF NOT EXISTS idx_agencies_region ON agencies(region);
        ",
    )?;
    Ok(())
}

/// Insert or refresh one row per record, keyed on `site`. Rows without a site are skipped.
pub fn upsert_agencies(conn: &Connection, records: &[AgencyRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO agencies (site, inn, ogrn, name, full_name, region, address, contacts,
                                   email, revenue_year, revenue, segment_tag, source, doc_url, doc_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(site) DO UPDATE SET
                inn = excluded.inn,
                ogrn = excluded.ogrn,
                name = excluded.name,
                full_name = excluded.full_name,
                region = excluded.region,
                address = excluded.address,
                contacts = excluded.contacts,
                email = excluded.email,
                revenue_year = excluded.revenue_year,
                revenue = excluded.revenue,
                segment_tag = excluded.segment_tag,
                source = excluded.source,
                doc_url = excluded.doc_url,
                doc_type = excluded.doc_type,
                updated_at = datetime('now')",
        )?;
        for r in records {
            let site = r.site.trim();
            if site.is_empty() {
                continue;
            }
            count += stmt.execute(rusqlite::params![
                site,
                r.inn,
                r.ogrn,
                r.name,
                r.full_name,
                r.region,
                r.address,
                r.contacts,
                r.email,
                r.revenue_year,
                r.revenue,
                r.segment_tag,
                r.source,
                r.doc_url,
                r.doc_type,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn count_agencies(conn: &Connection) -> Result<usize> {
    let n: usize = conn.query_row("SELECT COUNT(*) FROM agencies", [], |r| r.get(0))?;
    Ok(n)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(site: &str, inn: &str) -> AgencyRecord {
        AgencyRecord {
            site: site.into(),
            inn: inn.into(),
            ..Default::default()
        }
    }

    #[test]
    fn upsert_is_keyed_on_site() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(&dir.path().join("db/agencies.sqlite")).unwrap();
        init_schema(&conn).unwrap();

        let written = upsert_agencies(
            &conn,
            &[rec("http://a.ru/", ""), rec("http://b.ru/", "1"), rec(" ", "2")],
        )
        .unwrap();
        assert_eq!(written, 2);

        let updated = AgencyRecord {
            doc_type: "pdf".into(),
            ..rec("http://a.ru/", "1234567890")
        };
        upsert_agencies(&conn, &[updated]).unwrap();
        assert_eq!(count_agencies(&conn).unwrap(), 2);

        let (inn, doc_type): (String, String) = conn
            .query_row(
                "SELECT inn, doc_type FROM agencies WHERE site = 'http://a.ru/'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(inn, "1234567890");
        assert_eq!(doc_type, "pdf");
    }

    #[test]
    fn unknown_doc_type_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let bad = AgencyRecord {
            doc_type: "docx".into(),
            ..rec("http://a.ru/", "")
        };
        assert!(upsert_agencies(&conn, &[bad]).is_err());
    }
}
