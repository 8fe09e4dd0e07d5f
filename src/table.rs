use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::record::{AgencyRecord, Field};

/// A CSV row type with a fixed column order.
pub trait Row: Serialize + DeserializeOwned {
    const COLUMNS: &'static [&'static str];
}

/// Read every row of a CSV table. Unknown columns are ignored, missing ones default to "".
pub fn load<T: Row>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open table {:?}", path))?;

    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("Failed to parse table {:?}", path))?;
    debug!("Loaded {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

/// Overwrite `path` with `rows`: header first, columns in `T::COLUMNS` order.
///
/// Written to a sibling temp file and renamed over the target, so a crash
/// mid-write leaves the previous checkpoint intact.
pub fn save<T: Row>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let tmp = temp_path(path);
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)
            .with_context(|| format!("Failed to create {:?}", tmp))?;
        writer.write_record(T::COLUMNS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }

    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Resume merge of a previous output with fresh input, aligned by position.
///
/// Per column the first non-empty value wins, previous output first. The
/// result is as long as the longer of the two tables.
pub fn combine_prefer_existing(
    existing: Vec<AgencyRecord>,
    fresh: Vec<AgencyRecord>,
) -> Vec<AgencyRecord> {
    let len = existing.len().max(fresh.len());
    let mut existing = existing.into_iter();
    let mut fresh = fresh.into_iter();

    (0..len)
        .map(|_| match (existing.next(), fresh.next()) {
            (Some(mut kept), Some(new)) => {
                for field in Field::ALL {
                    if !kept.is_filled(field) && new.is_filled(field) {
                        *kept.get_mut(field) = new.get(field).to_string();
                    }
                }
                kept
            }
            (Some(kept), None) => kept,
            (None, Some(new)) => new,
            (None, None) => AgencyRecord::default(),
        })
        .collect()
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
    fn save_then_load_keeps_order_and_empties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        let rows = vec![
            AgencyRecord {
                full_name: r#"ООО "Ромашка""#.into(),
                contacts: "+7 (495) 123-45-67; 8 800 555 35 35".into(),
                ..rec("http://a.ru/", "1234567890")
            },
            rec("http://b.ru/", ""),
        ];

        save(&path, &rows).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), AgencyRecord::COLUMNS.join(","));
        assert_eq!(lines.nth(1).unwrap(), ",,,,http://b.ru/,,,,,,,,,,");

        let loaded: Vec<AgencyRecord> = load(&path).unwrap();
        assert_eq!(loaded, rows);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn empty_table_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        save::<AgencyRecord>(&path, &[]).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap().trim_end(),
            AgencyRecord::COLUMNS.join(",")
        );
        assert!(load::<AgencyRecord>(&path).unwrap().is_empty());
    }

    #[test]
    fn load_ignores_extra_and_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listing.csv");
        fs::write(
            &path,
            "inn,name,rating_ref,site,revenue\n,Ромашка,http://rating/1,http://a.ru,250000000\n",
        )
        .unwrap();

        let loaded: Vec<AgencyRecord> = load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Ромашка");
        assert_eq!(loaded[0].site, "http://a.ru");
        assert_eq!(loaded[0].revenue, "250000000");
        assert_eq!(loaded[0].ogrn, "");
    }

    #[test]
    fn missing_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load::<AgencyRecord>(&dir.path().join("absent.csv")).is_err());
    }

    #[test]
    fn combine_prefers_existing_values() {
        let existing = vec![
            AgencyRecord {
                email: "a@a.ru".into(),
                ..rec("http://a.ru/", "1234567890")
            },
            rec("http://b.ru/", " "),
        ];
        let fresh = vec![
            AgencyRecord {
                name: "А".into(),
                ..rec("http://a-new.ru/", "0000000000")
            },
            rec("http://b.ru/", "1111111111"),
            rec("http://c.ru/", ""),
        ];

        let combined = combine_prefer_existing(existing, fresh);
        assert_eq!(combined.len(), 3);
        assert_eq!(combined[0].site, "http://a.ru/");
        assert_eq!(combined[0].inn, "1234567890");
        assert_eq!(combined[0].name, "А");
        assert_eq!(combined[0].email, "a@a.ru");
        assert_eq!(combined[1].inn, "1111111111");
        assert_eq!(combined[2].site, "http://c.ru/");
    }
}
