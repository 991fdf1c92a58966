use anyhow::Result;
use rusqlite::{Connection, Row, params};

use crate::domain::email::{Category, ClassifiedEmail, DATE_FORMAT, StoredEmail, Urgency};
use crate::store::repo::EmailRepository;

const INSERT_SQL: &str = r#"
    INSERT INTO emails (email_hash, subject, sender, body, summary, category, urgency, received_date)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(email_hash) DO NOTHING
"#;

pub struct EmailStore {
    conn: Connection,
}

impl EmailStore {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Safe to call any number of times.
    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS emails (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                email_hash    TEXT UNIQUE,
                subject       TEXT,
                sender        TEXT,
                body          TEXT,
                summary       TEXT,
                category      TEXT,
                urgency       TEXT,
                received_date TEXT,
                created_at    TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;
        Ok(())
    }
}

fn insert_params(
    conn: &Connection,
    e: &ClassifiedEmail,
) -> rusqlite::Result<usize> {
    conn.prepare_cached(INSERT_SQL)?.execute(params![
        e.content_hash,
        e.subject,
        e.sender,
        e.body,
        e.summary,
        e.category.label(),
        e.urgency.as_str(),
        e.received_date.format(DATE_FORMAT).to_string(),
    ])
}

fn row_to_stored(r: &Row) -> rusqlite::Result<StoredEmail> {
    let category: Option<String> = r.get(6)?;
    let urgency: Option<String> = r.get(7)?;
    Ok(StoredEmail {
        id: r.get(0)?,
        content_hash: r.get::<_, Option<String>>(1)?.unwrap_or_default(),
        subject: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
        sender: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
        body: r.get::<_, Option<String>>(4)?.unwrap_or_default(),
        summary: r.get::<_, Option<String>>(5)?.unwrap_or_default(),
        category: Category::from_label(category.as_deref().unwrap_or_default()),
        urgency: Urgency::from(urgency.unwrap_or_default()),
        received_date: r.get::<_, Option<String>>(8)?.unwrap_or_default(),
        created_at: r.get::<_, Option<String>>(9)?.unwrap_or_default(),
    })
}

impl EmailRepository for EmailStore {
    fn insert_if_new(&self, email: &ClassifiedEmail) -> Result<bool> {
        Ok(insert_params(&self.conn, email)? == 1)
    }

    fn insert_batch(&mut self, emails: &[ClassifiedEmail]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut new_rows = 0;
        for e in emails {
            new_rows += insert_params(&tx, e)?;
        }
        tx.commit()?;
        Ok(new_rows)
    }

    fn clear_all(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM emails", [])?)
    }

    fn list_all_ordered(&self) -> Result<Vec<StoredEmail>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, email_hash, subject, sender, body, summary, category, urgency,
                   received_date, created_at
            FROM emails
            ORDER BY CASE urgency
                         WHEN 'high' THEN 1
                         WHEN 'medium' THEN 2
                         WHEN 'low' THEN 3
                         ELSE 4
                     END,
                     datetime(received_date) DESC
            "#,
        )?;

        let rows = stmt.query_map([], row_to_stored)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn email(hash: &str, urgency: &str, received: (u32, u32)) -> ClassifiedEmail {
        let (day, hour) = received;
        ClassifiedEmail {
            content_hash: hash.to_string(),
            subject: format!("subject {hash}"),
            sender: "Sender".to_string(),
            body: "body".to_string(),
            summary: format!("summary {hash}"),
            category: Category::Others,
            urgency: Urgency::from(urgency.to_string()),
            received_date: Local.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap(),
        }
    }

    fn hashes(rows: &[StoredEmail]) -> Vec<&str> {
        rows.iter().map(|r| r.content_hash.as_str()).collect()
    }

    #[test]
    fn duplicate_hash_is_stored_once() {
        let store = EmailStore::open_in_memory().unwrap();
        let e = email("h1", "low", (1, 9));
        assert!(store.insert_if_new(&e).unwrap());
        assert!(!store.insert_if_new(&e).unwrap());
        assert_eq!(store.list_all_ordered().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_keeps_first_classification() {
        let store = EmailStore::open_in_memory().unwrap();
        store.insert_if_new(&email("h1", "low", (1, 9))).unwrap();
        let mut again = email("h1", "high", (1, 9));
        again.summary = "reclassified".to_string();
        assert!(!store.insert_if_new(&again).unwrap());

        let rows = store.list_all_ordered().unwrap();
        assert_eq!(rows[0].urgency, Urgency::Low);
        assert_eq!(rows[0].summary, "summary h1");
    }

    #[test]
    fn batch_counts_only_new_rows() {
        let mut store = EmailStore::open_in_memory().unwrap();
        store.insert_if_new(&email("a", "low", (1, 9))).unwrap();
        let n = store
            .insert_batch(&[email("a", "low", (1, 9)), email("b", "high", (2, 9))])
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn orders_by_urgency_then_newest() {
        let mut store = EmailStore::open_in_memory().unwrap();
        store
            .insert_batch(&[
                email("low", "low", (5, 12)),
                email("high-old", "high", (1, 8)),
                email("odd", "critical", (9, 9)),
                email("medium", "medium", (3, 10)),
                email("high-new", "high", (4, 23)),
            ])
            .unwrap();

        let rows = store.list_all_ordered().unwrap();
        assert_eq!(
            hashes(&rows),
            vec!["high-new", "high-old", "medium", "low", "odd"]
        );
        assert_eq!(rows[4].urgency, Urgency::Other("critical".to_string()));
    }

    #[test]
    fn received_date_uses_plain_local_format() {
        let store = EmailStore::open_in_memory().unwrap();
        store.insert_if_new(&email("h", "low", (7, 14))).unwrap();
        let rows = store.list_all_ordered().unwrap();
        assert_eq!(rows[0].received_date, "2025-03-07 14:00:00");
        assert!(!rows[0].created_at.is_empty());
        assert!(rows[0].id > 0);
    }

    #[test]
    fn clear_removes_everything() {
        let mut store = EmailStore::open_in_memory().unwrap();
        store
            .insert_batch(&[email("a", "low", (1, 9)), email("b", "high", (2, 9))])
            .unwrap();
        assert_eq!(store.clear_all().unwrap(), 2);
        assert!(store.list_all_ordered().unwrap().is_empty());
        // a cleared hash can be stored again
        assert!(store.insert_if_new(&email("a", "low", (1, 9))).unwrap());
    }

    #[test]
    fn schema_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emails.db");
        {
            let store = EmailStore::open(&path).unwrap();
            store.insert_if_new(&email("kept", "medium", (1, 9))).unwrap();
            store.init_schema().unwrap();
        }
        let reopened = EmailStore::open(&path).unwrap();
        assert_eq!(hashes(&reopened.list_all_ordered().unwrap()), vec!["kept"]);
    }
}
