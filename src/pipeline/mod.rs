use anyhow::{Result, anyhow};
use std::fmt;

use crate::classify::Classifier;
use crate::domain::email::{ClassifiedEmail, EmailRecord};
use crate::mail::imap_client::MailSource;
use crate::store::repo::EmailRepository;

/// What one fetch → classify → store pass did.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub fetched: usize,
    pub stored: usize,
    /// Set when classification failed and nothing was stored.
    pub classify_error: Option<String>,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetched {}, stored {} new", self.fetched, self.stored)?;
        if let Some(e) = &self.classify_error {
            write!(f, " (classification failed: {e})")?;
        }
        Ok(())
    }
}

pub struct Pipeline<S, C> {
    source: S,
    classifier: C,
}

impl<S: MailSource, C: Classifier> Pipeline<S, C> {
    pub fn new(source: S, classifier: C) -> Self {
        Self { source, classifier }
    }

    /// One cycle. Fetch and classification problems degrade to "nothing new";
    /// store errors are returned.
    pub fn run_cycle(&self, repo: &mut dyn EmailRepository, limit: usize) -> Result<CycleReport> {
        let records = self.source.fetch_recent(limit);
        let mut report = CycleReport {
            fetched: records.len(),
            ..CycleReport::default()
        };
        if records.is_empty() {
            return Ok(report);
        }

        let merged = match self.classify_batch(records) {
            Ok(m) => m,
            Err(e) => {
                log::error!("Classification error: {e:#}");
                report.classify_error = Some(format!("{e:#}"));
                return Ok(report);
            }
        };

        report.stored = repo.insert_batch(&merged)?;
        log::info!("Added {} new emails to database", report.stored);
        Ok(report)
    }

    fn classify_batch(&self, records: Vec<EmailRecord>) -> Result<Vec<ClassifiedEmail>> {
        let bodies: Vec<String> = records.iter().map(|r| r.body.clone()).collect();
        let results = self.classifier.classify(&bodies)?;
        if results.len() != records.len() {
            return Err(anyhow!(
                "classifier returned {} results for {} emails",
                results.len(),
                records.len()
            ));
        }
        Ok(records
            .into_iter()
            .zip(results)
            .map(|(rec, res)| ClassifiedEmail::merge(rec, res))
            .collect())
    }
}
