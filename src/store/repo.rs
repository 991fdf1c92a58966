use anyhow::Result;

use crate::domain::email::{ClassifiedEmail, StoredEmail};

pub trait EmailRepository {
    /// True if a row was written, false if the content hash was already stored.
    fn insert_if_new(&self, email: &ClassifiedEmail) -> Result<bool>;
    /// Inserts in one transaction; returns how many were new.
    fn insert_batch(&mut self, emails: &[ClassifiedEmail]) -> Result<usize>;

    fn clear_all(&self) -> Result<usize>;

    /// Urgency rank (high, medium, low, other), then newest received first.
    fn list_all_ordered(&self) -> Result<Vec<StoredEmail>>;
}
