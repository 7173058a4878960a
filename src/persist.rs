//! Persistence boundary for finished summaries

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use log::{debug, info};

/// What the pipeline hands to storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord
{   pub consultation_date: NaiveDate
  , pub original_text: String
  , pub summary_text: String
  , pub template_id: Option<i64>
  , pub metadata: crate::request::SummaryMetadata
}

/// Storage for finished summaries, owned outside the core
pub trait SummarySink: Send + Sync
{   /// Store a record and return its id
    fn save(&self, record: SummaryRecord)
      -> Result<i64, crate::error::Error>;
}

/// Sink that keeps records in memory, for tests and local runs
#[derive(Debug, Default)]
pub struct InMemorySummarySink
{   records: Mutex<Vec<(i64, SummaryRecord)>>
}

impl InMemorySummarySink
{   pub fn new() -> Self
    {   InMemorySummarySink::default()
    }

    pub fn records(&self) -> Vec<(i64, SummaryRecord)>
    {   self.records
          .lock()
          .map(|r| r.clone())
          .unwrap_or_default()
    }

    pub fn len(&self) -> usize
    {   self.records
          .lock()
          .map(|r| r.len())
          .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool
    {   self.len() == 0
    }
}

impl SummarySink for InMemorySummarySink
{   fn save(&self, record: SummaryRecord)
      -> Result<i64, crate::error::Error>
    {   let mut records = self.records
          .lock()
          .map_err(|_| {
            crate::error::Error::Other(
              "Summary sink lock poisoned".to_string()
            )
          })?;
        let id = records.len() as i64 + 1;
        debug!(
          "Storing summary {} ({} chars)",
          id, record.summary_text.chars().count()
        );
        records.push((id, record));
        info!("Summary saved: id {}", id);
        Ok(id)
    }
}
