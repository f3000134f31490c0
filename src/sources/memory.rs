use async_trait::async_trait;

use crate::collaborators::Source;
use crate::error::CollaboratorError;
use crate::models::PaperRecord;

use super::matches_query;

/// In-memory source over a fixed record list.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<PaperRecord>,
}

impl StaticSource {
    pub fn new(records: Vec<PaperRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl Source for StaticSource {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<PaperRecord>, CollaboratorError> {
        Ok(self
            .records
            .iter()
            .filter(|r| matches_query(r, query))
            .take(max_results)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_limits_results() {
        let source = StaticSource::new(
            (0..5)
                .map(|i| PaperRecord::new(format!("Momentum strategies {i}")))
                .collect(),
        );
        assert_eq!(source.search("momentum", 3).await.expect("search").len(), 3);
        assert!(source.search("carry", 3).await.expect("search").is_empty());
    }
}
