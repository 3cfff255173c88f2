//! Aggregated, quality-scored results across sources.

use crate::adapter::{ResultMetadata, SourceQualityScorer};
use crate::error::SearchError;
use crate::types::{ScoredResult, SearchQuery, SourceResult};

use super::Shared;
use super::selection::SearchOptions;
use super::url_normalize::domain_of;

impl Shared {
    pub(crate) async fn aggregated_results(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredResult>, SearchError> {
        let scorer = self
            .scorer()
            .ok_or_else(|| SearchError::Config("no quality scorer configured".into()))?;
        let merged = self.search_sources(query, options).await?;
        score_and_rank(merged.into_flat(), scorer.as_ref())
    }
}

/// Score every result and sort by `score.overall`, highest first.
///
/// Results with equal scores keep their input order. The first scorer
/// error aborts the whole call.
pub fn score_and_rank(
    results: Vec<SourceResult>,
    scorer: &dyn SourceQualityScorer,
) -> Result<Vec<ScoredResult>, SearchError> {
    let mut scored = results
        .into_iter()
        .map(|result| {
            let domain = domain_of(&result.url);
            let metadata = ResultMetadata {
                url: result.url.clone(),
                domain: domain.clone(),
                title: result.title.clone(),
                author: result.author.clone(),
                published_date: result.published_date,
            };
            let score = scorer.score_source(&metadata)?;
            Ok(ScoredResult {
                result,
                domain,
                score,
            })
        })
        .collect::<Result<Vec<_>, SearchError>>()?;

    scored.sort_by(|a, b| {
        b.score
            .overall
            .partial_cmp(&a.score.overall)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(scored)
}
