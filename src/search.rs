use crate::error::ExtractResult;
use crate::source::PageTextSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub page: usize,
    pub line: String,
}

/// Every line, across all pages, that contains `phrase` verbatim.
pub fn search_pages(source: &dyn PageTextSource, phrase: &str) -> ExtractResult<Vec<SearchHit>> {
    if phrase.is_empty() {
        return Ok(Vec::new());
    }

    let mut hits = Vec::new();
    for page in 0..source.page_count() {
        let text = source.page_text(page)?;
        hits.extend(
            text.lines()
                .filter(|l| l.contains(phrase))
                .map(|l| SearchHit {
                    page,
                    line: l.trim().to_string(),
                }),
        );
    }
    Ok(hits)
}
