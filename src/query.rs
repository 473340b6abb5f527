//! Search conditions: what to ask OpenAlex for.
//!
//! A conditions file is line-oriented `key,value` text:
//!
//! ```text
//! start_year,2020
//! end_year,2021
//! search_terms,machine learning
//! ```

use crate::error::{HarvestError, Result};
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::{debug, warn};

/// Publication years accepted from a conditions file
const YEAR_RANGE: RangeInclusive<i32> = 1..=9999;

/// Immutable search query for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Text matched against titles and abstracts
    pub search_terms: String,
    /// First publication year (inclusive)
    pub start_year: Option<i32>,
    /// Last publication year (inclusive)
    pub end_year: Option<i32>,
}

impl Query {
    pub fn new(
        search_terms: impl Into<String>,
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> Self {
        Self {
            search_terms: search_terms.into(),
            start_year,
            end_year,
        }
    }

    /// OpenAlex `filter` expression for this query.
    pub fn filter_expression(&self) -> String {
        let mut filters = vec![format!("title_and_abstract.search:{}", self.search_terms)];

        match (self.start_year, self.end_year) {
            (Some(start), Some(end)) => filters.push(format!("publication_year:{}-{}", start, end)),
            (Some(start), None) => {
                filters.push(format!("publication_year:>{}", start.saturating_sub(1)))
            }
            (None, Some(end)) => {
                filters.push(format!("publication_year:<{}", end.saturating_add(1)))
            }
            (None, None) => {}
        }

        filters.join(",")
    }

    /// Read a conditions file from disk.
    pub fn from_conditions_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("Cannot read conditions file {:?}: {}", path, e))
        })?;
        Self::parse_conditions(&content)
    }

    /// Parse `key,value` lines. Unknown keys are ignored.
    pub fn parse_conditions(content: &str) -> Result<Self> {
        let mut search_terms = None;
        let mut start_year = None;
        let mut end_year = None;

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (key, value) = line.split_once(',').ok_or_else(|| {
                HarvestError::Config(format!(
                    "Line {}: expected `key,value`, got {:?}",
                    line_no + 1,
                    line
                ))
            })?;
            let (key, value) = (key.trim(), value.trim());

            match key {
                "start_year" => start_year = Some(parse_year(key, value)?),
                "end_year" => end_year = Some(parse_year(key, value)?),
                "search_terms" => search_terms = Some(value.to_string()),
                other => warn!(key = other, line = line_no + 1, "Ignoring unknown condition"),
            }
        }

        let search_terms = search_terms.filter(|s| !s.is_empty()).ok_or_else(|| {
            HarvestError::Config("Conditions file has no search_terms".to_string())
        })?;

        if let (Some(start), Some(end)) = (start_year, end_year) {
            if start > end {
                return Err(HarvestError::Config(format!(
                    "start_year {} is after end_year {}",
                    start, end
                )));
            }
        }

        let query = Self::new(search_terms, start_year, end_year);
        debug!(?query, "Parsed search conditions");
        Ok(query)
    }
}

fn parse_year(key: &str, value: &str) -> Result<i32> {
    let year: i32 = value
        .parse()
        .map_err(|_| HarvestError::Config(format!("Invalid {}: {:?}", key, value)))?;
    if !YEAR_RANGE.contains(&year) {
        return Err(HarvestError::Config(format!(
            "{} {} is outside {}-{}",
            key,
            year,
            YEAR_RANGE.start(),
            YEAR_RANGE.end()
        )));
    }
    Ok(year)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_filter_with_year_range() {
        let query = Query::new("machine learning", Some(2020), Some(2021));
        assert_eq!(
            query.filter_expression(),
            "title_and_abstract.search:machine learning,publication_year:2020-2021"
        );
    }

    #[test]
    fn test_filter_open_ended_years() {
        assert_eq!(
            Query::new("x", Some(2020), None).filter_expression(),
            "title_and_abstract.search:x,publication_year:>2019"
        );
        assert_eq!(
            Query::new("x", None, Some(2021)).filter_expression(),
            "title_and_abstract.search:x,publication_year:<2022"
        );
        assert_eq!(Query::new("x", None, None).filter_expression(), "title_and_abstract.search:x");
    }

    #[test]
    fn test_parse_conditions() -> Result<()> {
        let query = Query::parse_conditions(
            "start_year,2020\n\nend_year, 2021\nsearch_terms,machine learning\nnotes,ignored\n",
        )?;
        assert_eq!(query, Query::new("machine learning", Some(2020), Some(2021)));
        Ok(())
    }

    #[test]
    fn test_parse_conditions_errors() {
        assert!(matches!(
            Query::parse_conditions("start_year,2020\n"),
            Err(HarvestError::Config(_))
        ));
        assert!(matches!(
            Query::parse_conditions("search_terms,x\nstart_year,soon\n"),
            Err(HarvestError::Config(_))
        ));
        assert!(matches!(
            Query::parse_conditions("search_terms x\n"),
            Err(HarvestError::Config(_))
        ));
        assert!(matches!(
            Query::parse_conditions("search_terms,x\nstart_year,2022\nend_year,2020\n"),
            Err(HarvestError::Config(_))
        ));
    }

    #[test]
    fn test_parse_conditions_rejects_out_of_range_years() {
        for content in [
            "search_terms,x\nend_year,2147483647\n",
            "search_terms,x\nstart_year,-2147483648\n",
            "search_terms,x\nstart_year,0\n",
            "search_terms,x\nend_year,10000\n",
        ] {
            assert!(
                matches!(Query::parse_conditions(content), Err(HarvestError::Config(_))),
                "accepted {:?}",
                content
            );
        }
    }

    #[test]
    fn test_filter_extreme_years_do_not_overflow() {
        assert_eq!(
            Query::new("x", None, Some(i32::MAX)).filter_expression(),
            format!("title_and_abstract.search:x,publication_year:<{}", i32::MAX)
        );
        assert_eq!(
            Query::new("x", Some(i32::MIN), None).filter_expression(),
            format!("title_and_abstract.search:x,publication_year:>{}", i32::MIN)
        );
    }

    #[test]
    fn test_from_conditions_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "search_terms,graph neural networks")?;
        writeln!(file, "start_year,2019")?;

        let query = Query::from_conditions_file(file.path())?;
        assert_eq!(query.search_terms, "graph neural networks");
        assert_eq!(query.start_year, Some(2019));
        assert_eq!(query.end_year, None);
        Ok(())
    }
}
