//! Page selection parsing and validation
//!
//! Every operation that consumes a page list or a range list goes through
//! [`resolve_enumerated`] or [`resolve_ranges`], so bounds checks and error
//! wording are the same for split, extract and the HTTP layer.
//!
//! Parsing ([`parse_page_list`], [`parse_range_list`]) only turns text into raw
//! numbers. It never clamps or drops values; that is left to the resolvers.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::PdfToolsError;

/// Upper bound on pages produced by expanding one textual range like "1-5"
const MAX_EXPANDED_PAGES: i64 = 100_000;

/// Inclusive, 1-based page span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    /// Number of pages covered by the range
    pub fn page_count(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Page numbers in the range, ascending
    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

/// Validate an enumerated page selection against a document of `total_pages`.
///
/// Returns the selected pages ascending and without duplicates. Request order
/// is discarded on purpose.
pub fn resolve_enumerated(pages: &[i64], total_pages: u32) -> Result<Vec<u32>, PdfToolsError> {
    if pages.is_empty() {
        return Err(PdfToolsError::InvalidSelection("No pages specified".to_string()));
    }

    let invalid: Vec<i64> = pages
        .iter()
        .copied()
        .filter(|&p| p < 1 || p > i64::from(total_pages))
        .collect();

    if !invalid.is_empty() {
        return Err(PdfToolsError::InvalidSelection(format!(
            "Invalid pages: {:?}. {}",
            invalid,
            bounds_hint(total_pages)
        )));
    }

    let unique: BTreeSet<u32> = pages.iter().map(|&p| p as u32).collect();
    Ok(unique.into_iter().collect())
}

/// Validate a batch of ranges against a document of `total_pages`.
///
/// All ranges are checked before anything is returned. Input order is kept:
/// every range becomes its own output document.
pub fn resolve_ranges(
    ranges: &[(i64, i64)],
    total_pages: u32,
) -> Result<Vec<PageRange>, PdfToolsError> {
    if ranges.is_empty() {
        return Err(PdfToolsError::InvalidSelection("No ranges specified".to_string()));
    }

    let total = i64::from(total_pages);
    if let Some(&(start, end)) = ranges
        .iter()
        .find(|&&(start, end)| start < 1 || end > total || start > end)
    {
        return Err(PdfToolsError::InvalidSelection(format!(
            "Invalid range {}-{}. {}",
            start,
            end,
            bounds_hint(total_pages)
        )));
    }

    Ok(ranges
        .iter()
        .map(|&(start, end)| PageRange {
            start: start as u32,
            end: end as u32,
        })
        .collect())
}

fn bounds_hint(total_pages: u32) -> String {
    if total_pages == 0 {
        "Document has no pages".to_string()
    } else {
        format!("Document has {} pages (1-{})", total_pages, total_pages)
    }
}

/// Parse a page list: a JSON array (`[5, 2, 9]`) or text like `"1-3, 5"`.
///
/// Textual ranges are expanded into individual pages. Duplicates and order
/// are kept as given.
pub fn parse_page_list(input: &str) -> Result<Vec<i64>, PdfToolsError> {
    let input = input.trim();
    if input.starts_with('[') {
        return serde_json::from_str(input)
            .map_err(|e| PdfToolsError::InvalidSelection(format!("Invalid page list: {}", e)));
    }

    let mut pages = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start = parse_number(start)?;
            let end = parse_number(end)?;

            if start > end {
                return Err(PdfToolsError::InvalidSelection(format!(
                    "Invalid range {}-{}: start is after end",
                    start, end
                )));
            }
            if end - start >= MAX_EXPANDED_PAGES {
                return Err(PdfToolsError::InvalidSelection(format!(
                    "Range {}-{} is too large",
                    start, end
                )));
            }

            pages.extend(start..=end);
        } else {
            pages.push(parse_number(part)?);
        }
    }

    Ok(pages)
}

/// Parse a range list: a JSON array of pairs (`[[1, 3], [8, 10]]`) or text
/// like `"1-3, 8-10"`. A lone number `n` is the range `n-n`.
pub fn parse_range_list(input: &str) -> Result<Vec<(i64, i64)>, PdfToolsError> {
    let input = input.trim();
    if input.starts_with('[') {
        return serde_json::from_str(input)
            .map_err(|e| PdfToolsError::InvalidSelection(format!("Invalid range list: {}", e)));
    }

    let mut ranges = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let range = match part.split_once('-') {
            Some((start, end)) => (parse_number(start)?, parse_number(end)?),
            None => {
                let page = parse_number(part)?;
                (page, page)
            }
        };
        ranges.push(range);
    }

    Ok(ranges)
}

fn parse_number(raw: &str) -> Result<i64, PdfToolsError> {
    let raw = raw.trim();
    raw.parse()
        .map_err(|_| PdfToolsError::InvalidSelection(format!("Invalid page number: '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_enumerated_sorts_and_deduplicates() {
        let result = resolve_enumerated(&[5, 2, 5, 9], 10).unwrap();
        assert_eq!(result, vec![2, 5, 9]);
    }

    #[test]
    fn test_enumerated_empty_fails() {
        let err = resolve_enumerated(&[], 10).unwrap_err();
        assert!(matches!(err, PdfToolsError::InvalidSelection(_)));
    }

    #[test]
    fn test_enumerated_lists_every_invalid_page() {
        let err = resolve_enumerated(&[0, 3, 12], 10).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid pages: [0, 12]. Document has 10 pages (1-10)"
        );
    }

    #[test]
    fn test_enumerated_negative_page_fails() {
        assert!(resolve_enumerated(&[-1], 10).is_err());
    }

    #[test]
    fn test_enumerated_against_empty_document() {
        let err = resolve_enumerated(&[1], 0).unwrap_err();
        assert!(err.to_string().contains("no pages"));
    }

    #[test]
    fn test_ranges_keep_input_order() {
        let result = resolve_ranges(&[(8, 10), (1, 3)], 10).unwrap();
        assert_eq!(
            result,
            vec![PageRange { start: 8, end: 10 }, PageRange { start: 1, end: 3 }]
        );
    }

    #[test]
    fn test_ranges_reject_whole_batch_on_one_bad_entry() {
        let err = resolve_ranges(&[(1, 3), (5, 3), (8, 10)], 10).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid range 5-3. Document has 10 pages (1-10)"
        );
    }

    #[test]
    fn test_ranges_out_of_bounds() {
        assert!(resolve_ranges(&[(0, 2)], 10).is_err());
        assert!(resolve_ranges(&[(9, 11)], 10).is_err());
        assert!(resolve_ranges(&[], 10).is_err());
    }

    #[test]
    fn test_range_page_count() {
        let range = PageRange { start: 8, end: 10 };
        assert_eq!(range.page_count(), 3);
        assert_eq!(range.pages().collect::<Vec<_>>(), vec![8, 9, 10]);
    }

    #[test]
    fn test_parse_page_list_json() {
        assert_eq!(parse_page_list("[5, 2, 5, 9]").unwrap(), vec![5, 2, 5, 9]);
    }

    #[test]
    fn test_parse_page_list_text() {
        assert_eq!(
            parse_page_list("1-3, 5, 8-10").unwrap(),
            vec![1, 2, 3, 5, 8, 9, 10]
        );
        assert_eq!(parse_page_list(" 1 - 3 ").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_page_list_keeps_out_of_range_values() {
        // Bounds belong to the resolver, not the parser
        assert_eq!(parse_page_list("0, 40").unwrap(), vec![0, 40]);
    }

    #[test]
    fn test_parse_page_list_rejects_garbage() {
        assert!(parse_page_list("abc").is_err());
        assert!(parse_page_list("5-3").is_err());
        assert!(parse_page_list("[1, \"x\"]").is_err());
        assert!(parse_page_list("1-1000000").is_err());
    }

    #[test]
    fn test_parse_range_list_json_and_text() {
        assert_eq!(
            parse_range_list("[[1,3],[8,10]]").unwrap(),
            vec![(1, 3), (8, 10)]
        );
        assert_eq!(
            parse_range_list("1-3, 8-10, 5").unwrap(),
            vec![(1, 3), (8, 10), (5, 5)]
        );
    }

    #[test]
    fn test_parse_range_list_leaves_reversed_range_to_resolver() {
        let ranges = parse_range_list("5-3").unwrap();
        assert_eq!(ranges, vec![(5, 3)]);
        assert!(resolve_ranges(&ranges, 10).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn selection_within_bounds() -> impl Strategy<Value = (u32, Vec<i64>)> {
        (1u32..200).prop_flat_map(|total| {
            (
                Just(total),
                prop::collection::vec(1..=i64::from(total), 1..40),
            )
        })
    }

    proptest! {
        /// Property: result is strictly ascending and holds exactly the distinct input values
        #[test]
        fn enumerated_is_sorted_set((total, pages) in selection_within_bounds()) {
            let result = resolve_enumerated(&pages, total).unwrap();
            prop_assert!(result.windows(2).all(|w| w[0] < w[1]));

            let expected: BTreeSet<u32> = pages.iter().map(|&p| p as u32).collect();
            prop_assert_eq!(result, expected.into_iter().collect::<Vec<_>>());
        }

        /// Property: any page outside [1, total] fails the whole selection
        #[test]
        fn out_of_bounds_page_fails(
            (total, mut pages) in selection_within_bounds(),
            bad in prop_oneof![-50i64..1, 201i64..400],
        ) {
            pages.push(bad);
            let result = resolve_enumerated(&pages, total);
            prop_assert!(matches!(result, Err(PdfToolsError::InvalidSelection(_))));
        }

        /// Property: valid ranges come back unchanged and in order
        #[test]
        fn valid_ranges_preserve_order(
            total in 1u32..100,
            raw in prop::collection::vec((1u32..100, 1u32..100), 1..10),
        ) {
            let ranges: Vec<(i64, i64)> = raw
                .into_iter()
                .map(|(a, b)| {
                    let (lo, hi) = (a.min(b).min(total), a.max(b).min(total));
                    (i64::from(lo), i64::from(hi))
                })
                .collect();

            let result = resolve_ranges(&ranges, total).unwrap();
            let back: Vec<(i64, i64)> = result
                .iter()
                .map(|r| (i64::from(r.start), i64::from(r.end)))
                .collect();
            prop_assert_eq!(back, ranges);
        }

        /// Property: formatting a resolved selection as text parses back to the same pages
        #[test]
        fn text_round_trip_is_stable((total, pages) in selection_within_bounds()) {
            let resolved = resolve_enumerated(&pages, total).unwrap();
            let text = resolved
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let reparsed = parse_page_list(&text).unwrap();
            prop_assert_eq!(resolve_enumerated(&reparsed, total).unwrap(), resolved);
        }
    }
}
