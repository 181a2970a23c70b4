//! Stock overlap across a selection of indices.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::error::IndexwatchError;
use crate::ports::store_port::IndexStore;

/// A stock counts as high-overlap when it appears in at least
/// `HIGH_OVERLAP_NUMERATOR / HIGH_OVERLAP_DENOMINATOR` of the selected indices.
const HIGH_OVERLAP_NUMERATOR: usize = 7;
const HIGH_OVERLAP_DENOMINATOR: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockOverlap {
    pub stock: String,
    pub appears_in: usize,
    /// Display names of the indices holding the stock, in processing order.
    pub indices: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlapSummary {
    pub total_unique_stocks: usize,
    pub avg_overlap: f64,
    pub high_overlap_stocks: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlapAnalysis {
    pub analysis_of: Vec<String>,
    pub commonality: Vec<StockOverlap>,
    pub summary: OverlapSummary,
}

/// One selected index: its display name and its tickers.
#[derive(Debug, Clone)]
pub struct SelectedIndex {
    pub display_name: String,
    pub tickers: Vec<String>,
}

/// Analyse the indices with the given ids. Ids are processed in ascending
/// order, duplicates once; unknown ids are ignored.
pub fn analyze_overlap(
    store: &dyn IndexStore,
    index_ids: &[i64],
) -> Result<OverlapAnalysis, IndexwatchError> {
    if index_ids.is_empty() {
        return Err(IndexwatchError::validation(
            "at least one index id is required",
        ));
    }

    let mut ids = index_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let mut selection = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(index) = store.get_index(id)? {
            selection.push(SelectedIndex {
                tickers: store.index_tickers(index.id)?,
                display_name: index.display_name,
            });
        }
    }

    Ok(compute_overlap(&selection))
}

pub fn compute_overlap(selection: &[SelectedIndex]) -> OverlapAnalysis {
    if selection.is_empty() {
        return OverlapAnalysis::default();
    }

    let mut rows: Vec<StockOverlap> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for index in selection {
        for ticker in &index.tickers {
            let slot = *slots.entry(ticker.as_str()).or_insert_with(|| {
                rows.push(StockOverlap {
                    stock: ticker.clone(),
                    appears_in: 0,
                    indices: Vec::new(),
                });
                rows.len() - 1
            });
            rows[slot].appears_in += 1;
            rows[slot].indices.push(index.display_name.clone());
        }
    }

    // Stable: ties keep first-seen order.
    rows.sort_by(|a, b| b.appears_in.cmp(&a.appears_in));

    let selected = selection.len();
    let total_unique_stocks = rows.len();
    let summary = if total_unique_stocks == 0 {
        OverlapSummary::default()
    } else {
        let total_appearances: usize = rows.iter().map(|r| r.appears_in).sum();
        let avg = total_appearances as f64 / total_unique_stocks as f64;
        OverlapSummary {
            total_unique_stocks,
            avg_overlap: (avg * 10.0).round_ties_even() / 10.0,
            high_overlap_stocks: rows
                .iter()
                .filter(|r| {
                    r.appears_in * HIGH_OVERLAP_DENOMINATOR >= selected * HIGH_OVERLAP_NUMERATOR
                })
                .count(),
        }
    };

    OverlapAnalysis {
        analysis_of: selection.iter().map(|s| s.display_name.clone()).collect(),
        commonality: rows,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_adapter::MemoryStore;
    use crate::domain::constituents::{IndexUpload, MatchPolicy, load_constituents};
    use approx::assert_relative_eq;

    fn selected(name: &str, tickers: &[&str]) -> SelectedIndex {
        SelectedIndex {
            display_name: name.to_string(),
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn counts_and_lists_appearances() {
        let analysis = compute_overlap(&[
            selected("Bank", &["HDFCBANK", "ICICIBANK", "SBIN"]),
            selected("Nifty 50", &["TCS", "HDFCBANK", "ICICIBANK"]),
            selected("Private Bank", &["HDFCBANK", "KOTAKBANK"]),
        ]);

        assert_eq!(analysis.analysis_of, vec!["Bank", "Nifty 50", "Private Bank"]);
        let first = &analysis.commonality[0];
        assert_eq!(first.stock, "HDFCBANK");
        assert_eq!(first.appears_in, 3);
        assert_eq!(first.indices, vec!["Bank", "Nifty 50", "Private Bank"]);
        assert_eq!(analysis.commonality[1].stock, "ICICIBANK");
        assert_eq!(analysis.commonality[1].appears_in, 2);

        assert_eq!(analysis.summary.total_unique_stocks, 5);
        // (3 + 2 + 1 + 1 + 1) / 5 = 1.6
        assert_relative_eq!(analysis.summary.avg_overlap, 1.6);
        // threshold 2.1 of 3 indices: only HDFCBANK
        assert_eq!(analysis.summary.high_overlap_stocks, 1);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let analysis = compute_overlap(&[
            selected("A", &["ZED", "ALPHA", "MID"]),
            selected("B", &["MID", "ALPHA", "ZED"]),
        ]);
        let order: Vec<&str> = analysis
            .commonality
            .iter()
            .map(|r| r.stock.as_str())
            .collect();
        assert_eq!(order, vec!["ZED", "ALPHA", "MID"]);
    }

    #[test]
    fn disjoint_indices_average_one() {
        let analysis = compute_overlap(&[
            selected("A", &["AAA", "BBB"]),
            selected("B", &["CCC"]),
        ]);
        assert!(analysis.commonality.iter().all(|r| r.appears_in == 1));
        assert_relative_eq!(analysis.summary.avg_overlap, 1.0);
        // 1 of 2 is below 70%
        assert_eq!(analysis.summary.high_overlap_stocks, 0);
    }

    #[test]
    fn average_rounds_half_to_even() {
        // 5 appearances over 4 stocks is 1.25
        let analysis = compute_overlap(&[
            selected("A", &["W", "X", "Y", "Z"]),
            selected("B", &["W"]),
        ]);
        assert_relative_eq!(analysis.summary.avg_overlap, 1.2);

        // 9 appearances over 4 stocks is 2.25
        let analysis = compute_overlap(&[
            selected("A", &["W", "X", "Y", "Z"]),
            selected("B", &["W", "X", "Y", "Z"]),
            selected("C", &["W"]),
        ]);
        assert_relative_eq!(analysis.summary.avg_overlap, 2.2);
    }

    #[test]
    fn single_index_makes_every_stock_high_overlap() {
        let analysis = compute_overlap(&[selected("A", &["AAA", "BBB"])]);
        assert_eq!(analysis.summary.high_overlap_stocks, 2);
    }

    #[test]
    fn threshold_is_inclusive() {
        // 7 of 10 is exactly 70%.
        let mut selection: Vec<SelectedIndex> = (0..7)
            .map(|i| selected(&format!("I{}", i), &["COMMON"]))
            .collect();
        selection.extend((7..10).map(|i| selected(&format!("I{}", i), &["OTHER"])));
        let analysis = compute_overlap(&selection);
        assert_eq!(analysis.summary.high_overlap_stocks, 1);
    }

    #[test]
    fn indices_without_stocks_give_zero_summary() {
        let analysis = compute_overlap(&[selected("Empty", &[])]);
        assert_eq!(analysis.analysis_of, vec!["Empty"]);
        assert!(analysis.commonality.is_empty());
        assert_eq!(analysis.summary, OverlapSummary::default());
    }

    #[test]
    fn duplicate_edges_count_twice() {
        let analysis = compute_overlap(&[selected("A", &["HDFCBANK", "HDFCBANK"])]);
        assert_eq!(analysis.commonality[0].appears_in, 2);
        assert_eq!(analysis.commonality[0].indices, vec!["A", "A"]);
    }

    #[test]
    fn empty_id_list_is_rejected() {
        let store = MemoryStore::new();
        let err = analyze_overlap(&store, &[]).unwrap_err();
        assert!(matches!(err, IndexwatchError::Validation { .. }));
    }

    #[test]
    fn unknown_ids_return_empty_result() {
        let store = MemoryStore::new();
        let analysis = analyze_overlap(&store, &[41, 42]).unwrap();
        assert_eq!(analysis, OverlapAnalysis::default());
    }

    #[test]
    fn analyze_reads_from_store_in_id_order() {
        let store = MemoryStore::new();
        let it = load_constituents(
            &store,
            &IndexUpload::new("nifty_it.csv", "TCS\nINFY\n"),
            MatchPolicy::AutoCreate,
        )
        .unwrap();
        let fifty = load_constituents(
            &store,
            &IndexUpload::new("nifty_50.csv", "RELIANCE\nTCS\n"),
            MatchPolicy::AutoCreate,
        )
        .unwrap();

        let analysis = analyze_overlap(&store, &[fifty.index_id, it.index_id, 999]).unwrap();
        assert_eq!(analysis.analysis_of, vec!["NIFTY IT", "NIFTY 50"]);
        assert_eq!(analysis.commonality[0].stock, "TCS");
        assert_eq!(analysis.commonality[0].indices, vec!["NIFTY IT", "NIFTY 50"]);
        assert_eq!(analysis.summary.total_unique_stocks, 3);
    }
}
