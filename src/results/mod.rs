//! View-ready results: pagination, sort order and display-only price variants.
//!
//! The fetched rows are never mutated; [`ResultsView`] keeps an index order and
//! a page cursor on top of them.

pub mod pagination;
pub mod sorting;
pub mod variants;

pub use pagination::{page_size_for_height, Pager};
pub use sorting::{Direction, SortField, SortedView};

use crate::model::{ResultRow, SessionReport};
use rand::Rng;

/// A result row as shown on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRow<'a> {
    pub row: &'a ResultRow,
    /// Randomised price for display; `None` when the price is not numeric.
    pub variant: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ResultsView {
    rows: Vec<ResultRow>,
    order: SortedView,
    pager: Pager,
    margin_of_sales: Option<f64>,
    expected_margin: Option<f64>,
}

impl ResultsView {
    pub fn new(rows: Vec<ResultRow>, page_size: usize) -> Self {
        Self {
            order: SortedView::new(rows.len()),
            pager: Pager::new(rows.len(), page_size),
            rows,
            margin_of_sales: None,
            expected_margin: None,
        }
    }

    pub fn from_report(report: &SessionReport, page_size: usize) -> Self {
        Self {
            margin_of_sales: report.margin_of_sales,
            expected_margin: report.expected_margin,
            ..Self::new(report.rows.clone(), page_size)
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    pub fn pager_mut(&mut self) -> &mut Pager {
        &mut self.pager
    }

    pub fn sort(&self) -> Option<(SortField, Direction)> {
        self.order.sort()
    }

    /// Sort by `field` (toggling direction on repeat) and go back to page 1.
    pub fn sort_by(&mut self, field: SortField) {
        self.order.toggle(field, &self.rows);
        self.pager.reset();
    }

    /// Rows on the current page, in display order.
    pub fn visible(&self) -> Vec<&ResultRow> {
        let range = self.pager.range();
        self.order
            .rows(&self.rows)
            .skip(range.start)
            .take(range.len())
            .collect()
    }

    /// Current page with a freshly drawn price variant per row.
    pub fn visible_with_variants<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<DisplayRow<'_>> {
        self.visible()
            .into_iter()
            .map(|row| DisplayRow {
                row,
                variant: variants::variant_for_price(&row.price, &mut *rng),
            })
            .collect()
    }

    /// Margin of sales as reported by the external computation.
    pub fn margin_total(&self) -> Option<f64> {
        self.margin_of_sales
    }

    pub fn expected_margin(&self) -> Option<f64> {
        self.expected_margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<ResultRow> {
        (0..n)
            .map(|i| ResultRow {
                product: (i + 1).to_string(),
                price: format!("{};{}", 100 - i, 90 - i),
                cluster: (i % 3 + 1).to_string(),
            })
            .collect()
    }

    #[test]
    fn visible_follows_sort_and_page() {
        let mut view = ResultsView::new(rows(25), 10);
        view.pager_mut().jump(3);
        assert_eq!(view.visible().len(), 5);

        view.sort_by(SortField::Price);
        assert_eq!(view.pager().page(), 1);
        let first: Vec<&str> = view.visible().iter().map(|r| r.product.as_str()).collect();
        // Prices descend with the product number, so ascending price starts at the last product.
        assert_eq!(first[0], "25");
        assert_eq!(first.len(), 10);
    }

    #[test]
    fn variants_are_attached_per_row() {
        let view = ResultsView::new(rows(3), 10);
        let mut rng = rand::thread_rng();
        let shown = view.visible_with_variants(&mut rng);
        assert_eq!(shown.len(), 3);
        for d in shown {
            let base = sorting::price_key(&d.row.price).unwrap();
            let v = d.variant.unwrap();
            assert!((v - base).abs() <= base * variants::VARIANT_SPREAD + 1e-9);
        }
    }

    #[test]
    fn margin_comes_from_the_report() {
        let report = SessionReport {
            generated_utc: String::new(),
            project_name: "demo".into(),
            clustering_method: None,
            solver_type: None,
            project_path: "/p".into(),
            results_file: "/p/solutions.csv".into(),
            metrics: None,
            cluster_count: Some(3),
            rows: rows(4),
            margin_of_sales: Some(1534.25),
            expected_margin: None,
        };
        let view = ResultsView::from_report(&report, 10);
        assert_eq!(view.margin_total(), Some(1534.25));
        assert_eq!(view.len(), 4);
    }
}
