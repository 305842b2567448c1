use crate::model::ResultRow;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortField {
    Product,
    Price,
    Cluster,
}

impl SortField {
    pub fn label(self) -> &'static str {
        match self {
            SortField::Product => "Product",
            SortField::Price => "Price",
            SortField::Cluster => "Cluster",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Sort key of a price cell: the first `;`-separated component, decimal comma
/// accepted. `None` when that component is not a number.
pub fn price_key(price: &str) -> Option<f64> {
    let first = price.split(';').next().unwrap_or_default().trim();
    first
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| !v.is_nan())
}

fn cmp_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Identifiers compare numerically when both parse, numbers before text otherwise.
fn cmp_identifier(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

pub fn compare(field: SortField, a: &ResultRow, b: &ResultRow) -> Ordering {
    match field {
        SortField::Product => cmp_identifier(&a.product, &b.product),
        SortField::Price => cmp_missing_last(price_key(&a.price), price_key(&b.price)),
        SortField::Cluster => cmp_identifier(&a.cluster, &b.cluster),
    }
}

/// Display order over an immutable row sequence.
///
/// Selecting a new field sorts ascending (stable). Selecting the same field
/// again reverses the current order exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedView {
    order: Vec<usize>,
    sort: Option<(SortField, Direction)>,
}

impl SortedView {
    pub fn new(len: usize) -> Self {
        Self {
            order: (0..len).collect(),
            sort: None,
        }
    }

    pub fn sort(&self) -> Option<(SortField, Direction)> {
        self.sort
    }

    #[cfg(test)]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn toggle(&mut self, field: SortField, rows: &[ResultRow]) {
        match self.sort {
            Some((current, direction)) if current == field && self.order.len() == rows.len() => {
                self.order.reverse();
                let flipped = match direction {
                    Direction::Ascending => Direction::Descending,
                    Direction::Descending => Direction::Ascending,
                };
                self.sort = Some((field, flipped));
            }
            _ => {
                let mut order: Vec<usize> = (0..rows.len()).collect();
                order.sort_by(|&a, &b| compare(field, &rows[a], &rows[b]));
                self.order = order;
                self.sort = Some((field, Direction::Ascending));
            }
        }
    }

    pub fn rows<'a>(&'a self, rows: &'a [ResultRow]) -> impl Iterator<Item = &'a ResultRow> + 'a {
        self.order.iter().filter_map(move |&i| rows.get(i))
    }
}
