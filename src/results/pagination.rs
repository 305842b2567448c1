use std::ops::Range;

/// Rows `[(k-1)*P, k*P)` of `rows`, or an empty slice when `k` is out of range.
pub fn page<T>(rows: &[T], k: usize, page_size: usize) -> &[T] {
    if k == 0 || page_size == 0 {
        return &[];
    }
    let start = (k - 1).saturating_mul(page_size);
    if start >= rows.len() {
        return &[];
    }
    let end = start.saturating_add(page_size).min(rows.len());
    &rows[start..end]
}

/// Rows per page for the cluster tables given the terminal height.
pub fn page_size_for_height(height: u16) -> usize {
    match height {
        0..=24 => 4,
        25..=44 => 6,
        _ => 10,
    }
}

/// 1-based page cursor over `total` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    total: usize,
    page_size: usize,
    page: usize,
}

impl Pager {
    pub fn new(total: usize, page_size: usize) -> Self {
        Self {
            total,
            page_size: page_size.max(1),
            page: 1,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// `ceil(total / page_size)`; zero for an empty table.
    pub fn page_count(&self) -> usize {
        self.total.div_ceil(self.page_size)
    }

    pub fn range(&self) -> Range<usize> {
        let start = ((self.page - 1) * self.page_size).min(self.total);
        let end = (start + self.page_size).min(self.total);
        start..end
    }

    pub fn slice<'a, T>(&self, rows: &'a [T]) -> &'a [T] {
        page(rows, self.page, self.page_size)
    }

    pub fn next(&mut self) {
        if self.page < self.page_count() {
            self.page += 1;
        }
    }

    pub fn prev(&mut self) {
        if self.page > 1 {
            self.page -= 1;
        }
    }

    /// Jump to page `k`. Out-of-range pages are rejected and the cursor stays put.
    pub fn jump(&mut self, k: usize) -> bool {
        if k < 1 || k > self.page_count() {
            return false;
        }
        self.page = k;
        true
    }

    /// Jump from typed input; anything that is not a page number is ignored.
    pub fn jump_input(&mut self, input: &str) -> bool {
        match input.trim().parse::<usize>() {
            Ok(k) => self.jump(k),
            Err(_) => false,
        }
    }

    pub fn reset(&mut self) {
        self.page = 1;
    }

    #[cfg(test)]
    pub fn set_total(&mut self, total: usize) {
        self.total = total;
        self.page = self.page.clamp(1, self.page_count().max(1));
    }

    /// Change rows per page, keeping the first visible row on screen.
    pub fn set_page_size(&mut self, page_size: usize) {
        let page_size = page_size.max(1);
        if page_size == self.page_size {
            return;
        }
        let first_row = (self.page - 1) * self.page_size;
        self.page_size = page_size;
        self.page = (first_row / page_size + 1).clamp(1, self.page_count().max(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_cover_rows_exactly() {
        for n in [0usize, 1, 9, 10, 11, 37, 100] {
            for p in [1usize, 3, 10, 64] {
                let rows: Vec<usize> = (0..n).collect();
                let pager = Pager::new(n, p);
                let mut joined = Vec::new();
                for k in 1..=pager.page_count() {
                    let chunk = page(&rows, k, p);
                    assert!(chunk.len() <= p);
                    if k < pager.page_count() {
                        assert_eq!(chunk.len(), p, "n={n} p={p} k={k}");
                    }
                    joined.extend_from_slice(chunk);
                }
                assert_eq!(joined, rows, "n={n} p={p}");
            }
        }
    }

    #[test]
    fn out_of_range_jump_is_ignored() {
        let mut pager = Pager::new(25, 10);
        assert!(pager.jump(2));
        assert!(!pager.jump(0));
        assert!(!pager.jump(4));
        assert_eq!(pager.page(), 2);
        assert!(!pager.jump_input("abc"));
        assert!(!pager.jump_input("-1"));
        assert_eq!(pager.page(), 2);
        assert!(pager.jump_input(" 3 "));
        assert_eq!(pager.range(), 20..25);
    }

    #[test]
    fn stepping_clamps_at_the_ends() {
        let mut pager = Pager::new(15, 10);
        pager.prev();
        assert_eq!(pager.page(), 1);
        pager.next();
        pager.next();
        assert_eq!(pager.page(), 2);
    }

    #[test]
    fn empty_table_stays_on_page_one() {
        let mut pager = Pager::new(0, 10);
        assert_eq!(pager.page_count(), 0);
        assert_eq!(pager.range(), 0..0);
        pager.next();
        assert_eq!(pager.page(), 1);
        assert!(!pager.jump(1));
    }

    #[test]
    fn shrinking_total_pulls_page_back() {
        let mut pager = Pager::new(50, 10);
        pager.jump(5);
        pager.set_total(12);
        assert_eq!(pager.page(), 2);
    }

    #[test]
    fn resizing_keeps_first_row_visible() {
        let mut pager = Pager::new(40, 10);
        pager.jump(3);
        pager.set_page_size(4);
        assert!(pager.range().contains(&20));
    }

    #[test]
    fn height_breakpoints() {
        assert_eq!(page_size_for_height(20), 4);
        assert_eq!(page_size_for_height(25), 6);
        assert_eq!(page_size_for_height(44), 6);
        assert_eq!(page_size_for_height(45), 10);
    }
}
