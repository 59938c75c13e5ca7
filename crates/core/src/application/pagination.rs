// Client-side pagination over a sorted job list
//
// Pages are 1-based. An empty list still has one (empty) page.

/// One page of items plus the numbers needed to render a pager
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
    pub offset: usize,
}

/// Number of pages for `total` items (at least 1)
pub fn total_pages(total: usize, page_size: usize) -> usize {
    let size = page_size.max(1);
    total.div_ceil(size).max(1)
}

/// Clamp a requested page into `1..=total_pages`
pub fn clamp_page(page: usize, total: usize, page_size: usize) -> usize {
    page.clamp(1, total_pages(total, page_size))
}

/// Slice `items` for `page`, clamping out-of-range pages to the last one
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total = items.len();
    let page = clamp_page(page, total, page_size);
    let offset = (page - 1) * page_size;
    let end = (offset + page_size).min(total);

    Page {
        items: items[offset.min(total)..end].to_vec(),
        page,
        page_size,
        total,
        total_pages: total_pages(total, page_size),
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(25, 10), 3);
    }

    #[test]
    fn test_last_page_is_partial() {
        let items: Vec<u32> = (0..25).collect();
        let page = paginate(&items, 3, 10);
        assert_eq!(page.items, vec![20, 21, 22, 23, 24]);
        assert_eq!(page.offset, 20);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn test_out_of_range_page_clamps_to_last() {
        let items: Vec<u32> = (0..15).collect();
        let page = paginate(&items, 3, 10);
        assert_eq!(page.page, 2);
        assert_eq!(page.items, (10..15).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_page_and_empty_list() {
        let empty: Vec<u32> = Vec::new();
        let page = paginate(&empty, 0, 10);
        assert_eq!(page.page, 1);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 1);
    }
}
