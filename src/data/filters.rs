//! Paging and sorting for list endpoints.

use serde::Serialize;

use crate::validator::Validator;

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Requested page, page size and sort key. A leading `-` on the sort key
/// means descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    pub fn new(sort_safelist: &'static [&'static str]) -> Self {
        Self {
            page: 1,
            page_size: 20,
            sort: "id".to_string(),
            sort_safelist,
        }
    }

    /// Column named by the sort key, without its direction prefix. Only
    /// meaningful once the filters have been validated.
    pub fn sort_column(&self) -> &str {
        self.sort.strip_prefix('-').unwrap_or(&self.sort)
    }

    pub fn descending(&self) -> bool {
        self.sort.starts_with('-')
    }

    pub fn limit(&self) -> usize {
        usize::try_from(self.page_size).unwrap_or(0)
    }

    pub fn offset(&self) -> usize {
        usize::try_from((self.page - 1).saturating_mul(self.page_size)).unwrap_or(0)
    }
}

pub fn validate_filters(v: &mut Validator, filters: &Filters) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(filters.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(filters.page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");
    v.check(
        filters.sort_safelist.contains(&filters.sort.as_str()),
        "sort",
        "invalid sort value",
    );
}

/// Pagination details returned alongside a page of records. Empty when
/// nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 || page_size <= 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

/// Cut one page out of an already sorted result set.
pub fn paginate<T>(rows: Vec<T>, filters: &Filters) -> (Vec<T>, Metadata) {
    let total = i64::try_from(rows.len()).unwrap_or(i64::MAX);
    let metadata = Metadata::calculate(total, filters.page, filters.page_size);
    let page = rows
        .into_iter()
        .skip(filters.offset())
        .take(filters.limit())
        .collect();
    (page, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAFELIST: &[&str] = &["id", "title", "-id", "-title"];

    fn errors_for(filters: &Filters) -> Vec<(String, String)> {
        let mut v = Validator::new();
        validate_filters(&mut v, filters);
        v.errors().iter().map(|(k, m)| (k.clone(), m.clone())).collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let filters = Filters::new(SAFELIST);
        assert_eq!((filters.page, filters.page_size, filters.sort.as_str()), (1, 20, "id"));
        assert!(errors_for(&filters).is_empty());
    }

    #[test]
    fn test_bounds() {
        let mut filters = Filters::new(SAFELIST);
        filters.page = 0;
        filters.page_size = 101;
        filters.sort = "password".into();
        assert_eq!(
            errors_for(&filters),
            vec![
                ("page".to_string(), "must be greater than zero".to_string()),
                ("page_size".to_string(), "must be a maximum of 100".to_string()),
                ("sort".to_string(), "invalid sort value".to_string()),
            ]
        );

        filters.page = MAX_PAGE + 1;
        filters.page_size = 0;
        filters.sort = "-title".into();
        assert_eq!(
            errors_for(&filters),
            vec![
                ("page".to_string(), "must be a maximum of 10 million".to_string()),
                ("page_size".to_string(), "must be greater than zero".to_string()),
            ]
        );
    }

    #[test]
    fn test_sort_direction() {
        let mut filters = Filters::new(SAFELIST);
        assert_eq!(filters.sort_column(), "id");
        assert!(!filters.descending());

        filters.sort = "-title".into();
        assert_eq!(filters.sort_column(), "title");
        assert!(filters.descending());
    }

    #[test]
    fn test_metadata() {
        assert_eq!(Metadata::calculate(0, 1, 20), Metadata::default());
        assert_eq!(
            Metadata::calculate(45, 2, 20),
            Metadata {
                current_page: 2,
                page_size: 20,
                first_page: 1,
                last_page: 3,
                total_records: 45,
            }
        );
        assert_eq!(Metadata::calculate(40, 1, 20).last_page, 2);
        assert_eq!(serde_json::to_value(Metadata::default()).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_paginate() {
        let mut filters = Filters::new(SAFELIST);
        filters.page = 2;
        filters.page_size = 2;

        let (page, metadata) = paginate((1..=5).collect::<Vec<_>>(), &filters);
        assert_eq!(page, vec![3, 4]);
        assert_eq!(metadata.last_page, 3);

        filters.page = 4;
        let (page, metadata) = paginate((1..=5).collect::<Vec<_>>(), &filters);
        assert!(page.is_empty());
        assert_eq!(metadata.current_page, 4);
    }
}
