//! Query support types: sorting, paging, slicing, and field predicates.
//!
//! # Responsibility
//! - Carry sort/page parameters from callers into SQL assembly.
//! - Re-express example-based matching as an explicit tagged predicate
//!   list (field, comparison mode, value) built by the caller.
//!
//! # Invariants
//! - Page numbers are zero-based; page size is at least 1.
//! - `Page::total_pages` is `ceil(total_elements / size)`.
//! - A `Slice` knows whether a next page exists but never the total count.

use crate::model::category::CategoryId;
use crate::model::product::ProductId;
use rusqlite::types::Value;

/// Sortable / filterable product columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductField {
    Id,
    Name,
    Price,
    CategoryId,
    CreatedDate,
    LastModifiedDate,
}

impl ProductField {
    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Price => "price",
            Self::CategoryId => "category_id",
            Self::CreatedDate => "created_date",
            Self::LastModifiedDate => "last_modified_date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One ordering term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub field: ProductField,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field: ProductField) -> Self {
        Self {
            field,
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: ProductField) -> Self {
        Self {
            field,
            direction: Direction::Desc,
        }
    }
}

/// Ordered list of sort terms; empty means "caller accepts default order".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    pub fn by(order: Order) -> Self {
        Self {
            orders: vec![order],
        }
    }

    pub fn and(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Renders `ORDER BY` terms, falling back to `default_order` when no
    /// explicit terms were requested.
    pub(crate) fn order_clause(&self, default_order: &str) -> String {
        if self.orders.is_empty() {
            return format!(" ORDER BY {default_order}");
        }
        let terms: Vec<String> = self
            .orders
            .iter()
            .map(|order| {
                let direction = match order.direction {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                format!("{} {direction}", order.field.column())
            })
            .collect();
        format!(" ORDER BY {}", terms.join(", "))
    }
}

/// Zero-based page coordinates plus requested ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    size: u32,
    sort: Sort,
}

impl PageRequest {
    pub fn of(page: u32, size: u32) -> Self {
        Self::of_sorted(page, size, Sort::default())
    }

    pub fn of_sorted(page: u32, size: u32, sort: Sort) -> Self {
        Self {
            page,
            size: size.max(1),
            sort,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub(crate) fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

/// Bounded result window plus total-count metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    content: Vec<T>,
    number: u32,
    size: u32,
    total_elements: u64,
}

impl<T> Page<T> {
    pub(crate) fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            number: request.page(),
            size: request.size(),
            total_elements,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    /// Zero-based page index.
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u32 {
        self.total_elements.div_ceil(u64::from(self.size)) as u32
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.number) + 1 < u64::from(self.total_pages())
    }
}

/// Bounded result window with only a next-page flag, no total count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice<T> {
    content: Vec<T>,
    number: u32,
    size: u32,
    sort: Sort,
    has_next: bool,
}

impl<T> Slice<T> {
    pub(crate) fn new(content: Vec<T>, request: &PageRequest, has_next: bool) -> Self {
        Self {
            content,
            number: request.page(),
            size: request.size(),
            sort: request.sort().clone(),
            has_next,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    /// Zero-based page index.
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    /// Request for the following page, when one exists.
    pub fn next_page_request(&self) -> Option<PageRequest> {
        if !self.has_next {
            return None;
        }
        Some(PageRequest::of_sorted(
            self.number + 1,
            self.size,
            self.sort.clone(),
        ))
    }
}

/// Comparison mode for one tagged field predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    ExactIgnoreCase,
    IsNull,
}

/// One explicit match term: column, comparison mode, bind value.
///
/// This is the caller-built replacement for reflective example matching:
/// predicates are conjoined with AND by the consuming query.
#[derive(Debug, Clone)]
pub struct FieldPredicate {
    field: ProductField,
    mode: MatchMode,
    value: Value,
}

impl FieldPredicate {
    pub fn new(field: ProductField, mode: MatchMode, value: Value) -> Self {
        Self { field, mode, value }
    }

    pub fn id_equals(id: ProductId) -> Self {
        Self::new(ProductField::Id, MatchMode::Exact, Value::Integer(id))
    }

    pub fn name_equals(name: impl Into<String>) -> Self {
        Self::new(ProductField::Name, MatchMode::Exact, Value::Text(name.into()))
    }

    pub fn name_equals_ignore_case(name: impl Into<String>) -> Self {
        Self::new(
            ProductField::Name,
            MatchMode::ExactIgnoreCase,
            Value::Text(name.into()),
        )
    }

    pub fn price_equals(price: i64) -> Self {
        Self::new(ProductField::Price, MatchMode::Exact, Value::Integer(price))
    }

    pub fn category_id_equals(id: CategoryId) -> Self {
        Self::new(
            ProductField::CategoryId,
            MatchMode::Exact,
            Value::Integer(id),
        )
    }

    pub fn is_null(field: ProductField) -> Self {
        Self::new(field, MatchMode::IsNull, Value::Null)
    }

    /// SQL term with an unnumbered placeholder for the bind value.
    pub(crate) fn sql_fragment(&self) -> String {
        let column = self.field.column();
        match self.mode {
            MatchMode::Exact => format!("{column} = ?"),
            MatchMode::ExactIgnoreCase => format!("{column} = ? COLLATE NOCASE"),
            MatchMode::IsNull => format!("{column} IS NULL"),
        }
    }

    /// Value to bind for the placeholder, absent for `IS NULL` terms.
    pub(crate) fn bind_value(&self) -> Option<Value> {
        match self.mode {
            MatchMode::IsNull => None,
            _ => Some(self.value.clone()),
        }
    }
}

/// Probe entity for example-based product matching; `None` fields are
/// unpopulated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductExample {
    pub name: Option<String>,
    pub price: Option<i64>,
    pub category_id: Option<CategoryId>,
}

/// Matching options applied when turning an example into predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExampleMatcher {
    /// Compare string fields case-insensitively.
    pub ignore_case: bool,
    /// Skip unpopulated example fields; when `false` they become
    /// `IS NULL` terms instead.
    pub ignore_null_values: bool,
}

impl ExampleMatcher {
    pub fn matching() -> Self {
        Self::default()
    }

    pub fn with_ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub fn with_include_null_values(mut self) -> Self {
        self.ignore_null_values = false;
        self
    }
}

impl Default for ExampleMatcher {
    fn default() -> Self {
        Self {
            ignore_case: false,
            ignore_null_values: true,
        }
    }
}

impl ProductExample {
    /// Builds the tagged predicate list for this example, field by field.
    pub fn predicates(&self, matcher: &ExampleMatcher) -> Vec<FieldPredicate> {
        let mut predicates = Vec::new();

        match &self.name {
            Some(name) if matcher.ignore_case => {
                predicates.push(FieldPredicate::name_equals_ignore_case(name.clone()));
            }
            Some(name) => predicates.push(FieldPredicate::name_equals(name.clone())),
            None if !matcher.ignore_null_values => {
                predicates.push(FieldPredicate::is_null(ProductField::Name));
            }
            None => {}
        }

        match self.price {
            Some(price) => predicates.push(FieldPredicate::price_equals(price)),
            None if !matcher.ignore_null_values => {
                predicates.push(FieldPredicate::is_null(ProductField::Price));
            }
            None => {}
        }

        match self.category_id {
            Some(id) => predicates.push(FieldPredicate::category_id_equals(id)),
            None if !matcher.ignore_null_values => {
                predicates.push(FieldPredicate::is_null(ProductField::CategoryId));
            }
            None => {}
        }

        predicates
    }
}
