//! Product repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD, derived-query, paged/sliced/streamed read, example
//!   match, locking read, and bulk statement APIs over `products`.
//! - Keep SQL assembly inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths call `Product::validate()` before SQL mutations.
//! - A missing category reference surfaces as `ConstraintViolation`.
//! - Bulk statements and the locking read require an active unit of work.

use crate::model::category::Category;
use crate::model::product::{Product, ProductId};
use crate::repo::query::{
    ExampleMatcher, FieldPredicate, Page, PageRequest, ProductExample, Slice, Sort,
};
use crate::repo::{
    ensure_active_transaction, ensure_connection_ready, map_constraint, RepoError, RepoResult,
};
use crate::tx::Session;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row};
use std::collections::VecDeque;

const PRODUCT_SELECT_SQL: &str = "SELECT
    p.id,
    p.name,
    p.price,
    p.category_id,
    p.created_date,
    p.last_modified_date
FROM products p";

const CATEGORY_JOIN_SQL: &str = " INNER JOIN categories c ON c.id = p.category_id";

const PRODUCT_COLUMNS: &[&str] = &[
    "id",
    "name",
    "price",
    "category_id",
    "created_date",
    "last_modified_date",
];

const STREAM_BATCH_SIZE: usize = 64;

/// Repository interface for product persistence and query operations.
pub trait ProductRepository {
    /// Inserts when the entity has no identity, updates otherwise.
    /// Returns the persisted row including identity and audit fields.
    fn save(&self, product: Product) -> RepoResult<Product>;
    fn find_by_id(&self, id: ProductId) -> RepoResult<Option<Product>>;
    fn delete(&self, product: &Product) -> RepoResult<()>;
    /// Idempotent bulk removal by exact name; returns 0 on no match.
    fn delete_by_name(&self, name: &str) -> RepoResult<usize>;
    fn count(&self) -> RepoResult<u64>;
    fn count_by_category_name(&self, name: &str) -> RepoResult<u64>;
    fn exists_by_name(&self, name: &str) -> RepoResult<bool>;
    /// Products of the named category in insertion (id) order.
    fn find_all_by_category_name(&self, name: &str) -> RepoResult<Vec<Product>>;
    fn find_all_by_category_name_sorted(&self, name: &str, sort: &Sort)
        -> RepoResult<Vec<Product>>;
    fn find_all_by_category_name_paged(
        &self,
        name: &str,
        request: &PageRequest,
    ) -> RepoResult<Page<Product>>;
    /// LIKE search over product name or category name, paged with a total
    /// count.
    fn search(&self, pattern: &str, request: &PageRequest) -> RepoResult<Page<Product>>;
    /// Sliced read: fetches one row beyond the page size to learn whether
    /// a next page exists, without counting the whole result.
    fn find_all_by_category(
        &self,
        category: &Category,
        request: &PageRequest,
    ) -> RepoResult<Slice<Product>>;
    /// Lazy single-pass read in id order. Results are only consistent
    /// while the owning unit of work stays open; consume or drop the
    /// stream before it ends.
    fn stream_all_by_category(&self, category: &Category) -> RepoResult<ProductStream<'_>>;
    /// Matches on the example's populated fields, conjoined with AND.
    fn find_all_by_example(
        &self,
        example: &ProductExample,
        matcher: &ExampleMatcher,
    ) -> RepoResult<Vec<Product>>;
    /// Pessimistic locking read. Escalates the current unit of work to the
    /// database writer lock (SQLite has no row locks), so a concurrent
    /// locking read from another session blocks until this unit of work
    /// commits or rolls back. Requires an active unit of work.
    fn find_first_by_id_for_update(&self, id: ProductId) -> RepoResult<Option<Product>>;
    /// Bulk delete bypassing entity load; requires an active unit of work.
    fn delete_by_predicate(&self, predicate: &FieldPredicate) -> RepoResult<usize>;
    /// Bulk price update bypassing entity load and audit handling;
    /// requires an active unit of work.
    fn update_price_by_predicate(
        &self,
        predicate: &FieldPredicate,
        price: i64,
    ) -> RepoResult<usize>;
    /// Zeroes one product's price through the bulk update path.
    fn update_price_to_zero(&self, id: ProductId) -> RepoResult<usize> {
        self.update_price_by_predicate(&FieldPredicate::id_equals(id), 0)
    }
}

/// SQLite-backed product repository.
pub struct SqliteProductRepository<'s> {
    session: &'s Session,
}

impl<'s> SqliteProductRepository<'s> {
    /// Constructs a repository from a migrated/ready session.
    pub fn try_new(session: &'s Session) -> RepoResult<Self> {
        ensure_connection_ready(session.conn(), "products", PRODUCT_COLUMNS)?;
        Ok(Self { session })
    }

    fn query_products(&self, sql: &str, binds: Vec<Value>) -> RepoResult<Vec<Product>> {
        let mut stmt = self.session.conn().prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut products = Vec::new();
        while let Some(row) = rows.next()? {
            products.push(parse_product_row(row)?);
        }
        Ok(products)
    }

    fn count_rows(&self, sql: &str, binds: Vec<Value>) -> RepoResult<u64> {
        let count: i64 =
            self.session
                .conn()
                .query_row(sql, params_from_iter(binds), |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl ProductRepository for SqliteProductRepository<'_> {
    fn save(&self, product: Product) -> RepoResult<Product> {
        product.validate()?;

        match product.id {
            None => {
                self.session
                    .conn()
                    .execute(
                        "INSERT INTO products (name, price, category_id, created_date, last_modified_date)
                         VALUES (
                            ?1,
                            ?2,
                            ?3,
                            (strftime('%s', 'now') * 1000),
                            (strftime('%s', 'now') * 1000)
                         );",
                        params![product.name.as_str(), product.price, product.category_id],
                    )
                    .map_err(|err| map_constraint(err, "product insert"))?;

                let id = self.session.conn().last_insert_rowid();
                self.find_by_id(id)?.ok_or(RepoError::NotFound {
                    entity: "product",
                    id,
                })
            }
            Some(id) => {
                let changed = self
                    .session
                    .conn()
                    .execute(
                        "UPDATE products
                         SET
                            name = ?1,
                            price = ?2,
                            category_id = ?3,
                            last_modified_date = (strftime('%s', 'now') * 1000)
                         WHERE id = ?4;",
                        params![
                            product.name.as_str(),
                            product.price,
                            product.category_id,
                            id
                        ],
                    )
                    .map_err(|err| map_constraint(err, "product update"))?;

                if changed == 0 {
                    return Err(RepoError::NotFound {
                        entity: "product",
                        id,
                    });
                }

                self.find_by_id(id)?.ok_or(RepoError::NotFound {
                    entity: "product",
                    id,
                })
            }
        }
    }

    fn find_by_id(&self, id: ProductId) -> RepoResult<Option<Product>> {
        let mut stmt = self
            .session
            .conn()
            .prepare(&format!("{PRODUCT_SELECT_SQL} WHERE p.id = ?1;"))?;

        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_product_row(row)?));
        }

        Ok(None)
    }

    fn delete(&self, product: &Product) -> RepoResult<()> {
        let id = product.id.ok_or(RepoError::TransientEntity("product"))?;

        let changed = self
            .session
            .conn()
            .execute("DELETE FROM products WHERE id = ?1;", params![id])?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "product",
                id,
            });
        }

        Ok(())
    }

    fn delete_by_name(&self, name: &str) -> RepoResult<usize> {
        let changed = self
            .session
            .conn()
            .execute("DELETE FROM products WHERE name = ?1;", params![name])?;
        Ok(changed)
    }

    fn count(&self) -> RepoResult<u64> {
        self.count_rows("SELECT COUNT(*) FROM products;", Vec::new())
    }

    fn count_by_category_name(&self, name: &str) -> RepoResult<u64> {
        self.count_rows(
            "SELECT COUNT(*)
             FROM products p
             INNER JOIN categories c ON c.id = p.category_id
             WHERE c.name = ?1;",
            vec![Value::Text(name.to_string())],
        )
    }

    fn exists_by_name(&self, name: &str) -> RepoResult<bool> {
        let exists: i64 = self.session.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM products WHERE name = ?1);",
            params![name],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn find_all_by_category_name(&self, name: &str) -> RepoResult<Vec<Product>> {
        self.find_all_by_category_name_sorted(name, &Sort::default())
    }

    fn find_all_by_category_name_sorted(
        &self,
        name: &str,
        sort: &Sort,
    ) -> RepoResult<Vec<Product>> {
        let sql = format!(
            "{PRODUCT_SELECT_SQL}{CATEGORY_JOIN_SQL} WHERE c.name = ?{};",
            sort.order_clause("p.id ASC")
        );
        self.query_products(&sql, vec![Value::Text(name.to_string())])
    }

    fn find_all_by_category_name_paged(
        &self,
        name: &str,
        request: &PageRequest,
    ) -> RepoResult<Page<Product>> {
        let sql = format!(
            "{PRODUCT_SELECT_SQL}{CATEGORY_JOIN_SQL} WHERE c.name = ?{} LIMIT ? OFFSET ?;",
            request.sort().order_clause("p.id ASC")
        );
        let content = self.query_products(
            &sql,
            vec![
                Value::Text(name.to_string()),
                Value::Integer(i64::from(request.size())),
                Value::Integer(request.offset() as i64),
            ],
        )?;

        let total = self.count_by_category_name(name)?;
        Ok(Page::new(content, request, total))
    }

    fn search(&self, pattern: &str, request: &PageRequest) -> RepoResult<Page<Product>> {
        let sql = format!(
            "{PRODUCT_SELECT_SQL}{CATEGORY_JOIN_SQL}
             WHERE p.name LIKE ?1 OR c.name LIKE ?1{} LIMIT ?2 OFFSET ?3;",
            request.sort().order_clause("p.id ASC")
        );
        let content = self.query_products(
            &sql,
            vec![
                Value::Text(pattern.to_string()),
                Value::Integer(i64::from(request.size())),
                Value::Integer(request.offset() as i64),
            ],
        )?;

        let total = self.count_rows(
            "SELECT COUNT(*)
             FROM products p
             INNER JOIN categories c ON c.id = p.category_id
             WHERE p.name LIKE ?1 OR c.name LIKE ?1;",
            vec![Value::Text(pattern.to_string())],
        )?;
        Ok(Page::new(content, request, total))
    }

    fn find_all_by_category(
        &self,
        category: &Category,
        request: &PageRequest,
    ) -> RepoResult<Slice<Product>> {
        let category_id = category.id.ok_or(RepoError::TransientEntity("category"))?;

        // One extra row answers "has next" without a count query.
        let lookahead = i64::from(request.size()) + 1;
        let sql = format!(
            "{PRODUCT_SELECT_SQL} WHERE p.category_id = ?{} LIMIT ? OFFSET ?;",
            request.sort().order_clause("p.id ASC")
        );
        let mut content = self.query_products(
            &sql,
            vec![
                Value::Integer(category_id),
                Value::Integer(lookahead),
                Value::Integer(request.offset() as i64),
            ],
        )?;

        let has_next = content.len() > request.size() as usize;
        content.truncate(request.size() as usize);
        Ok(Slice::new(content, request, has_next))
    }

    fn stream_all_by_category(&self, category: &Category) -> RepoResult<ProductStream<'_>> {
        let category_id = category.id.ok_or(RepoError::TransientEntity("category"))?;
        Ok(ProductStream {
            session: self.session,
            category_id,
            last_id: 0,
            buffer: VecDeque::new(),
            finished: false,
        })
    }

    fn find_all_by_example(
        &self,
        example: &ProductExample,
        matcher: &ExampleMatcher,
    ) -> RepoResult<Vec<Product>> {
        let predicates = example.predicates(matcher);
        let mut sql = format!("{PRODUCT_SELECT_SQL} WHERE 1 = 1");
        let mut binds: Vec<Value> = Vec::new();

        for predicate in &predicates {
            sql.push_str(" AND ");
            sql.push_str(&predicate.sql_fragment());
            if let Some(value) = predicate.bind_value() {
                binds.push(value);
            }
        }
        sql.push_str(" ORDER BY p.id ASC;");

        self.query_products(&sql, binds)
    }

    fn find_first_by_id_for_update(&self, id: ProductId) -> RepoResult<Option<Product>> {
        ensure_active_transaction(self.session, "find_first_by_id_for_update")?;

        // Self-assignment write escalates this unit of work to the writer
        // lock; a concurrent holder makes this call block in the busy
        // handler until its unit of work terminates.
        self.session.conn().execute(
            "UPDATE products SET id = id WHERE id = ?1;",
            params![id],
        )?;

        self.find_by_id(id)
    }

    fn delete_by_predicate(&self, predicate: &FieldPredicate) -> RepoResult<usize> {
        ensure_active_transaction(self.session, "delete_by_predicate")?;

        let sql = format!("DELETE FROM products WHERE {};", predicate.sql_fragment());
        let binds: Vec<Value> = predicate.bind_value().into_iter().collect();
        let changed = self
            .session
            .conn()
            .execute(&sql, params_from_iter(binds))?;
        Ok(changed)
    }

    fn update_price_by_predicate(
        &self,
        predicate: &FieldPredicate,
        price: i64,
    ) -> RepoResult<usize> {
        ensure_active_transaction(self.session, "update_price_by_predicate")?;

        let sql = format!(
            "UPDATE products SET price = ? WHERE {};",
            predicate.sql_fragment()
        );
        let mut binds: Vec<Value> = vec![Value::Integer(price)];
        binds.extend(predicate.bind_value());
        let changed = self
            .session
            .conn()
            .execute(&sql, params_from_iter(binds))
            .map_err(|err| map_constraint(err, "product bulk update"))?;
        Ok(changed)
    }
}

/// Lazy keyset cursor over one category's products in id order.
///
/// Rows are fetched in small batches on demand; the cursor is finite and
/// single-pass. Consistency is only guaranteed while the unit of work that
/// created it stays open.
pub struct ProductStream<'s> {
    session: &'s Session,
    category_id: i64,
    last_id: ProductId,
    buffer: VecDeque<Product>,
    finished: bool,
}

impl ProductStream<'_> {
    fn fetch_batch(&mut self) -> RepoResult<()> {
        let sql = format!(
            "{PRODUCT_SELECT_SQL} WHERE p.category_id = ?1 AND p.id > ?2 ORDER BY p.id ASC LIMIT ?3;"
        );
        let mut stmt = self.session.conn().prepare(&sql)?;
        let mut rows = stmt.query(params![
            self.category_id,
            self.last_id,
            STREAM_BATCH_SIZE as i64
        ])?;

        let mut fetched = 0usize;
        while let Some(row) = rows.next()? {
            let product = parse_product_row(row)?;
            if let Some(id) = product.id {
                self.last_id = id;
            }
            self.buffer.push_back(product);
            fetched += 1;
        }

        if fetched < STREAM_BATCH_SIZE {
            self.finished = true;
        }
        Ok(())
    }
}

impl Iterator for ProductStream<'_> {
    type Item = RepoResult<Product>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.finished {
            if let Err(err) = self.fetch_batch() {
                self.finished = true;
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

fn parse_product_row(row: &Row<'_>) -> RepoResult<Product> {
    let product = Product {
        id: Some(row.get("id")?),
        name: row.get("name")?,
        price: row.get("price")?,
        category_id: row.get("category_id")?,
        created_date: Some(row.get("created_date")?),
        last_modified_date: Some(row.get("last_modified_date")?),
    };
    product
        .validate()
        .map_err(|err| RepoError::InvalidData(format!("products row {:?}: {err}", product.id)))?;
    Ok(product)
}
