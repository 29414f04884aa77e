//! Category repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide stable CRUD and derived-query APIs over `categories`.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths call `Category::validate()` before SQL mutations.
//! - `save` is an upsert parameterized on identity presence; audit
//!   timestamps are assigned by SQL, never by callers.
//! - Deleting a category still referenced by products fails fast with
//!   `ConstraintViolation`; no cascade.

use crate::model::category::{Category, CategoryId};
use crate::repo::{ensure_connection_ready, map_constraint, RepoError, RepoResult};
use crate::tx::Session;
use rusqlite::{params, Row};

const CATEGORY_SELECT_SQL: &str = "SELECT
    id,
    name,
    created_date,
    last_modified_date
FROM categories";

const CATEGORY_COLUMNS: &[&str] = &["id", "name", "created_date", "last_modified_date"];

/// Repository interface for category CRUD and derived queries.
pub trait CategoryRepository {
    /// Inserts when the entity has no identity, updates otherwise.
    /// Returns the persisted row including identity and audit fields.
    fn save(&self, category: Category) -> RepoResult<Category>;
    fn find_by_id(&self, id: CategoryId) -> RepoResult<Option<Category>>;
    /// Removes one persisted category. `ConstraintViolation` when products
    /// still reference it.
    fn delete(&self, category: &Category) -> RepoResult<()>;
    fn find_first_by_name_equals(&self, name: &str) -> RepoResult<Option<Category>>;
    /// `pattern` uses SQL LIKE semantics; `%` is the multi-character
    /// wildcard.
    fn find_all_by_name_like(&self, pattern: &str) -> RepoResult<Vec<Category>>;
    fn count(&self) -> RepoResult<u64>;
}

/// SQLite-backed category repository.
pub struct SqliteCategoryRepository<'s> {
    session: &'s Session,
}

impl<'s> SqliteCategoryRepository<'s> {
    /// Constructs a repository from a migrated/ready session.
    pub fn try_new(session: &'s Session) -> RepoResult<Self> {
        ensure_connection_ready(session.conn(), "categories", CATEGORY_COLUMNS)?;
        Ok(Self { session })
    }
}

impl CategoryRepository for SqliteCategoryRepository<'_> {
    fn save(&self, category: Category) -> RepoResult<Category> {
        category.validate()?;

        match category.id {
            None => {
                self.session
                    .conn()
                    .execute(
                        "INSERT INTO categories (name, created_date, last_modified_date)
                         VALUES (
                            ?1,
                            (strftime('%s', 'now') * 1000),
                            (strftime('%s', 'now') * 1000)
                         );",
                        params![category.name.as_str()],
                    )
                    .map_err(|err| map_constraint(err, "category insert"))?;

                let id = self.session.conn().last_insert_rowid();
                self.find_by_id(id)?
                    .ok_or(RepoError::NotFound {
                        entity: "category",
                        id,
                    })
            }
            Some(id) => {
                let changed = self
                    .session
                    .conn()
                    .execute(
                        "UPDATE categories
                         SET
                            name = ?1,
                            last_modified_date = (strftime('%s', 'now') * 1000)
                         WHERE id = ?2;",
                        params![category.name.as_str(), id],
                    )
                    .map_err(|err| map_constraint(err, "category update"))?;

                if changed == 0 {
                    return Err(RepoError::NotFound {
                        entity: "category",
                        id,
                    });
                }

                self.find_by_id(id)?
                    .ok_or(RepoError::NotFound {
                        entity: "category",
                        id,
                    })
            }
        }
    }

    fn find_by_id(&self, id: CategoryId) -> RepoResult<Option<Category>> {
        let mut stmt = self
            .session
            .conn()
            .prepare(&format!("{CATEGORY_SELECT_SQL} WHERE id = ?1;"))?;

        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_category_row(row)?));
        }

        Ok(None)
    }

    fn delete(&self, category: &Category) -> RepoResult<()> {
        let id = category
            .id
            .ok_or(RepoError::TransientEntity("category"))?;

        let changed = self
            .session
            .conn()
            .execute("DELETE FROM categories WHERE id = ?1;", params![id])
            .map_err(|err| map_constraint(err, "category delete"))?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "category",
                id,
            });
        }

        Ok(())
    }

    fn find_first_by_name_equals(&self, name: &str) -> RepoResult<Option<Category>> {
        let mut stmt = self.session.conn().prepare(&format!(
            "{CATEGORY_SELECT_SQL} WHERE name = ?1 ORDER BY id ASC LIMIT 1;"
        ))?;

        let mut rows = stmt.query(params![name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_category_row(row)?));
        }

        Ok(None)
    }

    fn find_all_by_name_like(&self, pattern: &str) -> RepoResult<Vec<Category>> {
        let mut stmt = self.session.conn().prepare(&format!(
            "{CATEGORY_SELECT_SQL} WHERE name LIKE ?1 ORDER BY id ASC;"
        ))?;

        let mut rows = stmt.query(params![pattern])?;
        let mut categories = Vec::new();
        while let Some(row) = rows.next()? {
            categories.push(parse_category_row(row)?);
        }

        Ok(categories)
    }

    fn count(&self) -> RepoResult<u64> {
        let count: i64 =
            self.session
                .conn()
                .query_row("SELECT COUNT(*) FROM categories;", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn parse_category_row(row: &Row<'_>) -> RepoResult<Category> {
    let category = Category {
        id: Some(row.get("id")?),
        name: row.get("name")?,
        created_date: Some(row.get("created_date")?),
        last_modified_date: Some(row.get("last_modified_date")?),
    };
    category.validate().map_err(|err| {
        RepoError::InvalidData(format!("categories row {:?}: {err}", category.id))
    })?;
    Ok(category)
}
