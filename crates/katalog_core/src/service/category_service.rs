//! Category use-case service and transaction-style demonstrations.
//!
//! # Responsibility
//! - Compose repository calls inside a unit of work and roll back on
//!   error, through each of the three control styles.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence
//!   contracts.
//! - After any of the demo operations errors, none of its writes are
//!   observable.

use crate::model::category::Category;
use crate::repo::category_repo::{CategoryRepository, SqliteCategoryRepository};
use crate::repo::product_repo::{ProductRepository, SqliteProductRepository};
use crate::repo::RepoError;
use crate::model::product::ProductId;
use crate::tx::{Session, TransactionDefinition, TransactionManager, TxError};
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const MANUAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from category service operations.
#[derive(Debug)]
pub enum ServiceError {
    Repo(RepoError),
    Tx(TxError),
    /// Failure raised by caller logic inside a unit of work body.
    Application(String),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Tx(err) => write!(f, "{err}"),
            Self::Application(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Tx(err) => Some(err),
            Self::Application(_) => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<TxError> for ServiceError {
    fn from(value: TxError) -> Self {
        Self::Tx(value)
    }
}

/// Use-case service over category/product repositories.
pub struct CategoryService<'s> {
    session: &'s Session,
}

impl<'s> CategoryService<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Declarative style: the whole operation runs inside an implicit
    /// boundary; a raised error rolls every write back and propagates.
    pub fn create(&self) -> Result<(), ServiceError> {
        self.session.execute(|session| {
            let categories = SqliteCategoryRepository::try_new(session)?;
            for index in 0..5 {
                categories.save(Category::new(format!("Category {index}")))?;
            }

            Err(ServiceError::Application("Ups rollback please".to_string()))
        })
    }

    /// Programmatic-callback style: same semantics as [`Self::create`],
    /// with the boundary requested explicitly around a closure.
    pub fn create_categories(&self) -> Result<(), ServiceError> {
        self.session.execute(|session| {
            let categories = SqliteCategoryRepository::try_new(session)?;
            for index in 0..5 {
                categories.save(Category::new(format!("Category {index}")))?;
            }

            self.error()
        })
    }

    /// Manual style: explicit handle with timeout and `Required`
    /// propagation; commit or rollback happens on every exit path.
    pub fn manual(&self) -> Result<(), ServiceError> {
        let definition = TransactionDefinition::with_timeout(MANUAL_TIMEOUT);
        let manager = TransactionManager::new(self.session);
        let status = manager.get_transaction(&definition)?;

        let outcome = (|| -> Result<(), ServiceError> {
            let categories = SqliteCategoryRepository::try_new(self.session)?;
            for index in 0..5 {
                categories.save(Category::new(format!("Category Manual {index}")))?;
            }

            self.error()
        })();

        match outcome {
            Ok(()) => {
                manager.commit(&status)?;
                Ok(())
            }
            Err(err) => {
                warn!("event=service_rollback module=service status=ok error={err}");
                manager.rollback(&status)?;
                Err(err)
            }
        }
    }

    /// Unconditional application failure used by the rollback demos.
    pub fn error(&self) -> Result<(), ServiceError> {
        Err(ServiceError::Application("Ups".to_string()))
    }

    /// Zeroes one product's price through the bulk update path; must run
    /// inside an active unit of work.
    pub fn update_product_price_to_zero(&self, id: ProductId) -> Result<usize, ServiceError> {
        let products = SqliteProductRepository::try_new(self.session)?;
        Ok(products.update_price_to_zero(id)?)
    }
}
