use katalog_core::db::open_db_in_memory;
use katalog_core::{
    Category, CategoryRepository, CategoryService, Product, ProductRepository, RepoError, Session,
    ServiceError, SqliteCategoryRepository, SqliteProductRepository, TransactionDefinition,
    TransactionManager, TxError, TxState,
};
use std::time::Duration;

fn session() -> Session {
    Session::new(open_db_in_memory().unwrap())
}

fn category_count(session: &Session) -> u64 {
    SqliteCategoryRepository::try_new(session)
        .unwrap()
        .count()
        .unwrap()
}

#[test]
fn declarative_style_rolls_back_every_write_on_error() {
    let session = session();
    let service = CategoryService::new(&session);
    let before = category_count(&session);

    let err = service.create().unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Application(message) if message == "Ups rollback please"
    ));

    assert_eq!(category_count(&session), before);
    assert_eq!(session.transaction_state(), TxState::RolledBack);
}

#[test]
fn programmatic_style_rolls_back_every_write_on_error() {
    let session = session();
    let service = CategoryService::new(&session);
    let before = category_count(&session);

    let err = service.create_categories().unwrap_err();
    assert!(matches!(err, ServiceError::Application(message) if message == "Ups"));

    assert_eq!(category_count(&session), before);
}

#[test]
fn manual_style_rolls_back_every_write_on_error() {
    let session = session();
    let service = CategoryService::new(&session);
    let before = category_count(&session);

    let err = service.manual().unwrap_err();
    assert!(matches!(err, ServiceError::Application(message) if message == "Ups"));

    assert_eq!(category_count(&session), before);
}

#[test]
fn the_three_styles_are_indistinguishable_after_failure() {
    let session = session();
    let service = CategoryService::new(&session);

    assert!(service.create().is_err());
    assert!(service.create_categories().is_err());
    assert!(service.manual().is_err());

    assert_eq!(category_count(&session), 0);
}

#[test]
fn successful_unit_of_work_commits_all_writes() {
    let session = session();

    session
        .execute(|session| {
            let categories = SqliteCategoryRepository::try_new(session)?;
            for index in 0..3 {
                categories.save(Category::new(format!("Committed {index}")))?;
            }
            Ok::<_, RepoError>(())
        })
        .unwrap();

    assert_eq!(category_count(&session), 3);
    assert_eq!(session.transaction_state(), TxState::Committed);
}

#[test]
fn delete_by_name_is_idempotent_inside_a_unit_of_work() {
    let session = session();

    session
        .execute(|session| {
            let categories = SqliteCategoryRepository::try_new(session)?;
            let products = SqliteProductRepository::try_new(session)?;

            let category = categories.save(Category::new("GADGET MURAH"))?;
            products.save(Product::new(
                "Samsung Galaxy S14",
                10_000_000,
                category.id.unwrap(),
            ))?;

            assert_eq!(products.delete_by_name("Samsung Galaxy S14")?, 1);
            assert_eq!(products.delete_by_name("Samsung Galaxy S14")?, 0);
            Ok::<_, RepoError>(())
        })
        .unwrap();
}

#[test]
fn bulk_statements_apply_inside_an_active_unit_of_work() {
    let session = session();
    let product_id = {
        let categories = SqliteCategoryRepository::try_new(&session).unwrap();
        let products = SqliteProductRepository::try_new(&session).unwrap();
        let category = categories.save(Category::new("GADGET MURAH")).unwrap();
        products
            .save(Product::new(
                "Apple Iphone 14 Pro Max",
                25_000_000,
                category.id.unwrap(),
            ))
            .unwrap()
            .id
            .unwrap()
    };
    let service = CategoryService::new(&session);

    session
        .execute(|session| {
            let products = SqliteProductRepository::try_new(session)?;

            let deleted = products
                .delete_by_predicate(&katalog_core::FieldPredicate::name_equals("Wrong"))?;
            assert_eq!(deleted, 0);

            let updated = service.update_product_price_to_zero(product_id)?;
            assert_eq!(updated, 1);

            let product = products.find_by_id(product_id)?.unwrap();
            assert_eq!(product.price, 0);
            Ok::<_, ServiceError>(())
        })
        .unwrap();

    // Still zero after commit.
    let products = SqliteProductRepository::try_new(&session).unwrap();
    assert_eq!(products.find_by_id(product_id).unwrap().unwrap().price, 0);
}

#[test]
fn bulk_statements_outside_a_unit_of_work_fail() {
    let session = session();
    let products = SqliteProductRepository::try_new(&session).unwrap();

    assert!(matches!(
        products.update_price_to_zero(1),
        Err(RepoError::NoActiveTransaction {
            operation: "update_price_by_predicate"
        })
    ));
    assert!(matches!(
        products.delete_by_predicate(&katalog_core::FieldPredicate::name_equals("Wrong")),
        Err(RepoError::NoActiveTransaction {
            operation: "delete_by_predicate"
        })
    ));
}

#[test]
fn locking_read_outside_a_unit_of_work_fails() {
    let session = session();
    let products = SqliteProductRepository::try_new(&session).unwrap();

    assert!(matches!(
        products.find_first_by_id_for_update(1),
        Err(RepoError::NoActiveTransaction {
            operation: "find_first_by_id_for_update"
        })
    ));
}

#[test]
fn locking_read_returns_row_inside_a_unit_of_work() {
    let session = session();
    let product_id = {
        let categories = SqliteCategoryRepository::try_new(&session).unwrap();
        let products = SqliteProductRepository::try_new(&session).unwrap();
        let category = categories.save(Category::new("GADGET MURAH")).unwrap();
        products
            .save(Product::new(
                "Apple Iphone 14 Pro Max",
                25_000_000,
                category.id.unwrap(),
            ))
            .unwrap()
            .id
            .unwrap()
    };

    session
        .execute(|session| {
            let products = SqliteProductRepository::try_new(session)?;
            let locked = products.find_first_by_id_for_update(product_id)?.unwrap();
            assert_eq!(locked.name, "Apple Iphone 14 Pro Max");

            assert!(products.find_first_by_id_for_update(999)?.is_none());
            Ok::<_, RepoError>(())
        })
        .unwrap();
}

#[test]
fn required_propagation_joins_and_inner_rollback_discards_outer_writes() {
    let session = session();
    let manager = TransactionManager::new(&session);

    let outer = manager
        .get_transaction(&TransactionDefinition::default())
        .unwrap();
    let categories = SqliteCategoryRepository::try_new(&session).unwrap();
    categories.save(Category::new("Outer A")).unwrap();
    categories.save(Category::new("Outer B")).unwrap();

    // Nested entry joins the caller's unit of work instead of nesting.
    let nested = manager
        .get_transaction(&TransactionDefinition::default())
        .unwrap();
    assert!(!nested.is_new());
    manager.rollback(&nested).unwrap();

    assert!(matches!(
        manager.commit(&outer),
        Err(TxError::UnexpectedRollback)
    ));
    assert_eq!(category_count(&session), 0);
    assert_eq!(session.transaction_state(), TxState::RolledBack);
}

#[test]
fn nested_execute_joins_the_outer_unit_of_work() {
    let session = session();

    session
        .execute(|outer_session| {
            let categories = SqliteCategoryRepository::try_new(outer_session)?;
            categories.save(Category::new("Outer"))?;

            outer_session.execute(|inner_session| {
                let categories = SqliteCategoryRepository::try_new(inner_session)?;
                categories.save(Category::new("Inner"))?;
                Ok::<_, RepoError>(())
            })?;

            Ok::<_, RepoError>(())
        })
        .unwrap();

    assert_eq!(category_count(&session), 2);
}

#[test]
fn error_escaping_a_nested_join_rolls_back_the_whole_unit_of_work() {
    let session = session();

    let err = session
        .execute(|outer_session| {
            let categories = SqliteCategoryRepository::try_new(outer_session)?;
            categories.save(Category::new("Outer"))?;

            outer_session.execute(|inner_session| {
                let categories = SqliteCategoryRepository::try_new(inner_session)?;
                categories.save(Category::new("Inner"))?;
                Err::<(), RepoError>(RepoError::InvalidData("boom".to_string()))
            })
        })
        .unwrap_err();

    assert!(matches!(err, RepoError::InvalidData(_)));
    assert_eq!(category_count(&session), 0);
}

#[test]
fn swallowed_nested_failure_still_forces_rollback_at_outer_commit() {
    let session = session();

    let err = session
        .execute(|outer_session| {
            let categories = SqliteCategoryRepository::try_new(outer_session)?;
            categories.save(Category::new("Outer"))?;

            let ignored = outer_session.execute(|inner_session| {
                let categories = SqliteCategoryRepository::try_new(inner_session)?;
                categories.save(Category::new("Inner"))?;
                Err::<(), RepoError>(RepoError::InvalidData("boom".to_string()))
            });
            assert!(ignored.is_err());

            Ok::<_, RepoError>(())
        })
        .unwrap_err();

    assert!(matches!(err, RepoError::Tx(TxError::UnexpectedRollback)));
    assert_eq!(category_count(&session), 0);
}

#[test]
fn manual_timeout_forces_rollback_and_surfaces_timeout_exceeded() {
    let session = session();
    let manager = TransactionManager::new(&session);

    let status = manager
        .get_transaction(&TransactionDefinition::with_timeout(Duration::from_millis(
            10,
        )))
        .unwrap();

    let categories = SqliteCategoryRepository::try_new(&session).unwrap();
    categories.save(Category::new("Too slow")).unwrap();

    std::thread::sleep(Duration::from_millis(25));

    assert!(matches!(
        manager.commit(&status),
        Err(TxError::TimeoutExceeded { .. })
    ));
    assert_eq!(session.transaction_state(), TxState::RolledBack);
    assert_eq!(category_count(&session), 0);
}

#[test]
fn completed_manual_handle_cannot_be_reused() {
    let session = session();
    let manager = TransactionManager::new(&session);

    let status = manager
        .get_transaction(&TransactionDefinition::default())
        .unwrap();
    manager.commit(&status).unwrap();

    assert!(matches!(
        manager.rollback(&status),
        Err(TxError::AlreadyCompleted)
    ));
}

#[test]
fn rollback_is_safe_when_no_writes_occurred() {
    let session = session();
    let manager = TransactionManager::new(&session);

    let status = manager
        .get_transaction(&TransactionDefinition::default())
        .unwrap();
    manager.rollback(&status).unwrap();
    assert_eq!(session.transaction_state(), TxState::RolledBack);
}
