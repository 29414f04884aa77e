//! Cross-session visibility and pessimistic locking over one database
//! file. Each session owns its own connection; WAL mode keeps readers
//! unblocked while a writer holds the lock.

use katalog_core::db::open_db;
use katalog_core::{
    Category, CategoryRepository, Product, ProductRepository, RepoError, Session,
    SqliteCategoryRepository, SqliteProductRepository, TransactionDefinition, TransactionManager,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn db_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("katalog.db")
}

fn open_session(path: &Path) -> Session {
    Session::new(open_db(path).unwrap())
}

fn seed_product(path: &Path, price: i64) -> i64 {
    let session = open_session(path);
    let categories = SqliteCategoryRepository::try_new(&session).unwrap();
    let products = SqliteProductRepository::try_new(&session).unwrap();

    let category = categories.save(Category::new("GADGET MURAH")).unwrap();
    products
        .save(Product::new(
            "Apple Iphone 14 Pro Max",
            price,
            category.id.unwrap(),
        ))
        .unwrap()
        .id
        .unwrap()
}

#[test]
fn uncommitted_writes_are_invisible_to_other_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);

    let writer = open_session(&path);
    let reader = open_session(&path);

    let manager = TransactionManager::new(&writer);
    let status = manager
        .get_transaction(&TransactionDefinition::default())
        .unwrap();

    let categories = SqliteCategoryRepository::try_new(&writer).unwrap();
    categories.save(Category::new("Invisible")).unwrap();

    let reader_categories = SqliteCategoryRepository::try_new(&reader).unwrap();
    assert_eq!(reader_categories.count().unwrap(), 0);

    manager.commit(&status).unwrap();
    assert_eq!(reader_categories.count().unwrap(), 1);
}

#[test]
fn rolled_back_writes_never_become_visible() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);

    let writer = open_session(&path);
    let reader = open_session(&path);

    let err = writer
        .execute(|session| {
            let categories = SqliteCategoryRepository::try_new(session)?;
            categories.save(Category::new("Ghost"))?;
            Err::<(), RepoError>(RepoError::InvalidData("abort".to_string()))
        })
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));

    let reader_categories = SqliteCategoryRepository::try_new(&reader).unwrap();
    assert_eq!(reader_categories.count().unwrap(), 0);
}

#[test]
fn concurrent_locking_read_blocks_until_the_holder_commits() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let product_id = seed_product(&path, 100);

    let barrier = Arc::new(Barrier::new(2));
    const HOLD: Duration = Duration::from_millis(300);

    let holder_path = path.clone();
    let holder_barrier = Arc::clone(&barrier);
    let holder = thread::spawn(move || {
        let session = open_session(&holder_path);
        session
            .execute(|session| {
                let products = SqliteProductRepository::try_new(session)?;
                let locked = products.find_first_by_id_for_update(product_id)?.unwrap();

                // Lock is held; let the contender start racing.
                holder_barrier.wait();
                thread::sleep(HOLD);

                products.save(Product {
                    price: locked.price + 900,
                    ..locked
                })?;
                Ok::<_, RepoError>(())
            })
            .unwrap();
    });

    let contender_barrier = Arc::clone(&barrier);
    let contender = thread::spawn(move || {
        let session = open_session(&path);
        contender_barrier.wait();
        // Give the holder a head start so contention is guaranteed.
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        session
            .execute(|session| {
                let products = SqliteProductRepository::try_new(session)?;
                let observed = products.find_first_by_id_for_update(product_id)?.unwrap();
                Ok::<_, RepoError>((observed.price, started.elapsed()))
            })
            .unwrap()
    });

    holder.join().unwrap();
    let (price, waited) = contender.join().unwrap();

    // The contender blocked until the holder committed, then observed the
    // committed price.
    assert_eq!(price, 1000);
    assert!(waited >= Duration::from_millis(150), "waited {waited:?}");
}

#[test]
fn lock_released_by_rollback_exposes_the_original_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let product_id = seed_product(&path, 100);

    let barrier = Arc::new(Barrier::new(2));

    let holder_path = path.clone();
    let holder_barrier = Arc::clone(&barrier);
    let holder = thread::spawn(move || {
        let session = open_session(&holder_path);
        let err = session
            .execute(|session| {
                let products = SqliteProductRepository::try_new(session)?;
                let locked = products.find_first_by_id_for_update(product_id)?.unwrap();
                products.save(Product {
                    price: locked.price + 900,
                    ..locked
                })?;

                holder_barrier.wait();
                thread::sleep(Duration::from_millis(200));

                Err::<(), RepoError>(RepoError::InvalidData("abort".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));
    });

    let contender_barrier = Arc::clone(&barrier);
    let contender = thread::spawn(move || {
        let session = open_session(&path);
        contender_barrier.wait();
        thread::sleep(Duration::from_millis(50));

        session
            .execute(|session| {
                let products = SqliteProductRepository::try_new(session)?;
                let observed = products.find_first_by_id_for_update(product_id)?.unwrap();
                Ok::<_, RepoError>(observed.price)
            })
            .unwrap()
    });

    holder.join().unwrap();
    let price = contender.join().unwrap();
    assert_eq!(price, 100);
}
