//! Query composition and specification integration testing
//!
//! Eager loading, projection and specifications evaluated against a migrated
//! in-memory database.

mod common;

use sea_orm::{ColumnTrait, Condition};

use common::create_test_repository;
use easy_repository::{
    Repository, Tracking,
    entities::{author, book},
    models::{author_by_name, author_order_by_name},
    specification::Specification,
};

struct Library {
    banks: author::Model,
    le_guin: author::Model,
    herbert: author::Model,
}

async fn seed_library(repository: &Repository) -> Library {
    let banks = repository.add(author::Model::new("Iain", "Banks"));
    let le_guin = repository.add(author::Model::new("Ursula", "Le Guin"));
    let herbert = repository.add(author::Model::new("Frank", "Herbert"));
    repository.add_range(vec![
        book::Model::new(banks.id, "Consider Phlebas", 471),
        book::Model::new(banks.id, "Use of Weapons", 411),
        book::Model::new(banks.id, "Excession", 451),
        book::Model::new(le_guin.id, "The Dispossessed", 387),
    ]);
    repository.complete().await.unwrap();

    Library {
        banks,
        le_guin,
        herbert,
    }
}

// =============================================================================
// SPECIFICATIONS
// =============================================================================

#[tokio::test]
async fn test_author_by_name_specification() {
    let (_db, repository) = create_test_repository().await;
    let library = seed_library(&repository).await;

    let found = repository
        .query::<author::Entity>(Tracking::NoTracking)
        .with_specification(&author_by_name("Ursula"))
        .single()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, library.le_guin.id);

    let missing = repository
        .query::<author::Entity>(Tracking::NoTracking)
        .with_specification(&author_by_name("Urs"))
        .multiple()
        .await
        .unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn test_specification_with_included_books() {
    let (_db, repository) = create_test_repository().await;
    let library = seed_library(&repository).await;

    // "n" matches Iain and Frank, ordered by name ascending
    let rows = repository
        .query::<author::Entity>(Tracking::NoTracking)
        .with_specification(&author_order_by_name("n"))
        .multiple()
        .await
        .unwrap();

    let names: Vec<&str> = rows.iter().map(|(a, _)| a.name.as_str()).collect();
    assert_eq!(names, vec!["Frank", "Iain"]);

    let (frank, frank_books) = &rows[0];
    assert_eq!(frank.id, library.herbert.id);
    assert!(frank_books.is_empty());

    let (iain, iain_books) = &rows[1];
    assert_eq!(iain.id, library.banks.id);
    assert_eq!(iain_books.len(), 3);
    assert!(iain_books.iter().all(|b| b.author_id == library.banks.id));
}

#[tokio::test]
async fn test_specification_paging_and_tracking_override() {
    let (_db, repository) = create_test_repository().await;
    seed_library(&repository).await;

    let spec = Specification::<author::Entity>::new()
        .order_by_desc(author::Column::Surname)
        .skip(1)
        .take(1)
        .as_no_tracking();
    let page = repository
        .query::<author::Entity>(Tracking::Tracked)
        .with_specification(&spec)
        .multiple()
        .await
        .unwrap();

    assert_eq!(page.len(), 1);
    assert_eq!(page[0].surname, "Herbert");
    assert_eq!(repository.tracked_entities(), 0);
}

// =============================================================================
// EAGER LOADING AND PROJECTION
// =============================================================================

#[tokio::test]
async fn test_include_owning_side() {
    let (_db, repository) = create_test_repository().await;
    let library = seed_library(&repository).await;

    let (book, author) = repository
        .query::<book::Entity>(Tracking::NoTracking)
        .filter(book::Column::Title.eq("The Dispossessed"))
        .include::<author::Entity>()
        .single()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(book.author_id, library.le_guin.id);
    assert_eq!(author.len(), 1);
    assert_eq!(author[0].surname, "Le Guin");
}

#[tokio::test]
async fn test_projection_after_include() {
    let (_db, repository) = create_test_repository().await;
    seed_library(&repository).await;

    let mut shelf = repository
        .query::<author::Entity>(Tracking::NoTracking)
        .include::<book::Entity>()
        .project(|(author, books)| (author.surname, books.len()))
        .multiple()
        .await
        .unwrap();
    shelf.sort();

    assert_eq!(
        shelf,
        vec![
            ("Banks".to_string(), 3),
            ("Herbert".to_string(), 0),
            ("Le Guin".to_string(), 1),
        ]
    );
}

#[tokio::test]
async fn test_projection_of_plain_rows() {
    let (_db, repository) = create_test_repository().await;
    seed_library(&repository).await;

    let title = repository
        .query::<book::Entity>(Tracking::NoTracking)
        .filter(book::Column::TotalPage.gt(460))
        .project(|book| book.title)
        .single()
        .await
        .unwrap();
    assert_eq!(title.as_deref(), Some("Consider Phlebas"));
}

#[tokio::test]
async fn test_tracked_query_snapshots_rows() {
    let (_db, repository) = create_test_repository().await;
    seed_library(&repository).await;

    let books = repository
        .get_multiple::<book::Entity, _>(Tracking::Tracked, book::Column::TotalPage.gt(400))
        .await
        .unwrap();
    assert_eq!(books.len(), 3);
    assert_eq!(repository.tracked_entities(), 3);
}

// =============================================================================
// EXISTENCE AND COUNTS
// =============================================================================

#[tokio::test]
async fn test_any_and_count() {
    let (_db, repository) = create_test_repository().await;
    let library = seed_library(&repository).await;

    assert!(
        repository
            .any::<book::Entity, _>(book::Column::AuthorId.eq(library.banks.id))
            .await
            .unwrap()
    );
    assert!(
        !repository
            .any::<book::Entity, _>(book::Column::AuthorId.eq(library.herbert.id))
            .await
            .unwrap()
    );

    assert_eq!(
        repository
            .count::<book::Entity, _>(Condition::all())
            .await
            .unwrap(),
        4
    );
    assert_eq!(
        repository
            .count::<author::Entity, _>(author::Column::IsDeleted.eq(false))
            .await
            .unwrap(),
        3
    );
}
