//! In-memory catalog shared by every request handler.
//!
//! One `RwLock` guards the book list, the id counter and the revision
//! together, so id assignment, appends and rating updates are each a single
//! critical section. The post-commit observer runs after the lock is
//! released; a failed write leaves the in-memory change in place and is
//! reported to the caller as [`CatalogError::Persistence`].

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::modules::books::models::{is_valid_rating, Book, CreateBook};

/// Maximum number of books returned by [`Catalog::recommend`].
pub const RECOMMENDATION_LIMIT: usize = 10;
/// Maximum number of genres accepted by [`Catalog::recommend`].
pub const MAX_RECOMMEND_GENRES: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("book {0} not found")]
    NotFound(u64),
    #[error("rating {0} is outside the accepted range 1..=5")]
    InvalidRating(f64),
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        field: &'static str,
        reason: &'static str,
    },
    #[error("book id {0} appears more than once")]
    DuplicateId(u64),
    #[error("no book ids left to assign")]
    IdSpaceExhausted,
    #[error("catalog changed in memory but could not be persisted")]
    Persistence(#[source] anyhow::Error),
}

/// State handed to the observer after each committed mutation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub revision: u64,
    pub books: Vec<Book>,
}

/// Post-commit hook. Called outside the catalog lock, once per mutation.
pub trait CatalogObserver: Send + Sync {
    fn on_mutation(&self, snapshot: &Snapshot) -> anyhow::Result<()>;
}

#[derive(Debug)]
struct CatalogState {
    books: Vec<Book>,
    // `None` once the highest possible id has been handed out.
    next_id: Option<u64>,
    revision: u64,
}

impl CatalogState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            revision: self.revision,
            books: self.books.clone(),
        }
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.books.iter().position(|book| book.id == id)
    }
}

pub struct Catalog {
    state: RwLock<CatalogState>,
    observer: Option<Arc<dyn CatalogObserver>>,
}

impl Catalog {
    /// Build a catalog from existing records. Ids must be unique; the next
    /// id continues after the highest one present.
    pub fn from_books(mut books: Vec<Book>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(books.len());
        for book in &mut books {
            if !seen.insert(book.id) {
                return Err(CatalogError::DuplicateId(book.id));
            }
            book.recompute_rating();
        }
        let next_id = match books.iter().map(|book| book.id).max() {
            Some(max) => max.checked_add(1),
            None => Some(1),
        };

        Ok(Self {
            state: RwLock::new(CatalogState {
                books,
                next_id,
                revision: 0,
            }),
            observer: None,
        })
    }

    pub fn empty() -> Self {
        Self {
            state: RwLock::new(CatalogState {
                books: Vec::new(),
                next_id: Some(1),
                revision: 0,
            }),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CatalogObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn list(&self) -> Vec<Book> {
        self.read().books.clone()
    }

    pub fn len(&self) -> usize {
        self.read().books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    pub fn get(&self, id: u64) -> Result<Book, CatalogError> {
        let state = self.read();
        state
            .position(id)
            .map(|index| state.books[index].clone())
            .ok_or(CatalogError::NotFound(id))
    }

    pub fn create(&self, draft: CreateBook) -> Result<Book, CatalogError> {
        let draft = validate_draft(draft)?;

        let (book, snapshot) = {
            let mut state = self.write();
            let id = state.next_id.ok_or(CatalogError::IdSpaceExhausted)?;
            state.next_id = id.checked_add(1);

            let mut book = Book {
                id,
                title: draft.title,
                author: draft.author,
                main_genre: draft.main_genre,
                price: draft.price,
                ratings: draft.rating.into_iter().collect(),
                rating: 0.0,
            };
            book.recompute_rating();
            state.books.push(book.clone());
            state.revision += 1;
            (book, state.snapshot())
        };

        tracing::info!(book_id = book.id, title = %book.title, "book created");
        self.commit(&snapshot)?;
        Ok(book)
    }

    pub fn delete(&self, id: u64) -> Result<(), CatalogError> {
        let snapshot = {
            let mut state = self.write();
            let index = state.position(id).ok_or(CatalogError::NotFound(id))?;
            // `remove` keeps the relative order of the remaining books.
            state.books.remove(index);
            state.revision += 1;
            state.snapshot()
        };

        tracing::info!(book_id = id, "book deleted");
        self.commit(&snapshot)
    }

    pub fn rate(&self, id: u64, value: f64) -> Result<Book, CatalogError> {
        if !is_valid_rating(value) {
            return Err(CatalogError::InvalidRating(value));
        }

        let (book, snapshot) = {
            let mut state = self.write();
            let index = state.position(id).ok_or(CatalogError::NotFound(id))?;
            let book = &mut state.books[index];
            book.ratings.push(value);
            book.recompute_rating();
            let book = book.clone();
            state.revision += 1;
            (book, state.snapshot())
        };

        tracing::info!(
            book_id = id,
            rating = value,
            average = book.rating,
            count = book.ratings.len(),
            "book rated"
        );
        self.commit(&snapshot)?;
        Ok(book)
    }

    /// Best-rated books within up to three genres, matched case-insensitively.
    pub fn recommend(&self, genres: &[String]) -> Result<Vec<Book>, CatalogError> {
        let mut wanted: Vec<String> = Vec::with_capacity(genres.len());
        for genre in genres {
            let genre = genre.trim().to_lowercase();
            if genre.is_empty() {
                return Err(CatalogError::InvalidInput {
                    field: "genres",
                    reason: "genre must not be blank",
                });
            }
            if !wanted.contains(&genre) {
                wanted.push(genre);
            }
        }
        if wanted.is_empty() || wanted.len() > MAX_RECOMMEND_GENRES {
            return Err(CatalogError::InvalidInput {
                field: "genres",
                reason: "between one and three genres are required",
            });
        }

        let mut matches: Vec<Book> = self
            .read()
            .books
            .iter()
            .filter(|book| wanted.contains(&book.main_genre.to_lowercase()))
            .cloned()
            .collect();

        matches.sort_by(|a, b| b.rating.total_cmp(&a.rating).then(a.id.cmp(&b.id)));
        matches.truncate(RECOMMENDATION_LIMIT);
        Ok(matches)
    }

    /// Re-send the current state to the observer, e.g. on shutdown after an
    /// earlier write failed.
    pub fn flush(&self) -> Result<(), CatalogError> {
        let snapshot = self.read().snapshot();
        self.commit(&snapshot)
    }

    fn commit(&self, snapshot: &Snapshot) -> Result<(), CatalogError> {
        let Some(observer) = &self.observer else {
            return Ok(());
        };

        observer.on_mutation(snapshot).map_err(|err| {
            tracing::error!(
                revision = snapshot.revision,
                error = ?err,
                "catalog mutation kept in memory but not persisted"
            );
            CatalogError::Persistence(err)
        })
    }

    // Writers never panic between partial updates, so poisoned state is
    // still whole.
    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn validate_draft(mut draft: CreateBook) -> Result<CreateBook, CatalogError> {
    draft.title = draft.title.trim().to_string();
    if draft.title.is_empty() {
        return Err(CatalogError::InvalidInput {
            field: "title",
            reason: "must not be blank",
        });
    }
    // Author and genre are optional and may stay empty.
    draft.author = draft.author.trim().to_string();
    draft.main_genre = draft.main_genre.trim().to_string();

    if let Some(price) = draft.price {
        if !price.is_finite() || price < 0.0 {
            return Err(CatalogError::InvalidInput {
                field: "price",
                reason: "must be a non-negative number",
            });
        }
    }

    if let Some(rating) = draft.rating {
        if !is_valid_rating(rating) {
            return Err(CatalogError::InvalidRating(rating));
        }
    }

    Ok(draft)
}
