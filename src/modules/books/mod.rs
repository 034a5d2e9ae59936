pub mod models;
pub mod persistence;
pub mod routes;
pub mod store;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};
use shelf_authz::AccessControl;
use shelf_kernel::{settings::CatalogSettings, InitCtx, Module};

use models::Book;
use persistence::CsvCatalogFile;
use store::Catalog;

/// Book catalog: listing, lookup, admin-only create/delete, ratings and
/// genre recommendations.
pub struct BooksModule {
    catalog: Arc<Catalog>,
    access: AccessControl,
}

impl BooksModule {
    pub fn new(catalog: Arc<Catalog>, access: AccessControl) -> Self {
        Self { catalog, access }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            books = self.catalog.len(),
            data_file = ?ctx.settings.catalog.data_file,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.catalog.clone(), self.access.clone())
    }

    fn openapi(&self) -> Option<Value> {
        Some(openapi_fragment())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let catalog = self.catalog.clone();
        tokio::task::spawn_blocking(move || catalog.flush())
            .await
            .context("catalog flush task failed")?
            .context("failed to flush catalog on shutdown")?;

        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Build the catalog described by `settings`.
///
/// Without a data file the catalog starts from the built-in seed and lives
/// in memory only. With one, an existing file is loaded; a missing file is
/// created from the seed.
pub fn open_catalog(settings: &CatalogSettings) -> anyhow::Result<Catalog> {
    let Some(path) = &settings.data_file else {
        tracing::info!("no catalog data file configured; using in-memory seed catalog");
        return Ok(Catalog::from_books(seed_books())?);
    };

    let file = Arc::new(CsvCatalogFile::new(path));
    let books = if file.exists() {
        file.load()
            .with_context(|| format!("failed to load catalog from {}", path.display()))?
    } else {
        tracing::warn!(path = %path.display(), "catalog data file not found; starting from seed");
        let seed = seed_books();
        file.save(&seed)
            .with_context(|| format!("failed to create {}", path.display()))?;
        seed
    };

    let catalog = Catalog::from_books(books)
        .with_context(|| format!("invalid catalog data in {}", path.display()))?;
    Ok(catalog.with_observer(file))
}

pub fn create_module(
    settings: &CatalogSettings,
    access: AccessControl,
) -> anyhow::Result<Arc<dyn Module>> {
    let catalog = open_catalog(settings)?;
    Ok(Arc::new(BooksModule::new(Arc::new(catalog), access)))
}

fn seed_books() -> Vec<Book> {
    let seed = [
        (1, "Dom Casmurro", "Machado de Assis", "Fiction", 4.6),
        (2, "The Rust Programming Language", "Steve Klabnik", "Engineering", 4.7),
        (3, "Steve Jobs", "Walter Isaacson", "Biographies", 4.5),
        (4, "The Prince", "Niccolo Machiavelli", "Politics", 4.3),
    ];

    seed.into_iter()
        .map(|(id, title, author, main_genre, rating)| {
            let mut book = Book {
                id,
                title: title.to_string(),
                author: author.to_string(),
                main_genre: main_genre.to_string(),
                price: None,
                ratings: vec![rating],
                rating: 0.0,
            };
            book.recompute_rating();
            book
        })
        .collect()
}

fn openapi_fragment() -> Value {
    let error = |description: &str| {
        json!({
            "description": description,
            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ErrorResponse"}}}
        })
    };
    let book = json!({"$ref": "#/components/schemas/Book"});
    let books = json!({"type": "array", "items": {"$ref": "#/components/schemas/Book"}});
    let id_param = json!([{
        "name": "id",
        "in": "path",
        "required": true,
        "schema": {"type": "integer", "format": "int64"}
    }]);
    let secured = json!([{"bearerAuth": []}]);

    json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books",
                    "tags": ["Books"],
                    "security": secured,
                    "responses": {
                        "200": {"description": "Every book in the catalog", "content": {"application/json": {"schema": books}}},
                        "401": error("Missing or invalid token")
                    }
                },
                "post": {
                    "summary": "Create a book (admin)",
                    "tags": ["Books"],
                    "security": secured,
                    "requestBody": {
                        "required": true,
                        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/CreateBook"}}}
                    },
                    "responses": {
                        "201": {"description": "Book created", "content": {"application/json": {"schema": book}}},
                        "401": error("Missing or invalid token"),
                        "403": error("Caller is not an admin"),
                        "422": error("Invalid book data")
                    }
                }
            },
            "/{id}": {
                "get": {
                    "summary": "Get a book by id",
                    "tags": ["Books"],
                    "security": secured,
                    "parameters": id_param,
                    "responses": {
                        "200": {"description": "The book", "content": {"application/json": {"schema": book}}},
                        "400": error("Malformed id"),
                        "404": error("No book with this id")
                    }
                },
                "delete": {
                    "summary": "Delete a book (admin)",
                    "tags": ["Books"],
                    "security": secured,
                    "parameters": id_param,
                    "responses": {
                        "200": {"description": "Book removed"},
                        "403": error("Caller is not an admin"),
                        "404": error("No book with this id")
                    }
                }
            },
            "/{id}/ratings": {
                "post": {
                    "summary": "Rate a book",
                    "tags": ["Books"],
                    "security": secured,
                    "parameters": id_param,
                    "requestBody": {
                        "required": true,
                        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/RateBook"}}}
                    },
                    "responses": {
                        "200": {"description": "Book with the updated mean rating", "content": {"application/json": {"schema": book}}},
                        "404": error("No book with this id"),
                        "422": error("Rating outside 1..=5")
                    }
                }
            },
            "/recommend": {
                "post": {
                    "summary": "Best-rated books in up to three genres",
                    "tags": ["Books"],
                    "security": secured,
                    "requestBody": {
                        "required": true,
                        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Recommend"}}}
                    },
                    "responses": {
                        "200": {"description": "Matching books", "content": {"application/json": {"schema": books}}},
                        "422": error("Between one and three genres are required")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Book": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer", "format": "int64"},
                        "title": {"type": "string"},
                        "author": {"type": "string"},
                        "main_genre": {"type": "string"},
                        "price": {"type": "number"},
                        "ratings": {"type": "array", "items": {"type": "number"}},
                        "rating": {"type": "number", "description": "Mean of ratings, 0 when unrated"}
                    },
                    "required": ["id", "title", "author", "main_genre", "ratings", "rating"]
                },
                "CreateBook": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "author": {"type": "string"},
                        "main_genre": {"type": "string"},
                        "price": {"type": "number"},
                        "rating": {"type": "number", "minimum": 1, "maximum": 5}
                    },
                    "required": ["title"]
                },
                "RateBook": {
                    "type": "object",
                    "properties": {"rating": {"type": "number", "minimum": 1, "maximum": 5}},
                    "required": ["rating"]
                },
                "Recommend": {
                    "type": "object",
                    "properties": {
                        "genres": {"type": "array", "items": {"type": "string"}, "minItems": 1, "maxItems": 3}
                    },
                    "required": ["genres"]
                }
            }
        }
    })
}
