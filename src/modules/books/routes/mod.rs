//! HTTP handlers for the books module.
//!
//! Every route sits behind `require_token`; create and delete additionally
//! require the admin role. Mutations run on the blocking pool because the
//! post-commit hook may write the catalog file.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use shelf_authz::{authorize, require_token, AccessControl, Identity, Role};
use shelf_http::AppError;

use crate::modules::books::models::{Book, CreateBook, RateBook, Recommend, Removed};
use crate::modules::books::store::{Catalog, CatalogError};

pub fn router(catalog: Arc<Catalog>, access: AccessControl) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/recommend", post(recommend_books))
        .route("/{id}", get(get_book).delete(delete_book))
        .route("/{id}/ratings", post(rate_book))
        .route_layer(middleware::from_fn_with_state(access, require_token))
        .with_state(catalog)
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => AppError::not_found(format!("book {id} not found")),
            CatalogError::InvalidRating(value) => AppError::validation(
                vec![json!({"field": "rating", "error": "must be between 1 and 5"})],
                format!("invalid rating {value}"),
            ),
            CatalogError::InvalidInput { field, reason } => AppError::validation(
                vec![json!({"field": field, "error": reason})],
                format!("invalid {field}"),
            ),
            err @ (CatalogError::DuplicateId(_)
            | CatalogError::IdSpaceExhausted
            | CatalogError::Persistence(_)) => {
                AppError::Internal(anyhow::Error::new(err))
            }
        }
    }
}

async fn list_books(State(catalog): State<Arc<Catalog>>) -> Json<Vec<Book>> {
    Json(catalog.list())
}

async fn get_book(
    State(catalog): State<Arc<Catalog>>,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(catalog.get(id)?))
}

async fn create_book(
    identity: Identity,
    State(catalog): State<Arc<Catalog>>,
    payload: Result<Json<CreateBook>, JsonRejection>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    authorize(&identity, Role::Admin)?;
    let draft = body(payload)?;

    let book = blocking(move || catalog.create(draft)).await?;
    tracing::info!(user_id = %identity.user_id, book_id = book.id, "create book request served");
    Ok((StatusCode::CREATED, Json(book)))
}

async fn delete_book(
    identity: Identity,
    State(catalog): State<Arc<Catalog>>,
    Path(id): Path<String>,
) -> Result<Json<Removed>, AppError> {
    authorize(&identity, Role::Admin)?;
    let id = parse_id(&id)?;

    blocking(move || catalog.delete(id)).await?;
    Ok(Json(Removed {
        message: format!("book {id} removed"),
    }))
}

async fn rate_book(
    State(catalog): State<Arc<Catalog>>,
    Path(id): Path<String>,
    payload: Result<Json<RateBook>, JsonRejection>,
) -> Result<Json<Book>, AppError> {
    let id = parse_id(&id)?;
    let RateBook { rating } = body(payload)?;

    let book = blocking(move || catalog.rate(id, rating)).await?;
    Ok(Json(book))
}

async fn recommend_books(
    State(catalog): State<Arc<Catalog>>,
    payload: Result<Json<Recommend>, JsonRejection>,
) -> Result<Json<Vec<Book>>, AppError> {
    let Recommend { genres } = body(payload)?;
    Ok(Json(catalog.recommend(&genres)?))
}

fn parse_id(raw: &str) -> Result<u64, AppError> {
    raw.parse::<u64>()
        .map_err(|_| AppError::bad_request(format!("invalid book id '{raw}'")))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(AppError::bad_request(rejection.body_text())),
    }
}

async fn blocking<T, F>(operation: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, CatalogError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|err| AppError::Internal(anyhow::Error::new(err).context("catalog task failed")))?
        .map_err(AppError::from)
}
