use serde::{Deserialize, Serialize};

/// Lowest and highest accepted rating, inclusive.
pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 5.0;

/// A catalog entry.
///
/// `rating` is always the mean of `ratings` (0 when unrated). It is only
/// ever written by [`Book::recompute_rating`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: u64,
    pub title: String,
    pub author: String,
    pub main_genre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default)]
    pub ratings: Vec<f64>,
    #[serde(default)]
    pub rating: f64,
}

impl Book {
    pub fn recompute_rating(&mut self) {
        self.rating = mean(&self.ratings);
    }
}

/// Arithmetic mean, or 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn is_valid_rating(value: f64) -> bool {
    (MIN_RATING..=MAX_RATING).contains(&value)
}

/// Request model for creating a new book.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateBook {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub main_genre: String,
    #[serde(default)]
    pub price: Option<f64>,
    /// Optional first rating recorded together with the book.
    #[serde(default)]
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateBook {
    pub rating: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommend {
    pub genres: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Removed {
    pub message: String,
}
