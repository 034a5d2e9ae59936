//! CSV file backing for the catalog.
//!
//! Layout is `ID,Title,Author,Main Genre,Rating` with one header row. The
//! file stores only the mean rating, so a reloaded book carries a single
//! rating equal to the stored mean (or none when the mean is 0). Price is
//! not part of the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tempfile::NamedTempFile;

use crate::modules::books::models::{is_valid_rating, Book};
use crate::modules::books::store::{CatalogObserver, Snapshot};

const HEADER: [&str; 5] = ["ID", "Title", "Author", "Main Genre", "Rating"];

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: {reason}")]
    InvalidRow { line: u64, reason: String },
}

/// Catalog file on disk, also acting as the catalog's post-commit observer.
#[derive(Debug)]
pub struct CsvCatalogFile {
    path: PathBuf,
    // Highest revision already on disk; older snapshots arriving late are
    // dropped instead of overwriting newer data.
    last_written: Mutex<Option<u64>>,
}

impl CsvCatalogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_written: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read every row. Column order is fixed; the header row is skipped.
    pub fn load(&self) -> Result<Vec<Book>, PersistenceError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let mut books = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |pos| pos.line());
            books.push(parse_row(&record, line)?);
        }

        tracing::info!(path = %self.path.display(), books = books.len(), "catalog loaded");
        Ok(books)
    }

    /// Replace the file with `books`. Written to a sibling temp file first
    /// and renamed into place.
    pub fn save(&self, books: &[Book]) -> Result<(), PersistenceError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|source| self.io_error(source))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|source| self.io_error(source))?;
        {
            let mut writer = csv::Writer::from_writer(&mut tmp);
            writer.write_record(HEADER)?;
            for book in books {
                writer.write_record([
                    book.id.to_string(),
                    book.title.clone(),
                    book.author.clone(),
                    book.main_genre.clone(),
                    format!("{:.1}", book.rating),
                ])?;
            }
            writer.flush().map_err(|source| self.io_error(source))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|source| self.io_error(source))?;
        tmp.persist(&self.path)
            .map_err(|err| self.io_error(err.error))?;

        tracing::debug!(path = %self.path.display(), books = books.len(), "catalog saved");
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CatalogObserver for CsvCatalogFile {
    fn on_mutation(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let mut last_written = self
            .last_written
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if matches!(*last_written, Some(last) if snapshot.revision <= last) {
            tracing::debug!(
                revision = snapshot.revision,
                "skipping stale catalog snapshot"
            );
            return Ok(());
        }

        self.save(&snapshot.books)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        *last_written = Some(snapshot.revision);
        Ok(())
    }
}

fn parse_row(record: &csv::StringRecord, line: u64) -> Result<Book, PersistenceError> {
    let invalid = |reason: String| PersistenceError::InvalidRow { line, reason };

    if record.len() != HEADER.len() {
        return Err(invalid(format!(
            "expected {} columns, found {}",
            HEADER.len(),
            record.len()
        )));
    }

    let id = record[0]
        .parse::<u64>()
        .map_err(|err| invalid(format!("invalid id '{}': {err}", &record[0])))?;
    let rating = record[4]
        .parse::<f64>()
        .map_err(|err| invalid(format!("invalid rating '{}': {err}", &record[4])))?;

    let ratings = if rating == 0.0 {
        Vec::new()
    } else if is_valid_rating(rating) {
        vec![rating]
    } else {
        return Err(invalid(format!("rating {rating} is outside 1..=5")));
    };

    let mut book = Book {
        id,
        title: record[1].to_string(),
        author: record[2].to_string(),
        main_genre: record[3].to_string(),
        price: None,
        ratings,
        rating: 0.0,
    };
    book.recompute_rating();
    Ok(book)
}
