use std::sync::Arc;
use tracing::{info, instrument};

use super::models::{Book, BookModel};
use crate::error::{Result, ServiceError};
use crate::store::BookStore;

/// CRUD over books on top of a [`BookStore`].
#[derive(Clone)]
pub struct BookRepository {
    store: Arc<dyn BookStore>,
}

impl BookRepository {
    pub fn new(store: Arc<dyn BookStore>) -> Self {
        Self { store }
    }

    fn validate(model: &BookModel) -> Result<()> {
        if model.title.trim().is_empty() {
            return Err(ServiceError::invalid("title", "title is required"));
        }
        Ok(())
    }

    /// Returns the new book id.
    #[instrument(skip(self, model))]
    pub async fn add_book(&self, model: BookModel) -> Result<u64> {
        Self::validate(&model)?;
        let book = self.store.insert_book(model).await?;
        info!(book_id = book.id, "added book");
        Ok(book.id)
    }

    pub async fn get_all_books(&self) -> Result<Vec<BookModel>> {
        let books = self.store.list_books().await?;
        Ok(books.into_iter().map(BookModel::from).collect())
    }

    pub async fn get_book(&self, id: u64) -> Result<Option<BookModel>> {
        Ok(self.store.find_book(id).await?.map(BookModel::from))
    }

    #[instrument(skip(self, model))]
    pub async fn update_book(&self, id: u64, model: BookModel) -> Result<()> {
        if id != model.id {
            return Err(ServiceError::invalid("id", "id does not match the book"));
        }
        Self::validate(&model)?;
        self.store
            .update_book(Book {
                id,
                title: model.title,
                description: model.description,
            })
            .await?;
        info!(book_id = id, "updated book");
        Ok(())
    }

    /// Deleting an unknown id is not an error.
    #[instrument(skip(self))]
    pub async fn delete_book(&self, id: u64) -> Result<()> {
        if self.store.delete_book(id).await? {
            info!(book_id = id, "deleted book");
        }
        Ok(())
    }
}
