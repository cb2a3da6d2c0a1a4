//! Book catalogue

mod models;
mod repository;

pub use models::{Book, BookModel};
pub use repository::BookRepository;
