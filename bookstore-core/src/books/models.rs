use serde::{Deserialize, Serialize};

/// Stored book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Book as sent by clients. `id` is ignored on create and must match the
/// path on update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookModel {
    #[serde(default)]
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl BookModel {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: title.into(),
            description: description.into(),
        }
    }
}

impl From<Book> for BookModel {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            description: book.description,
        }
    }
}
