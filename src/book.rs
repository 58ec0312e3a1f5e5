//! Book listings, the draft builder used to create them and the partial
//! update set owners apply to them.
use chrono::Utc;

use crate::config::{MAX_AUTHOR_LEN, MAX_BOOK_DESCRIPTION_LEN, MAX_TITLE_LEN};
use crate::error::{MarketError, MarketResult};
use crate::types::{BookId, Condition, Genre, TimeStamp, UserId};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Book {
    #[n(0)]
    pub id: BookId,
    #[n(1)]
    pub title: String,
    #[n(2)]
    pub author: String,
    #[n(3)]
    pub isbn: Option<String>,
    #[n(4)]
    pub genre: Genre,
    #[n(5)]
    pub condition: Condition,
    #[n(6)]
    pub description: String,
    #[n(7)]
    pub cover_image: String,
    #[n(8)]
    pub owner: UserId,
    #[n(9)]
    pub is_available: bool,
    #[n(10)]
    pub looking_for: Vec<String>,
    #[n(11)]
    pub views: u64,
    #[n(12)]
    pub created_at: TimeStamp<Utc>,
    #[n(13)]
    pub updated_at: TimeStamp<Utc>,
}

impl Book {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner == user
    }

    pub fn matches(&self, query: &BookQuery) -> bool {
        self.is_available
            && query.genre.is_none_or(|g| g == self.genre)
            && query.condition.is_none_or(|c| c == self.condition)
    }
}

// Used for constructing new listings. Nothing is stored until the draft is
// finalised against an owner.
#[derive(Debug, Default, Clone)]
pub struct BookDraft {
    title: Option<String>,
    author: Option<String>,
    isbn: Option<String>,
    genre: Option<Genre>,
    condition: Option<Condition>,
    description: String,
    cover_image: String,
    looking_for: Vec<String>,
}

impl BookDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
    pub fn set_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
    pub fn set_isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }
    pub fn set_genre(mut self, genre: Genre) -> Self {
        self.genre = Some(genre);
        self
    }
    pub fn set_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
    pub fn set_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
    pub fn set_cover_image(mut self, cover_image: impl Into<String>) -> Self {
        self.cover_image = cover_image.into();
        self
    }
    pub fn add_looking_for(mut self, wanted: impl Into<String>) -> Self {
        self.looking_for.push(wanted.into());
        self
    }

    /// Checks required fields and text limits, then produces an available,
    /// unviewed listing owned by `owner`.
    pub fn validate_and_finalise(self, id: BookId, owner: UserId) -> MarketResult<Book> {
        let title = required_text("title", self.title, MAX_TITLE_LEN)?;
        let author = required_text("author", self.author, MAX_AUTHOR_LEN)?;
        let genre = self
            .genre
            .ok_or_else(|| MarketError::Validation("genre is required".into()))?;
        let condition = self
            .condition
            .ok_or_else(|| MarketError::Validation("condition is required".into()))?;
        check_len("description", &self.description, MAX_BOOK_DESCRIPTION_LEN)?;

        let now = TimeStamp::new();
        Ok(Book {
            id,
            title,
            author,
            isbn: normalise_isbn(self.isbn),
            genre,
            condition,
            description: self.description,
            cover_image: self.cover_image,
            owner,
            is_available: true,
            looking_for: self.looking_for,
            views: 0,
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

/// A partial edit. Fields left as `None` keep their current value.
#[derive(Debug, Default, Clone)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub genre: Option<Genre>,
    pub condition: Option<Condition>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub looking_for: Option<Vec<String>>,
    pub is_available: Option<bool>,
}

impl BookUpdate {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
    pub fn isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }
    pub fn genre(mut self, genre: Genre) -> Self {
        self.genre = Some(genre);
        self
    }
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
    pub fn cover_image(mut self, cover_image: impl Into<String>) -> Self {
        self.cover_image = Some(cover_image.into());
        self
    }
    pub fn looking_for(mut self, wanted: Vec<String>) -> Self {
        self.looking_for = Some(wanted);
        self
    }
    pub fn available(mut self, is_available: bool) -> Self {
        self.is_available = Some(is_available);
        self
    }

    /// Validate every supplied field, then write them onto `book`. On error
    /// the book is left untouched.
    pub fn apply(self, book: &mut Book) -> MarketResult<()> {
        let title = self
            .title
            .map(|t| required_text("title", Some(t), MAX_TITLE_LEN))
            .transpose()?;
        let author = self
            .author
            .map(|a| required_text("author", Some(a), MAX_AUTHOR_LEN))
            .transpose()?;
        if let Some(description) = &self.description {
            check_len("description", description, MAX_BOOK_DESCRIPTION_LEN)?;
        }

        if let Some(title) = title {
            book.title = title;
        }
        if let Some(author) = author {
            book.author = author;
        }
        if self.isbn.is_some() {
            book.isbn = normalise_isbn(self.isbn);
        }
        if let Some(genre) = self.genre {
            book.genre = genre;
        }
        if let Some(condition) = self.condition {
            book.condition = condition;
        }
        if let Some(description) = self.description {
            book.description = description;
        }
        if let Some(cover_image) = self.cover_image {
            book.cover_image = cover_image;
        }
        if let Some(looking_for) = self.looking_for {
            book.looking_for = looking_for;
        }
        if let Some(is_available) = self.is_available {
            book.is_available = is_available;
        }
        book.updated_at = TimeStamp::new();
        Ok(())
    }
}

/// Filters for browsing available listings. `page` is 1-based.
#[derive(Debug, Clone)]
pub struct BookQuery {
    pub genre: Option<Genre>,
    pub condition: Option<Condition>,
    pub page: usize,
    pub limit: Option<usize>,
}

impl Default for BookQuery {
    fn default() -> Self {
        Self {
            genre: None,
            condition: None,
            page: 1,
            limit: None,
        }
    }
}

impl BookQuery {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn genre(mut self, genre: Genre) -> Self {
        self.genre = Some(genre);
        self
    }
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
    pub fn page(mut self, page: usize) -> Self {
        self.page = page.max(1);
        self
    }
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone)]
pub struct BookPage {
    pub books: Vec<Book>,
    pub page: usize,
    pub pages: usize,
    pub total: usize,
}

fn required_text(field: &str, value: Option<String>, max: usize) -> MarketResult<String> {
    let value = value.map(|v| v.trim().to_owned()).unwrap_or_default();
    if value.is_empty() {
        return Err(MarketError::Validation(format!("{field} is required")));
    }
    check_len(field, &value, max)?;
    Ok(value)
}

fn check_len(field: &str, value: &str, max: usize) -> MarketResult<()> {
    if value.chars().count() > max {
        return Err(MarketError::Validation(format!(
            "{field} cannot exceed {max} characters"
        )));
    }
    Ok(())
}

fn normalise_isbn(isbn: Option<String>) -> Option<String> {
    isbn.map(|i| i.trim().to_owned()).filter(|i| !i.is_empty())
}
