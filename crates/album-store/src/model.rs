//! Album wire types and binding validation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub price: f64,
}

impl Album {
    pub fn new(id: i64, title: &str, artist: &str, price: f64) -> Self {
        Self {
            id,
            title: title.to_string(),
            artist: artist.to_string(),
            price,
        }
    }
}

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingError {
    pub field: String,
    pub message: String,
}

/// The `{"message": ..., "errors": [...]}` error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BindingError>,
}

const REQUIRED: &str = "required field";
const BELOW_MINIMUM: &str = "below minimum value";

const MIN_ID: i64 = 1;
const MIN_TEXT_LEN: usize = 2;
const MIN_PRICE: f64 = 0.0;

/// Posted album before validation. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct AlbumInput {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub price: Option<f64>,
}

impl AlbumInput {
    /// Validate every field, reporting failures in id, title, artist, price order.
    pub fn validate(self) -> Result<Album, Vec<BindingError>> {
        let mut errors = Vec::new();
        let mut fail = |field: &str, message: &str| {
            errors.push(BindingError {
                field: field.to_string(),
                message: message.to_string(),
            })
        };

        match self.id {
            None => fail("id", REQUIRED),
            Some(id) if id < MIN_ID => fail("id", BELOW_MINIMUM),
            Some(_) => {}
        }
        for (field, value) in [("title", &self.title), ("artist", &self.artist)] {
            match value {
                None => fail(field, REQUIRED),
                Some(s) if s.is_empty() => fail(field, REQUIRED),
                Some(s) if s.chars().count() < MIN_TEXT_LEN => fail(field, BELOW_MINIMUM),
                Some(_) => {}
            }
        }
        match self.price {
            None => fail("price", REQUIRED),
            Some(p) if p < MIN_PRICE => fail("price", BELOW_MINIMUM),
            Some(_) => {}
        }

        match (self.id, self.title, self.artist, self.price) {
            (Some(id), Some(title), Some(artist), Some(price)) if errors.is_empty() => Ok(Album {
                id,
                title,
                artist,
                price,
            }),
            _ => Err(errors),
        }
    }
}
