//! The external hotel directory the matching engine draws candidates from.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use super::model::Hotel;
use crate::collaborators::CollaboratorError;
use crate::error::ConfigError;

#[async_trait]
pub trait HotelDirectory: Send + Sync {
    /// Hotels in `city` (and `state`, when given) with at least `min_rooms`
    /// rooms. Hotels with an unknown room count never qualify.
    async fn candidates(
        &self,
        city: &str,
        state: Option<&str>,
        min_rooms: u32,
    ) -> Result<Vec<Hotel>, CollaboratorError>;
}

fn same_place(a: &str, b: &str) -> bool {
    let squash = |s: &str| {
        s.chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect::<String>()
    };
    squash(a) == squash(b)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DirectoryFile {
    List(Vec<Hotel>),
    Wrapped { hotels: Vec<Hotel> },
}

/// In-memory directory loaded from a JSON file, either a bare array of
/// hotels or `{"hotels": [...]}`.
#[derive(Debug, Clone, Default)]
pub struct JsonHotelDirectory {
    hotels: Vec<Hotel>,
}

impl JsonHotelDirectory {
    pub fn new(hotels: Vec<Hotel>) -> Self {
        Self { hotels }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let fail = |reason: String| ConfigError::HotelDirectory {
            path: path.to_path_buf(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
        let file: DirectoryFile =
            serde_json::from_str(&content).map_err(|e| fail(e.to_string()))?;
        let hotels = match file {
            DirectoryFile::List(hotels) | DirectoryFile::Wrapped { hotels } => hotels,
        };
        log::info!("Loaded {} hotel(s) from {}", hotels.len(), path.display());
        Ok(Self { hotels })
    }

    pub fn len(&self) -> usize {
        self.hotels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotels.is_empty()
    }
}

#[async_trait]
impl HotelDirectory for JsonHotelDirectory {
    async fn candidates(
        &self,
        city: &str,
        state: Option<&str>,
        min_rooms: u32,
    ) -> Result<Vec<Hotel>, CollaboratorError> {
        Ok(self
            .hotels
            .iter()
            .filter(|h| same_place(&h.city, city))
            .filter(|h| match (state, h.state.as_deref()) {
                (Some(wanted), Some(actual)) => same_place(wanted, actual),
                _ => true,
            })
            .filter(|h| h.room_count.is_some_and(|rooms| rooms >= min_rooms))
            .cloned()
            .collect())
    }
}
