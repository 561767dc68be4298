//! The album collection, owned by one `AlbumStore` and shared via `Arc`.

use tokio::sync::RwLock;

use crate::model::Album;

/// Albums present when the service starts.
pub fn seed_albums() -> Vec<Album> {
    vec![
        Album::new(1, "Blue Train", "John Coltrane", 56.99),
        Album::new(2, "Jeru", "Gerry Mulligan", 17.99),
        Album::new(3, "Sarah Vaughan and Clifford Brown", "Sarah Vaughan", 39.99),
    ]
}

/// In-memory, insertion-ordered album collection.
pub struct AlbumStore {
    albums: RwLock<Vec<Album>>,
}

impl AlbumStore {
    pub fn new(albums: Vec<Album>) -> Self {
        Self {
            albums: RwLock::new(albums),
        }
    }

    pub async fn list(&self) -> Vec<Album> {
        self.albums.read().await.clone()
    }

    /// First album with a matching id.
    pub async fn get(&self, id: i64) -> Option<Album> {
        self.albums.read().await.iter().find(|a| a.id == id).cloned()
    }

    /// Append without an id uniqueness check.
    pub async fn append(&self, album: Album) -> usize {
        let mut albums = self.albums.write().await;
        albums.push(album);
        albums.len()
    }
}

impl Default for AlbumStore {
    fn default() -> Self {
        Self::new(seed_albums())
    }
}
