use async_trait::async_trait;

use crate::{
    db::{connection::Database, live::NightsStream, models::SessionRecord},
    error::Result,
};

/// Store operations the session coordinator depends on.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Appends a night; the store assigns and returns its id.
    async fn insert(&self, record: &SessionRecord) -> Result<i64>;

    /// Overwrites the row with `record.id`. Fails with `NotFound` if there is none.
    async fn update(&self, record: &SessionRecord) -> Result<()>;

    async fn get(&self, night_id: i64) -> Result<Option<SessionRecord>>;

    async fn clear(&self) -> Result<()>;

    /// Live query over every night, newest first.
    async fn get_all_nights(&self) -> Result<NightsStream>;

    /// The night with the highest id, whether or not it is still open.
    async fn get_tonight(&self) -> Result<Option<SessionRecord>>;
}

#[async_trait]
impl SessionStore for Database {
    async fn insert(&self, record: &SessionRecord) -> Result<i64> {
        Ok(self.insert_night(record).await?)
    }

    async fn update(&self, record: &SessionRecord) -> Result<()> {
        Ok(self.update_night(record).await?)
    }

    async fn get(&self, night_id: i64) -> Result<Option<SessionRecord>> {
        Ok(self.get_night(night_id).await?)
    }

    async fn clear(&self) -> Result<()> {
        Ok(self.clear_nights().await?)
    }

    async fn get_all_nights(&self) -> Result<NightsStream> {
        Ok(self.subscribe_nights().await?)
    }

    async fn get_tonight(&self) -> Result<Option<SessionRecord>> {
        Ok(Database::get_tonight(self).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn trait_surface_maps_missing_rows_to_not_found() {
        let db = Database::in_memory().unwrap();
        let store: &dyn SessionStore = &db;

        let id = store.insert(&SessionRecord::begin(10)).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().map(|n| n.id), Some(id));

        let missing = SessionRecord {
            id: id + 1,
            ..SessionRecord::begin(10)
        };
        assert!(matches!(
            store.update(&missing).await,
            Err(Error::NotFound(n)) if n == id + 1
        ));

        store.clear().await.unwrap();
        assert_eq!(store.get_tonight().await.unwrap(), None);
    }
}
