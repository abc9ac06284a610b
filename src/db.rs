use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Collection, IndexModel};

use crate::config::Database;
use crate::error::{Error, Result};
use crate::job::JobRecord;
use crate::store::{Guard, JobQuery, JobStore, Patch};

/// Jobs collection of the execution engine's MongoDB database.
pub struct MongoStore {
    collection: Collection<JobRecord>,
}

impl MongoStore {
    pub async fn connect(config: &Database) -> Result<MongoStore> {
        let client_options = ClientOptions::parse(config.connection_string()).await?;
        let client = Client::with_options(client_options)?;
        client
            .database("admin")
            .run_command(doc! {"ping": 1}, None)
            .await?;

        let collection = client
            .database(&config.name)
            .collection::<JobRecord>(&config.collection);

        tracing::info!(
            database = %config.name,
            collection = %config.collection,
            "Connected to job store"
        );
        Ok(MongoStore { collection })
    }

    /// Indexes backing the listing sort, with and without a name filter.
    /// Missing indexes only cost speed, so failure is logged and ignored.
    pub async fn ensure_indexes(&self) {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! {"nextRunAt": -1, "lastRunAt": -1, "lastFinishedAt": -1})
                .build(),
            IndexModel::builder()
                .keys(doc! {"name": 1, "nextRunAt": -1, "lastRunAt": -1, "lastFinishedAt": -1})
                .build(),
        ];

        if let Err(err) = self.collection.create_indexes(indexes, None).await {
            tracing::warn!(error = %err, "Job indexes might not exist, listing may be slow");
        }
    }
}

fn ids_filter(ids: &[ObjectId]) -> Document {
    let ids: Vec<Bson> = ids.iter().map(|id| Bson::ObjectId(*id)).collect();
    doc! {"_id": {"$in": ids}}
}

/// `null` matches both a missing field and an explicit null.
pub(crate) fn guard_filter(ids: &[ObjectId], guard: Guard) -> Document {
    let mut filter = ids_filter(ids);
    match guard {
        Guard::Unlocked => filter.insert("lockedAt", Bson::Null),
        Guard::Locked => filter.insert("lockedAt", doc! {"$ne": Bson::Null}),
        Guard::Disabled => filter.insert("disabled", doc! {"$ne": Bson::Null}),
        Guard::Enabled => filter.insert("disabled", Bson::Null),
    };
    filter
}

pub(crate) fn patch_update(patch: Patch) -> Document {
    match patch {
        Patch::RunAt(at) => doc! {"$set": {"nextRunAt": at}},
        Patch::ClearLock => doc! {"$unset": {"lockedAt": ""}},
        Patch::ClearDisabled => doc! {"$unset": {"disabled": ""}},
        Patch::Disable => doc! {"$set": {"disabled": true}},
    }
}

#[async_trait]
impl JobStore for MongoStore {
    /// Loads every matching document, `data` included, since the listing
    /// returns it and status counts are grouped in process. One dashboard
    /// poll issues exactly one of these, so its cost grows with the size of
    /// the collection.
    async fn query(&self, query: &JobQuery) -> Result<Vec<JobRecord>> {
        let filter = match &query.name {
            Some(name) => doc! {"name": name.as_str()},
            None => doc! {},
        };
        let options = FindOptions::builder()
            .sort(doc! {"nextRunAt": 1, "lastFinishedAt": 1, "lastRunAt": 1})
            .build();

        let cursor = self.collection.find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find(&self, ids: &[ObjectId]) -> Result<Vec<JobRecord>> {
        let cursor = self.collection.find(ids_filter(ids), None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_guarded(&self, ids: &[ObjectId], guard: Guard, patch: Patch) -> Result<u64> {
        // Matched rather than modified: a second run within the same
        // millisecond rewrites an identical nextRunAt and modifies nothing.
        let result = self
            .collection
            .update_many(guard_filter(ids, guard), patch_update(patch), None)
            .await?;
        Ok(result.matched_count)
    }

    async fn delete(&self, ids: &[ObjectId]) -> Result<u64> {
        let result = self.collection.delete_many(ids_filter(ids), None).await?;
        Ok(result.deleted_count)
    }

    async fn insert(&self, job: JobRecord) -> Result<ObjectId> {
        let result = self.collection.insert_one(&job, None).await?;
        match result.inserted_id {
            Bson::ObjectId(id) => Ok(id),
            other => Err(Error::Store(format!("unexpected inserted id {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::DateTime;

    #[test]
    fn guard_is_part_of_the_match_clause() {
        let id = ObjectId::new();
        let filter = guard_filter(&[id], Guard::Unlocked);
        assert_eq!(filter.get("lockedAt"), Some(&Bson::Null));
        assert_eq!(
            filter.get_document("_id").unwrap().get_array("$in").unwrap(),
            &vec![Bson::ObjectId(id)]
        );

        let filter = guard_filter(&[id], Guard::Disabled);
        assert_eq!(
            filter.get_document("disabled").unwrap(),
            &doc! {"$ne": Bson::Null}
        );
    }

    #[test]
    fn patches_only_touch_dashboard_owned_fields() {
        let at = DateTime::from_millis(42);
        assert_eq!(patch_update(Patch::RunAt(at)), doc! {"$set": {"nextRunAt": at}});
        assert_eq!(patch_update(Patch::ClearLock), doc! {"$unset": {"lockedAt": ""}});
        assert_eq!(patch_update(Patch::Disable), doc! {"$set": {"disabled": true}});
    }
}
