//! Generic CRUD over [`Record`] types

use sqlx::{
    Any, AnyPool, Row,
    any::{AnyArguments, AnyRow},
    query::Query,
};
use tracing::{debug, error, warn};

use super::{
    Record, RecordState,
    query::{self, Criteria, Direction, Statement},
    value::{self, Value, bind_value},
};
use crate::error::{RecordError, StoreError, StoreResult};

/// Outcome of [`RecordStore::save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saved {
    Inserted,
    Updated,
    /// Nothing was dirty; no statement was issued
    Unchanged,
}

/// Record persistence over an injected connection pool
#[derive(Clone)]
pub struct RecordStore {
    pool: AnyPool,
}

fn build(statement: &Statement) -> Query<'_, Any, AnyArguments<'_>> {
    statement
        .params
        .iter()
        .cloned()
        .fold(sqlx::query::<Any>(&statement.sql), bind_value)
}

fn failed(operation: &'static str, table: &'static str, source: sqlx::Error) -> StoreError {
    let error = StoreError::from_sqlx(operation, source);
    match &error {
        StoreError::UniqueViolation { .. } => warn!("{}::{} rejected: {}", table, operation, error),
        _ => error!("{}::{} failed: {}", table, operation, error),
    }
    error
}

fn hydrate<R: Record>(operation: &'static str, row: &AnyRow) -> StoreResult<R> {
    R::from_row(row).map_err(|e| failed(operation, R::TABLE, e))
}

impl RecordStore {
    /// Create a new record store
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Fetch one record by primary key
    pub async fn find<R: Record>(&self, id: i64) -> StoreResult<Option<R>> {
        self.find_by(&Criteria::new().eq(R::PRIMARY_KEY, id)).await
    }

    /// Fetch one record by primary key; a missing row is an error
    pub async fn find_or_fail<R: Record>(&self, id: i64) -> StoreResult<R> {
        self.find(id)
            .await?
            .ok_or(StoreError::NotFound { table: R::TABLE, id })
    }

    /// Fetch the first record matching every criterion
    pub async fn find_by<R: Record>(&self, criteria: &Criteria) -> StoreResult<Option<R>> {
        let statement = query::select(R::TABLE, criteria, &[], Some(1), 0)?;
        debug!("{}", statement.sql);

        let row = build(&statement)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| failed("find_by", R::TABLE, e))?;

        row.map(|row| hydrate("find_by", &row)).transpose()
    }

    /// Fetch every record, ordered and paginated
    pub async fn all<R: Record>(
        &self,
        order_by: &[(String, Direction)],
        limit: Option<u32>,
        offset: u32,
    ) -> StoreResult<Vec<R>> {
        self.fetch_where(&Criteria::new(), order_by, limit, offset)
            .await
    }

    /// Fetch the records matching every criterion, ordered and paginated
    pub async fn fetch_where<R: Record>(
        &self,
        criteria: &Criteria,
        order_by: &[(String, Direction)],
        limit: Option<u32>,
        offset: u32,
    ) -> StoreResult<Vec<R>> {
        let statement = query::select(R::TABLE, criteria, order_by, limit, offset)?;
        debug!("{}", statement.sql);

        let rows = build(&statement)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| failed("fetch", R::TABLE, e))?;

        rows.iter().map(|row| hydrate("fetch", row)).collect()
    }

    /// Count the rows matching every criterion
    pub async fn count<R: Record>(&self, criteria: &Criteria) -> StoreResult<i64> {
        let statement = query::count(R::TABLE, criteria)?;
        debug!("{}", statement.sql);

        let row = build(&statement)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| failed("count", R::TABLE, e))?;

        row.try_get::<i64, _>("total")
            .map_err(|e| failed("count", R::TABLE, e))
    }

    /// Insert a new record or write back the dirty columns of a persisted one
    pub async fn save<R: Record>(&self, record: &mut R) -> StoreResult<Saved> {
        match record.meta().state {
            RecordState::Deleted => Err(RecordError::Deleted(R::TABLE).into()),
            RecordState::New => self.insert(record).await.map(|_| Saved::Inserted),
            RecordState::Persisted => self.update(record).await,
        }
    }

    async fn insert<R: Record>(&self, record: &mut R) -> StoreResult<()> {
        if R::TIMESTAMPS {
            let now = value::now();
            record.assign("created_at", now.into())?;
            record.assign("updated_at", now.into())?;
        }

        let columns = record
            .attributes()
            .into_iter()
            .map(|attribute| (attribute.column, attribute.value))
            .collect();
        let statement = query::insert(R::TABLE, R::PRIMARY_KEY, columns)?;
        debug!("{}", statement.sql);

        let row = build(&statement)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| failed("insert", R::TABLE, e))?;
        let id = row
            .try_get::<i64, _>(R::PRIMARY_KEY)
            .map_err(|e| failed("insert", R::TABLE, e))?;

        let meta = record.meta_mut();
        meta.id = Some(id);
        meta.state = RecordState::Persisted;
        record.sync_original();
        Ok(())
    }

    async fn update<R: Record>(&self, record: &mut R) -> StoreResult<Saved> {
        if !record.is_dirty() {
            return Ok(Saved::Unchanged);
        }

        let id = record
            .id()
            .ok_or(RecordError::MissingPrimaryKey(R::TABLE))?;

        if R::TIMESTAMPS {
            record.assign("updated_at", value::now().into())?;
        }

        let columns: Vec<(&str, Value)> = record
            .attributes()
            .into_iter()
            .filter(|attribute| attribute.dirty)
            .map(|attribute| (attribute.column, attribute.value))
            .collect();
        let statement = query::update(R::TABLE, R::PRIMARY_KEY, id, columns)?;
        debug!("{}", statement.sql);

        let result = build(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| failed("update", R::TABLE, e))?;
        if result.rows_affected() == 0 {
            warn!("{}::update matched no row for id {}", R::TABLE, id);
        }

        record.sync_original();
        Ok(Saved::Updated)
    }

    /// Remove the record's row; `false` when the record has no row
    pub async fn delete<R: Record>(&self, record: &mut R) -> StoreResult<bool> {
        if !record.exists() {
            return Ok(false);
        }

        let id = record
            .id()
            .ok_or(RecordError::MissingPrimaryKey(R::TABLE))?;
        let statement = query::delete(R::TABLE, R::PRIMARY_KEY, id)?;
        debug!("{}", statement.sql);

        build(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| failed("delete", R::TABLE, e))?;

        record.meta_mut().state = RecordState::Deleted;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::{DatabaseConfig, init_pool},
        record::{Attribute, RecordMeta, Tracked, value::read},
    };

    /// Minimal record used to exercise the store
    #[derive(Debug, Clone, Default)]
    struct Note {
        meta: RecordMeta,
        title: Tracked<String>,
        body: Tracked<Option<String>>,
        pinned: Tracked<bool>,
        secret: Tracked<Option<String>>,
        created_at: Tracked<Option<chrono::NaiveDateTime>>,
        updated_at: Tracked<Option<chrono::NaiveDateTime>>,
    }

    impl Record for Note {
        const TABLE: &'static str = "notes";
        const GUARDED: &'static [&'static str] = &["id", "pinned", "created_at", "updated_at"];
        const HIDDEN: &'static [&'static str] = &["secret"];

        fn from_row(row: &AnyRow) -> Result<Self, sqlx::Error> {
            Ok(Self {
                meta: RecordMeta::loaded(read::int(row, "id")?),
                title: Tracked::loaded(read::text(row, "title")?),
                body: Tracked::loaded(read::opt_text(row, "body")?),
                pinned: Tracked::loaded(read::flag(row, "pinned")?),
                secret: Tracked::loaded(read::opt_text(row, "secret")?),
                created_at: Tracked::loaded(read::opt_timestamp(row, "created_at")?),
                updated_at: Tracked::loaded(read::opt_timestamp(row, "updated_at")?),
            })
        }

        fn meta(&self) -> &RecordMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut RecordMeta {
            &mut self.meta
        }

        fn attributes(&self) -> Vec<Attribute> {
            vec![
                self.title.attribute("title"),
                self.body.attribute("body"),
                self.pinned.attribute("pinned"),
                self.secret.attribute("secret"),
                self.created_at.attribute("created_at"),
                self.updated_at.attribute("updated_at"),
            ]
        }

        fn assign(&mut self, column: &str, value: Value) -> Result<(), RecordError> {
            match column {
                "title" => self.title.set(value.into_string(column)?),
                "body" => self.body.set(value.into_text(column)?),
                "pinned" => self.pinned.set(value.into_bool(column)?),
                "secret" => self.secret.set(value.into_text(column)?),
                "created_at" => self.created_at.set(value.into_timestamp(column)?),
                "updated_at" => self.updated_at.set(value.into_timestamp(column)?),
                _ => {
                    return Err(RecordError::UnknownColumn {
                        table: Self::TABLE,
                        column: column.to_string(),
                    });
                }
            }
            Ok(())
        }

        fn sync_original(&mut self) {
            self.title.sync();
            self.body.sync();
            self.pinned.sync();
            self.secret.sync();
            self.created_at.sync();
            self.updated_at.sync();
        }
    }

    fn note(title: &str) -> Note {
        Note {
            title: Tracked::new(title.to_string()),
            ..Note::default()
        }
    }

    async fn store() -> RecordStore {
        let pool = init_pool(&DatabaseConfig::in_memory()).await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                body TEXT,
                pinned BOOLEAN NOT NULL DEFAULT 0,
                secret TEXT,
                created_at TEXT,
                updated_at TEXT
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        RecordStore::new(pool)
    }

    #[tokio::test]
    async fn test_insert_assigns_key_and_timestamps() {
        let store = store().await;
        let mut first = note("groceries");

        assert_eq!(store.save(&mut first).await.unwrap(), Saved::Inserted);
        assert!(first.exists());
        assert!(first.id().is_some());
        assert!(first.created_at.get().is_some());
        assert!(!first.is_dirty());

        let mut second = note("chores");
        store.save(&mut second).await.unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[tokio::test]
    async fn test_saving_a_clean_record_is_a_no_op() {
        let store = store().await;
        let mut created = note("groceries");
        store.save(&mut created).await.unwrap();

        let mut loaded: Note = store.find(created.id().unwrap()).await.unwrap().unwrap();
        assert!(!loaded.is_dirty());
        let stamp = *loaded.updated_at.get();

        assert_eq!(store.save(&mut loaded).await.unwrap(), Saved::Unchanged);
        assert_eq!(*loaded.updated_at.get(), stamp);
    }

    #[tokio::test]
    async fn test_update_writes_only_dirty_columns() {
        let store = store().await;
        let mut created = note("groceries");
        store.save(&mut created).await.unwrap();
        let id = created.id().unwrap();

        let mut left: Note = store.find(id).await.unwrap().unwrap();
        let mut right: Note = store.find(id).await.unwrap().unwrap();

        left.title.set("market".to_string());
        right.body.set(Some("eggs, rice".to_string()));
        assert_eq!(right.dirty_columns(), vec!["body"]);

        assert_eq!(store.save(&mut left).await.unwrap(), Saved::Updated);
        assert_eq!(store.save(&mut right).await.unwrap(), Saved::Updated);

        let reloaded: Note = store.find_or_fail(id).await.unwrap();
        assert_eq!(reloaded.title.get(), "market");
        assert_eq!(reloaded.body.get().as_deref(), Some("eggs, rice"));
    }

    #[tokio::test]
    async fn test_find_by_all_and_count() {
        let store = store().await;
        for title in ["b", "a", "c"] {
            store.save(&mut note(title)).await.unwrap();
        }

        let found: Option<Note> = store.find_by(&Criteria::new().eq("title", "a")).await.unwrap();
        assert_eq!(found.unwrap().title.get(), "a");

        let missing: Option<Note> = store.find(999).await.unwrap();
        assert!(missing.is_none());
        assert!(matches!(
            store.find_or_fail::<Note>(999).await,
            Err(StoreError::NotFound { id: 999, .. })
        ));

        let ordered: Vec<Note> = store
            .all(&[("title".to_string(), Direction::Desc)], Some(2), 1)
            .await
            .unwrap();
        let titles: Vec<&str> = ordered.iter().map(|n| n.title.get().as_str()).collect();
        assert_eq!(titles, vec!["b", "a"]);

        assert_eq!(store.count::<Note>(&Criteria::new()).await.unwrap(), 3);
        assert_eq!(
            store.count::<Note>(&Criteria::new().eq("title", "c")).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_kills_the_record() {
        let store = store().await;

        let mut unsaved = note("draft");
        assert!(!store.delete(&mut unsaved).await.unwrap());

        let mut saved = note("done");
        store.save(&mut saved).await.unwrap();
        let id = saved.id().unwrap();

        assert!(store.delete(&mut saved).await.unwrap());
        assert!(!saved.exists());
        assert!(store.find::<Note>(id).await.unwrap().is_none());

        saved.title.set("resurrected".to_string());
        assert!(matches!(
            store.save(&mut saved).await,
            Err(StoreError::Record(RecordError::Deleted("notes")))
        ));
    }

    #[test]
    fn test_fill_skips_guarded_columns() {
        let mut record = note("x");
        record
            .fill([("title", "filled"), ("pinned", "1"), ("id", "42"), ("unknown", "?")])
            .unwrap();

        assert_eq!(record.title.get(), "filled");
        assert!(!record.pinned.get());
        assert_eq!(record.id(), None);
    }

    #[test]
    fn test_to_array_hides_columns() {
        let mut record = note("x");
        record.secret.set(Some("s3cr3t".to_string()));

        let array = record.to_array();
        assert_eq!(array["title"], "x");
        assert!(array.contains_key("id"));
        assert!(!array.contains_key("secret"));
    }
}
