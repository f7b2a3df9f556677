//! SQLite persistence for the page tree and the blog tables.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, Transaction};

use crate::model::{CategoryId, ImageId, Result, ValidateError};

mod category;
mod image;
mod listing;
mod mixed;
mod post;
mod search;
pub mod tree;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub(crate) const PAGE_COLUMNS: &str = "p.id, p.path, p.depth, p.numchild, p.title, p.slug, \
     p.content_type, p.live, p.first_published_at, p.last_published_at";

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        tracing::info!(path = %path.display(), "opened database");
        Ok(Store { pool })
    }

    /// A private in-memory database. Held on a single connection that is never
    /// recycled, since every new connection would see an empty database.
    pub async fn memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Store { pool })
    }

    /// Opens a transaction holding the write lock from its first statement.
    /// A deferred transaction that reads first cannot upgrade while another
    /// connection writes; SQLite fails it instead of waiting.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Applies pending migrations. Already-applied versions are skipped.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        tracing::info!(
            latest = MIGRATOR.iter().map(|migration| migration.version).max(),
            "database schema up to date"
        );
        Ok(())
    }

    /// One error per referenced image that does not exist.
    pub(crate) async fn check_images(
        &self,
        refs: impl IntoIterator<Item = (String, ImageId)>,
    ) -> Result<Vec<ValidateError>> {
        let mut errors = Vec::new();
        for (field, id) in refs {
            let found: Option<i64> = sqlx::query_scalar("SELECT id FROM images WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            if found.is_none() {
                errors.push(ValidateError::UnknownImage { field, id });
            }
        }
        Ok(errors)
    }

    pub(crate) async fn check_categories(&self, ids: &[CategoryId]) -> Result<Vec<ValidateError>> {
        let mut errors = Vec::new();
        for &id in ids {
            let found: Option<i64> =
                sqlx::query_scalar("SELECT id FROM blog_categories WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            if found.is_none() {
                errors.push(ValidateError::UnknownCategory { id });
            }
        }
        Ok(errors)
    }
}

/// Appends `(?, ?, ...)` binding every id.
pub(crate) fn push_id_list<'args>(query: &mut QueryBuilder<'args, Sqlite>, ids: &[i64]) {
    query.push("(");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::model::network::{BlogIndexForm, ImageForm, PageForm, PostForm, TagInput};
    use crate::model::PageId;
    use time::macros::{date, datetime};

    pub(crate) async fn store() -> Store {
        let store = Store::memory().await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    pub(crate) async fn image(store: &Store, title: &str) -> ImageId {
        store
            .create_image(ImageForm {
                title: title.to_string(),
                file: format!("original_images/{title}.jpg"),
                width: Some(640),
                height: Some(480),
            })
            .await
            .unwrap()
            .id
    }

    pub(crate) async fn blog_index(store: &Store, title: &str) -> PageId {
        let root = store.root().await.unwrap();
        store
            .create_blog_index(
                root.id,
                BlogIndexForm {
                    page: PageForm {
                        title: title.to_string(),
                        slug: None,
                    },
                    intro: "All the posts.".to_string(),
                },
            )
            .await
            .unwrap()
    }

    pub(crate) fn post_form(title: &str, tags: &[&str]) -> PostForm {
        PostForm {
            page: PageForm {
                title: title.to_string(),
                slug: None,
            },
            date: date!(2022 - 01 - 01),
            intro: format!("{title} intro"),
            body: format!("{title} body"),
            tags: TagInput::List(tags.iter().map(|tag| tag.to_string()).collect()),
            categories: vec![],
            gallery: vec![],
        }
    }

    /// Creates a post and publishes it `minute` minutes into 2022-01-01.
    pub(crate) async fn live_post(
        store: &Store,
        parent: PageId,
        title: &str,
        tags: &[&str],
        minute: u8,
    ) -> PageId {
        let id = store.create_post(parent, post_form(title, tags)).await.unwrap();
        let at = datetime!(2022-01-01 12:00 UTC).replace_minute(minute).unwrap();
        store.publish_at(id, at).await.unwrap();
        id
    }

    #[tokio::test]
    async fn migrations_apply_once() {
        let store = store().await;
        store.migrate().await.unwrap();

        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(applied, MIGRATOR.iter().count() as i64);

        let roots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages WHERE depth = 1")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(roots, 1);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let store = store().await;
        let result = sqlx::query(
            "INSERT INTO blog_page_gallery_images (page_id, sort_order, image_id) VALUES (99, 0, 99)",
        )
        .execute(&store.pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reference_checks() {
        let store = store().await;
        let image = image(&store, "a").await;

        let errors = store
            .check_images([("icon".to_string(), image), ("icon".to_string(), 404)])
            .await
            .unwrap();
        assert_eq!(
            errors,
            vec![ValidateError::UnknownImage {
                field: "icon".into(),
                id: 404
            }]
        );

        let errors = store.check_categories(&[1]).await.unwrap();
        assert_eq!(errors, vec![ValidateError::UnknownCategory { id: 1 }]);
    }
}
