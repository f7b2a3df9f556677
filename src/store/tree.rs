//! Materialized-path page tree.
//!
//! Each page's `path` is its parent's path plus one fixed-width base-36 step, so
//! a subtree is every row sharing the page's path as a prefix and siblings sort
//! by path in creation order.

use sqlx::SqliteConnection;
use time::OffsetDateTime;

use crate::model::database::DbPage;
use crate::model::{ApiError, PageId, Result, ValidateError};
use crate::registry::PageKind;
use crate::store::{Store, PAGE_COLUMNS};

pub const STEP_LEN: usize = 4;

/// Slugs the router claims below `/`. A root-level page may not take them.
const RESERVED_ROOT_SLUGS: &[&str] = &["admin", "media", "search"];
const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TreePathError {
    #[error("malformed tree path {0:?}")]
    Malformed(String),

    #[error("no room for another child under {0:?}")]
    Full(String),
}

pub fn encode_step(mut n: u64) -> Option<String> {
    let mut step = [b'0'; STEP_LEN];
    for slot in step.iter_mut().rev() {
        *slot = ALPHABET[(n % 36) as usize];
        n /= 36;
    }
    (n == 0).then(|| step.iter().map(|&b| b as char).collect())
}

pub fn decode_step(step: &str) -> Option<u64> {
    if step.len() != STEP_LEN {
        return None;
    }
    step.bytes().try_fold(0u64, |acc, b| {
        let digit = ALPHABET.iter().position(|&a| a == b)? as u64;
        Some(acc * 36 + digit)
    })
}

/// Path for a new last child of `parent`, given the current last child's path.
pub fn next_child_path(parent: &str, last_child: Option<&str>) -> Result<String, TreePathError> {
    let next = match last_child {
        None => 1,
        Some(last) => {
            let step = last
                .strip_prefix(parent)
                .filter(|step| step.len() == STEP_LEN)
                .and_then(decode_step)
                .ok_or_else(|| TreePathError::Malformed(last.to_string()))?;
            step + 1
        }
    };
    let step = encode_step(next).ok_or_else(|| TreePathError::Full(parent.to_string()))?;
    Ok(format!("{parent}{step}"))
}

pub fn parent_path(path: &str) -> Option<&str> {
    (path.len() > STEP_LEN).then(|| &path[..path.len() - STEP_LEN])
}

fn root_is_fixed(id: PageId) -> ApiError {
    ApiError::invalid(ValidateError::WrongPageType {
        id,
        expected: "a page below the root".to_string(),
    })
}

pub(crate) async fn fetch_page(conn: &mut SqliteConnection, id: PageId) -> Result<DbPage> {
    sqlx::query_as::<_, DbPage>(&format!("SELECT {PAGE_COLUMNS} FROM pages p WHERE p.id = ?"))
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("page {id}")))
}

async fn ensure_unique_slug(
    conn: &mut SqliteConnection,
    parent: &DbPage,
    slug: &str,
    except: Option<PageId>,
) -> Result<()> {
    if parent.depth == 1 && RESERVED_ROOT_SLUGS.contains(&slug) {
        return Err(ApiError::invalid(ValidateError::DuplicateSlug {
            slug: slug.to_string(),
        }));
    }

    let taken: Option<PageId> = sqlx::query_scalar(
        "SELECT id FROM pages
         WHERE substr(path, 1, ?) = ? AND depth = ? AND slug = ? AND id IS NOT ?",
    )
    .bind(parent.path.len() as i64)
    .bind(&parent.path)
    .bind(parent.depth + 1)
    .bind(slug)
    .bind(except)
    .fetch_optional(conn)
    .await?;

    match taken {
        Some(_) => Err(ApiError::invalid(ValidateError::DuplicateSlug {
            slug: slug.to_string(),
        })),
        None => Ok(()),
    }
}

async fn last_child_path(conn: &mut SqliteConnection, parent: &DbPage) -> Result<Option<String>> {
    Ok(sqlx::query_scalar(
        "SELECT path FROM pages WHERE substr(path, 1, ?) = ? AND depth = ?
         ORDER BY path DESC LIMIT 1",
    )
    .bind(parent.path.len() as i64)
    .bind(&parent.path)
    .bind(parent.depth + 1)
    .fetch_optional(conn)
    .await?)
}

/// Inserts a draft page as the last child of `parent_id`.
pub(crate) async fn insert_child(
    conn: &mut SqliteConnection,
    parent_id: PageId,
    title: &str,
    slug: &str,
    kind: PageKind,
) -> Result<PageId> {
    let parent = fetch_page(&mut *conn, parent_id).await?;
    ensure_unique_slug(&mut *conn, &parent, slug, None).await?;

    let last = last_child_path(&mut *conn, &parent).await?;
    let path = next_child_path(&parent.path, last.as_deref())?;

    let id = sqlx::query(
        "INSERT INTO pages (path, depth, numchild, title, slug, content_type, live)
         VALUES (?, ?, 0, ?, ?, ?, 0)",
    )
    .bind(&path)
    .bind(parent.depth + 1)
    .bind(title)
    .bind(slug)
    .bind(kind.content_type())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    sqlx::query("UPDATE pages SET numchild = numchild + 1 WHERE id = ?")
        .bind(parent.id)
        .execute(&mut *conn)
        .await?;

    tracing::debug!(id, %path, %kind, "inserted page");
    Ok(id)
}

/// Updates title and slug of an existing page.
pub(crate) async fn update_page_fields(
    conn: &mut SqliteConnection,
    page: &DbPage,
    title: &str,
    slug: &str,
) -> Result<()> {
    if let Some(parent) = parent_path(&page.path) {
        let parent = fetch_by_path(&mut *conn, parent).await?;
        ensure_unique_slug(&mut *conn, &parent, slug, Some(page.id)).await?;
    }

    sqlx::query("UPDATE pages SET title = ?, slug = ? WHERE id = ?")
        .bind(title)
        .bind(slug)
        .bind(page.id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn fetch_by_path(conn: &mut SqliteConnection, path: &str) -> Result<DbPage> {
    sqlx::query_as::<_, DbPage>(&format!("SELECT {PAGE_COLUMNS} FROM pages p WHERE p.path = ?"))
        .bind(path)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("page at {path}")))
}

impl Store {
    pub async fn root(&self) -> Result<DbPage> {
        sqlx::query_as::<_, DbPage>(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages p WHERE p.depth = 1 ORDER BY p.path LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("root page"))
    }

    /// The first live page of a kind in tree order.
    pub async fn first_live(&self, kind: PageKind) -> Result<Option<DbPage>> {
        Ok(sqlx::query_as::<_, DbPage>(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages p
             WHERE p.content_type = ? AND p.live = 1
             ORDER BY p.path LIMIT 1"
        ))
        .bind(kind.content_type())
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn page(&self, id: PageId) -> Result<DbPage> {
        let mut conn = self.pool.acquire().await?;
        fetch_page(&mut conn, id).await
    }

    /// The page, provided it is of the given kind.
    pub async fn specific(&self, id: PageId, kind: PageKind) -> Result<DbPage> {
        let page = self.page(id).await?;
        if page.kind() != Some(kind) {
            return Err(ApiError::invalid(ValidateError::WrongPageType {
                id,
                expected: kind.content_type().to_string(),
            }));
        }
        Ok(page)
    }

    pub async fn parent(&self, page: &DbPage) -> Result<Option<DbPage>> {
        let Some(path) = parent_path(&page.path) else {
            return Ok(None);
        };
        let mut conn = self.pool.acquire().await?;
        fetch_by_path(&mut conn, path).await.map(Some)
    }

    pub async fn children(&self, parent: &DbPage) -> Result<Vec<DbPage>> {
        Ok(sqlx::query_as::<_, DbPage>(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages p
             WHERE substr(p.path, 1, ?) = ? AND p.depth = ?
             ORDER BY p.path"
        ))
        .bind(parent.path.len() as i64)
        .bind(&parent.path)
        .bind(parent.depth + 1)
        .fetch_all(&self.pool)
        .await?)
    }

    /// URL path of a page: the slugs of its ancestors below the root, then its own.
    pub async fn url_for(&self, page: &DbPage) -> Result<String> {
        let slugs: Vec<String> = sqlx::query_scalar(
            "SELECT slug FROM pages
             WHERE depth > 1 AND depth <= ? AND substr(?, 1, length(path)) = path
             ORDER BY depth",
        )
        .bind(page.depth)
        .bind(&page.path)
        .fetch_all(&self.pool)
        .await?;

        let mut url = String::from("/");
        for slug in slugs {
            url.push_str(&slug);
            url.push('/');
        }
        Ok(url)
    }

    pub async fn meta(&self, page: &DbPage) -> Result<crate::page::PageMeta> {
        Ok(page.meta(self.url_for(page).await?))
    }

    /// Walks slugs down from the root. Only a live page is returned.
    pub async fn resolve(&self, url_path: &str) -> Result<DbPage> {
        let mut page = self.root().await?;

        for slug in url_path.split('/').filter(|segment| !segment.is_empty()) {
            page = sqlx::query_as::<_, DbPage>(&format!(
                "SELECT {PAGE_COLUMNS} FROM pages p
                 WHERE substr(p.path, 1, ?) = ? AND p.depth = ? AND p.slug = ?"
            ))
            .bind(page.path.len() as i64)
            .bind(&page.path)
            .bind(page.depth + 1)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("page {url_path}")))?;
        }

        if !page.live {
            return Err(ApiError::not_found(format!("page {url_path}")));
        }
        Ok(page)
    }

    pub async fn publish(&self, id: PageId) -> Result<()> {
        self.publish_at(id, OffsetDateTime::now_utc()).await
    }

    /// Marks the page live. `first_published_at` is only ever set once.
    pub async fn publish_at(&self, id: PageId, at: OffsetDateTime) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pages
             SET live = 1, first_published_at = COALESCE(first_published_at, ?), last_published_at = ?
             WHERE id = ?",
        )
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("page {id}")));
        }
        tracing::info!(id, "published page");
        Ok(())
    }

    pub async fn unpublish(&self, id: PageId) -> Result<()> {
        let page = self.page(id).await?;
        if page.depth == 1 {
            return Err(root_is_fixed(id));
        }

        sqlx::query("UPDATE pages SET live = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        tracing::info!(id, "unpublished page");
        Ok(())
    }

    /// Moves a page and its subtree to be the last child of `new_parent_id`.
    pub async fn move_page(&self, id: PageId, new_parent_id: PageId) -> Result<()> {
        let mut tx = self.begin_write().await?;

        let page = fetch_page(&mut tx, id).await?;
        let target = fetch_page(&mut tx, new_parent_id).await?;

        if page.depth == 1 || target.path.starts_with(&page.path) {
            return Err(ApiError::invalid(ValidateError::InvalidMove {
                id,
                target: new_parent_id,
            }));
        }
        if parent_path(&page.path) == Some(target.path.as_str()) {
            return Ok(());
        }

        ensure_unique_slug(&mut tx, &target, &page.slug, Some(page.id)).await?;
        let last = last_child_path(&mut tx, &target).await?;
        let new_path = next_child_path(&target.path, last.as_deref())?;
        let depth_change = target.depth + 1 - page.depth;

        sqlx::query(
            "UPDATE pages SET path = ? || substr(path, ?), depth = depth + ?
             WHERE substr(path, 1, ?) = ?",
        )
        .bind(&new_path)
        .bind(page.path.len() as i64 + 1)
        .bind(depth_change)
        .bind(page.path.len() as i64)
        .bind(&page.path)
        .execute(&mut *tx)
        .await?;

        if let Some(old_parent) = parent_path(&page.path) {
            sqlx::query("UPDATE pages SET numchild = numchild - 1 WHERE path = ?")
                .bind(old_parent)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("UPDATE pages SET numchild = numchild + 1 WHERE id = ?")
            .bind(target.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(id, from = %page.path, to = %new_path, "moved page");
        Ok(())
    }

    /// Deletes a page with its whole subtree. Page-type rows and their relations
    /// go with it through cascading foreign keys.
    pub async fn delete_page(&self, id: PageId) -> Result<()> {
        let mut tx = self.begin_write().await?;

        let page = fetch_page(&mut tx, id).await?;
        if page.depth == 1 {
            return Err(root_is_fixed(id));
        }

        let deleted = sqlx::query("DELETE FROM pages WHERE substr(path, 1, ?) = ?")
            .bind(page.path.len() as i64)
            .bind(&page.path)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if let Some(parent) = parent_path(&page.path) {
            sqlx::query("UPDATE pages SET numchild = numchild - 1 WHERE path = ?")
                .bind(parent)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(id, deleted, "deleted page subtree");
        Ok(())
    }
}
