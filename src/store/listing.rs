//! Blog index and tag index pages and the post listings they show.

use crate::model::database::{DbBlogIndexPage, DbPage};
use crate::model::network::{BlogIndexForm, TagIndexForm};
use crate::model::{ApiError, PageId, Result};
use crate::page;
use crate::registry::PageKind;
use crate::richtext;
use crate::store::tree::{insert_child, update_page_fields};
use crate::store::{Store, PAGE_COLUMNS};

impl Store {
    pub async fn create_blog_index(&self, parent_id: PageId, form: BlogIndexForm) -> Result<PageId> {
        form.validate()?;

        let mut tx = self.begin_write().await?;
        let id = insert_child(
            &mut tx,
            parent_id,
            &form.page.title,
            &form.page.slug(),
            PageKind::BlogIndex,
        )
        .await?;

        sqlx::query("INSERT INTO blog_index_pages (page_id, intro) VALUES (?, ?)")
            .bind(id)
            .bind(&form.intro)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(id, parent_id, "created blog index");
        Ok(id)
    }

    pub async fn save_blog_index(&self, id: PageId, form: BlogIndexForm) -> Result<()> {
        let page = self.specific(id, PageKind::BlogIndex).await?;
        form.validate()?;

        let mut tx = self.begin_write().await?;
        update_page_fields(&mut tx, &page, &form.page.title, &form.page.slug()).await?;
        sqlx::query("UPDATE blog_index_pages SET intro = ? WHERE page_id = ?")
            .bind(&form.intro)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(id, "saved blog index");
        Ok(())
    }

    pub async fn blog_index(&self, id: PageId) -> Result<page::IndexPage> {
        let page = self.specific(id, PageKind::BlogIndex).await?;
        let row = sqlx::query_as::<_, DbBlogIndexPage>(
            "SELECT * FROM blog_index_pages WHERE page_id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("blog index {id}")))?;

        Ok(page::IndexPage {
            page: self.meta(&page).await?,
            intro: richtext::render(&row.intro),
        })
    }

    /// Live child posts of a blog index, most recently first published first.
    pub async fn index_listing(&self, id: PageId) -> Result<Vec<page::Post>> {
        let index = self.specific(id, PageKind::BlogIndex).await?;

        let pages = sqlx::query_as::<_, DbPage>(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages p
             JOIN blog_pages b ON b.page_id = p.id
             WHERE substr(p.path, 1, ?) = ? AND p.depth = ? AND p.live = 1
             ORDER BY julianday(p.first_published_at) DESC, p.id DESC"
        ))
        .bind(index.path.len() as i64)
        .bind(&index.path)
        .bind(index.depth + 1)
        .fetch_all(&self.pool)
        .await?;

        self.posts(pages).await
    }

    pub async fn create_tag_index(&self, parent_id: PageId, form: TagIndexForm) -> Result<PageId> {
        form.validate()?;

        let mut tx = self.begin_write().await?;
        let id = insert_child(
            &mut tx,
            parent_id,
            &form.page.title,
            &form.page.slug(),
            PageKind::BlogTagIndex,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(id, parent_id, "created tag index");
        Ok(id)
    }

    pub async fn save_tag_index(&self, id: PageId, form: TagIndexForm) -> Result<()> {
        let page = self.specific(id, PageKind::BlogTagIndex).await?;
        form.validate()?;

        let mut tx = self.begin_write().await?;
        update_page_fields(&mut tx, &page, &form.page.title, &form.page.slug()).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Every post carrying exactly this tag, whatever its publication state or
    /// place in the tree. No tag means no posts.
    pub async fn tag_listing(&self, tag: Option<&str>) -> Result<Vec<page::Post>> {
        let Some(tag) = tag else {
            return Ok(Vec::new());
        };

        let pages = sqlx::query_as::<_, DbPage>(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages p
             JOIN blog_page_tags bt ON bt.content_object_id = p.id
             JOIN tags t ON t.id = bt.tag_id
             WHERE t.name = ?
             ORDER BY p.id"
        ))
        .bind(tag)
        .fetch_all(&self.pool)
        .await?;

        self.posts(pages).await
    }
}
