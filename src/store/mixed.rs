//! Mixed-content posts, whose body is a sequence of stream-field blocks.

use sqlx::types::Json;

use crate::model::database::DbNewBlogPage;
use crate::model::network::NewBlogPostForm;
use crate::model::{into_result, ApiError, PageId, Result};
use crate::page;
use crate::registry::PageKind;
use crate::store::tree::{insert_child, update_page_fields};
use crate::store::Store;

impl Store {
    async fn check_new_blog_post_form(&self, form: &NewBlogPostForm) -> Result<()> {
        form.validate()?;
        into_result(self.check_images(form.image_refs()).await?)
    }

    pub async fn create_new_blog_post(
        &self,
        parent_id: PageId,
        form: NewBlogPostForm,
    ) -> Result<PageId> {
        self.check_new_blog_post_form(&form).await?;

        let mut tx = self.begin_write().await?;
        let id = insert_child(
            &mut tx,
            parent_id,
            &form.page.title,
            &form.page.slug(),
            PageKind::NewBlogPost,
        )
        .await?;

        sqlx::query("INSERT INTO new_blog_pages (page_id, author, date, body) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(&form.author)
            .bind(form.date)
            .bind(Json(&form.body))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(id, parent_id, blocks = form.body.len(), "created mixed-content post");
        Ok(id)
    }

    pub async fn save_new_blog_post(&self, id: PageId, form: NewBlogPostForm) -> Result<()> {
        let page = self.specific(id, PageKind::NewBlogPost).await?;
        self.check_new_blog_post_form(&form).await?;

        let mut tx = self.begin_write().await?;
        update_page_fields(&mut tx, &page, &form.page.title, &form.page.slug()).await?;
        sqlx::query("UPDATE new_blog_pages SET author = ?, date = ?, body = ? WHERE page_id = ?")
            .bind(&form.author)
            .bind(form.date)
            .bind(Json(&form.body))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(id, blocks = form.body.len(), "saved mixed-content post");
        Ok(())
    }

    pub async fn new_blog_post(&self, id: PageId) -> Result<page::MixedPost> {
        let page = self.specific(id, PageKind::NewBlogPost).await?;
        let row = sqlx::query_as::<_, DbNewBlogPage>("SELECT * FROM new_blog_pages WHERE page_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("mixed-content post {id}")))?;

        let Json(blocks) = row.body;
        let image_ids: Vec<_> = blocks.iter().flat_map(|block| block.images()).collect();
        let images = self.images_by_id(&image_ids).await?;

        Ok(page::MixedPost {
            page: self.meta(&page).await?,
            author: row.author,
            date: row.date,
            body: blocks.iter().map(|block| block.render(&images)).collect(),
        })
    }
}
