use std::collections::HashMap;

use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::model::database::DbImage;
use crate::model::network::ImageForm;
use crate::model::{ApiError, ImageId, Result};
use crate::page;
use crate::store::{push_id_list, Store};

impl Store {
    pub async fn create_image(&self, form: ImageForm) -> Result<page::Image> {
        form.validate()?;

        let id = sqlx::query(
            "INSERT INTO images (title, file, width, height, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&form.title)
        .bind(&form.file)
        .bind(form.width)
        .bind(form.height)
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        tracing::info!(id, file = %form.file, "created image");
        self.image(id).await
    }

    pub async fn image(&self, id: ImageId) -> Result<page::Image> {
        sqlx::query_as::<_, DbImage>("SELECT * FROM images WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(page::Image::from)
            .ok_or_else(|| ApiError::not_found(format!("image {id}")))
    }

    pub async fn images(&self) -> Result<Vec<page::Image>> {
        let images = sqlx::query_as::<_, DbImage>("SELECT * FROM images ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(images.into_iter().map(page::Image::from).collect())
    }

    pub(crate) async fn images_by_id(
        &self,
        ids: &[ImageId],
    ) -> Result<HashMap<ImageId, page::Image>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::new("SELECT * FROM images WHERE id IN ");
        push_id_list(&mut query, ids);
        let images = query.build_query_as::<DbImage>().fetch_all(&self.pool).await?;

        Ok(images
            .into_iter()
            .map(|image| (image.id, page::Image::from(image)))
            .collect())
    }

    /// Deleting an image removes gallery entries showing it and clears any
    /// category icon pointing at it.
    pub async fn delete_image(&self, id: ImageId) -> Result<()> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("image {id}")));
        }
        tracing::info!(id, "deleted image");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::model::ApiError;
    use crate::store::test::{image, store};

    #[tokio::test]
    async fn create_list_delete() {
        let store = store().await;
        let a = image(&store, "a").await;
        let b = image(&store, "b").await;

        let fetched = store.image(a).await.unwrap();
        assert_eq!(fetched.title, "a");
        assert_eq!(fetched.width, Some(640));

        let listed: Vec<_> = store.images().await.unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(listed.len(), 2);

        let by_id = store.images_by_id(&[b, 99]).await.unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[&b].file, "original_images/b.jpg");

        store.delete_image(a).await.unwrap();
        assert!(matches!(store.image(a).await, Err(ApiError::NotFound(_))));
        assert!(matches!(store.delete_image(a).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let store = store().await;
        let result = store
            .create_image(crate::model::network::ImageForm {
                title: " ".into(),
                file: "x.jpg".into(),
                width: None,
                height: None,
            })
            .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
