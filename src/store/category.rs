use crate::model::database::DbCategory;
use crate::model::network::CategoryForm;
use crate::model::{into_result, ApiError, CategoryId, Result};
use crate::page;
use crate::store::Store;

impl Store {
    async fn check_category_form(&self, form: &CategoryForm) -> Result<()> {
        form.validate()?;
        let errors = self
            .check_images(form.icon.map(|id| ("icon".to_string(), id)))
            .await?;
        into_result(errors)
    }

    /// Names are not unique; two categories may share one.
    pub async fn create_category(&self, form: CategoryForm) -> Result<page::Category> {
        self.check_category_form(&form).await?;

        let id = sqlx::query("INSERT INTO blog_categories (name, icon_id) VALUES (?, ?)")
            .bind(&form.name)
            .bind(form.icon)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        tracing::info!(id, name = %form.name, "created category");
        self.category(id).await
    }

    pub async fn update_category(&self, id: CategoryId, form: CategoryForm) -> Result<page::Category> {
        self.check_category_form(&form).await?;

        let result = sqlx::query("UPDATE blog_categories SET name = ?, icon_id = ? WHERE id = ?")
            .bind(&form.name)
            .bind(form.icon)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("category {id}")));
        }
        self.category(id).await
    }

    pub async fn delete_category(&self, id: CategoryId) -> Result<()> {
        let result = sqlx::query("DELETE FROM blog_categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("category {id}")));
        }
        tracing::info!(id, "deleted category");
        Ok(())
    }

    pub async fn category(&self, id: CategoryId) -> Result<page::Category> {
        let category =
            sqlx::query_as::<_, DbCategory>("SELECT * FROM blog_categories WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("category {id}")))?;

        let mut categories = self.with_icons(vec![category]).await?;
        Ok(categories.remove(0))
    }

    pub async fn categories(&self) -> Result<Vec<page::Category>> {
        let categories =
            sqlx::query_as::<_, DbCategory>("SELECT * FROM blog_categories ORDER BY name, id")
                .fetch_all(&self.pool)
                .await?;
        self.with_icons(categories).await
    }

    pub(crate) async fn with_icons(&self, categories: Vec<DbCategory>) -> Result<Vec<page::Category>> {
        let icon_ids: Vec<_> = categories.iter().filter_map(|c| c.icon_id).collect();
        let icons = self.images_by_id(&icon_ids).await?;

        Ok(categories
            .into_iter()
            .map(|category| page::Category {
                id: category.id,
                icon: category.icon_id.and_then(|id| icons.get(&id).cloned()),
                name: category.name,
            })
            .collect())
    }
}
