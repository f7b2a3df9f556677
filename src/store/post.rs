//! Blog posts and their gallery, tag and category relations.

use std::collections::HashSet;

use futures_util::TryStreamExt;
use indexmap::IndexMap;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::model::database::{
    DbBlogPage, DbCategory, DbGalleryImage, DbPage, DbPostCategory, DbPostTag,
};
use crate::model::network::{GalleryImageForm, PostForm};
use crate::model::{into_result, ApiError, CategoryId, PageId, Result};
use crate::page;
use crate::registry::PageKind;
use crate::richtext;
use crate::store::tree::{insert_child, update_page_fields};
use crate::store::{push_id_list, Store};

impl Store {
    async fn check_post_form(&self, form: &PostForm) -> Result<()> {
        form.validate()?;
        let mut errors = self.check_images(form.image_refs()).await?;
        errors.extend(self.check_categories(&form.categories).await?);
        into_result(errors)
    }

    /// Creates a draft post under `parent_id`.
    pub async fn create_post(&self, parent_id: PageId, form: PostForm) -> Result<PageId> {
        self.check_post_form(&form).await?;

        let mut tx = self.begin_write().await?;
        let id = insert_child(
            &mut tx,
            parent_id,
            &form.page.title,
            &form.page.slug(),
            PageKind::BlogPost,
        )
        .await?;

        sqlx::query("INSERT INTO blog_pages (page_id, date, intro, body) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(form.date)
            .bind(&form.intro)
            .bind(&form.body)
            .execute(&mut *tx)
            .await?;

        sync_relations(&mut tx, id, &form).await?;
        tx.commit().await?;

        tracing::info!(id, parent_id, "created post");
        Ok(id)
    }

    /// Saves the post fields and replaces its gallery, tags and categories with the
    /// submitted ones, all in one transaction.
    pub async fn save_post(&self, id: PageId, form: PostForm) -> Result<()> {
        let page = self.specific(id, PageKind::BlogPost).await?;
        self.check_post_form(&form).await?;

        let mut tx = self.begin_write().await?;
        update_page_fields(&mut tx, &page, &form.page.title, &form.page.slug()).await?;

        sqlx::query("UPDATE blog_pages SET date = ?, intro = ?, body = ? WHERE page_id = ?")
            .bind(form.date)
            .bind(&form.intro)
            .bind(&form.body)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sync_relations(&mut tx, id, &form).await?;
        tx.commit().await?;

        tracing::info!(id, "saved post");
        Ok(())
    }

    pub async fn post(&self, id: PageId) -> Result<page::Post> {
        let page = self.specific(id, PageKind::BlogPost).await?;
        self.posts(vec![page])
            .await?
            .pop()
            .ok_or_else(|| ApiError::not_found(format!("post {id}")))
    }

    /// First gallery image by display order.
    pub async fn main_image(&self, id: PageId) -> Result<Option<page::Image>> {
        let image = sqlx::query_as::<_, crate::model::database::DbImage>(
            "SELECT i.* FROM blog_page_gallery_images g
             JOIN images i ON i.id = g.image_id
             WHERE g.page_id = ?
             ORDER BY g.sort_order
             LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(image.map(page::Image::from))
    }

    /// Loads posts for the given pages, keeping their order.
    pub(crate) async fn posts(&self, pages: Vec<DbPage>) -> Result<Vec<page::Post>> {
        if pages.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<PageId> = pages.iter().map(|page| page.id).collect();

        let mut query = QueryBuilder::new("SELECT * FROM blog_pages WHERE page_id IN ");
        push_id_list(&mut query, &ids);
        let rows = query.build_query_as::<DbBlogPage>().fetch_all(&self.pool).await?;

        let mut posts = IndexMap::new();
        for page in pages {
            let Some(row) = rows.iter().find(|row| row.page_id == page.id) else {
                tracing::warn!(id = page.id, "page has no blog post row");
                continue;
            };
            let meta = self.meta(&page).await?;
            posts.insert(
                page.id,
                page::Post {
                    page: meta,
                    date: row.date,
                    intro: row.intro.clone(),
                    body: richtext::render(&row.body),
                    tags: Vec::new(),
                    categories: Vec::new(),
                    gallery: Vec::new(),
                },
            );
        }

        let mut query = QueryBuilder::new(
            "SELECT * FROM blog_page_gallery_images WHERE page_id IN ",
        );
        push_id_list(&mut query, &ids);
        query.push(" ORDER BY page_id, sort_order");
        let gallery: Vec<DbGalleryImage> = query
            .build_query_as::<DbGalleryImage>()
            .fetch(&self.pool)
            .try_collect()
            .await?;

        let image_ids: Vec<_> = gallery.iter().map(|item| item.image_id).collect();
        let images = self.images_by_id(&image_ids).await?;
        for item in gallery {
            let (Some(post), Some(image)) = (posts.get_mut(&item.page_id), images.get(&item.image_id))
            else {
                continue;
            };
            post.gallery.push(page::GalleryImage {
                id: item.id,
                sort_order: item.sort_order,
                image: image.clone(),
                caption: item.caption,
            });
        }

        let mut query = QueryBuilder::new(
            "SELECT bt.content_object_id AS page_id, t.name FROM blog_page_tags bt
             JOIN tags t ON t.id = bt.tag_id
             WHERE bt.content_object_id IN ",
        );
        push_id_list(&mut query, &ids);
        query.push(" ORDER BY t.name");
        let mut tags = query.build_query_as::<DbPostTag>().fetch(&self.pool);
        while let Some(tag) = tags.try_next().await? {
            if let Some(post) = posts.get_mut(&tag.page_id) {
                post.tags.push(tag.name);
            }
        }
        drop(tags);

        let mut query = QueryBuilder::new(
            "SELECT blog_page_id AS page_id, category_id FROM blog_page_categories
             WHERE blog_page_id IN ",
        );
        push_id_list(&mut query, &ids);
        let links = query
            .build_query_as::<DbPostCategory>()
            .fetch_all(&self.pool)
            .await?;

        let category_ids: Vec<CategoryId> = links.iter().map(|link| link.category_id).collect();
        let categories = if category_ids.is_empty() {
            Vec::new()
        } else {
            let mut query = QueryBuilder::new("SELECT * FROM blog_categories WHERE id IN ");
            push_id_list(&mut query, &category_ids);
            query.push(" ORDER BY name, id");
            let rows = query.build_query_as::<DbCategory>().fetch_all(&self.pool).await?;
            self.with_icons(rows).await?
        };

        for category in categories {
            for link in links.iter().filter(|link| link.category_id == category.id) {
                if let Some(post) = posts.get_mut(&link.page_id) {
                    post.categories.push(category.clone());
                }
            }
        }

        Ok(posts.into_values().collect())
    }
}

async fn sync_relations(conn: &mut SqliteConnection, id: PageId, form: &PostForm) -> Result<()> {
    sync_gallery(&mut *conn, id, &form.gallery).await?;
    sync_tags(&mut *conn, id, &form.tags.names()).await?;
    sync_categories(&mut *conn, id, &form.categories).await?;
    Ok(())
}

/// Makes the stored gallery equal to `items`, in order. Entries submitted with the
/// id of one of this post's rows update that row; any other row is deleted.
async fn sync_gallery(
    conn: &mut SqliteConnection,
    page_id: PageId,
    items: &[GalleryImageForm],
) -> Result<()> {
    let existing: HashSet<i64> =
        sqlx::query_scalar::<_, i64>("SELECT id FROM blog_page_gallery_images WHERE page_id = ?")
            .bind(page_id)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .collect();

    let kept: HashSet<i64> = items
        .iter()
        .filter_map(|item| item.id)
        .filter(|id| existing.contains(id))
        .collect();

    for &id in existing.difference(&kept) {
        sqlx::query("DELETE FROM blog_page_gallery_images WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }

    // Park the kept rows on negative orders so the final orders never collide.
    sqlx::query(
        "UPDATE blog_page_gallery_images SET sort_order = -1 - sort_order WHERE page_id = ?",
    )
    .bind(page_id)
    .execute(&mut *conn)
    .await?;

    let mut updated = HashSet::new();
    for (order, item) in items.iter().enumerate() {
        let order = order as i64;
        match item.id.filter(|id| kept.contains(id) && updated.insert(*id)) {
            Some(id) => {
                sqlx::query(
                    "UPDATE blog_page_gallery_images SET sort_order = ?, image_id = ?, caption = ?
                     WHERE id = ?",
                )
                .bind(order)
                .bind(item.image)
                .bind(&item.caption)
                .bind(id)
                .execute(&mut *conn)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO blog_page_gallery_images (page_id, sort_order, image_id, caption)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(page_id)
                .bind(order)
                .bind(item.image)
                .bind(&item.caption)
                .execute(&mut *conn)
                .await?;
            }
        }
    }

    Ok(())
}

/// Tag rows are shared between posts and created on first use.
async fn tag_id(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = found {
        return Ok(id);
    }

    let base = match slug::slugify(name) {
        s if s.is_empty() => "tag".to_string(),
        s => s,
    };
    let mut candidate = base.clone();
    let mut n = 0;
    loop {
        let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE slug = ?")
            .bind(&candidate)
            .fetch_optional(&mut *conn)
            .await?;
        if taken.is_none() {
            break;
        }
        n += 1;
        candidate = format!("{base}_{n}");
    }

    let id = sqlx::query("INSERT INTO tags (name, slug) VALUES (?, ?)")
        .bind(name)
        .bind(&candidate)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
    tracing::debug!(id, name, slug = %candidate, "created tag");
    Ok(id)
}

async fn sync_tags(conn: &mut SqliteConnection, page_id: PageId, names: &[String]) -> Result<()> {
    let mut wanted = HashSet::new();
    for name in names {
        wanted.insert(tag_id(&mut *conn, name).await?);
    }

    let current: HashSet<i64> =
        sqlx::query_scalar::<_, i64>("SELECT tag_id FROM blog_page_tags WHERE content_object_id = ?")
            .bind(page_id)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .collect();

    for &stale in current.difference(&wanted) {
        sqlx::query("DELETE FROM blog_page_tags WHERE content_object_id = ? AND tag_id = ?")
            .bind(page_id)
            .bind(stale)
            .execute(&mut *conn)
            .await?;
    }
    for &added in wanted.difference(&current) {
        sqlx::query("INSERT INTO blog_page_tags (tag_id, content_object_id) VALUES (?, ?)")
            .bind(added)
            .bind(page_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn sync_categories(
    conn: &mut SqliteConnection,
    page_id: PageId,
    ids: &[CategoryId],
) -> Result<()> {
    let wanted: HashSet<CategoryId> = ids.iter().copied().collect();
    let current: HashSet<CategoryId> =
        sqlx::query_scalar::<_, CategoryId>("SELECT category_id FROM blog_page_categories WHERE blog_page_id = ?")
            .bind(page_id)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .collect();

    for &id in current.difference(&wanted) {
        sqlx::query("DELETE FROM blog_page_categories WHERE blog_page_id = ? AND category_id = ?")
            .bind(page_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    for &id in wanted.difference(&current) {
        sqlx::query("INSERT INTO blog_page_categories (blog_page_id, category_id) VALUES (?, ?)")
            .bind(page_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::network::{CategoryForm, TagInput};
    use crate::model::ValidateError;
    use crate::store::test::{blog_index, image, post_form, store};

    fn gallery_item(id: Option<i64>, image: i64, caption: &str) -> GalleryImageForm {
        GalleryImageForm {
            id,
            image,
            caption: caption.to_string(),
        }
    }

    #[tokio::test]
    async fn main_image_follows_display_order() {
        let store = store().await;
        let blog = blog_index(&store, "Blog").await;
        let a = image(&store, "a").await;
        let b = image(&store, "b").await;

        let post = store.create_post(blog, post_form("P", &[])).await.unwrap();
        assert_eq!(store.main_image(post).await.unwrap(), None);
        assert_eq!(store.post(post).await.unwrap().main_image(), None);

        let mut form = post_form("P", &[]);
        form.gallery = vec![gallery_item(None, b, "y"), gallery_item(None, a, "x")];
        store.save_post(post, form).await.unwrap();

        assert_eq!(store.main_image(post).await.unwrap().map(|i| i.id), Some(b));
        let loaded = store.post(post).await.unwrap();
        assert_eq!(loaded.main_image().map(|i| i.id), Some(b));
        let captions: Vec<_> = loaded.gallery.iter().map(|g| g.caption.as_str()).collect();
        assert_eq!(captions, vec!["y", "x"]);
    }

    #[tokio::test]
    async fn gallery_save_replaces_and_keeps_ids() {
        let store = store().await;
        let blog = blog_index(&store, "Blog").await;
        let a = image(&store, "a").await;
        let b = image(&store, "b").await;
        let c = image(&store, "c").await;

        let mut form = post_form("P", &[]);
        form.gallery = vec![gallery_item(None, a, "a"), gallery_item(None, b, "b")];
        let post = store.create_post(blog, form).await.unwrap();
        let before = store.post(post).await.unwrap().gallery;
        let (id_a, id_b) = (before[0].id, before[1].id);

        // Reverse the order, drop nothing, then replace `a` with a new `c` entry.
        let mut form = post_form("P", &[]);
        form.gallery = vec![gallery_item(Some(id_b), b, "b2"), gallery_item(Some(id_a), a, "a2")];
        store.save_post(post, form).await.unwrap();
        let after = store.post(post).await.unwrap().gallery;
        assert_eq!(
            after.iter().map(|g| (g.id, g.sort_order)).collect::<Vec<_>>(),
            vec![(id_b, 0), (id_a, 1)]
        );
        assert_eq!(after[0].caption, "b2");

        let mut form = post_form("P", &[]);
        form.gallery = vec![gallery_item(Some(id_b), b, "b2"), gallery_item(None, c, "c")];
        store.save_post(post, form).await.unwrap();
        let after = store.post(post).await.unwrap().gallery;
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].id, id_b);
        assert_eq!(after[1].image.id, c);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blog_page_gallery_images")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[tokio::test]
    async fn foreign_gallery_ids_become_new_rows() {
        let store = store().await;
        let blog = blog_index(&store, "Blog").await;
        let a = image(&store, "a").await;

        let mut form = post_form("One", &[]);
        form.gallery = vec![gallery_item(None, a, "")];
        let one = store.create_post(blog, form).await.unwrap();
        let foreign = store.post(one).await.unwrap().gallery[0].id;

        let mut form = post_form("Two", &[]);
        form.gallery = vec![gallery_item(Some(foreign), a, "")];
        let two = store.create_post(blog, form).await.unwrap();

        assert_eq!(store.post(one).await.unwrap().gallery[0].id, foreign);
        assert_ne!(store.post(two).await.unwrap().gallery[0].id, foreign);
    }

    #[tokio::test]
    async fn deleting_gallery_image_asset_removes_entry() {
        let store = store().await;
        let blog = blog_index(&store, "Blog").await;
        let a = image(&store, "a").await;
        let b = image(&store, "b").await;

        let mut form = post_form("P", &[]);
        form.gallery = vec![gallery_item(None, a, "x"), gallery_item(None, b, "y")];
        let post = store.create_post(blog, form).await.unwrap();

        store.delete_image(a).await.unwrap();

        let gallery = store.post(post).await.unwrap().gallery;
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].image.id, b);
        assert_eq!(store.main_image(post).await.unwrap().map(|i| i.id), Some(b));
    }

    #[tokio::test]
    async fn tags_and_categories_sync_independently() {
        let store = store().await;
        let blog = blog_index(&store, "Blog").await;
        let travel = store
            .create_category(CategoryForm {
                name: "Travel".into(),
                icon: None,
            })
            .await
            .unwrap();
        let food = store
            .create_category(CategoryForm {
                name: "Food".into(),
                icon: None,
            })
            .await
            .unwrap();

        let mut form = post_form("P", &["rust", "web"]);
        form.categories = vec![travel.id, food.id];
        let post = store.create_post(blog, form).await.unwrap();

        let loaded = store.post(post).await.unwrap();
        assert_eq!(loaded.tags, vec!["rust".to_string(), "web".to_string()]);
        assert_eq!(
            loaded.categories.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["Food", "Travel"]
        );

        let mut form = post_form("P", &[]);
        form.tags = TagInput::Text("web, \"new york\"".into());
        form.categories = vec![travel.id];
        store.save_post(post, form).await.unwrap();

        let loaded = store.post(post).await.unwrap();
        assert_eq!(loaded.tags, vec!["new york".to_string(), "web".to_string()]);
        assert_eq!(loaded.categories, vec![travel]);

        // the unused tag row stays for other posts to reuse
        let tags: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(tags, 3);
    }

    #[tokio::test]
    async fn tag_slugs_stay_unique() {
        let store = store().await;
        let blog = blog_index(&store, "Blog").await;
        store
            .create_post(blog, post_form("P", &["Rust", "rust"]))
            .await
            .unwrap();

        let slugs: Vec<String> = sqlx::query_scalar("SELECT slug FROM tags ORDER BY id")
            .fetch_all(&store.pool)
            .await
            .unwrap();
        assert_eq!(slugs, vec!["rust".to_string(), "rust_1".to_string()]);
    }

    #[tokio::test]
    async fn rejected_save_changes_nothing() {
        let store = store().await;
        let blog = blog_index(&store, "Blog").await;
        let post = store.create_post(blog, post_form("P", &["keep"])).await.unwrap();

        let mut form = post_form("P", &["drop"]);
        form.categories = vec![77];
        let result = store.save_post(post, form).await;
        assert!(matches!(
            result,
            Err(ApiError::Validation(errors)) if errors == vec![ValidateError::UnknownCategory { id: 77 }]
        ));

        assert_eq!(store.post(post).await.unwrap().tags, vec!["keep".to_string()]);
    }

    #[tokio::test]
    async fn save_rejects_other_page_types() {
        let store = store().await;
        let blog = blog_index(&store, "Blog").await;
        let result = store.save_post(blog, post_form("P", &[])).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn deleting_post_cascades_relations() {
        let store = store().await;
        let blog = blog_index(&store, "Blog").await;
        let a = image(&store, "a").await;
        let category = store
            .create_category(CategoryForm {
                name: "C".into(),
                icon: None,
            })
            .await
            .unwrap();

        let mut form = post_form("P", &["t"]);
        form.gallery = vec![gallery_item(None, a, "")];
        form.categories = vec![category.id];
        let post = store.create_post(blog, form).await.unwrap();

        store.delete_page(post).await.unwrap();

        for table in [
            "blog_pages",
            "blog_page_gallery_images",
            "blog_page_tags",
            "blog_page_categories",
        ] {
            let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&store.pool)
                .await
                .unwrap();
            assert_eq!(rows, 0, "{table}");
        }
        assert!(store.image(a).await.is_ok());
        assert!(store.category(category.id).await.is_ok());
    }

    #[tokio::test]
    async fn body_renders_markdown() {
        let store = store().await;
        let blog = blog_index(&store, "Blog").await;
        let mut form = post_form("P", &[]);
        form.body = "Some **bold** text".into();
        let post = store.create_post(blog, form).await.unwrap();

        let loaded = store.post(post).await.unwrap();
        assert!(loaded.body.0.contains("<strong>bold</strong>"));
        assert_eq!(loaded.page.url, "/blog/p/");
        assert!(!loaded.page.live);
    }

    #[tokio::test]
    async fn bracketed_prose_saves() {
        let store = store().await;
        let blog = blog_index(&store, "Blog").await;

        let mut form = post_form("Quote", &[]);
        form.body = "He wrote it [sic] and set xs[0] to one.".into();
        let id = store.create_post(blog, form).await.unwrap();
        assert!(store.post(id).await.unwrap().body.0.contains("[sic]"));

        let mut form = post_form("Quote", &[]);
        form.body = "see [the docs][docs]".into();
        assert!(matches!(
            store.save_post(id, form).await,
            Err(ApiError::Validation(errors)) if errors == vec![ValidateError::UnknownLink {
                field: "body".into(),
                label: "docs".into(),
            }]
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_on_a_file_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("blog.sqlite3")).await.unwrap();
        store.migrate().await.unwrap();
        let blog = blog_index(&store, "Blog").await;

        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .create_post(blog, post_form(&format!("Post {n}"), &["rust"]))
                        .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);

        let numchild: i64 = sqlx::query_scalar("SELECT numchild FROM pages WHERE id = ?")
            .bind(blog)
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(numchild, 8);

        let tags: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(tags, 1);
    }
}
