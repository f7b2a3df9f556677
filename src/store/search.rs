use sqlx::QueryBuilder;

use crate::model::database::DbPage;
use crate::model::Result;
use crate::page;
use crate::registry::{PageKind, Registry};
use crate::store::{Store, PAGE_COLUMNS};

fn post_column(field: &str) -> Option<&'static str> {
    match field {
        "title" => Some("p.title"),
        "intro" => Some("b.intro"),
        "body" => Some("b.body"),
        _ => None,
    }
}

fn like_pattern(query: &str) -> String {
    let mut pattern = String::from("%");
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl Store {
    /// Live posts whose registered search fields contain `query`, ignoring ASCII case.
    pub async fn search(&self, registry: &Registry, query: &str) -> Result<Vec<page::Post>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let columns: Vec<_> = registry
            .search_fields(PageKind::BlogPost)
            .iter()
            .filter_map(|field| {
                let column = post_column(field);
                if column.is_none() {
                    tracing::warn!(field, "search field has no column");
                }
                column
            })
            .collect();
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = like_pattern(query);
        let mut sql = QueryBuilder::new(format!(
            "SELECT {PAGE_COLUMNS} FROM pages p
             JOIN blog_pages b ON b.page_id = p.id
             WHERE p.live = 1 AND ("
        ));
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                sql.push(" OR ");
            }
            sql.push(format!("{column} LIKE "));
            sql.push_bind(pattern.clone());
            sql.push(" ESCAPE '\\'");
        }
        sql.push(") ORDER BY julianday(p.first_published_at) DESC, p.id DESC");

        let pages = sql.build_query_as::<DbPage>().fetch_all(&self.pool).await?;
        tracing::debug!(query, hits = pages.len(), "searched posts");
        self.posts(pages).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::{PageType, BLOG_POST_PANELS};
    use crate::store::test::{blog_index, live_post, post_form, store};

    #[test]
    fn like_wildcards_escaped() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[tokio::test]
    async fn finds_live_posts_by_registered_fields() {
        let store = store().await;
        let registry = Registry::blog();
        let blog = blog_index(&store, "Blog").await;

        let borrow = live_post(&store, blog, "Borrowing", &[], 0).await;
        let traits = live_post(&store, blog, "Traits", &[], 5).await;
        let mut draft = post_form("Draft borrowing", &[]);
        draft.body = "borrowing in a draft".into();
        store.create_post(blog, draft).await.unwrap();

        let hits = store.search(&registry, "BORROWING").await.unwrap();
        assert_eq!(hits.iter().map(|p| p.page.id).collect::<Vec<_>>(), vec![borrow]);

        // "intro" appears in every post's intro
        let hits = store.search(&registry, "intro").await.unwrap();
        assert_eq!(
            hits.iter().map(|p| p.page.id).collect::<Vec<_>>(),
            vec![traits, borrow]
        );

        assert!(store.search(&registry, "  ").await.unwrap().is_empty());
        assert!(store.search(&registry, "%").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_respects_registry() {
        let store = store().await;
        let blog = blog_index(&store, "Blog").await;
        live_post(&store, blog, "Borrowing", &[], 0).await;

        let mut registry = Registry::new();
        registry.register_page(PageType {
            kind: PageKind::BlogPost,
            verbose_name: "blog page",
            panels: BLOG_POST_PANELS,
            inline_panels: &[],
            search_fields: &["body"],
        });
        // the title is not searched, but the body repeats it
        assert_eq!(store.search(&registry, "Borrowing body").await.unwrap().len(), 1);
        assert!(store.search(&registry, "Borrowing intro").await.unwrap().is_empty());

        assert!(store
            .search(&Registry::new(), "Borrowing")
            .await
            .unwrap()
            .is_empty());
    }
}
