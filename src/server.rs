//! HTTP surface: live pages and search for readers, a JSON/form API for editors.

use std::{path::PathBuf, sync::Arc};

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use tera::Context;
use tower_http::{services::ServeDir, trace::TraceLayer};
use url::Url;

use crate::compat::{MyForm, MyJson, MyQuery};
use crate::model::network::{
    BlogIndexForm, CategoryForm, ImageForm, MoveForm, NewBlogPostForm, PostForm, SearchQuery,
    TagIndexForm, TagQuery,
};
use crate::model::{ApiError, CategoryId, ImageId, PageId, Result};
use crate::registry::{PageKind, Registry};
use crate::render::Renderer;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub registry: Arc<Registry>,
    pub renderer: Arc<Renderer>,
    pub site: Arc<Site>,
}

#[derive(Debug, Clone)]
pub struct Site {
    pub name: String,
    /// Absolute URL of `/`, used for canonical links.
    pub base_url: Option<Url>,
    /// Prefix every route and link is served under, empty or `/segment`.
    pub base_path: String,
    /// Served under `/media`, where templates point image files.
    pub media: Option<PathBuf>,
}

impl Site {
    fn canonical(&self, path: &str) -> Option<String> {
        let base = self.base_url.as_ref()?;
        base.join(path.trim_start_matches('/'))
            .ok()
            .map(String::from)
    }

    fn context(&self, path: &str) -> Context {
        let mut context = Context::new();
        context.insert("site_name", &self.name);
        context.insert("base_path", &self.base_path);
        context.insert("canonical", &self.canonical(path));
        context
    }
}

#[derive(Serialize)]
struct Created {
    id: i64,
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(serve_root))
        .route("/search", get(search))
        .nest("/admin", admin())
        .route("/*path", get(serve_page));

    if let Some(media) = &state.site.media {
        router = router.nest_service("/media", ServeDir::new(media));
    }

    if !state.site.base_path.is_empty() {
        router = Router::new().nest(&state.site.base_path, router);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn admin() -> Router<AppState> {
    Router::new()
        .route("/registry", get(registry))
        .route("/registry/snippets/:name", get(snippet))
        .route("/pages/:id", get(page_meta).delete(delete_page))
        .route("/pages/:id/blog-index", post(create_blog_index))
        .route("/pages/:id/blog-post", post(create_post))
        .route("/pages/:id/tag-index", post(create_tag_index))
        .route("/pages/:id/new-blog-post", post(create_new_blog_post))
        .route("/pages/:id/publish", post(publish))
        .route("/pages/:id/unpublish", post(unpublish))
        .route("/pages/:id/move", post(move_page))
        .route("/blog-index/:id", get(blog_index).put(save_blog_index))
        .route("/blog-post/:id", get(blog_post).put(save_post))
        .route("/blog-post/:id/main-image", get(main_image))
        .route("/tag-index/:id", put(save_tag_index))
        .route("/new-blog-post/:id", get(new_blog_post).put(save_new_blog_post))
        .route("/categories", get(categories).post(create_category))
        .route(
            "/categories/:id",
            get(category).put(update_category).delete(delete_category),
        )
        .route("/images", get(images).post(create_image))
        .route("/images/:id", get(image).delete(delete_image))
}

async fn serve_root(State(state): State<AppState>, RawQuery(query): RawQuery) -> Result<Html<String>> {
    render_path(&state, "/", query.as_deref()).await
}

async fn serve_page(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Html<String>> {
    render_path(&state, &path, query.as_deref()).await
}

async fn render_path(state: &AppState, path: &str, query: Option<&str>) -> Result<Html<String>> {
    let page = state.store.resolve(path).await?;
    let kind = page
        .kind()
        .filter(|kind| state.registry.is_registered(*kind))
        .ok_or_else(|| ApiError::not_found(format!("page {path}")))?;

    let url = state.store.url_for(&page).await?;
    let mut context = state.site.context(&url);

    match kind {
        PageKind::Root => {
            let mut children = Vec::new();
            for child in state.store.children(&page).await? {
                if child.live {
                    children.push(state.store.meta(&child).await?);
                }
            }
            context.insert("page", &page.meta(url));
            context.insert("children", &children);
        }

        PageKind::BlogIndex => {
            let index = state.store.blog_index(page.id).await?;
            context.insert("page", &index.page);
            context.insert("intro", &index.intro);
            context.insert("blogpages", &state.store.index_listing(page.id).await?);
        }

        PageKind::BlogPost => {
            let post = state.store.post(page.id).await?;
            let parent_url = match state.store.parent(&page).await? {
                Some(parent) => Some(state.store.url_for(&parent).await?),
                None => None,
            };
            let tag_index_url = match state.store.first_live(PageKind::BlogTagIndex).await? {
                Some(tag_index) => Some(state.store.url_for(&tag_index).await?),
                None => None,
            };
            context.insert("page", &post.page);
            context.insert("post", &post);
            context.insert("parent_url", &parent_url);
            context.insert("tag_index_url", &tag_index_url);
        }

        PageKind::BlogTagIndex => {
            let TagQuery { tag } = serde_urlencoded::from_str(query.unwrap_or_default())
                .map_err(|err| ApiError::InvalidJson(err.to_string()))?;
            let blogpages = state.store.tag_listing(tag.as_deref()).await?;
            context.insert("page", &page.meta(url));
            context.insert("tag", &tag);
            context.insert("blogpages", &blogpages);
        }

        PageKind::NewBlogPost => {
            let post = state.store.new_blog_post(page.id).await?;
            context.insert("page", &post.page);
            context.insert("post", &post);
        }
    }

    Ok(Html(state.renderer.render(kind.template(), &context)?))
}

async fn search(
    State(state): State<AppState>,
    MyQuery(SearchQuery { q }): MyQuery<SearchQuery>,
) -> Result<Html<String>> {
    let blogpages = state.store.search(&state.registry, &q).await?;
    let mut context = state.site.context("/search");
    context.insert("query", q.trim());
    context.insert("blogpages", &blogpages);
    Ok(Html(state.renderer.render("search_results.html", &context)?))
}

async fn registry(State(state): State<AppState>) -> axum::response::Response {
    MyJson(state.registry.as_ref()).into_response()
}

async fn snippet(State(state): State<AppState>, Path(name): Path<String>) -> Result<axum::response::Response> {
    let snippet = state
        .registry
        .snippet(&name)
        .ok_or_else(|| ApiError::not_found(format!("snippet {name}")))?;
    Ok(MyJson(snippet).into_response())
}

async fn page_meta(State(state): State<AppState>, Path(id): Path<PageId>) -> Result<impl IntoResponse> {
    let page = state.store.page(id).await?;
    Ok(MyJson(state.store.meta(&page).await?))
}

fn created(id: i64) -> impl IntoResponse {
    (StatusCode::CREATED, MyJson(Created { id }))
}

async fn create_blog_index(
    State(state): State<AppState>,
    Path(parent): Path<PageId>,
    MyJson(form): MyJson<BlogIndexForm>,
) -> Result<impl IntoResponse> {
    Ok(created(state.store.create_blog_index(parent, form).await?))
}

async fn create_post(
    State(state): State<AppState>,
    Path(parent): Path<PageId>,
    MyJson(form): MyJson<PostForm>,
) -> Result<impl IntoResponse> {
    Ok(created(state.store.create_post(parent, form).await?))
}

async fn create_tag_index(
    State(state): State<AppState>,
    Path(parent): Path<PageId>,
    MyJson(form): MyJson<TagIndexForm>,
) -> Result<impl IntoResponse> {
    Ok(created(state.store.create_tag_index(parent, form).await?))
}

async fn create_new_blog_post(
    State(state): State<AppState>,
    Path(parent): Path<PageId>,
    MyJson(form): MyJson<NewBlogPostForm>,
) -> Result<impl IntoResponse> {
    Ok(created(state.store.create_new_blog_post(parent, form).await?))
}

async fn publish(State(state): State<AppState>, Path(id): Path<PageId>) -> Result<StatusCode> {
    state.store.publish(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unpublish(State(state): State<AppState>, Path(id): Path<PageId>) -> Result<StatusCode> {
    state.store.unpublish(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn move_page(
    State(state): State<AppState>,
    Path(id): Path<PageId>,
    MyJson(MoveForm { parent }): MyJson<MoveForm>,
) -> Result<StatusCode> {
    state.store.move_page(id, parent).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_page(State(state): State<AppState>, Path(id): Path<PageId>) -> Result<StatusCode> {
    state.store.delete_page(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn blog_index(State(state): State<AppState>, Path(id): Path<PageId>) -> Result<impl IntoResponse> {
    Ok(MyJson(state.store.blog_index(id).await?))
}

async fn save_blog_index(
    State(state): State<AppState>,
    Path(id): Path<PageId>,
    MyJson(form): MyJson<BlogIndexForm>,
) -> Result<StatusCode> {
    state.store.save_blog_index(id, form).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn blog_post(State(state): State<AppState>, Path(id): Path<PageId>) -> Result<impl IntoResponse> {
    Ok(MyJson(state.store.post(id).await?))
}

async fn main_image(State(state): State<AppState>, Path(id): Path<PageId>) -> Result<impl IntoResponse> {
    Ok(MyJson(state.store.main_image(id).await?))
}

async fn save_post(
    State(state): State<AppState>,
    Path(id): Path<PageId>,
    MyJson(form): MyJson<PostForm>,
) -> Result<StatusCode> {
    state.store.save_post(id, form).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_tag_index(
    State(state): State<AppState>,
    Path(id): Path<PageId>,
    MyJson(form): MyJson<TagIndexForm>,
) -> Result<StatusCode> {
    state.store.save_tag_index(id, form).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn new_blog_post(State(state): State<AppState>, Path(id): Path<PageId>) -> Result<impl IntoResponse> {
    Ok(MyJson(state.store.new_blog_post(id).await?))
}

async fn save_new_blog_post(
    State(state): State<AppState>,
    Path(id): Path<PageId>,
    MyJson(form): MyJson<NewBlogPostForm>,
) -> Result<StatusCode> {
    state.store.save_new_blog_post(id, form).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn categories(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(MyJson(state.store.categories().await?))
}

async fn create_category(
    State(state): State<AppState>,
    MyForm(form): MyForm<CategoryForm>,
) -> Result<impl IntoResponse> {
    let category = state.store.create_category(form).await?;
    Ok((StatusCode::CREATED, MyJson(category)))
}

async fn category(State(state): State<AppState>, Path(id): Path<CategoryId>) -> Result<impl IntoResponse> {
    Ok(MyJson(state.store.category(id).await?))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    MyForm(form): MyForm<CategoryForm>,
) -> Result<impl IntoResponse> {
    Ok(MyJson(state.store.update_category(id, form).await?))
}

async fn delete_category(State(state): State<AppState>, Path(id): Path<CategoryId>) -> Result<StatusCode> {
    state.store.delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn images(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(MyJson(state.store.images().await?))
}

async fn create_image(
    State(state): State<AppState>,
    MyJson(form): MyJson<ImageForm>,
) -> Result<impl IntoResponse> {
    let image = state.store.create_image(form).await?;
    Ok((StatusCode::CREATED, MyJson(image)))
}

async fn image(State(state): State<AppState>, Path(id): Path<ImageId>) -> Result<impl IntoResponse> {
    Ok(MyJson(state.store.image(id).await?))
}

async fn delete_image(State(state): State<AppState>, Path(id): Path<ImageId>) -> Result<StatusCode> {
    state.store.delete_image(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
