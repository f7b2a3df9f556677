use sqlx::{types::Json, FromRow};
use time::{Date, OffsetDateTime};

use crate::model::block::Block;
use crate::model::{CategoryId, ImageId, PageId};
use crate::page;
use crate::registry::PageKind;

#[derive(FromRow, Debug, Clone)]
pub struct DbPage {
    pub id: PageId,
    pub path: String,
    pub depth: i64,
    pub numchild: i64,
    pub title: String,
    pub slug: String,
    pub content_type: String,
    pub live: bool,
    pub first_published_at: Option<OffsetDateTime>,
    pub last_published_at: Option<OffsetDateTime>,
}

impl DbPage {
    pub fn kind(&self) -> Option<PageKind> {
        PageKind::from_content_type(&self.content_type)
    }

    pub fn meta(&self, url: String) -> page::PageMeta {
        page::PageMeta {
            id: self.id,
            title: self.title.clone(),
            slug: self.slug.clone(),
            url,
            kind: self.kind().unwrap_or(PageKind::Root),
            depth: self.depth,
            live: self.live,
            first_published_at: self.first_published_at,
            last_published_at: self.last_published_at,
        }
    }
}

#[derive(FromRow, Debug, Clone)]
pub struct DbImage {
    pub id: ImageId,
    pub title: String,
    pub file: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub created_at: OffsetDateTime,
}

impl From<DbImage> for page::Image {
    fn from(image: DbImage) -> Self {
        page::Image {
            id: image.id,
            title: image.title,
            file: image.file,
            width: image.width,
            height: image.height,
        }
    }
}

#[derive(FromRow, Debug, Clone)]
pub struct DbCategory {
    pub id: CategoryId,
    pub name: String,
    pub icon_id: Option<ImageId>,
}

#[derive(FromRow, Debug, Clone)]
pub struct DbBlogIndexPage {
    pub page_id: PageId,
    pub intro: String,
}

#[derive(FromRow, Debug, Clone)]
pub struct DbBlogPage {
    pub page_id: PageId,
    pub date: Date,
    pub intro: String,
    pub body: String,
}

#[derive(FromRow, Debug, Clone)]
pub struct DbGalleryImage {
    pub id: i64,
    pub page_id: PageId,
    pub sort_order: i64,
    pub image_id: ImageId,
    pub caption: String,
}

#[derive(FromRow, Debug, Clone)]
pub struct DbNewBlogPage {
    pub page_id: PageId,
    pub author: String,
    pub date: Date,
    pub body: Json<Vec<Block>>,
}

/// A tag name attached to one post.
#[derive(FromRow, Debug, Clone)]
pub struct DbPostTag {
    pub page_id: PageId,
    pub name: String,
}

#[derive(FromRow, Debug, Clone)]
pub struct DbPostCategory {
    pub page_id: PageId,
    pub category_id: CategoryId,
}
