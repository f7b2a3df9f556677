//! Values handed to templates and returned by the admin API.

use serde::{ser::SerializeStruct, Serialize, Serializer};
use time::{Date, OffsetDateTime};

use crate::model::{CategoryId, ImageId, PageId};
use crate::registry::PageKind;

time::serde::format_description!(pub(crate) date_format, Date, "[year]-[month]-[day]");

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(transparent)]
pub struct Html(pub String);

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PageMeta {
    pub id: PageId,
    pub title: String,
    pub slug: String,
    pub url: String,
    pub kind: PageKind,
    pub depth: i64,
    pub live: bool,
    #[serde(with = "time::serde::iso8601::option")]
    pub first_published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::iso8601::option")]
    pub last_published_at: Option<OffsetDateTime>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub id: ImageId,
    pub title: String,
    pub file: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct GalleryImage {
    pub id: i64,
    pub sort_order: i64,
    pub image: Image,
    pub caption: String,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub icon: Option<Image>,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Post {
    pub page: PageMeta,
    pub date: Date,
    pub intro: String,
    pub body: Html,
    pub tags: Vec<String>,
    pub categories: Vec<Category>,
    pub gallery: Vec<GalleryImage>,
}

impl Post {
    /// Image of the lowest-ordered gallery entry.
    pub fn main_image(&self) -> Option<&Image> {
        self.gallery
            .iter()
            .min_by_key(|item| item.sort_order)
            .map(|item| &item.image)
    }
}

// Templates cannot call methods, so `main_image` is serialized alongside the fields.
impl Serialize for Post {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct DateField<'a>(&'a Date);

        impl Serialize for DateField<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                date_format::serialize(self.0, serializer)
            }
        }

        let mut post = serializer.serialize_struct("Post", 8)?;
        post.serialize_field("page", &self.page)?;
        post.serialize_field("date", &DateField(&self.date))?;
        post.serialize_field("intro", &self.intro)?;
        post.serialize_field("body", &self.body)?;
        post.serialize_field("tags", &self.tags)?;
        post.serialize_field("categories", &self.categories)?;
        post.serialize_field("gallery", &self.gallery)?;
        post.serialize_field("main_image", &self.main_image())?;
        post.end()
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct IndexPage {
    pub page: PageMeta,
    pub intro: Html,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderedBlock {
    Heading {
        text: String,
    },
    Paragraph {
        html: Html,
    },
    Image {
        image: Option<Image>,
    },
    Person {
        first_name: String,
        surname: String,
        photo: Option<Image>,
        biography: Html,
    },
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MixedPost {
    pub page: PageMeta,
    pub author: String,
    #[serde(with = "date_format")]
    pub date: Date,
    pub body: Vec<RenderedBlock>,
}
