use serde::{Deserialize, Deserializer};
use time::Date;

use crate::model::block::Block;
use crate::model::{
    check_short_text, into_result, CategoryId, ImageId, PageId, Result, ValidateError,
    MAX_TAG_CHARS,
};
use crate::page::date_format;
use crate::richtext;

#[derive(Deserialize, Debug, Clone)]
pub struct PageForm {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
}

impl PageForm {
    /// The submitted slug, or one derived from the title.
    pub fn slug(&self) -> String {
        match self.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug::slugify(slug),
            _ => slug::slugify(&self.title),
        }
    }

    fn validate(&self, errors: &mut Vec<ValidateError>) {
        check_short_text("title", &self.title, true, errors);
        if !self.title.trim().is_empty() && self.slug().is_empty() {
            errors.push(ValidateError::Required {
                field: "slug".to_string(),
            });
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct BlogIndexForm {
    #[serde(flatten)]
    pub page: PageForm,
    #[serde(default)]
    pub intro: String,
}

impl BlogIndexForm {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        self.page.validate(&mut errors);
        richtext::validate("intro", &self.intro, &mut errors);
        into_result(errors)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TagIndexForm {
    #[serde(flatten)]
    pub page: PageForm,
}

impl TagIndexForm {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        self.page.validate(&mut errors);
        into_result(errors)
    }
}

/// Tags arrive either as a list or as the single string typed into a tag widget.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum TagInput {
    List(Vec<String>),
    Text(String),
}

impl Default for TagInput {
    fn default() -> Self {
        TagInput::List(Vec::new())
    }
}

impl TagInput {
    pub fn names(&self) -> Vec<String> {
        match self {
            TagInput::List(names) => dedup(names.iter().map(|name| name.trim().to_string())),
            TagInput::Text(text) => parse_tags(text),
        }
    }
}

fn dedup(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for name in names {
        if !name.is_empty() && !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Splits tag widget input. Quoted runs are kept whole; the remainder is split on
/// commas when it contains one and on whitespace otherwise.
pub fn parse_tags(input: &str) -> Vec<String> {
    let mut quoted = Vec::new();
    let mut rest = String::new();
    let mut current = String::new();
    let mut in_quote = false;

    for c in input.chars() {
        match c {
            '"' if in_quote => {
                quoted.push(std::mem::take(&mut current));
                in_quote = false;
            }
            '"' => in_quote = true,
            _ if in_quote => current.push(c),
            _ => rest.push(c),
        }
    }
    // unterminated quote
    rest.push_str(&current);

    let unquoted: Vec<String> = if rest.contains(',') {
        rest.split(',').map(|part| part.trim().to_string()).collect()
    } else {
        rest.split_whitespace().map(str::to_string).collect()
    };

    let mut names = dedup(
        quoted
            .into_iter()
            .map(|name| name.trim().to_string())
            .chain(unquoted),
    );
    names.sort();
    names
}

#[derive(Deserialize, Debug, Clone)]
pub struct GalleryImageForm {
    #[serde(default)]
    pub id: Option<i64>,
    pub image: ImageId,
    #[serde(default)]
    pub caption: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PostForm {
    #[serde(flatten)]
    pub page: PageForm,
    #[serde(with = "date_format")]
    pub date: Date,
    pub intro: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: TagInput,
    #[serde(default)]
    pub categories: Vec<CategoryId>,
    #[serde(default)]
    pub gallery: Vec<GalleryImageForm>,
}

impl PostForm {
    /// Checks what can be checked without the store.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        self.page.validate(&mut errors);
        check_short_text("intro", &self.intro, true, &mut errors);
        richtext::validate("body", &self.body, &mut errors);

        for (index, item) in self.gallery.iter().enumerate() {
            check_short_text(
                &format!("gallery[{index}].caption"),
                &item.caption,
                false,
                &mut errors,
            );
        }

        for name in self.tags.names() {
            if name.chars().count() > MAX_TAG_CHARS {
                errors.push(ValidateError::TooLong {
                    field: format!("tags.{name}"),
                    max: MAX_TAG_CHARS,
                });
            }
        }

        into_result(errors)
    }

    pub fn image_refs(&self) -> impl Iterator<Item = (String, ImageId)> + '_ {
        self.gallery
            .iter()
            .enumerate()
            .map(|(index, item)| (format!("gallery[{index}].image"), item.image))
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewBlogPostForm {
    #[serde(flatten)]
    pub page: PageForm,
    pub author: String,
    #[serde(with = "date_format")]
    pub date: Date,
    #[serde(default)]
    pub body: Vec<Block>,
}

impl NewBlogPostForm {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        self.page.validate(&mut errors);
        check_short_text("author", &self.author, true, &mut errors);
        for (index, block) in self.body.iter().enumerate() {
            block.validate(index, &mut errors);
        }
        into_result(errors)
    }

    pub fn image_refs(&self) -> impl Iterator<Item = (String, ImageId)> + '_ {
        self.body.iter().enumerate().flat_map(|(index, block)| {
            block
                .images()
                .map(move |id| (format!("body[{index}].{}", block.kind()), id))
        })
    }
}

/// Body of the category create and update forms.
#[derive(Deserialize, Debug, Clone)]
pub struct CategoryForm {
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub icon: Option<ImageId>,
}

impl CategoryForm {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        check_short_text("name", &self.name, true, &mut errors);
        into_result(errors)
    }
}

/// An empty `icon=` field in a form means no icon.
fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<ImageId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ImageForm {
    pub title: String,
    pub file: String,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
}

impl ImageForm {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        check_short_text("title", &self.title, true, &mut errors);
        if self.file.trim().is_empty() {
            errors.push(ValidateError::Required {
                field: "file".to_string(),
            });
        }
        into_result(errors)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct MoveForm {
    pub parent: PageId,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct TagQuery {
    pub tag: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn comma_separated_tags() {
        assert_eq!(
            parse_tags("rust, web dev ,rust,,"),
            vec!["rust".to_string(), "web dev".to_string()]
        );
    }

    #[test]
    fn space_separated_tags_without_commas() {
        assert_eq!(parse_tags("b a  b"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn quoted_tags_stay_whole() {
        assert_eq!(
            parse_tags(r#""new york" travel"#),
            vec!["new york".to_string(), "travel".to_string()]
        );
        assert_eq!(parse_tags(r#""open"#), vec!["open".to_string()]);
        assert!(parse_tags("  ").is_empty());
    }

    #[test]
    fn tags_are_case_sensitive() {
        assert_eq!(parse_tags("Rust rust"), vec!["Rust".to_string(), "rust".to_string()]);
    }

    #[test]
    fn post_form_accepts_tag_list_or_text() {
        let form: PostForm = serde_json::from_value(json!({
            "title": "First post",
            "date": "2022-01-01",
            "intro": "hello",
            "tags": "one, two"
        }))
        .unwrap();
        assert_eq!(form.tags.names(), vec!["one".to_string(), "two".to_string()]);
        assert_eq!(form.page.slug(), "first-post");
        assert!(form.validate().is_ok());

        let form: PostForm = serde_json::from_value(json!({
            "title": "First post",
            "slug": "Custom Slug",
            "date": "2022-01-01",
            "intro": "hello",
            "tags": ["b", " a ", "b"]
        }))
        .unwrap();
        assert_eq!(form.tags.names(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(form.page.slug(), "custom-slug");
    }

    #[test]
    fn post_form_rejects_long_fields() {
        let form: PostForm = serde_json::from_value(json!({
            "title": "",
            "date": "2022-01-01",
            "intro": "x".repeat(256),
            "gallery": [{"image": 1, "caption": "y".repeat(256)}]
        }))
        .unwrap();

        let Err(crate::model::ApiError::Validation(errors)) = form.validate() else {
            panic!("expected validation errors");
        };
        assert_eq!(
            errors,
            vec![
                ValidateError::Required {
                    field: "title".into()
                },
                ValidateError::TooLong {
                    field: "intro".into(),
                    max: 255
                },
                ValidateError::TooLong {
                    field: "gallery[0].caption".into(),
                    max: 255
                },
            ]
        );
    }

    #[test]
    fn new_post_form_collects_block_images() {
        let form: NewBlogPostForm = serde_json::from_value(json!({
            "title": "Mixed",
            "author": "me",
            "date": "2022-01-04",
            "body": [
                {"type": "heading", "value": "Hi"},
                {"type": "image", "value": 4},
                {"type": "person", "value": {
                    "first_name": "A", "surname": "B", "photo": 6, "biography": "C"
                }}
            ]
        }))
        .unwrap();
        assert!(form.validate().is_ok());
        assert_eq!(
            form.image_refs().collect::<Vec<_>>(),
            vec![
                ("body[1].image".to_string(), 4),
                ("body[2].person".to_string(), 6)
            ]
        );
    }

    #[test]
    fn category_form_from_urlencoded() {
        let form: CategoryForm = serde_urlencoded::from_str("name=Travel&icon=").unwrap();
        assert_eq!(form.icon, None);

        let form: CategoryForm = serde_urlencoded::from_str("name=Travel&icon=3").unwrap();
        assert_eq!(form.icon, Some(3));

        let form: CategoryForm = serde_urlencoded::from_str("name=Travel").unwrap();
        assert_eq!(form.icon, None);
        assert!(form.validate().is_ok());

        assert!(serde_urlencoded::from_str::<CategoryForm>("name=Travel&icon=abc").is_err());
    }

    #[test]
    fn tag_query_is_optional() {
        let query: TagQuery = serde_urlencoded::from_str("").unwrap();
        assert_eq!(query.tag, None);
        let query: TagQuery = serde_urlencoded::from_str("tag=new%20york").unwrap();
        assert_eq!(query.tag.as_deref(), Some("new york"));
    }
}
