//! Page and snippet types known to the site, with their admin panel layouts.
//!
//! A [`Registry`] is built once at startup and shared with the handlers.

use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Root,
    BlogIndex,
    BlogPost,
    BlogTagIndex,
    NewBlogPost,
}

impl PageKind {
    pub const ALL: [PageKind; 5] = [
        PageKind::Root,
        PageKind::BlogIndex,
        PageKind::BlogPost,
        PageKind::BlogTagIndex,
        PageKind::NewBlogPost,
    ];

    /// Value stored in `pages.content_type`.
    pub const fn content_type(self) -> &'static str {
        match self {
            PageKind::Root => "wagtailcore.page",
            PageKind::BlogIndex => "blog.blogindexpage",
            PageKind::BlogPost => "blog.blogpage",
            PageKind::BlogTagIndex => "blog.blogtagindexpage",
            PageKind::NewBlogPost => "blog.newblogpage",
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<PageKind> {
        PageKind::ALL
            .into_iter()
            .find(|kind| kind.content_type() == content_type)
    }

    pub const fn template(self) -> &'static str {
        match self {
            PageKind::Root => "home_page.html",
            PageKind::BlogIndex => "blog_index_page.html",
            PageKind::BlogPost => "blog_page.html",
            PageKind::BlogTagIndex => "blog_tag_index_page.html",
            PageKind::NewBlogPost => "new_blog_page.html",
        }
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.content_type())
    }
}

/// Editor widget the admin surface uses for a field.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Widget {
    TextInput,
    DatePicker,
    RichText,
    TagInput,
    CheckboxSelectMultiple,
    ImageChooser,
    InlineList,
    StreamField,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panel {
    pub field: &'static str,
    pub widget: Widget,
    pub label: Option<&'static str>,
    /// Groups panels under a shared heading.
    pub heading: Option<&'static str>,
}

const fn panel(field: &'static str, widget: Widget) -> Panel {
    Panel {
        field,
        widget,
        label: None,
        heading: None,
    }
}

const fn grouped(field: &'static str, widget: Widget, heading: &'static str) -> Panel {
    Panel {
        field,
        widget,
        label: None,
        heading: Some(heading),
    }
}

const TITLE: Panel = panel("title", Widget::TextInput);

pub const BLOG_INDEX_PANELS: &[Panel] = &[TITLE, panel("intro", Widget::RichText)];

pub const BLOG_POST_PANELS: &[Panel] = &[
    TITLE,
    panel("intro", Widget::TextInput),
    panel("body", Widget::RichText),
    Panel {
        field: "gallery",
        widget: Widget::InlineList,
        label: Some("Gallery images"),
        heading: None,
    },
    grouped("date", Widget::DatePicker, "Blog information"),
    grouped("tags", Widget::TagInput, "Blog information"),
    grouped("categories", Widget::CheckboxSelectMultiple, "Blog information"),
];

pub const GALLERY_IMAGE_PANELS: &[Panel] = &[
    panel("image", Widget::ImageChooser),
    panel("caption", Widget::TextInput),
];

pub const TAG_INDEX_PANELS: &[Panel] = &[TITLE];

pub const NEW_BLOG_POST_PANELS: &[Panel] = &[
    TITLE,
    panel("author", Widget::TextInput),
    panel("date", Widget::DatePicker),
    panel("body", Widget::StreamField),
];

pub const CATEGORY_PANELS: &[Panel] = &[
    panel("name", Widget::TextInput),
    panel("icon", Widget::ImageChooser),
];

#[derive(Serialize, Debug, Clone)]
pub struct PageType {
    pub kind: PageKind,
    pub verbose_name: &'static str,
    pub panels: &'static [Panel],
    /// Panels of the child rows edited inline, keyed by relation name.
    pub inline_panels: &'static [(&'static str, &'static [Panel])],
    pub search_fields: &'static [&'static str],
}

#[derive(Serialize, Debug, Clone)]
pub struct SnippetType {
    pub name: &'static str,
    pub verbose_name_plural: &'static str,
    pub panels: &'static [Panel],
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct Registry {
    pages: Vec<PageType>,
    snippets: Vec<SnippetType>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every page and snippet type of the blog section.
    pub fn blog() -> Self {
        let mut registry = Registry::new();

        registry.register_page(PageType {
            kind: PageKind::BlogIndex,
            verbose_name: "blog index page",
            panels: BLOG_INDEX_PANELS,
            inline_panels: &[],
            search_fields: &["title"],
        });
        registry.register_page(PageType {
            kind: PageKind::BlogPost,
            verbose_name: "blog page",
            panels: BLOG_POST_PANELS,
            inline_panels: &[("gallery", GALLERY_IMAGE_PANELS)],
            search_fields: &["title", "intro", "body"],
        });
        registry.register_page(PageType {
            kind: PageKind::BlogTagIndex,
            verbose_name: "blog tag index page",
            panels: TAG_INDEX_PANELS,
            inline_panels: &[],
            search_fields: &["title"],
        });
        registry.register_page(PageType {
            kind: PageKind::NewBlogPost,
            verbose_name: "new blog page",
            panels: NEW_BLOG_POST_PANELS,
            inline_panels: &[],
            search_fields: &["title"],
        });
        registry.register_snippet(SnippetType {
            name: "blogcategory",
            verbose_name_plural: "blog categories",
            panels: CATEGORY_PANELS,
        });

        registry
    }

    /// Registers a page type, replacing an earlier registration of the same kind.
    pub fn register_page(&mut self, page_type: PageType) {
        tracing::debug!(kind = %page_type.kind, "registering page type");
        self.pages.retain(|existing| existing.kind != page_type.kind);
        self.pages.push(page_type);
    }

    pub fn register_snippet(&mut self, snippet: SnippetType) {
        tracing::debug!(name = snippet.name, "registering snippet");
        self.snippets.retain(|existing| existing.name != snippet.name);
        self.snippets.push(snippet);
    }

    pub fn page_type(&self, kind: PageKind) -> Option<&PageType> {
        self.pages.iter().find(|page_type| page_type.kind == kind)
    }

    pub fn snippet(&self, name: &str) -> Option<&SnippetType> {
        self.snippets.iter().find(|snippet| snippet.name == name)
    }

    pub fn is_registered(&self, kind: PageKind) -> bool {
        kind == PageKind::Root || self.page_type(kind).is_some()
    }

    pub fn search_fields(&self, kind: PageKind) -> &'static [&'static str] {
        self.page_type(kind)
            .map(|page_type| page_type.search_fields)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn content_types_round_trip() {
        for kind in PageKind::ALL {
            assert_eq!(PageKind::from_content_type(kind.content_type()), Some(kind));
        }
        assert_eq!(PageKind::from_content_type("blog.unknown"), None);
    }

    #[test]
    fn blog_registry_has_every_type() {
        let registry = Registry::blog();
        for kind in PageKind::ALL {
            assert!(registry.is_registered(kind), "{kind} missing");
        }
        let category = registry.snippet("blogcategory").unwrap();
        assert_eq!(category.verbose_name_plural, "blog categories");
        assert_eq!(
            registry.search_fields(PageKind::BlogPost),
            &["title", "intro", "body"]
        );
        let post = registry.page_type(PageKind::BlogPost).unwrap();
        assert_eq!(post.inline_panels, &[("gallery", GALLERY_IMAGE_PANELS)]);
    }

    #[test]
    fn empty_registry_knows_only_root() {
        let registry = Registry::new();
        assert!(registry.is_registered(PageKind::Root));
        assert!(!registry.is_registered(PageKind::BlogPost));
        assert!(registry.search_fields(PageKind::BlogPost).is_empty());
    }

    #[test]
    fn registering_twice_replaces() {
        let mut registry = Registry::new();
        let choices: [&'static [&'static str]; 2] = [&["title"], &["intro"]];
        for search_fields in choices {
            registry.register_page(PageType {
                kind: PageKind::BlogPost,
                verbose_name: "blog page",
                panels: BLOG_POST_PANELS,
                inline_panels: &[],
                search_fields,
            });
        }
        assert_eq!(registry.search_fields(PageKind::BlogPost), &["intro"]);
    }

    #[test]
    fn post_panels_group_blog_information() {
        let grouped: Vec<_> = BLOG_POST_PANELS
            .iter()
            .filter(|panel| panel.heading == Some("Blog information"))
            .map(|panel| (panel.field, panel.widget))
            .collect();
        assert_eq!(
            grouped,
            vec![
                ("date", Widget::DatePicker),
                ("tags", Widget::TagInput),
                ("categories", Widget::CheckboxSelectMultiple),
            ]
        );
    }
}
