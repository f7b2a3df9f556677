//! Template rendering. Built-in templates are compiled in; a configured directory
//! may replace any of them by name.

use std::path::Path;

use tera::{Context, Tera};

use crate::model::Result;

const BUILTIN: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("home_page.html", include_str!("../templates/home_page.html")),
    ("blog_index_page.html", include_str!("../templates/blog_index_page.html")),
    ("blog_page.html", include_str!("../templates/blog_page.html")),
    ("blog_tag_index_page.html", include_str!("../templates/blog_tag_index_page.html")),
    ("new_blog_page.html", include_str!("../templates/new_blog_page.html")),
    ("search_results.html", include_str!("../templates/search_results.html")),
];

#[derive(Debug)]
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    pub fn new(overrides: Option<&Path>) -> Result<Self> {
        let mut tera = match overrides {
            Some(dir) => Tera::parse(&format!("{}/**/*.html", dir.display()))?,
            None => Tera::default(),
        };

        let present: Vec<String> = tera.get_template_names().map(str::to_string).collect();
        for name in &present {
            tracing::info!(template = %name, "using template override");
        }

        let missing = BUILTIN
            .iter()
            .copied()
            .filter(|(name, _)| !present.iter().any(|p| p == name));
        // also links inheritance for the overrides
        tera.add_raw_templates(missing)?;

        Ok(Renderer { tera })
    }

    pub fn render(&self, template: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template, context)?)
    }
}
