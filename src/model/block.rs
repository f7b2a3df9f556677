//! Stream-field blocks of the mixed-content post body.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{ImageId, ValidateError};
use crate::page::{Image, RenderedBlock};
use crate::richtext;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Block {
    Person(PersonBlock),
    Heading(String),
    /// Markdown source.
    Paragraph(String),
    Image(ImageId),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PersonBlock {
    pub first_name: String,
    pub surname: String,
    #[serde(default)]
    pub photo: Option<ImageId>,
    pub biography: String,
}

impl Block {
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Person(_) => "person",
            Block::Heading(_) => "heading",
            Block::Paragraph(_) => "paragraph",
            Block::Image(_) => "image",
        }
    }

    pub fn images(&self) -> impl Iterator<Item = ImageId> {
        let image = match self {
            Block::Image(id) => Some(*id),
            Block::Person(person) => person.photo,
            Block::Heading(_) | Block::Paragraph(_) => None,
        };
        image.into_iter()
    }

    /// Field-level checks. Image references are checked against the store separately.
    pub fn validate(&self, index: usize, errors: &mut Vec<ValidateError>) {
        let field = |name: &str| format!("body[{index}].{name}");

        let mut required = |name: &str, value: &str| {
            if value.trim().is_empty() {
                errors.push(ValidateError::Required { field: field(name) });
            }
        };

        match self {
            Block::Heading(text) => required("heading", text),
            Block::Paragraph(text) => required("paragraph", text),
            Block::Image(_) => {}
            Block::Person(person) => {
                required("first_name", &person.first_name);
                required("surname", &person.surname);
                required("biography", &person.biography);
            }
        }

        match self {
            Block::Paragraph(text) => richtext::validate(&field("paragraph"), text, errors),
            Block::Person(person) => {
                richtext::validate(&field("biography"), &person.biography, errors)
            }
            _ => {}
        }
    }

    /// A block whose image has since been deleted renders without it.
    pub fn render(&self, images: &HashMap<ImageId, Image>) -> RenderedBlock {
        match self {
            Block::Heading(text) => RenderedBlock::Heading { text: text.clone() },
            Block::Paragraph(text) => RenderedBlock::Paragraph {
                html: richtext::render(text),
            },
            Block::Image(id) => RenderedBlock::Image {
                image: images.get(id).cloned(),
            },
            Block::Person(person) => RenderedBlock::Person {
                first_name: person.first_name.clone(),
                surname: person.surname.clone(),
                photo: person.photo.and_then(|id| images.get(&id).cloned()),
                biography: richtext::render(&person.biography),
            },
        }
    }
}
