use serde::Serialize;

pub mod block;
pub mod database;
pub mod network;

pub type PageId = i64;
pub type ImageId = i64;
pub type CategoryId = i64;

/// Longest value accepted by the short text columns (titles, intros, captions,
/// category names, authors).
pub const MAX_CHARS: usize = 255;

pub const MAX_TAG_CHARS: usize = 100;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed")]
    Validation(Vec<ValidateError>),

    #[error("invalid request body: {0}")]
    InvalidJson(String),

    #[error(transparent)]
    Tree(#[from] crate::store::tree::TreePathError),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl ApiError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        ApiError::NotFound(what.to_string())
    }

    pub fn invalid(error: ValidateError) -> Self {
        ApiError::Validation(vec![error])
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidateError {
    Required { field: String },
    TooLong { field: String, max: usize },
    UnknownLink { field: String, label: String },
    UnknownImage { field: String, id: ImageId },
    UnknownCategory { id: CategoryId },
    DuplicateSlug { slug: String },
    WrongPageType { id: PageId, expected: String },
    InvalidMove { id: PageId, target: PageId },
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Checks a required short text field, collecting problems into `errors`.
pub fn check_short_text(field: &str, value: &str, required: bool, errors: &mut Vec<ValidateError>) {
    if required && value.trim().is_empty() {
        errors.push(ValidateError::Required {
            field: field.to_string(),
        });
    } else if value.chars().count() > MAX_CHARS {
        errors.push(ValidateError::TooLong {
            field: field.to_string(),
            max: MAX_CHARS,
        });
    }
}

pub fn into_result(errors: Vec<ValidateError>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}
