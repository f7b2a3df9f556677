use std::error::Error;

use crate::model;
use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(model::ApiError))]
pub struct MyJson<T>(pub T);

impl<T: Serialize> IntoResponse for MyJson<T> {
    fn into_response(self) -> axum::response::Response {
        let Self(value) = self;
        axum::Json(value).into_response()
    }
}

fn with_sources(error: &dyn Error) -> String {
    let mut s = format!("{}", error);

    let mut source_ = error.source();
    while let Some(source) = source_ {
        s.push_str(&format!(": {}", source));
        source_ = source.source();
    }

    s
}

impl From<JsonRejection> for model::ApiError {
    fn from(value: JsonRejection) -> Self {
        model::ApiError::InvalidJson(with_sources(&value))
    }
}

impl IntoResponse for model::ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            model::ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                axum::Json(serde_json::json!({"err": format!("{what} not found")})),
            ),

            model::ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                axum::Json(serde_json::json!({"err": "validation failed", "errors": errors})),
            ),

            model::ApiError::InvalidJson(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                axum::Json(serde_json::json!({"err": err})),
            ),

            err @ (model::ApiError::Tree(_)
            | model::ApiError::Template(_)
            | model::ApiError::Migrate(_)
            | model::ApiError::Sqlx(_)) => {
                tracing::error!(error = %with_sources(&err), "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    axum::Json(serde_json::json!({"err": "internal error"})),
                )
            }
        }
        .into_response()
    }
}

#[derive(FromRequest)]
#[from_request(via(axum::Form), rejection(model::ApiError))]
pub struct MyForm<T>(pub T);

impl<T: Serialize> IntoResponse for MyForm<T> {
    fn into_response(self) -> axum::response::Response {
        let Self(value) = self;
        axum::Json(value).into_response()
    }
}

impl From<FormRejection> for model::ApiError {
    fn from(value: FormRejection) -> Self {
        model::ApiError::InvalidJson(with_sources(&value))
    }
}

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(model::ApiError))]
pub struct MyQuery<T>(pub T);

impl From<QueryRejection> for model::ApiError {
    fn from(value: QueryRejection) -> Self {
        model::ApiError::InvalidJson(with_sources(&value))
    }
}
