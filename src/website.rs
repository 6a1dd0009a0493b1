use std::borrow::Cow;

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::errors::AppError;

pub type HtmlResult = Result<Html<String>, AppError>;

pub struct Meta<'a> {
    pub meta_title: Cow<'a, str>,
    pub meta_description: Cow<'a, str>,
}

impl<'a> Meta<'a> {
    pub fn new(meta_title: impl Into<Cow<'a, str>>) -> Self {
        Self {
            meta_title: meta_title.into(),
            meta_description: Cow::default(),
        }
    }
}

pub fn template_to_response<T: Template>(tmpl: &T) -> HtmlResult {
    tmpl.render().map(Html).map_err(AppError::TemplateError)
}

/// Renders a template with a status other than 200, typically a form
/// shown again with its errors.
pub fn template_with_status<T: Template>(status: StatusCode, tmpl: &T) -> Result<Response, AppError> {
    Ok((status, template_to_response(tmpl)?).into_response())
}
