//! View collaborators: turn a matched route into a structured [`View`].

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use shared::{
    domain::Session,
    error::{ApiException, FailureKind},
};
use thiserror::Error;
use url::form_urlencoded;

use crate::gateway::ApiGateway;

/// Structured description of a page. Whatever draws the client decides how it
/// looks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    pub kind: String,
    pub title: String,
    pub data: Value,
}

impl View {
    pub fn new(kind: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            data: Value::Object(Map::new()),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn not_found(path: &str) -> Self {
        Self::new("not_found", "Page not found").with_data(serde_json::json!({ "path": path }))
    }
}

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("login required")]
    Unauthorized,
    #[error("{message}")]
    Api {
        kind: FailureKind,
        code: Option<i64>,
        message: String,
    },
    #[error("missing route parameter `{0}`")]
    MissingParam(String),
}

impl From<ApiException> for ViewError {
    fn from(value: ApiException) -> Self {
        match value.kind {
            FailureKind::Unauthorized => ViewError::Unauthorized,
            kind => ViewError::Api {
                kind,
                code: value.code,
                message: value.message,
            },
        }
    }
}

/// Everything a handler gets for one resolution.
pub struct RouteContext {
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub session: Session,
    pub gateway: Arc<ApiGateway>,
}

impl RouteContext {
    pub fn param(&self, name: &str) -> Result<&str, ViewError> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ViewError::MissingParam(name.to_string()))
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Path or query value for `name`, path parameters first.
    fn lookup(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .or_else(|| self.query.get(name))
            .map(String::as_str)
    }
}

#[async_trait]
pub trait ViewHandler: Send + Sync {
    async fn render(&self, ctx: &RouteContext) -> Result<View, ViewError>;
}

/// A page that needs no data, e.g. a form.
pub struct StaticView {
    kind: String,
    title: String,
}

impl StaticView {
    pub fn new(kind: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
        }
    }
}

#[async_trait]
impl ViewHandler for StaticView {
    async fn render(&self, ctx: &RouteContext) -> Result<View, ViewError> {
        let mut data = Map::new();
        for (name, value) in ctx.params.iter().chain(ctx.query.iter()) {
            data.insert(name.clone(), Value::String(value.clone()));
        }
        Ok(View::new(&self.kind, &self.title).with_data(Value::Object(data)))
    }
}

/// Placeholder for locations no route claims.
pub struct NotFoundView;

#[async_trait]
impl ViewHandler for NotFoundView {
    async fn render(&self, ctx: &RouteContext) -> Result<View, ViewError> {
        Ok(View::not_found(&ctx.path))
    }
}

#[derive(Debug, Clone)]
pub struct DataSource {
    key: String,
    template: String,
    optional: bool,
}

/// A page assembled from one or more GET calls issued concurrently.
///
/// Templates use `{name}` placeholders filled from path parameters, then query
/// parameters; values are url-encoded. The view renders only when every
/// required source succeeded. Optional sources that fail are rendered as
/// `null`.
pub struct FetchView {
    kind: String,
    title: String,
    sources: Vec<DataSource>,
}

impl FetchView {
    pub fn new(kind: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            sources: Vec::new(),
        }
    }

    pub fn source(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.sources.push(DataSource {
            key: key.into(),
            template: template.into(),
            optional: false,
        });
        self
    }

    pub fn optional_source(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.sources.push(DataSource {
            key: key.into(),
            template: template.into(),
            optional: true,
        });
        self
    }
}

#[async_trait]
impl ViewHandler for FetchView {
    async fn render(&self, ctx: &RouteContext) -> Result<View, ViewError> {
        let mut requests = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            requests.push((source, expand_template(&source.template, ctx)?));
        }

        let responses = join_all(
            requests
                .iter()
                .map(|(_, path)| ctx.gateway.get(path.as_str())),
        )
        .await;

        let mut data = Map::new();
        let mut first_error: Option<ViewError> = None;
        for ((source, _), response) in requests.iter().zip(responses) {
            match response.into_result() {
                Ok(value) => {
                    data.insert(source.key.clone(), value);
                }
                Err(_) if source.optional => {
                    data.insert(source.key.clone(), Value::Null);
                }
                Err(err) => {
                    let err = ViewError::from(err);
                    // An expired session outranks any other failure in the group.
                    let replace = match &first_error {
                        None => true,
                        Some(ViewError::Unauthorized) => false,
                        Some(_) => matches!(err, ViewError::Unauthorized),
                    };
                    if replace {
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        Ok(View::new(&self.kind, &self.title).with_data(Value::Object(data)))
    }
}

pub(crate) fn expand_template(template: &str, ctx: &RouteContext) -> Result<String, ViewError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];
        let value = ctx
            .lookup(name)
            .ok_or_else(|| ViewError::MissingParam(name.to_string()))?;
        out.extend(form_urlencoded::byte_serialize(value.as_bytes()));
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
#[path = "tests/views_tests.rs"]
mod tests;
