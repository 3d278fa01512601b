//! Blog endpoints: articles, comments, taxonomy, notifications, user admin.

use serde::Serialize;
use serde_json::{json, Value};
use shared::{
    domain::{ArticleId, CommentId, NotificationId, UserId},
    protocol::ApiResponse,
};

use super::with_query;
use crate::gateway::{ApiGateway, CallOptions};

#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub page: Option<u32>,
    pub category_id: Option<i64>,
    pub tag_id: Option<i64>,
}

pub async fn articles(gateway: &ApiGateway, query: &ArticleQuery) -> ApiResponse {
    let page = query.page.map(|page| page.to_string());
    let category = query.category_id.map(|id| id.to_string());
    let tag = query.tag_id.map(|id| id.to_string());

    let mut pairs = Vec::new();
    if let Some(page) = page.as_deref() {
        pairs.push(("page", page));
    }
    if let Some(category) = category.as_deref() {
        pairs.push(("category_id", category));
    }
    if let Some(tag) = tag.as_deref() {
        pairs.push(("tag_id", tag));
    }
    gateway.get(&with_query("/articles", &pairs)).await
}

pub async fn article(gateway: &ApiGateway, id: ArticleId) -> ApiResponse {
    gateway.get(&format!("/articles/{id}")).await
}

/// `article` carries title, content, category and tags as the editor sends them.
pub async fn create_article(gateway: &ApiGateway, article: Value) -> ApiResponse {
    gateway.post("/articles", article).await
}

pub async fn update_article(gateway: &ApiGateway, id: ArticleId, article: Value) -> ApiResponse {
    gateway.put(&format!("/articles/{id}"), article).await
}

pub async fn delete_article(gateway: &ApiGateway, id: ArticleId) -> ApiResponse {
    gateway.delete(&format!("/articles/{id}")).await
}

pub async fn like_article(gateway: &ApiGateway, id: ArticleId) -> ApiResponse {
    gateway
        .call(&format!("/articles/{id}/like"), CallOptions::post())
        .await
}

pub async fn comments(gateway: &ApiGateway, article: ArticleId) -> ApiResponse {
    gateway.get(&format!("/articles/{article}/comments")).await
}

/// `parent` answers an existing comment.
pub async fn create_comment(
    gateway: &ApiGateway,
    article: ArticleId,
    content: &str,
    parent: Option<CommentId>,
) -> ApiResponse {
    let mut body = json!({ "content": content });
    if let Some(parent) = parent {
        body["parent_id"] = json!(parent);
    }
    gateway
        .post(&format!("/articles/{article}/comments"), body)
        .await
}

pub async fn delete_comment(gateway: &ApiGateway, id: CommentId) -> ApiResponse {
    gateway.delete(&format!("/comments/{id}")).await
}

pub async fn like_comment(gateway: &ApiGateway, id: CommentId) -> ApiResponse {
    gateway
        .call(&format!("/comments/{id}/like"), CallOptions::post())
        .await
}

pub async fn categories(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/categories").await
}

pub async fn tags(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/tags").await
}

pub async fn search(gateway: &ApiGateway, keyword: &str) -> ApiResponse {
    gateway.get(&with_query("/search", &[("q", keyword)])).await
}

pub async fn notifications(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/notifications").await
}

pub async fn mark_notification_read(gateway: &ApiGateway, id: NotificationId) -> ApiResponse {
    gateway
        .call(&format!("/notifications/{id}/read"), CallOptions::put())
        .await
}

pub async fn admin_users(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/admin/users").await
}

/// `changes` holds the fields to update, e.g. `role` or `status`.
pub async fn admin_update_user(gateway: &ApiGateway, id: UserId, changes: Value) -> ApiResponse {
    gateway.put(&format!("/admin/users/{id}"), changes).await
}

pub async fn admin_delete_user(gateway: &ApiGateway, id: UserId) -> ApiResponse {
    gateway.delete(&format!("/admin/users/{id}")).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Moderation {
    Approved,
    Rejected,
}

/// Comments waiting for moderation.
pub async fn pending_comments(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/admin/comments/pending").await
}

pub async fn moderate_comment(gateway: &ApiGateway, id: CommentId, decision: Moderation) -> ApiResponse {
    gateway
        .put(
            &format!("/admin/comments/{id}/approve"),
            json!({ "status": decision }),
        )
        .await
}
