use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::core::{PageCapture, PageRecord};
use crate::error::IndexError;
use crate::index::{augment_latest, Index};
use crate::query::search::{SearchQuery, SearchResult};
use crate::stats::KeySpaceStats;
use crate::storage::KvStore;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
    #[serde(default)]
    pub bookmarks: bool,
    pub domain: Option<String>,
    /// 逗号分隔，多个 tag 取交集
    pub tag: Option<String>,
}

impl From<SearchParams> for SearchQuery {
    fn from(p: SearchParams) -> Self {
        SearchQuery {
            text: p.q,
            limit: p.limit,
            bookmarks_only: p.bookmarks,
            domain: p.domain,
            tags: p
                .tag
                .map(|t| t.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
pub struct BookmarkBody {
    /// 毫秒时间戳
    pub timestamp: u64,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// IndexError → HTTP 响应：NotFound 404，InvalidCapture 400，其余 500
pub struct ApiError(IndexError);

impl From<IndexError> for ApiError {
    fn from(e: IndexError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else if matches!(self.0, IndexError::InvalidCapture(_)) {
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!("Request failed: {}", self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub struct QueryServer<S: KvStore> {
    pub index: Index<S>,
}

impl<S: KvStore> QueryServer<S> {
    pub fn new(index: Index<S>) -> Self {
        Self { index }
    }

    /// pageId 含 `/`，路径参数需百分号编码（`a.com%2Fdocs`）
    pub fn router(self) -> Router {
        Router::new()
            .route("/search", get(search_handler::<S>))
            .route("/page/:id", get(page_handler::<S>))
            .route("/status", get(status_handler::<S>))
            .route("/visit", post(visit_handler::<S>))
            .route(
                "/page/:id/bookmark",
                post(bookmark_handler::<S>).delete(unbookmark_handler::<S>),
            )
            .route(
                "/page/:id/tags/:tag",
                post(tag_handler::<S>).delete(untag_handler::<S>),
            )
            .with_state(self.index)
    }

    /// 在已绑定的 listener 上提供服务（测试用端口 0）
    pub async fn serve(self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!("HTTP Query Server listening on {}", addr);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    pub async fn run(self, port: u16) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        self.serve(listener).await
    }
}

async fn search_handler<S: KvStore>(
    State(index): State<Index<S>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let query = SearchQuery::from(params);
    Ok(Json(index.search(&query).await?))
}

async fn page_handler<S: KvStore>(
    State(index): State<Index<S>>,
    Path(id): Path<String>,
) -> Result<Json<PageRecord>, ApiError> {
    let page = index.fetch_existing_page(&id).await?;
    Ok(Json(augment_latest(&page)))
}

async fn status_handler<S: KvStore>(
    State(index): State<Index<S>>,
) -> Result<Json<KeySpaceStats>, ApiError> {
    Ok(Json(KeySpaceStats::collect(&index).await?))
}

async fn visit_handler<S: KvStore>(
    State(index): State<Index<S>>,
    Json(capture): Json<PageCapture>,
) -> Result<Json<PageRecord>, ApiError> {
    Ok(Json(index.record_visit(capture).await?))
}

async fn bookmark_handler<S: KvStore>(
    State(index): State<Index<S>>,
    Path(id): Path<String>,
    Json(body): Json<BookmarkBody>,
) -> Result<Json<PageRecord>, ApiError> {
    Ok(Json(index.record_bookmark(&id, body.timestamp).await?))
}

async fn unbookmark_handler<S: KvStore>(
    State(index): State<Index<S>>,
    Path(id): Path<String>,
) -> Result<Json<PageRecord>, ApiError> {
    Ok(Json(index.remove_bookmarks(&id).await?))
}

async fn tag_handler<S: KvStore>(
    State(index): State<Index<S>>,
    Path((id, tag)): Path<(String, String)>,
) -> Result<Json<PageRecord>, ApiError> {
    Ok(Json(index.add_tag(&id, &tag).await?))
}

async fn untag_handler<S: KvStore>(
    State(index): State<Index<S>>,
    Path((id, tag)): Path<(String, String)>,
) -> Result<Json<PageRecord>, ApiError> {
    Ok(Json(index.remove_tag(&id, &tag).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn params_map_onto_query() {
        let params = SearchParams {
            q: "rust async".into(),
            limit: Some(5),
            bookmarks: true,
            domain: Some("a.com".into()),
            tag: Some("work,later".into()),
        };
        let q = SearchQuery::from(params);
        assert_eq!(
            q,
            SearchQuery::text("rust async")
                .limit(5)
                .bookmarks_only()
                .domain("a.com")
                .tag("work")
                .tag("later")
        );
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = ApiError::from(IndexError::not_found("x")).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = ApiError::from(IndexError::InvalidCapture("bad".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = ApiError::from(IndexError::WriterClosed).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
