use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum_typed_multipart::TypedMultipart;
use log::info;
use serde_json::{Value, json};
use tokio::task::block_in_place;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::Indexer;
use crate::feature::SurfDetector;
use crate::indexer::Added;

/// 搜索一张图片
#[utoipa::path(
    post,
    path = "/search",
    request_body(content = SearchForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = SearchResponse),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<SearchRequest>,
) -> Result<Json<Value>> {
    let start = Instant::now();

    info!("正在搜索上传图片，集合 {}", data.collection);

    let indexer = Indexer::new(&state.index, &state.ids, state.feature.filter);
    let result = block_in_place(|| {
        let mut detector = SurfDetector::new(&state.feature)?;
        indexer.search_image(
            &mut detector,
            &data.collection,
            &data.file,
            data.search_list.unwrap_or(state.search.search_list),
            data.sample_limit.unwrap_or(state.search.sample_limit),
            data.limit.unwrap_or(state.search.limit),
        )
    })?;

    Ok(Json(json!({
        "time": start.elapsed().as_millis(),
        "result": result,
    })))
}

/// 添加图片到集合
#[utoipa::path(
    post,
    path = "/add",
    request_body(content = AddForm, content_type = "multipart/form-data")
)]
pub async fn add_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<AddRequest>,
) -> Result<Json<Value>> {
    let indexer = Indexer::new(&state.index, &state.ids, state.feature.filter);

    let mut added = 0;
    for file in &data.file {
        let name = match &file.metadata.file_name {
            Some(file_name) => file_name,
            None => {
                return Err(anyhow::anyhow!("文件名不能为空").into());
            }
        };

        let status = block_in_place(|| {
            let mut detector = SurfDetector::new(&state.feature)?;
            indexer.add_image(
                &mut detector,
                &data.collection,
                &file.contents,
                name,
                state.feature.max_keypoints,
            )
        })?;
        if status == Added::Indexed {
            added += 1;
        }
    }
    block_in_place(|| state.index.save(&data.collection))?;

    Ok(Json(json!({ "added": added })))
}
