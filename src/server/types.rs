use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use utoipa::ToSchema;

use crate::indexer::RankedCandidate;

/// 搜索请求参数
#[derive(TryFromMultipart)]
pub struct SearchRequest {
    pub collection: String,
    pub file: Bytes,
    pub search_list: Option<usize>,
    pub sample_limit: Option<usize>,
    pub limit: Option<usize>,
}

/// 搜索表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct SearchForm {
    /// 集合名称
    pub collection: String,
    /// 上传的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// 搜索列表大小，越大越准确，但是速度越慢
    pub search_list: Option<usize>,
    /// 查询图片的特征点采样数量
    pub sample_limit: Option<usize>,
    /// 返回结果数量
    pub limit: Option<usize>,
}

/// 搜索响应
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct SearchResponse {
    /// 搜索耗时，单位为毫秒
    pub time: u32,
    /// 按置信度降序的候选结果
    pub result: Vec<RankedCandidate>,
}

/// 添加请求参数
#[derive(TryFromMultipart)]
pub struct AddRequest {
    pub collection: String,
    pub file: Vec<FieldData<Bytes>>,
}

/// 添加表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct AddForm {
    /// 集合名称
    pub collection: String,
    /// 上传的图片文件，可以是多张图片
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
}
