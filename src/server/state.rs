use std::sync::Arc;

use crate::cli::server::ServerCommand;
use crate::config::{FeatureOptions, SearchOptions};
use crate::identity::IdentityRegistry;
use crate::index::HnswIndex;

/// 应用状态
pub struct AppState {
    /// 向量索引
    pub index: HnswIndex,
    /// identity 存储注册表
    pub ids: IdentityRegistry,
    /// 特征提取配置
    pub feature: FeatureOptions,
    /// 搜索配置
    pub search: SearchOptions,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(index: HnswIndex, ids: IdentityRegistry, opts: &ServerCommand) -> Arc<Self> {
        Arc::new(AppState { index, ids, feature: opts.feature.clone(), search: opts.search.clone() })
    }
}
