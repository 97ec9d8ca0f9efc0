pub mod hnsw;

use anyhow::Result;

use crate::feature::Descriptor;

pub use self::hnsw::HnswIndex;

/// 单个查询描述符的一条最近邻结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMatch {
    /// 候选图片 ID
    pub id: u64,
    /// 归一化到 [0, 1] 的距离，越小越相似
    pub distance: f32,
}

/// 向量索引的抽象
///
/// 索引本身是外部能力，核心层只依赖按集合写入和按描述符查询两个
/// 操作，集合的创建、删除等管理操作由服务层直接对接具体实现。
/// 实现需要支持多集合并发调用，允许在集合内部串行
pub trait VectorIndex: Send + Sync {
    /// 将一批 (图片 ID, 描述符) 写入集合，两个切片一一对应
    fn insert(&self, collection: &str, ids: &[u64], descriptors: &[Descriptor]) -> Result<()>;

    /// 对每个查询描述符做近似最近邻搜索，返回与输入同序的结果列表
    ///
    /// search_list 控制索引内部精度与速度的权衡，原样透传
    fn search(
        &self,
        collection: &str,
        descriptors: &[Descriptor],
        search_list: usize,
        limit: usize,
    ) -> Result<Vec<Vec<RawMatch>>>;
}
