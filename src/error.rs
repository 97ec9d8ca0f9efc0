use thiserror::Error;

/// 核心层需要让调用方区分的错误类型
///
/// 其余错误（存储、索引 I/O 等）直接通过 anyhow 原样向上传播
#[derive(Debug, Error)]
pub enum Error {
    /// 输入字节不是有效的图片
    #[error("无法解码图片: {0}")]
    Decode(String),
    /// 集合不存在
    #[error("集合 {0} 不存在")]
    CollectionNotFound(String),
    /// 集合已存在
    #[error("集合 {0} 已存在")]
    CollectionExists(String),
}
