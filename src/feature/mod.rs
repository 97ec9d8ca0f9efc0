pub mod surf;
pub mod uniform;

use anyhow::Result;

pub use self::surf::{DETECTOR, FEATURE_OPTIONS, SurfDetector};
pub use self::uniform::{UniformFilter, uniformize};

/// 描述符维数，由向量索引的 schema 固定
pub const DESCRIPTOR_DIM: usize = 64;

/// 特征描述符
pub type Descriptor = [f32; DESCRIPTOR_DIM];

/// 特征点的空间信息
///
/// 均匀化算法只依赖位置和响应值，检测器可以带着自己的特征点类型通过筛选
pub trait SpatialPoint {
    /// 像素坐标 (x, y)
    fn pos(&self) -> (f32, f32);
    /// 响应强度
    fn response(&self) -> f32;
}

/// 特征点检测与描述符计算的抽象
///
/// 检测器本身是外部能力，核心层通过该 trait 注入，测试时可以使用
/// 返回预设特征点的假实现
pub trait Detector {
    type Image;
    type Point: SpatialPoint;

    /// 将图片字节解码为灰度图
    fn decode(&self, bytes: &[u8]) -> Result<Self::Image>;

    /// 图片尺寸 (width, height)
    fn dimensions(&self, image: &Self::Image) -> (u32, u32);

    /// 检测特征点
    fn detect(&mut self, image: &Self::Image) -> Result<Vec<Self::Point>>;

    /// 为特征点计算描述符，每个描述符对应一个输入特征点
    fn compute(&mut self, image: &Self::Image, points: Vec<Self::Point>) -> Result<Vec<Descriptor>>;
}
