//! 特征点均匀化
//!
//! 检测器输出的特征点往往在纹理密集的区域扎堆，直接取响应值最高的
//! 一批会让描述符集中在图片的一小块区域。这里提供两种筛选策略，
//! 把特征点数量压缩到目标值附近的同时保证空间分布均匀。
//! 两种策略的输出数量都只保证接近目标值，不保证恰好相等。

use clap::ValueEnum;

use super::SpatialPoint;

/// 特征点均匀化策略
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UniformFilter {
    /// 网格合并筛选
    #[default]
    Grid,
    /// 自适应四叉树筛选
    QuadTree,
}

/// 从候选特征点中均匀地筛选出 count 个左右的特征点
///
/// 输入为空时输出也为空，调用方应当将其视为"没有特征"的可跳过情况
pub fn uniformize<K: SpatialPoint>(
    keys: Vec<K>,
    height: u32,
    width: u32,
    count: usize,
    filter: UniformFilter,
) -> Vec<K> {
    if keys.is_empty() {
        return keys;
    }
    match filter {
        UniformFilter::Grid => grid_filter(keys, height, width, count),
        UniformFilter::QuadTree => quad_tree_filter(keys, height, width, count),
    }
}

/// 取响应值最大的特征点，响应值相同时保留先遇到的
fn take_strongest<K: SpatialPoint>(keys: Vec<K>) -> Option<K> {
    let mut best: Option<K> = None;
    for key in keys {
        match &best {
            Some(b) if key.response() <= b.response() => {}
            _ => best = Some(key),
        }
    }
    best
}

/// 网格遍历状态：正常情况下 2×2 合并，遇到空的合并组后逐格筛选
enum MergeState {
    Merging,
    Unmerging(u32),
}

/// 网格合并筛选（FUFP）
///
/// 参考：宋霄罡，张元培，梁莉，等. 面向视觉SLAM的快速均匀特征点提取方法[J].
/// 导航定位与授时, 2022, 9(4): 41-50.
fn grid_filter<K: SpatialPoint>(keys: Vec<K>, height: u32, width: u32, count: usize) -> Vec<K> {
    let (h, w) = (height as f32, width as f32);

    // 计算垂直和水平方向上的网格划分数量
    // 此处进行双倍划分，后续再两两合并；至少保留一组 2×2 网格
    let y_num = (((h / w * count as f32).sqrt().round() as usize) * 2).max(2);
    let x_num = (((w / h * count as f32).sqrt().round() as usize) * 2).max(2);

    // 将特征点放入网格中，边界上的点归入最后一格
    let mut boxes: Vec<Vec<Vec<K>>> =
        (0..y_num).map(|_| (0..x_num).map(|_| Vec::new()).collect()).collect();
    for key in keys {
        let (x, y) = key.pos();
        let xi = ((x / (w / x_num as f32)) as usize).min(x_num - 1);
        let yi = ((y / (h / y_num as f32)) as usize).min(y_num - 1);
        boxes[yi][xi].push(key);
    }

    // 每 2×2 一组合并网格，组内只保留响应值最大的特征点。
    // 如果某一组完全为空，说明这里覆盖的是真正稀疏的区域，
    // 下一组改为逐格筛选，补回合并浪费掉的分辨率。
    let mut result = vec![];
    let mut state = MergeState::Merging;
    for y in (0..y_num - 1).step_by(2) {
        for x in (0..x_num - 1).step_by(2) {
            let cells = [(y, x), (y, x + 1), (y + 1, x), (y + 1, x + 1)];
            match state {
                MergeState::Merging => {
                    let mut pool = vec![];
                    for (cy, cx) in cells {
                        pool.append(&mut boxes[cy][cx]);
                    }
                    match take_strongest(pool) {
                        Some(key) => result.push(key),
                        None => state = MergeState::Unmerging(1),
                    }
                }
                MergeState::Unmerging(skip) => {
                    for (cy, cx) in cells {
                        let cell = std::mem::take(&mut boxes[cy][cx]);
                        result.extend(take_strongest(cell));
                    }
                    state = match skip - 1 {
                        0 => MergeState::Merging,
                        n => MergeState::Unmerging(n),
                    };
                }
            }
        }
    }

    result
}

/// 四叉树节点，覆盖 [x0, x1) × [y0, y1) 的矩形区域
struct QuadNode<K> {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    keys: Vec<K>,
}

impl<K: SpatialPoint> QuadNode<K> {
    /// 按几何中点切分为四个象限，丢弃空象限
    fn split(self) -> Vec<QuadNode<K>> {
        let mx = (self.x0 + self.x1) / 2.;
        let my = (self.y0 + self.y1) / 2.;
        let mut children: Vec<QuadNode<K>> = [
            (self.x0, self.y0, mx, my),
            (mx, self.y0, self.x1, my),
            (self.x0, my, mx, self.y1),
            (mx, my, self.x1, self.y1),
        ]
        .into_iter()
        .map(|(x0, y0, x1, y1)| QuadNode { x0, y0, x1, y1, keys: vec![] })
        .collect();

        for key in self.keys {
            let (x, y) = key.pos();
            let idx = (x >= mx) as usize + 2 * (y >= my) as usize;
            children[idx].keys.push(key);
        }

        children.retain(|c| !c.keys.is_empty());
        children
    }

    /// 亚像素大小的节点不再分裂，避免重合的特征点导致无限分裂
    fn splittable(&self) -> bool {
        self.x1 - self.x0 > 1. || self.y1 - self.y0 > 1.
    }
}

/// 自适应四叉树筛选
///
/// 反复分裂特征点数量最多的区域，直到节点数量达到目标值或者无法
/// 继续分裂，每个节点保留响应值最大的特征点
fn quad_tree_filter<K: SpatialPoint>(
    keys: Vec<K>,
    height: u32,
    width: u32,
    count: usize,
) -> Vec<K> {
    let root = QuadNode { x0: 0., y0: 0., x1: width as f32, y1: height as f32, keys };
    let mut nodes = root.split();

    loop {
        // 按特征点数量降序排序，从尾部弹出最小的节点：
        // 单点节点直接成为叶子，多点节点分裂后进入累积区
        nodes.sort_by(|a, b| b.keys.len().cmp(&a.keys.len()));
        let mut done = vec![];
        let mut splits = 0usize;
        let reached = loop {
            let Some(node) = nodes.pop() else {
                break false;
            };
            if node.keys.len() > 1 && node.splittable() {
                done.append(&mut node.split());
                splits += 1;
            } else {
                done.push(node);
            }
            // 数量一旦够了就立即停止，剩余未弹出的节点保持原样
            if done.len() + nodes.len() >= count {
                break true;
            }
        };

        nodes.append(&mut done);
        // 整轮没有发生任何分裂时，说明所有节点都已无法细分
        if reached || splits == 0 {
            break;
        }
    }

    nodes.into_iter().filter_map(|node| take_strongest(node.keys)).collect()
}
