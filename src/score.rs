//! 匹配结果的聚合与排序
//!
//! 只按平均相似度排序会被单个碰巧很近的匹配带偏，只按匹配数量排序
//! 又完全忽略匹配质量。这里按威尔逊单边置信下界打分，匹配数量少或
//! 方差大的候选会被保守地压低，得到的是"该候选确实匹配"的置信度
//! 下界估计。

use std::collections::HashMap;

/// z 参数取 2.326，约对应 99% 分位
const WILSON_Z: f32 = 2.326;

/// 打分后的候选图片
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    /// 图片 ID
    pub id: u64,
    /// 命中的描述符数量
    pub matches: usize,
    /// 威尔逊下界评分
    pub score: f32,
}

/// 对一组匹配距离计算威尔逊下界评分
///
/// 距离需要归一化到 [0, 1]，越小越相似；输入不能为空
pub fn wilson_score(distances: &[f32]) -> f32 {
    let z = WILSON_Z;
    let n = distances.len() as f32;
    let values: Vec<f32> = distances.iter().map(|d| 1. - d).collect();
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;

    (mean + z * z / (2. * n) - z / (2. * n) * (4. * n * var + z * z).sqrt()) / (1. + z * z / n)
}

/// 将按候选分组的匹配距离聚合成有序的评分列表
///
/// 按评分降序排序，评分相同时按图片 ID 升序，保证结果确定
pub fn rank(matches: HashMap<u64, Vec<f32>>) -> Vec<ScoredCandidate> {
    let mut result: Vec<ScoredCandidate> = matches
        .into_iter()
        .map(|(id, distances)| ScoredCandidate {
            id,
            matches: distances.len(),
            score: wilson_score(&distances),
        })
        .collect();
    result.sort_unstable_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then(a.id.cmp(&b.id)));
    result
}
