//! 索引编排
//!
//! 把检测器、均匀化、identity 存储和向量索引串成完整的写入与搜索
//! 流程。检测器和向量索引都通过抽象注入，本模块不关心它们的实现。

use std::collections::HashMap;

use anyhow::Result;
use log::{debug, info};
use serde::Serialize;
use utoipa::ToSchema;

use crate::feature::{Detector, UniformFilter, uniformize};
use crate::identity::{IdentityRegistry, image_id};
use crate::index::VectorIndex;
use crate::score;

/// add_image 的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Added {
    /// 新图片，特征已入库
    Indexed,
    /// 内容相同的图片已存在，仅刷新了名称
    Updated,
    /// 没有可用的特征点，跳过
    NoFeatures,
}

/// 排序后的候选图片
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankedCandidate {
    /// 图片 ID
    pub id: u64,
    /// 来源名称
    pub name: String,
    /// 命中的描述符数量
    pub matches: usize,
    /// 威尔逊下界评分
    pub score: f32,
}

/// 索引编排：哈希 → 去重 → 检测 → 均匀化 → 描述符 → 入库
pub struct Indexer<'a, V> {
    index: &'a V,
    ids: &'a IdentityRegistry,
    filter: UniformFilter,
}

impl<'a, V: VectorIndex> Indexer<'a, V> {
    pub fn new(index: &'a V, ids: &'a IdentityRegistry, filter: UniformFilter) -> Self {
        Self { index, ids, filter }
    }

    /// 添加一张图片到集合
    ///
    /// 内容相同的图片不会重复写入特征向量，但总是会刷新 ID → 名称的
    /// 映射，重命名后重新提交也能保持名称最新。
    ///
    /// NOTE: 存在性检查和写入之间没有加锁，并发提交同一张图片时特征
    /// 可能被写入两次。去重在这里不是安全关键的，这是有意保留的宽松
    /// 保证，而不是需要修复的问题
    pub fn add_image<D: Detector>(
        &self,
        detector: &mut D,
        collection: &str,
        bytes: &[u8],
        name: &str,
        max_keypoints: usize,
    ) -> Result<Added> {
        let store = self.ids.open(collection)?;
        let id = image_id(bytes);
        if store.exists(id)? {
            store.register(id, name)?;
            return Ok(Added::Updated);
        }

        let image = detector.decode(bytes)?;
        let (width, height) = detector.dimensions(&image);
        let keys = detector.detect(&image)?;
        let keys = uniformize(keys, height, width, max_keypoints, self.filter);
        // 空白图片可能没有任何特征点，跳过而不是报错
        if keys.is_empty() {
            info!("图片 {name} 没有特征点，跳过");
            return Ok(Added::NoFeatures);
        }

        let descriptors = detector.compute(&image, keys)?;
        debug!("图片 {name} 提取到 {} 个描述符", descriptors.len());

        let ids = vec![id; descriptors.len()];
        self.index.insert(collection, &ids, &descriptors)?;
        store.register(id, name)?;
        Ok(Added::Indexed)
    }

    /// 在集合中搜索图片，返回按置信度降序的候选列表
    pub fn search_image<D: Detector>(
        &self,
        detector: &mut D,
        collection: &str,
        bytes: &[u8],
        search_list: usize,
        sample_limit: usize,
        limit: usize,
    ) -> Result<Vec<RankedCandidate>> {
        let store = self.ids.open(collection)?;

        let image = detector.decode(bytes)?;
        let (width, height) = detector.dimensions(&image);
        let keys = detector.detect(&image)?;
        let keys = uniformize(keys, height, width, sample_limit, self.filter);
        if keys.is_empty() {
            info!("查询图片没有特征点");
            return Ok(vec![]);
        }
        let descriptors = detector.compute(&image, keys)?;
        debug!("查询图片提取到 {} 个描述符", descriptors.len());

        // 将所有描述符的最近邻结果按候选图片聚合
        let mut matches: HashMap<u64, Vec<f32>> = HashMap::new();
        for neighbours in self.index.search(collection, &descriptors, search_list, limit)? {
            for m in neighbours {
                matches.entry(m.id).or_default().push(m.distance);
            }
        }

        let mut result = vec![];
        for candidate in score::rank(matches) {
            let name = store.lookup(candidate.id)?.unwrap_or_default();
            result.push(RankedCandidate {
                id: candidate.id,
                name,
                matches: candidate.matches,
                score: candidate.score,
            });
        }
        result.truncate(limit);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use tempfile::tempdir;

    use super::*;
    use crate::config::DataDir;
    use crate::feature::{DESCRIPTOR_DIM, Descriptor, SpatialPoint};
    use crate::index::RawMatch;

    #[derive(Debug, Clone)]
    struct Point {
        x: f32,
        y: f32,
        response: f32,
    }

    impl SpatialPoint for Point {
        fn pos(&self) -> (f32, f32) {
            (self.x, self.y)
        }

        fn response(&self) -> f32 {
            self.response
        }
    }

    /// 返回预设特征点的检测器
    struct FakeDetector {
        keys: Vec<Point>,
    }

    impl FakeDetector {
        fn with_keys(count: usize) -> Self {
            // 沿对角线铺开，保证均匀化后仍然留下多个点
            let keys = (0..count)
                .map(|i| Point { x: i as f32 * 6.4, y: i as f32 * 4.8, response: i as f32 })
                .collect();
            Self { keys }
        }

        fn empty() -> Self {
            Self { keys: vec![] }
        }
    }

    impl Detector for FakeDetector {
        type Image = ();
        type Point = Point;

        fn decode(&self, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }

        fn dimensions(&self, _image: &()) -> (u32, u32) {
            (640, 480)
        }

        fn detect(&mut self, _image: &()) -> Result<Vec<Point>> {
            Ok(self.keys.clone())
        }

        fn compute(&mut self, _image: &(), points: Vec<Point>) -> Result<Vec<Descriptor>> {
            Ok(points
                .into_iter()
                .map(|p| {
                    let mut d = [0f32; DESCRIPTOR_DIM];
                    d[0] = p.x;
                    d[1] = p.y;
                    d
                })
                .collect())
        }
    }

    /// 记录写入、返回预设搜索结果的向量索引
    #[derive(Default)]
    struct FakeIndex {
        inserts: Mutex<Vec<(String, Vec<u64>)>>,
        matches: Vec<Vec<RawMatch>>,
    }

    impl VectorIndex for FakeIndex {
        fn insert(&self, collection: &str, ids: &[u64], descriptors: &[Descriptor]) -> Result<()> {
            assert_eq!(ids.len(), descriptors.len());
            self.inserts.lock().unwrap().push((collection.to_string(), ids.to_vec()));
            Ok(())
        }

        fn search(
            &self,
            _collection: &str,
            descriptors: &[Descriptor],
            _search_list: usize,
            _limit: usize,
        ) -> Result<Vec<Vec<RawMatch>>> {
            assert!(!descriptors.is_empty());
            Ok(self.matches.clone())
        }
    }

    fn registry(dir: &std::path::Path, collection: &str) -> IdentityRegistry {
        let data_dir: DataDir = dir.to_str().unwrap().parse().unwrap();
        fs::create_dir_all(data_dir.collection(collection)).unwrap();
        IdentityRegistry::new(data_dir)
    }

    #[test]
    fn add_image_extracts_and_registers() {
        let dir = tempdir().unwrap();
        let ids = registry(dir.path(), "cats");
        let index = FakeIndex::default();
        let indexer = Indexer::new(&index, &ids, UniformFilter::Grid);
        let mut detector = FakeDetector::with_keys(100);

        let added = indexer.add_image(&mut detector, "cats", b"image bytes", "cat.jpg", 50).unwrap();
        assert_eq!(added, Added::Indexed);

        let inserts = index.inserts.lock().unwrap();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].0, "cats");
        // 每个描述符带同一个图片 ID
        let id = image_id(b"image bytes");
        assert!(inserts[0].1.iter().all(|&n| n == id));

        let store = ids.open("cats").unwrap();
        assert_eq!(store.lookup(id).unwrap(), Some("cat.jpg".to_string()));
    }

    // 相同内容提交两次只写入一次特征，但名称会被第二次提交刷新
    #[test]
    fn add_image_twice_inserts_once() {
        let dir = tempdir().unwrap();
        let ids = registry(dir.path(), "cats");
        let index = FakeIndex::default();
        let indexer = Indexer::new(&index, &ids, UniformFilter::Grid);
        let mut detector = FakeDetector::with_keys(100);

        let first = indexer.add_image(&mut detector, "cats", b"same bytes", "a.jpg", 50).unwrap();
        let second = indexer.add_image(&mut detector, "cats", b"same bytes", "b.jpg", 50).unwrap();
        assert_eq!(first, Added::Indexed);
        assert_eq!(second, Added::Updated);

        assert_eq!(index.inserts.lock().unwrap().len(), 1);

        let store = ids.open("cats").unwrap();
        assert_eq!(store.lookup(image_id(b"same bytes")).unwrap(), Some("b.jpg".to_string()));
    }

    // 没有特征点的图片跳过，不写入也不登记
    #[test]
    fn add_image_without_features_is_a_noop() {
        let dir = tempdir().unwrap();
        let ids = registry(dir.path(), "cats");
        let index = FakeIndex::default();
        let indexer = Indexer::new(&index, &ids, UniformFilter::Grid);
        let mut detector = FakeDetector::empty();

        let added = indexer.add_image(&mut detector, "cats", b"blank", "blank.jpg", 50).unwrap();
        assert_eq!(added, Added::NoFeatures);
        assert!(index.inserts.lock().unwrap().is_empty());
        assert!(!ids.open("cats").unwrap().exists(image_id(b"blank")).unwrap());
    }

    #[test]
    fn add_image_rejects_unknown_collection() {
        let dir = tempdir().unwrap();
        let ids = registry(dir.path(), "cats");
        let index = FakeIndex::default();
        let indexer = Indexer::new(&index, &ids, UniformFilter::Grid);
        let mut detector = FakeDetector::with_keys(10);

        let err = indexer.add_image(&mut detector, "dogs", b"image", "dog.jpg", 50).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::Error>(),
            Some(crate::Error::CollectionNotFound(_))
        ));
    }

    #[test]
    fn search_image_ranks_candidates() {
        let dir = tempdir().unwrap();
        let ids = registry(dir.path(), "cats");

        // 候选 1：三个近距离命中；候选 2：一个中等命中
        let index = FakeIndex {
            matches: vec![
                vec![RawMatch { id: 1, distance: 0. }, RawMatch { id: 2, distance: 0.5 }],
                vec![RawMatch { id: 1, distance: 0.05 }],
                vec![RawMatch { id: 1, distance: 0.1 }],
            ],
            ..Default::default()
        };

        let store = ids.open("cats").unwrap();
        store.register(1, "first.jpg").unwrap();
        store.register(2, "second.jpg").unwrap();

        let indexer = Indexer::new(&index, &ids, UniformFilter::Grid);
        let mut detector = FakeDetector::with_keys(100);

        let result =
            indexer.search_image(&mut detector, "cats", b"probe", 16, 50, 10).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].name, "first.jpg");
        assert_eq!(result[0].matches, 3);
        assert_eq!(result[1].name, "second.jpg");
        assert_eq!(result[1].matches, 1);
        assert!(result[0].score > result[1].score);
    }

    // 查询图片没有特征点时返回空结果
    #[test]
    fn search_image_without_features_returns_empty() {
        let dir = tempdir().unwrap();
        let ids = registry(dir.path(), "cats");
        let index = FakeIndex::default();
        let indexer = Indexer::new(&index, &ids, UniformFilter::Grid);
        let mut detector = FakeDetector::empty();

        let result = indexer.search_image(&mut detector, "cats", b"blank", 16, 50, 10).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn search_image_truncates_results() {
        let dir = tempdir().unwrap();
        let ids = registry(dir.path(), "cats");

        let index = FakeIndex {
            matches: vec![(1..=5).map(|i| RawMatch { id: i, distance: 0.1 }).collect()],
            ..Default::default()
        };
        let store = ids.open("cats").unwrap();
        for i in 1..=5 {
            store.register(i, &format!("{i}.jpg")).unwrap();
        }

        let indexer = Indexer::new(&index, &ids, UniformFilter::Grid);
        let mut detector = FakeDetector::with_keys(100);

        let result = indexer.search_image(&mut detector, "cats", b"probe", 16, 50, 2).unwrap();
        assert_eq!(result.len(), 2);
    }
}
