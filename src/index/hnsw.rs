//! 基于 HNSW 图的向量索引实现
//!
//! 每个集合一张独立的图，图文件和向量 ID 对照表保存在集合目录下。
//! 图的读写在集合内部串行，不同集合之间互不影响。

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Result, ensure};
use hnsw_rs::prelude::*;
use log::debug;

use super::{RawMatch, VectorIndex};
use crate::Error;
use crate::config::DataDir;
use crate::feature::Descriptor;

/// 图的容量参数，只影响层数分配，不是硬上限
const MAX_ELEMENTS: usize = 1 << 20;

struct Graph {
    hnsw: Hnsw<'static, f32, DistL2>,
    // hnsw 内部的点 ID 按插入顺序递增，这里记录每个点对应的图片 ID
    ids: Vec<u64>,
}

pub struct HnswIndex {
    data_dir: DataDir,
    graphs: RwLock<HashMap<String, Arc<Mutex<Graph>>>>,
}

impl HnswIndex {
    pub fn new(data_dir: DataDir) -> Self {
        Self { data_dir, graphs: RwLock::new(HashMap::new()) }
    }

    /// 将集合的图和 ID 对照表落盘
    pub fn save(&self, collection: &str) -> Result<()> {
        let graph = self.get(collection)?;
        let graph = graph.lock().unwrap();
        let dir = self.data_dir.collection(collection);
        debug!("保存索引到 {}，共 {} 个向量", dir.display(), graph.ids.len());
        graph.hnsw.file_dump(&dir, "index")?;
        fs::write(self.data_dir.vector_ids(collection), bincode::serialize(&graph.ids)?)?;
        Ok(())
    }

    /// 关闭集合的图句柄，删除集合目录之前必须先调用
    pub fn evict(&self, collection: &str) {
        self.graphs.write().unwrap().remove(collection);
    }

    fn get(&self, collection: &str) -> Result<Arc<Mutex<Graph>>> {
        if let Some(graph) = self.graphs.read().unwrap().get(collection) {
            return Ok(graph.clone());
        }
        if !self.data_dir.collection(collection).is_dir() {
            return Err(Error::CollectionNotFound(collection.to_string()).into());
        }
        let graph = Arc::new(Mutex::new(self.load(collection)?));
        let mut graphs = self.graphs.write().unwrap();
        Ok(graphs.entry(collection.to_string()).or_insert(graph).clone())
    }

    fn load(&self, collection: &str) -> Result<Graph> {
        let dir = self.data_dir.collection(collection);
        if dir.join("index.hnsw.graph").exists() {
            debug!("从 {} 加载索引", dir.display());
            let reloader = HnswIo::new(&dir, "index");
            // NOTE: 加载出的 HNSW 生命周期依赖于 reloader 的引用，所以需要使用 Box::leak 来延长生命周期
            let reloader = Box::leak(Box::new(reloader));
            let hnsw = reloader.load_hnsw_with_dist(DistL2 {})?;
            let ids = bincode::deserialize(&fs::read(self.data_dir.vector_ids(collection))?)?;
            Ok(Graph { hnsw, ids })
        } else {
            let hnsw = Hnsw::new(32, MAX_ELEMENTS, 16, 128, DistL2 {});
            Ok(Graph { hnsw, ids: vec![] })
        }
    }
}

impl VectorIndex for HnswIndex {
    fn insert(&self, collection: &str, ids: &[u64], descriptors: &[Descriptor]) -> Result<()> {
        ensure!(ids.len() == descriptors.len(), "ID 和描述符数量不一致");

        let graph = self.get(collection)?;
        let mut graph = graph.lock().unwrap();
        for (&id, des) in ids.iter().zip(descriptors) {
            let no = graph.ids.len();
            graph.ids.push(id);
            graph.hnsw.insert((des, no));
        }
        Ok(())
    }

    fn search(
        &self,
        collection: &str,
        descriptors: &[Descriptor],
        search_list: usize,
        limit: usize,
    ) -> Result<Vec<Vec<RawMatch>>> {
        let graph = self.get(collection)?;
        let graph = graph.lock().unwrap();

        let mut results = Vec::with_capacity(descriptors.len());
        for des in descriptors {
            let neighbours = graph.hnsw.search(des, limit, search_list);
            results.push(
                neighbours
                    .into_iter()
                    // SURF 描述符是单位向量，L2 距离最大为 2，除以 2 归一化到 [0, 1]
                    .map(|n| RawMatch { id: graph.ids[n.d_id], distance: n.distance / 2. })
                    .collect(),
            );
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::feature::DESCRIPTOR_DIM;

    fn data_dir(dir: &std::path::Path, collection: &str) -> DataDir {
        let data_dir: DataDir = dir.to_str().unwrap().parse().unwrap();
        fs::create_dir_all(data_dir.collection(collection)).unwrap();
        data_dir
    }

    // 第 i 维为 1 的单位向量
    fn axis(i: usize) -> Descriptor {
        let mut d = [0f32; DESCRIPTOR_DIM];
        d[i] = 1.;
        d
    }

    #[test]
    fn insert_then_search() {
        let dir = tempdir().unwrap();
        let index = HnswIndex::new(data_dir(dir.path(), "cats"));

        index.insert("cats", &[11, 22, 33], &[axis(0), axis(1), axis(2)]).unwrap();

        let results = index.search("cats", &[axis(1)], 16, 3).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0][0].id, 22);
        assert!(results[0][0].distance < 1e-6);
        // 其余向量与查询正交，L2 距离为 sqrt(2)，归一化后约 0.707
        assert!((results[0][1].distance - 0.707).abs() < 1e-3);
    }

    #[test]
    fn unknown_collection_is_an_error() {
        let dir = tempdir().unwrap();
        let data_dir: DataDir = dir.path().to_str().unwrap().parse().unwrap();
        let index = HnswIndex::new(data_dir);

        let err = index.search("nope", &[axis(0)], 16, 3).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::CollectionNotFound(_))));
    }

    #[test]
    fn save_then_reload() {
        let dir = tempdir().unwrap();
        let data_dir = data_dir(dir.path(), "cats");

        {
            let index = HnswIndex::new(data_dir.clone());
            index.insert("cats", &[11, 22], &[axis(0), axis(1)]).unwrap();
            index.save("cats").unwrap();
        }

        let index = HnswIndex::new(data_dir);
        let results = index.search("cats", &[axis(0)], 16, 1).unwrap();
        assert_eq!(results[0][0].id, 11);
    }

    // 同一张图片的多个描述符共享图片 ID
    #[test]
    fn duplicate_ids_are_allowed() {
        let dir = tempdir().unwrap();
        let index = HnswIndex::new(data_dir(dir.path(), "cats"));

        index.insert("cats", &[7, 7, 7], &[axis(0), axis(1), axis(2)]).unwrap();

        let results = index.search("cats", &[axis(0)], 16, 3).unwrap();
        assert!(results[0].iter().all(|m| m.id == 7));
    }
}
