//! 图片内容标识
//!
//! 图片以内容哈希作为主键写入向量索引，同一张图片无论提交多少次、
//! 以什么名字提交，都只占用一个 ID。ID → 来源名称的映射按集合
//! 持久化在 LMDB 中。

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use byteorder::BigEndian;
use heed::types::{Str, U64};
use heed::{Database, Env, EnvOpenOptions, WithTls};

use crate::Error;
use crate::config::DataDir;

/// 图片 ID 的位宽，需要放进向量索引的整数主键字段
///
/// 40 位在预期的图片规模下碰撞概率可以接受，截断碰撞不做纠正
pub const IMAGE_ID_BITS: u32 = 40;

/// 计算图片内容的 ID
///
/// 取 blake3 哈希的前 5 个字节，按大端序解释为整数。
/// 纯函数，相同的字节内容总是得到相同的 ID
pub fn image_id(bytes: &[u8]) -> u64 {
    let digest = blake3::hash(bytes);
    let mut buf = [0u8; 8];
    buf[3..].copy_from_slice(&digest.as_bytes()[..5]);
    u64::from_be_bytes(buf)
}

/// 单个集合的图片 ID → 来源名称映射
///
/// LMDB 天然支持多个并发读者，写事务之间互相串行
#[derive(Debug)]
pub struct IdentityDb {
    env: Env<WithTls>,
    db: Database<U64<BigEndian>, Str>,
}

impl IdentityDb {
    /// 打开（或创建）存储
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(1 << 34) // 16GiB
                .open(path)?
        };
        let mut txn = env.write_txn()?;
        let db = env.create_database::<U64<BigEndian>, Str>(&mut txn, None)?;
        txn.commit()?;
        Ok(Self { env, db })
    }

    /// 图片是否已登记
    pub fn exists(&self, id: u64) -> Result<bool> {
        let txn = self.env.read_txn()?;
        Ok(self.db.get(&txn, &id)?.is_some())
    }

    /// 查询图片的来源名称
    pub fn lookup(&self, id: u64) -> Result<Option<String>> {
        let txn = self.env.read_txn()?;
        Ok(self.db.get(&txn, &id)?.map(str::to_string))
    }

    /// 登记图片
    ///
    /// 幂等操作，重复登记同一个 ID 会覆盖旧的名称
    pub fn register(&self, id: u64, name: &str) -> Result<()> {
        let mut txn = self.env.write_txn()?;
        self.db.put(&mut txn, &id, name)?;
        txn.commit()?;
        Ok(())
    }
}

/// 各集合 IdentityDb 句柄的注册表
///
/// 由服务层持有并传入核心层，代替进程级的全局缓存，
/// 测试时可以为每个用例建立独立的注册表
pub struct IdentityRegistry {
    data_dir: DataDir,
    envs: RwLock<HashMap<String, Arc<IdentityDb>>>,
}

impl IdentityRegistry {
    pub fn new(data_dir: DataDir) -> Self {
        Self { data_dir, envs: RwLock::new(HashMap::new()) }
    }

    /// 获取集合的 identity 存储，句柄按集合名缓存
    pub fn open(&self, collection: &str) -> Result<Arc<IdentityDb>> {
        if let Some(db) = self.envs.read().unwrap().get(collection) {
            return Ok(db.clone());
        }
        if !self.data_dir.collection(collection).is_dir() {
            return Err(Error::CollectionNotFound(collection.to_string()).into());
        }
        let db = Arc::new(IdentityDb::open(&self.data_dir.identity(collection))?);
        let mut envs = self.envs.write().unwrap();
        Ok(envs.entry(collection.to_string()).or_insert(db).clone())
    }

    /// 关闭集合的存储句柄
    ///
    /// 删除集合目录之前必须先调用，identity 存储和集合的生命周期绑定
    pub fn evict(&self, collection: &str) {
        self.envs.write().unwrap().remove(collection);
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn image_id_is_deterministic() {
        let bytes = b"not really an image";
        assert_eq!(image_id(bytes), image_id(bytes));
        assert_ne!(image_id(bytes), image_id(b"another image"));
    }

    #[test]
    fn image_id_fits_configured_width() {
        for bytes in [&b""[..], &b"a"[..], &b"abc"[..], &[0xff; 1024][..]] {
            assert!(image_id(bytes) < (1 << IMAGE_ID_BITS));
        }
    }

    // blake3("") = af1349b9f5f9a1a6...，取前 5 字节
    #[test]
    fn image_id_takes_digest_prefix_big_endian() {
        assert_eq!(image_id(b""), 0xaf1349b9f5);
    }

    #[test]
    fn register_then_lookup() {
        let dir = tempdir().unwrap();
        let db = IdentityDb::open(&dir.path().join("identity.mdb")).unwrap();

        let id = image_id(b"some image");
        assert!(!db.exists(id).unwrap());
        assert_eq!(db.lookup(id).unwrap(), None);

        db.register(id, "cat.jpg").unwrap();
        assert!(db.exists(id).unwrap());
        assert_eq!(db.lookup(id).unwrap(), Some("cat.jpg".to_string()));
    }

    // 重复登记覆盖旧名称，不报错
    #[test]
    fn register_is_idempotent() {
        let dir = tempdir().unwrap();
        let db = IdentityDb::open(&dir.path().join("identity.mdb")).unwrap();

        let id = image_id(b"some image");
        db.register(id, "cat.jpg").unwrap();
        db.register(id, "renamed.jpg").unwrap();
        assert_eq!(db.lookup(id).unwrap(), Some("renamed.jpg".to_string()));
    }

    #[test]
    fn registry_caches_handles() {
        let dir = tempdir().unwrap();
        let data_dir: DataDir = dir.path().to_str().unwrap().parse().unwrap();
        fs::create_dir_all(data_dir.collection("cats")).unwrap();

        let registry = IdentityRegistry::new(data_dir);
        let db1 = registry.open("cats").unwrap();
        let db2 = registry.open("cats").unwrap();
        assert!(Arc::ptr_eq(&db1, &db2));
    }

    #[test]
    fn registry_rejects_unknown_collection() {
        let dir = tempdir().unwrap();
        let data_dir: DataDir = dir.path().to_str().unwrap().parse().unwrap();

        let registry = IdentityRegistry::new(data_dir);
        let err = registry.open("nope").unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::CollectionNotFound(_))));
    }

    // 不同集合的登记互不可见
    #[test]
    fn collections_are_isolated() {
        let dir = tempdir().unwrap();
        let data_dir: DataDir = dir.path().to_str().unwrap().parse().unwrap();
        fs::create_dir_all(data_dir.collection("a")).unwrap();
        fs::create_dir_all(data_dir.collection("b")).unwrap();

        let registry = IdentityRegistry::new(data_dir);
        let id = image_id(b"shared image");
        registry.open("a").unwrap().register(id, "a.jpg").unwrap();

        assert!(!registry.open("b").unwrap().exists(id).unwrap());
    }
}
