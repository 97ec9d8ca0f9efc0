use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::feature::UniformFilter;

static DATA_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "", "imseek").expect("failed to get project dir");
    proj_dirs.data_dir().to_path_buf()
});

fn default_data_dir() -> &'static str {
    DATA_DIR.to_str().unwrap()
}

#[derive(Parser, Debug, Clone)]
pub struct FeatureOptions {
    /// SURF Hessian 阈值，越低检测到的特征点越多
    #[arg(long, value_name = "THRESHOLD", default_value_t = 500.)]
    pub hessian_threshold: f64,
    /// 每张图片经过均匀化后保留的特征点数量
    #[arg(short = 'n', long, value_name = "N", default_value_t = 500)]
    pub max_keypoints: usize,
    /// 特征点均匀化策略
    #[arg(long, value_enum, default_value_t = UniformFilter::Grid)]
    pub filter: UniformFilter,
    /// 图片最大尺寸，宽高超过这个尺寸时等比缩放
    #[arg(short = 'S', long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "1920x1080")]
    pub max_size: (i32, i32),
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 搜索列表大小，越大越准确，但是速度越慢
    #[arg(long, value_name = "N", default_value_t = 16)]
    pub search_list: usize,
    /// 查询图片的特征点采样数量
    #[arg(long, value_name = "N", default_value_t = 100)]
    pub sample_limit: usize,
    /// 返回结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 100)]
    pub limit: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imseek", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 数据目录，每个集合一个子目录
    #[arg(short, long, default_value = default_data_dir())]
    pub data_dir: DataDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 新建集合
    New(NewCommand),
    /// 删除集合及其全部数据
    Drop(DropCommand),
    /// 添加图片到集合
    Add(AddCommand),
    /// 在集合中搜索图片
    Search(SearchCommand),
    /// 启动 HTTP 搜索服务
    Server(ServerCommand),
    /// 展示图片的特征点提取结果
    Show(ShowCommand),
}

/// 数据目录，布局为 `<data_dir>/<集合名>/{identity.mdb, index.*, vectors.ids}`
#[derive(Debug, Clone)]
pub struct DataDir {
    path: PathBuf,
}

impl DataDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回集合目录的路径
    pub fn collection(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// 返回集合的 identity 存储路径
    pub fn identity(&self, name: &str) -> PathBuf {
        self.collection(name).join("identity.mdb")
    }

    /// 返回集合的向量 ID 对照表路径
    pub fn vector_ids(&self, name: &str) -> PathBuf {
        self.collection(name).join("vectors.ids")
    }
}

impl FromStr for DataDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

fn parse_size(s: &str) -> anyhow::Result<(i32, i32)> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("无效的尺寸: {}", s));
    }
    Ok((parts[0].parse()?, parts[1].parse()?))
}
