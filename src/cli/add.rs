use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use indicatif::ProgressBar;
use log::info;
use rayon::prelude::*;
use regex::Regex;
use tokio::task::block_in_place;
use walkdir::WalkDir;

use crate::cli::SubCommandExtend;
use crate::config::{FeatureOptions, Opts};
use crate::feature::{DETECTOR, FEATURE_OPTIONS};
use crate::identity::IdentityRegistry;
use crate::index::HnswIndex;
use crate::indexer::{Added, Indexer};
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub feature: FeatureOptions,
    /// 集合名称
    pub collection: String,
    /// 图片路径，目录会被递归扫描
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,png,webp")]
    pub suffix: String,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        FEATURE_OPTIONS.get_or_init(|| self.feature.clone());

        let re_suf = format!("(?i)({})", self.suffix.replace(',', "|"));
        let re_suf = Regex::new(&re_suf).expect("failed to build regex");

        let index = HnswIndex::new(opts.data_dir.clone());
        let ids = IdentityRegistry::new(opts.data_dir.clone());
        let indexer = Indexer::new(&index, &ids, self.feature.filter);

        // 先确认集合存在，避免扫描完才报错
        ids.open(&self.collection)?;

        let entries: Vec<PathBuf> = WalkDir::new(&self.path)
            .into_iter()
            .filter_map(|entry| {
                let entry = entry.ok()?.into_path();
                let ext = entry.extension()?.to_string_lossy().to_string();
                (entry.is_file() && re_suf.is_match(&ext)).then_some(entry)
            })
            .collect();
        info!("扫描完成，共 {} 张图片", entries.len());

        let pb = ProgressBar::new(entries.len() as u64).with_style(pb_style());

        block_in_place(|| {
            entries.par_iter().for_each(|entry| {
                let name = entry.to_string_lossy();
                let result = fs::read(entry).map_err(anyhow::Error::from).and_then(|bytes| {
                    DETECTOR.with(|detector| {
                        indexer.add_image(
                            &mut *detector.borrow_mut(),
                            &self.collection,
                            &bytes,
                            &name,
                            self.feature.max_keypoints,
                        )
                    })
                });
                match result {
                    Ok(Added::Indexed) => pb.set_message(format!("已添加: {name}")),
                    Ok(Added::Updated) => pb.set_message(format!("已更新: {name}")),
                    Ok(Added::NoFeatures) => pb.set_message(format!("没有特征点: {name}")),
                    // 单张图片失败不中断整个批次
                    Err(e) => pb.println(format!("[ERR] {name}: {e}")),
                }
                pb.inc(1);
            });
        });

        pb.finish_with_message("图片添加完成");

        index.save(&self.collection)
    }
}
