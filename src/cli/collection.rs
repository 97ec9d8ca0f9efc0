use std::fs;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::Error;
use crate::cli::SubCommandExtend;
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct NewCommand {
    /// 集合名称
    pub name: String,
    /// 如果集合已存在，删除后重建
    #[arg(long)]
    pub force: bool,
}

impl SubCommandExtend for NewCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let dir = opts.data_dir.collection(&self.name);
        if dir.exists() {
            if !self.force {
                return Err(Error::CollectionExists(self.name.clone()).into());
            }
            // identity 存储和向量索引的生命周期绑定，覆盖时整体删除
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        info!("集合 {} 已创建", self.name);
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct DropCommand {
    /// 集合名称
    pub name: String,
}

impl SubCommandExtend for DropCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let dir = opts.data_dir.collection(&self.name);
        if !dir.is_dir() {
            return Err(Error::CollectionNotFound(self.name.clone()).into());
        }
        // 集合目录同时包含向量索引和 identity 存储，作为一个整体删除，
        // 不会留下没有索引数据的 identity 记录
        fs::remove_dir_all(&dir)?;
        info!("集合 {} 已删除", self.name);
        Ok(())
    }
}
