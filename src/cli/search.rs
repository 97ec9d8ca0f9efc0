use std::fs;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{FeatureOptions, Opts, SearchOptions};
use crate::feature::SurfDetector;
use crate::identity::IdentityRegistry;
use crate::index::HnswIndex;
use crate::indexer::{Indexer, RankedCandidate};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub feature: FeatureOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 集合名称
    pub collection: String,
    /// 被搜索的图片路径
    pub image: String,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let index = HnswIndex::new(opts.data_dir.clone());
        let ids = IdentityRegistry::new(opts.data_dir.clone());
        let indexer = Indexer::new(&index, &ids, self.feature.filter);

        let bytes = fs::read(&self.image)?;
        let result = block_in_place(|| {
            let mut detector = SurfDetector::new(&self.feature)?;
            indexer.search_image(
                &mut detector,
                &self.collection,
                &bytes,
                self.search.search_list,
                self.search.sample_limit,
                self.search.limit,
            )
        })?;

        print_result(&result, self)
    }
}

fn print_result(result: &[RankedCandidate], opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for candidate in result {
                println!("{:.4}\t{}\t{}", candidate.score, candidate.matches, candidate.name);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
