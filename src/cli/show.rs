use std::fs;

use anyhow::Result;
use clap::Parser;
use log::info;
use opencv::core::{Mat, Scalar, Vector};
use opencv::features2d::{self, DrawMatchesFlags};
use opencv::imgcodecs;

use crate::cli::SubCommandExtend;
use crate::config::{FeatureOptions, Opts};
use crate::feature::{Detector, SurfDetector, uniformize};

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    #[command(flatten)]
    pub feature: FeatureOptions,
    /// 图片路径
    pub image: String,
    /// 输出文件
    #[arg(short, long, default_value = "keypoints.png")]
    pub output: String,
}

impl SubCommandExtend for ShowCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let bytes = fs::read(&self.image)?;

        let mut detector = SurfDetector::new(&self.feature)?;
        let image = detector.decode(&bytes)?;
        let (width, height) = detector.dimensions(&image);
        let keys = detector.detect(&image)?;
        info!("检测到 {} 个候选特征点", keys.len());

        let keys = uniformize(keys, height, width, self.feature.max_keypoints, self.feature.filter);
        info!("均匀化后保留 {} 个特征点", keys.len());

        let mut output = Mat::default();
        features2d::draw_keypoints(
            &image,
            &Vector::from_iter(keys),
            &mut output,
            Scalar::all(-1.0),
            DrawMatchesFlags::DEFAULT,
        )?;
        imgcodecs::imwrite(&self.output, &output, &Vector::<i32>::new())?;
        info!("特征点展示已保存到 {}", self.output);
        Ok(())
    }
}
