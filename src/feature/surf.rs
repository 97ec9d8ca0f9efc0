//! OpenCV SURF 检测器
//!
//! extended 参数固定为 false，描述符为 64 维单位向量，与向量索引的
//! schema 一致。

use std::cell::RefCell;
use std::sync::OnceLock;

use anyhow::{Result, ensure};
use log::debug;
use opencv::core::{KeyPoint, Mat, Ptr, Size, Vector};
use opencv::imgcodecs;
use opencv::imgproc::{self, InterpolationFlags};
use opencv::prelude::*;
use opencv::xfeatures2d::SURF;

use super::{DESCRIPTOR_DIM, Descriptor, Detector, SpatialPoint};
use crate::Error;
use crate::config::FeatureOptions;

// 注意：FEATURE_OPTIONS 必须在 DETECTOR 之前初始化
pub static FEATURE_OPTIONS: OnceLock<FeatureOptions> = OnceLock::new();

thread_local! {
    pub static DETECTOR: RefCell<SurfDetector> =
        RefCell::new(SurfDetector::new(FEATURE_OPTIONS.get().unwrap()).unwrap());
}

impl SpatialPoint for KeyPoint {
    fn pos(&self) -> (f32, f32) {
        let pt = KeyPointTraitConst::pt(self);
        (pt.x, pt.y)
    }

    fn response(&self) -> f32 {
        KeyPointTraitConst::response(self)
    }
}

pub struct SurfDetector {
    surf: Ptr<SURF>,
    max_size: (i32, i32),
}

impl SurfDetector {
    pub fn new(options: &FeatureOptions) -> Result<Self> {
        let surf = SURF::create(options.hessian_threshold, 4, 3, false, false)?;
        Ok(Self { surf, max_size: options.max_size })
    }
}

impl Detector for SurfDetector {
    type Image = Mat;
    type Point = KeyPoint;

    fn decode(&self, bytes: &[u8]) -> Result<Mat> {
        let buf = Mat::from_slice(bytes)?;
        let image = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_GRAYSCALE)?;
        if image.empty() {
            return Err(Error::Decode("不是有效的图片".to_string()).into());
        }
        adjust_image_size(image, self.max_size)
    }

    fn dimensions(&self, image: &Mat) -> (u32, u32) {
        (image.cols() as u32, image.rows() as u32)
    }

    fn detect(&mut self, image: &Mat) -> Result<Vec<KeyPoint>> {
        let mut keys = Vector::<KeyPoint>::new();
        self.surf.detect(image, &mut keys, &Mat::default())?;
        debug!("检测到 {} 个候选特征点", keys.len());
        Ok(keys.to_vec())
    }

    fn compute(&mut self, image: &Mat, points: Vec<KeyPoint>) -> Result<Vec<Descriptor>> {
        let mut keys = Vector::<KeyPoint>::from_iter(points);
        let mut des = Mat::default();
        self.surf.compute(image, &mut keys, &mut des)?;

        if des.rows() == 0 {
            return Ok(vec![]);
        }
        ensure!(des.cols() == DESCRIPTOR_DIM as i32, "描述符维数不是 {DESCRIPTOR_DIM}");

        let mut result = Vec::with_capacity(des.rows() as usize);
        for i in 0..des.rows() {
            let mut d = [0f32; DESCRIPTOR_DIM];
            d.copy_from_slice(des.at_row::<f32>(i)?);
            result.push(d);
        }
        Ok(result)
    }
}

/// 等比缩放超过最大尺寸的图片
fn adjust_image_size(image: Mat, (width, height): (i32, i32)) -> Result<Mat> {
    if image.cols() <= width && image.rows() <= height {
        return Ok(image);
    }
    let scale = (height as f64 / image.rows() as f64).min(width as f64 / image.cols() as f64);
    let mut output = Mat::default();
    imgproc::resize(
        &image,
        &mut output,
        Size::default(),
        scale,
        scale,
        InterpolationFlags::INTER_AREA as i32,
    )?;
    Ok(output)
}
