//! Pixel change detection between two frames.
//!
//! Frames are grayscaled, optionally blurred and border-masked; the score of a
//! pair is the summed area of the changed regions, so lower means more alike.

use crate::config::CullConfig;
use crate::error::{CullError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use imageproc::rect::Rect;
use std::path::Path;

/// What the duplicate resolver needs from a frame comparison primitive.
pub trait SimilarityScorer {
    type Frame;

    /// Load and preprocess the image at `path`.
    fn prepare(&self, path: &Path) -> Result<Self::Frame>;

    /// Dissimilarity of two prepared frames; lower is more similar.
    fn score(&self, left: &Self::Frame, right: &Self::Frame) -> Result<f64>;
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub score: f64,
    pub regions: Vec<Contour<i32>>,
    pub mask: GrayImage,
}

#[derive(Debug, Clone)]
pub struct ChangeDetectionScorer {
    blur_radii: Vec<u32>,
    border_mask: [u32; 4],
    pixel_threshold: u8,
    dilate_iterations: u8,
    min_contour_area: f64,
    comparison_size: Option<(u32, u32)>,
}

impl ChangeDetectionScorer {
    pub fn new(config: &CullConfig) -> Self {
        Self {
            blur_radii: config.blur_radii.clone(),
            border_mask: config.border_mask,
            pixel_threshold: config.pixel_threshold,
            dilate_iterations: config.dilate_iterations,
            min_contour_area: config.min_contour_area,
            comparison_size: None,
        }
    }

    /// Resize frames in memory after loading instead of relying on files
    /// already being at comparison size.
    pub fn with_comparison_size(mut self, width: u32, height: u32) -> Self {
        self.comparison_size = Some((width, height));
        self
    }

    pub fn preprocess(&self, frame: &DynamicImage) -> GrayImage {
        let mut gray = frame.to_luma8();
        for &radius in &self.blur_radii {
            gray = gaussian_blur_f32(&gray, kernel_sigma(radius));
        }
        black_out_borders(&mut gray, self.border_mask);
        gray
    }

    /// Score the change between two preprocessed frames, ignoring regions
    /// smaller than `min_contour_area`.
    pub fn compare(
        &self,
        previous: &GrayImage,
        next: &GrayImage,
        min_contour_area: f64,
    ) -> Result<Comparison> {
        if previous.dimensions() != next.dimensions() {
            return Err(CullError::FrameMismatch {
                left: previous.dimensions(),
                right: next.dimensions(),
            });
        }

        let (width, height) = previous.dimensions();
        let threshold = self.pixel_threshold;
        let mut mask = GrayImage::from_fn(width, height, |x, y| {
            let delta = previous.get_pixel(x, y)[0].abs_diff(next.get_pixel(x, y)[0]);
            if delta > threshold { Luma([255]) } else { Luma([0]) }
        });
        for _ in 0..self.dilate_iterations {
            mask = dilate(&mask, Norm::LInf, 1);
        }

        let mut score = 0.0;
        let mut regions = Vec::new();
        for contour in find_contours::<i32>(&mask) {
            if contour.parent.is_some() || !matches!(contour.border_type, BorderType::Outer) {
                continue;
            }
            let area = contour_area(&contour);
            if area < min_contour_area {
                continue;
            }
            score += area;
            regions.push(contour);
        }

        Ok(Comparison {
            score,
            regions,
            mask,
        })
    }

    fn load(&self, path: &Path) -> Result<DynamicImage> {
        let img = image::open(path).map_err(|source| CullError::UnreadableImage {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(match self.comparison_size {
            Some((width, height)) if img.width() != width || img.height() != height => {
                img.resize_exact(width, height, FilterType::Triangle)
            }
            _ => img,
        })
    }
}

impl SimilarityScorer for ChangeDetectionScorer {
    type Frame = GrayImage;

    fn prepare(&self, path: &Path) -> Result<GrayImage> {
        let img = self.load(path)?;
        Ok(self.preprocess(&img))
    }

    fn score(&self, left: &GrayImage, right: &GrayImage) -> Result<f64> {
        Ok(self.compare(left, right, self.min_contour_area)?.score)
    }
}

/// Sigma OpenCV derives for a square kernel of size `radius` when none is given.
fn kernel_sigma(radius: u32) -> f32 {
    0.3 * ((radius as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn black_out_borders(img: &mut GrayImage, [left, top, right, bottom]: [u32; 4]) {
    let (width, height) = img.dimensions();
    let x_min = left * width / 100;
    let y_min = top * height / 100;
    let x_max = width - right * width / 100;
    let y_max = height - bottom * height / 100;
    let black = Luma([0u8]);

    let bands = [
        (0, 0, x_min, height),
        (0, 0, width, y_min),
        (x_max, 0, width - x_max, height),
        (0, y_max, width, height - y_max),
    ];
    for (x, y, w, h) in bands {
        if w > 0 && h > 0 {
            draw_filled_rect_mut(img, Rect::at(x as i32, y as i32).of_size(w, h), black);
        }
    }
}

/// Shoelace area of the polygon traced by a contour.
fn contour_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice_area.abs() as f64 / 2.0
}
