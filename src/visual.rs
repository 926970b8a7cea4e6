//! Visual regression - screenshot comparison against stored baselines

use std::path::{Path, PathBuf};
use image::{GenericImageView, RgbaImage};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Allowed per-channel difference before a pixel counts as changed.
/// Absorbs anti-aliasing and PNG encoder variation.
const CHANNEL_TOLERANCE: i32 = 5;

/// Result of comparing a screenshot against its baseline
#[derive(Debug, Clone)]
pub struct SnapshotDiff {
    /// Whether the images match within the threshold
    pub matches: bool,

    /// Percentage of pixels that differ
    pub diff_percent: f64,

    /// Number of differing pixels
    pub diff_pixels: u64,

    /// Total pixels compared
    pub total_pixels: u64,

    /// Path to the highlighted diff image, when one was written
    pub diff_image_path: Option<PathBuf>,
}

/// Compares screenshots taken during scenarios against baselines
pub struct VisualTester {
    baseline_dir: PathBuf,
    actual_dir: PathBuf,
    diff_dir: PathBuf,
    threshold: f64,
    auto_update: bool,
}

impl VisualTester {
    pub fn new(config: VisualConfig) -> HarnessResult<Self> {
        std::fs::create_dir_all(&config.baseline_dir)?;
        std::fs::create_dir_all(&config.actual_dir)?;
        std::fs::create_dir_all(&config.diff_dir)?;

        Ok(Self {
            baseline_dir: config.baseline_dir,
            actual_dir: config.actual_dir,
            diff_dir: config.diff_dir,
            threshold: config.threshold,
            auto_update: config.auto_update,
        })
    }

    /// Compare a named screenshot against its baseline
    pub fn compare(&self, name: &str, threshold: Option<f64>) -> HarnessResult<SnapshotDiff> {
        let threshold = threshold.unwrap_or(self.threshold);

        let actual_path = self.actual_dir.join(format!("{}.png", name));
        let baseline_path = self.baseline_dir.join(format!("{}.png", name));

        if !actual_path.exists() {
            return Err(HarnessError::Driver(format!(
                "screenshot not found: {}",
                actual_path.display()
            )));
        }

        if !baseline_path.exists() {
            if self.auto_update {
                info!("Creating baseline for '{}'", name);
                std::fs::copy(&actual_path, &baseline_path)?;
                return Ok(SnapshotDiff {
                    matches: true,
                    diff_percent: 0.0,
                    diff_pixels: 0,
                    total_pixels: 0,
                    diff_image_path: None,
                });
            }
            return Err(HarnessError::BaselineMissing(
                baseline_path.to_string_lossy().to_string(),
            ));
        }

        // Identical files need no pixel walk
        if hash_file(&actual_path)? == hash_file(&baseline_path)? {
            debug!("Screenshots for '{}' are byte-identical", name);
            let actual = image::open(&actual_path)?;
            let (w, h) = actual.dimensions();
            return Ok(SnapshotDiff {
                matches: true,
                diff_percent: 0.0,
                diff_pixels: 0,
                total_pixels: u64::from(w) * u64::from(h),
                diff_image_path: None,
            });
        }

        let actual = image::open(&actual_path)?.to_rgba8();
        let baseline = image::open(&baseline_path)?.to_rgba8();

        if actual.dimensions() != baseline.dimensions() {
            warn!(
                "Screenshot dimensions differ for '{}': actual {:?} vs baseline {:?}",
                name,
                actual.dimensions(),
                baseline.dimensions()
            );
        }

        let (diff_pixels, total_pixels, diff_image) = diff_images(&actual, &baseline);
        let diff_percent = (diff_pixels as f64 / total_pixels as f64) * 100.0;
        let matches = diff_percent <= threshold;

        let diff_image_path = if diff_pixels > 0 {
            let path = self.diff_dir.join(format!("{}-diff.png", name));
            diff_image.save(&path)?;
            Some(path)
        } else {
            None
        };

        if !matches {
            warn!(
                "Visual regression in '{}': {:.2}% pixels differ (threshold: {:.2}%)",
                name, diff_percent, threshold
            );
        }

        Ok(SnapshotDiff {
            matches,
            diff_percent,
            diff_pixels,
            total_pixels,
            diff_image_path,
        })
    }

    /// Promote the actual screenshot to baseline
    pub fn update_baseline(&self, name: &str) -> HarnessResult<()> {
        let actual_path = self.actual_dir.join(format!("{}.png", name));
        let baseline_path = self.baseline_dir.join(format!("{}.png", name));

        if !actual_path.exists() {
            return Err(HarnessError::Driver(format!(
                "cannot update baseline '{}': screenshot not found at {}",
                name,
                actual_path.display()
            )));
        }

        std::fs::copy(&actual_path, &baseline_path)?;
        info!("Updated baseline for '{}'", name);
        Ok(())
    }

    /// Promote every screenshot in the actual dir to baseline
    pub fn update_all_baselines(&self) -> HarnessResult<()> {
        for name in png_stems(&self.actual_dir)? {
            self.update_baseline(&name)?;
        }
        Ok(())
    }

    /// List all stored baselines by name
    pub fn list_baselines(&self) -> HarnessResult<Vec<String>> {
        png_stems(&self.baseline_dir)
    }

    /// Remove stale diff images
    pub fn clean_diffs(&self) -> HarnessResult<()> {
        for entry in std::fs::read_dir(&self.diff_dir)? {
            std::fs::remove_file(entry?.path())?;
        }
        Ok(())
    }
}

/// Pixel-level comparison. Differing pixels are painted red in the returned
/// diff image; matching pixels are dimmed so differences stand out.
pub(crate) fn diff_images(
    actual: &RgbaImage,
    baseline: &RgbaImage,
) -> (u64, u64, RgbaImage) {
    let (width, height) = actual.dimensions();
    let overlap_w = width.min(baseline.width());
    let overlap_h = height.min(baseline.height());

    let mut diff_image = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;
    let total_pixels = u64::from(width) * u64::from(height);

    for y in 0..overlap_h {
        for x in 0..overlap_w {
            let a = actual.get_pixel(x, y);
            let b = baseline.get_pixel(x, y);

            if pixels_differ(a, b) {
                diff_pixels += 1;
                diff_image.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
            } else {
                let [r, g, bl, _] = a.0;
                diff_image.put_pixel(x, y, image::Rgba([r / 2, g / 2, bl / 2, 128]));
            }
        }
    }

    // Area outside the overlap counts as different
    let overlap = u64::from(overlap_w) * u64::from(overlap_h);
    diff_pixels += total_pixels - overlap;

    (diff_pixels, total_pixels, diff_image)
}

fn pixels_differ(a: &image::Rgba<u8>, b: &image::Rgba<u8>) -> bool {
    a.0.iter()
        .zip(b.0.iter())
        .any(|(&x, &y)| (i32::from(x) - i32::from(y)).abs() > CHANNEL_TOLERANCE)
}

fn hash_file(path: &Path) -> HarnessResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn png_stems(dir: &Path) -> HarnessResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "png").unwrap_or(false) {
            if let Some(stem) = path.file_stem() {
                names.push(stem.to_string_lossy().to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Configuration for visual regression
#[derive(Debug, Clone)]
pub struct VisualConfig {
    pub baseline_dir: PathBuf,
    pub actual_dir: PathBuf,
    pub diff_dir: PathBuf,
    pub threshold: f64,
    pub auto_update: bool,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from("verification/baselines"),
            actual_dir: PathBuf::from("verification/screenshots"),
            diff_dir: PathBuf::from("verification/diffs"),
            threshold: 0.5,
            auto_update: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_images_have_no_diff() {
        let img = RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
        let (diff, total, _) = diff_images(&img, &img.clone());
        assert_eq!(diff, 0);
        assert_eq!(total, 16);
    }

    #[test]
    fn difference_within_tolerance_is_ignored() {
        let a = RgbaImage::from_pixel(2, 2, image::Rgba([100, 100, 100, 255]));
        let b = RgbaImage::from_pixel(2, 2, image::Rgba([103, 98, 100, 255]));
        let (diff, _, _) = diff_images(&a, &b);
        assert_eq!(diff, 0);
    }

    #[test]
    fn changed_pixel_is_counted_and_highlighted() {
        let a = RgbaImage::from_pixel(2, 2, image::Rgba([100, 100, 100, 255]));
        let mut b = a.clone();
        b.put_pixel(1, 1, image::Rgba([200, 100, 100, 255]));

        let (diff, total, diff_image) = diff_images(&a, &b);
        assert_eq!(diff, 1);
        assert_eq!(total, 4);
        assert_eq!(diff_image.get_pixel(1, 1), &image::Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn size_mismatch_counts_missing_area_as_diff() {
        let a = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]));
        let b = RgbaImage::from_pixel(2, 4, image::Rgba([0, 0, 0, 255]));
        let (diff, total, _) = diff_images(&a, &b);
        assert_eq!(total, 16);
        assert_eq!(diff, 8);
    }

    #[test]
    fn compare_uses_auto_update_for_missing_baseline() {
        let tmp = tempfile::tempdir().unwrap();
        let config = VisualConfig {
            baseline_dir: tmp.path().join("baselines"),
            actual_dir: tmp.path().join("actual"),
            diff_dir: tmp.path().join("diffs"),
            threshold: 0.5,
            auto_update: true,
        };
        let tester = VisualTester::new(config).unwrap();

        let img = RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
        img.save(tmp.path().join("actual/shot.png")).unwrap();

        let diff = tester.compare("shot", None).unwrap();
        assert!(diff.matches);
        assert!(tmp.path().join("baselines/shot.png").exists());
    }

    #[test]
    fn missing_baseline_is_an_error_without_auto_update() {
        let tmp = tempfile::tempdir().unwrap();
        let config = VisualConfig {
            baseline_dir: tmp.path().join("baselines"),
            actual_dir: tmp.path().join("actual"),
            diff_dir: tmp.path().join("diffs"),
            threshold: 0.5,
            auto_update: false,
        };
        let tester = VisualTester::new(config).unwrap();

        let img = RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
        img.save(tmp.path().join("actual/shot.png")).unwrap();

        match tester.compare("shot", None) {
            Err(HarnessError::BaselineMissing(_)) => {}
            other => panic!("expected BaselineMissing, got {:?}", other.map(|d| d.matches)),
        }
    }

    #[test]
    fn default_config_points_at_verification_dirs() {
        let config = VisualConfig::default();
        assert_eq!(config.threshold, 0.5);
        assert!(!config.auto_update);
        assert!(config.baseline_dir.ends_with("baselines"));
    }
}
