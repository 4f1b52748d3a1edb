//! Gallery enhancement chain: contrast normalization, edge-preserving
//! smoothing, and ridge-emphasis sharpening.
//!
//! Unenhanced photos have uneven illumination and sensor noise that
//! break a single global threshold. The chain runs in a fixed order:
//!
//! 1. [`clahe`] - contrast limited adaptive histogram equalization
//! 2. [`bilateral_filter`] - smooths noise without blurring ridge edges
//! 3. [`unsharp_mask`] - restores ridge/valley contrast
//!
//! [`enhance`] validates the parameters first so the preprocessor can
//! fall back to a plain resize instead of producing garbage.

use image::GrayImage;
use imageproc::filter::bilateral::GaussianEuclideanColorDistance;

use crate::types::{EnhanceConfig, PipelineError};

/// Number of intensity levels in an 8-bit histogram.
const LEVELS: usize = 256;

/// Run the full enhancement chain.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyImage`] for zero-sized images and
/// [`PipelineError::InvalidConfig`] when a parameter is out of range.
pub fn enhance(image: &GrayImage, config: &EnhanceConfig) -> Result<GrayImage, PipelineError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::EmptyImage);
    }
    validate(config)?;

    let equalized = clahe(image, config.clahe_tiles, config.clahe_clip_limit);
    let smoothed = bilateral_filter(
        &equalized,
        config.bilateral_radius,
        config.bilateral_range_sigma,
        config.bilateral_spatial_sigma,
    );
    Ok(unsharp_mask(
        &smoothed,
        config.unsharp_sigma,
        config.unsharp_amount,
    ))
}

fn validate(config: &EnhanceConfig) -> Result<(), PipelineError> {
    if config.clahe_tiles == 0 {
        return Err(PipelineError::InvalidConfig(
            "clahe_tiles must be at least 1".to_owned(),
        ));
    }
    if !(config.clahe_clip_limit.is_finite() && config.clahe_clip_limit > 0.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "clahe_clip_limit must be positive, got {}",
            config.clahe_clip_limit
        )));
    }
    for (name, sigma) in [
        ("bilateral_range_sigma", config.bilateral_range_sigma),
        ("bilateral_spatial_sigma", config.bilateral_spatial_sigma),
    ] {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "{name} must be positive, got {sigma}"
            )));
        }
    }
    if config.bilateral_radius > EnhanceConfig::MAX_BILATERAL_RADIUS {
        return Err(PipelineError::InvalidConfig(format!(
            "bilateral_radius must be at most {}, got {}",
            EnhanceConfig::MAX_BILATERAL_RADIUS,
            config.bilateral_radius
        )));
    }
    if !config.unsharp_sigma.is_finite() || !config.unsharp_amount.is_finite() {
        return Err(PipelineError::InvalidConfig(
            "unsharp parameters must be finite".to_owned(),
        ));
    }
    Ok(())
}

/// Contrast limited adaptive histogram equalization.
///
/// The image is split into a `tiles x tiles` grid. Each tile gets its
/// own clipped, equalized lookup table, and every pixel is mapped by
/// bilinear interpolation between the four nearest tile centers so no
/// block seams appear. `clip_limit` is a multiple of the mean bin
/// height; excess counts are spread evenly over all bins.
///
/// Zero-sized images and `tiles == 0` return the input unchanged.
#[must_use = "returns the equalized image"]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn clahe(image: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 || tiles == 0 {
        return image.clone();
    }

    let tile_w = w.div_ceil(tiles.min(w));
    let tile_h = h.div_ceil(tiles.min(h));
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut luts: Vec<[u8; LEVELS]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);

            let mut histogram = [0u32; LEVELS];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[usize::from(image.get_pixel(x, y).0[0])] += 1;
                }
            }
            let total = (x1 - x0) * (y1 - y0);
            luts.push(tile_lut(&mut histogram, total, clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    GrayImage::from_fn(w, h, |x, y| {
        let v = usize::from(image.get_pixel(x, y).0[0]);

        // Continuous tile coordinates relative to tile centers.
        let fx = (f64::from(x) + 0.5) / f64::from(tile_w) - 0.5;
        let fy = (f64::from(y) + 0.5) / f64::from(tile_h) - 0.5;
        let tx0 = (fx.floor().max(0.0) as u32).min(tiles_x - 1);
        let ty0 = (fy.floor().max(0.0) as u32).min(tiles_y - 1);
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let ax = (fx - f64::from(tx0)).clamp(0.0, 1.0);
        let ay = (fy - f64::from(ty0)).clamp(0.0, 1.0);

        let top = f64::from(lut_at(tx0, ty0)[v])
            .mul_add(1.0 - ax, f64::from(lut_at(tx1, ty0)[v]) * ax);
        let bottom = f64::from(lut_at(tx0, ty1)[v])
            .mul_add(1.0 - ax, f64::from(lut_at(tx1, ty1)[v]) * ax);
        let value = top.mul_add(1.0 - ay, bottom * ay);
        image::Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Clip a tile histogram, redistribute the excess, and build its
/// equalization lookup table.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn tile_lut(histogram: &mut [u32; LEVELS], total: u32, clip_limit: f32) -> [u8; LEVELS] {
    let mut lut = [0u8; LEVELS];
    if total == 0 {
        return lut;
    }

    let clip = ((f64::from(clip_limit) * f64::from(total) / LEVELS as f64) as u32).max(1);
    let mut excess = 0u32;
    for count in histogram.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }
    let spread = excess / LEVELS as u32;
    let remainder = (excess % LEVELS as u32) as usize;
    for (i, count) in histogram.iter_mut().enumerate() {
        *count += spread + u32::from(i < remainder);
    }

    let mut cumulative = 0u64;
    for (slot, &count) in lut.iter_mut().zip(histogram.iter()) {
        cumulative += u64::from(count);
        *slot = ((cumulative as f64 * 255.0 / f64::from(total)).round()).min(255.0) as u8;
    }
    lut
}

/// Edge-preserving bilateral smoothing.
///
/// Each output pixel is a weighted mean over a `(2r+1)^2` window, with
/// weights falling off with spatial distance (`spatial_sigma`) and
/// intensity difference (`range_sigma`). Ridge edges have large
/// intensity steps and are left sharp.
///
/// A zero radius, a radius above
/// [`EnhanceConfig::MAX_BILATERAL_RADIUS`], a non-positive sigma, or an
/// empty image returns the image unchanged.
#[must_use = "returns the smoothed image"]
pub fn bilateral_filter(
    image: &GrayImage,
    radius: u32,
    range_sigma: f32,
    spatial_sigma: f32,
) -> GrayImage {
    let Some(radius) = window_radius(radius) else {
        return image.clone();
    };
    if image.width() == 0
        || image.height() == 0
        || !(range_sigma > 0.0 && range_sigma.is_finite())
        || !(spatial_sigma > 0.0 && spatial_sigma.is_finite())
    {
        return image.clone();
    }

    imageproc::filter::bilateral_filter(
        image,
        radius,
        spatial_sigma,
        GaussianEuclideanColorDistance::new(range_sigma),
    )
}

/// Narrow a configured radius to the `u8` imageproc takes.
fn window_radius(radius: u32) -> Option<u8> {
    if radius == 0 || radius > EnhanceConfig::MAX_BILATERAL_RADIUS {
        return None;
    }
    u8::try_from(radius).ok()
}

/// Unsharp masking: `out = orig + amount * (orig - gaussian(orig))`.
///
/// Non-positive sigma values return the image unchanged, since
/// `imageproc`'s Gaussian blur panics on `sigma <= 0.0`.
#[must_use = "returns the sharpened image"]
pub fn unsharp_mask(image: &GrayImage, sigma: f32, amount: f32) -> GrayImage {
    if sigma <= 0.0 || !sigma.is_finite() || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    imageproc::filter::sharpen_gaussian(image, sigma, amount)
}
