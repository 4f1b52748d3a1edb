//! Global Otsu thresholding into a ridge mask.
//!
//! [`otsu_threshold`] wraps [`imageproc::contrast::otsu_level`], which
//! picks the level maximizing between-class variance. [`binarize`] then
//! maps the class that holds the ridges (see [`RidgePolarity`]) to
//! `true`, so downstream stages always see ridges as foreground.

use image::GrayImage;

use crate::types::{RidgeMask, RidgePolarity};

/// Result of thresholding a normalized image.
#[derive(Debug, Clone)]
pub struct Binarized {
    /// Ridge mask, ridge pixels `true`.
    pub mask: RidgeMask,
    /// Otsu level; pixels `<= threshold` form the dark class.
    pub threshold: u8,
    /// Whether the dark class was taken as ridge.
    pub dark_ridges: bool,
}

/// Compute the Otsu threshold of a grayscale image.
///
/// Returns 0 for zero-sized images instead of running the histogram.
#[must_use]
pub fn otsu_threshold(image: &GrayImage) -> u8 {
    if image.width() == 0 || image.height() == 0 {
        return 0;
    }
    imageproc::contrast::otsu_level(image)
}

/// Threshold `image` and polarity-correct so ridges are foreground.
///
/// With [`RidgePolarity::Auto`] the class covering fewer pixels is taken
/// as ridge; an exact tie keeps dark ridges.
#[must_use = "returns the ridge mask"]
pub fn binarize(image: &GrayImage, polarity: RidgePolarity) -> Binarized {
    let threshold = otsu_threshold(image);
    let dark: Vec<bool> = image.as_raw().iter().map(|&v| v <= threshold).collect();

    let dark_ridges = match polarity {
        RidgePolarity::Dark => true,
        RidgePolarity::Light => false,
        RidgePolarity::Auto => {
            let dark_count = dark.iter().filter(|&&d| d).count();
            dark_count * 2 <= dark.len()
        }
    };

    let pixels = if dark_ridges {
        dark
    } else {
        dark.into_iter().map(|d| !d).collect()
    };

    // The buffer comes straight from the image, so the length matches.
    let mask = RidgeMask::from_raw(image.width(), image.height(), pixels)
        .unwrap_or_else(|| RidgeMask::new(image.width(), image.height()));

    tracing::debug!(
        threshold,
        dark_ridges,
        ridge_pixels = mask.ridge_count(),
        "binarized image",
    );

    Binarized {
        mask,
        threshold,
        dark_ridges,
    }
}
