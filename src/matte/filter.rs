//! Fixed-kernel filters used to clean up the raw matte.

use crate::segmentation::Matte;
use image::Luma;
use imageproc::filter::separable_filter_equal;

/// Gaussian sigma for a kernel size when none is given explicitly
fn sigma_for_kernel(ksize: usize) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D Gaussian weights for an odd kernel size
fn gaussian_kernel(ksize: usize) -> Vec<f32> {
    debug_assert!(ksize % 2 == 1);
    let sigma = sigma_for_kernel(ksize);
    let center = (ksize / 2) as f32;
    let weights: Vec<f32> = (0..ksize)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Separable Gaussian blur with a `ksize`×`ksize` kernel; edges are clamped
pub fn gaussian_blur(matte: &Matte, ksize: usize) -> Matte {
    separable_filter_equal(matte, &gaussian_kernel(ksize))
}

/// 3×3 elliptical structuring element (centre plus 4-neighbourhood)
const ELLIPSE_3X3: [(isize, isize); 5] = [(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)];

fn morph(matte: &Matte, pick: fn(f32, f32) -> f32) -> Matte {
    let (width, height) = matte.dimensions();
    Matte::from_fn(width, height, |x, y| {
        let value = ELLIPSE_3X3
            .iter()
            .filter_map(|&(dx, dy)| {
                let nx = x as isize + dx;
                let ny = y as isize + dy;
                let inside = nx >= 0 && ny >= 0 && nx < width as isize && ny < height as isize;
                inside.then(|| matte.get_pixel(nx as u32, ny as u32)[0])
            })
            .reduce(pick)
            .unwrap_or(0.0);
        Luma([value])
    })
}

/// Minimum over the structuring element
pub fn erode(matte: &Matte) -> Matte {
    morph(matte, f32::min)
}

/// Maximum over the structuring element
pub fn dilate(matte: &Matte) -> Matte {
    morph(matte, f32::max)
}

/// Erode then dilate: removes specks smaller than the element without shrinking shapes
pub fn open(matte: &Matte) -> Matte {
    dilate(&erode(matte))
}

pub fn clamp_unit(matte: &mut Matte) {
    for pixel in matte.pixels_mut() {
        pixel[0] = pixel[0].clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speck(width: u32, height: u32, at: (u32, u32)) -> Matte {
        let mut matte = Matte::new(width, height);
        matte.put_pixel(at.0, at.1, Luma([1.0]));
        matte
    }

    #[test]
    fn kernel_weights_sum_to_one() {
        for ksize in [3, 5, 7] {
            let kernel = gaussian_kernel(ksize);
            assert_eq!(kernel.len(), ksize);
            assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
            assert!(kernel[ksize / 2] > kernel[0]);
        }
    }

    #[test]
    fn blur_preserves_constant_mattes() {
        let matte = Matte::from_pixel(9, 6, Luma([0.4]));
        let blurred = gaussian_blur(&matte, 7);
        assert!(blurred.pixels().all(|p| (p[0] - 0.4).abs() < 1e-5));
    }

    #[test]
    fn blur_spreads_a_single_speck() {
        let blurred = gaussian_blur(&speck(9, 9, (4, 4)), 5);
        let centre = blurred.get_pixel(4, 4)[0];
        assert!(centre < 1.0 && centre > 0.0);
        assert!(blurred.get_pixel(5, 4)[0] > 0.0);
        assert_eq!(blurred.get_pixel(0, 0)[0], 0.0);
    }

    #[test]
    fn blur_clamps_at_the_border() {
        let edge = Matte::from_fn(9, 3, |x, _| Luma([if x == 0 { 1.0 } else { 0.0 }]));
        let blurred = gaussian_blur(&edge, 7);
        // the edge column is repeated outward, so most of the kernel sees it
        assert!(blurred.get_pixel(0, 1)[0] > 0.5);
        assert!(blurred.get_pixel(0, 1)[0] > blurred.get_pixel(1, 1)[0]);
        assert_eq!(blurred.get_pixel(8, 1)[0], 0.0);
    }

    #[test]
    fn open_removes_isolated_speck() {
        let opened = open(&speck(5, 5, (2, 2)));
        assert!(opened.pixels().all(|p| p[0] == 0.0));
    }

    #[test]
    fn open_keeps_large_regions_intact() {
        let band = Matte::from_fn(10, 10, |_, y| Luma([if (2..8).contains(&y) { 1.0 } else { 0.0 }]));
        assert_eq!(open(&band), band);
    }
}
