use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;

use crate::config::TensorLayout;
use crate::error::ImageError;

/// A submission ready for the classifier.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Batched tensor, values in [0, 1]
    pub tensor: Array4<f32>,
    /// Cropped and resized picture, for display
    pub display: RgbImage,
}

/// Center-crops, resizes and scales raw images into the model's input shape.
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    size: u32,
    layout: TensorLayout,
}

/// Square crop window `(x, y, side)` centred in a `width` x `height` image.
pub fn center_square(width: u32, height: u32) -> (u32, u32, u32) {
    let side = width.min(height);
    ((width - side) / 2, (height - side) / 2, side)
}

impl ImageNormalizer {
    pub fn new(size: u32, layout: TensorLayout) -> Self {
        Self { size, layout }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Decode encoded bytes (JPEG, PNG, WebP) and normalize them.
    pub fn normalize_bytes(&self, bytes: &[u8]) -> Result<NormalizedImage, ImageError> {
        let img = image::load_from_memory(bytes)?;
        self.normalize(&img)
    }

    pub fn normalize(&self, img: &DynamicImage) -> Result<NormalizedImage, ImageError> {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return Err(ImageError::Empty(w, h));
        }

        // Alpha is dropped here
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        let square = crop_square(&rgb);
        let display = square
            .resize_exact(self.size, self.size, FilterType::Triangle)
            .to_rgb8();

        log::debug!("Normalized {w}x{h} image to {0}x{0}", self.size);
        Ok(NormalizedImage {
            tensor: self.to_tensor(&display),
            display,
        })
    }

    fn to_tensor(&self, rgb: &RgbImage) -> Array4<f32> {
        let size = self.size as usize;
        let mut tensor = match self.layout {
            TensorLayout::Nhwc => Array4::zeros((1, size, size, 3)),
            TensorLayout::Nchw => Array4::zeros((1, 3, size, size)),
        };

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                match self.layout {
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                }
            }
        }

        tensor
    }
}

/// Center crop to a square of side min(w, h). Square input is returned as is.
pub fn crop_square(img: &DynamicImage) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w == h {
        return img.clone();
    }
    let (x, y, side) = center_square(w, h);
    img.crop_imm(x, y, side, side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, Rgba, RgbaImage};
    use proptest::prelude::*;
    use std::io::Cursor;

    fn solid(w: u32, h: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(color)))
    }

    #[test]
    fn landscape_crop_is_centered() {
        assert_eq!(center_square(640, 480), (80, 0, 480));
        assert_eq!(center_square(480, 640), (0, 80, 480));
        assert_eq!(center_square(301, 300), (0, 0, 300));
        assert_eq!(center_square(256, 256), (0, 0, 256));
    }

    #[test]
    fn crop_keeps_the_middle_band() {
        // Left and right thirds red, middle green: only green survives the crop.
        let mut img = RgbImage::from_pixel(30, 10, Rgb([255, 0, 0]));
        for x in 10..20 {
            for y in 0..10 {
                img.put_pixel(x, y, Rgb([0, 255, 0]));
            }
        }
        let cropped = crop_square(&DynamicImage::ImageRgb8(img)).to_rgb8();
        assert_eq!(cropped.dimensions(), (10, 10));
        assert!(cropped.pixels().all(|p| *p == Rgb([0, 255, 0])));
    }

    #[test]
    fn nhwc_tensor_is_batched_and_scaled() {
        let normalizer = ImageNormalizer::new(8, TensorLayout::Nhwc);
        let out = normalizer.normalize(&solid(20, 12, [255, 0, 51])).unwrap();
        assert_eq!(out.tensor.shape(), &[1, 8, 8, 3]);
        assert_eq!(out.display.dimensions(), (8, 8));
        assert!((out.tensor[[0, 3, 4, 0]] - 1.0).abs() < 1e-6);
        assert!(out.tensor[[0, 3, 4, 1]].abs() < 1e-6);
        assert!((out.tensor[[0, 3, 4, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn nchw_tensor_puts_channels_first() {
        let normalizer = ImageNormalizer::new(4, TensorLayout::Nchw);
        let out = normalizer.normalize(&solid(4, 4, [0, 255, 0])).unwrap();
        assert_eq!(out.tensor.shape(), &[1, 3, 4, 4]);
        assert!((out.tensor[[0, 1, 2, 2]] - 1.0).abs() < 1e-6);
        assert!(out.tensor[[0, 0, 2, 2]].abs() < 1e-6);
    }

    #[test]
    fn alpha_channel_is_dropped() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 6, Rgba([10, 20, 30, 0])));
        let out = ImageNormalizer::new(6, TensorLayout::Nhwc).normalize(&img).unwrap();
        assert_eq!(out.display.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn encoded_png_round_trips_through_decoder() {
        let mut bytes = Vec::new();
        solid(16, 9, [1, 2, 3])
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let out = ImageNormalizer::new(4, TensorLayout::Nhwc)
            .normalize_bytes(&bytes)
            .unwrap();
        assert_eq!(out.display.dimensions(), (4, 4));
    }

    #[test]
    fn garbage_bytes_are_an_image_error() {
        let err = ImageNormalizer::new(4, TensorLayout::Nhwc)
            .normalize_bytes(b"definitely not a jpeg")
            .unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));
    }

    proptest! {
        #[test]
        fn crop_side_is_min_dimension(w in 1u32..200, h in 1u32..200) {
            let cropped = crop_square(&solid(w, h, [7, 7, 7]));
            let (cw, ch) = cropped.dimensions();
            prop_assert_eq!(cw, ch);
            prop_assert_eq!(cw, w.min(h));
        }

        #[test]
        fn crop_window_stays_inside(w in 1u32..5000, h in 1u32..5000) {
            let (x, y, side) = center_square(w, h);
            prop_assert!(x + side <= w);
            prop_assert!(y + side <= h);
            prop_assert!(w - (x + side) >= x);
            prop_assert!(h - (y + side) >= y);
        }
    }
}
