use image::{DynamicImage, GrayImage, ImageDecoder, ImageReader, Luma, RgbImage};
use snapmatch_common::config::PreprocessConfig;
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("failed to decode captured frame: {0}")]
    Decode(#[from] image::ImageError),
}

/// Normalize a raw captured image for OCR.
///
/// Steps compose in a fixed order — orientation, grayscale, contrast,
/// threshold, denoise — each independently toggleable. Pure and
/// deterministic: identical bytes and options produce an identical output
/// buffer.
pub fn normalize(bytes: &[u8], options: &PreprocessConfig) -> Result<DynamicImage, PreprocessError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;

    if options.correct_orientation {
        img.apply_orientation(orientation);
    }

    if options.grayscale {
        img = DynamicImage::ImageLuma8(img.to_luma8());
    }

    if options.contrast_factor > 1.0 {
        img = scale_contrast(img, options.contrast_factor);
    }

    if let Some(threshold) = options.binarize_threshold {
        img = DynamicImage::ImageLuma8(binarize(img.to_luma8(), threshold));
    }

    if options.denoise_radius > 0 {
        img = DynamicImage::ImageLuma8(median_filter(&img.to_luma8(), options.denoise_radius));
    }

    Ok(img)
}

/// Interpolate each channel about the mean luminance:
/// `out = mean + factor * (px - mean)`, clamped to [0, 255].
fn scale_contrast(img: DynamicImage, factor: f32) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(mut gray) => {
            let mean = gray_mean(&gray);
            for p in gray.pixels_mut() {
                p.0[0] = remap(p.0[0], mean, factor);
            }
            DynamicImage::ImageLuma8(gray)
        }
        other => {
            let mut rgb = other.to_rgb8();
            let mean = rgb_luminance_mean(&rgb);
            for p in rgb.pixels_mut() {
                for channel in p.0.iter_mut() {
                    *channel = remap(*channel, mean, factor);
                }
            }
            DynamicImage::ImageRgb8(rgb)
        }
    }
}

fn remap(px: u8, mean: f32, factor: f32) -> u8 {
    (mean + factor * (px as f32 - mean)).round().clamp(0.0, 255.0) as u8
}

fn gray_mean(gray: &GrayImage) -> f32 {
    let sum: f64 = gray.pixels().map(|p| p.0[0] as f64).sum();
    (sum / gray.pixels().len() as f64) as f32
}

/// ITU-R 601-2 luminance mean over an RGB image.
fn rgb_luminance_mean(rgb: &RgbImage) -> f32 {
    let sum: f64 = rgb
        .pixels()
        .map(|p| 0.299 * p.0[0] as f64 + 0.587 * p.0[1] as f64 + 0.114 * p.0[2] as f64)
        .sum();
    (sum / rgb.pixels().len() as f64) as f32
}

/// Two-level image: pixels below the threshold go dark, the rest light.
fn binarize(mut gray: GrayImage, threshold: u8) -> GrayImage {
    for p in gray.pixels_mut() {
        p.0[0] = if p.0[0] < threshold { 0 } else { 255 };
    }
    gray
}

/// Median rank filter over a square window, edges replicated.
fn median_filter(gray: &GrayImage, radius: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let r = radius as i64;
    GrayImage::from_fn(w, h, |x, y| {
        let mut window = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        for dy in -r..=r {
            for dx in -r..=r {
                let nx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                let ny = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                window.push(gray.get_pixel(nx, ny).0[0]);
            }
        }
        window.sort_unstable();
        Luma([window[window.len() / 2]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn gray_png(pixels: &[u8], w: u32, h: u32) -> Vec<u8> {
        let img = GrayImage::from_vec(w, h, pixels.to_vec()).unwrap();
        png_bytes(&DynamicImage::ImageLuma8(img))
    }

    fn options() -> PreprocessConfig {
        PreprocessConfig::default()
    }

    #[test]
    fn normalize_is_deterministic() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(8, 8, |x, y| {
            image::Rgb([(x * 31) as u8, (y * 29) as u8, ((x + y) * 13) as u8])
        }));
        let bytes = png_bytes(&img);
        let opts = PreprocessConfig {
            correct_orientation: true,
            grayscale: true,
            contrast_factor: 2.0,
            binarize_threshold: Some(128),
            denoise_radius: 1,
        };

        let a = normalize(&bytes, &opts).unwrap();
        let b = normalize(&bytes, &opts).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn contrast_interpolates_about_the_mean() {
        let bytes = gray_png(&[100, 150], 2, 1);
        let opts = PreprocessConfig {
            grayscale: true,
            contrast_factor: 2.0,
            ..options()
        };
        // mean = 125, so 100 -> 75 and 150 -> 175
        let out = normalize(&bytes, &opts).unwrap().to_luma8();
        assert_eq!(out.as_raw(), &vec![75u8, 175]);
    }

    #[test]
    fn contrast_saturates_at_the_levels() {
        let bytes = gray_png(&[0, 255], 2, 1);
        let opts = PreprocessConfig {
            grayscale: true,
            contrast_factor: 10.0,
            ..options()
        };
        let out = normalize(&bytes, &opts).unwrap().to_luma8();
        assert_eq!(out.as_raw(), &vec![0u8, 255]);
    }

    #[test]
    fn unit_contrast_factor_is_a_no_op() {
        let bytes = gray_png(&[10, 90, 200], 3, 1);
        let opts = PreprocessConfig {
            grayscale: true,
            contrast_factor: 1.0,
            ..options()
        };
        let out = normalize(&bytes, &opts).unwrap().to_luma8();
        assert_eq!(out.as_raw(), &vec![10u8, 90, 200]);
    }

    #[test]
    fn binarize_produces_exactly_two_levels() {
        let pixels: Vec<u8> = (0..=255).map(|v| v as u8).collect();
        let bytes = gray_png(&pixels, 16, 16);
        let opts = PreprocessConfig {
            binarize_threshold: Some(128),
            ..options()
        };
        let out = normalize(&bytes, &opts).unwrap().to_luma8();
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn binarize_threshold_is_inclusive_on_the_light_side() {
        let bytes = gray_png(&[127, 128], 2, 1);
        let opts = PreprocessConfig {
            binarize_threshold: Some(128),
            ..options()
        };
        let out = normalize(&bytes, &opts).unwrap().to_luma8();
        assert_eq!(out.as_raw(), &vec![0u8, 255]);
    }

    #[test]
    fn median_filter_removes_a_speck() {
        let mut pixels = vec![255u8; 9];
        pixels[4] = 0; // single dark speck in a 3x3 white field
        let bytes = gray_png(&pixels, 3, 3);
        let opts = PreprocessConfig {
            denoise_radius: 1,
            ..options()
        };
        let out = normalize(&bytes, &opts).unwrap().to_luma8();
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn zero_denoise_radius_is_disabled() {
        let mut pixels = vec![255u8; 9];
        pixels[4] = 0;
        let bytes = gray_png(&pixels, 3, 3);
        let out = normalize(&bytes, &options()).unwrap().to_luma8();
        assert_eq!(out.get_pixel(1, 1).0[0], 0);
    }

    #[test]
    fn undecodable_bytes_are_a_decode_error() {
        let result = normalize(b"definitely not an image", &options());
        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }
}
