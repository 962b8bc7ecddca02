//! Fitted preprocessors that travel with a model artifact.

use image::imageops::FilterType;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::error::{PredictError, Result};

/// Fitted standardization: `(x - mean) / scale` per feature.
///
/// Mirrors the `mean_` and `scale_` attributes of a fitted scikit-learn
/// `StandardScaler`, stored as JSON. Never refit at inference time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl StandardScaler {
    /// Reject scalers that cannot transform an `n_features` vector.
    pub fn check(&self, n_features: usize) -> Result<()> {
        if self.mean.len() != n_features || self.scale.len() != n_features {
            return Err(PredictError::Deserialization(format!(
                "Scaler expects {} features (mean) / {} (scale), model needs {}",
                self.mean.len(),
                self.scale.len(),
                n_features
            )));
        }
        if let Some(i) = self.scale.iter().position(|s| *s == 0.0 || !s.is_finite()) {
            return Err(PredictError::Deserialization(format!(
                "Scaler has unusable scale at feature {}",
                i
            )));
        }
        Ok(())
    }

    pub fn transform(&self, features: &[f32]) -> Result<Vec<f32>> {
        if features.len() != self.mean.len() {
            return Err(PredictError::Inference(format!(
                "Scaler fitted on {} features, got {}",
                self.mean.len(),
                features.len()
            )));
        }
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| (x - mean) / scale)
            .collect())
    }
}

/// Per-channel normalization applied after scaling pixels to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelNormalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

/// Deterministic image preprocessing for the disease classifier.
///
/// Decode, convert to RGB, resize to `size`×`size`, lay out as a
/// `[1, 3, H, W]` float tensor. No random augmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTransform {
    pub size: u32,
    pub normalization: Option<ChannelNormalization>,
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self {
            size: 256,
            normalization: None,
        }
    }
}

impl ImageTransform {
    pub fn apply(&self, bytes: &[u8]) -> Result<Array4<f32>> {
        if bytes.is_empty() {
            return Err(PredictError::InvalidImage("empty image payload".to_string()));
        }

        let rgb = image::load_from_memory(bytes)
            .map_err(|e| PredictError::InvalidImage(e.to_string()))?
            .to_rgb8();
        let resized = image::imageops::resize(&rgb, self.size, self.size, FilterType::Triangle);

        let side = self.size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let mut value = pixel[c] as f32 / 255.0;
                if let Some(norm) = &self.normalization {
                    value = (value - norm.mean[c]) / norm.std[c];
                }
                tensor[[0, c, y as usize, x as usize]] = value;
            }
        }

        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgb(color));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_scaler_transform() {
        let scaler = StandardScaler {
            mean: vec![10.0, 0.0],
            scale: vec![2.0, 0.5],
        };
        scaler.check(2).unwrap();
        assert_eq!(scaler.transform(&[14.0, 1.0]).unwrap(), vec![2.0, 2.0]);
        assert!(scaler.transform(&[1.0]).is_err());
    }

    #[test]
    fn test_scaler_check_rejects_bad_shapes() {
        let scaler = StandardScaler {
            mean: vec![0.0; 8],
            scale: vec![1.0; 7],
        };
        assert!(matches!(scaler.check(8), Err(PredictError::Deserialization(_))));

        let zero = StandardScaler {
            mean: vec![0.0; 2],
            scale: vec![1.0, 0.0],
        };
        assert!(matches!(zero.check(2), Err(PredictError::Deserialization(_))));
    }

    #[test]
    fn test_transform_shape_and_range() {
        let bytes = png_bytes(40, 20, [255, 0, 51]);
        let tensor = ImageTransform::default().apply(&bytes).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 256, 256]);
        assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 0.01);
        assert!(tensor[[0, 1, 128, 200]].abs() < 0.01);
        assert!((tensor[[0, 2, 255, 255]] - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_transform_normalization() {
        let bytes = png_bytes(8, 8, [255, 255, 255]);
        let transform = ImageTransform {
            size: 4,
            normalization: Some(ChannelNormalization {
                mean: [0.5, 0.5, 0.5],
                std: [0.5, 0.25, 0.5],
            }),
        };
        let tensor = transform.apply(&bytes).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 4, 4]);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 0.05);
        assert!((tensor[[0, 1, 3, 3]] - 2.0).abs() < 0.05);
    }

    #[test]
    fn test_transform_rejects_garbage() {
        let transform = ImageTransform::default();
        assert!(matches!(transform.apply(&[]), Err(PredictError::InvalidImage(_))));
        assert!(matches!(
            transform.apply(b"definitely not an image"),
            Err(PredictError::InvalidImage(_))
        ));
    }
}
