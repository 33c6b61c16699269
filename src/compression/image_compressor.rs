//! Image normalization with the `image` crate

use crate::compression::{Compressor, NormalizedFile, into_owned};
use crate::config::{CompressionConfig, TargetEncoding};
use crate::error::{IngestError, Result};
use crate::logging::Logger;
use crate::task::Payload;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::sync::Arc;

const QUALITY_STEP: f32 = 0.1;

pub struct ImageCompressor {
    config: CompressionConfig,
    output: Logger,
}

impl ImageCompressor {
    pub fn new(config: CompressionConfig, output: Logger) -> Self {
        Self { config, output }
    }

    /// Normalize in-memory bytes into the configured envelope
    pub fn compress_bytes(
        &self,
        file_name: &str,
        original: impl Into<Arc<Vec<u8>>>,
    ) -> Result<NormalizedFile> {
        let original = original.into();
        let decoded = image::load_from_memory(original.as_slice()).map_err(|e| {
            IngestError::Compression(format!("Cannot decode {}: {}", file_name, e))
        })?;

        let max_dimension = self.config.max_dimension;
        let fits_dimensions = decoded.width().max(decoded.height()) <= max_dimension;
        let image = if fits_dimensions {
            decoded
        } else {
            decoded.resize(max_dimension, max_dimension, FilterType::Lanczos3)
        };

        let mut quality = self.config.quality;
        let mut encoded = self.encode(&image, quality)?;

        if self.config.target_encoding == TargetEncoding::Jpeg {
            while encoded.len() as u64 > self.config.max_size_bytes
                && quality - QUALITY_STEP >= self.config.min_quality - f32::EPSILON
            {
                quality -= QUALITY_STEP;
                encoded = self.encode(&image, quality)?;
            }
        }

        if encoded.len() as u64 > self.config.max_size_bytes {
            self.output.warning(&format!(
                "{} still exceeds {} bytes after compression ({} bytes)",
                file_name,
                self.config.max_size_bytes,
                encoded.len()
            ));
        }

        let within_envelope = fits_dimensions && original.len() as u64 <= self.config.max_size_bytes;
        if within_envelope && encoded.len() >= original.len() {
            self.output.debug(&format!(
                "{} already fits the envelope, keeping original",
                file_name
            ));
            return Ok(NormalizedFile::passthrough(file_name.to_string(), into_owned(original)));
        }

        self.output.debug(&format!(
            "{}: {} -> {} bytes at quality {:.1}",
            file_name,
            original.len(),
            encoded.len(),
            quality
        ));

        Ok(NormalizedFile {
            data: encoded,
            file_name: with_extension(file_name, self.config.target_encoding.extension()),
            content_type: self.config.target_encoding.content_type().to_string(),
            width: Some(image.width()),
            height: Some(image.height()),
            compressed: true,
        })
    }

    fn encode(&self, image: &DynamicImage, quality: f32) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        match self.config.target_encoding {
            TargetEncoding::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut buffer, quality_percent(quality));
                rgb.write_with_encoder(encoder)?;
            }
            TargetEncoding::Png => {
                let encoder = PngEncoder::new(&mut buffer);
                image.write_with_encoder(encoder)?;
            }
        }
        Ok(buffer)
    }
}

impl Compressor for ImageCompressor {
    fn compress(&self, source: &Payload) -> Result<NormalizedFile> {
        let original = source.read()?;
        self.compress_bytes(&source.file_name(), original)
    }
}

fn quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Replace (or add) the extension of a file name
fn with_extension(file_name: &str, extension: &str) -> String {
    let stem = match file_name.rfind('.') {
        Some(pos) if pos > 0 => &file_name[..pos],
        _ => file_name,
    };
    format!("{}.{}", stem, extension)
}
