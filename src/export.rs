use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::{AnnotationLayer, BackgroundLayer};
use crate::io::{self, CodecError};

/// A serialized raster ready to hand to a host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    fn png(image: &RgbaImage) -> Result<Self, CodecError> {
        Ok(Self {
            width: image.width(),
            height: image.height(),
            bytes: io::encode_png(image)?,
        })
    }

    pub fn mime_type(&self) -> &'static str {
        "image/png"
    }

    pub fn decode(&self) -> Result<RgbaImage, CodecError> {
        io::decode_png(&self.bytes)
    }
}

/// Read-only view over a ready surface's layers.
pub struct Exporter<'a> {
    background: &'a BackgroundLayer,
    annotation: &'a AnnotationLayer,
}

impl<'a> Exporter<'a> {
    pub fn new(background: &'a BackgroundLayer, annotation: &'a AnnotationLayer) -> Self {
        Self {
            background,
            annotation,
        }
    }

    /// The committed annotation alone, background excluded. This is the
    /// payload handed to the host's save callback.
    pub fn export_annotation_only(&self) -> Result<EncodedImage, CodecError> {
        let encoded = EncodedImage::png(self.annotation.committed())?;
        log_info!(
            "Exported annotation {}x{} ({} bytes)",
            encoded.width,
            encoded.height,
            encoded.bytes.len()
        );
        Ok(encoded)
    }

    /// Background with the committed annotation over it, at physical size.
    pub fn composite(&self) -> RgbaImage {
        let mut out = self.background.pixels().clone();
        let top = self.annotation.committed();
        if out.dimensions() != top.dimensions() {
            log_warn!(
                "Composite size mismatch {:?} vs {:?}; annotation skipped",
                out.dimensions(),
                top.dimensions()
            );
            return out;
        }
        let row_bytes = out.width() as usize * 4;
        let dst: &mut [u8] = &mut out;
        dst.par_chunks_mut(row_bytes)
            .zip(top.as_raw().par_chunks(row_bytes))
            .for_each(|(d_row, s_row)| {
                for (d, s) in d_row.chunks_exact_mut(4).zip(s_row.chunks_exact(4)) {
                    blend_over(d, s);
                }
            });
        out
    }

    pub fn export_composite(&self) -> Result<EncodedImage, CodecError> {
        let encoded = EncodedImage::png(&self.composite())?;
        log_info!(
            "Exported composite {}x{} ({} bytes)",
            encoded.width,
            encoded.height,
            encoded.bytes.len()
        );
        Ok(encoded)
    }
}

/// Straight-alpha source-over of one RGBA pixel.
#[inline]
fn blend_over(dst: &mut [u8], src: &[u8]) {
    let sa = src[3] as f32 / 255.0;
    if sa <= 0.0 {
        return;
    }
    if sa >= 1.0 {
        dst.copy_from_slice(src);
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let oa = sa + da * (1.0 - sa);
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / oa;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
}
