use colored::*;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::CompileError;
use crate::pdf_builder::PdfBuilder;

/// Re-encoding parameters for one compile run.
///
/// The same image directory can be compiled any number of times with
/// different profiles; the profile never affects downloading.
#[derive(Debug, Clone, Copy)]
pub struct CompressionProfile {
    pub max_dimension: u32,
    pub quality: u8,
}

impl CompressionProfile {
    pub fn new(max_dimension: u32, quality: u8) -> Result<Self, CompileError> {
        if max_dimension == 0 {
            return Err(CompileError::InvalidProfile(
                "max dimension must be at least 1 pixel".to_string(),
            ));
        }
        if !(1..=100).contains(&quality) {
            return Err(CompileError::InvalidProfile(format!(
                "quality must be in 1-100, got {quality}"
            )));
        }
        Ok(Self {
            max_dimension,
            quality,
        })
    }
}

/// What a completed compile run looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileSummary {
    pub pages_written: usize,
    pub pages_skipped: usize,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
}

/// Turns a directory of downloaded page images into one multi-page PDF.
///
/// The directory is the only contract with the download phase: any file
/// named `page_<number>.<ext>` is a page, everything else is ignored.
/// Missing page numbers are gaps, not errors.
pub struct PdfCompiler {
    source_dir: PathBuf,
    profile: CompressionProfile,
}

impl PdfCompiler {
    pub fn new(source_dir: PathBuf, profile: CompressionProfile) -> Self {
        Self {
            source_dir,
            profile,
        }
    }

    pub async fn compile(&self, output_pdf: &Path) -> Result<CompileSummary, CompileError> {
        let pages = self.discover_pages().await?;
        if pages.is_empty() {
            return Err(CompileError::NoImagesFound {
                dir: self.source_dir.clone(),
            });
        }

        info!(
            "Compiling {} images from \"{}\" (max dimension {}px, quality {})",
            pages.len(),
            self.source_dir.display().to_string().blue(),
            self.profile.max_dimension,
            self.profile.quality
        );

        let mut builder = PdfBuilder::new();
        let mut pages_skipped = 0;
        let mut original_bytes: u64 = 0;
        let mut compressed_bytes: u64 = 0;

        for (index, (page_number, path)) in pages.iter().enumerate() {
            debug!("Processing image {}/{}", index + 1, pages.len());
            let raw = match fs::read(path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping page {} ({}): {}", page_number, path.display(), e);
                    pages_skipped += 1;
                    continue;
                }
            };
            original_bytes += raw.len() as u64;

            match process_page(&raw, &self.profile) {
                Ok(page) => {
                    compressed_bytes += page.jpeg.len() as u64;
                    builder.add_jpeg_page(page.width, page.height, page.jpeg);
                }
                Err(e) => {
                    warn!("Skipping page {} ({}): {}", page_number, path.display(), e);
                    pages_skipped += 1;
                }
            }
        }

        if builder.is_empty() {
            return Err(CompileError::AllPagesSkipped {
                count: pages_skipped,
            });
        }

        if original_bytes > 0 {
            let reduction = 100.0 * (1.0 - compressed_bytes as f64 / original_bytes as f64);
            info!(
                "Image compression: {:.1}% reduction ({:.2} MB -> {:.2} MB)",
                reduction,
                original_bytes as f64 / 1024.0 / 1024.0,
                compressed_bytes as f64 / 1024.0 / 1024.0
            );
        }

        let pages_written = builder.page_count();
        let data = builder.finish()?;
        fs::write(output_pdf, &data)
            .await
            .map_err(|source| CompileError::WritePdf {
                path: output_pdf.to_path_buf(),
                source,
            })?;

        info!(
            "PDF created: {} ({} pages, {} skipped)",
            output_pdf.display().to_string().green(),
            pages_written,
            pages_skipped
        );

        Ok(CompileSummary {
            pages_written,
            pages_skipped,
            original_bytes,
            compressed_bytes,
        })
    }

    /// Enumerate page files and sort them by page number. The sort key is
    /// numeric so page 10 never lands before page 2.
    async fn discover_pages(&self) -> Result<Vec<(u32, PathBuf)>, CompileError> {
        let mut entries =
            fs::read_dir(&self.source_dir)
                .await
                .map_err(|source| CompileError::ReadDir {
                    path: self.source_dir.clone(),
                    source,
                })?;

        let mut pages = Vec::new();
        while let Some(entry) =
            entries
                .next_entry()
                .await
                .map_err(|source| CompileError::ReadDir {
                    path: self.source_dir.clone(),
                    source,
                })?
        {
            let path = entry.path();
            match page_number_from(&path) {
                Some(number) => pages.push((number, path)),
                None => debug!("Ignoring non-page file {}", path.display()),
            }
        }
        pages.sort_by_key(|(number, _)| *number);
        Ok(pages)
    }
}

/// Extract the page number from a stored filename, `None` for files that
/// do not follow the `page_<number>.<ext>` convention.
fn page_number_from(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix("page_")?.parse().ok()
}

struct ProcessedPage {
    width: u32,
    height: u32,
    jpeg: Vec<u8>,
}

/// Decode, normalize and re-encode a single page.
///
/// Pure function of the input bytes and the profile, so re-running a
/// compile over the same directory reproduces identical page content.
fn process_page(raw: &[u8], profile: &CompressionProfile) -> Result<ProcessedPage, image::ImageError> {
    let mut img = image::load_from_memory(raw)?;

    if img.width() > profile.max_dimension || img.height() > profile.max_dimension {
        img = img.resize(
            profile.max_dimension,
            profile.max_dimension,
            FilterType::Lanczos3,
        );
    }

    let rgb = flatten_to_rgb(img);
    let (width, height) = rgb.dimensions();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut Cursor::new(&mut jpeg), profile.quality)
        .encode_image(&rgb)?;

    Ok(ProcessedPage {
        width,
        height,
        jpeg,
    })
}

/// Normalize any decoded image to plain 8-bit RGB, the one color model the
/// output pages share. Images with an alpha channel are composited over a
/// white background rather than dropped onto black.
fn flatten_to_rgb(img: DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.into_rgb8();
    }

    let rgba = img.into_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, image::Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    out
}
