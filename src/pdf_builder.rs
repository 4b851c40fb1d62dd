use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Page geometry: image pixels are mapped to PDF points at 100 DPI.
const RENDER_DPI: f32 = 100.0;

/// Builds a multi-page PDF where each page is a single full-bleed JPEG.
///
/// JPEG bytes are embedded as DCTDecode image XObjects, so the compressed
/// data produced by the compiler lands in the file unchanged.
pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        // Reserved up front so every page can reference its parent before
        // the page tree is materialized in finish().
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            page_ids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.page_ids.is_empty()
    }

    /// Append one page. `width`/`height` are the pixel dimensions of the
    /// encoded JPEG.
    pub fn add_jpeg_page(&mut self, width: u32, height: u32, jpeg: Vec<u8>) {
        let image_id = self.doc.add_object(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                jpeg,
            )
            .with_compression(false),
        );

        let page_width = width as f32 * 72.0 / RENDER_DPI;
        let page_height = height as f32 * 72.0 / RENDER_DPI;

        let content = format!("q\n{page_width} 0 0 {page_height} 0 0 cm\n/Im1 Do\nQ");
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.into_bytes()));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), page_width.into(), page_height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });
        self.page_ids.push(page_id);
    }

    /// Materialize the page tree and serialize the document.
    pub fn finish(mut self) -> Result<Vec<u8>, lopdf::Error> {
        let kids: Vec<Object> = self
            .page_ids
            .iter()
            .map(|id| Object::Reference(*id))
            .collect();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut data = Vec::new();
        self.doc.save_to(&mut data)?;
        Ok(data)
    }
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}
