//! Display-to-native coordinate transform and content-stream assembly.

use std::collections::HashMap;
use std::io::Write as _;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use overmark_engine::{PageBitmap, PageGeometry};
use overmark_overlay::{Annotation, AnnotationKind, OverlayModel, SignatureAsset, TextStyle};
use tracing::warn;

use crate::ExportError;

/// Resource names registered for appended content. Prefixed to dodge
/// collisions with names the source document already uses.
const FONT_REGULAR: &str = "OMF1";
const FONT_BOLD: &str = "OMF2";

/// Converts page-local display coordinates (top-left origin, unscaled
/// display units) into the page's native space (bottom-left origin,
/// points). The two axes scale independently.
struct Frame {
    fx: f32,
    fy: f32,
    native_height: f32,
}

impl Frame {
    fn new(geometry: PageGeometry) -> Self {
        let (fx, fy) = geometry.native_scale();
        Self {
            fx,
            fy,
            native_height: geometry.native_height,
        }
    }

    /// Native bottom-left corner of an annotation's box.
    fn origin(&self, annotation: &Annotation) -> (f32, f32) {
        (
            annotation.position.x * self.fx,
            self.native_height - (annotation.position.y + annotation.size.height) * self.fy,
        )
    }
}

/// Burn every annotation into `bytes` and return the flattened PDF.
///
/// Pages transform independently, in document order; annotations within
/// a page keep creation order. Each annotated page has its original
/// content wrapped in a `q`/`Q` pair so trailing graphics state cannot
/// skew the appended drawing. A signature that fails to decode is
/// logged and skipped without disturbing the rest of the export.
pub fn flatten(
    bytes: &[u8],
    geometries: &[PageGeometry],
    model: &OverlayModel,
) -> Result<Vec<u8>, ExportError> {
    let mut document = Document::load_mem(bytes)?;
    let frames: HashMap<usize, PageGeometry> = geometries
        .iter()
        .map(|geometry| (geometry.index, *geometry))
        .collect();

    let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
    let mut fonts: Option<(ObjectId, ObjectId)> = None;
    let mut image_serial = 0usize;

    for (index, page_id) in page_ids.into_iter().enumerate() {
        let annotations = model.annotations(index);
        if annotations.is_empty() {
            continue;
        }
        let Some(geometry) = frames.get(&index) else {
            warn!(page = index, "no geometry for annotated page, skipping");
            continue;
        };
        let frame = Frame::new(*geometry);

        let mut ops = vec![Operation::new("q", vec![])];
        let mut page_fonts: Vec<(&str, ObjectId)> = Vec::new();
        let mut page_images: Vec<(String, ObjectId)> = Vec::new();

        for annotation in annotations {
            match &annotation.kind {
                AnnotationKind::Text { content, style } => {
                    let (regular, bold) =
                        *fonts.get_or_insert_with(|| standard_fonts(&mut document));
                    if page_fonts.is_empty() {
                        page_fonts.push((FONT_REGULAR, regular));
                        page_fonts.push((FONT_BOLD, bold));
                    }
                    push_text(&mut ops, &frame, annotation, content, style);
                }
                AnnotationKind::Stamp => push_stamp(&mut ops, &frame, annotation),
                AnnotationKind::Signature { asset } => {
                    match embed_signature(&mut document, asset) {
                        Ok(image_id) => {
                            let name = format!("OMImg{image_serial}");
                            image_serial += 1;
                            push_image(&mut ops, &frame, annotation, &name);
                            page_images.push((name, image_id));
                        }
                        Err(reason) => {
                            let error = ExportError::AssetEmbed {
                                page: index,
                                reason,
                            };
                            warn!(%error, "skipping signature annotation");
                        }
                    }
                }
            }
        }
        ops.push(Operation::new("Q", vec![]));

        append_content(&mut document, page_id, ops)?;
        register_resources(&mut document, page_id, &page_fonts, &page_images)?;
    }

    let mut output = Vec::new();
    document
        .save_to(&mut output)
        .map_err(|error| ExportError::Save(error.to_string()))?;
    Ok(output)
}

/// Rebuild the document from rendered page bitmaps, one full-page
/// image XObject per page. Last resort when the vector path fails.
pub fn rasterize_pages<'a>(
    pages: impl IntoIterator<Item = (PageGeometry, &'a PageBitmap)>,
) -> Result<Vec<u8>, ExportError> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for (geometry, bitmap) in pages {
        let (width, height) = bitmap.dimensions();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for pixel in bitmap.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
        }
        let data = deflate(&rgb).map_err(|reason| ExportError::AssetEmbed {
            page: geometry.index,
            reason,
        })?;
        let image_id = document.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "FlateDecode",
            },
            data,
        ));

        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(geometry.native_width),
                    real(0.0),
                    real(0.0),
                    real(geometry.native_height),
                    real(0.0),
                    real(0.0),
                ],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ];
        let content_id = document.add_object(Stream::new(
            dictionary! {},
            encode_operations(ops)?,
        ));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                real(0.0),
                real(0.0),
                real(geometry.native_width),
                real(geometry.native_height),
            ],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => Object::Reference(image_id) },
            },
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    if kids.is_empty() {
        return Err(ExportError::NoPages);
    }

    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut output = Vec::new();
    document
        .save_to(&mut output)
        .map_err(|error| ExportError::Save(error.to_string()))?;
    Ok(output)
}

fn real(value: f32) -> Object {
    Object::Real(value.into())
}

fn standard_fonts(document: &mut Document) -> (ObjectId, ObjectId) {
    let regular = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    (regular, bold)
}

/// Single-line text, baseline at the bottom of the display box.
fn push_text(
    ops: &mut Vec<Operation>,
    frame: &Frame,
    annotation: &Annotation,
    content: &str,
    style: &TextStyle,
) {
    let (x, y) = frame.origin(annotation);
    // The display size converts exactly; high-density pages (small fx)
    // legitimately produce small output text.
    let size = style.font_size_pt * frame.fx;
    let (r, g, b) = style.color.to_normalized();
    let font = if style.bold { FONT_BOLD } else { FONT_REGULAR };

    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), real(size)]));
    ops.push(Operation::new("rg", vec![real(r), real(g), real(b)]));
    ops.push(Operation::new("Td", vec![real(x), real(y)]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(content)]));
    ops.push(Operation::new("ET", vec![]));
}

/// Checkmark as two stroked segments, round caps and joins.
fn push_stamp(ops: &mut Vec<Operation>, frame: &Frame, annotation: &Annotation) {
    let (x, y) = frame.origin(annotation);
    let w = annotation.size.width * frame.fx;
    let h = annotation.size.height * frame.fy;

    ops.push(Operation::new("w", vec![real(2.0 * frame.fx)]));
    ops.push(Operation::new("J", vec![1_i64.into()]));
    ops.push(Operation::new("j", vec![1_i64.into()]));
    ops.push(Operation::new("RG", vec![real(0.0), real(0.0), real(0.0)]));
    ops.push(Operation::new("m", vec![real(x), real(y + 0.45 * h)]));
    ops.push(Operation::new(
        "l",
        vec![real(x + 0.35 * w), real(y + 0.15 * h)],
    ));
    ops.push(Operation::new("l", vec![real(x + w), real(y + 0.85 * h)]));
    ops.push(Operation::new("S", vec![]));
}

fn push_image(ops: &mut Vec<Operation>, frame: &Frame, annotation: &Annotation, name: &str) {
    let (x, y) = frame.origin(annotation);
    let w = annotation.size.width * frame.fx;
    let h = annotation.size.height * frame.fy;

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new(
        "cm",
        vec![real(w), real(0.0), real(0.0), real(h), real(x), real(y)],
    ));
    ops.push(Operation::new("Do", vec![name.into()]));
    ops.push(Operation::new("Q", vec![]));
}

/// Decode the captured PNG and add it as an RGB image XObject, with a
/// DeviceGray SMask when the image carries transparency.
fn embed_signature(document: &mut Document, asset: &SignatureAsset) -> Result<ObjectId, String> {
    let decoded = image::load_from_memory_with_format(asset.png_bytes(), image::ImageFormat::Png)
        .map_err(|error| error.to_string())?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut translucent = false;
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
        translucent |= pixel.0[3] != u8::MAX;
    }

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8_i64,
        "Filter" => "FlateDecode",
    };
    if translucent {
        let mask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8_i64,
                "Filter" => "FlateDecode",
            },
            deflate(&alpha)?,
        );
        let mask_id = document.add_object(mask);
        dict.set("SMask", Object::Reference(mask_id));
    }
    Ok(document.add_object(Stream::new(dict, deflate(&rgb)?)))
}

/// Encoding a content stream is a serialization concern; its failures
/// surface as [`ExportError::Save`], not as a document-load problem.
fn encode_operations(ops: Vec<Operation>) -> Result<Vec<u8>, ExportError> {
    Content { operations: ops }
        .encode()
        .map_err(|error| ExportError::Save(error.to_string()))
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|()| encoder.finish())
        .map_err(|error| error.to_string())
}

/// Wrap the page's existing content in `q`/`Q` and append the encoded
/// annotation operations after it.
fn append_content(
    document: &mut Document,
    page_id: ObjectId,
    ops: Vec<Operation>,
) -> Result<(), ExportError> {
    let mut body = b"Q\n".to_vec();
    body.extend(encode_operations(ops)?);

    let prologue = document.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let epilogue = document.add_object(Stream::new(dictionary! {}, body));

    let page = document.get_object_mut(page_id)?.as_dict_mut()?;
    let contents = match page.get(b"Contents").ok().cloned() {
        Some(Object::Array(mut streams)) => {
            streams.insert(0, prologue.into());
            streams.push(epilogue.into());
            streams
        }
        Some(reference) => vec![prologue.into(), reference, epilogue.into()],
        None => vec![prologue.into(), epilogue.into()],
    };
    page.set("Contents", contents);
    Ok(())
}

/// Merge per-page font and XObject entries into the page's resources.
///
/// Indirect or inherited Resources dictionaries are resolved into an
/// inline copy on the page, so resources shared between pages are never
/// mutated and inherited entries stay visible.
fn register_resources(
    document: &mut Document,
    page_id: ObjectId,
    fonts: &[(&str, ObjectId)],
    images: &[(String, ObjectId)],
) -> Result<(), ExportError> {
    if fonts.is_empty() && images.is_empty() {
        return Ok(());
    }

    let current = inherited_resources(document, page_id)?;
    let mut resources = resolve_dictionary(document, current)?;

    if !fonts.is_empty() {
        let sub = resources.get(b"Font").ok().cloned();
        let mut merged = resolve_dictionary(document, sub)?;
        for (name, id) in fonts {
            merged.set(*name, Object::Reference(*id));
        }
        resources.set("Font", merged);
    }
    if !images.is_empty() {
        let sub = resources.get(b"XObject").ok().cloned();
        let mut merged = resolve_dictionary(document, sub)?;
        for (name, id) in images {
            merged.set(name.as_bytes(), Object::Reference(*id));
        }
        resources.set("XObject", merged);
    }

    let page = document.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Resources", resources);
    Ok(())
}

/// Resources may live on the page itself or on an ancestor Pages node.
fn inherited_resources(
    document: &Document,
    page_id: ObjectId,
) -> Result<Option<Object>, ExportError> {
    let mut current = page_id;
    for _ in 0..32 {
        let dict = document.get_object(current)?.as_dict()?;
        if let Ok(value) = dict.get(b"Resources") {
            return Ok(Some(value.clone()));
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(id)) => current = *id,
            _ => break,
        }
    }
    Ok(None)
}

fn resolve_dictionary(
    document: &Document,
    object: Option<Object>,
) -> Result<Dictionary, ExportError> {
    Ok(match object {
        Some(Object::Reference(id)) => document.get_object(id)?.as_dict()?.clone(),
        Some(Object::Dictionary(dict)) => dict,
        _ => Dictionary::new(),
    })
}
