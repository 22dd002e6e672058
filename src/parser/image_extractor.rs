use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info, warn};

/// 宽或高小于该值的图片视为图标，跳过
const MIN_IMAGE_SIDE: u32 = 10;
/// Form XObject 的最大嵌套深度
const MAX_FORM_DEPTH: u32 = 3;

#[derive(Debug, Clone)]
pub struct ExtractedImage {
    pub path: PathBuf,
    pub page: u32,
    pub width: u32,
    pub height: u32,
}

/// 把 PDF 中嵌入的位图写成 jpg/png 文件
pub struct ImageExtractor {
    min_side: u32,
}

impl Default for ImageExtractor {
    fn default() -> Self {
        Self {
            min_side: MIN_IMAGE_SIDE,
        }
    }
}

impl ImageExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extract_from(&self, doc: &Document, out_dir: &Path) -> Result<Vec<ExtractedImage>> {
        fs::create_dir_all(out_dir)?;

        let image_ids = collect_page_images(doc);
        debug!("PDF中发现 {} 个Image对象", image_ids.len());

        let mut saved = Vec::new();
        for (page, id) in image_ids {
            let Ok(stream) = doc.get_object(id).and_then(Object::as_stream) else {
                continue;
            };

            let Some((width, height)) = dimensions(&stream.dict) else {
                debug!("跳过尺寸无效的图片 (obj {:?})", id);
                continue;
            };
            if width < self.min_side || height < self.min_side {
                debug!("跳过小图片: {}x{} (obj {:?})", width, height, id);
                continue;
            }

            let stem = out_dir.join(format!("page{:03}_img{:03}", page, saved.len() + 1));
            match save_stream(doc, stream, width, height, &stem) {
                Ok(Some(path)) => saved.push(ExtractedImage {
                    path,
                    page,
                    width,
                    height,
                }),
                Ok(None) => {}
                Err(e) => warn!("保存图片失败 (obj {:?}): {}", id, e),
            }
        }

        info!("图片提取完成，共 {} 张", saved.len());
        Ok(saved)
    }
}

/// 按页面顺序收集图片对象，同一对象只取第一次出现
fn collect_page_images(doc: &Document) -> Vec<(u32, ObjectId)> {
    let mut found: Vec<(u32, ObjectId)> = Vec::new();
    for (page_num, page_id) in doc.get_pages() {
        let Ok(page) = doc.get_dictionary(page_id) else {
            continue;
        };
        walk_xobjects(doc, page, page_num, 0, &mut found);
    }
    found
}

fn walk_xobjects(doc: &Document, owner: &Dictionary, page: u32, depth: u32, found: &mut Vec<(u32, ObjectId)>) {
    if depth > MAX_FORM_DEPTH {
        return;
    }
    let Some(xobjects) = xobject_dict(doc, owner) else {
        return;
    };

    for (_, value) in xobjects.iter() {
        let Ok(id) = value.as_reference() else {
            continue;
        };
        let Ok(stream) = doc.get_object(id).and_then(Object::as_stream) else {
            continue;
        };
        match name_of(&stream.dict, b"Subtype") {
            Some("Image") if !found.iter().any(|(_, seen)| *seen == id) => found.push((page, id)),
            Some("Form") => walk_xobjects(doc, &stream.dict, page, depth + 1, found),
            _ => {}
        }
    }
}

fn xobject_dict<'a>(doc: &'a Document, owner: &'a Dictionary) -> Option<&'a Dictionary> {
    let (_, resources) = doc.dereference(owner.get(b"Resources").ok()?).ok()?;
    let (_, xobjects) = doc.dereference(resources.as_dict().ok()?.get(b"XObject").ok()?).ok()?;
    xobjects.as_dict().ok()
}

fn save_stream(doc: &Document, stream: &Stream, width: u32, height: u32, stem: &Path) -> Result<Option<PathBuf>> {
    match filter_name(&stream.dict).as_deref() {
        Some("DCTDecode") => {
            let data = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            if data.is_empty() {
                return Ok(None);
            }
            let path = stem.with_extension("jpg");
            fs::write(&path, data)?;
            Ok(Some(path))
        }
        Some("FlateDecode") => {
            let data = match stream.decompressed_content() {
                Ok(data) => data,
                Err(_) => inflate(&stream.content)?,
            };
            raster_to_png(doc, &stream.dict, &data, width, height, stem)
        }
        None => raster_to_png(doc, &stream.dict, &stream.content, width, height, stem),
        Some(other) => {
            debug!("跳过不支持的编码: {}", other);
            Ok(None)
        }
    }
}

fn raster_to_png(
    doc: &Document,
    dict: &Dictionary,
    data: &[u8],
    width: u32,
    height: u32,
    stem: &Path,
) -> Result<Option<PathBuf>> {
    let bits = dict_int(dict, b"BitsPerComponent").unwrap_or(8);
    if bits != 8 {
        debug!("跳过 {} 位图片", bits);
        return Ok(None);
    }

    let Some(pixels) = width.checked_mul(height).and_then(|n| usize::try_from(n).ok()) else {
        warn!("图片尺寸过大: {}x{}", width, height);
        return Ok(None);
    };
    let image = if let Some(rgb) = decode_indexed(doc, dict, data, pixels) {
        RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
    } else {
        let channels = color_channels(doc, dict);
        let Some(expected) = pixels.checked_mul(channels) else {
            return Ok(None);
        };
        if data.len() < expected {
            warn!("图片数据不足: {} < {} ({}x{}, ch={})", data.len(), expected, width, height, channels);
            return Ok(None);
        }
        let data = &data[..expected];
        match channels {
            1 => GrayImage::from_raw(width, height, data.to_vec()).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(width, height, data.to_vec()).map(DynamicImage::ImageRgb8),
            4 => RgbImage::from_raw(width, height, cmyk_to_rgb(data)).map(DynamicImage::ImageRgb8),
            _ => None,
        }
    };

    let Some(image) = image else {
        return Ok(None);
    };
    let path = stem.with_extension("png");
    image.save(&path)?;
    Ok(Some(path))
}

/// [/Indexed base hival lookup]，每像素一个字节的索引
fn decode_indexed(doc: &Document, dict: &Dictionary, data: &[u8], pixels: usize) -> Option<Vec<u8>> {
    let space = dict.get(b"ColorSpace").ok()?.as_array().ok()?;
    if space.first()?.as_name().ok()? != b"Indexed" {
        return None;
    }
    let hival = space.get(2)?.as_i64().ok()?.max(0) as usize;
    let base_channels = space
        .get(1)
        .and_then(|base| base.as_name().ok())
        .map(|name| channels_for(std::str::from_utf8(name).unwrap_or("")))
        .unwrap_or(3);
    if base_channels != 3 || data.len() < pixels {
        return None;
    }

    let lookup = match space.get(3)? {
        Object::String(bytes, _) => bytes.clone(),
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::String(bytes, _) => bytes.clone(),
            Object::Stream(stream) => stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone()),
            _ => return None,
        },
        Object::Stream(stream) => stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone()),
        _ => return None,
    };
    if lookup.len() < hival.checked_add(1)?.checked_mul(3)? {
        return None;
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for &index in &data[..pixels] {
        let offset = (index as usize).min(hival) * 3;
        rgb.extend_from_slice(&lookup[offset..offset + 3]);
    }
    Some(rgb)
}

fn cmyk_to_rgb(data: &[u8]) -> Vec<u8> {
    data.chunks_exact(4)
        .flat_map(|px| {
            let k = 255 - px[3] as u32;
            [0, 1, 2].map(|i| ((255 - px[i] as u32) * k / 255) as u8)
        })
        .collect()
}

fn color_channels(doc: &Document, dict: &Dictionary) -> usize {
    let Ok(space) = dict.get(b"ColorSpace") else {
        return 3;
    };
    let space = doc.dereference(space).map(|(_, obj)| obj).unwrap_or(space);

    if let Ok(name) = space.as_name() {
        return channels_for(std::str::from_utf8(name).unwrap_or(""));
    }
    let Ok(array) = space.as_array() else {
        return 3;
    };
    match array.first().and_then(|o| o.as_name().ok()) {
        Some(b"ICCBased") => array
            .get(1)
            .and_then(|o| o.as_reference().ok())
            .and_then(|id| doc.get_object(id).ok())
            .and_then(|o| o.as_stream().ok())
            .and_then(|s| dict_int(&s.dict, b"N"))
            .map_or(3, |n| n as usize),
        Some(b"DeviceN") => array
            .get(1)
            .and_then(|o| o.as_array().ok())
            .map_or(3, Vec::len),
        Some(name) => channels_for(std::str::from_utf8(name).unwrap_or("")),
        None => 3,
    }
}

fn channels_for(name: &str) -> usize {
    match name {
        "DeviceGray" | "CalGray" | "G" => 1,
        "DeviceCMYK" | "CMYK" => 4,
        _ => 3,
    }
}

/// Filter 可能是名称或数组；数组中优先取图片编码
fn filter_name(dict: &Dictionary) -> Option<String> {
    let filter = dict.get(b"Filter").ok()?;
    if let Ok(name) = filter.as_name() {
        return std::str::from_utf8(name).ok().map(str::to_string);
    }

    let names: Vec<&str> = filter
        .as_array()
        .ok()?
        .iter()
        .filter_map(|o| o.as_name().ok())
        .filter_map(|n| std::str::from_utf8(n).ok())
        .collect();
    names
        .iter()
        .find(|n| matches!(**n, "DCTDecode" | "JPXDecode" | "CCITTFaxDecode"))
        .or_else(|| names.first())
        .map(|n| n.to_string())
}

fn name_of<'a>(dict: &'a Dictionary, key: &[u8]) -> Option<&'a str> {
    dict.get(key)
        .ok()
        .and_then(|o| o.as_name().ok())
        .and_then(|n| std::str::from_utf8(n).ok())
}

/// 宽高必须是能放进 u32 的非负整数
fn dimensions(dict: &Dictionary) -> Option<(u32, u32)> {
    let width = u32::try_from(dict_int(dict, b"Width")?).ok()?;
    let height = u32::try_from(dict_int(dict, b"Height")?).ok()?;
    Some((width, height))
}

fn dict_int(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    dict.get(key).ok().and_then(|o| o.as_i64().ok())
}

/// lopdf 解压失败时先按 zlib、再按裸 deflate 解压
fn inflate(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if flate2::read::ZlibDecoder::new(compressed)
        .read_to_end(&mut out)
        .is_ok()
    {
        return Ok(out);
    }
    out.clear();
    flate2::read::DeflateDecoder::new(compressed)
        .read_to_end(&mut out)
        .context("FlateDecode解压失败")?;
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use lopdf::dictionary;
    use std::io::Write;

    fn image_stream(width: i64, height: i64, filter: Option<&str>, color: &str, content: Vec<u8>) -> Stream {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => color,
            "BitsPerComponent" => 8_i64,
        };
        if let Some(filter) = filter {
            dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
        }
        Stream::new(dict, content)
    }

    /// 一页 PDF：一张 JPEG、一张压缩灰度图、一张图标
    pub(crate) fn sample_document() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let jpeg = image_stream(20, 20, Some("DCTDecode"), "DeviceRGB", vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 1]);
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[128u8; 16 * 16]).unwrap();
        let gray = image_stream(16, 16, Some("FlateDecode"), "DeviceGray", encoder.finish().unwrap());
        let icon = image_stream(4, 4, None, "DeviceGray", vec![0u8; 16]);

        let jpeg_id = doc.add_object(jpeg);
        let gray_id = doc.add_object(gray);
        let icon_id = doc.add_object(icon);

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0_i64.into(), 0_i64.into(), 100_i64.into(), 100_i64.into()],
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im1" => jpeg_id,
                    "Im2" => gray_id,
                    "Im3" => icon_id,
                },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1_i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn writes_jpeg_and_png_and_skips_icons() {
        let dir = tempfile::tempdir().unwrap();
        let images = ImageExtractor::new()
            .extract_from(&sample_document(), dir.path())
            .unwrap();

        assert_eq!(images.len(), 2);
        let mut extensions: Vec<_> = images
            .iter()
            .map(|img| img.path.extension().unwrap().to_string_lossy().to_string())
            .collect();
        extensions.sort();
        assert_eq!(extensions, vec!["jpg", "png"]);
        assert!(images.iter().all(|img| img.page == 1 && img.path.exists()));
    }

    #[test]
    fn negative_or_oversized_dimensions_are_rejected() {
        assert_eq!(dimensions(&image_stream(-1, 20, None, "DeviceGray", Vec::new()).dict), None);
        assert_eq!(dimensions(&image_stream(20, 1 << 40, None, "DeviceGray", Vec::new()).dict), None);
        assert_eq!(dimensions(&image_stream(640, 480, None, "DeviceGray", Vec::new()).dict), Some((640, 480)));
    }

    #[test]
    fn pixel_count_overflow_skips_the_image() {
        let dir = tempfile::tempdir().unwrap();
        let stream = image_stream(70_000, 70_000, None, "DeviceGray", vec![0u8; 64]);
        let doc = Document::with_version("1.5");

        let saved = raster_to_png(&doc, &stream.dict, &stream.content, 70_000, 70_000, &dir.path().join("big")).unwrap();
        assert_eq!(saved, None);
    }

    #[test]
    fn cmyk_is_converted() {
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 0, 255, 0, 0, 0]), vec![255, 255, 255, 0, 255, 255]);
    }

    #[test]
    fn raw_deflate_fallback() {
        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"pixels").unwrap();
        assert_eq!(inflate(&encoder.finish().unwrap()).unwrap(), b"pixels");
    }
}
