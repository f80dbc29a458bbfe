//! Conversion between canonical types and provider wire formats

pub mod openai;
pub mod xfyun;

/// Default edge length for generated images
const DEFAULT_IMAGE_EDGE: u32 = 512;

/// Width and height from a size string such as `1024x768` or `16:9`
///
/// Accepts `×`, `x`, `X`, `*` and `:` as separators. Anything unparseable
/// falls back to 512×512.
pub fn parse_image_size(size: Option<&str>) -> (u32, u32) {
    let Some(size) = size.map(str::trim).filter(|s| !s.is_empty()) else {
        return (DEFAULT_IMAGE_EDGE, DEFAULT_IMAGE_EDGE);
    };

    ['×', 'x', 'X', '*', ':']
        .into_iter()
        .find_map(|sep| {
            let (w, h) = size.split_once(sep)?;
            Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
        })
        .unwrap_or((DEFAULT_IMAGE_EDGE, DEFAULT_IMAGE_EDGE))
}
