/// Guesses an image MIME type from the leading magic bytes
pub fn sniff_image_mime(data: &[u8]) -> &'static str {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
    const JPEG: &[u8] = b"\xff\xd8\xff";
    const GIF: &[u8] = b"GIF8";

    match data {
        _ if data.starts_with(PNG) => "image/png",
        _ if data.starts_with(JPEG) => "image/jpeg",
        _ if data.starts_with(GIF) => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ if looks_like_svg(data) => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Encodes bytes as a `data:` URL suitable for an `<img src>` attribute
pub fn encode_data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, base64::encode(data))
}

fn looks_like_svg(data: &[u8]) -> bool {
    let head = &data[..data.len().min(256)];
    // The cut may split a multibyte character
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        Err(e) => match std::str::from_utf8(&head[..e.valid_up_to()]) {
            Ok(text) => text,
            Err(_) => return false,
        },
    };

    let text = text.trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}
