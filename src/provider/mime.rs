// 根据扩展名推断内容类型

use std::path::Path;

/// 未知类型
pub const OCTET_STREAM: &str = "application/octet-stream";

/// 目录列表页等生成的 HTML
pub const HTML_UTF8: &str = "text/html; charset=utf-8";

/// 获取文件名对应的内容类型
pub fn content_type_for(name: &str) -> &'static str {
    let ext = match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_lowercase(),
        None => return OCTET_STREAM,
    };
    match ext.as_str() {
        // 网页
        "html" | "htm" => HTML_UTF8,
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "webmanifest" => "application/manifest+json",
        "wasm" => "application/wasm",
        // 文本
        "txt" | "md" | "log" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "csv" => "text/csv; charset=utf-8",
        // 图片
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        // 字体
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        // 音视频
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        // 文档、压缩包
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(content_type_for("index.html"), HTML_UTF8);
        assert_eq!(content_type_for("IMAGE.PNG"), "image/png");
        assert_eq!(content_type_for("app.js"), "text/javascript; charset=utf-8");
        assert_eq!(content_type_for("Makefile"), OCTET_STREAM);
        assert_eq!(content_type_for("archive.xyz"), OCTET_STREAM);
    }
}
