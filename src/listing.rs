//! 目录列表页生成
//!
//! 生成的页面与普通文件一样作为回复正文返回，没有特殊状态码

use futures::TryStreamExt;

use crate::provider::{DirectoryHandle, ProviderResult};

/// 目录条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_directory: bool,
}

/// 枚举目录条目，顺序沿用提供者的枚举顺序
pub async fn collect_entries(dir: &dyn DirectoryHandle) -> ProviderResult<Vec<DirectoryEntry>> {
    dir.entries()
        .map_ok(|(name, handle)| DirectoryEntry {
            is_directory: handle.is_directory(),
            name,
        })
        .try_collect()
        .await
}

/// 目录的规范展示路径：非空时以 `/` 结尾，根目录显示为 `/`
pub fn display_path(relative_url: &str) -> String {
    if relative_url.is_empty() {
        "/".to_string()
    } else if relative_url.ends_with('/') {
        relative_url.to_string()
    } else {
        format!("{}/", relative_url)
    }
}

/// 生成目录列表页
///
/// - `relative_url`: 目录相对主机根的路径（可为空）
/// - `link_base`: 链接前缀；为 None 时使用相对展示路径
pub async fn render_directory_listing(
    dir: &dyn DirectoryHandle,
    relative_url: &str,
    link_base: Option<&str>,
) -> ProviderResult<String> {
    let entries = collect_entries(dir).await?;
    Ok(render_entries(relative_url, link_base, &entries))
}

/// 按给定条目生成 HTML
pub fn render_entries(relative_url: &str, link_base: Option<&str>, entries: &[DirectoryEntry]) -> String {
    let title = escape_html(&display_path(relative_url));

    // 链接前缀：相对路径时根目录为空串
    let relative_prefix = if relative_url.is_empty() {
        String::new()
    } else {
        display_path(relative_url)
    };
    let prefix = link_base.unwrap_or(&relative_prefix);

    let mut html = format!(
        "<!DOCTYPE html>\n<html><head>\n<meta charset=\"utf-8\">\n\
         <title>Directory listing for {title}</title>\n\
         </head><body>\n<h1>Directory listing for {title}</h1><ul>"
    );

    for entry in entries {
        // 目录显示为 "name/"
        let suffix = if entry.is_directory { "/" } else { "" };
        html.push_str(&format!(
            "<li><a href=\"{}{}{}\">{}{}</a></li>",
            escape_html(prefix),
            urlencoding::encode(&entry.name),
            suffix,
            escape_html(&entry.name),
            suffix
        ));
    }

    html.push_str("</ul></body></html>");
    html
}

/// HTML 转义
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
