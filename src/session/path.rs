// 主机内请求路径的规范化

/// 把路由器转来的主机内路径规范化为相对路径
///
/// 依次去掉一个结尾的 `/`、去掉查询串、做百分号解码。
/// 查询串前的 `/` 会保留下来（`a.txt/?v=1` 得到 `a.txt/`，按目录解析）。
/// 解码结果不是合法 UTF-8 时返回 None。不处理 `..`。
pub fn normalize_request_path(path: &str) -> Option<String> {
    let path = path.strip_suffix('/').unwrap_or(path);
    let path = match path.find('?') {
        Some(q) => &path[..q],
        None => path,
    };

    urlencoding::decode(path).ok().map(|decoded| decoded.into_owned())
}

/// 路径中是否含有 `..` 段
pub fn has_parent_segment(relative: &str) -> bool {
    relative.split('/').any(|segment| segment == "..")
}

/// 对相对路径逐段做百分号编码，用于拼接链接
pub fn encode_segments(relative: &str) -> String {
    relative
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
