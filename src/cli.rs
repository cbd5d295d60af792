// 命令行参数

use clap::Parser;
use std::path::PathBuf;

/// 把本地文件夹作为临时 HTTP 主机提供访问
#[derive(Debug, Parser)]
#[command(name = "serve-folder")]
#[command(about = "把本地文件夹作为临时 HTTP 主机提供访问", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config/app.toml", value_name = "FILE")]
    pub config: String,

    /// 要托管的文件夹，每个文件夹分配一个主机名
    #[arg(value_name = "FOLDER")]
    pub folders: Vec<PathBuf>,

    /// 启动时把文件夹整体读入内存，之后的磁盘修改不可见
    #[arg(long)]
    pub snapshot: bool,

    /// 托管上次使用的文件夹
    #[arg(long)]
    pub use_last: bool,

    /// 覆盖配置中的监听端口
    #[arg(short, long)]
    pub port: Option<u16>,
}
